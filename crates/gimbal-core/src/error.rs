//! Error taxonomy for the tracking engine.
//!
//! Configuration problems fail at construction, setup problems fail before
//! the loop enters tracking, and dispatch problems are transient.

use thiserror::Error;

/// Invalid session configuration. Raised once, at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("flip-on threshold {flip_on}° must exceed flip-off threshold {flip_off}°")]
    HysteresisBand { flip_on: f64, flip_off: f64 },
    #[error("flip threshold {0}° outside [0, 180]")]
    ThresholdOutOfRange(f64),
    #[error("{axis} limits [{min}, {max}] with fence {fence} leave no travel")]
    DegenerateLimits {
        axis: &'static str,
        min: f64,
        max: f64,
        fence: f64,
    },
    #[error("fence margin must be finite and non-negative, got {0}")]
    InvalidFence(f64),
    #[error("sub-step count must be at least 1")]
    ZeroSubSteps,
    #[error("update interval must be positive and finite, got {0} s")]
    InvalidInterval(f64),
    #[error("azimuth zero bearing must be finite, got {0}")]
    InvalidZeroBearing(f64),
    #[error("elevation cutoff {0}° outside [-90, 90]")]
    CutoffOutOfRange(f64),
    #[error("cycle limit must be at least 1 when set")]
    ZeroCycleLimit,
    #[error("config file: {0}")]
    Io(String),
    #[error("config parse: {0}")]
    Parse(String),
}

/// Fatal problems found before tracking starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
    #[error("no ground position fix: {0}")]
    NoGroundFix(String),
    #[error("missing orbital data: {0}")]
    MissingOrbitalData(String),
    #[error("target not found: {0}")]
    TargetNotFound(String),
}

/// Bad knots or an out-of-span query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("need at least 2 knots, got {0}")]
    TooFewKnots(usize),
    #[error("knot times ({x}) and values ({y}) differ in length")]
    LengthMismatch { x: usize, y: usize },
    #[error("knot times must be strictly increasing (index {0})")]
    NotIncreasing(usize),
    #[error("non-finite knot at index {0}")]
    NonFinite(usize),
    #[error("query {xq} outside knot span [{lo}, {hi}]")]
    OutOfSpan { xq: f64, lo: f64, hi: f64 },
}

/// A single command failed to reach the actuator. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("actuator rejected command: {0}")]
    Rejected(String),
    #[error("actuator link unavailable: {0}")]
    Link(String),
    #[error("actuator already released")]
    Released,
}

/// The orbital source could not produce a position for a timestamp.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("propagation failed: {0}")]
    Propagation(String),
    #[error("position out of range: {0}")]
    OutOfRange(String),
}

/// Anything that ends a tracking session.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

pub type Result<T> = std::result::Result<T, TrackingError>;
