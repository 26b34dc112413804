//! Gimbal Tracking Engine
//!
//! Turns sparse orbital look-angle predictions into a dense, paced stream of
//! two-axis gimbal commands:
//!
//! ```text
//! OrbitalSource -> 3 knots/cycle -> MonotoneCubic -> FrameMapper (flip) -> clamp -> GimbalActuator
//! ```
//!
//! | Module | Role |
//! |--------|------|
//! | [`angles`] | wrapping, shortest-path unwrap, fenced clamp |
//! | [`interpolate`] | Fritsch–Carlson monotone cubic Hermite |
//! | [`frame`] | sky → gimbal frame with flip hysteresis |
//! | [`tracking`] | the paced loop |
//!
//! Orbital propagation and the motion-controller transport are adapters
//! behind [`source::OrbitalSource`] and [`actuator::GimbalActuator`].

pub mod actuator;
pub mod angles;
pub mod config;
pub mod error;
pub mod frame;
pub mod interpolate;
pub mod source;
pub mod telemetry;
pub mod tracking;

// Re-exports
pub use actuator::{ActuatorSession, GimbalActuator, GimbalCommand, SimulatedGimbal};
pub use angles::{AxisLimits, FencedRange};
pub use config::{TrackerConfig, ValidatedConfig};
pub use error::{
    ConfigError, DispatchError, InterpolationError, SetupError, SourceError, TrackingError,
};
pub use frame::{FlipState, FrameMapper, GimbalAngles, Hysteresis};
pub use interpolate::{Knot, MonotoneCubic};
pub use source::{
    FixedGroundPosition, GroundPosition, GroundPositionProvider, OrbitalSource, SkyAngles,
};
pub use telemetry::{
    JsonLinesTelemetry, NullTelemetry, StepOutcome, TelemetrySink, TracingTelemetry,
    TrackingSample,
};
pub use tracking::{plan_cycle, CyclePlan, CyclePoint, TrackingLoop, TrackingReport, TrackingState};
