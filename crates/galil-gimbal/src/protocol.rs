//! Galil ASCII command set and responses.
//!
//! Commands are terminated with `\r`. The controller answers `:` when a
//! command is accepted, optionally preceded by data, and `?` when it is not.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalilError {
    #[error("controller link: {0}")]
    Io(#[from] std::io::Error),
    /// `code` is the controller's `TC 1` answer when it could be read.
    #[error("controller rejected `{command}`: {}", .code.as_deref().unwrap_or("no error code"))]
    Rejected {
        command: String,
        code: Option<String>,
    },
    #[error("no response to `{0}` before timeout")]
    Timeout(String),
    #[error("unexpected response to `{command}`: {response:?}")]
    Malformed { command: String, response: String },
    #[error("command queue: {0}")]
    Queue(String),
    #[error("controller closed the connection")]
    Closed,
}

pub type Result<T> = std::result::Result<T, GalilError>;

/// Degrees to encoder counts, per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountScale {
    pub az_counts_per_deg: f64,
    pub el_counts_per_deg: f64,
}

impl Default for CountScale {
    fn default() -> Self {
        Self {
            az_counts_per_deg: 10_000.0,
            el_counts_per_deg: 10_000.0,
        }
    }
}

impl CountScale {
    pub fn to_counts(&self, az_deg: f64, el_deg: f64) -> (i64, i64) {
        (
            (az_deg * self.az_counts_per_deg).round() as i64,
            (el_deg * self.el_counts_per_deg).round() as i64,
        )
    }

    pub fn to_degrees(&self, counts: (i64, i64)) -> (f64, f64) {
        (
            counts.0 as f64 / self.az_counts_per_deg,
            counts.1 as f64 / self.el_counts_per_deg,
        )
    }
}

/// Trapezoidal profile limits, counts/s and counts/s².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionProfile {
    pub acceleration: u32,
    pub deceleration: u32,
    pub speed: u32,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            acceleration: 200_000,
            deceleration: 200_000,
            speed: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalilCommand {
    Abort,
    Stop,
    WaitMs(u32),
    MotorOff,
    ServoHere,
    DefinePosition(i64, i64),
    Acceleration(u32, u32),
    Deceleration(u32, u32),
    Speed(u32, u32),
    PositionTracking(bool),
    PositionAbsolute(i64, i64),
    TellPosition,
    TellCode,
}

impl fmt::Display for GalilCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GalilCommand::Abort => write!(f, "AB"),
            GalilCommand::Stop => write!(f, "ST"),
            GalilCommand::WaitMs(ms) => write!(f, "WT {}", ms),
            GalilCommand::MotorOff => write!(f, "MO XY"),
            GalilCommand::ServoHere => write!(f, "SH XY"),
            GalilCommand::DefinePosition(x, y) => write!(f, "DP {},{}", x, y),
            GalilCommand::Acceleration(x, y) => write!(f, "AC {},{}", x, y),
            GalilCommand::Deceleration(x, y) => write!(f, "DC {},{}", x, y),
            GalilCommand::Speed(x, y) => write!(f, "SP {},{}", x, y),
            GalilCommand::PositionTracking(on) => {
                let v = u8::from(*on);
                write!(f, "PT {},{}", v, v)
            }
            GalilCommand::PositionAbsolute(x, y) => write!(f, "PA {},{}", x, y),
            GalilCommand::TellPosition => write!(f, "TP XY"),
            GalilCommand::TellCode => write!(f, "TC 1"),
        }
    }
}

impl GalilCommand {
    /// Commands that bring a freshly opened controller into position
    /// tracking mode.
    pub fn setup_sequence(profile: &MotionProfile, zero_here: bool) -> Vec<GalilCommand> {
        let mut seq = vec![
            GalilCommand::Abort,
            GalilCommand::Stop,
            GalilCommand::WaitMs(20),
            GalilCommand::MotorOff,
        ];
        if zero_here {
            seq.push(GalilCommand::DefinePosition(0, 0));
        }
        seq.extend([
            GalilCommand::ServoHere,
            GalilCommand::Acceleration(profile.acceleration, profile.acceleration),
            GalilCommand::Deceleration(profile.deceleration, profile.deceleration),
            GalilCommand::Speed(profile.speed, profile.speed),
            GalilCommand::Stop,
            GalilCommand::PositionTracking(true),
        ]);
        seq
    }

    /// Stop motion and leave tracking mode.
    pub fn release_sequence() -> [GalilCommand; 2] {
        [GalilCommand::Stop, GalilCommand::PositionTracking(false)]
    }
}

/// Interpret a complete response frame (everything up to and including the
/// terminating `:` or `?`). Returns the data payload on success.
pub fn parse_response(command: &GalilCommand, frame: &str) -> Result<String> {
    let trimmed = frame.trim_end_matches(['\r', '\n', ' ']);
    if let Some(payload) = trimmed.strip_suffix(':') {
        Ok(payload.trim().to_string())
    } else if trimmed.ends_with('?') {
        Err(GalilError::Rejected {
            command: command.to_string(),
            code: None,
        })
    } else {
        Err(GalilError::Malformed {
            command: command.to_string(),
            response: frame.to_string(),
        })
    }
}

/// Parse a `TP XY` payload such as `" 1200, -350"`.
pub fn parse_position(command: &GalilCommand, payload: &str) -> Result<(i64, i64)> {
    let malformed = || GalilError::Malformed {
        command: command.to_string(),
        response: payload.to_string(),
    };
    let mut parts = payload.split(',').map(|p| p.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Ok((x.round() as i64, y.round() as i64)),
        _ => Err(malformed()),
    }
}
