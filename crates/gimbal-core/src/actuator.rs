//! Actuator sink capability.
//!
//! The loop needs two things from a mount: steer to an absolute angle pair
//! without blocking, and release the connection. Anything that can do both
//! (a motion controller, a simulator, a test double) drives the engine.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DispatchError;

/// One fire-and-forget steering command, gimbal-frame degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GimbalCommand {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub absolute: bool,
}

impl GimbalCommand {
    pub const fn absolute(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self {
            azimuth_deg,
            elevation_deg,
            absolute: true,
        }
    }
}

/// Narrow mount interface.
pub trait GimbalActuator {
    /// Queue a steering command. Must not wait for motion to complete.
    fn steer(&mut self, command: &GimbalCommand) -> Result<(), DispatchError>;

    /// Stop and close the connection. Safe to call more than once.
    fn release(&mut self) -> Result<(), DispatchError>;

    /// Return to the mechanical zero: azimuth at the zero bearing,
    /// elevation at zenith.
    fn home(&mut self) -> Result<(), DispatchError> {
        self.steer(&GimbalCommand::absolute(0.0, 0.0))
    }
}

impl<A: GimbalActuator + ?Sized> GimbalActuator for Box<A> {
    fn steer(&mut self, command: &GimbalCommand) -> Result<(), DispatchError> {
        (**self).steer(command)
    }

    fn release(&mut self) -> Result<(), DispatchError> {
        (**self).release()
    }

    fn home(&mut self) -> Result<(), DispatchError> {
        (**self).home()
    }
}

/// Scoped ownership of an actuator connection.
///
/// `release` forwards to the actuator at most once; after that, `steer`
/// refuses. Dropping an unreleased session releases it, so a cancelled run
/// future still leaves the mount released.
pub struct ActuatorSession<A: GimbalActuator> {
    actuator: A,
    released: bool,
}

impl<A: GimbalActuator> ActuatorSession<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            actuator,
            released: false,
        }
    }

    pub fn steer(&mut self, command: &GimbalCommand) -> Result<(), DispatchError> {
        if self.released {
            return Err(DispatchError::Released);
        }
        self.actuator.steer(command)
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.actuator.release() {
            Ok(()) => debug!("actuator released"),
            Err(e) => warn!("actuator release reported: {}", e),
        }
    }

    pub fn home(&mut self) -> Result<(), DispatchError> {
        if self.released {
            return Err(DispatchError::Released);
        }
        self.actuator.home()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}

impl<A: GimbalActuator> Drop for ActuatorSession<A> {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-memory mount used for dry runs.
///
/// Tracks the last commanded position with the same soft-limit clip as the
/// real controller and keeps every accepted command.
#[derive(Debug, Clone)]
pub struct SimulatedGimbal {
    limit_deg: f64,
    position: (f64, f64),
    history: Vec<GimbalCommand>,
    releases: u32,
}

impl SimulatedGimbal {
    pub fn new() -> Self {
        Self::with_limit(90.0)
    }

    pub fn with_limit(limit_deg: f64) -> Self {
        Self {
            limit_deg: limit_deg.abs(),
            position: (0.0, 0.0),
            history: Vec::new(),
            releases: 0,
        }
    }

    /// Current (azimuth, elevation) in gimbal degrees.
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn history(&self) -> &[GimbalCommand] {
        &self.history
    }

    pub fn releases(&self) -> u32 {
        self.releases
    }
}

impl Default for SimulatedGimbal {
    fn default() -> Self {
        Self::new()
    }
}

impl GimbalActuator for SimulatedGimbal {
    fn steer(&mut self, command: &GimbalCommand) -> Result<(), DispatchError> {
        let lim = self.limit_deg;
        let (az, el) = if command.absolute {
            (command.azimuth_deg, command.elevation_deg)
        } else {
            (
                self.position.0 + command.azimuth_deg,
                self.position.1 + command.elevation_deg,
            )
        };
        if !(az.is_finite() && el.is_finite()) {
            return Err(DispatchError::Rejected(format!("non-finite target {az}, {el}")));
        }
        self.position = (az.clamp(-lim, lim), el.clamp(-lim, lim));
        self.history.push(*command);
        Ok(())
    }

    fn release(&mut self) -> Result<(), DispatchError> {
        self.releases += 1;
        Ok(())
    }
}
