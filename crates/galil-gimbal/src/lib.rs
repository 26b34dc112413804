//! Galil Gimbal
//!
//! [`GimbalActuator`](gimbal_core::GimbalActuator) for a two-axis mount on a
//! Galil motion controller, streaming absolute targets in position-tracking
//! (`PT`) mode over TCP.

pub mod gimbal;
pub mod protocol;

pub use gimbal::{GalilGimbal, GalilSettings, WriterStats};
pub use protocol::{CountScale, GalilCommand, GalilError, MotionProfile};
