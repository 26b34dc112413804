//! Orbital source and ground reference capabilities.
//!
//! The engine only needs "where is the target at time t" and, once at
//! startup, "where am I". Propagation and positioning live in adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SetupError, SourceError};

/// Sky-frame direction: azimuth from true north, elevation from the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

impl SkyAngles {
    pub const fn new(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self {
            azimuth_deg,
            elevation_deg,
        }
    }
}

/// Observer position on the WGS-84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl GroundPosition {
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(-90.0..=90.0).contains(&self.latitude_deg) {
            return Err(SetupError::NoGroundFix(format!(
                "latitude {} out of range",
                self.latitude_deg
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude_deg) {
            return Err(SetupError::NoGroundFix(format!(
                "longitude {} out of range",
                self.longitude_deg
            )));
        }
        if !self.altitude_m.is_finite() {
            return Err(SetupError::NoGroundFix("altitude not finite".into()));
        }
        Ok(())
    }
}

/// Target position as seen from a fixed ground reference.
pub trait OrbitalSource {
    /// Azimuth in [0, 360), elevation in [-90, 90], at `at`.
    fn sky_position(&self, at: DateTime<Utc>) -> Result<SkyAngles, SourceError>;
}

impl<S: OrbitalSource + ?Sized> OrbitalSource for &S {
    fn sky_position(&self, at: DateTime<Utc>) -> Result<SkyAngles, SourceError> {
        (**self).sky_position(at)
    }
}

impl<S: OrbitalSource + ?Sized> OrbitalSource for Box<S> {
    fn sky_position(&self, at: DateTime<Utc>) -> Result<SkyAngles, SourceError> {
        (**self).sky_position(at)
    }
}

/// Startup-only ground reference. No fix is fatal.
pub trait GroundPositionProvider {
    fn ground_fix(&self) -> Result<GroundPosition, SetupError>;
}

/// Surveyed or operator-entered coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FixedGroundPosition(pub Option<GroundPosition>);

impl GroundPositionProvider for FixedGroundPosition {
    fn ground_fix(&self) -> Result<GroundPosition, SetupError> {
        let position = self
            .0
            .ok_or_else(|| SetupError::NoGroundFix("no coordinates configured".into()))?;
        position.validate()?;
        Ok(position)
    }
}
