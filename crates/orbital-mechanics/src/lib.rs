//! Orbital Mechanics Library
//!
//! TLE catalog lookup, SGP4 propagation and topocentric look angles. Feeds
//! the tracking engine through [`PropagatedTarget`], an
//! [`OrbitalSource`](gimbal_core::OrbitalSource) for one satellite seen from
//! one ground position.

use chrono::{DateTime, Utc};
use gimbal_core::{GroundPosition, OrbitalSource, SetupError, SkyAngles, SourceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalog;

pub use catalog::TleCatalog;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Target not found in catalog: {0}")]
    TargetNotFound(String),
    #[error("Catalog unreadable: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

impl From<OrbitalError> for SetupError {
    fn from(e: OrbitalError) -> Self {
        match e {
            OrbitalError::TargetNotFound(q) => SetupError::TargetNotFound(q),
            OrbitalError::InvalidCoordinates(msg) => SetupError::NoGroundFix(msg),
            other => SetupError::MissingOrbitalData(other.to_string()),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    pub norad_id: u32,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub epoch: DateTime<Utc>,
}

/// Azimuth/elevation/range from an observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
}

impl Satellite {
    pub fn elements(&self) -> Result<sgp4::Elements> {
        sgp4::Elements::from_tle(
            Some(self.name.clone()),
            self.tle_line1.as_bytes(),
            self.tle_line2.as_bytes(),
        )
        .map_err(|e| OrbitalError::InvalidTle(format!("{:?}", e)))
    }

    /// TEME state at `time`.
    pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector> {
        propagation::sgp4_propagate(&self.tle_line1, &self.tle_line2, time)
    }
}

pub mod propagation {
    use super::*;

    pub(crate) fn prepare(elements: &sgp4::Elements) -> Result<(sgp4::Constants, DateTime<Utc>)> {
        let constants = sgp4::Constants::from_elements(elements)
            .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;
        let epoch_utc = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);
        Ok((constants, epoch_utc))
    }

    pub(crate) fn propagate_with(
        constants: &sgp4::Constants,
        epoch_utc: DateTime<Utc>,
        time: DateTime<Utc>,
    ) -> Result<StateVector> {
        let duration = time.signed_duration_since(epoch_utc);
        // sub-second resolution matters at a few-second sample window
        let minutes_since_epoch = duration.num_milliseconds() as f64 / 60_000.0;

        let prediction = constants
            .propagate(minutes_since_epoch)
            .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

        Ok(StateVector {
            position_x: prediction.position[0],
            position_y: prediction.position[1],
            position_z: prediction.position[2],
            velocity_x: prediction.velocity[0],
            velocity_y: prediction.velocity[1],
            velocity_z: prediction.velocity[2],
            epoch: time,
        })
    }

    pub fn sgp4_propagate(
        tle_line1: &str,
        tle_line2: &str,
        time: DateTime<Utc>,
    ) -> Result<StateVector> {
        let elements = sgp4::Elements::from_tle(None, tle_line1.as_bytes(), tle_line2.as_bytes())
            .map_err(|e| OrbitalError::InvalidTle(format!("{:?}", e)))?;
        let (constants, epoch_utc) = prepare(&elements)?;
        propagate_with(&constants, epoch_utc, time)
    }
}

pub mod transforms {
    use super::*;
    use nalgebra::{Matrix3, Rotation3, Vector3};
    use std::f64::consts::TAU;

    const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
    const SECONDS_PER_DAY: f64 = 86_400.0;

    /// Greenwich mean sidereal time (IAU-82), radians in [0, 2π).
    pub fn gmst_rad(time: DateTime<Utc>) -> f64 {
        let unix_s = time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1e6;
        let jd = unix_s / SECONDS_PER_DAY + 2_440_587.5;
        let t = (jd - 2_451_545.0) / 36_525.0;
        let gmst_s = 67_310.548_41
            + (876_600.0 * 3600.0 + 8_640_184.812_866) * t
            + 0.093_104 * t * t
            - 6.2e-6 * t * t * t;
        gmst_s.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_DAY * TAU
    }

    /// Rotate a TEME position into Earth-fixed coordinates (polar motion ignored).
    pub fn teme_to_ecef(teme_km: Vector3<f64>, time: DateTime<Utc>) -> Vector3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), -gmst_rad(time)) * teme_km
    }

    /// WGS-84 geodetic position to ECEF, km.
    pub fn geodetic_to_ecef(pos: &GroundPosition) -> Result<Vector3<f64>> {
        if pos.validate().is_err() {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "{}, {}",
                pos.latitude_deg, pos.longitude_deg
            )));
        }
        let lat = pos.latitude_deg.to_radians();
        let lon = pos.longitude_deg.to_radians();
        let alt_km = pos.altitude_m / 1000.0;

        let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
        let n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();

        Ok(Vector3::new(
            (n + alt_km) * lat.cos() * lon.cos(),
            (n + alt_km) * lat.cos() * lon.sin(),
            (n * (1.0 - e2) + alt_km) * lat.sin(),
        ))
    }

    /// ECEF -> local East-North-Up rotation at the observer.
    fn enu_rotation(pos: &GroundPosition) -> Matrix3<f64> {
        let (sin_lat, cos_lat) = pos.latitude_deg.to_radians().sin_cos();
        let (sin_lon, cos_lon) = pos.longitude_deg.to_radians().sin_cos();
        Matrix3::new(
            -sin_lon, cos_lon, 0.0,
            -sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat,
            cos_lat * cos_lon, cos_lat * sin_lon, sin_lat,
        )
    }

    /// Look angles from `observer` to an Earth-fixed point.
    pub fn look_angles(observer: &GroundPosition, target_ecef_km: Vector3<f64>) -> Result<LookAngles> {
        let range = target_ecef_km - geodetic_to_ecef(observer)?;
        let enu = enu_rotation(observer) * range;
        let (east, north, up) = (enu.x, enu.y, enu.z);

        // Azimuth from north, clockwise
        let azimuth_deg = gimbal_core::angles::wrap_unsigned_360(east.atan2(north).to_degrees());
        let elevation_deg = up.atan2(east.hypot(north)).to_degrees();

        Ok(LookAngles {
            azimuth_deg,
            elevation_deg,
            range_km: range.norm(),
        })
    }
}

/// A single satellite as seen from a fixed ground position.
///
/// Element parsing and SGP4 initialisation happen once, here; each
/// [`OrbitalSource::sky_position`] call only propagates.
pub struct PropagatedTarget {
    satellite: Satellite,
    observer: GroundPosition,
    constants: sgp4::Constants,
    epoch: DateTime<Utc>,
}

impl PropagatedTarget {
    pub fn new(satellite: Satellite, observer: GroundPosition) -> Result<Self> {
        transforms::geodetic_to_ecef(&observer)?;
        let elements = satellite.elements()?;
        let (constants, epoch) = propagation::prepare(&elements)?;
        tracing::info!(
            target = %satellite.name,
            norad = satellite.norad_id,
            epoch = %epoch,
            "orbital elements loaded"
        );
        Ok(Self {
            satellite,
            observer,
            constants,
            epoch,
        })
    }

    pub fn satellite(&self) -> &Satellite {
        &self.satellite
    }

    /// Element set epoch.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    pub fn look_angles(&self, at: DateTime<Utc>) -> Result<LookAngles> {
        let state = propagation::propagate_with(&self.constants, self.epoch, at)?;
        let teme = nalgebra::Vector3::new(state.position_x, state.position_y, state.position_z);
        transforms::look_angles(&self.observer, transforms::teme_to_ecef(teme, at))
    }
}

impl OrbitalSource for PropagatedTarget {
    fn sky_position(&self, at: DateTime<Utc>) -> std::result::Result<SkyAngles, SourceError> {
        let look = self.look_angles(at).map_err(|e| match e {
            OrbitalError::PropagationFailed(msg) => SourceError::Propagation(msg),
            other => SourceError::OutOfRange(other.to_string()),
        })?;
        Ok(SkyAngles::new(look.azimuth_deg, look.elevation_deg))
    }
}
