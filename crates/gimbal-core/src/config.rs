//! Tracking session configuration.
//!
//! Immutable once a loop is built. Loaded from JSON with every field
//! optional; missing fields take the mount defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::angles::{AxisLimits, FencedRange};
use crate::error::ConfigError;
use crate::frame::Hysteresis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between orbital resamples
    pub update_interval_s: f64,
    /// Sub-steps per interval (n + 1 commands per cycle, both ends included)
    pub sub_steps: u32,
    /// No command is issued while the target is below this sky elevation
    pub elevation_cutoff_deg: f64,
    /// Sky azimuth of the mount's mechanical zero
    pub az_zero_deg: f64,
    pub flip_on_deg: f64,
    pub flip_off_deg: f64,
    pub azimuth_limits: AxisLimits,
    pub elevation_limits: AxisLimits,
    /// Safety margin kept inside each soft limit
    pub fence_deg: f64,
    /// Stop after this many cycles have started, skipped ones included
    pub max_cycles: Option<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            update_interval_s: 2.0,
            sub_steps: 10,
            elevation_cutoff_deg: 0.0,
            az_zero_deg: 0.0,
            flip_on_deg: 92.0,
            flip_off_deg: 88.0,
            azimuth_limits: AxisLimits::default(),
            elevation_limits: AxisLimits::default(),
            fence_deg: 0.5,
            max_cycles: None,
        }
    }
}

/// Derived values every cycle needs, produced by [`TrackerConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedConfig {
    pub interval: Duration,
    pub sub_steps: u32,
    pub sub_step: Duration,
    pub elevation_cutoff_deg: f64,
    pub az_zero_deg: f64,
    pub hysteresis: Hysteresis,
    pub azimuth_range: FencedRange,
    pub elevation_range: FencedRange,
    pub max_cycles: Option<u32>,
}

impl TrackerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if !(self.update_interval_s.is_finite() && self.update_interval_s > 0.0) {
            return Err(ConfigError::InvalidInterval(self.update_interval_s));
        }
        if self.sub_steps == 0 {
            return Err(ConfigError::ZeroSubSteps);
        }
        if !self.az_zero_deg.is_finite() {
            return Err(ConfigError::InvalidZeroBearing(self.az_zero_deg));
        }
        if !(-90.0..=90.0).contains(&self.elevation_cutoff_deg) {
            return Err(ConfigError::CutoffOutOfRange(self.elevation_cutoff_deg));
        }
        if self.max_cycles == Some(0) {
            return Err(ConfigError::ZeroCycleLimit);
        }
        let hysteresis = Hysteresis::new(self.flip_on_deg, self.flip_off_deg)?;
        let azimuth_range =
            FencedRange::from_limits("azimuth", self.azimuth_limits, self.fence_deg)?;
        let elevation_range =
            FencedRange::from_limits("elevation", self.elevation_limits, self.fence_deg)?;

        let interval = Duration::try_from_secs_f64(self.update_interval_s)
            .map_err(|_| ConfigError::InvalidInterval(self.update_interval_s))?;
        let sub_step = interval / self.sub_steps;
        if sub_step.is_zero() {
            return Err(ConfigError::InvalidInterval(self.update_interval_s));
        }
        Ok(ValidatedConfig {
            interval,
            sub_steps: self.sub_steps,
            sub_step,
            elevation_cutoff_deg: self.elevation_cutoff_deg,
            az_zero_deg: self.az_zero_deg,
            hysteresis,
            azimuth_range,
            elevation_range,
            max_cycles: self.max_cycles,
        })
    }
}
