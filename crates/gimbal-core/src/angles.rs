//! Angle Utilities
//!
//! Degree wrapping, shortest-path unwrapping for short sample windows, and
//! soft-limit clamping with a fence margin.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Map any degree value into (-180, 180].
pub fn wrap_signed_180(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Map any degree value into [0, 360).
pub fn wrap_unsigned_360(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Signed shortest-path delta from `from` to `to`, in (-180, 180].
pub fn shortest_delta(from_deg: f64, to_deg: f64) -> f64 {
    wrap_signed_180(to_deg - from_deg)
}

/// Unwrap a short run of raw angles so consecutive values never jump by more
/// than 180° across the 0/360 seam.
///
/// The first element is placed at the shortest-path offset from `reference`,
/// each following element at the shortest-path offset from its predecessor.
///
/// ```
/// use gimbal_core::angles::unwrap_shortest;
/// let out = unwrap_shortest(&[359.0, 1.0, 3.0], 359.0);
/// assert_eq!(out, vec![359.0, 361.0, 363.0]);
/// ```
pub fn unwrap_shortest(sequence: &[f64], reference_deg: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(sequence.len());
    let mut prev_raw = reference_deg;
    let mut prev_unwrapped = reference_deg;
    for &raw in sequence {
        let next = prev_unwrapped + shortest_delta(prev_raw, raw);
        out.push(next);
        prev_raw = raw;
        prev_unwrapped = next;
    }
    out
}

/// Restrict `value` to `[min + fence, max - fence]`.
///
/// Fails only when the fenced range is empty. The tracking loop validates its
/// limits once through [`FencedRange::new`] and clamps with the total
/// [`FencedRange::clamp`] afterwards.
pub fn clamp_with_fence(value: f64, min: f64, max: f64, fence: f64) -> Result<f64, ConfigError> {
    FencedRange::new("axis", min, max, fence).map(|range| range.clamp(value))
}

/// Mechanical soft limits for one axis, in gimbal-frame degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl AxisLimits {
    pub const fn new(min_deg: f64, max_deg: f64) -> Self {
        Self { min_deg, max_deg }
    }
}

impl Default for AxisLimits {
    fn default() -> Self {
        // ±90° travel either side of the mechanical zero
        Self::new(-90.0, 90.0)
    }
}

/// A validated, non-empty clamping range with the fence already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FencedRange {
    lo: f64,
    hi: f64,
}

impl FencedRange {
    pub fn new(axis: &'static str, min: f64, max: f64, fence: f64) -> Result<Self, ConfigError> {
        if !fence.is_finite() || fence < 0.0 {
            return Err(ConfigError::InvalidFence(fence));
        }
        let lo = min + fence;
        let hi = max - fence;
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return Err(ConfigError::DegenerateLimits {
                axis,
                min,
                max,
                fence,
            });
        }
        Ok(Self { lo, hi })
    }

    pub fn from_limits(axis: &'static str, limits: AxisLimits, fence: f64) -> Result<Self, ConfigError> {
        Self::new(axis, limits.min_deg, limits.max_deg, fence)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.lo..=self.hi).contains(&value)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }
}
