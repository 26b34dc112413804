//! Frame Mapper with Hysteresis
//!
//! Converts sky-frame azimuth/elevation into the gimbal's mechanical frame.
//! The mount travels ±90° in azimuth around a fixed zero bearing; targets
//! behind the mount are reached by "flipping": azimuth shifted by 180° and
//! elevation mirrored across the zenith. A dead band between the flip-on and
//! flip-off thresholds keeps the flip from chattering.

use serde::{Deserialize, Serialize};

use crate::angles::wrap_signed_180;
use crate::error::ConfigError;
use crate::source::SkyAngles;

/// Flip state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlipState {
    #[default]
    NotFlipped,
    Flipped,
}

impl FlipState {
    pub fn is_flipped(self) -> bool {
        self == FlipState::Flipped
    }
}

/// Flip thresholds on |relative azimuth|, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hysteresis {
    pub flip_on_deg: f64,
    pub flip_off_deg: f64,
}

impl Hysteresis {
    pub fn new(flip_on_deg: f64, flip_off_deg: f64) -> Result<Self, ConfigError> {
        for t in [flip_on_deg, flip_off_deg] {
            if !(0.0..=180.0).contains(&t) {
                return Err(ConfigError::ThresholdOutOfRange(t));
            }
        }
        if flip_on_deg <= flip_off_deg {
            return Err(ConfigError::HysteresisBand {
                flip_on: flip_on_deg,
                flip_off: flip_off_deg,
            });
        }
        Ok(Self {
            flip_on_deg,
            flip_off_deg,
        })
    }

    /// Next flip state for a relative azimuth in (-180, 180].
    pub fn decide(&self, az_rel_deg: f64, current: FlipState) -> FlipState {
        let magnitude = az_rel_deg.abs();
        match current {
            FlipState::NotFlipped if magnitude > self.flip_on_deg => FlipState::Flipped,
            FlipState::Flipped if magnitude < self.flip_off_deg => FlipState::NotFlipped,
            unchanged => unchanged,
        }
    }
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self {
            flip_on_deg: 92.0,
            flip_off_deg: 88.0,
        }
    }
}

/// Gimbal-frame pointing plus the flip state that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GimbalAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub state: FlipState,
}

/// Map a sky-frame direction into the gimbal frame.
///
/// Not flipped: zenith is 0° and the horizon ±90° in elevation. Flipped: the
/// relative azimuth moves to the complementary half-plane and elevation is
/// mirrored (`90 - el`).
pub fn map_to_gimbal_frame(
    az_sky_deg: f64,
    el_sky_deg: f64,
    az_zero_deg: f64,
    current: FlipState,
    hysteresis: &Hysteresis,
) -> GimbalAngles {
    let mut az_rel = wrap_signed_180(az_sky_deg - az_zero_deg);
    let state = hysteresis.decide(az_rel, current);

    let elevation_deg = match state {
        FlipState::Flipped => {
            az_rel += if az_rel >= 0.0 { -180.0 } else { 180.0 };
            90.0 - el_sky_deg
        }
        FlipState::NotFlipped => el_sky_deg - 90.0,
    };

    GimbalAngles {
        azimuth_deg: az_rel,
        elevation_deg,
        state,
    }
}

/// Stateful mapper. Owns the one piece of state that outlives a cycle.
#[derive(Debug, Clone)]
pub struct FrameMapper {
    hysteresis: Hysteresis,
    az_zero_deg: f64,
    state: FlipState,
}

impl FrameMapper {
    pub fn new(hysteresis: Hysteresis, az_zero_deg: f64) -> Self {
        Self {
            hysteresis,
            az_zero_deg,
            state: FlipState::NotFlipped,
        }
    }

    pub fn map(&mut self, sky: SkyAngles) -> GimbalAngles {
        let mapped = map_to_gimbal_frame(
            sky.azimuth_deg,
            sky.elevation_deg,
            self.az_zero_deg,
            self.state,
            &self.hysteresis,
        );
        if mapped.state != self.state {
            tracing::info!(
                from = ?self.state,
                to = ?mapped.state,
                az_sky = sky.azimuth_deg,
                "gimbal flip transition"
            );
        }
        self.state = mapped.state;
        mapped
    }

    pub fn state(&self) -> FlipState {
        self.state
    }

    pub fn az_zero_deg(&self) -> f64 {
        self.az_zero_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band() -> Hysteresis {
        Hysteresis::new(92.0, 88.0).unwrap()
    }

    #[test]
    fn test_hysteresis_dead_band() {
        let h = band();
        let inputs = [80.0, 89.0, 91.0, 93.0, 90.0, 87.0, 86.0];
        let mut state = FlipState::NotFlipped;
        let states: Vec<FlipState> = inputs
            .iter()
            .map(|&az| {
                state = h.decide(az, state);
                state
            })
            .collect();

        use FlipState::*;
        assert_eq!(
            states,
            vec![NotFlipped, NotFlipped, NotFlipped, Flipped, Flipped, NotFlipped, NotFlipped]
        );
    }

    #[test]
    fn test_hysteresis_thresholds_are_strict() {
        let h = band();
        assert_eq!(h.decide(92.0, FlipState::NotFlipped), FlipState::NotFlipped);
        assert_eq!(h.decide(-92.5, FlipState::NotFlipped), FlipState::Flipped);
        assert_eq!(h.decide(88.0, FlipState::Flipped), FlipState::Flipped);
        assert_eq!(h.decide(-87.9, FlipState::Flipped), FlipState::NotFlipped);
    }

    #[test]
    fn test_no_chatter_inside_band() {
        let h = band();
        for start in [FlipState::NotFlipped, FlipState::Flipped] {
            let mut state = start;
            for az in [89.0, 91.0, 89.5, 90.5, -89.0, -91.0, 90.0] {
                state = h.decide(az, state);
                assert_eq!(state, start);
            }
        }
    }

    #[test]
    fn test_invalid_band_rejected() {
        assert!(matches!(
            Hysteresis::new(88.0, 92.0),
            Err(ConfigError::HysteresisBand { .. })
        ));
        assert!(Hysteresis::new(90.0, 90.0).is_err());
        assert!(matches!(
            Hysteresis::new(181.0, 10.0),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn test_flip_mapping_behind_mount() {
        let out = map_to_gimbal_frame(175.0, 30.0, 0.0, FlipState::NotFlipped, &band());
        assert_eq!(out.state, FlipState::Flipped);
        assert!((out.azimuth_deg - -5.0).abs() < 1e-9);
        assert!((out.elevation_deg - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_flip_mapping_negative_side() {
        let out = map_to_gimbal_frame(185.0, 10.0, 0.0, FlipState::NotFlipped, &band());
        // az_rel = -175 -> +5 after the shift
        assert_eq!(out.state, FlipState::Flipped);
        assert!((out.azimuth_deg - 5.0).abs() < 1e-9);
        assert!((out.elevation_deg - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_direct_mapping_in_front() {
        let out = map_to_gimbal_frame(30.0, 45.0, 20.0, FlipState::NotFlipped, &band());
        assert_eq!(out.state, FlipState::NotFlipped);
        assert!((out.azimuth_deg - 10.0).abs() < 1e-9);
        assert!((out.elevation_deg - -45.0).abs() < 1e-9);

        let zenith = map_to_gimbal_frame(0.0, 90.0, 0.0, FlipState::NotFlipped, &band());
        assert_eq!(zenith.elevation_deg, 0.0);
    }

    #[test]
    fn test_azimuth_zero_wraps() {
        // zero bearing at 350°, target at 10° is 20° right of zero
        let out = map_to_gimbal_frame(10.0, 45.0, 350.0, FlipState::NotFlipped, &band());
        assert!((out.azimuth_deg - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_mapper_keeps_state_across_calls() {
        let mut mapper = FrameMapper::new(band(), 0.0);
        assert_eq!(mapper.state(), FlipState::NotFlipped);

        mapper.map(SkyAngles::new(100.0, 20.0));
        assert_eq!(mapper.state(), FlipState::Flipped);

        // inside the dead band: stays flipped, still mirrored
        let out = mapper.map(SkyAngles::new(90.0, 20.0));
        assert_eq!(out.state, FlipState::Flipped);
        assert!((out.azimuth_deg - -90.0).abs() < 1e-9);
        assert!((out.elevation_deg - 70.0).abs() < 1e-9);

        mapper.map(SkyAngles::new(45.0, 20.0));
        assert_eq!(mapper.state(), FlipState::NotFlipped);
    }
}
