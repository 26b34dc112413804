//! Per-sub-step telemetry.
//!
//! Records what the loop saw and what it commanded. How records are shown or
//! stored is up to the sink.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::frame::FlipState;
use crate::source::SkyAngles;

/// What happened to a sub-step's command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Dispatched,
    BelowCutoff,
    DispatchFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSample {
    pub cycle: u64,
    pub sub_step: u32,
    /// Seconds from cycle start
    pub offset_s: f64,
    pub sky: SkyAngles,
    /// Clamped gimbal azimuth, absent when nothing was mapped
    pub gimbal_az_deg: Option<f64>,
    pub gimbal_el_deg: Option<f64>,
    pub flip: FlipState,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

pub trait TelemetrySink {
    fn record(&mut self, sample: &TrackingSample);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&mut self, _sample: &TrackingSample) {}
}

impl TelemetrySink for Vec<TrackingSample> {
    fn record(&mut self, sample: &TrackingSample) {
        self.push(sample.clone());
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for &mut T {
    fn record(&mut self, sample: &TrackingSample) {
        (**self).record(sample)
    }
}

/// Emits each sample as a debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&mut self, s: &TrackingSample) {
        debug!(
            cycle = s.cycle,
            step = s.sub_step,
            az_sky = s.sky.azimuth_deg,
            el_sky = s.sky.elevation_deg,
            az_gim = ?s.gimbal_az_deg,
            el_gim = ?s.gimbal_el_deg,
            flip = ?s.flip,
            outcome = ?s.outcome,
            "sub-step"
        );
    }
}

/// One JSON object per line, for dry-run displays and log capture.
pub struct JsonLinesTelemetry<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesTelemetry<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TelemetrySink for JsonLinesTelemetry<W> {
    fn record(&mut self, sample: &TrackingSample) {
        let written = serde_json::to_writer(&mut self.writer, sample)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if let Err(e) = written {
            warn!("telemetry write failed: {}", e);
        }
    }
}
