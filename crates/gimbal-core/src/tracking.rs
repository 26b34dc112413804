//! Tracking Loop
//!
//! Samples the orbital source at the start, middle and end of each update
//! interval, fits monotone curves through both angle series, and walks the
//! curve in fixed sub-steps: map to the gimbal frame, clamp, dispatch, sleep.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actuator::{ActuatorSession, GimbalActuator, GimbalCommand};
use crate::angles::{unwrap_shortest, wrap_unsigned_360};
use crate::config::{TrackerConfig, ValidatedConfig};
use crate::error::{ConfigError, InterpolationError, SetupError, TrackingError};
use crate::frame::{FlipState, FrameMapper};
use crate::interpolate::MonotoneCubic;
use crate::source::{OrbitalSource, SkyAngles};
use crate::telemetry::{NullTelemetry, StepOutcome, TelemetrySink, TrackingSample};

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    Idle,
    Tracking,
    Stopped,
}

/// One evaluated sub-step of a cycle, sky frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclePoint {
    pub sub_step: u32,
    pub offset_s: f64,
    pub sky: SkyAngles,
}

/// Dense sky-frame trajectory for one update interval.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    azimuth: MonotoneCubic,
    elevation: MonotoneCubic,
    points: Vec<CyclePoint>,
}

impl CyclePlan {
    pub fn points(&self) -> &[CyclePoint] {
        &self.points
    }

    /// Unwrapped azimuth curve (degrees may leave [0, 360)).
    pub fn azimuth(&self) -> &MonotoneCubic {
        &self.azimuth
    }

    pub fn elevation(&self) -> &MonotoneCubic {
        &self.elevation
    }
}

/// Build the sub-step trajectory from start, midpoint and end samples.
///
/// Azimuth is unwrapped against the start sample so a pass across north
/// interpolates through 360° instead of swinging back through 180°. Offsets
/// run `k * interval / sub_steps` for `k = 0..=sub_steps`.
pub fn plan_cycle(
    samples: [SkyAngles; 3],
    interval_s: f64,
    sub_steps: u32,
) -> Result<CyclePlan, InterpolationError> {
    let x = vec![0.0, interval_s / 2.0, interval_s];

    let elevation = MonotoneCubic::new(x.clone(), samples.map(|s| s.elevation_deg).to_vec())?;

    let raw_az = samples.map(|s| s.azimuth_deg);
    let azimuth = MonotoneCubic::new(x, unwrap_shortest(&raw_az, raw_az[0]))?;

    let steps = sub_steps.max(1);
    let points = (0..=steps)
        .map(|k| {
            // the last offset must land on the end knot exactly
            let offset_s = if k == steps {
                interval_s
            } else {
                (interval_s * f64::from(k) / f64::from(steps)).min(interval_s)
            };
            Ok(CyclePoint {
                sub_step: k,
                offset_s,
                sky: SkyAngles::new(
                    wrap_unsigned_360(azimuth.evaluate(offset_s)?),
                    elevation.evaluate(offset_s)?,
                ),
            })
        })
        .collect::<Result<Vec<_>, InterpolationError>>()?;

    Ok(CyclePlan {
        azimuth,
        elevation,
        points,
    })
}

/// Session summary returned when the loop stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingReport {
    pub session_id: Uuid,
    /// Cycles started, including ones skipped for lack of samples
    pub cycles: u64,
    pub commands_sent: u64,
    pub dispatch_failures: u64,
    pub below_cutoff: u64,
    pub sample_failures: u64,
    pub final_flip: FlipState,
}

impl TrackingReport {
    fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            cycles: 0,
            commands_sent: 0,
            dispatch_failures: 0,
            below_cutoff: 0,
            sample_failures: 0,
            final_flip: FlipState::NotFlipped,
        }
    }
}

fn chrono_offset(d: Duration) -> chrono::Duration {
    chrono::Duration::microseconds(d.as_micros() as i64)
}

/// Outcome of a pacing sleep
enum Pace {
    Elapsed,
    Cancelled,
}

async fn pace(deadline: Instant, shutdown: &mut watch::Receiver<bool>) -> Pace {
    if *shutdown.borrow() {
        return Pace::Cancelled;
    }
    tokio::select! {
        _ = sleep_until(deadline) => Pace::Elapsed,
        changed = shutdown.changed() => {
            if changed.is_err() {
                // sender gone: nobody can cancel any more
                sleep_until(deadline).await;
                return Pace::Elapsed;
            }
            if *shutdown.borrow() {
                Pace::Cancelled
            } else {
                sleep_until(deadline).await;
                Pace::Elapsed
            }
        }
    }
}

pub struct TrackingLoop<S, A, T = NullTelemetry>
where
    S: OrbitalSource,
    A: GimbalActuator,
    T: TelemetrySink,
{
    config: ValidatedConfig,
    source: S,
    session: ActuatorSession<A>,
    mapper: FrameMapper,
    telemetry: T,
    state: TrackingState,
    report: TrackingReport,
}

impl<S, A> TrackingLoop<S, A, NullTelemetry>
where
    S: OrbitalSource,
    A: GimbalActuator,
{
    pub fn new(config: &TrackerConfig, source: S, actuator: A) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self {
            mapper: FrameMapper::new(config.hysteresis, config.az_zero_deg),
            config,
            source,
            session: ActuatorSession::new(actuator),
            telemetry: NullTelemetry,
            state: TrackingState::Idle,
            report: TrackingReport::new(),
        })
    }
}

impl<S, A, T> TrackingLoop<S, A, T>
where
    S: OrbitalSource,
    A: GimbalActuator,
    T: TelemetrySink,
{
    pub fn with_telemetry<U: TelemetrySink>(self, telemetry: U) -> TrackingLoop<S, A, U> {
        TrackingLoop {
            config: self.config,
            source: self.source,
            session: self.session,
            mapper: self.mapper,
            telemetry,
            state: self.state,
            report: self.report,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn flip_state(&self) -> FlipState {
        self.mapper.state()
    }

    pub fn report(&self) -> &TrackingReport {
        &self.report
    }

    pub fn actuator(&self) -> &A {
        self.session.actuator()
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    /// Run until cancelled, the cycle limit is reached, or setup fails.
    ///
    /// The actuator is released exactly once on every exit path. If the run
    /// future is abandoned mid-cycle, dropping the loop releases it through
    /// the session guard.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<TrackingReport, TrackingError> {
        if self.state == TrackingState::Stopped {
            warn!(session = %self.report.session_id, "run called on a stopped loop");
            return Ok(self.report.clone());
        }

        let epoch = Instant::now();
        let epoch_utc = Utc::now();
        info!(
            session = %self.report.session_id,
            interval_s = self.config.interval.as_secs_f64(),
            sub_steps = self.config.sub_steps,
            "tracking session starting"
        );

        if let Err(e) = self.source.sky_position(epoch_utc) {
            self.stop();
            return Err(SetupError::MissingOrbitalData(e.to_string()).into());
        }

        self.state = TrackingState::Tracking;
        self.track(&mut shutdown, epoch, epoch_utc).await;
        self.stop();
        Ok(self.report.clone())
    }

    async fn track(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        epoch: Instant,
        epoch_utc: DateTime<Utc>,
    ) {
        let interval = self.config.interval;
        let mut deadline = epoch;

        loop {
            if *shutdown.borrow() {
                info!("cancellation observed at cycle boundary");
                return;
            }
            if let Some(max) = self.config.max_cycles {
                if self.report.cycles >= u64::from(max) {
                    info!(cycles = self.report.cycles, "cycle limit reached");
                    return;
                }
            }

            let cycle = self.report.cycles;
            self.report.cycles += 1;

            let cycle_utc = epoch_utc + chrono_offset(deadline - epoch);
            let plan = match self.sample_cycle(cycle_utc) {
                Ok(plan) => plan,
                Err(reason) => {
                    warn!(cycle, "skipping cycle: {}", reason);
                    self.report.sample_failures += 1;
                    deadline += interval;
                    match pace(deadline, shutdown).await {
                        Pace::Elapsed => continue,
                        Pace::Cancelled => return,
                    }
                }
            };

            for point in plan.points() {
                if *shutdown.borrow() {
                    info!(cycle, step = point.sub_step, "cancellation observed mid-cycle");
                    return;
                }
                self.step(cycle, point);
                deadline += self.config.sub_step;
                if let Pace::Cancelled = pace(deadline, shutdown).await {
                    return;
                }
            }
        }
    }

    fn sample_cycle(&self, start: DateTime<Utc>) -> Result<CyclePlan, String> {
        let interval = self.config.interval;
        let times = [start, start + chrono_offset(interval / 2), start + chrono_offset(interval)];

        let mut samples = [SkyAngles::new(0.0, 0.0); 3];
        for (slot, at) in samples.iter_mut().zip(times) {
            *slot = self.source.sky_position(at).map_err(|e| e.to_string())?;
        }
        debug!(?samples, "cycle knots");

        plan_cycle(samples, interval.as_secs_f64(), self.config.sub_steps).map_err(|e| e.to_string())
    }

    /// Execute one sub-step: cutoff check, frame mapping, clamp, dispatch.
    ///
    /// Below the cutoff the frame mapper is not consulted, so flip state only
    /// changes on sub-steps that would command the mount.
    pub fn step(&mut self, cycle: u64, point: &CyclePoint) -> StepOutcome {
        let mut sample = TrackingSample {
            cycle,
            sub_step: point.sub_step,
            offset_s: point.offset_s,
            sky: point.sky,
            gimbal_az_deg: None,
            gimbal_el_deg: None,
            flip: self.mapper.state(),
            outcome: StepOutcome::BelowCutoff,
        };

        if point.sky.elevation_deg < self.config.elevation_cutoff_deg {
            self.report.below_cutoff += 1;
            self.telemetry.record(&sample);
            return sample.outcome;
        }

        let mapped = self.mapper.map(point.sky);
        let command = GimbalCommand::absolute(
            self.config.azimuth_range.clamp(mapped.azimuth_deg),
            self.config.elevation_range.clamp(mapped.elevation_deg),
        );
        sample.gimbal_az_deg = Some(command.azimuth_deg);
        sample.gimbal_el_deg = Some(command.elevation_deg);
        sample.flip = mapped.state;

        sample.outcome = match self.session.steer(&command) {
            Ok(()) => {
                self.report.commands_sent += 1;
                StepOutcome::Dispatched
            }
            Err(e) => {
                warn!(cycle, step = point.sub_step, "dispatch failed: {}", e);
                self.report.dispatch_failures += 1;
                StepOutcome::DispatchFailed {
                    reason: e.to_string(),
                }
            }
        };
        self.telemetry.record(&sample);
        sample.outcome
    }

    fn stop(&mut self) {
        self.session.release();
        self.state = TrackingState::Stopped;
        self.report.final_flip = self.mapper.state();
        info!(
            session = %self.report.session_id,
            cycles = self.report.cycles,
            sent = self.report.commands_sent,
            failed = self.report.dispatch_failures,
            "tracking session stopped"
        );
    }
}
