//! Gimbal Tracker CLI
//!
//! Tracks one catalogued satellite with a two-axis mount.
//!
//! Usage:
//!   gimbal-tracker --tle data/stations.tle --target "ISS (ZARYA)" \
//!                  --lat 42.36 --lon -71.09 --alt-m 20 \
//!                  --controller 192.168.0.50:23
//!
//!   gimbal-tracker --tle data/stations.tle --target 25544 --dry-run --max-cycles 30
//!
//!   gimbal-tracker --home --controller 192.168.0.50:23

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use galil_gimbal::{GalilGimbal, GalilSettings, WriterStats};
use gimbal_core::{
    FixedGroundPosition, GimbalActuator, GroundPosition, GroundPositionProvider, JsonLinesTelemetry,
    SetupError, SimulatedGimbal, TracingTelemetry, TrackerConfig, TrackingLoop, TrackingReport,
};
use orbital_mechanics::{PropagatedTarget, TleCatalog};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "gimbal_tracker=info,gimbal_core=info,galil_gimbal=info,orbital_mechanics=info";

#[derive(Parser, Debug)]
#[command(
    name = "gimbal-tracker",
    about = "Track a satellite with a two-axis gimbal"
)]
struct Args {
    /// TLE catalog file (2- or 3-line entries)
    #[arg(long, env = "TLE_FILE", required_unless_present = "home")]
    tle: Option<PathBuf>,

    /// Satellite name or NORAD catalog number
    #[arg(short, long, required_unless_present = "home")]
    target: Option<String>,

    /// Drive the mount to its mechanical zero and exit
    #[arg(long, conflicts_with = "target")]
    home: bool,

    /// Observer latitude, degrees north
    #[arg(long, env = "GS_LAT", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Observer longitude, degrees east
    #[arg(long, env = "GS_LON", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Observer altitude above the ellipsoid, meters
    #[arg(long, env = "GS_ALT_M", default_value_t = 0.0, allow_hyphen_values = true)]
    alt_m: f64,

    /// Tracker configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Galil controller address (host:port)
    #[arg(long, env = "GALIL_ADDR", conflicts_with = "dry_run")]
    controller: Option<String>,

    /// Drive a simulated mount and print per-step telemetry as JSON lines
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many cycles
    #[arg(long)]
    max_cycles: Option<u32>,

    /// Seconds to wait for the mount to reach home
    #[arg(long, default_value_t = 30)]
    home_timeout_s: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn ground_position(&self) -> FixedGroundPosition {
        FixedGroundPosition(match (self.lat, self.lon) {
            (Some(latitude_deg), Some(longitude_deg)) => Some(GroundPosition {
                latitude_deg,
                longitude_deg,
                altitude_m: self.alt_m,
            }),
            _ => None,
        })
    }

    fn galil_settings(&self, config: &TrackerConfig) -> GalilSettings {
        GalilSettings {
            azimuth_limits: config.azimuth_limits,
            elevation_limits: config.elevation_limits,
            ..Default::default()
        }
    }

    fn tracker_config(&self) -> Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_json_file(path)?,
            None => TrackerConfig::default(),
        };
        if self.max_cycles.is_some() {
            config.max_cycles = self.max_cycles;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(DEFAULT_FILTER.replace("=info", "=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Flip the shutdown flag on Ctrl-C.
fn forward_ctrl_c(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                let _ = tx.send(true);
            }
            Err(e) => warn!("cannot listen for Ctrl-C: {}", e),
        }
    });
}

/// Wait for the writer so the release sequence reaches the controller.
async fn await_writer(writer: Option<JoinHandle<WriterStats>>) {
    if let Some(writer) = writer {
        match tokio::time::timeout(Duration::from_secs(5), writer).await {
            Ok(Ok(stats)) => info!(sent = stats.sent, rejected = stats.rejected, "controller link closed"),
            Ok(Err(e)) => warn!("controller writer task failed: {}", e),
            Err(_) => warn!("controller did not confirm release in time"),
        }
    }
}

async fn home(args: &Args, config: &TrackerConfig) -> Result<()> {
    if args.dry_run {
        let mut gimbal = SimulatedGimbal::new();
        gimbal.home()?;
        let (az, el) = gimbal.position();
        info!(az_deg = az, el_deg = el, "simulated mount at home");
        return Ok(());
    }
    let Some(addr) = args.controller.as_deref() else {
        bail!("no controller address: pass --controller ADDR or --dry-run");
    };
    let mut gimbal = GalilGimbal::connect(addr, args.galil_settings(config))
        .await
        .with_context(|| format!("connecting to controller at {}", addr))?;
    let writer = gimbal.take_writer();
    let parked = gimbal
        .park(Duration::from_secs(args.home_timeout_s))
        .await
        .context("homing the mount");
    gimbal.release()?;
    await_writer(writer).await;
    parked?;
    Ok(())
}

fn print_summary(report: &TrackingReport) -> Result<()> {
    info!(
        session = %report.session_id,
        cycles = report.cycles,
        commands = report.commands_sent,
        dispatch_failures = report.dispatch_failures,
        below_cutoff = report.below_cutoff,
        sample_failures = report.sample_failures,
        flip = ?report.final_flip,
        "tracking session finished"
    );
    eprintln!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("{}", "=".repeat(60));
    info!("Gimbal Tracker");
    info!("{}", "=".repeat(60));

    let config = args.tracker_config().context("tracker configuration")?;
    if args.home {
        return home(&args, &config).await;
    }
    let (Some(tle), Some(target)) = (args.tle.as_ref(), args.target.as_deref()) else {
        bail!("--tle and --target are required unless --home is given");
    };

    let observer = args.ground_position().ground_fix()?;
    info!(
        lat = observer.latitude_deg,
        lon = observer.longitude_deg,
        alt_m = observer.altitude_m,
        "ground fix"
    );

    let catalog = TleCatalog::from_file(tle)
        .map_err(SetupError::from)
        .with_context(|| format!("loading {}", tle.display()))?;
    let satellite = catalog.find(target).map_err(SetupError::from)?.clone();
    info!("Tracking {} (NORAD {})", satellite.name, satellite.norad_id);
    let target = PropagatedTarget::new(satellite, observer).map_err(SetupError::from)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    forward_ctrl_c(shutdown_tx);

    let report = if args.dry_run {
        let mut tracker = TrackingLoop::new(&config, target, SimulatedGimbal::new())?
            .with_telemetry(JsonLinesTelemetry::new(std::io::stdout()));
        let report = tracker.run(shutdown_rx).await?;
        let (az, el) = tracker.actuator().position();
        info!(az_deg = az, el_deg = el, "simulated mount final position");
        report
    } else {
        let Some(addr) = args.controller.as_deref() else {
            bail!("no controller address: pass --controller ADDR or --dry-run");
        };
        let mut gimbal = GalilGimbal::connect(addr, args.galil_settings(&config))
            .await
            .with_context(|| format!("connecting to controller at {}", addr))?;
        let writer = gimbal.take_writer();

        let mut tracker =
            TrackingLoop::new(&config, target, gimbal)?.with_telemetry(TracingTelemetry);
        let report = tracker.run(shutdown_rx).await;
        drop(tracker);
        await_writer(writer).await;
        report?
    };

    print_summary(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_position_needs_lat_and_lon() {
        let args = Args::try_parse_from([
            "gimbal-tracker", "--tle", "x.tle", "--target", "ISS", "--lat", "42.5",
            "--lon", "-71.1", "--dry-run",
        ])
        .unwrap();
        let fix = args.ground_position().ground_fix().unwrap();
        assert_eq!(fix.latitude_deg, 42.5);
        assert_eq!(fix.longitude_deg, -71.1);
        assert_eq!(fix.altitude_m, 0.0);

        let partial = Args {
            lon: None,
            ..args
        };
        assert!(matches!(
            partial.ground_position().ground_fix(),
            Err(SetupError::NoGroundFix(_))
        ));
    }

    #[test]
    fn test_controller_conflicts_with_dry_run() {
        let parsed = Args::try_parse_from([
            "gimbal-tracker", "--tle", "x.tle", "--target", "ISS", "--controller",
            "10.0.0.2:23", "--dry-run",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_max_cycles_overrides_config() {
        let args = Args::try_parse_from([
            "gimbal-tracker", "--tle", "x.tle", "--target", "ISS", "--dry-run",
            "--max-cycles", "3",
        ])
        .unwrap();
        let config = args.tracker_config().unwrap();
        assert_eq!(config.max_cycles, Some(3));
        assert_eq!(config.sub_steps, TrackerConfig::default().sub_steps);
    }

    #[test]
    fn test_home_needs_no_target() {
        let args = Args::try_parse_from(["gimbal-tracker", "--home", "--controller", "10.0.0.2:23"])
            .unwrap();
        assert!(args.home);
        assert!(args.tle.is_none() && args.target.is_none());
        assert_eq!(args.home_timeout_s, 30);

        // tracking still needs both
        assert!(Args::try_parse_from(["gimbal-tracker", "--dry-run"]).is_err());
        assert!(Args::try_parse_from([
            "gimbal-tracker", "--home", "--target", "ISS", "--dry-run",
        ])
        .is_err());
    }

    #[tokio::test]
    async fn test_dry_run_home_succeeds() {
        let args = Args::try_parse_from(["gimbal-tracker", "--home", "--dry-run"]).unwrap();
        let config = args.tracker_config().unwrap();
        home(&args, &config).await.unwrap();
    }
}
