use std::time::Duration;

use gimbal_core::{AxisLimits, DispatchError, GimbalActuator, GimbalCommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{
    parse_position, parse_response, CountScale, GalilCommand, GalilError, MotionProfile, Result,
};

/// Controller connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalilSettings {
    pub scale: CountScale,
    pub profile: MotionProfile,
    pub azimuth_limits: AxisLimits,
    pub elevation_limits: AxisLimits,
    /// Absolute updates closer than this to the last one sent are dropped
    pub deadband_counts: i64,
    pub queue_depth: usize,
    pub response_timeout_ms: u64,
    /// Define the current position as 0,0 during setup
    pub zero_on_connect: bool,
}

impl Default for GalilSettings {
    fn default() -> Self {
        Self {
            scale: CountScale::default(),
            profile: MotionProfile::default(),
            azimuth_limits: AxisLimits::default(),
            elevation_limits: AxisLimits::default(),
            deadband_counts: 6,
            queue_depth: 32,
            response_timeout_ms: 2_000,
            zero_on_connect: true,
        }
    }
}

/// Totals reported by the writer task when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub sent: u64,
    pub rejected: u64,
}

/// Work handed to the writer task.
enum WriterRequest {
    Send(GalilCommand),
    /// Poll `TP` until both axes are within `tolerance` counts of `target`.
    Settle {
        target: (i64, i64),
        tolerance: i64,
        timeout: Duration,
        done: oneshot::Sender<Result<(i64, i64)>>,
    },
}

const SETTLE_POLL: Duration = Duration::from_millis(50);
const SETTLE_TOLERANCE_COUNTS: i64 = 30;

/// One request/response exchange at a time over a byte stream.
struct ControllerLink<T> {
    stream: BufStream<T>,
    timeout: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin> ControllerLink<T> {
    fn new(stream: T, timeout: Duration) -> Self {
        Self {
            stream: BufStream::new(stream),
            timeout,
        }
    }

    /// Send one command. A rejection is followed by `TC 1` so the error
    /// carries the controller's reason.
    async fn command(&mut self, command: &GalilCommand) -> Result<String> {
        match self.timed(command).await {
            Err(GalilError::Rejected { command: text, .. }) if *command != GalilCommand::TellCode => {
                let code = match self.timed(&GalilCommand::TellCode).await {
                    Ok(code) if !code.is_empty() => Some(code),
                    Ok(_) => None,
                    Err(e) => {
                        debug!("error code unavailable: {}", e);
                        None
                    }
                };
                Err(GalilError::Rejected {
                    command: text,
                    code,
                })
            }
            other => other,
        }
    }

    async fn timed(&mut self, command: &GalilCommand) -> Result<String> {
        tokio::time::timeout(self.timeout, self.exchange(command))
            .await
            .map_err(|_| GalilError::Timeout(command.to_string()))?
    }

    async fn position(&mut self) -> Result<(i64, i64)> {
        let payload = self.command(&GalilCommand::TellPosition).await?;
        parse_position(&GalilCommand::TellPosition, &payload)
    }

    async fn settle(
        &mut self,
        target: (i64, i64),
        tolerance: i64,
        timeout: Duration,
    ) -> Result<(i64, i64)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (x, y) = self.position().await?;
            if (x - target.0).abs() <= tolerance && (y - target.1).abs() <= tolerance {
                return Ok((x, y));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GalilError::Timeout(format!(
                    "settle at {},{} (last {},{})",
                    target.0, target.1, x, y
                )));
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    async fn exchange(&mut self, command: &GalilCommand) -> Result<String> {
        self.stream.write_all(command.to_string().as_bytes()).await?;
        self.stream.write_all(b"\r").await?;
        self.stream.flush().await?;

        let mut frame = String::new();
        loop {
            let byte = match self.stream.read_u8().await {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(GalilError::Closed)
                }
                Err(e) => return Err(e.into()),
            };
            frame.push(char::from(byte));
            if byte == b':' || byte == b'?' {
                return parse_response(command, &frame);
            }
        }
    }

    async fn close(mut self) {
        for command in GalilCommand::release_sequence() {
            if let Err(e) = self.command(&command).await {
                warn!("release `{}` failed: {}", command, e);
            }
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!("controller shutdown: {}", e);
        }
    }
}

/// Galil two-axis mount in position-tracking mode.
///
/// Setup runs synchronously at connect time. Afterwards each `steer` only
/// queues a `PA` onto a bounded channel drained by a writer task, so the
/// tracking loop never waits on the controller. Dropping the sender (through
/// `release` or drop) makes the writer stop motion, leave tracking mode and
/// close the stream.
pub struct GalilGimbal {
    settings: GalilSettings,
    tx: Option<mpsc::Sender<WriterRequest>>,
    writer: Option<JoinHandle<WriterStats>>,
    last_counts: Option<(i64, i64)>,
}

impl GalilGimbal {
    pub async fn connect(addr: &str, settings: GalilSettings) -> Result<Self> {
        info!("connecting to controller at {}", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, settings).await
    }

    pub async fn from_stream<T>(stream: T, settings: GalilSettings) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut link =
            ControllerLink::new(stream, Duration::from_millis(settings.response_timeout_ms));

        for command in GalilCommand::setup_sequence(&settings.profile, settings.zero_on_connect) {
            link.command(&command).await?;
        }
        let position = link.position().await?;
        let (az, el) = settings.scale.to_degrees(position);
        info!(az_deg = az, el_deg = el, "controller in position-tracking mode");

        let (tx, rx) = mpsc::channel(settings.queue_depth.max(1));
        let writer = tokio::spawn(write_commands(link, rx));

        Ok(Self {
            settings,
            tx: Some(tx),
            writer: Some(writer),
            last_counts: Some(position),
        })
    }

    /// Hand out the writer task so a caller can wait for the release
    /// sequence to reach the controller.
    pub fn take_writer(&mut self) -> Option<JoinHandle<WriterStats>> {
        self.writer.take()
    }

    /// Home the mount and wait until the encoders report it there.
    pub async fn park(&mut self, timeout: Duration) -> Result<(f64, f64)> {
        if self.tx.is_none() {
            return Err(GalilError::Closed);
        }
        self.home()
            .map_err(|e| GalilError::Queue(e.to_string()))?;
        let tx = self.tx.as_ref().ok_or(GalilError::Closed)?;
        let (done, reply) = oneshot::channel();
        tx.send(WriterRequest::Settle {
            target: (0, 0),
            tolerance: SETTLE_TOLERANCE_COUNTS,
            timeout,
            done,
        })
        .await
        .map_err(|_| GalilError::Closed)?;
        let counts = reply.await.map_err(|_| GalilError::Closed)??;
        let (az, el) = self.settings.scale.to_degrees(counts);
        info!(az_deg = az, el_deg = el, "mount parked at home");
        Ok((az, el))
    }

    fn queue(&mut self, target: (i64, i64)) -> std::result::Result<(), DispatchError> {
        let tx = self.tx.as_ref().ok_or(DispatchError::Released)?;
        tx.try_send(WriterRequest::Send(GalilCommand::PositionAbsolute(
            target.0, target.1,
        )))
        .map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Link("command queue full".into()),
            mpsc::error::TrySendError::Closed(_) => {
                DispatchError::Link("controller writer stopped".into())
            }
        })?;
        self.last_counts = Some(target);
        Ok(())
    }

    /// Last position queued, gimbal degrees.
    pub fn commanded_position(&self) -> Option<(f64, f64)> {
        self.last_counts.map(|c| self.settings.scale.to_degrees(c))
    }

    fn clip(&self, az_deg: f64, el_deg: f64) -> (f64, f64) {
        let az = &self.settings.azimuth_limits;
        let el = &self.settings.elevation_limits;
        (
            az_deg.clamp(az.min_deg, az.max_deg),
            el_deg.clamp(el.min_deg, el.max_deg),
        )
    }
}

impl GimbalActuator for GalilGimbal {
    fn steer(&mut self, command: &GimbalCommand) -> std::result::Result<(), DispatchError> {
        if self.tx.is_none() {
            return Err(DispatchError::Released);
        }
        if !(command.azimuth_deg.is_finite() && command.elevation_deg.is_finite()) {
            return Err(DispatchError::Rejected(format!(
                "non-finite target {}, {}",
                command.azimuth_deg, command.elevation_deg
            )));
        }

        let (az, el) = if command.absolute {
            (command.azimuth_deg, command.elevation_deg)
        } else {
            let (cur_az, cur_el) = self.commanded_position().unwrap_or((0.0, 0.0));
            (cur_az + command.azimuth_deg, cur_el + command.elevation_deg)
        };
        let (az, el) = self.clip(az, el);
        let target = self.settings.scale.to_counts(az, el);

        if let Some((x, y)) = self.last_counts {
            let band = self.settings.deadband_counts;
            if (target.0 - x).abs() < band && (target.1 - y).abs() < band {
                debug!(x = target.0, y = target.1, "inside deadband, not sent");
                return Ok(());
            }
        }
        self.queue(target)
    }

    /// Always sent, deadband or not.
    fn home(&mut self) -> std::result::Result<(), DispatchError> {
        self.queue((0, 0))
    }

    fn release(&mut self) -> std::result::Result<(), DispatchError> {
        if self.tx.take().is_some() {
            info!("releasing controller");
        }
        Ok(())
    }
}

async fn write_commands<T>(
    mut link: ControllerLink<T>,
    mut rx: mpsc::Receiver<WriterRequest>,
) -> WriterStats
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut stats = WriterStats::default();
    while let Some(request) = rx.recv().await {
        let command = match request {
            WriterRequest::Send(command) => command,
            WriterRequest::Settle {
                target,
                tolerance,
                timeout,
                done,
            } => {
                let _ = done.send(link.settle(target, tolerance, timeout).await);
                continue;
            }
        };
        match link.command(&command).await {
            Ok(_) => stats.sent += 1,
            Err(e @ GalilError::Rejected { .. }) => {
                stats.rejected += 1;
                warn!("{}", e);
            }
            Err(e) => {
                warn!("controller link lost: {}", e);
                return stats;
            }
        }
    }
    link.close().await;
    info!(sent = stats.sent, rejected = stats.rejected, "controller released");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    const ERROR_CODE: &str = "7 Command not valid while running";

    /// Scripted controller: records every command, answers `:` except for
    /// commands starting with `reject`, reports `position` for `TP XY`.
    fn fake_controller(
        server: DuplexStream,
        reject: Option<&'static str>,
        position: &'static str,
    ) -> mpsc::UnboundedReceiver<String> {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut reader = BufReader::new(read);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\r', &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let cmd = String::from_utf8_lossy(&buf).trim_end_matches('\r').to_string();
                let reply = if reject.is_some_and(|r| cmd.starts_with(r)) {
                    "?".to_string()
                } else if cmd == "TP XY" {
                    format!("{}\r\n:", position)
                } else if cmd == "TC 1" {
                    format!("{}\r\n:", ERROR_CODE)
                } else {
                    ":".to_string()
                };
                let _ = seen_tx.send(cmd);
                if write.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        seen_rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    async fn connected(settings: GalilSettings) -> (GalilGimbal, mpsc::UnboundedReceiver<String>) {
        let (client, server) = tokio::io::duplex(4096);
        let seen = fake_controller(server, None, " 0, 0");
        let gimbal = GalilGimbal::from_stream(client, settings).await.unwrap();
        (gimbal, seen)
    }

    #[tokio::test]
    async fn test_setup_enters_tracking_mode() {
        let (_gimbal, mut seen) = connected(GalilSettings::default()).await;
        let commands = drain(&mut seen);
        assert_eq!(
            commands,
            vec![
                "AB", "ST", "WT 20", "MO XY", "DP 0,0", "SH XY", "AC 200000,200000",
                "DC 200000,200000", "SP 60000,60000", "ST", "PT 1,1", "TP XY",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_setup_fails_connect() {
        let (client, server) = tokio::io::duplex(4096);
        let mut seen = fake_controller(server, Some("SH"), " 0, 0");
        let result = GalilGimbal::from_stream(client, GalilSettings::default()).await;
        match result {
            Err(GalilError::Rejected { command, code }) => {
                assert_eq!(command, "SH XY");
                assert_eq!(code.as_deref(), Some(ERROR_CODE));
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("setup should fail"),
        }
        let commands = drain(&mut seen);
        assert_eq!(&commands[commands.len() - 2..], &["SH XY", "TC 1"]);
    }

    #[tokio::test]
    async fn test_rejected_target_counted_with_error_code() {
        let (client, server) = tokio::io::duplex(4096);
        let mut seen = fake_controller(server, Some("PA"), " 0, 0");
        let mut gimbal = GalilGimbal::from_stream(client, GalilSettings::default())
            .await
            .unwrap();
        let writer = gimbal.take_writer().unwrap();
        drain(&mut seen);

        gimbal.steer(&GimbalCommand::absolute(5.0, 5.0)).unwrap();
        gimbal.release().unwrap();

        let stats = writer.await.unwrap();
        assert_eq!(stats, WriterStats { sent: 0, rejected: 1 });
        assert_eq!(drain(&mut seen), vec!["PA 50000,50000", "TC 1", "ST", "PT 0,0"]);
    }

    #[tokio::test]
    async fn test_park_homes_and_waits_for_encoders() {
        let (mut gimbal, mut seen) = connected(GalilSettings::default()).await;
        let writer = gimbal.take_writer().unwrap();
        drain(&mut seen);

        gimbal.steer(&GimbalCommand::absolute(10.0, 10.0)).unwrap();
        let parked = gimbal.park(Duration::from_secs(1)).await.unwrap();
        assert_eq!(parked, (0.0, 0.0));
        assert_eq!(gimbal.commanded_position(), Some((0.0, 0.0)));

        gimbal.release().unwrap();
        writer.await.unwrap();
        assert_eq!(
            drain(&mut seen),
            vec!["PA 100000,100000", "PA 0,0", "TP XY", "ST", "PT 0,0"]
        );
    }

    #[tokio::test]
    async fn test_home_ignores_deadband() {
        let (mut gimbal, mut seen) = connected(GalilSettings::default()).await;
        let writer = gimbal.take_writer().unwrap();
        drain(&mut seen);

        // already at 0,0: a plain steer is dropped, home is not
        gimbal.steer(&GimbalCommand::absolute(0.0, 0.0)).unwrap();
        gimbal.home().unwrap();
        gimbal.release().unwrap();
        assert_eq!(gimbal.home(), Err(DispatchError::Released));

        writer.await.unwrap();
        assert_eq!(drain(&mut seen), vec!["PA 0,0", "ST", "PT 0,0"]);
    }

    #[tokio::test]
    async fn test_park_times_out_when_mount_never_arrives() {
        let (client, server) = tokio::io::duplex(4096);
        let _seen = fake_controller(server, None, " 5000, 0");
        let mut gimbal = GalilGimbal::from_stream(client, GalilSettings::default())
            .await
            .unwrap();

        let result = gimbal.park(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(GalilError::Timeout(_))));

        gimbal.release().unwrap();
        assert!(matches!(
            gimbal.park(Duration::from_millis(200)).await,
            Err(GalilError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_steer_streams_pa_then_releases() {
        let (mut gimbal, mut seen) = connected(GalilSettings::default()).await;
        let writer = gimbal.take_writer().unwrap();
        drain(&mut seen);

        gimbal.steer(&GimbalCommand::absolute(12.5, -30.0)).unwrap();
        // 3 counts away on both axes: dropped
        gimbal.steer(&GimbalCommand::absolute(12.5003, -30.0003)).unwrap();
        // beyond the soft limit: clipped
        gimbal.steer(&GimbalCommand::absolute(120.0, 0.0)).unwrap();

        gimbal.release().unwrap();
        gimbal.release().unwrap();
        assert_eq!(
            gimbal.steer(&GimbalCommand::absolute(0.0, 0.0)),
            Err(DispatchError::Released)
        );

        let stats = writer.await.unwrap();
        assert_eq!(stats, WriterStats { sent: 2, rejected: 0 });
        assert_eq!(
            drain(&mut seen),
            vec!["PA 125000,-300000", "PA 900000,0", "ST", "PT 0,0"]
        );
    }

    #[tokio::test]
    async fn test_relative_steer_offsets_last_target() {
        let (mut gimbal, mut seen) = connected(GalilSettings::default()).await;
        let writer = gimbal.take_writer().unwrap();
        drain(&mut seen);

        gimbal.steer(&GimbalCommand::absolute(10.0, 10.0)).unwrap();
        gimbal
            .steer(&GimbalCommand {
                azimuth_deg: 1.0,
                elevation_deg: -2.0,
                absolute: false,
            })
            .unwrap();
        assert_eq!(gimbal.commanded_position(), Some((11.0, 8.0)));

        gimbal.release().unwrap();
        writer.await.unwrap();
        let commands = drain(&mut seen);
        assert_eq!(&commands[..2], &["PA 100000,100000", "PA 110000,80000"]);
    }

    #[tokio::test]
    async fn test_full_queue_is_transient_link_error() {
        let settings = GalilSettings {
            queue_depth: 2,
            ..Default::default()
        };
        let (mut gimbal, _seen) = connected(settings).await;

        // the writer has not run yet on this single-threaded runtime
        gimbal.steer(&GimbalCommand::absolute(1.0, 1.0)).unwrap();
        gimbal.steer(&GimbalCommand::absolute(2.0, 2.0)).unwrap();
        assert!(matches!(
            gimbal.steer(&GimbalCommand::absolute(3.0, 3.0)),
            Err(DispatchError::Link(_))
        ));
        assert_eq!(gimbal.commanded_position(), Some((2.0, 2.0)));
    }

    #[tokio::test]
    async fn test_non_finite_rejected() {
        let (mut gimbal, _seen) = connected(GalilSettings::default()).await;
        assert!(matches!(
            gimbal.steer(&GimbalCommand::absolute(f64::NAN, 0.0)),
            Err(DispatchError::Rejected(_))
        ));
    }
}
