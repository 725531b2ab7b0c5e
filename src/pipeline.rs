//! # Decode Pipeline
//!
//! Wires the configured input through the frame reader into the
//! dispatcher. One record is read, decoded and dispatched before the next
//! is read; there is no overlap between cycles.

use std::io;

use chrono::Local;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

use crate::config::{Config, InputSource, ReplayFormat};
use crate::error::{MonitorError, Result};
use crate::relay::{self, Role, UnixRelay};
use crate::serial::VeDirectPort;
use crate::sink::{BackupSink, Dispatcher, PanelSink, PlotSink, RawSink, SnapshotSink};
use crate::vedirect::reader::{FrameReader, LineFormat};
use crate::vedirect::synth::{EventStore, Synthesizer};

/// Boxed input stream
pub type Input = Box<dyn AsyncBufRead + Unpin + Send>;

/// Open the configured input
///
/// # Errors
///
/// Returns an error if the device, replay file or relay socket cannot be
/// opened.
pub async fn open_input(config: &Config) -> Result<(Input, LineFormat)> {
    match config.input.source {
        InputSource::Device => {
            let port = VeDirectPort::open(&config.input.device, config.input.baud_rate)?;
            let input: Input = Box::new(port.into_reader());
            Ok((input, LineFormat::Raw))
        }
        InputSource::Replay => {
            let path = config.input.replay_file.as_ref().ok_or_else(|| {
                MonitorError::Io(io::Error::new(io::ErrorKind::NotFound, "no replay file configured"))
            })?;
            let file = tokio::fs::File::open(path).await?;
            info!("Replaying {}", path.display());
            let format = match config.input.replay_format {
                ReplayFormat::Raw => LineFormat::Raw,
                ReplayFormat::Backup => LineFormat::Backup,
            };
            let input: Input = Box::new(BufReader::new(file));
            Ok((input, format))
        }
        InputSource::Relay => {
            let input: Input = Box::new(relay::subscribe(&config.input.relay_socket).await?);
            Ok((input, LineFormat::Raw))
        }
    }
}

/// Build the dispatcher and its sinks from configuration
///
/// The returned relay, if any, must stay alive for as long as the
/// dispatcher publishes; dropping it removes the socket.
///
/// # Errors
///
/// Returns an error if the snapshot directory cannot be created or the
/// relay socket cannot be acquired.
pub async fn build_dispatcher(config: &Config) -> Result<(Dispatcher, Option<RelayHandle>)> {
    let role = config.role();
    let events = match role {
        Role::SourceOwner => EventStore::load(&config.state.event_file),
        Role::Subscriber => EventStore::in_memory(),
    };
    let mut dispatcher = Dispatcher::new(role, Synthesizer::new(role, events));

    if config.display.raw {
        dispatcher.add_sink(Box::new(RawSink::new(io::stdout(), config.display.fahrenheit)));
    }
    if config.display.panel {
        dispatcher.add_sink(Box::new(PanelSink::new(io::stdout(), config.display.fahrenheit)));
    }
    if config.plot_enabled() {
        dispatcher.add_sink(Box::new(PlotSink::new(&config.log.dir, &config.log.prefix)));
    }
    if config.log.backup {
        dispatcher.add_sink(Box::new(BackupSink::new(&config.log.dir, &config.log.prefix)));
    }
    if config.snapshot.enabled {
        dispatcher.add_sink(Box::new(SnapshotSink::new(&config.snapshot.dir)?));
    }

    let mut handle = None;
    if config.relay.publish {
        let relay = UnixRelay::bind(&config.relay.socket).await?;
        let shared = RelayHandle(std::sync::Arc::new(relay));
        dispatcher.set_publisher(Box::new(shared.clone()))?;
        handle = Some(shared);
    }

    info!("Running as {:?}", role);
    Ok((dispatcher, handle))
}

/// Shared ownership of the relay; the socket is removed when the last
/// handle is dropped
#[derive(Debug, Clone)]
pub struct RelayHandle(std::sync::Arc<UnixRelay>);

impl RelayHandle {
    pub fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }
}

impl relay::Publisher for RelayHandle {
    fn publish(&self, key: &str, value: &str) -> Result<()> {
        self.0.publish(key, value)
    }
}

/// Read records until end of input
///
/// A partial cycle left at end of input is flushed.
///
/// # Errors
///
/// Returns the reader's fatal errors (I/O failure, frame lost).
pub async fn run<R: AsyncBufRead + Unpin>(
    reader: &mut FrameReader<R>,
    dispatcher: &mut Dispatcher,
) -> Result<()> {
    while let Some(record) = reader.next_record().await? {
        dispatcher.handle(record, Local::now());
    }

    dispatcher.finish(Local::now());
    info!("End of input after {} cycles", dispatcher.cycles());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CAPTURE: &[u8] = b"\r\nChecksum\t\x12\r\nPID\t0x203\r\nV\t12358\r\nI\t-254\r\nSOC\t876\r\nTTG\t-1\r\nAR\t5\r\nChecksum\t\n\r\nPID\t0x203\r\nV\t12360\r\nI\t-260\r\nSOC\t875\r\nTTG\t-1\r\nAR\t0\r\nChecksum\t\x80\r\nPID\t0x203\r\nV\t12361\r\n";

    fn replay_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.input.source = InputSource::Replay;
        config.display.panel = false;
        config.log.dir = dir.join("logs");
        config.log.prefix = "bmv".to_string();
        config.log.backup = true;
        config.snapshot.enabled = true;
        config.snapshot.dir = dir.join("snapshot");
        config.state.event_file = dir.join("state").join("event-start");
        config
    }

    #[tokio::test]
    async fn test_replay_feeds_every_sink() {
        let dir = tempdir().unwrap();
        let capture = dir.path().join("capture.txt");
        fs::write(&capture, CAPTURE).unwrap();

        let mut config = replay_config(dir.path());
        config.input.replay_file = Some(capture);

        let (input, format) = open_input(&config).await.unwrap();
        let (mut dispatcher, relay) = build_dispatcher(&config).await.unwrap();
        assert!(relay.is_none());

        let mut reader = FrameReader::with_format(input, format);
        run(&mut reader, &mut dispatcher).await.unwrap();

        // two full cycles plus the partial one flushed at end of input
        assert_eq!(dispatcher.cycles(), 3);

        let logs = dir.path().join("logs");
        let plot = fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.extension().is_some_and(|e| e == "csv"))
            .unwrap();
        let rows: Vec<String> = fs::read_to_string(plot)
            .unwrap()
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        assert_eq!(rows.len(), 3);
        let first: Vec<&str> = rows[0].split(',').collect();
        assert_eq!(&first[1..], &["12.358", "-0.254", "-3.13", "nodata", "87.60", "infinite", "nodata", "infinite"]);

        let snapshot = dir.path().join("snapshot");
        assert_eq!(fs::read_to_string(snapshot.join("V")).unwrap(), "12.361\n");
        assert_eq!(fs::read_to_string(snapshot.join("PID")).unwrap(), "BMV-70X\n");
        assert_eq!(fs::read_to_string(snapshot.join("AR")).unwrap(), "0\n");
        // the alarm from the first cycle cleared in the second
        assert!(!snapshot.join("AR_TXT").exists());

        let backup = fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.extension().is_some_and(|e| e == "log"))
            .unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap().lines().count(), 14);
    }

    #[tokio::test]
    async fn test_owner_relays_to_subscriber() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("relay.sock");

        let mut config = replay_config(dir.path());
        config.log.plot = Some(false);
        config.log.backup = false;
        config.snapshot.enabled = false;
        config.relay.publish = true;
        config.relay.socket = socket.clone();

        let (mut owner, relay) = build_dispatcher(&config).await.unwrap();
        let relay = relay.unwrap();

        let mut subscriber_reader = FrameReader::new(relay::subscribe(&socket).await.unwrap());
        for _ in 0..200 {
            if relay.subscriber_count() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let mut owner_reader = FrameReader::new(CAPTURE);
        run(&mut owner_reader, &mut owner).await.unwrap();

        let mut keys = Vec::new();
        for _ in 0..9 {
            keys.push(subscriber_reader.next_record().await.unwrap().unwrap().key);
        }
        assert_eq!(keys, ["PID", "V", "I", "SOC", "TTG", "AR", "TIME", "PWR", "EVT"]);
    }

    #[tokio::test]
    async fn test_fatal_frame_loss() {
        let mut dispatcher = Dispatcher::new(
            Role::Subscriber,
            Synthesizer::new(Role::Subscriber, EventStore::in_memory()),
        );
        let mut reader = FrameReader::new(&b"V\t1\r\nx\r\ny\r\nz\r\n"[..]);
        let result = run(&mut reader, &mut dispatcher).await;
        assert!(matches!(result, Err(MonitorError::OutOfFrame { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_subscribe_without_owner_fails() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.input.source = InputSource::Relay;
        config.input.relay_socket = dir.path().join("none.sock");
        assert!(matches!(open_input(&config).await, Err(MonitorError::Relay(_))));
    }
}
