//! # VE.Direct Monitor
//!
//! Read telemetry from a Victron VE.Direct device (or a replayed capture, or
//! another instance's relay), decode it and hand it to the configured sinks.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedirect_mon::config::{Config, InputSource};
use vedirect_mon::pipeline;
use vedirect_mon::vedirect::reader::FrameReader;

/// File name of the daily log when `logging.directory` is set
const LOG_FILE_NAME: &str = "vedirect-mon.log";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "vedirect-mon", version, about = "Victron VE.Direct telemetry monitor")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replay a captured stream instead of reading the device
    #[arg(long, value_name = "FILE", conflicts_with = "subscribe")]
    replay: Option<PathBuf>,

    /// Read from a running instance's relay instead of the device
    #[arg(long)]
    subscribe: bool,

    /// Print every decoded field as it arrives
    #[arg(long)]
    raw: bool,

    /// Disable the per-cycle panel
    #[arg(long)]
    no_panel: bool,

    /// Force the plot log on
    #[arg(long, overrides_with = "no_plot")]
    plot: bool,

    /// Force the plot log off
    #[arg(long, overrides_with = "plot")]
    no_plot: bool,
}

impl Cli {
    /// Apply command line overrides on top of the file configuration
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.replay {
            config.input.source = InputSource::Replay;
            config.input.replay_file = Some(path.clone());
        }
        if self.subscribe {
            config.input.source = InputSource::Relay;
            config.relay.publish = false;
        }
        if self.raw {
            config.display.raw = true;
        }
        if self.no_panel {
            config.display.panel = false;
        }
        if self.plot {
            config.log.plot = Some(true);
        }
        if self.no_plot {
            config.log.plot = Some(false);
        }
    }
}

/// Logging goes to stderr so it never interleaves with the panel on stdout
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid logging level")?;

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Main entry point for the VE.Direct monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and apply command line overrides
///    - Set up logging with tracing subscriber
///    - Acquire the relay socket if publishing, open the input
///
/// 2. **Main Loop**
///    - Read records one at a time and dispatch them to the sinks
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Shutdown**
///    - Log the number of cycles seen
///    - Remove the relay socket
///
/// # Errors
///
/// Returns error if:
/// - The configuration is invalid
/// - The input cannot be opened
/// - Another instance already serves the relay socket
/// - The reader loses frame or the input fails
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let _guard = init_logging(&config)?;
    info!("VE.Direct monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    // The relay socket is acquired first so a second owner fails fast
    let (mut dispatcher, relay) = pipeline::build_dispatcher(config).await?;
    let (input, format) = pipeline::open_input(config).await?;
    let mut reader = FrameReader::with_format(input, format);

    info!("Press Ctrl+C to exit");

    let interrupted = tokio::select! {
        result = pipeline::run(&mut reader, &mut dispatcher) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        info!("Received Ctrl+C, shutting down...");
    }
    info!("Total cycles: {}", dispatcher.cycles());

    if let Some(relay) = relay {
        info!("Closing relay ({} subscribers)", relay.subscriber_count());
        drop(relay);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("vedirect-mon").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_keeps_config() {
        let mut config = Config::default();
        parse(&[]).apply(&mut config);
        assert_eq!(config.input.source, InputSource::Device);
        assert!(config.display.panel);
        assert_eq!(config.log.plot, None);
    }

    #[test]
    fn test_replay_override() {
        let mut config = Config::default();
        parse(&["--replay", "capture.txt", "--raw", "--no-panel"]).apply(&mut config);
        assert_eq!(config.input.source, InputSource::Replay);
        assert_eq!(config.input.replay_file, Some(PathBuf::from("capture.txt")));
        assert!(config.display.raw);
        assert!(!config.display.panel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_subscribe_clears_publish() {
        let mut config = Config::default();
        config.relay.publish = true;
        parse(&["--subscribe"]).apply(&mut config);
        assert_eq!(config.input.source, InputSource::Relay);
        assert!(!config.relay.publish);
        assert!(!config.plot_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_last_plot_flag_wins() {
        let mut config = Config::default();
        parse(&["--subscribe", "--no-plot", "--plot"]).apply(&mut config);
        assert_eq!(config.log.plot, Some(true));
        assert!(config.plot_enabled());

        let mut config = Config::default();
        parse(&["--plot", "--no-plot"]).apply(&mut config);
        assert_eq!(config.log.plot, Some(false));
    }

    #[test]
    fn test_replay_and_subscribe_conflict() {
        let result = Cli::try_parse_from(["vedirect-mon", "--replay", "x", "--subscribe"]);
        assert!(result.is_err());
    }
}
