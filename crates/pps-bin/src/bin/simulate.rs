//! `pps-simulate`: run the capture engine on simulated lines and report
//! what a client sees.
//!
//! Builds the GPIO capture engine over mock lines, pulses the enabled lines
//! at a fixed period and runs a client session against the first source
//! in-process. The session ends when the pulses stop and the fetch times
//! out.

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pps_bin::logging::{self, LogFormat, LoggingConfig};
use pps_client::{ClientConfig, PpsClient};
use pps_core::{LocalDevice, PpsTime, SourceRegistry};
use pps_gpio::mock::{MockLifecycle, MockLines};
use pps_gpio::{CaptureConfig, GpioPpsDriver};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "pps-simulate")]
#[command(about = "Run the PPS capture engine on simulated lines", long_about = None)]
struct Cli {
    /// Capture configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lines to enable, overriding the configuration
    #[arg(long)]
    lines_mask: Option<u32>,

    /// Number of pulses per line
    #[arg(long, default_value_t = 5)]
    pulses: u32,

    /// Time between pulses, in milliseconds
    #[arg(long, default_value_t = 1000)]
    period_ms: u64,

    /// Assert offset to request, in nanoseconds
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset_ns: i64,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(LoggingConfig::new(Level::INFO).with_format(cli.log_format)) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match simulate(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn simulate(cli: Cli) -> Result<()> {
    let mut capture = match &cli.config {
        Some(path) => CaptureConfig::load_from(path),
        None => CaptureConfig::load(),
    }
    .context("Failed to load capture configuration")?;
    if let Some(mask) = cli.lines_mask {
        capture.lines_mask = mask;
    }

    let lines = Arc::new(MockLines::new(capture.line_names.clone()));
    let registry = Arc::new(SourceRegistry::with_poll_interval(capture.poll_interval()));
    let driver = Arc::new(GpioPpsDriver::new(
        capture.clone(),
        lines.clone(),
        Arc::clone(&registry),
    ));
    let lifecycle = MockLifecycle::new();
    let count = driver.probe(&lifecycle)?;
    info!(count, "Simulated lines acquired");

    let Some(first) = driver.sources().into_iter().next() else {
        anyhow::bail!("No lines enabled in mask {:#x}", capture.lines_mask);
    };

    let pulsed: Vec<_> = capture
        .mask()
        .iter()
        .filter_map(|i| capture.line_name(i).and_then(|name| lines.line(name)))
        .collect();
    let period = Duration::from_millis(cli.period_ms);
    let pulses = cli.pulses;
    let pulser = std::thread::spawn(move || {
        for _ in 0..pulses {
            std::thread::sleep(period);
            for line in &pulsed {
                line.pulse();
            }
            std::thread::sleep(period / 2);
            for line in &pulsed {
                line.fall();
            }
        }
    });

    let config = ClientConfig {
        device: first.path().to_string(),
        fetch_timeout_secs: (period.as_secs() + 1) * 2,
        ..ClientConfig::default()
    };
    let mut client = PpsClient::with_device(LocalDevice::from_source(&first), &config).await?;
    client.negotiate(PpsTime::from_nanos(cli.offset_ns)).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = client.run(&mut out).await;

    pulser
        .join()
        .map_err(|_| anyhow::anyhow!("Pulse thread panicked"))?;
    lifecycle.remove();

    match outcome {
        Err(e) if e.is_timeout() => {
            info!("Pulses finished");
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(never) => match never {},
    }
}
