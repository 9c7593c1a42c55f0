//! `pps-client`: report PPS events from a device.
//!
//! Opens a PPS device, enables assert capture (with an optional offset) and
//! prints one line per event:
//!
//! ```text
//! device /dev/pps0 - assert 1700000000.000000123 - sequence 42 - clear 0000000000.000000000 - sequence 0
//! ```
//!
//! Settings come from built-in defaults, an optional TOML file (`--config`),
//! `PPS_CLIENT_*` environment variables and finally the flags below.
//!
//! Exit status: 1 on any failure (including no event within the timeout),
//! 130 on Ctrl-C.

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pps_bin::logging::{self, parse_log_level, LogFormat, LoggingConfig};
use pps_client::ClientConfig;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "pps-client")]
#[command(about = "Report PPS events from a PPS device", long_about = None)]
struct Cli {
    /// PPS device to read [default: /dev/pps0]
    #[arg(short, long)]
    device: Option<String>,

    /// Assert offset to request, in nanoseconds
    #[arg(long, allow_hyphen_values = true)]
    offset_ns: Option<i64>,

    /// Seconds to wait for each event
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Log level when RUST_LOG is unset
    #[arg(long, value_parser = parse_log_level, default_value = "info")]
    log_level: Level,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::load(self.config.as_deref())
            .context("Failed to load client configuration")?;

        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(offset_ns) = self.offset_ns {
            config.assert_offset_ns = offset_ns;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.fetch_timeout_secs = timeout_secs;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(LoggingConfig::new(cli.log_level).with_format(cli.log_format)) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    tokio::select! {
        result = run(&cli) => match result {
            Ok(never) => match never {},
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, exiting");
            ExitCode::from(130)
        }
    }
}

#[cfg(target_os = "linux")]
async fn run(cli: &Cli) -> Result<Infallible> {
    use pps_client::PpsClient;

    let config = cli.client_config()?;
    let mut client = PpsClient::connect(&config).await?;
    client.negotiate(config.assert_offset()).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    Ok(client.run(&mut out).await?)
}

#[cfg(not(target_os = "linux"))]
async fn run(cli: &Cli) -> Result<Infallible> {
    let config = cli.client_config()?;
    anyhow::bail!("{}: PPS character devices are only supported on Linux", config.device)
}
