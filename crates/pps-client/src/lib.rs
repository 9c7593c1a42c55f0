//! PPS client library.
//!
//! Opens a PPS device, negotiates assert capture (with an optional offset)
//! and reports every new event pair. Works against the Linux `/dev/ppsN`
//! character devices and, through [`pps_core::LocalDevice`], against
//! in-process capture sources.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pps_client::{ClientConfig, PpsClient};
//!
//! # async fn example() -> pps_client::Result<()> {
//! let config = ClientConfig::default();
//! let mut client = PpsClient::connect(&config).await?;
//! client.negotiate(config.assert_offset()).await?;
//! client.run(&mut std::io::stdout()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod report;
pub mod session;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use fetch::FetchProtocol;
#[cfg(target_os = "linux")]
pub use linux::CharDevice;
pub use report::Report;
pub use session::PpsClient;
