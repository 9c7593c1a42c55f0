//! Client configuration using Figment.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! environment variables prefixed with `PPS_CLIENT_`. Command-line flags are
//! applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pps_core::{FetchTimeout, PpsTime};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Settings of one client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device path.
    #[serde(default = "default_device")]
    pub device: String,
    /// Per-fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Assert offset requested at negotiation, in nanoseconds.
    #[serde(default)]
    pub assert_offset_ns: i64,
    /// Poll interval for devices that cannot block, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_device() -> String {
    "/dev/pps0".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            assert_offset_ns: 0,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ClientConfig {
    /// Load from defaults, `path` if given, and `PPS_CLIENT_*` environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The provider chain used by [`ClientConfig::load`].
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("PPS_CLIENT_"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ClientError::InvalidConfig(msg.to_string()));
        if self.device.is_empty() {
            return invalid("device must not be empty");
        }
        if self.fetch_timeout_secs == 0 {
            return invalid("fetch_timeout_secs must be greater than 0");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be greater than 0");
        }
        Ok(())
    }

    /// Per-fetch timeout.
    pub fn fetch_timeout(&self) -> FetchTimeout {
        FetchTimeout::from(Duration::from_secs(self.fetch_timeout_secs))
    }

    /// Assert offset to request.
    pub fn assert_offset(&self) -> PpsTime {
        PpsTime::from_nanos(self.assert_offset_ns)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
