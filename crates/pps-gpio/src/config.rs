//! Capture engine configuration using Figment.
//!
//! Configuration is layered:
//! 1. Built-in defaults
//! 2. A TOML file (optional)
//! 3. Environment variables prefixed with `PPS_GPIO_`
//!
//! # Example
//! ```no_run
//! use pps_gpio::CaptureConfig;
//!
//! let config = CaptureConfig::load_from("config/pps-gpio.toml")?;
//! println!("Driver: {}", config.driver_name);
//! # Ok::<(), figment::Error>(())
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::slot::{LineMask, MAX_LINES};

/// Settings of one capture engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Prefix of every source name.
    #[serde(default = "default_driver_name")]
    pub driver_name: String,
    /// Lines to enable, one bit per line index.
    #[serde(default = "default_lines_mask")]
    pub lines_mask: u32,
    /// Line name for each index.
    #[serde(default = "default_line_names")]
    pub line_names: Vec<String>,
    /// Re-check interval for sources that cannot block, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_driver_name() -> String {
    "acpi_gpio_pps_client".to_string()
}

fn default_lines_mask() -> u32 {
    1
}

fn default_line_names() -> Vec<String> {
    // Index 4 and 5 are named without the leading zero by the firmware tables.
    ["GPIO00", "GPIO01", "GPIO02", "GPIO03", "GPIO4", "GPIO5", "GPIO06", "GPIO07"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            driver_name: default_driver_name(),
            lines_mask: default_lines_mask(),
            line_names: default_line_names(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CaptureConfig {
    /// Load from defaults and `PPS_GPIO_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Load from defaults, a TOML file and `PPS_GPIO_*` environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PPS_GPIO_"))
            .extract()
    }

    /// Provider chain without a file.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed("PPS_GPIO_"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.driver_name.is_empty() {
            return Err("driver_name must not be empty".to_string());
        }

        if self.line_names.len() != MAX_LINES {
            return Err(format!(
                "Expected {} line_names, got {}",
                MAX_LINES,
                self.line_names.len()
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.line_names {
            if name.is_empty() {
                return Err("line_names must not contain empty names".to_string());
            }
            if !seen.insert(name) {
                return Err(format!("Duplicate line name: {}", name));
            }
        }

        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Configured line mask.
    pub fn mask(&self) -> LineMask {
        LineMask::new(self.lines_mask)
    }

    /// Name of the line at `index`.
    pub fn line_name(&self, index: usize) -> Option<&str> {
        self.line_names.get(index).map(String::as_str)
    }

    /// Source name for the line at `index`, `"{driver}.GPIO{index:02}"`.
    pub fn source_name(&self, index: usize) -> String {
        format!("{}.GPIO{:02}", self.driver_name, index)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
