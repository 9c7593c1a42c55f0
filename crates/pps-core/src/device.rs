//! Control surface of a PPS device.
//!
//! [`PpsDevice`] is the seam between a client session and the thing it talks
//! to: an in-process [`CaptureSource`] reached through [`LocalDevice`], or a
//! kernel character device on Linux. Each call maps to one control request
//! (get capability, get/set parameters, fetch).

use std::io;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::error::{PpsError, Result};
use crate::event::PpsInfo;
use crate::mode::Mode;
use crate::registry::SourceRegistry;
use crate::source::{CaptureSource, Parameters};
use crate::wait::FetchTimeout;

/// Control operations on an open PPS device.
#[async_trait]
pub trait PpsDevice: Send + Sync {
    /// Path the device was opened at.
    fn path(&self) -> &str;

    /// Advertised capability.
    async fn capability(&self) -> Result<Mode>;

    /// Current negotiated parameters.
    async fn parameters(&self) -> Result<Parameters>;

    /// Request new parameters and return what was committed.
    async fn set_parameters(&self, params: Parameters) -> Result<Parameters>;

    /// Fetch the latest events, waiting per `timeout`.
    ///
    /// A wait cut short by a signal returns [`PpsError::Interrupted`]; an
    /// expired wait returns [`PpsError::Timeout`].
    async fn fetch(&self, timeout: FetchTimeout) -> Result<PpsInfo>;
}

/// In-process handle to a registered [`CaptureSource`].
///
/// Holds only a weak reference: the source belongs to its registry, and an
/// unregistered source makes every call fail with
/// [`PpsError::Unregistered`].
#[derive(Debug, Clone)]
pub struct LocalDevice {
    path: String,
    source: Weak<CaptureSource>,
}

impl LocalDevice {
    /// Open the source registered at `path`.
    pub fn open(registry: &SourceRegistry, path: &str) -> Result<Self> {
        let source = registry.lookup(path).ok_or_else(|| {
            PpsError::io(
                format!("open {}", path),
                io::Error::new(io::ErrorKind::NotFound, "no such PPS source"),
            )
        })?;
        Ok(Self::from_source(&source))
    }

    /// Handle to an already known source.
    pub fn from_source(source: &Arc<CaptureSource>) -> Self {
        Self {
            path: source.path().to_string(),
            source: Arc::downgrade(source),
        }
    }

    fn source(&self) -> Result<Arc<CaptureSource>> {
        self.source
            .upgrade()
            .filter(|s| s.is_registered())
            .ok_or_else(|| PpsError::Unregistered {
                name: self.path.clone(),
            })
    }
}

#[async_trait]
impl PpsDevice for LocalDevice {
    fn path(&self) -> &str {
        &self.path
    }

    async fn capability(&self) -> Result<Mode> {
        Ok(self.source()?.capability())
    }

    async fn parameters(&self) -> Result<Parameters> {
        Ok(self.source()?.parameters())
    }

    async fn set_parameters(&self, params: Parameters) -> Result<Parameters> {
        self.source()?.set_parameters(params)
    }

    async fn fetch(&self, timeout: FetchTimeout) -> Result<PpsInfo> {
        let source = self.source()?;
        if timeout == FetchTimeout::Immediate {
            return source.fetch(timeout);
        }

        tokio::task::spawn_blocking(move || source.fetch(timeout))
            .await
            .map_err(|e| PpsError::io("fetch task join", io::Error::new(io::ErrorKind::Other, e)))?
    }
}
