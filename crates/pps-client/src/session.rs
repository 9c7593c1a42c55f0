//! Client session.
//!
//! A [`PpsClient`] owns one open device. The capability is read once at
//! connect time and fixes the wait strategy. Parameters are negotiated once
//! per session with [`PpsClient::negotiate`]; after that [`PpsClient::run`]
//! prints one report line per fetched event until the first error that is
//! not a signal interruption.

use std::convert::Infallible;
use std::io::Write;

use pps_core::{Mode, Parameters, PpsDevice, PpsInfo, PpsTime, WaitStrategy};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::fetch::FetchProtocol;
use crate::report::Report;

/// A session with one PPS device.
pub struct PpsClient {
    device: Box<dyn PpsDevice>,
    capability: Mode,
    params: Option<Parameters>,
    protocol: FetchProtocol,
}

impl PpsClient {
    /// Open the character device named in `config`.
    #[cfg(target_os = "linux")]
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let device = crate::linux::CharDevice::open(&config.device).map_err(|source| {
            ClientError::Connection {
                path: config.device.clone(),
                source,
            }
        })?;
        Self::with_device(device, config).await
    }

    /// Start a session on an already open device.
    pub async fn with_device(
        device: impl PpsDevice + 'static,
        config: &ClientConfig,
    ) -> Result<Self> {
        let capability = device
            .capability()
            .await
            .map_err(|source| ClientError::Connection {
                path: device.path().to_string(),
                source,
            })?;

        let strategy = WaitStrategy::for_capability(capability, config.poll_interval());
        debug!(device = %device.path(), ?capability, ?strategy, "Connected to PPS device");

        Ok(Self {
            device: Box::new(device),
            capability,
            params: None,
            protocol: FetchProtocol::new(strategy, config.fetch_timeout()),
        })
    }

    /// Device path.
    pub fn path(&self) -> &str {
        self.device.path()
    }

    /// Capability read at connect time.
    pub fn capability(&self) -> Mode {
        self.capability
    }

    /// Negotiated parameters, once [`PpsClient::negotiate`] has succeeded.
    pub fn parameters(&self) -> Option<&Parameters> {
        self.params.as_ref()
    }

    /// Wait strategy chosen from the capability.
    pub fn strategy(&self) -> WaitStrategy {
        self.protocol.strategy()
    }

    /// Enable assert capture and, when supported, the assert offset.
    ///
    /// Reads the current parameters, adds `CAPTURE_ASSERT` (and
    /// `OFFSET_ASSERT` with `offset` when the device advertises it) and
    /// commits the result.
    ///
    /// # Errors
    ///
    /// [`ClientError::CapabilityMissing`] if the device cannot capture
    /// assert edges.
    pub async fn negotiate(&mut self, offset: PpsTime) -> Result<Parameters> {
        if self.params.is_some() {
            return Err(ClientError::AlreadyNegotiated);
        }
        if !self.capability.contains(Mode::CAPTURE_ASSERT) {
            return Err(ClientError::CapabilityMissing {
                path: self.path().to_string(),
                what: "CAPTUREASSERT".to_string(),
            });
        }

        let mut params = self.device.parameters().await?;
        params.mode |= Mode::CAPTURE_ASSERT;
        if self.capability.contains(Mode::OFFSET_ASSERT) {
            params.mode |= Mode::OFFSET_ASSERT;
            params.assert_offset = offset;
        }

        let committed = self.device.set_parameters(params).await?;
        debug!(
            device = %self.path(),
            mode = ?committed.mode,
            assert_offset = %committed.assert_offset,
            "Negotiated PPS parameters"
        );
        self.params = Some(committed);
        Ok(committed)
    }

    /// Fetch the next event pair.
    pub async fn fetch(&mut self) -> Result<PpsInfo> {
        if self.params.is_none() {
            return Err(ClientError::NotNegotiated);
        }
        Ok(self.protocol.fetch(self.device.as_ref()).await?)
    }

    /// Report events to `sink` until a fetch fails.
    ///
    /// Only returns on error; a timeout ends the session like any other
    /// device failure.
    pub async fn run<W: Write>(&mut self, sink: &mut W) -> Result<Infallible> {
        if self.params.is_none() {
            return Err(ClientError::NotNegotiated);
        }
        info!(device = %self.path(), "Waiting for PPS events");

        loop {
            let info = self.fetch().await?;
            writeln!(sink, "{}", Report::new(self.device.path(), &info))
                .map_err(ClientError::Output)?;
            sink.flush().map_err(ClientError::Output)?;
        }
    }
}

impl std::fmt::Debug for PpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PpsClient")
            .field("path", &self.path())
            .field("capability", &self.capability)
            .field("params", &self.params)
            .field("protocol", &self.protocol)
            .finish()
    }
}
