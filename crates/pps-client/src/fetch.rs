//! Fetch protocol.
//!
//! Wraps device fetches with two behaviors the caller should not have to
//! think about:
//!
//! - **Signal retry**: a fetch cut short by a signal
//!   ([`PpsError::Interrupted`]) is logged and retried. It never reaches the
//!   caller.
//! - **Wait strategy**: a device that advertises `CAN_WAIT` gets the timeout
//!   passed through. Otherwise the protocol takes non-blocking snapshots
//!   every poll interval until the `(assert, clear)` sequence pair differs
//!   from the last one fetched (`(0, 0)` before the first fetch) or the
//!   timeout runs out.

use pps_core::{FetchTimeout, PpsDevice, PpsError, PpsInfo, Result, WaitStrategy};
use tokio::time::{sleep, Instant};
use tracing::warn;

/// Fetch state of one session.
#[derive(Debug, Clone)]
pub struct FetchProtocol {
    strategy: WaitStrategy,
    timeout: FetchTimeout,
    /// Sequence pair of the last successful fetch.
    last_seen: Option<(u32, u32)>,
}

impl FetchProtocol {
    /// Protocol using `strategy`, waiting up to `timeout` per fetch.
    pub fn new(strategy: WaitStrategy, timeout: FetchTimeout) -> Self {
        Self {
            strategy,
            timeout,
            last_seen: None,
        }
    }

    /// The wait strategy in use.
    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    /// Per-fetch timeout.
    pub fn timeout(&self) -> FetchTimeout {
        self.timeout
    }

    /// Fetch the next event pair from `device`.
    ///
    /// # Errors
    ///
    /// Any device error except [`PpsError::Interrupted`], which is retried.
    /// [`PpsError::Timeout`] when no event arrives in time.
    pub async fn fetch(&mut self, device: &dyn PpsDevice) -> Result<PpsInfo> {
        loop {
            let result = match self.strategy {
                WaitStrategy::Block => device.fetch(self.timeout).await,
                WaitStrategy::Poll { interval } => self.poll(device, interval).await,
            };

            match result {
                Ok(info) => {
                    self.last_seen = Some(info.sequences());
                    return Ok(info);
                }
                Err(err) if err.is_retryable() => {
                    warn!(device = %device.path(), "PPS fetch interrupted by signal, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn poll(&self, device: &dyn PpsDevice, interval: std::time::Duration) -> Result<PpsInfo> {
        let waited = self.timeout.duration().unwrap_or_default();
        let deadline = self.timeout.duration().map(|d| Instant::now() + d);
        // Nothing fetched yet in this session: any published event is new.
        let baseline = self.last_seen.unwrap_or((0, 0));

        loop {
            let info = device.fetch(FetchTimeout::Immediate).await?;
            if info.sequences() != baseline {
                return Ok(info);
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PpsError::Timeout { waited });
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            sleep(nap).await;
        }
    }
}
