//! Wait strategy selection for fetch.
//!
//! Whether a fetch may block is a runtime property of the source (the
//! `CAN_WAIT` capability), so the strategy is chosen per source from its
//! capability rather than at compile time. Both strategies sit behind the
//! same fetch contract.

use std::time::Duration;

use crate::mode::Mode;

/// Default re-check interval when a source cannot block.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a fetch waits for the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Block until an event is published or the timeout elapses.
    Block,
    /// Re-check at a fixed interval until an event appears or the timeout
    /// elapses.
    Poll {
        /// Time between checks.
        interval: Duration,
    },
}

impl WaitStrategy {
    /// Pick the strategy for a source advertising `capability`.
    pub fn for_capability(capability: Mode, poll_interval: Duration) -> Self {
        if capability.contains(Mode::CAN_WAIT) {
            Self::Block
        } else {
            Self::Poll {
                interval: poll_interval,
            }
        }
    }
}

/// Timeout argument of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTimeout {
    /// Return the current snapshot without waiting.
    Immediate,
    /// Wait at most this long for a new event.
    Within(Duration),
    /// Wait until an event arrives.
    Forever,
}

impl FetchTimeout {
    /// The wait bound, `None` for [`FetchTimeout::Forever`].
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Immediate => Some(Duration::ZERO),
            Self::Within(d) => Some(*d),
            Self::Forever => None,
        }
    }
}

impl From<Duration> for FetchTimeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Self::Immediate
        } else {
            Self::Within(d)
        }
    }
}
