//! Edge kinds and the data returned by a fetch.

use crate::mode::Mode;
use crate::time::PpsTime;

/// Which transition an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Transition to the active level.
    Assert,
    /// Transition back to the inactive level.
    Clear,
}

impl EdgeKind {
    /// Classify a level read right after an edge.
    pub fn from_level(active: bool) -> Self {
        if active {
            Self::Assert
        } else {
            Self::Clear
        }
    }
}

/// The latest event of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsEvent {
    /// Capture time, offset applied.
    pub time: PpsTime,
    /// Number of events of this kind captured so far (wrapping).
    pub sequence: u32,
}

/// Snapshot of both mailboxes of a source, as returned by fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsInfo {
    /// Latest assert event.
    pub assert: PpsEvent,
    /// Latest clear event.
    pub clear: PpsEvent,
    /// Mode in effect when the latest event was captured.
    pub current_mode: Mode,
}

impl PpsInfo {
    /// The `(assert, clear)` sequence pair, used as a freshness guard.
    pub fn sequences(&self) -> (u32, u32) {
        (self.assert.sequence, self.clear.sequence)
    }
}
