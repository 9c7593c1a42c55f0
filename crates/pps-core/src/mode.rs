//! Capability and mode flags.
//!
//! The same bitmask describes what a source advertises (its capability) and
//! what has been negotiated (its mode). Values match the Linux PPS API so a
//! mask can be passed through the character-device ioctls unchanged.

use bitflags::bitflags;

use crate::event::EdgeKind;

/// PPS API version reported in every parameter set.
pub const PPS_API_VERSION: i32 = 1;

bitflags! {
    /// Capability / mode bitmask of a PPS source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mode: i32 {
        /// Capture assert (active-going) edges.
        const CAPTURE_ASSERT = 0x01;
        /// Capture clear (inactive-going) edges.
        const CAPTURE_CLEAR = 0x02;
        /// Apply the assert offset to captured assert timestamps.
        const OFFSET_ASSERT = 0x10;
        /// Apply the clear offset to captured clear timestamps.
        const OFFSET_CLEAR = 0x20;
        /// Echo assert events.
        const ECHO_ASSERT = 0x40;
        /// Echo clear events.
        const ECHO_CLEAR = 0x80;
        /// Fetch may block until an event arrives.
        const CAN_WAIT = 0x100;
        /// Source supports poll-style readiness.
        const CAN_POLL = 0x200;
        /// Timestamps are reported as seconds + nanoseconds.
        const TSFMT_TSPEC = 0x1000;
        /// Timestamps are reported in NTP fixed point.
        const TSFMT_NTPFP = 0x2000;

        /// Both capture flags.
        const CAPTURE_BOTH = Self::CAPTURE_ASSERT.bits() | Self::CAPTURE_CLEAR.bits();
        /// Both time-format flags.
        const TSFMT_ANY = Self::TSFMT_TSPEC.bits() | Self::TSFMT_NTPFP.bits();
    }
}

impl Mode {
    /// Capture flag for an edge kind.
    pub fn capture_flag(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::Assert => Self::CAPTURE_ASSERT,
            EdgeKind::Clear => Self::CAPTURE_CLEAR,
        }
    }

    /// Offset flag for an edge kind.
    pub fn offset_flag(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::Assert => Self::OFFSET_ASSERT,
            EdgeKind::Clear => Self::OFFSET_CLEAR,
        }
    }

    /// Whether events of `kind` are captured under this mode.
    pub fn captures(self, kind: EdgeKind) -> bool {
        self.contains(Self::capture_flag(kind))
    }

    /// Whether at least one time format is present.
    pub fn has_time_format(self) -> bool {
        self.intersects(Self::TSFMT_ANY)
    }
}
