//! Edge dispatcher.
//!
//! The handler installed on each line's interrupt path. It runs in the
//! provider's interrupt context, so the body is kept to a clock read, a
//! level read and one publish.

use std::sync::Arc;

use pps_core::{CaptureSource, Clock, EdgeKind};

use crate::line::{EdgeHandler, InputLine, IrqReturn};

/// Timestamps edges of one line into its capture source.
pub struct EdgeDispatcher {
    line: Arc<dyn InputLine>,
    source: Arc<CaptureSource>,
    clock: Arc<dyn Clock>,
}

impl EdgeDispatcher {
    /// Dispatcher feeding `source` from `line`, stamped by `clock`.
    pub fn new(
        line: Arc<dyn InputLine>,
        source: Arc<CaptureSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            line,
            source,
            clock,
        }
    }
}

impl EdgeHandler for EdgeDispatcher {
    fn on_edge(&self) -> IrqReturn {
        // Timestamp before anything else touches the hardware.
        let time = self.clock.now();
        let kind = EdgeKind::from_level(self.line.is_active());
        self.source.publish(kind, time);
        IrqReturn::Handled
    }
}

impl std::fmt::Debug for EdgeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeDispatcher")
            .field("line", &self.line.name())
            .field("source", &self.source.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockLines};
    use pps_core::{Mode, PpsTime, SourceInfo, SourceRegistry};

    #[test]
    fn test_level_selects_edge_kind() {
        let registry = SourceRegistry::new();
        let caps = Mode::CAPTURE_BOTH | Mode::CAN_WAIT | Mode::TSFMT_TSPEC;
        let source = registry
            .register(SourceInfo::new("disp.GPIO00", caps), Mode::CAPTURE_BOTH)
            .unwrap();

        let lines = MockLines::new(["GPIO00"]);
        let line = lines.line("GPIO00").unwrap();
        let clock = Arc::new(ManualClock::new(PpsTime::new(1_000, 0)));
        let dispatcher = EdgeDispatcher::new(line.clone(), Arc::clone(&source), clock.clone());

        line.set_level(true);
        assert_eq!(dispatcher.on_edge(), IrqReturn::Handled);
        clock.advance(PpsTime::new(0, 100_000_000));
        line.set_level(false);
        assert_eq!(dispatcher.on_edge(), IrqReturn::Handled);

        let info = source.snapshot();
        assert_eq!(info.sequences(), (1, 1));
        assert_eq!(info.assert.time, PpsTime::new(1_000, 0));
        assert_eq!(info.clear.time, PpsTime::new(1_000, 100_000_000));
    }

    #[test]
    fn test_handled_even_when_mode_drops_event() {
        let registry = SourceRegistry::new();
        let caps = Mode::CAPTURE_ASSERT | Mode::TSFMT_TSPEC;
        let source = registry
            .register(SourceInfo::new("drop.GPIO00", caps), Mode::CAPTURE_ASSERT)
            .unwrap();

        let lines = MockLines::new(["GPIO00"]);
        let line = lines.line("GPIO00").unwrap();
        let dispatcher = EdgeDispatcher::new(
            line.clone(),
            Arc::clone(&source),
            Arc::new(ManualClock::new(PpsTime::ZERO)),
        );

        line.set_level(false);
        assert_eq!(dispatcher.on_edge(), IrqReturn::Handled);
        assert_eq!(source.snapshot().sequences(), (0, 0));
    }
}
