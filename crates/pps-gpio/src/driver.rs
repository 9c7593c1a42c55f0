//! GPIO PPS driver: the registration transaction.
//!
//! [`GpioPpsDriver::acquire`] walks the enabled bits of a [`LineMask`] in
//! ascending order. For each line it resolves the input, finds its
//! interrupt, registers a [`CaptureSource`] and installs an
//! [`EdgeDispatcher`] on the rising edge. Every line that has been set up is
//! held by a rollback guard until the whole mask succeeds: a failure on any
//! line releases all earlier lines before the error is returned, so the
//! driver either owns every requested line or none.
//!
//! [`GpioPpsDriver::teardown`] releases everything and may be called any
//! number of times. [`GpioPpsDriver::probe`] ties teardown to a
//! [`DeviceLifecycle`].

use std::sync::Arc;

use parking_lot::Mutex;
use pps_core::{
    CaptureSource, Clock, Mode, PpsError, Result, SourceInfo, SourceRegistry, SystemClock,
};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::dispatch::EdgeDispatcher;
use crate::line::{DeviceLifecycle, LineProvider, Trigger};
use crate::slot::{LineMask, LineSlot, SlotTable, MAX_LINES};

/// Capability advertised by every GPIO source.
pub const GPIO_CAPABILITY: Mode = Mode::CAPTURE_ASSERT
    .union(Mode::CAPTURE_CLEAR)
    .union(Mode::OFFSET_ASSERT)
    .union(Mode::ECHO_ASSERT)
    .union(Mode::CAN_WAIT)
    .union(Mode::TSFMT_TSPEC);

/// Mode every GPIO source starts with.
pub const GPIO_DEFAULT_MODE: Mode = Mode::CAPTURE_ASSERT
    .union(Mode::CAPTURE_CLEAR)
    .union(Mode::OFFSET_ASSERT);

/// Capture engine for up to [`MAX_LINES`] GPIO lines.
pub struct GpioPpsDriver {
    config: CaptureConfig,
    provider: Arc<dyn LineProvider>,
    registry: Arc<SourceRegistry>,
    clock: Arc<dyn Clock>,
    slots: Mutex<SlotTable>,
}

impl GpioPpsDriver {
    /// Driver resolving lines through `provider` and registering sources in
    /// `registry`, stamped by the system clock.
    pub fn new(
        config: CaptureConfig,
        provider: Arc<dyn LineProvider>,
        registry: Arc<SourceRegistry>,
    ) -> Self {
        Self {
            config,
            provider,
            registry,
            clock: Arc::new(SystemClock),
            slots: Mutex::new(SlotTable::new()),
        }
    }

    /// Replace the timestamp clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Driver configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Registry the sources live in.
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Whether any line is acquired.
    pub fn is_active(&self) -> bool {
        self.slots.lock().is_active()
    }

    /// Sources of the acquired lines, ascending by line index.
    pub fn sources(&self) -> Vec<Arc<CaptureSource>> {
        self.slots
            .lock()
            .iter()
            .map(|slot| Arc::clone(slot.source()))
            .collect()
    }

    /// Acquire every line enabled in `mask`.
    ///
    /// Returns the number of lines acquired. Bits at or above [`MAX_LINES`]
    /// are ignored with a warning.
    ///
    /// # Errors
    ///
    /// The first failing line's error, after every line set up before it has
    /// been released. [`PpsError::AlreadyActive`] if lines are held from a
    /// previous call.
    pub fn acquire(&self, mask: LineMask) -> Result<usize> {
        let mut slots = self.slots.lock();
        if slots.is_active() {
            return Err(PpsError::AlreadyActive);
        }

        if mask.ignored() != 0 {
            warn!(
                mask = mask.bits(),
                "Ignoring line mask bits beyond line {}",
                MAX_LINES - 1
            );
        }

        let mut pending = PendingRegistration::new(&self.registry);
        for index in mask.iter() {
            let slot = self.acquire_line(index).map_err(|err| {
                warn!(index, error = %err, "Failed to acquire PPS line");
                err
            })?;
            pending.push(slot);
        }

        let committed = pending.commit();
        let count = committed.len();
        for slot in committed {
            info!(
                irq = slot.irq(),
                source = %slot.source().name(),
                path = %slot.source().path(),
                "Registered IRQ ({}) as PPS source",
                slot.irq()
            );
            slots.install(slot);
        }
        Ok(count)
    }

    /// Release every acquired line. Returns the number released.
    pub fn teardown(&self) -> usize {
        let mut slots = self.slots.lock();
        let released = slots.drain();
        let count = released.len();

        for slot in released {
            let LineSlot {
                dispatch,
                source,
                irq,
                ..
            } = slot;
            // Stop dispatching before the source goes away.
            drop(dispatch);
            self.registry.unregister(&source);
            info!(irq, source = %source.name(), "Released PPS source IRQ ({})", irq);
        }
        count
    }

    /// Acquire the configured lines and hand teardown to `lifecycle`.
    ///
    /// If `lifecycle` will not take the teardown action, teardown runs
    /// immediately and the error is returned.
    pub fn probe(self: &Arc<Self>, lifecycle: &dyn DeviceLifecycle) -> Result<usize> {
        self.config
            .validate()
            .map_err(|reason| PpsError::InvalidParameters { reason })?;

        let count = self.acquire(self.config.mask())?;

        let driver = Arc::downgrade(self);
        let action = Box::new(move || {
            if let Some(driver) = driver.upgrade() {
                driver.teardown();
            }
        });
        if let Err(err) = lifecycle.add_teardown_action(action) {
            self.teardown();
            return Err(err.into());
        }

        debug!(count, "PPS probe complete");
        Ok(count)
    }

    fn acquire_line(&self, index: usize) -> Result<LineSlot> {
        let name = self
            .config
            .line_name(index)
            .ok_or_else(|| PpsError::ResourceUnavailable {
                line: format!("#{}", index),
            })?;

        let line = self.provider.resolve(name)?;
        let interrupt = line.interrupt()?;
        let irq = interrupt.irq();

        let source = self.registry.register(
            SourceInfo::new(self.config.source_name(index), GPIO_CAPABILITY),
            GPIO_DEFAULT_MODE,
        )?;

        let dispatcher = Arc::new(EdgeDispatcher::new(
            Arc::clone(&line),
            Arc::clone(&source),
            Arc::clone(&self.clock),
        ));
        let dispatch = match interrupt.install(Trigger::RisingEdge, source.name(), dispatcher) {
            Ok(token) => token,
            Err(err) => {
                self.registry.unregister(&source);
                return Err(err.into());
            }
        };

        Ok(LineSlot {
            dispatch,
            source,
            line,
            index,
            irq,
        })
    }
}

impl Drop for GpioPpsDriver {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for GpioPpsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioPpsDriver")
            .field("driver_name", &self.config.driver_name)
            .field("slots", &*self.slots.lock())
            .finish()
    }
}

/// Lines set up so far by one `acquire` call.
///
/// Released in reverse order on drop unless committed.
struct PendingRegistration<'a> {
    registry: &'a SourceRegistry,
    slots: Vec<LineSlot>,
    committed: bool,
}

impl<'a> PendingRegistration<'a> {
    fn new(registry: &'a SourceRegistry) -> Self {
        Self {
            registry,
            slots: Vec::with_capacity(MAX_LINES),
            committed: false,
        }
    }

    fn push(&mut self, slot: LineSlot) {
        self.slots.push(slot);
    }

    fn commit(mut self) -> Vec<LineSlot> {
        self.committed = true;
        std::mem::take(&mut self.slots)
    }
}

impl Drop for PendingRegistration<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(slot) = self.slots.pop() {
            let LineSlot {
                dispatch,
                source,
                irq,
                ..
            } = slot;
            warn!(irq, source = %source.name(), "Cleaning up PPS source IRQ ({})", irq);
            drop(dispatch);
            self.registry.unregister(&source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{LineFault, ManualClock, MockLifecycle, MockLines};
    use pps_core::{FetchTimeout, PpsTime};
    use tracing_test::traced_test;

    fn driver_with(lines: Arc<MockLines>) -> GpioPpsDriver {
        GpioPpsDriver::new(
            CaptureConfig::default(),
            lines,
            Arc::new(SourceRegistry::new()),
        )
    }

    fn default_lines() -> Arc<MockLines> {
        Arc::new(MockLines::new(CaptureConfig::default().line_names))
    }

    #[test]
    fn test_acquire_registers_each_line() {
        let lines = default_lines();
        let driver = driver_with(Arc::clone(&lines));

        assert_eq!(driver.acquire(LineMask::new(0b101)).unwrap(), 2);
        assert_eq!(driver.registry().len(), 2);
        assert_eq!(lines.installed_count(), 2);

        let names: Vec<_> = driver.sources().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec!["acpi_gpio_pps_client.GPIO00", "acpi_gpio_pps_client.GPIO02"]
        );

        let source = &driver.sources()[0];
        assert_eq!(source.capability(), GPIO_CAPABILITY);
        assert_eq!(source.parameters().mode, GPIO_DEFAULT_MODE);
        assert_eq!(lines.line("GPIO00").unwrap().trigger(), Some(Trigger::RisingEdge));
    }

    #[test]
    fn test_acquire_twice_is_rejected() {
        let driver = driver_with(default_lines());
        driver.acquire(LineMask::DEFAULT).unwrap();
        let err = driver.acquire(LineMask::new(0b10)).unwrap_err();
        assert!(matches!(err, PpsError::AlreadyActive));
        assert_eq!(driver.registry().len(), 1);
    }

    #[test]
    fn test_install_failure_rolls_back_everything() {
        let lines = default_lines();
        lines.set_fault("GPIO02", LineFault::RefuseInstall);
        let driver = driver_with(Arc::clone(&lines));

        let err = driver.acquire(LineMask::new(0b111)).unwrap_err();
        assert!(matches!(err, PpsError::Io { .. }));
        assert!(driver.registry().is_empty());
        assert_eq!(lines.installed_count(), 0);
        assert!(!driver.is_active());
    }

    #[test]
    fn test_missing_interrupt_is_capability_error() {
        let lines = default_lines();
        lines.set_fault("GPIO01", LineFault::NoInterrupt);
        let driver = driver_with(lines);

        let err = driver.acquire(LineMask::new(0b11)).unwrap_err();
        assert!(matches!(err, PpsError::CapabilityMissing { .. }));
        assert!(driver.registry().is_empty());
    }

    #[test]
    fn test_name_conflict_rolls_back() {
        let lines = default_lines();
        let registry = Arc::new(SourceRegistry::new());
        registry
            .register(
                SourceInfo::new("acpi_gpio_pps_client.GPIO01", GPIO_CAPABILITY),
                GPIO_DEFAULT_MODE,
            )
            .unwrap();
        let driver = GpioPpsDriver::new(CaptureConfig::default(), lines, Arc::clone(&registry));

        let err = driver.acquire(LineMask::new(0b11)).unwrap_err();
        assert!(matches!(err, PpsError::RegistrationConflict { .. }));
        assert_eq!(registry.names(), vec!["acpi_gpio_pps_client.GPIO01".to_string()]);
    }

    #[test]
    fn test_edges_reach_source() {
        let lines = default_lines();
        let clock = Arc::new(ManualClock::new(PpsTime::new(1_700_000_000, 0)));
        let driver = driver_with(Arc::clone(&lines)).with_clock(clock.clone());
        driver.acquire(LineMask::DEFAULT).unwrap();

        let line = lines.line("GPIO00").unwrap();
        line.pulse();
        line.fall();
        clock.advance(PpsTime::new(1, 0));
        line.pulse();

        let info = driver.sources()[0].fetch(FetchTimeout::Immediate).unwrap();
        assert_eq!(info.assert.sequence, 2);
        assert_eq!(info.assert.time, PpsTime::new(1_700_000_001, 0));
        // Rising-edge trigger only: the fall raised no interrupt.
        assert_eq!(info.clear.sequence, 0);

        // A spurious interrupt with the line low is recorded as a clear edge.
        line.set_level(false);
        line.fire();
        let info = driver.sources()[0].snapshot();
        assert_eq!(info.clear.sequence, 1);
        assert_eq!(info.assert.sequence, 2);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let lines = default_lines();
        let driver = driver_with(Arc::clone(&lines));
        driver.acquire(LineMask::new(0b11)).unwrap();

        assert_eq!(driver.teardown(), 2);
        assert_eq!(driver.teardown(), 0);
        assert!(driver.registry().is_empty());
        assert_eq!(lines.installed_count(), 0);

        // Lines can be acquired again after a teardown.
        assert_eq!(driver.acquire(LineMask::new(0b11)).unwrap(), 2);
    }

    #[test]
    fn test_probe_hands_teardown_to_lifecycle() {
        let driver = Arc::new(driver_with(default_lines()));
        let lifecycle = MockLifecycle::new();

        assert_eq!(driver.probe(&lifecycle).unwrap(), 1);
        assert_eq!(lifecycle.pending(), 1);
        assert!(driver.is_active());

        lifecycle.remove();
        assert!(!driver.is_active());
        assert!(driver.registry().is_empty());
    }

    #[test]
    fn test_probe_tears_down_when_lifecycle_rejects() {
        let driver = Arc::new(driver_with(default_lines()));
        let lifecycle = MockLifecycle::rejecting();

        let err = driver.probe(&lifecycle).unwrap_err();
        assert!(matches!(err, PpsError::Io { .. }));
        assert!(!driver.is_active());
        assert!(driver.registry().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_logs_one_registration_per_line() {
        let driver = driver_with(default_lines());
        driver.acquire(LineMask::new(0b1011)).unwrap();

        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("as PPS source")).count() {
                3 => Ok(()),
                n => Err(format!("expected 3 registration logs, got {}", n)),
            }
        });
    }

    #[test]
    #[traced_test]
    fn test_rollback_is_logged() {
        let lines = default_lines();
        lines.set_fault("GPIO03", LineFault::Missing);
        let driver = driver_with(lines);

        let err = driver.acquire(LineMask::new(0b1011)).unwrap_err();
        assert!(matches!(err, PpsError::ResourceUnavailable { .. }));
        assert!(logs_contain("Cleaning up PPS source IRQ"));
        assert!(!logs_contain("as PPS source"));
    }

    #[test]
    #[traced_test]
    fn test_high_mask_bits_are_ignored() {
        let driver = driver_with(default_lines());
        assert_eq!(driver.acquire(LineMask::new(0x301)).unwrap(), 1);
        assert!(logs_contain("Ignoring line mask bits"));
    }
}
