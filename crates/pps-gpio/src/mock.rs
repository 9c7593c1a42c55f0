//! Simulated lines for tests and demos.
//!
//! [`MockLines`] is a [`LineProvider`] over a fixed set of [`MockLine`]s.
//! Each line keeps a level, an interrupt number and at most one installed
//! handler. Edges are driven by the caller: [`MockLine::pulse`] raises the
//! line and [`MockLine::fall`] lowers it, each running the installed handler
//! on the caller's thread when the trigger matches.
//!
//! Faults can be injected per line with [`MockLines::set_fault`] to exercise
//! the registration rollback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pps_core::{Clock, PpsTime};

use crate::line::{
    DeviceLifecycle, DispatchToken, EdgeHandler, InputLine, InterruptLine, IrqReturn, LineError,
    LineProvider, Trigger,
};

/// First interrupt number handed out by [`MockLines`].
pub const MOCK_IRQ_BASE: u32 = 100;

/// Fault to inject on a mock line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFault {
    /// Resolution fails with `NotFound`.
    Missing,
    /// Resolution fails with `Deferred`.
    Deferred,
    /// The line resolves but has no interrupt.
    NoInterrupt,
    /// The interrupt refuses handler installation.
    RefuseInstall,
}

/// Provider of simulated lines.
pub struct MockLines {
    lines: HashMap<String, Arc<MockLine>>,
    faults: Mutex<HashMap<String, LineFault>>,
}

impl MockLines {
    /// Provider with one line per name, numbered from [`MOCK_IRQ_BASE`].
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next_irq = AtomicU32::new(MOCK_IRQ_BASE);
        let lines = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let irq = next_irq.fetch_add(1, Ordering::Relaxed);
                (name.clone(), MockLine::new(name, irq))
            })
            .collect();
        Self {
            lines,
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// The line named `name`, regardless of injected faults.
    pub fn line(&self, name: &str) -> Option<Arc<MockLine>> {
        self.lines.get(name).cloned()
    }

    /// Inject a fault on `name`.
    pub fn set_fault(&self, name: &str, fault: LineFault) {
        if let Some(line) = self.lines.get(name) {
            line.has_interrupt
                .store(fault != LineFault::NoInterrupt, Ordering::SeqCst);
            line.refuse_install
                .store(fault == LineFault::RefuseInstall, Ordering::SeqCst);
        }
        self.faults.lock().insert(name.to_string(), fault);
    }

    /// Remove any fault on `name`.
    pub fn clear_fault(&self, name: &str) {
        if let Some(line) = self.lines.get(name) {
            line.has_interrupt.store(true, Ordering::SeqCst);
            line.refuse_install.store(false, Ordering::SeqCst);
        }
        self.faults.lock().remove(name);
    }

    /// Number of lines with a handler installed.
    pub fn installed_count(&self) -> usize {
        self.lines.values().filter(|l| l.is_installed()).count()
    }
}

impl LineProvider for MockLines {
    fn resolve(&self, name: &str) -> Result<Arc<dyn InputLine>, LineError> {
        match self.faults.lock().get(name) {
            Some(LineFault::Missing) => {
                return Err(LineError::NotFound {
                    name: name.to_string(),
                })
            }
            Some(LineFault::Deferred) => {
                return Err(LineError::Deferred {
                    name: name.to_string(),
                })
            }
            _ => {}
        }

        self.lines
            .get(name)
            .map(|line| Arc::clone(line) as Arc<dyn InputLine>)
            .ok_or_else(|| LineError::NotFound {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for MockLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.lines.keys().collect();
        names.sort();
        f.debug_struct("MockLines")
            .field("lines", &names)
            .field("faults", &*self.faults.lock())
            .finish()
    }
}

/// One simulated input line with its interrupt.
pub struct MockLine {
    name: String,
    irq: u32,
    level: AtomicBool,
    has_interrupt: AtomicBool,
    refuse_install: AtomicBool,
    handler: Mutex<Option<(Trigger, Arc<dyn EdgeHandler>)>>,
    this: Weak<MockLine>,
}

impl MockLine {
    fn new(name: String, irq: u32) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name,
            irq,
            level: AtomicBool::new(false),
            has_interrupt: AtomicBool::new(true),
            refuse_install: AtomicBool::new(false),
            handler: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Set the level without raising an interrupt.
    pub fn set_level(&self, active: bool) {
        self.level.store(active, Ordering::SeqCst);
    }

    /// Drive the line active, running the handler on a rising-edge match.
    pub fn pulse(&self) -> Option<IrqReturn> {
        self.set_level(true);
        self.deliver(Trigger::RisingEdge)
    }

    /// Drive the line inactive, running the handler on a falling-edge match.
    pub fn fall(&self) -> Option<IrqReturn> {
        self.set_level(false);
        self.deliver(Trigger::FallingEdge)
    }

    /// Run the installed handler regardless of trigger and level.
    pub fn fire(&self) -> Option<IrqReturn> {
        let handler = self.handler.lock().as_ref().map(|(_, h)| Arc::clone(h));
        handler.map(|h| h.on_edge())
    }

    /// Whether a handler is installed.
    pub fn is_installed(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Trigger the installed handler was registered for.
    pub fn trigger(&self) -> Option<Trigger> {
        self.handler.lock().as_ref().map(|(t, _)| *t)
    }

    fn deliver(&self, edge: Trigger) -> Option<IrqReturn> {
        let handler = {
            let installed = self.handler.lock();
            match installed.as_ref() {
                Some((trigger, h)) if *trigger == edge || *trigger == Trigger::BothEdges => {
                    Some(Arc::clone(h))
                }
                _ => None,
            }
        };
        handler.map(|h| h.on_edge())
    }
}

impl InputLine for MockLine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    fn interrupt(&self) -> Result<Arc<dyn InterruptLine>, LineError> {
        if !self.has_interrupt.load(Ordering::SeqCst) {
            return Err(LineError::NoInterrupt {
                name: self.name.clone(),
            });
        }
        self.this
            .upgrade()
            .map(|line| line as Arc<dyn InterruptLine>)
            .ok_or_else(|| LineError::NoInterrupt {
                name: self.name.clone(),
            })
    }
}

impl InterruptLine for MockLine {
    fn irq(&self) -> u32 {
        self.irq
    }

    fn install(
        &self,
        trigger: Trigger,
        _label: &str,
        handler: Arc<dyn EdgeHandler>,
    ) -> Result<DispatchToken, LineError> {
        if self.refuse_install.load(Ordering::SeqCst) {
            return Err(LineError::InstallRefused {
                irq: self.irq,
                reason: "injected fault".to_string(),
            });
        }

        let mut installed = self.handler.lock();
        if installed.is_some() {
            return Err(LineError::InstallRefused {
                irq: self.irq,
                reason: "handler already installed".to_string(),
            });
        }
        *installed = Some((trigger, handler));

        let this = self.this.clone();
        Ok(DispatchToken::new(self.irq, move || {
            if let Some(line) = this.upgrade() {
                line.handler.lock().take();
            }
        }))
    }
}

impl std::fmt::Debug for MockLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLine")
            .field("name", &self.name)
            .field("irq", &self.irq)
            .field("active", &self.is_active())
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Device lifecycle that stores teardown actions until [`MockLifecycle::remove`].
#[derive(Default)]
pub struct MockLifecycle {
    actions: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    reject: AtomicBool,
}

impl MockLifecycle {
    /// Lifecycle accepting teardown actions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle refusing every teardown action.
    pub fn rejecting() -> Self {
        let lifecycle = Self::default();
        lifecycle.reject.store(true, Ordering::SeqCst);
        lifecycle
    }

    /// Number of stored actions.
    pub fn pending(&self) -> usize {
        self.actions.lock().len()
    }

    /// Simulate device removal: run stored actions, last added first.
    pub fn remove(&self) {
        let actions = std::mem::take(&mut *self.actions.lock());
        for action in actions.into_iter().rev() {
            action();
        }
    }
}

impl DeviceLifecycle for MockLifecycle {
    fn add_teardown_action(&self, action: Box<dyn FnOnce() + Send>) -> Result<(), LineError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(LineError::Lifecycle {
                reason: "injected fault".to_string(),
            });
        }
        self.actions.lock().push(action);
        Ok(())
    }
}

impl std::fmt::Debug for MockLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLifecycle")
            .field("pending", &self.pending())
            .field("reject", &self.reject.load(Ordering::SeqCst))
            .finish()
    }
}

/// Clock under test control.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Clock reading `start`.
    pub fn new(start: PpsTime) -> Self {
        Self {
            nanos: AtomicI64::new(start.as_nanos()),
        }
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: PpsTime) {
        self.nanos.fetch_add(delta.as_nanos(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> PpsTime {
        PpsTime::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
