//! Collaborator interfaces of the capture engine.
//!
//! The engine does not talk to hardware directly. It resolves named input
//! lines through a [`LineProvider`], installs an [`EdgeHandler`] on each
//! line's [`InterruptLine`], and hands its teardown to a [`DeviceLifecycle`].
//! Real hardware backends and the [`mock`](crate::mock) module implement
//! these traits.

use std::fmt;
use std::sync::Arc;

use pps_core::PpsError;
use thiserror::Error;

/// Which edges raise an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Inactive to active.
    RisingEdge,
    /// Active to inactive.
    FallingEdge,
    /// Either transition.
    BothEdges,
}

/// Result of handling one interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was ours and has been serviced.
    Handled,
    /// The interrupt was not ours.
    NotHandled,
}

/// Errors reported by line collaborators.
#[derive(Error, Debug)]
pub enum LineError {
    /// No line with this name exists.
    #[error("line '{name}' not found")]
    NotFound { name: String },

    /// The line exists but its controller is not ready.
    #[error("line '{name}' is not ready")]
    Deferred { name: String },

    /// The line cannot raise interrupts.
    #[error("line '{name}' has no interrupt")]
    NoInterrupt { name: String },

    /// The interrupt controller refused the handler.
    #[error("IRQ {irq} refused handler: {reason}")]
    InstallRefused { irq: u32, reason: String },

    /// The device lifecycle would not take a teardown action.
    #[error("teardown action rejected: {reason}")]
    Lifecycle { reason: String },
}

impl From<LineError> for PpsError {
    fn from(err: LineError) -> Self {
        match err {
            LineError::NotFound { name } => PpsError::ResourceUnavailable { line: name },
            LineError::Deferred { name } => PpsError::Deferred { line: name },
            LineError::NoInterrupt { name } => PpsError::CapabilityMissing {
                what: format!("interrupt for line '{}'", name),
            },
            LineError::InstallRefused { irq, reason } => PpsError::io(
                format!("install handler on IRQ {}", irq),
                std::io::Error::new(std::io::ErrorKind::Other, reason),
            ),
            LineError::Lifecycle { reason } => PpsError::io(
                "register teardown action",
                std::io::Error::new(std::io::ErrorKind::Other, reason),
            ),
        }
    }
}

/// Callback run on each interrupt of a line.
///
/// Runs in the provider's interrupt context: implementations must not block,
/// allocate or log.
pub trait EdgeHandler: Send + Sync {
    /// Service one interrupt.
    fn on_edge(&self) -> IrqReturn;
}

/// Resolves named input lines.
pub trait LineProvider: Send + Sync {
    /// Look up a line by its configured name.
    fn resolve(&self, name: &str) -> Result<Arc<dyn InputLine>, LineError>;
}

/// A digital input line.
pub trait InputLine: Send + Sync {
    /// Line name.
    fn name(&self) -> &str;

    /// Current level, true when active. Must be callable from the interrupt
    /// context.
    fn is_active(&self) -> bool;

    /// The interrupt path of this line.
    fn interrupt(&self) -> Result<Arc<dyn InterruptLine>, LineError>;
}

/// Interrupt path of one input line.
pub trait InterruptLine: Send + Sync {
    /// Interrupt number, for logging.
    fn irq(&self) -> u32;

    /// Install `handler` for `trigger`. The handler stays installed until
    /// the returned token is dropped.
    fn install(
        &self,
        trigger: Trigger,
        label: &str,
        handler: Arc<dyn EdgeHandler>,
    ) -> Result<DispatchToken, LineError>;
}

/// Device lifecycle hook.
pub trait DeviceLifecycle: Send + Sync {
    /// Run `action` when the device goes away.
    ///
    /// On error the action has not been stored and the caller must run its
    /// teardown itself.
    fn add_teardown_action(&self, action: Box<dyn FnOnce() + Send>) -> Result<(), LineError>;
}

/// Ownership of an installed handler.
///
/// Dropping the token uninstalls the handler.
pub struct DispatchToken {
    irq: u32,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl DispatchToken {
    /// Create a token that runs `release` when dropped.
    pub fn new(irq: u32, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            irq,
            release: Some(Box::new(release)),
        }
    }

    /// Interrupt number the handler is installed on.
    pub fn irq(&self) -> u32 {
        self.irq
    }
}

impl Drop for DispatchToken {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchToken").field("irq", &self.irq).finish()
    }
}
