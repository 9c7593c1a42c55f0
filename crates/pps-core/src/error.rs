//! Error types for PPS capture and retrieval.
//!
//! [`PpsError`] is shared by the capture engine and the client. Each variant
//! falls into one of the [`ErrorClass`] categories, which is what callers use
//! to decide between retrying and giving up:
//!
//! - **ResourceUnavailable**: a named line is absent or not ready yet
//!   (`ResourceUnavailable`, `Deferred`). May be transient.
//! - **CapabilityMissing**: the hardware or channel lacks a required optional
//!   behavior. Fatal to that configuration.
//! - **RegistrationConflict**: a source with the same name already exists.
//! - **InterruptedWait**: a signal arrived during a blocking fetch. Always
//!   retried by the fetch protocol and never surfaced to the user.
//! - **IoFailure**: everything else, propagated with its underlying cause.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for PPS operations.
pub type Result<T> = std::result::Result<T, PpsError>;

/// Coarse classification of a [`PpsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Named line not found or not yet ready.
    ResourceUnavailable,
    /// A required optional behavior is unsupported.
    CapabilityMissing,
    /// Duplicate source name.
    RegistrationConflict,
    /// Signal delivered during a blocking wait.
    InterruptedWait,
    /// Any other failure.
    IoFailure,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorClass::ResourceUnavailable => "resource_unavailable",
            ErrorClass::CapabilityMissing => "capability_missing",
            ErrorClass::RegistrationConflict => "registration_conflict",
            ErrorClass::InterruptedWait => "interrupted_wait",
            ErrorClass::IoFailure => "io_failure",
        };
        write!(f, "{}", label)
    }
}

/// Errors that can occur while capturing or fetching PPS events.
#[derive(Error, Debug)]
pub enum PpsError {
    /// The named input line does not exist.
    #[error("PPS line '{line}' is not available")]
    ResourceUnavailable { line: String },

    /// The backing resource of the named line is not ready yet.
    #[error("PPS line '{line}' is not ready yet, probe again later")]
    Deferred { line: String },

    /// A required optional behavior is not supported.
    #[error("Capability missing: {what}")]
    CapabilityMissing { what: String },

    /// A source with the same name is already registered.
    #[error("PPS source '{name}' is already registered")]
    RegistrationConflict { name: String },

    /// The source registry has no free slot left.
    #[error("No free PPS source slot (limit {limit})")]
    OutOfResources { limit: usize },

    /// Parameters were rejected.
    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    /// Lines are already acquired; tear them down first.
    #[error("Capture lines are already active")]
    AlreadyActive,

    /// A blocking wait was interrupted by a signal.
    #[error("Wait interrupted by signal")]
    Interrupted,

    /// No event arrived before the timeout elapsed.
    #[error("No PPS event within {waited:?}")]
    Timeout { waited: Duration },

    /// The source was unregistered while in use.
    #[error("PPS source '{name}' is no longer registered")]
    Unregistered { name: String },

    /// Underlying I/O failure with context.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PpsError {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Map an OS error from a blocking device call.
    ///
    /// `EINTR` becomes [`PpsError::Interrupted`] and `ETIMEDOUT` becomes
    /// [`PpsError::Timeout`]; anything else is an I/O failure.
    pub fn from_os(context: impl Into<String>, source: std::io::Error, waited: Duration) -> Self {
        match source.kind() {
            std::io::ErrorKind::Interrupted => Self::Interrupted,
            std::io::ErrorKind::TimedOut => Self::Timeout { waited },
            _ => Self::io(context, source),
        }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ResourceUnavailable { .. } | Self::Deferred { .. } => {
                ErrorClass::ResourceUnavailable
            }
            Self::CapabilityMissing { .. } => ErrorClass::CapabilityMissing,
            Self::RegistrationConflict { .. } => ErrorClass::RegistrationConflict,
            Self::Interrupted => ErrorClass::InterruptedWait,
            Self::OutOfResources { .. }
            | Self::InvalidParameters { .. }
            | Self::AlreadyActive
            | Self::Timeout { .. }
            | Self::Unregistered { .. }
            | Self::Io { .. } => ErrorClass::IoFailure,
        }
    }

    /// Whether the failure may go away if the operation is attempted later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Deferred { .. } | Self::Interrupted)
    }

    /// Whether the fetch protocol retries this error without surfacing it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
