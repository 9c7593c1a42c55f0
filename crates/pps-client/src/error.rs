//! Client error types.

use pps_core::PpsError;
use thiserror::Error;

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur in a PPS client session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The device could not be opened or queried.
    #[error("Unable to open device {path}: {source}")]
    Connection {
        path: String,
        #[source]
        source: PpsError,
    },

    /// The device lacks a capability the session needs.
    #[error("Device {path} cannot {what}")]
    CapabilityMissing { path: String, what: String },

    /// `fetch` or `run` was called before `negotiate`.
    #[error("Session parameters not negotiated")]
    NotNegotiated,

    /// `negotiate` was called a second time.
    #[error("Session parameters already negotiated")]
    AlreadyNegotiated,

    /// A device operation failed.
    #[error(transparent)]
    Device(#[from] PpsError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A report line could not be written.
    #[error("Unable to write report: {0}")]
    Output(#[source] std::io::Error),
}

impl From<figment::Error> for ClientError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl ClientError {
    /// Whether the session ended because no event arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Device(PpsError::Timeout { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_display() {
        let err = ClientError::CapabilityMissing {
            path: "/dev/pps0".into(),
            what: "CAPTUREASSERT".into(),
        };
        assert_eq!(err.to_string(), "Device /dev/pps0 cannot CAPTUREASSERT");

        let err = ClientError::Connection {
            path: "/dev/pps3".into(),
            source: PpsError::io(
                "open /dev/pps3",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ),
        };
        assert!(err.to_string().starts_with("Unable to open device /dev/pps3"));
    }

    #[test]
    fn test_timeout_detection() {
        let err: ClientError = PpsError::Timeout {
            waited: Duration::from_secs(3),
        }
        .into();
        assert!(err.is_timeout());
        assert!(!ClientError::NotNegotiated.is_timeout());
    }
}
