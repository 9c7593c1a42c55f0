//! `pps-core`
//!
//! Core types for pulse-per-second (PPS) capture.
//!
//! A PPS signal is a pulse train whose edges mark second boundaries. This
//! crate models the consumer-facing half of a capture engine: named capture
//! sources that keep only the latest timestamped event of each edge kind, a
//! registry that hands them out under `/dev/pps{id}` paths, and the
//! [`PpsDevice`] control surface through which clients negotiate parameters
//! and fetch events.
//!
//! ## Key Types
//!
//! - [`CaptureSource`]: one line's events, parameters and waiters
//! - [`SourceRegistry`]: unique names, lowest-free ids, lookup by path
//! - [`EventMailbox`]: lock-free single-slot latest-value container
//! - [`Mode`]: capability and mode flags
//! - [`PpsError`]: error taxonomy shared with the client
//!
//! ## Example
//!
//! ```rust
//! use pps_core::{EdgeKind, FetchTimeout, Mode, PpsTime, SourceInfo, SourceRegistry};
//!
//! let registry = SourceRegistry::new();
//! let caps = Mode::CAPTURE_ASSERT | Mode::CAN_WAIT | Mode::TSFMT_TSPEC;
//! let source = registry
//!     .register(SourceInfo::new("demo.GPIO00", caps), Mode::CAPTURE_ASSERT)
//!     .unwrap();
//!
//! source.publish(EdgeKind::Assert, PpsTime::new(1_700_000_000, 0));
//! let info = source.fetch(FetchTimeout::Immediate).unwrap();
//! assert_eq!(info.assert.sequence, 1);
//! ```

pub mod device;
pub mod error;
pub mod event;
pub mod mailbox;
pub mod mode;
pub mod registry;
pub mod source;
pub mod time;
pub mod wait;

pub use device::{LocalDevice, PpsDevice};
pub use error::{ErrorClass, PpsError, Result};
pub use event::{EdgeKind, PpsEvent, PpsInfo};
pub use mailbox::EventMailbox;
pub use mode::{Mode, PPS_API_VERSION};
pub use registry::{SourceRegistry, MAX_SOURCES};
pub use source::{CaptureSource, Parameters, SourceInfo};
pub use time::{Clock, PpsTime, SystemClock};
pub use wait::{FetchTimeout, WaitStrategy, DEFAULT_POLL_INTERVAL};
