//! Source registry.
//!
//! The registry is the service boundary through which capture sources come
//! into existence. It enforces unique names, hands out the lowest free id
//! (and with it the `/dev/pps{id}` path), and lets clients find a source by
//! path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{PpsError, Result};
use crate::mode::Mode;
use crate::source::{CaptureSource, Parameters, SourceInfo};
use crate::wait::DEFAULT_POLL_INTERVAL;

/// Maximum number of sources one registry holds.
pub const MAX_SOURCES: usize = 16;

/// Registry of live capture sources.
pub struct SourceRegistry {
    sources: Mutex<BTreeMap<u32, Arc<CaptureSource>>>,
    poll_interval: Duration,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Create an empty registry whose sources re-check at `poll_interval`
    /// when they cannot block.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            sources: Mutex::new(BTreeMap::new()),
            poll_interval,
        }
    }

    /// Register a new source with initial mode `defaults`.
    ///
    /// # Errors
    ///
    /// - [`PpsError::InvalidParameters`] if `defaults` is not a subset of the
    ///   capability, or the capability names no time format.
    /// - [`PpsError::RegistrationConflict`] if the name is taken.
    /// - [`PpsError::OutOfResources`] if [`MAX_SOURCES`] are registered.
    pub fn register(&self, info: SourceInfo, defaults: Mode) -> Result<Arc<CaptureSource>> {
        if !info.capability.contains(defaults) {
            return Err(PpsError::InvalidParameters {
                reason: format!("unsupported default parameters for '{}'", info.name),
            });
        }
        if !info.capability.has_time_format() {
            return Err(PpsError::InvalidParameters {
                reason: format!("unspecified time format for '{}'", info.name),
            });
        }

        let mut sources = self.sources.lock();
        if sources.values().any(|s| s.name() == info.name) {
            return Err(PpsError::RegistrationConflict { name: info.name });
        }

        let id = (0..MAX_SOURCES as u32)
            .find(|id| !sources.contains_key(id))
            .ok_or(PpsError::OutOfResources { limit: MAX_SOURCES })?;

        let source = Arc::new(CaptureSource::new(
            id,
            info,
            Parameters::new(defaults),
            self.poll_interval,
        ));
        sources.insert(id, Arc::clone(&source));

        info!(source = %source.name(), path = %source.path(), "New PPS source");
        Ok(source)
    }

    /// Remove a source. Waiters on it are released with
    /// [`PpsError::Unregistered`]. Returns false if it was not registered.
    pub fn unregister(&self, source: &CaptureSource) -> bool {
        let removed = {
            let mut sources = self.sources.lock();
            match sources.get(&source.id()) {
                Some(existing) if std::ptr::eq(Arc::as_ptr(existing), source) => {
                    sources.remove(&source.id())
                }
                _ => None,
            }
        };

        match removed {
            Some(removed) => {
                removed.mark_unregistered();
                debug!(source = %removed.name(), "Unregistered PPS source");
                true
            }
            None => false,
        }
    }

    /// Find a source by its `/dev/pps{id}` path.
    pub fn lookup(&self, path: &str) -> Option<Arc<CaptureSource>> {
        self.sources
            .lock()
            .values()
            .find(|s| s.path() == path)
            .cloned()
    }

    /// Find a source by name.
    pub fn by_name(&self, name: &str) -> Option<Arc<CaptureSource>> {
        self.sources
            .lock()
            .values()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Names of all registered sources, in id order.
    pub fn names(&self) -> Vec<String> {
        self.sources
            .lock()
            .values()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.lock().len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.lock().is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Mode {
        Mode::CAPTURE_ASSERT | Mode::CAN_WAIT | Mode::TSFMT_TSPEC
    }

    #[test]
    fn test_register_assigns_lowest_free_id() {
        let registry = SourceRegistry::new();
        let a = registry.register(SourceInfo::new("a", caps()), Mode::CAPTURE_ASSERT).unwrap();
        let b = registry.register(SourceInfo::new("b", caps()), Mode::CAPTURE_ASSERT).unwrap();
        assert_eq!(a.path(), "/dev/pps0");
        assert_eq!(b.path(), "/dev/pps1");

        assert!(registry.unregister(&a));
        let c = registry.register(SourceInfo::new("c", caps()), Mode::CAPTURE_ASSERT).unwrap();
        assert_eq!(c.id(), 0);
        assert_eq!(registry.names(), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let registry = SourceRegistry::new();
        registry.register(SourceInfo::new("dup", caps()), Mode::CAPTURE_ASSERT).unwrap();
        let err = registry
            .register(SourceInfo::new("dup", caps()), Mode::CAPTURE_ASSERT)
            .unwrap_err();
        assert!(matches!(err, PpsError::RegistrationConflict { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_out_of_resources() {
        let registry = SourceRegistry::new();
        for i in 0..MAX_SOURCES {
            registry
                .register(SourceInfo::new(format!("s{}", i), caps()), Mode::CAPTURE_ASSERT)
                .unwrap();
        }
        let err = registry
            .register(SourceInfo::new("one-too-many", caps()), Mode::CAPTURE_ASSERT)
            .unwrap_err();
        assert!(matches!(err, PpsError::OutOfResources { limit: MAX_SOURCES }));
    }

    #[test]
    fn test_rejects_unsupported_defaults() {
        let registry = SourceRegistry::new();
        let err = registry
            .register(SourceInfo::new("x", caps()), Mode::CAPTURE_CLEAR)
            .unwrap_err();
        assert!(matches!(err, PpsError::InvalidParameters { .. }));

        let err = registry
            .register(SourceInfo::new("y", Mode::CAPTURE_ASSERT), Mode::CAPTURE_ASSERT)
            .unwrap_err();
        assert!(matches!(err, PpsError::InvalidParameters { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_and_unregister() {
        let registry = SourceRegistry::new();
        let src = registry.register(SourceInfo::new("a", caps()), Mode::CAPTURE_ASSERT).unwrap();
        assert!(registry.lookup("/dev/pps0").is_some());
        assert!(registry.by_name("a").is_some());

        assert!(registry.unregister(&src));
        assert!(!src.is_registered());
        assert!(registry.lookup("/dev/pps0").is_none());
        assert!(!registry.unregister(&src));
    }
}
