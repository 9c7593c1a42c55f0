//! Capture sources.
//!
//! A [`CaptureSource`] is the named, independently addressable endpoint that
//! holds the timestamped events of one capture line. It owns one
//! [`EventMailbox`] per edge kind, the advertised capability, and the
//! negotiated parameters. Sources are created by
//! [`SourceRegistry::register`](crate::registry::SourceRegistry::register).
//!
//! # Publishing vs. fetching
//!
//! [`CaptureSource::publish`] runs in the dispatch context of the line's
//! interrupt path. It reads the parameters, stores the event in the mailbox
//! and then wakes waiters inside a short critical section. That critical
//! section is the only lock the dispatch path takes.
//!
//! [`CaptureSource::fetch`] runs in ordinary context. It returns at once if
//! an event was published since the previous fetch. Otherwise it waits
//! according to the source's [`WaitStrategy`].

use std::hint::spin_loop;
use std::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use crate::error::{PpsError, Result};
use crate::event::{EdgeKind, PpsInfo};
use crate::mailbox::EventMailbox;
use crate::mode::{Mode, PPS_API_VERSION};
use crate::time::PpsTime;
use crate::wait::{FetchTimeout, WaitStrategy};

/// Registration request for a new source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Unique source name.
    pub name: String,
    /// Advertised capability.
    pub capability: Mode,
}

impl SourceInfo {
    /// Create a registration request.
    pub fn new(name: impl Into<String>, capability: Mode) -> Self {
        Self {
            name: name.into(),
            capability,
        }
    }
}

/// Negotiated parameters of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    /// API version, always [`PPS_API_VERSION`] when read back.
    pub api_version: i32,
    /// Enabled mode flags.
    pub mode: Mode,
    /// Offset added to assert timestamps when `OFFSET_ASSERT` is enabled.
    pub assert_offset: PpsTime,
    /// Offset added to clear timestamps when `OFFSET_CLEAR` is enabled.
    pub clear_offset: PpsTime,
}

impl Parameters {
    /// Parameters with the given mode and zero offsets.
    pub fn new(mode: Mode) -> Self {
        Self {
            api_version: PPS_API_VERSION,
            mode,
            assert_offset: PpsTime::ZERO,
            clear_offset: PpsTime::ZERO,
        }
    }

    /// Offset for an edge kind.
    pub fn offset(&self, kind: EdgeKind) -> PpsTime {
        match kind {
            EdgeKind::Assert => self.assert_offset,
            EdgeKind::Clear => self.clear_offset,
        }
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new(Mode::empty())
    }
}

/// A registered time-reference endpoint for one capture line.
pub struct CaptureSource {
    id: u32,
    name: String,
    path: String,
    capability: Mode,
    params: RwLock<Parameters>,
    assert: EventMailbox,
    clear: EventMailbox,
    current_mode: AtomicI32,
    /// Odd while an event is being stored, advanced by two per captured event.
    generation: AtomicU64,
    /// Generation observed by the most recent fetch.
    last_fetched: AtomicU64,
    registered: AtomicBool,
    wake: Mutex<()>,
    wake_cv: Condvar,
    poll_interval: Duration,
}

impl CaptureSource {
    pub(crate) fn new(
        id: u32,
        info: SourceInfo,
        defaults: Parameters,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            path: format!("/dev/pps{}", id),
            name: info.name,
            capability: info.capability,
            params: RwLock::new(defaults),
            assert: EventMailbox::new(),
            clear: EventMailbox::new(),
            current_mode: AtomicI32::new(defaults.mode.bits()),
            generation: AtomicU64::new(0),
            last_fetched: AtomicU64::new(0),
            registered: AtomicBool::new(true),
            wake: Mutex::new(()),
            wake_cv: Condvar::new(),
            poll_interval,
        }
    }

    /// Registry id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device-style path, `/dev/pps{id}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Advertised capability.
    pub fn capability(&self) -> Mode {
        self.capability
    }

    /// Whether the source is still registered.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Current negotiated parameters.
    pub fn parameters(&self) -> Parameters {
        *self.params.read()
    }

    /// Replace the negotiated parameters.
    ///
    /// The committed mode is the requested mode masked by the capability, so
    /// a flag the source does not advertise is never granted. The request is
    /// rejected if neither capture flag survives. A time format is filled in
    /// when none was requested, `CAN_WAIT` is kept when advertised, and an
    /// offset is only kept when its offset flag survives.
    pub fn set_parameters(&self, requested: Parameters) -> Result<Parameters> {
        self.ensure_registered()?;

        let mut mode = requested.mode & self.capability;
        if !mode.intersects(Mode::CAPTURE_BOTH) {
            return Err(PpsError::InvalidParameters {
                reason: format!("capture mode unspecified for '{}'", self.name),
            });
        }
        if !mode.has_time_format() {
            mode |= if self.capability.contains(Mode::TSFMT_TSPEC) {
                Mode::TSFMT_TSPEC
            } else {
                self.capability & Mode::TSFMT_ANY
            };
        }
        if self.capability.contains(Mode::CAN_WAIT) {
            mode |= Mode::CAN_WAIT;
        }

        let dropped = requested.mode - self.capability;
        if !dropped.is_empty() {
            debug!(source = %self.name, ?dropped, "Ignoring unsupported mode flags");
        }

        let committed = Parameters {
            api_version: PPS_API_VERSION,
            mode,
            assert_offset: if mode.contains(Mode::OFFSET_ASSERT) {
                requested.assert_offset
            } else {
                PpsTime::ZERO
            },
            clear_offset: if mode.contains(Mode::OFFSET_CLEAR) {
                requested.clear_offset
            } else {
                PpsTime::ZERO
            },
        };

        *self.params.write() = committed;
        debug!(source = %self.name, mode = ?committed.mode, "Committed PPS parameters");
        Ok(committed)
    }

    /// Record an edge captured at `time`.
    ///
    /// Called from the dispatch context: never allocates and never blocks
    /// beyond the wake-up critical section. The event is dropped when the
    /// negotiated mode does not capture its kind. Returns the new sequence
    /// number of that kind when the event was recorded.
    pub fn publish(&self, kind: EdgeKind, time: PpsTime) -> Option<u32> {
        let params = *self.params.read();
        self.current_mode.store(params.mode.bits(), Ordering::Relaxed);

        if !params.mode.captures(kind) {
            return None;
        }

        let time = if params.mode.contains(Mode::offset_flag(kind)) {
            time.add_offset(params.offset(kind))
        } else {
            time
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        let sequence = self.mailbox(kind).publish(time);

        let _guard = self.wake.lock();
        self.generation.fetch_add(1, Ordering::Release);
        self.wake_cv.notify_all();

        Some(sequence)
    }

    /// Current contents of both mailboxes.
    pub fn snapshot(&self) -> PpsInfo {
        PpsInfo {
            assert: self.assert.read(),
            clear: self.clear.read(),
            current_mode: Mode::from_bits_retain(self.current_mode.load(Ordering::Relaxed)),
        }
    }

    /// Fetch the latest events.
    ///
    /// Returns immediately when an event was published since the previous
    /// fetch, or when `timeout` is [`FetchTimeout::Immediate`]. Otherwise
    /// waits for the next event: blocking when the source advertises
    /// `CAN_WAIT`, re-checking every poll interval when it does not.
    pub fn fetch(&self, timeout: FetchTimeout) -> Result<PpsInfo> {
        self.ensure_registered()?;

        let seen = self.last_fetched.load(Ordering::Acquire);
        if self.generation.load(Ordering::Acquire) == seen && timeout != FetchTimeout::Immediate {
            let deadline = timeout.duration().map(|d| Instant::now() + d);
            let waited = timeout.duration().unwrap_or_default();
            match WaitStrategy::for_capability(self.capability, self.poll_interval) {
                WaitStrategy::Block => self.wait_blocking(seen, deadline, waited)?,
                WaitStrategy::Poll { interval } => {
                    self.wait_polling(seen, deadline, interval, waited)?
                }
            }
        }

        let (generation, info) = self.consistent_snapshot();
        self.last_fetched.store(generation, Ordering::Release);
        Ok(info)
    }

    /// Snapshot together with the generation it covers.
    ///
    /// Retries while an event is being stored, so the returned generation
    /// accounts for exactly the events in the snapshot.
    fn consistent_snapshot(&self) -> (u64, PpsInfo) {
        loop {
            let before = self.generation.load(Ordering::Acquire);
            if before & 1 == 1 {
                spin_loop();
                continue;
            }

            let info = self.snapshot();

            fence(Ordering::Acquire);
            if self.generation.load(Ordering::Relaxed) == before {
                return (before, info);
            }
            spin_loop();
        }
    }

    /// Mark the source unregistered and release every waiter.
    pub(crate) fn mark_unregistered(&self) {
        self.registered.store(false, Ordering::Release);
        let _guard = self.wake.lock();
        self.wake_cv.notify_all();
    }

    fn wait_blocking(&self, seen: u64, deadline: Option<Instant>, waited: Duration) -> Result<()> {
        let mut guard = self.wake.lock();
        while self.generation.load(Ordering::Acquire) == seen {
            self.ensure_registered()?;
            match deadline {
                Some(deadline) => {
                    let timed_out = self.wake_cv.wait_until(&mut guard, deadline).timed_out();
                    if timed_out && self.generation.load(Ordering::Acquire) == seen {
                        return Err(PpsError::Timeout { waited });
                    }
                }
                None => self.wake_cv.wait(&mut guard),
            }
        }
        Ok(())
    }

    fn wait_polling(
        &self,
        seen: u64,
        deadline: Option<Instant>,
        interval: Duration,
        waited: Duration,
    ) -> Result<()> {
        loop {
            if self.generation.load(Ordering::Acquire) != seen {
                return Ok(());
            }
            self.ensure_registered()?;

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PpsError::Timeout { waited });
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            std::thread::sleep(nap);
        }
    }

    fn mailbox(&self, kind: EdgeKind) -> &EventMailbox {
        match kind {
            EdgeKind::Assert => &self.assert,
            EdgeKind::Clear => &self.clear,
        }
    }

    fn ensure_registered(&self) -> Result<()> {
        if self.is_registered() {
            Ok(())
        } else {
            Err(PpsError::Unregistered {
                name: self.name.clone(),
            })
        }
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const GPIO_LIKE: Mode = Mode::CAPTURE_ASSERT
        .union(Mode::CAPTURE_CLEAR)
        .union(Mode::OFFSET_ASSERT)
        .union(Mode::ECHO_ASSERT)
        .union(Mode::CAN_WAIT)
        .union(Mode::TSFMT_TSPEC);

    fn source(capability: Mode, defaults: Mode) -> CaptureSource {
        CaptureSource::new(
            0,
            SourceInfo::new("test.GPIO00", capability),
            Parameters::new(defaults),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_set_parameters_masks_capability() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_ASSERT);
        let committed = src
            .set_parameters(Parameters::new(
                Mode::CAPTURE_ASSERT | Mode::OFFSET_CLEAR | Mode::CAN_POLL,
            ))
            .unwrap();

        assert!(GPIO_LIKE.contains(committed.mode));
        assert!(committed.mode.contains(Mode::CAPTURE_ASSERT));
        assert!(committed.mode.contains(Mode::CAN_WAIT));
        assert!(committed.mode.contains(Mode::TSFMT_TSPEC));
        assert!(!committed.mode.contains(Mode::OFFSET_CLEAR));
        assert_eq!(src.parameters(), committed);
    }

    #[test]
    fn test_set_parameters_requires_capture_mode() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_ASSERT);
        let err = src
            .set_parameters(Parameters::new(Mode::OFFSET_ASSERT))
            .unwrap_err();
        assert!(matches!(err, PpsError::InvalidParameters { .. }));
        assert_eq!(src.parameters().mode, Mode::CAPTURE_ASSERT);
    }

    #[test]
    fn test_offset_only_kept_with_flag() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_ASSERT);
        let mut request = Parameters::new(Mode::CAPTURE_ASSERT);
        request.assert_offset = PpsTime::from_nanos(250);
        assert_eq!(src.set_parameters(request).unwrap().assert_offset, PpsTime::ZERO);

        request.mode |= Mode::OFFSET_ASSERT;
        assert_eq!(
            src.set_parameters(request).unwrap().assert_offset,
            PpsTime::from_nanos(250)
        );
    }

    #[test]
    fn test_publish_respects_mode() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_ASSERT);
        assert_eq!(src.publish(EdgeKind::Assert, PpsTime::new(5, 0)), Some(1));
        assert_eq!(src.publish(EdgeKind::Clear, PpsTime::new(5, 1)), None);

        let info = src.snapshot();
        assert_eq!(info.sequences(), (1, 0));
        assert_eq!(info.assert.time, PpsTime::new(5, 0));
    }

    #[test]
    fn test_publish_applies_offset() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_ASSERT);
        let mut request = Parameters::new(Mode::CAPTURE_ASSERT | Mode::OFFSET_ASSERT);
        request.assert_offset = PpsTime::from_nanos(-100);
        src.set_parameters(request).unwrap();

        src.publish(EdgeKind::Assert, PpsTime::new(10, 0));
        assert_eq!(src.snapshot().assert.time, PpsTime::new(9, 999_999_900));
    }

    #[test]
    fn test_fetch_returns_unconsumed_immediately() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_BOTH);
        src.publish(EdgeKind::Assert, PpsTime::new(1, 0));

        let start = Instant::now();
        let info = src.fetch(FetchTimeout::Within(Duration::from_secs(5))).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(info.assert.sequence, 1);
    }

    #[test]
    fn test_fetch_never_repeats_a_consumed_event() {
        let src = Arc::new(source(GPIO_LIKE, Mode::CAPTURE_ASSERT));
        let publisher = {
            let src = Arc::clone(&src);
            std::thread::spawn(move || {
                for sec in 1..=2_000 {
                    src.publish(EdgeKind::Assert, PpsTime::new(sec, 0));
                }
            })
        };

        let mut last = 0;
        loop {
            match src.fetch(FetchTimeout::Within(Duration::from_millis(200))) {
                Ok(info) => {
                    assert!(
                        info.assert.sequence > last,
                        "sequence {} returned twice",
                        info.assert.sequence
                    );
                    last = info.assert.sequence;
                }
                Err(PpsError::Timeout { .. }) => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        publisher.join().unwrap();
        assert_eq!(last, 2_000);
    }

    #[test]
    fn test_fetch_immediate_never_waits() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_BOTH);
        let info = src.fetch(FetchTimeout::Immediate).unwrap();
        assert_eq!(info.sequences(), (0, 0));
    }

    #[test]
    fn test_blocking_fetch_times_out() {
        let src = source(GPIO_LIKE, Mode::CAPTURE_BOTH);
        let start = Instant::now();
        let err = src
            .fetch(FetchTimeout::Within(Duration::from_millis(50)))
            .unwrap_err();
        assert!(matches!(err, PpsError::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_blocking_fetch_woken_by_publish() {
        let src = Arc::new(source(GPIO_LIKE, Mode::CAPTURE_BOTH));
        let publisher = {
            let src = Arc::clone(&src);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                src.publish(EdgeKind::Assert, PpsTime::new(42, 0));
            })
        };

        let info = src.fetch(FetchTimeout::Within(Duration::from_secs(5))).unwrap();
        assert_eq!(info.assert.sequence, 1);
        assert_eq!(info.assert.time, PpsTime::new(42, 0));
        publisher.join().unwrap();
    }

    #[test]
    fn test_polling_fetch_without_can_wait() {
        let capability = Mode::CAPTURE_ASSERT | Mode::TSFMT_TSPEC;
        let src = source(capability, Mode::CAPTURE_ASSERT);

        let start = Instant::now();
        let err = src
            .fetch(FetchTimeout::Within(Duration::from_millis(70)))
            .unwrap_err();
        assert!(matches!(err, PpsError::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn test_unregister_releases_waiters() {
        let src = Arc::new(source(GPIO_LIKE, Mode::CAPTURE_BOTH));
        let waiter = {
            let src = Arc::clone(&src);
            std::thread::spawn(move || src.fetch(FetchTimeout::Forever))
        };

        std::thread::sleep(Duration::from_millis(30));
        src.mark_unregistered();
        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(PpsError::Unregistered { .. })));
    }
}
