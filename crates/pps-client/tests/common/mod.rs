//! Scripted PPS device shared by the client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pps_core::{
    FetchTimeout, Mode, Parameters, PpsDevice, PpsError, PpsEvent, PpsInfo, PpsTime, Result,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Device that replays a fixed list of fetch results.
///
/// Once the script runs out, non-blocking fetches return the last snapshot
/// and blocking fetches time out.
#[derive(Clone)]
pub struct ScriptedDevice {
    inner: Arc<Inner>,
}

struct Inner {
    path: String,
    capability: Mode,
    params: Mutex<Parameters>,
    script: Mutex<VecDeque<Result<PpsInfo>>>,
    snapshot: Mutex<PpsInfo>,
    fetches: AtomicUsize,
    set_calls: AtomicUsize,
}

impl ScriptedDevice {
    pub fn new(capability: Mode) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: "/dev/pps0".to_string(),
                capability,
                params: Mutex::new(Parameters::new(Mode::empty())),
                script: Mutex::new(VecDeque::new()),
                snapshot: Mutex::new(PpsInfo::default()),
                fetches: AtomicUsize::new(0),
                set_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn push(&self, result: Result<PpsInfo>) -> &Self {
        self.inner.script.lock().unwrap().push_back(result);
        self
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.inner.set_calls.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Parameters {
        *self.inner.params.lock().unwrap()
    }
}

/// Fetch data with the given assert sequence and time.
pub fn assert_event(sequence: u32, sec: i64) -> PpsInfo {
    PpsInfo {
        assert: PpsEvent {
            time: PpsTime::new(sec, 0),
            sequence,
        },
        ..PpsInfo::default()
    }
}

#[async_trait]
impl PpsDevice for ScriptedDevice {
    fn path(&self) -> &str {
        &self.inner.path
    }

    async fn capability(&self) -> Result<Mode> {
        Ok(self.inner.capability)
    }

    async fn parameters(&self) -> Result<Parameters> {
        Ok(self.current())
    }

    async fn set_parameters(&self, params: Parameters) -> Result<Parameters> {
        self.inner.set_calls.fetch_add(1, Ordering::SeqCst);
        let mut committed = params;
        committed.mode &= self.inner.capability;
        *self.inner.params.lock().unwrap() = committed;
        Ok(committed)
    }

    async fn fetch(&self, timeout: FetchTimeout) -> Result<PpsInfo> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.inner.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(info)) => {
                *self.inner.snapshot.lock().unwrap() = info;
                Ok(info)
            }
            Some(Err(err)) => Err(err),
            None if timeout == FetchTimeout::Immediate => Ok(*self.inner.snapshot.lock().unwrap()),
            None => Err(PpsError::Timeout {
                waited: timeout.duration().unwrap_or(Duration::ZERO),
            }),
        }
    }
}
