//! Linux `/dev/ppsN` backend.
//!
//! Talks to the kernel PPS character device through the `PPS_GETCAP`,
//! `PPS_GETPARAMS`, `PPS_SETPARAMS` and `PPS_FETCH` ioctls. Blocking fetches
//! run on tokio's blocking pool.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pps_core::{
    FetchTimeout, Mode, Parameters, PpsDevice, PpsError, PpsEvent, PpsInfo, PpsTime, Result,
};

/// `pps_ktime.flags` bit asking fetch to wait without a deadline.
const PPS_TIME_INVALID: u32 = 1 << 0;

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

/// `_IOC(dir, 'p', nr, sizeof(void *))`: the PPS ioctls are declared with a
/// pointer argument type.
const fn ioc(dir: u64, nr: u64) -> u64 {
    (dir << 30) | ((std::mem::size_of::<*mut c_void>() as u64) << 16) | ((b'p' as u64) << 8) | nr
}

const PPS_GETPARAMS: u64 = ioc(IOC_READ, 0xa1);
const PPS_SETPARAMS: u64 = ioc(IOC_WRITE, 0xa2);
const PPS_GETCAP: u64 = ioc(IOC_READ, 0xa3);
const PPS_FETCH: u64 = ioc(IOC_READ | IOC_WRITE, 0xa4);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct KTime {
    sec: i64,
    nsec: i32,
    flags: u32,
}

impl KTime {
    fn from_time(time: PpsTime) -> Self {
        Self {
            sec: time.sec,
            nsec: time.nsec,
            flags: 0,
        }
    }

    fn to_time(self) -> PpsTime {
        PpsTime::new(self.sec, i64::from(self.nsec))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct KInfo {
    assert_sequence: u32,
    clear_sequence: u32,
    assert_tu: KTime,
    clear_tu: KTime,
    current_mode: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct KParams {
    api_version: c_int,
    mode: c_int,
    assert_off_tu: KTime,
    clear_off_tu: KTime,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct FData {
    info: KInfo,
    timeout: KTime,
}

fn ioctl<T>(file: &File, request: u64, arg: &mut T) -> io::Result<()> {
    // SAFETY: `arg` is an exclusive reference to a repr(C) value laid out as
    // the kernel expects for `request`, valid for the whole call.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg as *mut T) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// An open kernel PPS device.
#[derive(Debug, Clone)]
pub struct CharDevice {
    path: String,
    file: Arc<File>,
}

impl CharDevice {
    /// Open `path` for reading and writing.
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| PpsError::io(format!("open {}", path), e))?;
        Ok(Self {
            path: path.to_string(),
            file: Arc::new(file),
        })
    }

    fn fetch_blocking(file: &File, timeout: FetchTimeout) -> Result<PpsInfo> {
        let mut data = FData {
            timeout: match timeout {
                FetchTimeout::Forever => KTime {
                    flags: PPS_TIME_INVALID,
                    ..KTime::default()
                },
                other => KTime::from_time(other.duration().unwrap_or_default().into()),
            },
            ..FData::default()
        };

        let waited = timeout.duration().unwrap_or(Duration::ZERO);
        ioctl(file, PPS_FETCH, &mut data).map_err(|e| PpsError::from_os("PPS_FETCH", e, waited))?;

        Ok(PpsInfo {
            assert: PpsEvent {
                time: data.info.assert_tu.to_time(),
                sequence: data.info.assert_sequence,
            },
            clear: PpsEvent {
                time: data.info.clear_tu.to_time(),
                sequence: data.info.clear_sequence,
            },
            current_mode: Mode::from_bits_retain(data.info.current_mode),
        })
    }
}

#[async_trait]
impl PpsDevice for CharDevice {
    fn path(&self) -> &str {
        &self.path
    }

    async fn capability(&self) -> Result<Mode> {
        let mut caps: c_int = 0;
        ioctl(&self.file, PPS_GETCAP, &mut caps).map_err(|e| PpsError::io("PPS_GETCAP", e))?;
        Ok(Mode::from_bits_retain(caps))
    }

    async fn parameters(&self) -> Result<Parameters> {
        let mut params = KParams::default();
        ioctl(&self.file, PPS_GETPARAMS, &mut params)
            .map_err(|e| PpsError::io("PPS_GETPARAMS", e))?;
        Ok(Parameters {
            api_version: params.api_version,
            mode: Mode::from_bits_retain(params.mode),
            assert_offset: params.assert_off_tu.to_time(),
            clear_offset: params.clear_off_tu.to_time(),
        })
    }

    async fn set_parameters(&self, params: Parameters) -> Result<Parameters> {
        let mut raw = KParams {
            api_version: params.api_version,
            mode: params.mode.bits(),
            assert_off_tu: KTime::from_time(params.assert_offset),
            clear_off_tu: KTime::from_time(params.clear_offset),
        };
        ioctl(&self.file, PPS_SETPARAMS, &mut raw).map_err(|e| match e.raw_os_error() {
            Some(libc::EINVAL) => PpsError::InvalidParameters {
                reason: format!("{} rejected mode {:#x}", self.path, params.mode.bits()),
            },
            _ => PpsError::io("PPS_SETPARAMS", e),
        })?;
        self.parameters().await
    }

    async fn fetch(&self, timeout: FetchTimeout) -> Result<PpsInfo> {
        if timeout == FetchTimeout::Immediate {
            return Self::fetch_blocking(&self.file, timeout);
        }

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || Self::fetch_blocking(&file, timeout))
            .await
            .map_err(|e| {
                PpsError::io(
                    "PPS_FETCH task join",
                    io::Error::new(io::ErrorKind::Other, e),
                )
            })?
    }
}
