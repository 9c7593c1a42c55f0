//! Report line formatting.

use std::fmt;

use pps_core::PpsInfo;

/// One line of client output for a fetched event pair.
///
/// ```text
/// device /dev/pps0 - assert 1700000000.000000123 - sequence 42 - clear 0000000000.000000000 - sequence 0
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    path: &'a str,
    info: &'a PpsInfo,
}

impl<'a> Report<'a> {
    /// Report for `info` fetched from `path`.
    pub fn new(path: &'a str, info: &'a PpsInfo) -> Self {
        Self { path, info }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {} - assert {} - sequence {} - clear {} - sequence {}",
            self.path,
            self.info.assert.time,
            self.info.assert.sequence,
            self.info.clear.time,
            self.info.clear.sequence
        )
    }
}
