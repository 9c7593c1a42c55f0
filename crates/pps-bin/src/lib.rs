//! Shared pieces of the PPS command-line tools.

pub mod logging;
