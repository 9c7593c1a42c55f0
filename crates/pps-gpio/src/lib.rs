//! `pps-gpio`
//!
//! GPIO pulse-per-second capture engine.
//!
//! Up to eight input lines, selected by a bitmask, each become an
//! independent PPS capture source. Every enabled line gets an
//! [`EdgeDispatcher`] on its interrupt path that timestamps the edge,
//! classifies it from the line level and publishes it into the line's
//! [`CaptureSource`](pps_core::CaptureSource).
//!
//! ## Key Types
//!
//! - [`GpioPpsDriver`]: all-or-nothing registration (`acquire`), `teardown`
//!   and lifecycle-bound `probe`
//! - [`SlotTable`] / [`LineMask`]: fixed arena of line slots
//! - [`LineProvider`], [`InputLine`], [`InterruptLine`], [`DeviceLifecycle`]:
//!   hardware collaborators
//! - [`CaptureConfig`]: figment-backed configuration
//! - [`mock`]: simulated lines for tests and demos
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pps_core::SourceRegistry;
//! use pps_gpio::{mock::MockLines, CaptureConfig, GpioPpsDriver, LineMask};
//!
//! let config = CaptureConfig::default();
//! let lines = Arc::new(MockLines::new(config.line_names.clone()));
//! let registry = Arc::new(SourceRegistry::new());
//! let driver = GpioPpsDriver::new(config, lines.clone(), registry.clone());
//!
//! assert_eq!(driver.acquire(LineMask::new(0b11)).unwrap(), 2);
//! lines.line("GPIO00").unwrap().pulse();
//! assert_eq!(registry.lookup("/dev/pps0").unwrap().snapshot().assert.sequence, 1);
//! ```

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod line;
pub mod mock;
pub mod slot;

pub use config::CaptureConfig;
pub use dispatch::EdgeDispatcher;
pub use driver::{GpioPpsDriver, GPIO_CAPABILITY, GPIO_DEFAULT_MODE};
pub use line::{
    DeviceLifecycle, DispatchToken, EdgeHandler, InputLine, InterruptLine, IrqReturn, LineError,
    LineProvider, Trigger,
};
pub use slot::{LineMask, LineSlot, SlotTable, MAX_LINES};
