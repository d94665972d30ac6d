//! FOCUSPREP - focus-scan configuration validator.
//!
//! Derives and validates the operational configuration of a focusing
//! instrument (focuser actuator, optional filter wheels, a camera) before a
//! focus scan is run:
//!
//! - derives an absolute focuser-position range per filter from relative
//!   configuration values ([`range`]),
//! - validates every derived range against the focuser's absolute hardware
//!   stroke limits ([`bounds`]),
//! - identifies and deduplicates empty/clear-slot filters used for reference
//!   exposures ([`empty_slot`]),
//! - orders wheels and filters deterministically for scan efficiency, and
//! - optionally probes each device kind for write access within a bounded
//!   time budget ([`probe`]).
//!
//! All device traffic goes through the [`proxy::Proxy`] trait; construction
//! is orchestrated by [`factory::DeviceFactory`]. Execution is
//! single-threaded and blocking throughout; any construction-time failure
//! aborts the run with no partial device set.

pub mod bounds;
pub mod config;
pub mod empty_slot;
pub mod entities;
pub mod error;
pub mod factory;
pub mod mock_proxy;
pub mod probe;
pub mod proxy;
pub mod range;
pub mod summary;

pub use crate::config::InstrumentConfig;
pub use crate::entities::{Ccd, CcdWindow, Filter, FilterWheel, Focuser};
pub use crate::error::{DeviceError, DeviceResult};
pub use crate::factory::{DeviceFactory, DeviceState, FocusRange, ScanMode, ValidatedDevices};
pub use crate::mock_proxy::MockProxy;
pub use crate::probe::{WriteAccessProbe, WriteAccessReport};
pub use crate::proxy::{PropValue, Proxy, ProxyError, ProxyResult};
