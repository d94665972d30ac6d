//! Device broker abstraction.
//!
//! The focus-scan validator never talks to hardware directly; it goes through
//! a broker (the device server's client-side proxy) that caches device state
//! and accepts property writes. This module defines the trait the core
//! consumes, backed by the live wire client in production and by
//! [`MockProxy`](crate::mock_proxy::MockProxy) in tests and dry runs.
//!
//! Every call is synchronous and blocking. The transport enforces a deadline
//! on each in-flight call; on expiry the call is abandoned and surfaces as
//! [`ProxyError::TimedOut`]. An abandoned write may still have been applied
//! on the remote side — callers must treat timed-out writes as failed without
//! assuming the device state is unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Typed value of a single device property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Integer property (positions, slot numbers, flags).
    Int(i64),
    /// Floating-point property (temperatures, exposure times).
    Float(f64),
    /// Free-form text property.
    Text(String),
}

impl PropValue {
    /// Read this property as an integer tick count.
    ///
    /// Floats with no fractional part and numeric text are accepted; anything
    /// else is `None`. A property that exists but cannot be read as the
    /// requested scalar is reported by callers as if it were missing.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            PropValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            PropValue::Float(_) => None,
            PropValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Read this property as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropValue::Int(v) => Some(*v as f64),
            PropValue::Float(v) => Some(*v),
            PropValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Property map of one device, as cached by the broker.
pub type DeviceSnapshot = BTreeMap<String, PropValue>;

/// Transport-level failures reported by the broker.
///
/// These are classified into the validation error taxonomy by
/// [`DeviceError`](crate::error::DeviceError); the core never swallows them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    #[error("device {0} is not known to the device server")]
    NotFound(String),

    #[error("device {device} has no property {property}")]
    NoSuchProperty { device: String, property: String },

    #[error("device {device} refused write to {property}")]
    Rejected { device: String, property: String },

    #[error("call to {device} abandoned after {elapsed:?}")]
    TimedOut { device: String, elapsed: Duration },
}

/// Result type for broker calls.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Client-side proxy to the device server.
///
/// All calls block until a response arrives or the transport deadline
/// expires. There are no retries at this layer.
pub trait Proxy {
    /// Synchronize the local cache with the device server.
    ///
    /// Callers must re-query after a refresh; previously returned snapshots
    /// are stale.
    fn refresh(&mut self) -> ProxyResult<()>;

    /// Fetch the full property snapshot of one device.
    fn get_device(&mut self, name: &str) -> ProxyResult<DeviceSnapshot>;

    /// Fetch one property value.
    fn get_value(&mut self, device: &str, property: &str) -> ProxyResult<PropValue>;

    /// Fetch one property as an integer scalar.
    fn get_single_value(&mut self, device: &str, property: &str) -> ProxyResult<i64>;

    /// Write one property value.
    fn set_value(&mut self, device: &str, property: &str, value: PropValue) -> ProxyResult<()>;
}
