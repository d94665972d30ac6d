use thiserror::Error;

use crate::proxy::ProxyError;

/// Errors produced while validating the focus-scan device configuration.
///
/// Every construction-time variant is fatal: the factory yields no partial
/// device set. Each variant carries enough identifying context to diagnose
/// the failure without re-running.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A configured device is not present on the device server.
    #[error("device {device} not present on the device server")]
    DeviceNotFound {
        /// Configured device name.
        device: String,
    },

    /// A required property is missing or unreadable on a present device.
    #[error("device {device} has no usable property {property}")]
    PropertyNotFound {
        /// Device the property was requested from.
        device: String,
        /// Property name.
        property: String,
    },

    /// The device refused a property write.
    #[error("device {device} refused write to {property}")]
    WriteRejected {
        /// Device the write was sent to.
        device: String,
        /// Property name.
        property: String,
    },

    /// A derived scan window does not fit the focuser's hardware stroke.
    #[error(
        "{subject}: scan window [{range_min}, {range_max}] outside {focuser} stroke [{abs_lower}, {abs_upper}]"
    )]
    OutOfRange {
        /// Offending wheel/filter pair, or the focuser itself in blind mode.
        subject: String,
        /// Focuser whose stroke was exceeded.
        focuser: String,
        /// Absolute lower end of the requested window.
        range_min: i64,
        /// Absolute upper end of the requested window.
        range_max: i64,
        /// Hardware lower stroke limit.
        abs_lower: i64,
        /// Hardware upper stroke limit.
        abs_upper: i64,
    },

    /// A derived sequence has too few positions for a usable scan.
    #[error("{subject}: {positions} focuser positions, required more than {minimum}")]
    InsufficientPositions {
        /// Offending wheel/filter pair.
        subject: String,
        /// Number of derived positions.
        positions: usize,
        /// Configured minimum-positions threshold.
        minimum: usize,
    },

    /// A filter wheel in use has no empty/clear slot for reference exposures.
    #[error("filter wheel {wheel} has no empty slot")]
    MissingEmptySlot {
        /// Wheel with no empty-offset filter.
        wheel: String,
    },

    /// The configuration itself is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for validation operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

impl DeviceError {
    /// Classify a broker failure during a presence check.
    ///
    /// A device that does not answer before the transport deadline is
    /// reported the same way as one the server does not know.
    pub fn from_presence(err: ProxyError) -> Self {
        match err {
            ProxyError::NotFound(device) => DeviceError::DeviceNotFound { device },
            ProxyError::TimedOut { device, .. } => DeviceError::DeviceNotFound { device },
            ProxyError::NoSuchProperty { device, property } => {
                DeviceError::PropertyNotFound { device, property }
            }
            ProxyError::Rejected { device, property } => {
                DeviceError::WriteRejected { device, property }
            }
        }
    }

    /// Classify a broker failure while reading a property.
    pub fn from_read(err: ProxyError, device: &str, property: &str) -> Self {
        match err {
            ProxyError::NotFound(device) => DeviceError::DeviceNotFound { device },
            ProxyError::NoSuchProperty { device, property } => {
                DeviceError::PropertyNotFound { device, property }
            }
            _ => DeviceError::PropertyNotFound {
                device: device.to_string(),
                property: property.to_string(),
            },
        }
    }

    /// Classify a broker failure while writing a property.
    pub fn from_write(err: ProxyError, device: &str, property: &str) -> Self {
        match err {
            ProxyError::NotFound(device) => DeviceError::DeviceNotFound { device },
            _ => DeviceError::WriteRejected {
                device: device.to_string(),
                property: property.to_string(),
            },
        }
    }
}
