//! Instrument configuration.
//!
//! Loaded from a TOML file describing the focuser, the camera, the filter
//! definition table and the wheel layout. All numeric fields are validated
//! before any device work starts; malformed values fail fast with
//! `InvalidConfiguration`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, DeviceResult};

fn default_minimum_positions() -> usize {
    5
}

fn default_empty_slot_names() -> Vec<String> {
    vec!["open".to_string(), "empty".to_string()]
}

/// Whole instrument configuration for one validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Wheel names taking part in the scan, in priority order.
    #[serde(default)]
    pub wheels_in_use: Vec<String>,
    /// Filter names that designate an empty/clear slot.
    ///
    /// Each entry is a pattern matched against the whole filter name.
    #[serde(default = "default_empty_slot_names")]
    pub empty_slot_names: Vec<String>,
    /// A derived sequence with this many positions or fewer is rejected.
    #[serde(default = "default_minimum_positions")]
    pub minimum_focuser_positions: usize,
    /// Focuser device and scan window.
    pub focuser: FocuserConfig,
    /// Camera device and exposure geometry.
    pub ccd: CcdConfig,
    /// Filter definition table.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    /// Wheel layout: which filters sit in which wheel, in slot order.
    #[serde(default)]
    pub wheels: Vec<WheelConfig>,
}

/// Focuser hardware limits and configured scan window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocuserConfig {
    /// Focuser device name.
    pub name: String,
    /// Ticks per physical unit of travel.
    pub resolution: f64,
    /// Absolute hardware lower stroke limit, in ticks.
    pub absolute_lower_limit: i64,
    /// Absolute hardware upper stroke limit, in ticks.
    pub absolute_upper_limit: i64,
    /// Configured scan window lower end, absolute ticks.
    pub lower_limit: i64,
    /// Configured scan window upper end, absolute ticks.
    pub upper_limit: i64,
    /// Configured scan step size, in ticks.
    pub step_size: i64,
}

/// Camera device and exposure geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcdConfig {
    /// Camera device name.
    pub name: String,
    /// Binning setting, e.g. "1x1".
    pub binning: String,
    /// Readout window `[offset_x, offset_y, width, height]`;
    /// `[-1, -1, -1, -1]` selects the whole sensor area.
    #[serde(default = "CcdConfig::default_window")]
    pub window: [i64; 4],
    /// Pixel size in physical units.
    pub pixel_size: f64,
    /// Base exposure time in seconds.
    pub base_exposure: f64,
}

impl CcdConfig {
    fn default_window() -> [i64; 4] {
        [-1, -1, -1, -1]
    }
}

/// One row of the filter definition table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter name, unique across the table.
    pub name: String,
    /// Offset of this slot to the wheel's empty slot, in ticks.
    ///
    /// `0` marks an empty/clear slot. When absent, the offset is taken as 0
    /// iff the name matches an empty-slot pattern, otherwise unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_to_empty_slot: Option<i64>,
    /// Lower scan limit relative to FOC_DEF, in ticks.
    pub relative_lower_limit: i64,
    /// Upper scan limit relative to FOC_DEF, in ticks.
    pub relative_upper_limit: i64,
    /// Scan step size in ticks.
    pub step_size: i64,
    /// Multiplier on the camera's base exposure.
    #[serde(default = "FilterConfig::default_exposure_factor")]
    pub exposure_factor: f64,
}

impl FilterConfig {
    fn default_exposure_factor() -> f64 {
        1.0
    }
}

/// One filter wheel and its slot assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    /// Wheel device name.
    pub name: String,
    /// Filter names in slot order; each must exist in the filter table.
    pub filters: Vec<String>,
}

impl InstrumentConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> DeviceResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DeviceError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            DeviceError::InvalidConfiguration(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> DeviceResult<()> {
        if self.focuser.name.trim().is_empty() {
            return Err(invalid("[focuser] name must not be empty"));
        }
        if self.focuser.resolution <= 0.0 {
            return Err(invalid("[focuser] resolution must be > 0"));
        }
        if self.focuser.absolute_lower_limit >= self.focuser.absolute_upper_limit {
            return Err(invalid(
                "[focuser] absolute_lower_limit must be below absolute_upper_limit",
            ));
        }
        if self.focuser.step_size <= 0 {
            return Err(invalid("[focuser] step_size must be > 0"));
        }
        if self.focuser.lower_limit >= self.focuser.upper_limit {
            return Err(invalid("[focuser] lower_limit must be below upper_limit"));
        }

        if self.ccd.name.trim().is_empty() {
            return Err(invalid("[ccd] name must not be empty"));
        }
        if self.ccd.binning.trim().is_empty() {
            return Err(invalid("[ccd] binning must not be empty"));
        }
        if self.ccd.pixel_size <= 0.0 {
            return Err(invalid("[ccd] pixel_size must be > 0"));
        }
        if self.ccd.base_exposure <= 0.0 {
            return Err(invalid("[ccd] base_exposure must be > 0"));
        }
        let window = &self.ccd.window;
        let whole_area = window.iter().all(|v| *v == -1);
        if !whole_area && (window[0] < 0 || window[1] < 0 || window[2] <= 0 || window[3] <= 0) {
            return Err(invalid(
                "[ccd] window must be [-1, -1, -1, -1] or non-negative offsets with positive size",
            ));
        }

        let mut filter_names = HashSet::new();
        for ft in &self.filters {
            if ft.name.trim().is_empty() {
                return Err(invalid("[[filters]] name must not be empty"));
            }
            if !filter_names.insert(ft.name.as_str()) {
                return Err(invalid(&format!(
                    "[[filters]] duplicate filter name: {}",
                    ft.name
                )));
            }
            if ft.step_size <= 0 {
                return Err(invalid(&format!(
                    "[[filters]] {}: step_size must be > 0",
                    ft.name
                )));
            }
            if ft.relative_lower_limit >= ft.relative_upper_limit {
                return Err(invalid(&format!(
                    "[[filters]] {}: relative_lower_limit must be below relative_upper_limit",
                    ft.name
                )));
            }
            if ft.exposure_factor <= 0.0 {
                return Err(invalid(&format!(
                    "[[filters]] {}: exposure_factor must be > 0",
                    ft.name
                )));
            }
        }

        let mut wheel_names = HashSet::new();
        for wheel in &self.wheels {
            if wheel.name.trim().is_empty() {
                return Err(invalid("[[wheels]] name must not be empty"));
            }
            if !wheel_names.insert(wheel.name.as_str()) {
                return Err(invalid(&format!(
                    "[[wheels]] duplicate wheel name: {}",
                    wheel.name
                )));
            }
            let mut slot_names = HashSet::new();
            for ft in &wheel.filters {
                if !filter_names.contains(ft.as_str()) {
                    return Err(invalid(&format!(
                        "[[wheels]] {}: no filter named {} in the filter table",
                        wheel.name, ft
                    )));
                }
                if !slot_names.insert(ft.as_str()) {
                    return Err(invalid(&format!(
                        "[[wheels]] {}: filter {} listed twice",
                        wheel.name, ft
                    )));
                }
            }
        }

        for name in &self.wheels_in_use {
            if !wheel_names.contains(name.as_str()) {
                return Err(invalid(&format!(
                    "wheels_in_use references unknown wheel: {name}"
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> DeviceError {
    DeviceError::InvalidConfiguration(msg.to_string())
}
