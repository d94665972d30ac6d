//! Device construction and validation pipeline.
//!
//! Builds the validated device set for one focus run: camera first (it only
//! needs wheel identity), then the focuser (it supplies the reference
//! position all relative ranges anchor on), then the filters (pure
//! configuration), then the filter wheels (filters + focuser + presence).
//! The first failure aborts the build; no partial device set is ever
//! returned. Write-access probing runs separately afterwards, see
//! [`probe`](crate::probe).

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::bounds;
use crate::config::InstrumentConfig;
use crate::empty_slot::{self, EmptySlotPatterns};
use crate::entities::{Ccd, CcdWindow, Filter, FilterWheel, Focuser};
use crate::error::{DeviceError, DeviceResult};
use crate::proxy::Proxy;
use crate::range;

/// How the focuser range couples to the filter wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Per-filter ranges, wheel presence required, full bounds checking.
    Normal,
    /// Sweep the focuser's own range; no per-filter offset coupling and no
    /// wheel bounds checking.
    Blind,
}

/// Explicit scan range override, in ticks relative to FOC_DEF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusRange {
    pub lower: i64,
    pub upper: i64,
    pub step: i64,
}

/// Construction stage of one device.
///
/// Stages that do not apply to a device kind are skipped (the camera has no
/// range to compute). `WriteVerified` is recorded by the caller after a
/// successful write-access probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unchecked,
    PresenceVerified,
    RangeComputed,
    BoundsValidated,
    WriteVerified,
    Ready,
    Failed,
}

/// The validated device set for one focus run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDevices {
    pub ccd: Ccd,
    pub focuser: Focuser,
    /// Wheels in use, ordered by descending filter count.
    pub wheels: Vec<FilterWheel>,
}

/// Orchestrates device construction and validation against the broker.
pub struct DeviceFactory<'a> {
    config: &'a InstrumentConfig,
    mode: ScanMode,
    range_override: Option<FocusRange>,
    states: BTreeMap<String, DeviceState>,
    unresolved_slots: Vec<(String, String)>,
    current: Option<String>,
}

impl<'a> DeviceFactory<'a> {
    pub fn new(config: &'a InstrumentConfig, mode: ScanMode) -> Self {
        Self {
            config,
            mode,
            range_override: None,
            states: BTreeMap::new(),
            unresolved_slots: Vec::new(),
            current: None,
        }
    }

    /// Use an explicit (lower, upper, step) override instead of the
    /// configured focuser window. Both ends are relative to FOC_DEF.
    pub fn with_range_override(mut self, range: FocusRange) -> Self {
        self.range_override = Some(range);
        self
    }

    /// Construction stage of a device, `Unchecked` if never touched.
    pub fn device_state(&self, name: &str) -> DeviceState {
        self.states
            .get(name)
            .copied()
            .unwrap_or(DeviceState::Unchecked)
    }

    /// Empty-offset duplicates that matched no empty-slot pattern,
    /// as (wheel, filter) pairs. Kept on their wheels, reported here.
    pub fn unresolved_empty_slots(&self) -> &[(String, String)] {
        &self.unresolved_slots
    }

    /// Record a successful write-access probe for a device.
    pub fn mark_write_verified(&mut self, device: &str) {
        self.set_state(device, DeviceState::WriteVerified);
    }

    /// Build the full validated device set.
    ///
    /// Fatal on the first failure; the device being constructed at that
    /// point is marked `Failed` and no device set is returned.
    pub fn build<P: Proxy>(&mut self, proxy: &mut P) -> DeviceResult<ValidatedDevices> {
        match self.assemble(proxy) {
            Ok(devices) => Ok(devices),
            Err(err) => {
                if let Some(name) = self.current.take() {
                    self.set_state(&name, DeviceState::Failed);
                }
                Err(err)
            }
        }
    }

    fn assemble<P: Proxy>(&mut self, proxy: &mut P) -> DeviceResult<ValidatedDevices> {
        let patterns = EmptySlotPatterns::compile(&self.config.empty_slot_names)?;

        let ccd = self.build_ccd(proxy)?;
        let focuser = self.build_focuser(proxy)?;
        let filters = self.build_filters(&patterns)?;
        let wheels = self.build_wheels(proxy, &filters, &focuser, &patterns)?;

        self.current = None;
        Ok(ValidatedDevices {
            ccd,
            focuser,
            wheels,
        })
    }

    fn set_state(&mut self, device: &str, state: DeviceState) {
        debug!("{device}: {state:?}");
        self.states.insert(device.to_string(), state);
    }

    fn begin(&mut self, device: &str) {
        self.current = Some(device.to_string());
        self.set_state(device, DeviceState::Unchecked);
    }

    fn build_ccd<P: Proxy>(&mut self, proxy: &mut P) -> DeviceResult<Ccd> {
        let cfg = &self.config.ccd;
        self.begin(&cfg.name);

        proxy.refresh().map_err(DeviceError::from_presence)?;
        proxy
            .get_device(&cfg.name)
            .map_err(DeviceError::from_presence)?;
        self.set_state(&cfg.name, DeviceState::PresenceVerified);

        if self.mode == ScanMode::Normal && !self.config.wheels_in_use.is_empty() {
            // the camera must report a wheel coupling for per-filter scans
            proxy
                .get_value(&cfg.name, "wheel")
                .map_err(|e| DeviceError::from_read(e, &cfg.name, "wheel"))?;
        }

        let ccd = Ccd {
            name: cfg.name.clone(),
            wheel_names: self.config.wheels_in_use.clone(),
            binning: cfg.binning.clone(),
            window: CcdWindow {
                offset_x: cfg.window[0],
                offset_y: cfg.window[1],
                width: cfg.window[2],
                height: cfg.window[3],
            },
            pixel_size: cfg.pixel_size,
            base_exposure: cfg.base_exposure,
        };
        self.set_state(&cfg.name, DeviceState::Ready);
        Ok(ccd)
    }

    fn build_focuser<P: Proxy>(&mut self, proxy: &mut P) -> DeviceResult<Focuser> {
        let cfg = &self.config.focuser;
        self.begin(&cfg.name);

        proxy.refresh().map_err(DeviceError::from_presence)?;
        let snapshot = proxy
            .get_device(&cfg.name)
            .map_err(DeviceError::from_presence)?;
        self.set_state(&cfg.name, DeviceState::PresenceVerified);

        if !snapshot.contains_key("foc_min") || !snapshot.contains_key("foc_max") {
            warn!("{}: no foc_min or foc_max properties", cfg.name);
        }

        let foc_def = snapshot
            .get("FOC_DEF")
            .and_then(|v| v.as_int())
            .ok_or_else(|| {
                warn!("{}: no FOC_DEF set", cfg.name);
                DeviceError::PropertyNotFound {
                    device: cfg.name.clone(),
                    property: "FOC_DEF".to_string(),
                }
            })?;
        debug!("{}: FOC_DEF: {}", cfg.name, foc_def);

        let (lower_limit, upper_limit, step_size) = match self.range_override {
            Some(range) => {
                info!("{}: setting internal limits from arguments", cfg.name);
                (foc_def + range.lower, foc_def + range.upper, range.step)
            }
            None => {
                info!("{}: setting internal limits from configuration", cfg.name);
                (cfg.lower_limit, cfg.upper_limit, cfg.step_size)
            }
        };
        info!(
            "{}: internal limits [{}, {}], step size {}",
            cfg.name, lower_limit, upper_limit, step_size
        );

        let foc_foff = range::focus_positions(
            lower_limit - foc_def,
            upper_limit - foc_def,
            step_size,
        )?;
        self.set_state(&cfg.name, DeviceState::RangeComputed);

        if !bounds::fits_stroke(
            lower_limit - foc_def,
            upper_limit - foc_def,
            cfg.absolute_lower_limit,
            cfg.absolute_upper_limit,
            foc_def,
        ) {
            return Err(DeviceError::OutOfRange {
                subject: cfg.name.clone(),
                focuser: cfg.name.clone(),
                range_min: lower_limit,
                range_max: upper_limit,
                abs_lower: cfg.absolute_lower_limit,
                abs_upper: cfg.absolute_upper_limit,
            });
        }
        self.set_state(&cfg.name, DeviceState::BoundsValidated);

        if self.mode == ScanMode::Blind && foc_foff.len() > 10 {
            info!(
                "{}: blind range has {} steps, consider a tighter override range",
                cfg.name,
                foc_foff.len()
            );
        }

        let focuser = Focuser {
            name: cfg.name.clone(),
            resolution: cfg.resolution,
            abs_lower_limit: cfg.absolute_lower_limit,
            abs_upper_limit: cfg.absolute_upper_limit,
            lower_limit,
            upper_limit,
            step_size,
            foc_def,
            foc_foff,
        };
        self.set_state(&cfg.name, DeviceState::Ready);
        Ok(focuser)
    }

    fn build_filters(&mut self, patterns: &EmptySlotPatterns) -> DeviceResult<Vec<Filter>> {
        let mut filters = Vec::with_capacity(self.config.filters.len());
        for cfg in &self.config.filters {
            let foc_foff = range::focus_positions(
                cfg.relative_lower_limit,
                cfg.relative_upper_limit,
                cfg.step_size,
            )?;
            let offset_to_empty_slot = cfg
                .offset_to_empty_slot
                .or_else(|| patterns.matches(&cfg.name).then_some(0));
            filters.push(Filter {
                name: cfg.name.clone(),
                offset_to_empty_slot,
                relative_lower_limit: cfg.relative_lower_limit,
                relative_upper_limit: cfg.relative_upper_limit,
                step_size: cfg.step_size,
                exposure_factor: cfg.exposure_factor,
                foc_foff,
            });
        }
        Ok(filters)
    }

    fn build_wheels<P: Proxy>(
        &mut self,
        proxy: &mut P,
        filters: &[Filter],
        focuser: &Focuser,
        patterns: &EmptySlotPatterns,
    ) -> DeviceResult<Vec<FilterWheel>> {
        let mut wheels = Vec::new();

        if self.mode == ScanMode::Normal && !self.config.wheels_in_use.is_empty() {
            proxy.refresh().map_err(DeviceError::from_presence)?;
        }

        for wheel_cfg in &self.config.wheels {
            if !self.config.wheels_in_use.contains(&wheel_cfg.name) {
                continue;
            }
            self.begin(&wheel_cfg.name);

            let mut wheel_filters = Vec::with_capacity(wheel_cfg.filters.len());
            for name in &wheel_cfg.filters {
                let ft = filters.iter().find(|ft| ft.name == *name).ok_or_else(|| {
                    DeviceError::InvalidConfiguration(format!(
                        "{}: no filter named {} in the filter table",
                        wheel_cfg.name, name
                    ))
                })?;
                debug!("{}: filter {} in use", wheel_cfg.name, ft.name);
                wheel_filters.push(ft.clone());
            }
            let mut wheel = FilterWheel::new(wheel_cfg.name.clone(), wheel_filters);
            empty_slot::order_filters(&mut wheel);

            if self.mode == ScanMode::Normal {
                proxy
                    .get_device(&wheel.name)
                    .map_err(DeviceError::from_presence)?;
                self.set_state(&wheel.name, DeviceState::PresenceVerified);
            }

            let unresolved = empty_slot::resolve_empty_slots(&mut wheel, patterns)?;
            for name in unresolved {
                warn!("{}: unresolved duplicate empty slot: {name}", wheel.name);
                self.unresolved_slots.push((wheel.name.clone(), name));
            }
            self.set_state(&wheel.name, DeviceState::RangeComputed);

            for ft in &wheel.filters {
                if self.mode == ScanMode::Normal {
                    bounds::check_filter_window(&wheel.name, ft, focuser)?;
                }
                bounds::check_position_count(
                    &wheel.name,
                    ft,
                    self.config.minimum_focuser_positions,
                )?;
            }
            self.set_state(&wheel.name, DeviceState::BoundsValidated);

            self.set_state(&wheel.name, DeviceState::Ready);
            wheels.push(wheel);
        }

        empty_slot::order_wheels(&mut wheels);
        Ok(wheels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_proxy::MockProxy;
    use crate::proxy::PropValue;

    fn config() -> InstrumentConfig {
        toml::from_str(
            r#"
wheels_in_use = ["W1"]
empty_slot_names = ["open"]
minimum_focuser_positions = 5

[focuser]
name = "FOC_DMY"
resolution = 4.0
absolute_lower_limit = 0
absolute_upper_limit = 5000
lower_limit = 800
upper_limit = 1200
step_size = 50

[ccd]
name = "C0"
binning = "1x1"
pixel_size = 9.0
base_exposure = 2.5

[[filters]]
name = "open"
relative_lower_limit = -200
relative_upper_limit = 200
step_size = 50

[[filters]]
name = "R"
relative_lower_limit = -200
relative_upper_limit = 200
step_size = 50

[[wheels]]
name = "W1"
filters = ["R", "open"]
"#,
        )
        .unwrap()
    }

    fn proxy() -> MockProxy {
        MockProxy::new()
            .with_device(
                "C0",
                &[
                    ("calculate_stat", PropValue::Int(1)),
                    ("wheel", PropValue::Text("W1".to_string())),
                ],
            )
            .with_device(
                "FOC_DMY",
                &[
                    ("FOC_DEF", PropValue::Int(1000)),
                    ("foc_min", PropValue::Int(0)),
                    ("foc_max", PropValue::Int(5000)),
                ],
            )
            .with_device("W1", &[("filter", PropValue::Int(0))])
    }

    #[test]
    fn test_build_yields_ready_device_set() {
        let config = config();
        let mut proxy = proxy();
        let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
        let devices = factory.build(&mut proxy).unwrap();

        assert_eq!(devices.focuser.foc_def, 1000);
        assert_eq!(devices.focuser.lower_limit, 800);
        assert_eq!(devices.focuser.upper_limit, 1200);
        assert_eq!(devices.wheels.len(), 1);
        // empty slot ordered first
        assert_eq!(devices.wheels[0].filters[0].name, "open");
        assert_eq!(devices.wheels[0].empty_slots.len(), 1);

        for name in ["C0", "FOC_DMY", "W1"] {
            assert_eq!(factory.device_state(name), DeviceState::Ready);
        }
    }

    #[test]
    fn test_missing_focuser_is_fatal_and_marked() {
        let config = config();
        let mut proxy = proxy();
        proxy.remove_device("FOC_DMY");
        let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
        let err = factory.build(&mut proxy).unwrap_err();
        assert!(matches!(err, DeviceError::DeviceNotFound { device } if device == "FOC_DMY"));
        assert_eq!(factory.device_state("FOC_DMY"), DeviceState::Failed);
        assert_eq!(factory.device_state("C0"), DeviceState::Ready);
    }

    #[test]
    fn test_missing_foc_def_is_fatal() {
        let config = config();
        let mut proxy = MockProxy::new()
            .with_device(
                "C0",
                &[
                    ("calculate_stat", PropValue::Int(1)),
                    ("wheel", PropValue::Text("W1".to_string())),
                ],
            )
            .with_device("FOC_DMY", &[("foc_min", PropValue::Int(0))])
            .with_device("W1", &[("filter", PropValue::Int(0))]);
        let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
        let err = factory.build(&mut proxy).unwrap_err();
        assert!(
            matches!(err, DeviceError::PropertyNotFound { property, .. } if property == "FOC_DEF")
        );
    }

    #[test]
    fn test_range_override_offsets_by_foc_def() {
        let config = config();
        let mut proxy = proxy();
        let mut factory = DeviceFactory::new(&config, ScanMode::Blind)
            .with_range_override(FocusRange {
                lower: -100,
                upper: 100,
                step: 20,
            });
        let devices = factory.build(&mut proxy).unwrap();
        assert_eq!(devices.focuser.lower_limit, 900);
        assert_eq!(devices.focuser.upper_limit, 1100);
        assert_eq!(devices.focuser.foc_foff.first(), Some(&-100));
        assert_eq!(devices.focuser.foc_foff.last(), Some(&100));
    }

    #[test]
    fn test_blind_mode_skips_wheel_presence_and_bounds() {
        let mut config = config();
        // narrow stroke: per-filter windows would fail bounds in normal mode
        config.focuser.absolute_upper_limit = 1150;
        config.focuser.lower_limit = 950;
        config.focuser.upper_limit = 1050;
        let mut proxy = proxy();
        proxy.remove_device("W1");

        let mut factory = DeviceFactory::new(&config, ScanMode::Blind);
        let devices = factory.build(&mut proxy).unwrap();
        assert_eq!(devices.wheels.len(), 1);
    }

    #[test]
    fn test_out_of_range_filter_aborts_build() {
        let mut config = config();
        // focuser window still fits, the per-filter windows do not
        config.focuser.absolute_upper_limit = 1100;
        config.focuser.lower_limit = 950;
        config.focuser.upper_limit = 1050;
        let mut proxy = proxy();
        let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
        let err = factory.build(&mut proxy).unwrap_err();
        match err {
            DeviceError::OutOfRange { subject, .. } => {
                assert!(subject.starts_with("W1/"), "unexpected subject {subject}")
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
        assert_eq!(factory.device_state("W1"), DeviceState::Failed);
    }

    #[test]
    fn test_insufficient_positions_aborts_build() {
        let mut config = config();
        config.minimum_focuser_positions = 9;
        let mut proxy = proxy();
        let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
        let err = factory.build(&mut proxy).unwrap_err();
        assert!(matches!(err, DeviceError::InsufficientPositions { .. }));
    }

    #[test]
    fn test_wheel_without_empty_slot_is_fatal() {
        let mut config = config();
        config.empty_slot_names = vec!["clear".to_string()];
        let mut proxy = proxy();
        let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
        let err = factory.build(&mut proxy).unwrap_err();
        assert!(matches!(err, DeviceError::MissingEmptySlot { wheel } if wheel == "W1"));
    }
}
