//! Scan summary and property logging for the validated device set.

use tracing::{debug, info};

use crate::factory::{ScanMode, ValidatedDevices};

/// Total number of exposures the upcoming run will take.
pub fn exposure_count(devices: &ValidatedDevices, mode: ScanMode) -> usize {
    match mode {
        ScanMode::Blind => {
            let filters: usize = devices.wheels.iter().map(|w| w.filters.len()).sum();
            devices.focuser.foc_foff.len() * filters.max(1)
        }
        ScanMode::Normal => devices
            .wheels
            .iter()
            .flat_map(|wheel| &wheel.filters)
            .map(|ft| ft.foc_foff.len())
            .sum(),
    }
}

/// Log the focus run summary after empty-slot resolution.
pub fn log_scan_summary(devices: &ValidatedDevices, mode: ScanMode) {
    info!("focus run summary, without multiple empty slots:");
    let focuser = &devices.focuser;

    for wheel in &devices.wheels {
        for ft in &wheel.filters {
            match mode {
                ScanMode::Blind => {
                    info!(
                        "{:8}: {:8} {} steps, between {} and {}",
                        wheel.name,
                        ft.name,
                        focuser.foc_foff.len(),
                        focuser.lower_limit,
                        focuser.upper_limit,
                    );
                }
                ScanMode::Normal => {
                    let lo = ft.foc_foff.first().copied().unwrap_or(0);
                    let hi = ft.foc_foff.last().copied().unwrap_or(0);
                    info!(
                        "{:8}: {:8} {} steps, FOC_FOFF between {} and {}, FOC_POS between {} and {}, FOC_DEF {}",
                        wheel.name,
                        ft.name,
                        ft.foc_foff.len(),
                        lo,
                        hi,
                        focuser.foc_def + lo,
                        focuser.foc_def + hi,
                        focuser.foc_def,
                    );
                }
            }
        }
    }
    info!(
        "taking {} images in total",
        exposure_count(devices, mode)
    );
}

/// Dump all device properties at debug level.
pub fn log_device_properties(devices: &ValidatedDevices) {
    let focuser = &devices.focuser;
    debug!("{}: resolution {}", focuser.name, focuser.resolution);
    debug!(
        "{}: absolute limits [{}, {}]",
        focuser.name, focuser.abs_lower_limit, focuser.abs_upper_limit
    );
    debug!(
        "{}: scan window [{}, {}], step size {}",
        focuser.name, focuser.lower_limit, focuser.upper_limit, focuser.step_size
    );
    debug!("{}: FOC_DEF {}", focuser.name, focuser.foc_def);
    debug!(
        "{}: {} blind offsets",
        focuser.name,
        focuser.foc_foff.len()
    );

    let ccd = &devices.ccd;
    debug!("{}: binning {}", ccd.name, ccd.binning);
    debug!(
        "{}: window offset ({}, {}), size ({}, {})",
        ccd.name, ccd.window.offset_x, ccd.window.offset_y, ccd.window.width, ccd.window.height
    );
    debug!("{}: pixel size {}", ccd.name, ccd.pixel_size);
    debug!("{}: base exposure {}", ccd.name, ccd.base_exposure);

    for wheel in &devices.wheels {
        for ft in &wheel.filters {
            debug!(
                "{}: filter {:8} rel. limits [{}, {}], step {}, exposure factor {}",
                wheel.name,
                ft.name,
                ft.relative_lower_limit,
                ft.relative_upper_limit,
                ft.step_size,
                ft.exposure_factor,
            );
        }
    }
}
