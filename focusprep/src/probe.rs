//! Write-access probing of the validated devices.
//!
//! Before a scan the operator can verify that each device actually accepts
//! property writes: read a designated property, write a perturbed value,
//! write the original back. A device is writable iff both writes complete
//! before the probe's deadline. Each device kind has its own time budget and
//! its own outcome; a failed or timed-out probe never invalidates the
//! presence and bounds validation that already passed.
//!
//! Probes run strictly in sequence: camera, then focuser, then filter wheel.
//! An abandoned write may still have been applied on the remote side; this
//! is logged and never retried.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::entities::{Ccd, FilterWheel, Focuser};
use crate::factory::ValidatedDevices;
use crate::proxy::{PropValue, Proxy};

/// Time budget for the camera probe.
pub const CCD_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time budget for the focuser probe.
pub const FOCUSER_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Time budget for the filter wheel probe (wheel moves are slow).
pub const WHEEL_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Independent per-device-kind probe outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAccessReport {
    pub ccd_writable: bool,
    pub focuser_writable: bool,
    pub wheel_writable: bool,
}

impl WriteAccessReport {
    /// Logical AND of the three independent outcomes.
    pub fn all_writable(&self) -> bool {
        self.ccd_writable && self.focuser_writable && self.wheel_writable
    }
}

/// Runs the bounded-time write probes against already-validated devices.
pub struct WriteAccessProbe<'a, P: Proxy> {
    proxy: &'a mut P,
}

impl<'a, P: Proxy> WriteAccessProbe<'a, P> {
    pub fn new(proxy: &'a mut P) -> Self {
        Self { proxy }
    }

    /// Probe all device kinds in sequence and report each outcome.
    ///
    /// With no wheel in use the wheel probe is skipped and reported
    /// writable, so the aggregate only reflects devices that exist.
    pub fn run(&mut self, devices: &ValidatedDevices) -> WriteAccessReport {
        info!("checking device write access, this may take a while");

        let ccd_writable = self.probe_ccd(&devices.ccd);
        let focuser_writable = self.probe_focuser(&devices.focuser);
        let wheel_writable = match devices.wheels.first() {
            Some(wheel) => self.probe_wheel(wheel),
            None => {
                info!("no filter wheel in use, skipping wheel write probe");
                true
            }
        };

        let report = WriteAccessReport {
            ccd_writable,
            focuser_writable,
            wheel_writable,
        };
        if report.all_writable() {
            info!("all devices are writable");
        }
        report
    }

    /// Perturb and restore the camera's statistics mode.
    pub fn probe_ccd(&mut self, ccd: &Ccd) -> bool {
        self.probe_ccd_with_budget(ccd, CCD_WRITE_TIMEOUT)
    }

    fn probe_ccd_with_budget(&mut self, ccd: &Ccd, budget: Duration) -> bool {
        let started = Instant::now();
        let snapshot = match self.proxy.get_device(&ccd.name) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("{}: is not writable: {e}", ccd.name);
                return false;
            }
        };
        let Some(current) = snapshot.get("calculate_stat").cloned() else {
            error!("{}: no calculate_stat property", ccd.name);
            return false;
        };
        debug!("{}: calculate_stat: {current}", ccd.name);

        self.perturb_and_restore(
            &ccd.name,
            "calculate_stat",
            PropValue::Int(3),
            current,
            started,
            budget,
        )
    }

    /// Perturb and restore the focuser's reference position.
    pub fn probe_focuser(&mut self, focuser: &Focuser) -> bool {
        self.probe_focuser_with_budget(focuser, FOCUSER_WRITE_TIMEOUT)
    }

    fn probe_focuser_with_budget(&mut self, focuser: &Focuser, budget: Duration) -> bool {
        let started = Instant::now();
        let foc_def = match self.proxy.get_single_value(&focuser.name, "FOC_DEF") {
            Ok(value) => value,
            Err(e) => {
                error!("{}: is not writable: {e}", focuser.name);
                return false;
            }
        };

        self.perturb_and_restore(
            &focuser.name,
            "FOC_DEF",
            PropValue::Int(foc_def + 1),
            PropValue::Int(foc_def),
            started,
            budget,
        )
    }

    /// Perturb and restore the wheel's selected filter slot.
    pub fn probe_wheel(&mut self, wheel: &FilterWheel) -> bool {
        self.probe_wheel_with_budget(wheel, WHEEL_WRITE_TIMEOUT)
    }

    fn probe_wheel_with_budget(&mut self, wheel: &FilterWheel, budget: Duration) -> bool {
        let started = Instant::now();
        let slot = match self.proxy.get_single_value(&wheel.name, "filter") {
            Ok(value) => value,
            Err(e) => {
                error!("{}: is not writable: {e}", wheel.name);
                return false;
            }
        };
        debug!("{}: filter slot: {slot}", wheel.name);

        self.perturb_and_restore(
            &wheel.name,
            "filter",
            PropValue::Int(slot + 1),
            PropValue::Int(slot),
            started,
            budget,
        )
    }

    /// Write a perturbed value then the original, both before the deadline.
    fn perturb_and_restore(
        &mut self,
        device: &str,
        property: &str,
        perturbed: PropValue,
        original: PropValue,
        started: Instant,
        budget: Duration,
    ) -> bool {
        if started.elapsed() > budget {
            warn!("{device}: write probe exceeded {budget:?} before first write");
            return false;
        }
        for value in [perturbed, original] {
            if let Err(e) = self.proxy.set_value(device, property, value) {
                error!("{device}: is not writable: {e}");
                return false;
            }
            if started.elapsed() > budget {
                warn!(
                    "{device}: write probe exceeded {budget:?}, the last write may still apply remotely"
                );
                return false;
            }
        }
        debug!("{device}: is writable");
        true
    }
}
