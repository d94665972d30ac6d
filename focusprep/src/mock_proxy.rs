//! In-memory device broker for tests and dry runs.
//!
//! Serves property snapshots from a seeded table and records every write.
//! Failure injection knobs cover the transport behaviors the validator must
//! classify: unknown devices, missing properties, refused writes and
//! abandoned (timed-out) calls.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::proxy::{DeviceSnapshot, PropValue, Proxy, ProxyError, ProxyResult};

/// Mock broker backed by an in-memory device table.
#[derive(Debug, Default)]
pub struct MockProxy {
    devices: HashMap<String, DeviceSnapshot>,
    rejected_writes: HashSet<(String, String)>,
    timed_out_calls: HashSet<(String, String)>,
    reported_timeout: Duration,
    call_delay: Option<Duration>,
    refresh_count: usize,
    writes: Vec<(String, String, PropValue)>,
}

impl MockProxy {
    pub fn new() -> Self {
        Self {
            reported_timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Seed a device with its property table.
    pub fn with_device(mut self, name: &str, properties: &[(&str, PropValue)]) -> Self {
        let snapshot: DeviceSnapshot = properties
            .iter()
            .map(|(prop, value)| (prop.to_string(), value.clone()))
            .collect();
        self.devices.insert(name.to_string(), snapshot);
        self
    }

    /// Remove a device, as if it disappeared from the device server.
    pub fn remove_device(&mut self, name: &str) {
        self.devices.remove(name);
    }

    /// Overwrite one property value.
    pub fn set_property(&mut self, device: &str, property: &str, value: PropValue) {
        self.devices
            .entry(device.to_string())
            .or_default()
            .insert(property.to_string(), value);
    }

    /// Refuse all writes to one property.
    pub fn reject_writes_to(&mut self, device: &str, property: &str) {
        self.rejected_writes
            .insert((device.to_string(), property.to_string()));
    }

    /// Abandon calls touching one property with a transport timeout.
    pub fn time_out_on(&mut self, device: &str, property: &str) {
        self.timed_out_calls
            .insert((device.to_string(), property.to_string()));
    }

    /// Elapsed time reported by injected timeouts.
    pub fn report_timeout_after(&mut self, elapsed: Duration) {
        self.reported_timeout = elapsed;
    }

    /// Sleep this long in every call, to exercise deadline checks.
    pub fn delay_calls(&mut self, delay: Duration) {
        self.call_delay = Some(delay);
    }

    /// Number of cache refreshes requested so far.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count
    }

    /// Every write accepted or refused, in call order.
    pub fn writes(&self) -> &[(String, String, PropValue)] {
        &self.writes
    }

    fn pause(&self) {
        if let Some(delay) = self.call_delay {
            std::thread::sleep(delay);
        }
    }

    fn check_timeout(&self, device: &str, property: &str) -> ProxyResult<()> {
        if self
            .timed_out_calls
            .contains(&(device.to_string(), property.to_string()))
        {
            return Err(ProxyError::TimedOut {
                device: device.to_string(),
                elapsed: self.reported_timeout,
            });
        }
        Ok(())
    }

    fn snapshot(&self, name: &str) -> ProxyResult<&DeviceSnapshot> {
        self.devices
            .get(name)
            .ok_or_else(|| ProxyError::NotFound(name.to_string()))
    }
}

impl Proxy for MockProxy {
    fn refresh(&mut self) -> ProxyResult<()> {
        self.pause();
        self.refresh_count += 1;
        Ok(())
    }

    fn get_device(&mut self, name: &str) -> ProxyResult<DeviceSnapshot> {
        self.pause();
        self.check_timeout(name, "")?;
        self.snapshot(name).cloned()
    }

    fn get_value(&mut self, device: &str, property: &str) -> ProxyResult<PropValue> {
        self.pause();
        self.check_timeout(device, property)?;
        self.snapshot(device)?
            .get(property)
            .cloned()
            .ok_or_else(|| ProxyError::NoSuchProperty {
                device: device.to_string(),
                property: property.to_string(),
            })
    }

    fn get_single_value(&mut self, device: &str, property: &str) -> ProxyResult<i64> {
        let value = self.get_value(device, property)?;
        value.as_int().ok_or_else(|| ProxyError::NoSuchProperty {
            device: device.to_string(),
            property: property.to_string(),
        })
    }

    fn set_value(&mut self, device: &str, property: &str, value: PropValue) -> ProxyResult<()> {
        self.pause();
        self.check_timeout(device, property)?;
        if !self.devices.contains_key(device) {
            return Err(ProxyError::NotFound(device.to_string()));
        }
        self.writes
            .push((device.to_string(), property.to_string(), value.clone()));
        if self
            .rejected_writes
            .contains(&(device.to_string(), property.to_string()))
        {
            return Err(ProxyError::Rejected {
                device: device.to_string(),
                property: property.to_string(),
            });
        }
        if let Some(snapshot) = self.devices.get_mut(device) {
            snapshot.insert(property.to_string(), value);
        }
        Ok(())
    }
}
