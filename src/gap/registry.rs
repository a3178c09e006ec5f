use heapless::{String, Vec};

use super::{AdvertisingReport, BleAddress, ServiceData, MAX_NAME_LEN};

/// Service data elements kept per remote device across sightings.
pub const MAX_ACCUMULATED_SERVICE_DATA: usize = 16;

/// What is known about one peer, accumulated over its advertising reports.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteDevice {
    pub address: BleAddress,
    /// RSSI of the latest report.
    pub rssi: i8,
    /// Last non-empty name seen.
    pub name: String<MAX_NAME_LEN>,
    /// Every service data element seen, oldest first.
    pub service_data: Vec<ServiceData, MAX_ACCUMULATED_SERVICE_DATA>,
    /// Number of reports merged.
    pub sightings: u32,
}

impl RemoteDevice {
    fn new(address: BleAddress, rssi: i8) -> Self {
        Self {
            address,
            rssi,
            name: String::new(),
            service_data: Vec::new(),
            sightings: 0,
        }
    }

    fn absorb(&mut self, report: &AdvertisingReport) {
        self.rssi = report.rssi;
        if !report.name.is_empty() {
            self.name = report.name.clone();
        }
        for element in &report.service_data {
            if self.service_data.push(element.clone()).is_err() {
                debug!("[gap] {}: service data history full", self.address);
                break;
            }
        }
        self.sightings = self.sightings.saturating_add(1);
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Remote devices keyed by address, at most one entry per address.
///
/// Holds up to `N` devices; reports from new addresses are dropped once it
/// is full.
#[derive(Debug, Default)]
pub struct Registry<const N: usize = 16> {
    devices: Vec<RemoteDevice, N>,
}

impl<const N: usize> Registry<N> {
    pub const fn new() -> Self {
        Self { devices: Vec::new() }
    }

    /// Fold one report into the entry for its address, creating it on first
    /// sight. Returns `false` if the report was dropped for lack of room.
    pub fn merge(&mut self, report: &AdvertisingReport) -> bool {
        if let Some(device) = self.devices.iter_mut().find(|d| d.address == report.address) {
            device.absorb(report);
            return true;
        }

        let mut device = RemoteDevice::new(report.address, report.rssi);
        device.absorb(report);
        match self.devices.push(device) {
            Ok(()) => {
                debug!("[gap] new device {} rssi {}", report.address, report.rssi);
                true
            }
            Err(_) => {
                warn!("[gap] registry full, dropping {}", report.address);
                false
            }
        }
    }

    /// Merge a batch of reports in order and return the resulting snapshot.
    pub fn merge_all<'r>(
        &mut self,
        reports: impl IntoIterator<Item = &'r AdvertisingReport>,
    ) -> &[RemoteDevice] {
        for report in reports {
            self.merge(report);
        }
        &self.devices
    }

    pub fn get(&self, address: &BleAddress) -> Option<&RemoteDevice> {
        self.devices.iter().find(|d| d.address == *address)
    }

    /// Known devices in first-seen order.
    pub fn devices(&self) -> &[RemoteDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Remove and yield every device.
    pub fn drain(&mut self) -> impl Iterator<Item = RemoteDevice> + '_ {
        let devices = core::mem::take(&mut self.devices);
        devices.into_iter()
    }

    /// Remove and return the devices whose last advertised name is `name`.
    /// Every other device stays.
    pub fn drain_named(&mut self, name: &str) -> Vec<RemoteDevice, N> {
        let mut named = Vec::new();
        let mut i = 0;
        while i < self.devices.len() {
            if self.devices[i].name == name {
                let device = self.devices.remove(i);
                // Capacity matches the source vector.
                let _ = named.push(device);
            } else {
                i += 1;
            }
        }
        named
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
