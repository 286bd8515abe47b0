//! BLE scanning functionality.
//!
//! Provides the scanner used by [`BtleplugTransport`](crate::ble::BtleplugTransport)
//! to discover wands within a fixed window.

use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::ble::guard::{spawn_cleanup, DropGuard};
use crate::ble::transport::{DeviceFilter, DiscoveredDevice};
use crate::error::Result;

/// BLE scanner for discovering wands.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl BleScanner {
    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Scan for `duration` and return the devices that passed `filter`.
    ///
    /// A device seen several times is reported once, with its strongest
    /// signal.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn discover(
        &self,
        filter: &DeviceFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        info!("Starting BLE scan for wands ({:?})", duration);

        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        // The caller may drop this future at any await below.
        let adapter = self.adapter.clone();
        let scanning = DropGuard::new(move || {
            spawn_cleanup(async move {
                match adapter.stop_scan().await {
                    Ok(()) => debug!("Stopped abandoned scan"),
                    Err(e) => warn!("Failed to stop abandoned scan: {}", e),
                }
            })
        });

        let mut discovered: HashMap<String, DiscoveredDevice> = HashMap::new();
        let window = tokio::time::sleep(duration);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => break,
                Some(event) = events.next() => {
                    if let Some(id) = Self::peripheral_of(&event) {
                        if let Some(device) = self.describe(&id).await {
                            Self::record(&mut discovered, filter, device);
                        }
                    }
                }
            }
        }

        let stopped = self.adapter.stop_scan().await;
        scanning.disarm();
        if let Err(e) = stopped {
            warn!("Failed to stop scan: {}", e);
        }

        // Devices the adapter already knew about do not raise discovery events.
        for peripheral in self.adapter.peripherals().await? {
            if let Some(device) = self.describe(&peripheral.id()).await {
                Self::record(&mut discovered, filter, device);
            }
        }

        debug!("Scan finished with {} matching devices", discovered.len());

        Ok(discovered.into_values().collect())
    }

    /// Extract the peripheral an event refers to, for events that carry
    /// advertising data.
    fn peripheral_of(event: &CentralEvent) -> Option<PeripheralId> {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                trace!("Device discovered: {:?}", id);
                Some(id.clone())
            }
            CentralEvent::DeviceUpdated(id) => {
                trace!("Device updated: {:?}", id);
                Some(id.clone())
            }
            CentralEvent::ManufacturerDataAdvertisement { id, .. }
            | CentralEvent::ServicesAdvertisement { id, .. }
            | CentralEvent::ServiceDataAdvertisement { id, .. } => Some(id.clone()),
            _ => None,
        }
    }

    /// Read the advertised properties of a peripheral.
    async fn describe(&self, id: &PeripheralId) -> Option<DiscoveredDevice> {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = peripheral.properties().await.ok()??;

        Some(DiscoveredDevice {
            id: id.to_string(),
            name: properties.local_name,
            rssi: properties.rssi,
        })
    }

    /// Keep a device if it passes the filter, preferring the strongest signal.
    fn record(
        discovered: &mut HashMap<String, DiscoveredDevice>,
        filter: &DeviceFilter,
        device: DiscoveredDevice,
    ) {
        if !filter.matches(&device) {
            return;
        }

        match discovered.get_mut(&device.id) {
            Some(existing) => {
                if device.rssi.unwrap_or(i16::MIN) > existing.rssi.unwrap_or(i16::MIN) {
                    existing.rssi = device.rssi;
                }
            }
            None => {
                debug!("Found wand {:?} ({})", device.name, device.id);
                discovered.insert(device.id.clone(), device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, name: &str, rssi: Option<i16>) -> DiscoveredDevice {
        DiscoveredDevice {
            id: id.to_string(),
            name: Some(name.to_string()),
            rssi,
        }
    }

    #[test]
    fn test_record_filters_and_keeps_strongest() {
        let filter = DeviceFilter::default();
        let mut discovered = HashMap::new();

        BleScanner::record(&mut discovered, &filter, device("a", "BLE-9909", Some(-80)));
        BleScanner::record(&mut discovered, &filter, device("a", "BLE-9909", Some(-55)));
        BleScanner::record(&mut discovered, &filter, device("a", "BLE-9909", Some(-70)));
        BleScanner::record(&mut discovered, &filter, device("b", "Speaker", Some(-30)));

        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered["a"].rssi, Some(-55));
    }

    #[test]
    fn test_record_missing_rssi() {
        let filter = DeviceFilter::default();
        let mut discovered = HashMap::new();

        BleScanner::record(&mut discovered, &filter, device("a", "BLE-C600", None));
        BleScanner::record(&mut discovered, &filter, device("a", "BLE-C600", Some(-90)));

        assert_eq!(discovered["a"].rssi, Some(-90));
    }
}
