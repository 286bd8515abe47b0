//! [`RadioTransport`] implementation over `btleplug`.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::characteristics::{find_characteristic, forward_notifications, write_type_for};
use crate::ble::guard::{spawn_cleanup, DropGuard};
use crate::ble::scanner::BleScanner;
use crate::ble::transport::{
    DeviceFilter, DiscoveredDevice, FrameSink, LinkHandle, RadioTransport, SubscriptionHandle,
};
use crate::error::{Error, Result};

/// An active subscription and the task forwarding its notifications.
struct Subscription {
    link_id: u64,
    peripheral: Peripheral,
    characteristic: Characteristic,
    listener: JoinHandle<()>,
}

/// Radio transport backed by the system Bluetooth adapter.
pub struct BtleplugTransport {
    /// Scanner bound to the adapter.
    scanner: BleScanner,
    /// Open links by link id.
    links: RwLock<HashMap<u64, Peripheral>>,
    /// Active subscriptions by subscription id.
    subscriptions: Mutex<HashMap<u64, Subscription>>,
    /// Source of link and subscription ids.
    next_id: AtomicU64,
}

impl BtleplugTransport {
    /// Create a transport on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            scanner: BleScanner::with_adapter(adapter),
            links: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        self.scanner.adapter()
    }

    /// Number of links currently open.
    pub fn open_links(&self) -> usize {
        self.links.read().len()
    }

    fn peripheral(&self, link: &LinkHandle) -> Result<Peripheral> {
        self.links
            .read()
            .get(&link.id)
            .cloned()
            .ok_or(Error::NotConnected)
    }

    async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral> {
        self.adapter()
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| Error::DeviceNotFound {
                identifier: device_id.to_string(),
            })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl RadioTransport for BtleplugTransport {
    async fn scan_for_devices(
        &self,
        filter: &DeviceFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        self.scanner.discover(filter, duration).await
    }

    async fn connect(&self, device_id: &str, timeout: Duration) -> Result<LinkHandle> {
        let peripheral = self.find_peripheral(device_id).await?;

        // Until the link is registered nothing else can close it, so every
        // failure or cancellation from here on drops the physical connection.
        let opening = peripheral.clone();
        let pending = DropGuard::new(move || {
            spawn_cleanup(async move {
                match opening.disconnect().await {
                    Ok(()) => debug!("Closed half-open link to {}", opening.id()),
                    Err(e) => warn!("Failed to close half-open link: {}", e),
                }
            })
        });

        if peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral {} already connected at BLE level", device_id);
        } else {
            tokio::time::timeout(timeout, peripheral.connect())
                .await
                .map_err(|_| Error::Timeout)?
                .map_err(|e| Error::ConnectFailed {
                    reason: e.to_string(),
                })?;
        }

        if let Err(e) = peripheral.discover_services().await {
            warn!("Service discovery on {} failed: {}", device_id, e);
            return Err(Error::ConnectFailed {
                reason: format!("service discovery failed: {}", e),
            });
        }

        let id = self.next_id();
        self.links.write().insert(id, peripheral);
        pending.disarm();

        info!("Link {} open to {}", id, device_id);

        Ok(LinkHandle {
            id,
            device_id: device_id.to_string(),
        })
    }

    async fn subscribe_to_notifications(
        &self,
        link: &LinkHandle,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        sink: FrameSink,
    ) -> Result<SubscriptionHandle> {
        let peripheral = self.peripheral(link)?;
        let characteristic = find_characteristic(&peripheral, service_uuid, characteristic_uuid)?;

        debug!(
            "Found characteristic {}, properties: {:?}",
            characteristic_uuid, characteristic.properties
        );

        // Watch for drops before subscribing so none slips past unseen.
        let central_events = self.adapter().events().await?;
        let peripheral_id = peripheral.id();
        let disconnects = central_events.filter_map(move |event| {
            let lost = matches!(
                &event,
                CentralEvent::DeviceDisconnected(id) if *id == peripheral_id
            );
            future::ready(lost.then_some(()))
        });

        if !peripheral.is_connected().await.unwrap_or(false) {
            return Err(Error::NotConnected);
        }

        peripheral.subscribe(&characteristic).await?;

        let notifications = peripheral.notifications().await?;
        let listener = tokio::spawn(forward_notifications(
            notifications,
            disconnects,
            characteristic_uuid,
            sink,
        ));

        let id = self.next_id();
        self.subscriptions.lock().insert(
            id,
            Subscription {
                link_id: link.id,
                peripheral,
                characteristic,
                listener,
            },
        );

        debug!("Subscribed to {} on link {}", characteristic_uuid, link.id);

        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, link: &LinkHandle, subscription: SubscriptionHandle) -> Result<()> {
        let removed = self.subscriptions.lock().remove(&subscription.0);
        let Some(subscription) = removed else {
            debug!("Subscription {:?} on link {} already gone", subscription, link.id);
            return Ok(());
        };

        subscription.listener.abort();
        subscription
            .peripheral
            .unsubscribe(&subscription.characteristic)
            .await?;

        debug!(
            "Unsubscribed from {} on link {}",
            subscription.characteristic.uuid, link.id
        );

        Ok(())
    }

    async fn write_characteristic(
        &self,
        link: &LinkHandle,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        data: &[u8],
    ) -> Result<()> {
        let peripheral = self.peripheral(link)?;
        let characteristic = find_characteristic(&peripheral, service_uuid, characteristic_uuid)?;

        peripheral
            .write(&characteristic, data, write_type_for(&characteristic))
            .await?;

        debug!("Wrote {} bytes to {}: {:02X?}", data.len(), characteristic_uuid, data);

        Ok(())
    }

    async fn disconnect(&self, link: &LinkHandle) -> Result<()> {
        let peripheral = self.links.write().remove(&link.id);

        self.subscriptions.lock().retain(|_, s| {
            let keep = s.link_id != link.id;
            if !keep {
                s.listener.abort();
            }
            keep
        });

        let Some(peripheral) = peripheral else {
            return Ok(());
        };

        match peripheral.disconnect().await {
            Ok(_) => {
                info!("Link {} to {} closed", link.id, link.device_id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to disconnect link {}: {}", link.id, e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        for (_, subscription) in self.subscriptions.lock().drain() {
            subscription.listener.abort();
        }
    }
}
