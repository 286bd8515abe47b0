//! GATT characteristic handling.
//!
//! Lookup of characteristics on a connected peripheral and the listener task
//! that forwards notifications into a [`FrameSink`].

use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::ble::transport::FrameSink;
use crate::error::{Error, Result};

/// Find a discovered characteristic by service and characteristic UUID.
///
/// Services must be discovered before calling this.
pub fn find_characteristic(
    peripheral: &Peripheral,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
) -> Result<Characteristic> {
    let characteristics = peripheral.characteristics();

    characteristics
        .iter()
        .find(|c| c.service_uuid == service_uuid && c.uuid == characteristic_uuid)
        .cloned()
        .ok_or_else(|| {
            debug!(
                "Characteristic {} NOT found in service {}",
                characteristic_uuid, service_uuid
            );
            for c in characteristics.iter() {
                debug!("  Available characteristic: {} in {}", c.uuid, c.service_uuid);
            }
            Error::CharacteristicNotFound {
                uuid: characteristic_uuid.to_string(),
            }
        })
}

/// Pick the write type a characteristic supports, preferring acknowledged
/// writes.
pub fn write_type_for(characteristic: &Characteristic) -> WriteType {
    if characteristic.properties.contains(CharPropFlags::WRITE) {
        WriteType::WithResponse
    } else {
        WriteType::WithoutResponse
    }
}

/// Forward notifications of one characteristic into `sink` until the link
/// drops or the session stops listening.
///
/// `disconnects` yields once for each drop of this link reported by the
/// adapter. Runs as a spawned task owned by the transport.
pub async fn forward_notifications<N, D>(
    mut notifications: N,
    mut disconnects: D,
    characteristic_uuid: Uuid,
    sink: FrameSink,
) where
    N: Stream<Item = ValueNotification> + Unpin,
    D: Stream<Item = ()> + Unpin,
{
    debug!("Notification listener started for {}", characteristic_uuid);

    loop {
        tokio::select! {
            notification = notifications.next() => match notification {
                Some(notification) if notification.uuid == characteristic_uuid => {
                    trace!(
                        "Notification: {} bytes, data: {:02X?}",
                        notification.value.len(),
                        notification.value
                    );
                    if !sink.push(notification.value) {
                        debug!("Session dropped its receiver, stopping listener");
                        break;
                    }
                }
                Some(_) => {}
                None => {
                    info!("Notification stream ended, treating link as lost");
                    sink.link_lost();
                    break;
                }
            },
            Some(()) = disconnects.next() => {
                info!("Wand disconnected");
                sink.link_lost();
                break;
            }
        }
    }

    debug!("Notification listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::ble::uuids::WAND_NOTIFY_UUID;

    fn notification(uuid: Uuid, value: &[u8]) -> ValueNotification {
        ValueNotification {
            uuid,
            value: value.to_vec(),
        }
    }

    fn sink() -> (FrameSink, mpsc::Receiver<crate::ble::ReceivedFrame>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(8);
        let lost = Arc::new(AtomicUsize::new(0));
        let counter = lost.clone();
        let sink = FrameSink::new(tx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (sink, rx, lost)
    }

    fn characteristic(properties: CharPropFlags) -> Characteristic {
        Characteristic {
            uuid: crate::ble::uuids::WAND_WRITE_UUID,
            service_uuid: crate::ble::uuids::WAND_SERVICE_UUID,
            properties,
            descriptors: BTreeSet::new(),
        }
    }

    #[test]
    fn test_write_type_prefers_response() {
        let both = CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE;
        assert!(matches!(
            write_type_for(&characteristic(both)),
            WriteType::WithResponse
        ));
        assert!(matches!(
            write_type_for(&characteristic(CharPropFlags::WRITE_WITHOUT_RESPONSE)),
            WriteType::WithoutResponse
        ));
    }

    #[tokio::test]
    async fn test_forwards_only_the_subscribed_characteristic() {
        let (sink, mut rx, lost) = sink();
        let notifications = stream::iter(vec![
            notification(WAND_NOTIFY_UUID, &[0xB1, 0x01]),
            notification(crate::ble::uuids::WAND_WRITE_UUID, &[0xA2]),
            notification(WAND_NOTIFY_UUID, &[0xB0, 0x02]),
        ]);

        forward_notifications(notifications, stream::pending::<()>(), WAND_NOTIFY_UUID, sink).await;

        assert_eq!(&rx.try_recv().unwrap().data[..], &[0xB1, 0x01]);
        assert_eq!(&rx.try_recv().unwrap().data[..], &[0xB0, 0x02]);
        assert!(rx.try_recv().is_err());
        // The stream ending means the link is gone.
        assert_eq!(lost.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_before_first_notification_is_reported() {
        let (sink, mut rx, lost) = sink();

        forward_notifications(
            stream::pending::<ValueNotification>(),
            stream::iter(vec![()]),
            WAND_NOTIFY_UUID,
            sink,
        )
        .await;

        assert_eq!(lost.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listener_stops_when_session_is_gone() {
        let (sink, rx, lost) = sink();
        drop(rx);

        forward_notifications(
            stream::iter(vec![notification(WAND_NOTIFY_UUID, &[0xB1])]).chain(stream::pending()),
            stream::pending::<()>(),
            WAND_NOTIFY_UUID,
            sink,
        )
        .await;

        assert_eq!(lost.load(Ordering::SeqCst), 0);
    }
}
