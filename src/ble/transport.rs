//! Radio transport abstraction.
//!
//! A [`WandSession`](crate::WandSession) never touches a BLE stack directly.
//! It drives a [`RadioTransport`], which the platform (or a test) supplies.
//! [`BtleplugTransport`](crate::ble::BtleplugTransport) is the implementation
//! used on desktop platforms.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::ble::uuids::{matches_any_prefix, YINMIK_NAME_PREFIXES};
use crate::error::Result;

/// A raw device seen during a scan, before identity filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredDevice {
    /// Platform identifier of the peripheral.
    pub id: String,
    /// Advertised local name.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Scan filter handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Accepted advertised-name prefixes, matched ignoring ASCII case.
    pub name_prefixes: Vec<String>,
}

impl DeviceFilter {
    /// Create a filter accepting the given name prefixes.
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a discovered device passes this filter.
    pub fn matches(&self, device: &DiscoveredDevice) -> bool {
        device
            .name
            .as_deref()
            .map(|name| matches_any_prefix(name, self.name_prefixes.as_slice()))
            .unwrap_or(false)
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::with_prefixes(YINMIK_NAME_PREFIXES.iter().copied())
    }
}

/// Handle to an open link, issued by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkHandle {
    /// Transport-assigned link number.
    pub id: u64,
    /// Platform identifier of the connected peripheral.
    pub device_id: String,
}

/// Handle to an active notification subscription, issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// A notification frame as it came off the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Raw frame bytes.
    pub data: Bytes,
    /// When the transport handed the frame over.
    pub received_at: DateTime<Utc>,
}

/// Frames a session buffers between reads before newer ones are dropped.
pub const FRAME_QUEUE_CAPACITY: usize = 32;

/// Where a transport delivers notification frames and link-loss reports.
///
/// Pushing never blocks, so it is safe to call from a platform callback.
#[derive(Clone)]
pub struct FrameSink {
    deliver: Arc<dyn Fn(ReceivedFrame) -> bool + Send + Sync>,
    on_link_lost: Arc<dyn Fn() + Send + Sync>,
}

impl FrameSink {
    /// Create a sink feeding `frames` and calling `on_link_lost` on drops.
    ///
    /// Frames arriving while `frames` is full are discarded.
    pub fn new(
        frames: mpsc::Sender<ReceivedFrame>,
        on_link_lost: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::from_fn(move |frame| offer(&frames, frame), on_link_lost)
    }

    /// Create a sink handing each frame to `deliver`.
    ///
    /// `deliver` returns `false` once nobody is listening any more.
    pub fn from_fn(
        deliver: impl Fn(ReceivedFrame) -> bool + Send + Sync + 'static,
        on_link_lost: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            deliver: Arc::new(deliver),
            on_link_lost: Arc::new(on_link_lost),
        }
    }

    /// Deliver one notification frame.
    ///
    /// Returns `false` once the receiving session has gone away.
    pub fn push(&self, data: impl Into<Bytes>) -> bool {
        (self.deliver)(ReceivedFrame {
            data: data.into(),
            received_at: Utc::now(),
        })
    }

    /// Report that the link dropped without being asked to.
    pub fn link_lost(&self) {
        (self.on_link_lost)();
    }
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink").finish_non_exhaustive()
    }
}

/// Queue a frame without waiting, dropping it if the queue is full.
///
/// Returns `false` once the receiver is gone.
pub(crate) fn offer(frames: &mpsc::Sender<ReceivedFrame>, frame: ReceivedFrame) -> bool {
    match frames.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            debug!("Frame queue full, dropping {} byte frame", frame.data.len());
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// BLE central-role operations a session needs.
///
/// Implementations own the platform resources behind each handle. Errors are
/// reported as [`crate::Error`]; the session maps them onto its own
/// failure taxonomy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioTransport: Send + Sync {
    /// Scan for `duration` and return every device that passed `filter`.
    async fn scan_for_devices(
        &self,
        filter: &DeviceFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>>;

    /// Open a link to a device and discover its services.
    async fn connect(&self, device_id: &str, timeout: Duration) -> Result<LinkHandle>;

    /// Subscribe to a characteristic, delivering its notifications to `sink`.
    async fn subscribe_to_notifications(
        &self,
        link: &LinkHandle,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        sink: FrameSink,
    ) -> Result<SubscriptionHandle>;

    /// Stop a subscription created by `subscribe_to_notifications`.
    async fn unsubscribe(&self, link: &LinkHandle, subscription: SubscriptionHandle) -> Result<()>;

    /// Write bytes to a characteristic.
    async fn write_characteristic(
        &self,
        link: &LinkHandle,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        data: &[u8],
    ) -> Result<()>;

    /// Close a link.
    async fn disconnect(&self, link: &LinkHandle) -> Result<()>;
}
