//! Connection session for a single wand.
//!
//! A [`WandSession`] drives one wand through scan, connect, read and
//! disconnect over a [`RadioTransport`]. Every suspension point carries a
//! deadline and is interrupted by [`WandSession::disconnect`] or an
//! unsolicited link drop.

pub mod callback;
pub mod config;
pub mod status;

pub use callback::CallbackHandle;
pub use config::SessionConfig;
pub use status::ConnectionStatus;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::guard::spawn_cleanup;
use crate::ble::transport::{
    offer, DiscoveredDevice, FrameSink, LinkHandle, RadioTransport, ReceivedFrame,
    SubscriptionHandle, FRAME_QUEUE_CAPACITY,
};
use crate::ble::uuids::{WAND_NOTIFY_UUID, WAND_SERVICE_UUID, WAND_WRITE_UUID};
use crate::data::{DeviceInfo, WaterReading, YinmikDevice};
use crate::error::{Error, Result};
use crate::protocol::{create_command, decode_notification, CommandKind, Notification};
use config::SCAN_GRACE;

/// Capacity of the status broadcast channel.
const STATUS_CHANNEL_CAPACITY: usize = 32;

/// A link owned by the session.
struct ActiveLink {
    link: LinkHandle,
    subscription: Option<SubscriptionHandle>,
}

/// Mutable session state, guarded by one lock.
struct SessionState {
    /// Current lifecycle status.
    status: ConnectionStatus,
    /// Bumped on every teardown so stale operations and callbacks can tell
    /// they are out of date.
    generation: u64,
    /// Link whose resources have not been released yet. After a link drop it
    /// lingers here until the next `connect()` or `disconnect()`.
    link: Option<ActiveLink>,
    /// Notification frames of the current link. Taken by an in-flight read.
    frames: Option<mpsc::Receiver<ReceivedFrame>>,
    /// Last handshake acknowledgement from the connected wand. Recorded as
    /// it arrives, never queued with readings.
    device_info: Option<DeviceInfo>,
}

/// State shared with transport callbacks.
struct Shared {
    state: Mutex<SessionState>,
    /// Wakes in-flight operations after a teardown.
    cancel: Notify,
    status_tx: broadcast::Sender<ConnectionStatus>,
}

impl Shared {
    fn set_status(&self, state: &mut SessionState, status: ConnectionStatus) {
        if state.status == status {
            return;
        }
        debug!("Session status: {} -> {}", state.status, status);
        state.status = status;
        // No receivers is fine.
        let _ = self.status_tx.send(status);
    }

    /// Report a failed lifecycle operation.
    fn fail(&self, state: &mut SessionState) {
        self.set_status(state, ConnectionStatus::Error);
        self.set_status(state, ConnectionStatus::Disconnected);
    }

    fn link_lost(&self, generation: u64) {
        let mut state = self.state.lock();
        let live = matches!(
            state.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected | ConnectionStatus::Reading
        );
        if state.generation != generation || !live {
            return;
        }

        warn!("Wand link lost");
        state.generation += 1;
        state.frames = None;
        self.set_status(&mut state, ConnectionStatus::Disconnected);
        drop(state);

        self.cancel.notify_waiters();
    }

    fn link_lost_callback(shared: &Arc<Self>, generation: u64) -> impl Fn() + Send + Sync + 'static {
        let weak = Arc::downgrade(shared);
        move || {
            if let Some(shared) = weak.upgrade() {
                shared.link_lost(generation);
            }
        }
    }

    fn record_device_info(&self, generation: u64, info: DeviceInfo) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        debug!("Wand reports firmware {}", info.firmware_version());
        state.device_info = Some(info);
    }

    /// Build the sink of a link opened under `generation`.
    ///
    /// Device information is recorded on arrival; everything else is queued
    /// for the next read.
    fn frame_sink(
        shared: &Arc<Self>,
        generation: u64,
        frames: mpsc::Sender<ReceivedFrame>,
    ) -> FrameSink {
        let weak = Arc::downgrade(shared);
        FrameSink::from_fn(
            move |frame| {
                let Some(shared) = weak.upgrade() else {
                    return false;
                };
                match decode_notification(&frame.data, frame.received_at) {
                    Ok(Notification::DeviceInfo(info)) => {
                        shared.record_device_info(generation, info);
                        true
                    }
                    _ => offer(&frames, frame),
                }
            },
            Self::link_lost_callback(shared, generation),
        )
    }
}

/// Why a wait ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Deadline,
    Cancelled,
}

impl From<Interrupt> for Error {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Deadline => Error::Timeout,
            Interrupt::Cancelled => Error::Disconnected,
        }
    }
}

/// Run `fut` until it completes, `deadline` passes or the session is torn
/// down.
async fn interruptible<T>(
    cancelled: Pin<&mut Notified<'_>>,
    deadline: Instant,
    fut: impl Future<Output = T>,
) -> std::result::Result<T, Interrupt> {
    tokio::select! {
        biased;
        _ = cancelled => Err(Interrupt::Cancelled),
        result = tokio::time::timeout_at(deadline, fut) => result.map_err(|_| Interrupt::Deadline),
    }
}

fn reading_of(frame: &ReceivedFrame) -> Option<WaterReading> {
    match decode_notification(&frame.data, frame.received_at) {
        Ok(Notification::Reading(reading)) => Some(reading),
        Ok(other) => {
            debug!("Ignoring {:?} while waiting for a reading", other);
            None
        }
        Err(e) => {
            debug!("Discarding frame {:02X?}: {}", &frame.data[..], e);
            None
        }
    }
}

fn connect_error(error: Error) -> Error {
    match error {
        Error::Timeout | Error::ConnectFailed { .. } | Error::BluetoothUnavailable => error,
        other => Error::ConnectFailed {
            reason: other.to_string(),
        },
    }
}

fn scan_error(error: Error) -> Error {
    match error {
        Error::ScanFailed { .. } | Error::BluetoothUnavailable => error,
        other => Error::ScanFailed {
            reason: other.to_string(),
        },
    }
}

/// Close a link and its subscription.
async fn release_link(transport: &dyn RadioTransport, link: ActiveLink) -> Result<()> {
    if let Some(subscription) = link.subscription {
        if let Err(e) = transport.unsubscribe(&link.link, subscription).await {
            warn!("Failed to unsubscribe: {}", e);
        }
    }
    transport.disconnect(&link.link).await
}

/// De-duplicate scan results by device id and sort strongest first.
fn collect_devices(found: &[DiscoveredDevice], config: &SessionConfig) -> Vec<YinmikDevice> {
    let filter = config.device_filter();
    let mut by_id: HashMap<String, YinmikDevice> = HashMap::new();

    for device in found.iter().filter_map(|d| YinmikDevice::from_filtered(d, &filter)) {
        match by_id.get_mut(&device.device_id) {
            Some(existing) => {
                if device.rssi.unwrap_or(i16::MIN) > existing.rssi.unwrap_or(i16::MIN) {
                    existing.rssi = device.rssi;
                }
            }
            None => {
                by_id.insert(device.device_id.clone(), device);
            }
        }
    }

    let mut devices: Vec<_> = by_id.into_values().collect();
    devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
    devices
}

/// Session controlling one Yinmik wand.
///
/// All methods take `&self`; share the session behind an `Arc` to call it
/// from several tasks. At most one lifecycle operation and one read run at a
/// time, extra calls fail with [`Error::Busy`].
pub struct WandSession {
    transport: Arc<dyn RadioTransport>,
    config: SessionConfig,
    shared: Arc<Shared>,
    callback_counter: AtomicU64,
}

impl WandSession {
    /// Create a session over `transport` with default settings.
    pub fn new(transport: Arc<dyn RadioTransport>) -> Self {
        Self::build(transport, SessionConfig::default())
    }

    /// Create a session with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the configuration is unusable.
    pub fn with_config(transport: Arc<dyn RadioTransport>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: Arc<dyn RadioTransport>, config: SessionConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        Self {
            transport,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    status: ConnectionStatus::Disconnected,
                    generation: 0,
                    link: None,
                    frames: None,
                    device_info: None,
                }),
                cancel: Notify::new(),
                status_tx,
            }),
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Get the session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the current status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    /// Subscribe to status transitions.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Register a callback for status transitions.
    pub fn on_status_change<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.shared.status_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(status) => callback(status),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Status callback lagged, skipped {} transitions", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Get the id of the connected wand.
    pub fn connected_device(&self) -> Option<String> {
        let state = self.shared.state.lock();
        if !state.status.is_connected() {
            return None;
        }
        state.link.as_ref().map(|l| l.link.device_id.clone())
    }

    /// Get the information the connected wand reported in its handshake
    /// acknowledgement.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.shared.state.lock().device_info
    }

    /// Scan for wands for the configured window.
    ///
    /// Returns every compatible wand once, strongest signal first.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] unless the session is disconnected.
    /// - [`Error::ScanFailed`] if the transport could not scan.
    /// - [`Error::Timeout`] if the transport overran the window.
    /// - [`Error::Disconnected`] if [`disconnect`](Self::disconnect) interrupted the scan.
    pub async fn scan(&self) -> Result<Vec<YinmikDevice>> {
        let cancelled = self.shared.cancel.notified();
        tokio::pin!(cancelled);

        let generation = {
            let mut state = self.shared.state.lock();
            if state.status != ConnectionStatus::Disconnected {
                return Err(Error::Busy);
            }
            self.shared.set_status(&mut state, ConnectionStatus::Scanning);
            state.generation
        };

        info!("Scanning for wands ({:?})", self.config.scan_duration);

        let filter = self.config.device_filter();
        let deadline = Instant::now() + self.config.scan_duration + SCAN_GRACE;
        let outcome = interruptible(
            cancelled.as_mut(),
            deadline,
            self.transport
                .scan_for_devices(&filter, self.config.scan_duration),
        )
        .await;

        let mut state = self.shared.state.lock();
        if state.generation != generation {
            return Err(Error::Disconnected);
        }

        match outcome {
            Ok(Ok(found)) => {
                self.shared
                    .set_status(&mut state, ConnectionStatus::Disconnected);
                drop(state);

                let devices = collect_devices(&found, &self.config);
                info!("Scan found {} wand(s)", devices.len());
                Ok(devices)
            }
            Ok(Err(e)) => {
                warn!("Scan failed: {}", e);
                self.shared.fail(&mut state);
                Err(scan_error(e))
            }
            Err(Interrupt::Deadline) => {
                warn!("Scan did not finish in time");
                self.shared.fail(&mut state);
                Err(Error::Timeout)
            }
            Err(Interrupt::Cancelled) => {
                self.shared
                    .set_status(&mut state, ConnectionStatus::Disconnected);
                Err(Error::Disconnected)
            }
        }
    }

    /// Connect to a wand found by [`scan`](Self::scan).
    ///
    /// Opens the link, subscribes to readings and, if configured, sends the
    /// handshake. Connecting again to the wand already connected is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if another operation is in flight or a different wand
    ///   is connected.
    /// - [`Error::ConnectFailed`] if the link could not be opened.
    /// - [`Error::SubscriptionFailed`] if notifications could not be enabled.
    /// - [`Error::Timeout`] if the connect deadline passed.
    /// - [`Error::Disconnected`] if the attempt was interrupted.
    pub async fn connect(&self, device_id: &str) -> Result<()> {
        let cancelled = self.shared.cancel.notified();
        tokio::pin!(cancelled);

        let (generation, stale) = {
            let mut state = self.shared.state.lock();
            match state.status {
                ConnectionStatus::Disconnected => {}
                ConnectionStatus::Connected | ConnectionStatus::Reading
                    if state.link.as_ref().map(|l| l.link.device_id.as_str()) == Some(device_id) =>
                {
                    debug!("Already connected to {}", device_id);
                    return Ok(());
                }
                _ => return Err(Error::Busy),
            }
            self.shared
                .set_status(&mut state, ConnectionStatus::Connecting);
            state.device_info = None;
            (state.generation, state.link.take())
        };

        if let Some(stale) = stale {
            debug!("Releasing dropped link {}", stale.link.id);
            if let Err(e) = self.release(stale).await {
                warn!("Failed to release dropped link: {}", e);
            }
        }

        info!("Connecting to wand {}", device_id);

        let deadline = Instant::now() + self.config.connect_timeout;
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        let sink = Shared::frame_sink(&self.shared, generation, frames_tx);

        let link = match interruptible(
            cancelled.as_mut(),
            deadline,
            self.transport
                .connect(device_id, self.config.connect_timeout),
        )
        .await
        {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(self.fail_connect(generation, connect_error(e))),
            Err(interrupt) => return Err(self.fail_connect(generation, interrupt.into())),
        };

        let subscription = match interruptible(
            cancelled.as_mut(),
            deadline,
            self.transport.subscribe_to_notifications(
                &link,
                WAND_SERVICE_UUID,
                WAND_NOTIFY_UUID,
                sink,
            ),
        )
        .await
        {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(e)) => {
                self.abandon(&link, None).await;
                return Err(self.fail_connect(
                    generation,
                    Error::SubscriptionFailed {
                        reason: e.to_string(),
                    },
                ));
            }
            Err(interrupt) => {
                self.abandon(&link, None).await;
                return Err(self.fail_connect(generation, interrupt.into()));
            }
        };

        if self.config.handshake_on_connect {
            let handshake = create_command(CommandKind::Handshake);
            match interruptible(
                cancelled.as_mut(),
                deadline,
                self.transport.write_characteristic(
                    &link,
                    WAND_SERVICE_UUID,
                    WAND_WRITE_UUID,
                    &handshake,
                ),
            )
            .await
            {
                Ok(Ok(())) => debug!("Handshake sent"),
                Ok(Err(e)) => {
                    self.abandon(&link, Some(subscription)).await;
                    return Err(self.fail_connect(
                        generation,
                        Error::ConnectFailed {
                            reason: format!("handshake write failed: {}", e),
                        },
                    ));
                }
                Err(interrupt) => {
                    self.abandon(&link, Some(subscription)).await;
                    return Err(self.fail_connect(generation, interrupt.into()));
                }
            }
        }

        {
            let mut state = self.shared.state.lock();
            if state.generation == generation && state.status == ConnectionStatus::Connecting {
                state.link = Some(ActiveLink {
                    link,
                    subscription: Some(subscription),
                });
                state.frames = Some(frames_rx);
                self.shared
                    .set_status(&mut state, ConnectionStatus::Connected);
                info!("Connected to wand {}", device_id);
                return Ok(());
            }
        }

        // Torn down between the last step and here.
        self.abandon(&link, Some(subscription)).await;
        Err(Error::Disconnected)
    }

    /// Request one measurement and wait for the reply.
    ///
    /// Frames that fail to decode are skipped; the first valid reading after
    /// the request resolves the call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no wand is connected.
    /// - [`Error::Busy`] if a read is already in flight.
    /// - [`Error::WriteFailed`] if the request could not be sent.
    /// - [`Error::Timeout`] if no reading arrived before the deadline. The
    ///   session stays connected.
    /// - [`Error::Disconnected`] if the link went away during the read.
    pub async fn read_water(&self) -> Result<WaterReading> {
        let cancelled = self.shared.cancel.notified();
        tokio::pin!(cancelled);

        let (generation, link, mut frames) = {
            let mut state = self.shared.state.lock();
            match state.status {
                ConnectionStatus::Connected => {}
                ConnectionStatus::Reading => return Err(Error::Busy),
                _ => return Err(Error::NotConnected),
            }
            let Some(link) = state.link.as_ref().map(|l| l.link.clone()) else {
                return Err(Error::NotConnected);
            };
            let Some(mut frames) = state.frames.take() else {
                return Err(Error::NotConnected);
            };

            let mut stale = 0;
            while frames.try_recv().is_ok() {
                stale += 1;
            }
            if stale > 0 {
                debug!("Dropped {} frame(s) queued before the request", stale);
            }

            self.shared.set_status(&mut state, ConnectionStatus::Reading);
            (state.generation, link, frames)
        };

        let deadline = Instant::now() + self.config.read_timeout;
        let request = create_command(CommandKind::ReadRequest);

        let outcome = match interruptible(
            cancelled.as_mut(),
            deadline,
            self.transport.write_characteristic(
                &link,
                WAND_SERVICE_UUID,
                WAND_WRITE_UUID,
                &request,
            ),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!("Read request sent");
                match interruptible(
                    cancelled.as_mut(),
                    deadline,
                    Self::next_reading(&mut frames),
                )
                .await
                {
                    Ok(Some(reading)) => Ok(reading),
                    // The transport dropped its sink.
                    Ok(None) => Err(Error::Disconnected),
                    Err(interrupt) => Err(interrupt.into()),
                }
            }
            Ok(Err(e)) => Err(Error::WriteFailed {
                reason: e.to_string(),
            }),
            Err(interrupt) => Err(interrupt.into()),
        };

        let mut state = self.shared.state.lock();
        if state.generation != generation {
            return Err(Error::Disconnected);
        }

        if matches!(outcome, Err(Error::Disconnected)) {
            warn!("Notification stream closed during read");
            state.generation += 1;
            self.shared
                .set_status(&mut state, ConnectionStatus::Disconnected);
            drop(state);
            self.shared.cancel.notify_waiters();
            return Err(Error::Disconnected);
        }

        state.frames = Some(frames);
        self.shared
            .set_status(&mut state, ConnectionStatus::Connected);
        drop(state);

        match &outcome {
            Ok(reading) => info!("Reading: {}", reading),
            Err(e) => warn!("Read failed: {}", e),
        }
        outcome
    }

    /// Tear down the link and stop any operation in flight.
    ///
    /// The session is `Disconnected` afterwards even if the transport
    /// reports an error while closing the link. Pending operations return
    /// [`Error::Disconnected`].
    pub async fn disconnect(&self) -> Result<()> {
        let link = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.frames = None;
            self.shared
                .set_status(&mut state, ConnectionStatus::Disconnected);
            state.link.take()
        };

        self.shared.cancel.notify_waiters();

        match link {
            Some(link) => {
                info!("Disconnecting from wand {}", link.link.device_id);
                self.release(link).await
            }
            None => Ok(()),
        }
    }

    async fn next_reading(frames: &mut mpsc::Receiver<ReceivedFrame>) -> Option<WaterReading> {
        while let Some(frame) = frames.recv().await {
            if let Some(reading) = reading_of(&frame) {
                return Some(reading);
            }
        }
        None
    }

    fn fail_connect(&self, generation: u64, error: Error) -> Error {
        let mut state = self.shared.state.lock();
        if state.generation != generation {
            return Error::Disconnected;
        }
        warn!("Connect failed: {}", error);
        self.shared.fail(&mut state);
        error
    }

    async fn release(&self, link: ActiveLink) -> Result<()> {
        release_link(self.transport.as_ref(), link).await
    }

    /// Release a link that never became the session's.
    async fn abandon(&self, link: &LinkHandle, subscription: Option<SubscriptionHandle>) {
        let link = ActiveLink {
            link: link.clone(),
            subscription,
        };
        if let Err(e) = self.release(link).await {
            warn!("Failed to close partial link: {}", e);
        }
    }
}

impl Drop for WandSession {
    fn drop(&mut self) {
        let Some(link) = self.shared.state.lock().link.take() else {
            return;
        };

        let transport = self.transport.clone();
        spawn_cleanup(async move {
            if let Err(e) = release_link(transport.as_ref(), link).await {
                warn!("Failed to close link of dropped session: {}", e);
            }
        });
    }
}

impl std::fmt::Debug for WandSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WandSession")
            .field("status", &self.status())
            .field("config", &self.config)
            .finish()
    }
}
