//! Session state machine, background reader and command API.
//!
//! A [`ComfoConnect`] owns one transport. While a session is active a
//! background task reads every inbound frame: pushes are dispatched to the
//! registered callbacks, an unsolicited close tears the session down, and
//! everything else is handed to the one command call waiting for a reply.
//! The same task sends keepalives and reconnects after a failure.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use comfoconnect_protocol::schema::{
    CloseSessionRequest, CnAlarmNotification, CnNodeNotification, CnRmiRequest, CnRpdoRequest,
    CnTimeRequest, DeregisterAppRequest, GatewayNotification, KeepAlive,
    ListRegisteredAppsRequest, RegisterAppRequest, StartSessionConfirm, StartSessionRequest,
    VersionRequest,
};
use comfoconnect_protocol::{
    confirm_type, BridgeDescriptor, DeviceId, Envelope, OperationType, Payload, ProtocolError,
    BRIDGE_PORT,
};

use crate::client::reference::ReferenceCounter;
use crate::client::transport::{Connector, TcpConnector, Transport};
use crate::config::{ClientConfig, SessionConfig};
use crate::discovery::{discover, DEFAULT_DISCOVERY_TIMEOUT};
use crate::error::{ClientError, Result};
use crate::sensors::{node_mode_name, product_name, sensor_width, SensorSubscription, SensorValue};

/// Zone used for sensor subscriptions.
pub const DEFAULT_ZONE: u32 = 1;

const REPLY_QUEUE_DEPTH: usize = 32;

/// Take the expected record out of a reply envelope.
macro_rules! expect_reply {
    ($envelope:expr, $variant:ident) => {{
        let envelope = $envelope;
        let actual = envelope.operation();
        match envelope.payload {
            Payload::$variant(msg) => Ok(msg),
            _ => Err(ClientError::UnexpectedReply {
                expected: OperationType::$variant,
                actual,
            }),
        }
    }};
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registering,
    Active,
}

/// Firmware versions reported by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub gateway_version: u32,
    pub serial_number: String,
    pub comfonet_version: u32,
}

/// A client identity known to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredApp {
    pub id: DeviceId,
    pub device_name: String,
}

/// Unit clock, in seconds since 2000-01-01 00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTime(pub u32);

impl DeviceTime {
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)?.and_hms_opt(0, 0, 0)?;
        epoch.checked_add_signed(TimeDelta::seconds(i64::from(self.0)))
    }
}

/// An unsolicited message pushed by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Sensor { sensor_id: u32, value: SensorValue },
    Node(CnNodeNotification),
    Alarm(CnAlarmNotification),
    Gateway(GatewayNotification),
}

pub type SensorCallback = Arc<dyn Fn(u32, SensorValue) + Send + Sync>;
pub type EventCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Why the read loop returned.
enum ReaderExit {
    Stopped,
    Lost(String),
}

struct ReaderHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// State shared between the caller side and the background reader.
struct Shared<C: Connector> {
    transport: Transport<C>,
    config: SessionConfig,
    bridge_id: DeviceId,
    state: Mutex<SessionState>,
    references: ReferenceCounter,
    subscriptions: Mutex<BTreeMap<u32, SensorSubscription>>,
    /// Receiving end of the reply hand-off; `None` while no reader runs.
    replies: AsyncMutex<Option<mpsc::Receiver<Envelope>>>,
    sensor_callback: RwLock<Option<SensorCallback>>,
    event_callback: RwLock<Option<EventCallback>>,
    /// Whether the bridge is known to have accepted our identity.
    registered: AtomicBool,
}

/// Client for one ComfoConnect LAN C bridge.
pub struct ComfoConnect<C: Connector = TcpConnector> {
    shared: Arc<Shared<C>>,
    reader: Option<ReaderHandle>,
}

impl ComfoConnect<TcpConnector> {
    /// Create a client for a discovered bridge.
    pub fn new(bridge: &BridgeDescriptor, config: SessionConfig) -> Self {
        let addr = SocketAddr::new(bridge.address, BRIDGE_PORT);
        let connector = TcpConnector::new(addr, config.connect_timeout);
        Self::with_connector(connector, bridge.id, config)
    }

    /// Create a client from loaded configuration.
    ///
    /// When the bridge address or identity is missing it is looked up with a
    /// discovery probe, unicast if the address is known.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let bridge = match (config.bridge.host, config.bridge.id) {
            (Some(address), Some(id)) => BridgeDescriptor {
                address,
                id,
                version: 1,
            },
            (host, id) => {
                let found = discover(host, DEFAULT_DISCOVERY_TIMEOUT).await?;
                found
                    .into_iter()
                    .find(|bridge| id.map_or(true, |id| bridge.id == id))
                    .ok_or_else(|| ClientError::Config("no bridge answered discovery".to_string()))?
            }
        };
        info!("Using bridge {} at {}", bridge.id, bridge.address);
        Ok(Self::new(&bridge, config.session.clone()))
    }
}

impl<C: Connector> ComfoConnect<C> {
    /// Create a client that opens its streams through `connector`.
    pub fn with_connector(connector: C, bridge_id: DeviceId, config: SessionConfig) -> Self {
        let shared = Shared {
            transport: Transport::new(connector, config.local_id),
            references: ReferenceCounter::new(config.reference_width),
            config,
            bridge_id,
            state: Mutex::new(SessionState::Disconnected),
            subscriptions: Mutex::new(BTreeMap::new()),
            replies: AsyncMutex::new(None),
            sensor_callback: RwLock::new(None),
            event_callback: RwLock::new(None),
            registered: AtomicBool::new(false),
        };
        Self {
            shared: Arc::new(shared),
            reader: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Active && self.shared.transport.is_connected()
    }

    pub fn local_id(&self) -> DeviceId {
        self.shared.config.local_id
    }

    pub fn bridge_id(&self) -> DeviceId {
        self.shared.bridge_id
    }

    /// Sensors that will be re-subscribed after a reconnect.
    pub fn subscriptions(&self) -> Vec<SensorSubscription> {
        self.shared.subscriptions.lock().values().copied().collect()
    }

    /// Set the callback invoked for every sensor value pushed by the bridge.
    pub fn set_notification_callback<F>(&self, callback: F)
    where
        F: Fn(u32, SensorValue) + Send + Sync + 'static,
    {
        *self.shared.sensor_callback.write() = Some(Arc::new(callback));
    }

    /// Set the callback invoked for every push, sensor values included.
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        *self.shared.event_callback.write() = Some(Arc::new(callback));
    }

    /// Open a session, registering the local identity first if the bridge
    /// does not know it.
    ///
    /// With `takeover` the bridge evicts any other client holding the
    /// session. Without it, a busy bridge yields
    /// [`ClientError::OtherSession`].
    pub async fn connect(&mut self, takeover: bool) -> Result<VersionInfo> {
        if self
            .reader
            .as_ref()
            .is_some_and(|reader| !reader.task.is_finished())
        {
            debug!("connect: session already running");
            return self.version_request().await;
        }
        self.reader = None;

        if let Err(e) = self.shared.login(takeover, false).await {
            warn!("Failed to open session: {}", e);
            self.shared.teardown().await;
            return Err(e);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_reader(Arc::clone(&self.shared), stop_rx, ready_tx));
        self.reader = Some(ReaderHandle {
            stop: stop_tx,
            task,
        });

        match tokio::time::timeout(self.shared.config.ready_timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.shutdown().await;
                return Err(ClientError::ConnectionLost(
                    "background reader exited before becoming ready".to_string(),
                ));
            }
            Err(_) => {
                error!("Background reader not ready after {:?}", self.shared.config.ready_timeout);
                self.shutdown().await;
                return Err(ClientError::Timeout);
            }
        }

        info!("Connected to bridge {}", self.shared.bridge_id);
        self.version_request().await
    }

    /// Close the session and stop the background reader.
    ///
    /// The close request is sent without waiting for a confirm. Safe to call
    /// repeatedly and while the reader is blocked in a read.
    pub async fn disconnect(&mut self) {
        if self.shared.transport.is_connected() {
            if let Err(e) = self.shared.send(CloseSessionRequest {}).await {
                debug!("Close session request failed: {}", e);
            }
        }
        self.shutdown().await;
        info!("Disconnected from bridge {}", self.shared.bridge_id);
    }

    /// Close the session, waiting for the bridge to confirm, then disconnect.
    pub async fn close_session(&mut self) -> Result<()> {
        let result = self.shared.command(CloseSessionRequest {}).await.map(|_| ());
        self.shutdown().await;
        result
    }

    async fn shutdown(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.stop.send(true);
            if let Err(e) = reader.task.await {
                error!("Background reader panicked: {}", e);
            }
        }
        self.shared.teardown().await;
    }

    /// Re-issue a start-session request on the running session.
    pub async fn start_session(&self, takeover: bool) -> Result<StartSessionConfirm> {
        let reply = self
            .shared
            .command(StartSessionRequest {
                takeover: Some(takeover),
            })
            .await?;
        expect_reply!(reply, StartSessionConfirm)
    }

    pub async fn list_registered_apps(&self) -> Result<Vec<RegisteredApp>> {
        let reply = self.shared.command(ListRegisteredAppsRequest {}).await?;
        let confirm = expect_reply!(reply, ListRegisteredAppsConfirm)?;

        confirm
            .apps
            .into_iter()
            .map(|app| -> Result<RegisteredApp> {
                Ok(RegisteredApp {
                    id: DeviceId::from_slice(&app.uuid)?,
                    device_name: app.devicename,
                })
            })
            .collect()
    }

    pub async fn register_app(&self, id: DeviceId, device_name: &str, pin: u32) -> Result<()> {
        let reply = self
            .shared
            .command(RegisterAppRequest {
                uuid: id.as_bytes().to_vec(),
                pin,
                devicename: device_name.to_string(),
            })
            .await?;
        expect_reply!(reply, RegisterAppConfirm).map(|_| ())
    }

    /// Remove a registered identity.
    ///
    /// Returns `Ok(false)` when the bridge does not know `id`. The session's
    /// own identity cannot be removed.
    pub async fn deregister_app(&self, id: DeviceId) -> Result<bool> {
        if id == self.shared.config.local_id {
            return Err(ClientError::SelfDeregistration);
        }

        let request = DeregisterAppRequest {
            uuid: id.as_bytes().to_vec(),
        };
        match self.shared.command(request).await {
            Ok(reply) => expect_reply!(reply, DeregisterAppConfirm).map(|_| true),
            Err(ClientError::BadRequest) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn version_request(&self) -> Result<VersionInfo> {
        let reply = self.shared.command(VersionRequest {}).await?;
        let confirm = expect_reply!(reply, VersionConfirm)?;
        Ok(VersionInfo {
            gateway_version: confirm.gateway_version,
            serial_number: confirm.serial_number,
            comfonet_version: confirm.comfo_net_version,
        })
    }

    pub async fn time_request(&self) -> Result<DeviceTime> {
        let reply = self.shared.command(CnTimeRequest { set_time: None }).await?;
        let confirm = expect_reply!(reply, CnTimeConfirm)?;
        Ok(DeviceTime(confirm.current_time))
    }

    /// Forward an opaque request to a ComfoNet node and return its answer.
    pub async fn send_rmi(&self, node_id: u32, message: &[u8]) -> Result<Bytes> {
        let reply = self
            .shared
            .command(CnRmiRequest {
                node_id,
                message: message.to_vec(),
            })
            .await?;
        let response = expect_reply!(reply, CnRmiResponse)?;

        match response.result.unwrap_or(0) {
            0 => Ok(Bytes::from(response.message.unwrap_or_default())),
            code => Err(ClientError::RmiError(code)),
        }
    }

    /// Send a raw periodic-variable request.
    ///
    /// A `timeout` of `Some(0)` cancels delivery.
    pub async fn rpdo_request(
        &self,
        sensor_id: u32,
        width: u8,
        zone: u32,
        timeout: Option<u32>,
    ) -> Result<()> {
        let reply = self
            .shared
            .command(rpdo_request(sensor_id, width, zone, timeout))
            .await?;
        expect_reply!(reply, CnRpdoConfirm).map(|_| ())
    }

    /// Subscribe to pushes of one sensor.
    ///
    /// The value width comes from `width` or, when absent, from the built-in
    /// sensor table.
    pub async fn subscribe(&self, sensor_id: u32, width: Option<u8>) -> Result<()> {
        let width = width
            .or_else(|| sensor_width(sensor_id))
            .ok_or(ClientError::UnknownSensor(sensor_id))?;

        self.rpdo_request(sensor_id, width, DEFAULT_ZONE, None).await?;
        self.shared.subscriptions.lock().insert(
            sensor_id,
            SensorSubscription {
                sensor_id,
                width,
                zone: DEFAULT_ZONE,
            },
        );
        debug!("Subscribed to sensor {} ({} bytes)", sensor_id, width);
        Ok(())
    }

    /// Stop pushes of one sensor and forget its subscription.
    pub async fn unsubscribe(&self, sensor_id: u32) -> Result<()> {
        let removed = self.shared.subscriptions.lock().remove(&sensor_id);
        let (width, zone) = match removed {
            Some(sub) => (sub.width, sub.zone),
            None => (
                sensor_width(sensor_id).ok_or(ClientError::UnknownSensor(sensor_id))?,
                DEFAULT_ZONE,
            ),
        };

        self.rpdo_request(sensor_id, width, zone, Some(0)).await
    }

    /// Send a keepalive now.
    pub async fn keepalive(&self) -> Result<()> {
        self.shared.send(KeepAlive {}).await
    }
}

impl<C: Connector> Drop for ComfoConnect<C> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.stop.send(true);
        }
    }
}

impl<C: Connector> Shared<C> {
    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("Session state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if *self.state.lock() != SessionState::Active {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    fn envelope(&self, payload: impl Into<Payload>) -> Envelope {
        Envelope::request(
            self.config.local_id,
            self.bridge_id,
            self.references.next(),
            payload,
        )
    }

    async fn teardown(&self) {
        self.set_state(SessionState::Disconnected);
        self.transport.disconnect().await;
    }

    /// Send without waiting for anything back.
    async fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        self.transport.write_message(&self.envelope(payload)).await
    }

    /// Send a request and wait for its confirm on the reply hand-off.
    ///
    /// The receiver stays locked until the reply arrives, so at most one
    /// command is outstanding.
    async fn command(&self, payload: impl Into<Payload>) -> Result<Envelope> {
        self.ensure_active()?;
        let payload = payload.into();
        let expected = confirm_for(payload.operation_type())?;

        let mut replies = self.replies.lock().await;
        let rx = replies.as_mut().ok_or(ClientError::NotConnected)?;
        while let Ok(stale) = rx.try_recv() {
            debug!("Discarding stale {:?}", stale.operation());
        }

        let request = self.envelope(payload);
        self.transport.write_message(&request).await?;

        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => {
                    warn!(
                        "No {:?} for reference {:?} within {:?}",
                        expected, request.header.reference, self.config.reply_timeout
                    );
                    return Err(ClientError::Timeout);
                }
                Ok(None) => {
                    return Err(ClientError::ConnectionLost(
                        "session torn down while waiting for reply".to_string(),
                    ))
                }
                Ok(Some(envelope)) => {
                    if let Some(reply) = accept_reply(envelope, expected)? {
                        return Ok(reply);
                    }
                }
            }
        }
    }

    /// Send a request and read its confirm straight from the transport.
    /// Only valid while no read loop is running.
    async fn exchange(&self, payload: impl Into<Payload>) -> Result<Envelope> {
        let payload = payload.into();
        let expected = confirm_for(payload.operation_type())?;
        self.transport.write_message(&self.envelope(payload)).await?;

        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout);
            }

            let envelope = match self.transport.read_message(remaining).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => return Err(ClientError::Timeout),
                Err(ClientError::Protocol(e)) => {
                    warn!("Dropping frame: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match envelope.operation() {
                op if op.is_notification() => self.dispatch_notification(envelope),
                OperationType::CloseSessionRequest => {
                    return Err(ClientError::ConnectionLost(
                        "bridge closed the session".to_string(),
                    ))
                }
                _ => {
                    if let Some(reply) = accept_reply(envelope, expected)? {
                        return Ok(reply);
                    }
                }
            }
        }
    }

    async fn start_session(&self, takeover: bool) -> Result<StartSessionConfirm> {
        let reply = self
            .exchange(StartSessionRequest {
                takeover: Some(takeover),
            })
            .await?;
        expect_reply!(reply, StartSessionConfirm)
    }

    /// Open the transport and start a session, registering on demand.
    async fn login(&self, takeover: bool, reconnecting: bool) -> Result<()> {
        self.set_state(SessionState::Connecting);
        self.transport.connect().await?;

        let confirm = match self.start_session(takeover).await {
            Err(ClientError::NotAllowed) if reconnecting && self.registered.load(Ordering::Acquire) => {
                // Registration was revoked while we were away.
                warn!("Bridge no longer accepts identity {}", self.config.local_id);
                self.registered.store(false, Ordering::Release);
                return Err(ClientError::NotAllowed);
            }
            Err(ClientError::NotAllowed) => {
                self.set_state(SessionState::Registering);
                info!(
                    "Registering {} as {:?}",
                    self.config.local_id, self.config.device_name
                );
                self.exchange(RegisterAppRequest {
                    uuid: self.config.local_id.as_bytes().to_vec(),
                    pin: self.config.pin,
                    devicename: self.config.device_name.clone(),
                })
                .await?;
                self.registered.store(true, Ordering::Release);
                self.start_session(takeover).await?
            }
            other => other?,
        };

        self.registered.store(true, Ordering::Release);
        info!(
            "Session started on bridge {} (name {:?}, resumed {:?})",
            self.bridge_id, confirm.devicename, confirm.resumed
        );
        Ok(())
    }

    /// Replay every subscription on a fresh session.
    ///
    /// Only transport failures are returned; a rejected subscription is
    /// logged and skipped.
    async fn resubscribe(&self) -> Result<()> {
        let subscriptions = self.subscriptions.lock().values().copied().collect::<Vec<_>>();
        if subscriptions.is_empty() {
            return Ok(());
        }

        info!("Re-subscribing {} sensors", subscriptions.len());
        for sub in subscriptions {
            let request = rpdo_request(sub.sensor_id, sub.width, sub.zone, None);
            match self.exchange(request).await {
                Ok(_) => trace!("Re-subscribed sensor {}", sub.sensor_id),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => warn!("Re-subscribing sensor {} failed: {}", sub.sensor_id, e),
            }
        }
        Ok(())
    }

    /// Retry the login sequence until it succeeds. Returns false if stopped.
    async fn reconnect(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tokio::select! {
                _ = stop.changed() => return false,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            info!("Reconnecting to bridge {} (attempt {})", self.bridge_id, attempt);
            let result = tokio::select! {
                _ = stop.changed() => return false,
                result = self.login(false, true) => result,
            };
            match result {
                Ok(()) => {
                    info!("Reconnected to bridge {}", self.bridge_id);
                    return true;
                }
                Err(ClientError::OtherSession { device_name }) => {
                    warn!("Bridge is in use by {:?}, will retry", device_name);
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
            self.teardown().await;
        }
    }

    /// Read frames until stopped or the session is lost.
    ///
    /// `ready` fires once the first read cycle has completed.
    async fn read_loop(
        &self,
        reply_tx: &mpsc::Sender<Envelope>,
        stop: &mut watch::Receiver<bool>,
        ready: &mut Option<oneshot::Sender<()>>,
    ) -> ReaderExit {
        loop {
            // A command call whose write failed has already closed the stream.
            if !self.transport.is_connected() {
                return ReaderExit::Lost("write to bridge failed".to_string());
            }

            let wait = if ready.is_some() {
                // First cycle only drains what is already buffered.
                Duration::ZERO
            } else {
                let keepalive_due = self
                    .config
                    .keepalive_interval
                    .saturating_sub(self.transport.idle_for());
                self.config.poll_interval.min(keepalive_due)
            };

            let result = tokio::select! {
                _ = stop.changed() => return ReaderExit::Stopped,
                result = self.transport.read_message(wait) => result,
            };

            match result {
                Ok(Some(envelope)) => match envelope.operation() {
                    op if op.is_notification() => self.dispatch_notification(envelope),
                    OperationType::CloseSessionRequest => {
                        return ReaderExit::Lost("bridge closed the session".to_string())
                    }
                    op => {
                        if let Err(e) = reply_tx.try_send(envelope) {
                            warn!("Dropping {:?}: {}", op, e);
                        }
                    }
                },
                Ok(None) => {}
                Err(ClientError::Protocol(e)) => warn!("Dropping frame: {}", e),
                Err(e) => return ReaderExit::Lost(e.to_string()),
            }

            if let Some(ready) = ready.take() {
                let _ = ready.send(());
            }

            if self.transport.idle_for() >= self.config.keepalive_interval {
                trace!("Sending keepalive");
                if let Err(e) = self.send(KeepAlive {}).await {
                    return ReaderExit::Lost(e.to_string());
                }
            }
        }
    }

    fn dispatch_notification(&self, envelope: Envelope) {
        let notification = match envelope.payload {
            Payload::CnRpdoNotification(rpdo) => {
                let width = self
                    .subscriptions
                    .lock()
                    .get(&rpdo.pdid)
                    .map(|sub| sub.width)
                    .or_else(|| sensor_width(rpdo.pdid))
                    .unwrap_or_else(|| u8::try_from(rpdo.data.len()).unwrap_or(0));
                let value = SensorValue::decode(width, &rpdo.data);
                trace!("Sensor {} = {:?}", rpdo.pdid, value);

                let callback = self.sensor_callback.read().clone();
                if let Some(callback) = callback {
                    callback(rpdo.pdid, value.clone());
                }
                Notification::Sensor {
                    sensor_id: rpdo.pdid,
                    value,
                }
            }
            Payload::CnNodeNotification(node) => {
                info!(
                    "Node {} is a {} in zone {} ({})",
                    node.node_id,
                    node.product_id.and_then(product_name).unwrap_or("unknown product"),
                    node.zone_id.unwrap_or_default(),
                    node_mode_name(node.mode.unwrap_or_default())
                );
                Notification::Node(node)
            }
            Payload::CnAlarmNotification(alarm) => {
                warn!(
                    "Alarm from node {:?}: error {:?}",
                    alarm.node_id, alarm.error_id
                );
                Notification::Alarm(alarm)
            }
            Payload::GatewayNotification(gateway) => {
                debug!("Gateway notification ({} push ids)", gateway.push_uuids.len());
                Notification::Gateway(gateway)
            }
            other => {
                debug!("Ignoring {:?}", other.operation_type());
                return;
            }
        };

        let callback = self.event_callback.read().clone();
        if let Some(callback) = callback {
            callback(notification);
        }
    }
}

/// Background reader: owns reads from login until stopped, reconnecting as
/// needed.
async fn run_reader<C: Connector>(
    shared: Arc<Shared<C>>,
    mut stop: watch::Receiver<bool>,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    // The first session was opened by `connect`.
    let mut logged_in = true;

    loop {
        if !logged_in && !shared.reconnect(&mut stop).await {
            break;
        }
        logged_in = false;

        let resubscribed = tokio::select! {
            _ = stop.changed() => break,
            result = shared.resubscribe() => result,
        };
        if let Err(e) = resubscribed {
            warn!("Session lost while re-subscribing: {}", e);
            shared.teardown().await;
            continue;
        }

        let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE_DEPTH);
        *shared.replies.lock().await = Some(reply_rx);
        shared.set_state(SessionState::Active);

        let exit = shared.read_loop(&reply_tx, &mut stop, &mut ready).await;
        shared.set_state(SessionState::Disconnected);
        drop(reply_tx);
        shared.replies.lock().await.take();

        match exit {
            ReaderExit::Stopped => break,
            ReaderExit::Lost(reason) => {
                warn!("Session lost: {}", reason);
                shared.teardown().await;
            }
        }
    }

    shared.set_state(SessionState::Disconnected);
    debug!("Background reader stopped");
}

fn rpdo_request(sensor_id: u32, width: u8, zone: u32, timeout: Option<u32>) -> CnRpdoRequest {
    CnRpdoRequest {
        pdid: sensor_id,
        zone: Some(zone),
        r#type: Some(u32::from(width)),
        timeout,
        interval: None,
    }
}

fn confirm_for(request: OperationType) -> Result<OperationType> {
    confirm_type(request).ok_or_else(|| {
        ClientError::Protocol(ProtocolError::EncodeError(format!(
            "{:?} has no confirm",
            request
        )))
    })
}

/// The error carried by a non-OK reply.
fn reply_error(envelope: &Envelope) -> Option<ClientError> {
    let device_name = envelope
        .header
        .result_description
        .clone()
        .or_else(|| match &envelope.payload {
            Payload::StartSessionConfirm(confirm) => confirm.devicename.clone(),
            _ => None,
        });
    ClientError::from_result(envelope.header.result, device_name)
}

/// Check a candidate reply. `Ok(None)` means it was stale and the caller
/// should keep waiting.
fn accept_reply(envelope: Envelope, expected: OperationType) -> Result<Option<Envelope>> {
    if let Some(e) = reply_error(&envelope) {
        return Err(e);
    }
    if envelope.operation() != expected {
        debug!(
            "Discarding {:?} (ref {:?}) while waiting for {:?}",
            envelope.operation(),
            envelope.header.reference,
            expected
        );
        return Ok(None);
    }
    Ok(Some(envelope))
}
