//! BLE peripheral adapter.
//!
//! The app is the GATT peripheral; the robot is the central. Platform
//! callbacks arrive as [`GattEvent`]s on a channel and are handled by a single
//! actor task, which also owns the heartbeat timer and all reassembly state.
//! Outbound traffic goes through [`BleHandle`] and never touches the actor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cabot_link_frame::channel::DEFAULT_MAX_PAYLOAD;
use cabot_link_frame::{
    channel_name, service_uuid, Channel, ChannelRegistry, Direction, FrameError, ReassemblyConfig,
    HEARTBEAT,
};
use cabot_link_proto::{chunk, decode_channel, Arbiter, Link, Outbound};
use cabot_link_transport::{
    notify_with_retry, Advertisement, AttRequest, AttResult, CentralId, CharacteristicProperties,
    GattCharacteristic, GattEvent, GattPeripheral, GattService, ManagerState, RetryPolicy,
};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::event::{EventSink, PeerEvent};
use crate::liveness::{AdvertisingAction, LivenessConfig, LivenessMonitor};
use crate::version::PROTOCOL_VERSION;

/// Value pushed on the heartbeat channel every tick.
pub const HEARTBEAT_VALUE: &[u8] = b"1";

/// Advertised local name without a team id.
pub const LOCAL_NAME: &str = "CaBot";

#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Appended to the local name as `CaBot-<team id>`.
    pub team_id: Option<String>,
    pub protocol_version: String,
    pub liveness: LivenessConfig,
    /// Retry policy for application notifies. Heartbeats are tried once.
    pub notify_retry: RetryPolicy,
    /// Pause between two chunks of one transfer.
    pub chunk_delay: Duration,
    /// Per-notify size; defaults to what the peripheral reports.
    pub max_payload: Option<usize>,
    pub reassembly: ReassemblyConfig,
    /// Capacity of the platform event queue.
    pub event_buffer: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            team_id: None,
            protocol_version: PROTOCOL_VERSION.to_string(),
            liveness: LivenessConfig::default(),
            notify_retry: RetryPolicy::default(),
            chunk_delay: Duration::from_millis(1),
            max_payload: None,
            reassembly: ReassemblyConfig::default(),
            event_buffer: 64,
        }
    }
}

impl BleConfig {
    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        let team_id = team_id.into();
        self.team_id = (!team_id.trim().is_empty()).then_some(team_id);
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_notify_retry(mut self, policy: RetryPolicy) -> Self {
        self.notify_retry = policy;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = Some(max_payload);
        self
    }

    pub fn local_name(&self) -> String {
        match &self.team_id {
            Some(team) => format!("{LOCAL_NAME}-{team}"),
            None => LOCAL_NAME.to_string(),
        }
    }
}

/// Spawns the BLE actor.
pub struct BleAdapter;

impl BleAdapter {
    /// Start the actor on the current tokio runtime.
    ///
    /// The platform layer feeds its callbacks into
    /// [`BleHandle::platform_events`].
    pub fn spawn(
        peripheral: Arc<dyn GattPeripheral>,
        arbiter: Arc<Arbiter>,
        events: mpsc::UnboundedSender<PeerEvent>,
        config: BleConfig,
    ) -> BleHandle {
        let (gatt_tx, gatt_rx) = mpsc::channel(config.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let sink = EventSink::new(Link::Ble, arbiter, events, config.protocol_version.clone());
        let connected = sink.connected_flag();

        let registry = ChannelRegistry::with_config(DEFAULT_MAX_PAYLOAD, config.reassembly);
        let channels = registry.channels().to_vec();
        let send_locks = channels
            .iter()
            .filter(|c| c.direction.is_outbound())
            .map(|c| (c.handle, Arc::new(Mutex::new(()))))
            .collect();

        let actor = BleActor {
            peripheral: Arc::clone(&peripheral),
            registry,
            monitor: LivenessMonitor::new(config.liveness),
            sink,
            advertisement: Advertisement {
                local_name: config.local_name(),
                service_uuids: vec![service_uuid()],
            },
            service_ready: false,
            registering: false,
            deferred: Vec::new(),
            heartbeat: cabot_link_frame::characteristic_uuid(HEARTBEAT),
            interval: config.liveness.interval,
        };
        let task = tokio::spawn(actor.run(gatt_rx, cancel.clone()));

        BleHandle {
            peripheral,
            gatt_tx,
            channels,
            send_locks,
            config,
            connected,
            cancel,
            task: Some(task),
        }
    }
}

/// Owner's side of a running BLE adapter.
///
/// Dropping the handle stops the actor.
pub struct BleHandle {
    peripheral: Arc<dyn GattPeripheral>,
    gatt_tx: mpsc::Sender<GattEvent>,
    channels: Vec<Channel>,
    send_locks: HashMap<u16, Arc<Mutex<()>>>,
    config: BleConfig,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BleHandle {
    /// Queue for platform callbacks.
    pub fn platform_events(&self) -> mpsc::Sender<GattEvent> {
        self.gatt_tx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn outbound_channel(&self, handle: u16) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.handle == handle && c.direction.is_outbound())
    }

    fn max_payload(&self, channel: &Channel) -> usize {
        self.config
            .max_payload
            .or_else(|| self.peripheral.maximum_update_value_length())
            .unwrap_or(channel.max_payload)
    }

    async fn lock_channel(&self, handle: u16) -> Option<OwnedMutexGuard<()>> {
        let lock = self.send_locks.get(&handle)?;
        Some(Arc::clone(lock).lock_owned().await)
    }

    /// Push one value on a channel, retrying while the platform queue is full.
    ///
    /// Returns `false` at once when nobody is subscribed.
    pub async fn notify(&self, handle: u16, data: &[u8]) -> bool {
        let Some(channel) = self.outbound_channel(handle).copied() else {
            warn!(channel = channel_name(handle), "notify on a channel the app cannot write");
            return false;
        };
        let _guard = self.lock_channel(handle).await;
        match notify_with_retry(
            self.peripheral.as_ref(),
            &channel.uuid,
            data,
            self.config.notify_retry,
        )
        .await
        {
            Ok(()) => true,
            Err(err) => {
                debug!(channel = channel.name(), error = %err, "notify failed");
                false
            }
        }
    }

    /// Encode and send an application message.
    ///
    /// A message larger than one notify is fragmented and sent by a dedicated
    /// task; `true` then means the transfer was started. Transfers on the same
    /// channel never interleave.
    pub async fn send(&self, message: &Outbound) -> bool {
        let handle = match message.channel() {
            Ok(handle) => handle,
            Err(err) => {
                debug!(error = %err, "message not sent over ble");
                return false;
            }
        };
        let Some(channel) = self.outbound_channel(handle).copied() else {
            return false;
        };
        if self.peripheral.subscribed_centrals(&channel.uuid) == 0 {
            debug!(channel = channel.name(), "no subscriber; message not sent");
            return false;
        }

        let chunks = match message
            .encode()
            .and_then(|payload| chunk(handle, payload, self.max_payload(&channel)))
        {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(channel = channel.name(), error = %err, "message could not be encoded");
                return false;
            }
        };

        let Some(guard) = self.lock_channel(handle).await else {
            return false;
        };

        if let [single] = chunks.as_slice() {
            let result = notify_with_retry(
                self.peripheral.as_ref(),
                &channel.uuid,
                single,
                self.config.notify_retry,
            )
            .await;
            drop(guard);
            return match result {
                Ok(()) => true,
                Err(err) => {
                    debug!(channel = channel.name(), error = %err, "notify failed");
                    false
                }
            };
        }

        tokio::spawn(transfer(
            Arc::clone(&self.peripheral),
            channel,
            chunks,
            self.config.notify_retry,
            self.config.chunk_delay,
            self.cancel.child_token(),
            guard,
        ));
        true
    }

    /// Stop the actor and wait for it to tear the link down.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "ble adapter task failed");
            }
        }
    }
}

impl Drop for BleHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn transfer(
    peripheral: Arc<dyn GattPeripheral>,
    channel: Channel,
    chunks: Vec<Bytes>,
    policy: RetryPolicy,
    delay: Duration,
    cancel: CancellationToken,
    _guard: OwnedMutexGuard<()>,
) {
    let total = chunks.len();
    for (idx, piece) in chunks.iter().enumerate() {
        if idx > 0 {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(channel = channel.name(), sent = idx, total, "transfer cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if let Err(err) = notify_with_retry(peripheral.as_ref(), &channel.uuid, piece, policy).await
        {
            warn!(
                channel = channel.name(),
                chunk = idx,
                total,
                error = %err,
                "chunked transfer abandoned"
            );
            return;
        }
    }
    debug!(channel = channel.name(), chunks = total, "chunked transfer complete");
}

fn properties(direction: Direction) -> CharacteristicProperties {
    match direction {
        Direction::Notify => CharacteristicProperties::indicate(),
        Direction::Write => CharacteristicProperties::write(),
        Direction::Both => CharacteristicProperties {
            write: true,
            ..CharacteristicProperties::indicate()
        },
    }
}

fn gatt_service(registry: &ChannelRegistry) -> GattService {
    GattService {
        uuid: service_uuid(),
        primary: true,
        characteristics: registry
            .channels()
            .iter()
            .map(|c| GattCharacteristic {
                uuid: c.uuid,
                properties: properties(c.direction),
            })
            .collect(),
    }
}

struct BleActor {
    peripheral: Arc<dyn GattPeripheral>,
    registry: ChannelRegistry,
    monitor: LivenessMonitor,
    sink: EventSink,
    advertisement: Advertisement,
    service_ready: bool,
    registering: bool,
    /// Subscriptions seen before the service was registered.
    deferred: Vec<(CentralId, Uuid)>,
    heartbeat: Uuid,
    interval: Duration,
}

impl BleActor {
    async fn run(mut self, mut gatt: mpsc::Receiver<GattEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(name = %self.advertisement.local_name, "ble adapter started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = gatt.recv() => match event {
                    Some(event) => self.on_gatt_event(event),
                    None => {
                        debug!("platform event queue closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        self.teardown();
    }

    async fn on_tick(&mut self) {
        let subscribed =
            self.service_ready && self.peripheral.subscribed_centrals(&self.heartbeat) > 0;
        let ok = subscribed
            && notify_with_retry(
                self.peripheral.as_ref(),
                &self.heartbeat,
                HEARTBEAT_VALUE,
                RetryPolicy::once(),
            )
            .await
            .is_ok();
        trace!(ok, subscribed, "ble heartbeat");

        let tick = self.monitor.tick(ok, subscribed);
        if let Some(connected) = tick.connected_changed {
            self.sink.set_connected(connected);
        }
        self.apply(tick.advertising);
    }

    fn apply(&mut self, action: AdvertisingAction) {
        match action {
            AdvertisingAction::Keep => {}
            AdvertisingAction::Start => self.start_advertising(),
            AdvertisingAction::Stop => self.stop_advertising(),
            AdvertisingAction::Cycle => {
                debug!("cycling advertisement");
                self.stop_advertising();
            }
        }
    }

    fn start_advertising(&self) {
        if self.service_ready && !self.peripheral.is_advertising() {
            debug!(name = %self.advertisement.local_name, "start advertising");
            self.peripheral.start_advertising(&self.advertisement);
        }
    }

    fn stop_advertising(&self) {
        if self.peripheral.is_advertising() {
            debug!("stop advertising");
            self.peripheral.stop_advertising();
        }
    }

    fn register_service(&mut self) {
        if self.service_ready {
            self.start_advertising();
            return;
        }
        if self.registering {
            return;
        }
        match self.peripheral.add_service(&gatt_service(&self.registry)) {
            Ok(()) => {
                debug!(channels = self.registry.channels().len(), "adding service");
                self.registering = true;
            }
            Err(err) => warn!(error = %err, "service registration failed"),
        }
    }

    fn link_lost(&mut self) {
        self.service_ready = false;
        self.registering = false;
        self.registry.reset_all();
        if let Some(connected) = self.monitor.reset() {
            self.sink.set_connected(connected);
        }
    }

    fn on_gatt_event(&mut self, event: GattEvent) {
        match event {
            GattEvent::StateUpdated(state) => {
                info!(?state, "bluetooth state updated");
                self.sink.emit(PeerEvent::BluetoothState(state));
                if state == ManagerState::PoweredOn {
                    self.register_service();
                } else {
                    self.link_lost();
                }
            }
            GattEvent::ServiceAdded(Ok(())) => {
                info!("service added");
                self.registering = false;
                self.service_ready = true;
                self.start_advertising();
                for (central, characteristic) in std::mem::take(&mut self.deferred) {
                    self.on_subscribed(central, characteristic);
                }
            }
            GattEvent::ServiceAdded(Err(err)) => {
                self.registering = false;
                warn!(error = %err, "platform rejected service");
            }
            GattEvent::AdvertisingStarted(Ok(())) => debug!("advertising started"),
            GattEvent::AdvertisingStarted(Err(err)) => warn!(error = %err, "advertising failed"),
            GattEvent::Subscribed {
                central,
                characteristic,
            } => {
                if self.service_ready {
                    self.on_subscribed(central, characteristic);
                } else {
                    debug!(
                        %central,
                        %characteristic,
                        "subscription deferred until service is ready"
                    );
                    self.deferred.push((central, characteristic));
                }
            }
            GattEvent::Unsubscribed {
                central,
                characteristic,
            } => {
                debug!(%central, %characteristic, "central unsubscribed");
                self.deferred
                    .retain(|(c, u)| !(c == &central && u == &characteristic));
            }
            GattEvent::ReadRequest(request) => {
                self.peripheral
                    .respond(&request, AttResult::ReadNotPermitted);
            }
            GattEvent::WriteRequests(requests) => self.on_writes(&requests),
            GattEvent::WillRestoreState { services } => {
                info!(services = services.len(), "restoring peripheral state");
                if services.contains(&service_uuid()) {
                    self.peripheral.remove_all_services();
                    self.link_lost();
                    self.register_service();
                }
            }
        }
    }

    fn on_subscribed(&mut self, central: CentralId, characteristic: Uuid) {
        let name = self
            .registry
            .by_uuid(&characteristic)
            .map(Channel::name)
            .unwrap_or("UNKNOWN");
        info!(%central, channel = name, "central subscribed");
        self.monitor.start_probing();
    }

    fn on_writes(&mut self, requests: &[AttRequest]) {
        let Some(first) = requests.first() else {
            return;
        };

        let mut unknown = false;
        let mut misplaced = false;
        for request in requests {
            match self
                .registry
                .ingest(&request.characteristic, request.offset, &request.value)
            {
                Ok(Some((handle, payload))) => match decode_channel(handle, &payload) {
                    Ok(message) => self.sink.deliver(message),
                    Err(err) => {
                        debug!(channel = channel_name(handle), error = %err, "message dropped")
                    }
                },
                Ok(None) => {}
                Err(FrameError::UnknownCharacteristic(uuid)) => {
                    warn!(characteristic = %uuid, "write to unknown characteristic");
                    unknown = true;
                }
                Err(FrameError::OutOfBounds { .. }) => misplaced = true,
                Err(_) => {}
            }
        }

        let result = if unknown {
            AttResult::AttributeNotFound
        } else if misplaced {
            AttResult::InvalidOffset
        } else {
            AttResult::Success
        };
        self.peripheral.respond(first, result);
    }

    fn teardown(&mut self) {
        self.stop_advertising();
        self.peripheral.remove_all_services();
        self.link_lost();
        info!(link = %self.sink.link(), "ble adapter stopped");
    }
}
