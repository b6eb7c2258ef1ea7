//! TCP socket adapter.
//!
//! Mirrors the BLE message set over a framed event stream. One actor task
//! owns the reconnect loop; each successful connect runs a session until the
//! socket fails, the liveness budget is spent or the adapter is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cabot_link_frame::event::DEFAULT_MAX_EVENT;
use cabot_link_frame::{Event, EventCodec, FrameError};
use cabot_link_proto::{decode_event, Arbiter, CodecError, Link, Message, Outbound};
use cabot_link_transport::{connect, AddressCandidates};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};
use crate::event::{EventSink, PeerEvent};
use crate::liveness::{LivenessConfig, LivenessMonitor, LivenessState};
use crate::version::PROTOCOL_VERSION;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// `host:port` candidates, tried in rotation.
    pub addresses: Vec<String>,
    /// First half of the heartbeat body `<device id>/<mode>`.
    pub device_id: String,
    pub protocol_version: String,
    pub connect_timeout: Duration,
    /// A write that does not finish in time tears the session down.
    pub emit_timeout: Duration,
    pub reconnect_wait: Duration,
    /// Heartbeat period and failure budget.
    pub liveness: LivenessConfig,
    /// Inbound silence after which a heartbeat counts as failed.
    pub stale_after: Duration,
    /// How long to wait for `cabot_version` before warning.
    pub version_timeout: Duration,
    pub max_event_len: usize,
    /// Capacity of the outgoing queue.
    pub queue_len: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            device_id: String::new(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            connect_timeout: Duration::from_secs(2),
            emit_timeout: Duration::from_secs(1),
            reconnect_wait: Duration::from_secs(1),
            liveness: LivenessConfig::default(),
            stale_after: Duration::from_secs(5),
            version_timeout: Duration::from_secs(10),
            max_event_len: DEFAULT_MAX_EVENT,
            queue_len: 64,
        }
    }
}

impl TcpConfig {
    pub fn new<I, S>(addresses: I, device_id: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = timeout;
        self
    }

    pub fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }
}

/// Spawns the TCP actor.
pub struct TcpAdapter;

impl TcpAdapter {
    pub fn spawn(
        arbiter: Arc<Arbiter>,
        events: mpsc::UnboundedSender<PeerEvent>,
        config: TcpConfig,
    ) -> TcpHandle {
        let (out_tx, out_rx) = mpsc::channel(config.queue_len.max(1));
        let cancel = CancellationToken::new();
        let sink = EventSink::new(Link::Tcp, arbiter, events, config.protocol_version.clone());
        let connected = sink.connected_flag();

        let actor = TcpActor {
            monitor: LivenessMonitor::new(config.liveness),
            config,
            sink,
            announced: None,
        };
        let task = tokio::spawn(actor.run(out_rx, cancel.clone()));

        TcpHandle {
            outgoing: out_tx,
            connected,
            cancel,
            task: Some(task),
        }
    }
}

/// Owner's side of a running TCP adapter.
///
/// Dropping the handle stops the actor.
pub struct TcpHandle {
    outgoing: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TcpHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a message for the current session.
    ///
    /// Returns `false` when no session is up or the queue is full.
    pub fn send(&self, message: &Outbound) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.outgoing.try_send(message.clone()) {
            Ok(()) => true,
            Err(err) => {
                debug!(event = message.event(), error = %err, "tcp send not queued");
                false
            }
        }
    }

    /// Stop the actor and wait for the socket to close.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "tcp adapter task failed");
            }
        }
    }
}

impl Drop for TcpHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why a session ended.
enum SessionEnd {
    Cancelled,
    Lost(String),
}

struct TcpActor {
    config: TcpConfig,
    monitor: LivenessMonitor,
    sink: EventSink,
    /// Last version reported in the current session.
    announced: Option<String>,
}

impl TcpActor {
    async fn run(mut self, mut outgoing: mpsc::Receiver<Outbound>, cancel: CancellationToken) {
        let mut candidates = AddressCandidates::new(self.config.addresses.clone());
        if candidates.is_empty() {
            warn!("no robot address configured; tcp adapter idle");
            return;
        }
        info!(candidates = candidates.len(), "tcp adapter started");

        while let Some(addr) = candidates.next_addr().map(str::to_owned) {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = connect(&addr, self.config.connect_timeout) => result,
            };

            match connected {
                Ok(stream) => {
                    info!(%addr, "robot socket connected");
                    let end = self.session(stream, &mut outgoing, &cancel).await;
                    self.end_session();
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(reason) => info!(%addr, %reason, "robot socket closed"),
                    }
                }
                Err(err) => debug!(%addr, error = %err, "connect failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_wait) => {}
            }
        }

        self.end_session();
        info!(link = %self.sink.link(), "tcp adapter stopped");
    }

    fn end_session(&mut self) {
        self.monitor.reset();
        self.announced = None;
        self.sink.set_connected(false);
    }

    async fn session<T>(
        &mut self,
        stream: T,
        outgoing: &mut mpsc::Receiver<Outbound>,
        cancel: &CancellationToken,
    ) -> SessionEnd
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let codec = EventCodec::with_max_len(self.config.max_event_len);
        let (mut tx, mut rx) = Framed::new(stream, codec).split();

        // Anything queued belongs to a previous session.
        while outgoing.try_recv().is_ok() {}

        self.monitor.start_probing();
        if let Err(err) = self.emit(&mut tx, &Outbound::VersionRequest).await {
            return SessionEnd::Lost(err.to_string());
        }

        let mut last_rx = Instant::now();
        let mut ticker = tokio::time::interval(self.config.liveness.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let version_deadline = tokio::time::sleep(self.config.version_timeout);
        tokio::pin!(version_deadline);
        let mut version_pending = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                frame = rx.next() => match frame {
                    Some(Ok(event)) => {
                        last_rx = Instant::now();
                        if self.on_event(event) {
                            version_pending = false;
                        }
                    }
                    Some(Err(err)) => return SessionEnd::Lost(format!("read failed: {err}")),
                    None => return SessionEnd::Lost("closed by robot".to_string()),
                },
                Some(message) = outgoing.recv() => {
                    if let Err(err) = self.emit(&mut tx, &message).await {
                        return SessionEnd::Lost(err.to_string());
                    }
                }
                _ = ticker.tick() => {
                    // A stalled write leaves the socket unusable.
                    if let Err(err) = self.heartbeat(&mut tx).await {
                        return SessionEnd::Lost(err.to_string());
                    }
                    let fresh = last_rx.elapsed() < self.config.stale_after;
                    trace!(fresh, "tcp heartbeat");

                    let tick = self.monitor.tick(fresh, true);
                    if let Some(connected) = tick.connected_changed {
                        self.sink.set_connected(connected);
                    }
                    if self.monitor.state() == LivenessState::Dead {
                        return SessionEnd::Lost("heartbeat budget spent".to_string());
                    }
                }
                _ = &mut version_deadline, if version_pending => {
                    version_pending = false;
                    warn!(
                        timeout = ?self.config.version_timeout,
                        "robot did not announce its protocol version"
                    );
                }
            }
        }
    }

    async fn heartbeat<S>(&self, tx: &mut S) -> Result<()>
    where
        S: Sink<Event, Error = FrameError> + Unpin,
    {
        let body = format!("{}/{}", self.config.device_id, self.sink.arbiter().mode());
        self.emit(tx, &Outbound::Heartbeat(body)).await?;
        self.emit(tx, &Outbound::VersionRequest).await
    }

    async fn emit<S>(&self, tx: &mut S, message: &Outbound) -> Result<()>
    where
        S: Sink<Event, Error = FrameError> + Unpin,
    {
        let body = message.encode()?;
        let event = Event::new(message.event(), String::from_utf8_lossy(&body));
        let timeout = self.config.emit_timeout;
        match tokio::time::timeout(timeout, tx.send(event)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(event = message.event(), ?timeout, "emit timed out");
                Err(PeerError::Timeout(timeout))
            }
        }
    }

    /// Handle one inbound event; returns `true` for a version announcement.
    fn on_event(&mut self, event: Event) -> bool {
        let message = match decode_event(&event.event, &event.data) {
            Ok(message) => message,
            Err(CodecError::UnboundEvent(name)) => {
                debug!(event = %name, "ignoring event");
                return false;
            }
            Err(err) => {
                debug!(event = %event.event, error = %err, "event dropped");
                return false;
            }
        };

        if let Message::Version(version) = &message {
            // Every heartbeat asks again; report only changes.
            if self.announced.as_deref() == Some(version.trim()) {
                return true;
            }
            self.announced = Some(version.trim().to_string());
        }
        let is_version = matches!(message, Message::Version(_));
        self.sink.deliver(message);
        is_version
    }
}
