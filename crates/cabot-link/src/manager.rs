use std::sync::Arc;

use cabot_link_peer::{BleAdapter, BleConfig, BleHandle, TcpAdapter, TcpConfig, TcpHandle};
use cabot_link_proto::{
    ActivityLog, Arbiter, LogRequest, ManageCommand, ModeGate, OperatingMode, Outbound,
    SpeakCommand, SpeechPriority,
};
use cabot_link_transport::{GattEvent, GattPeripheral};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::delegate::{dispatch, Delegate};

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub ble: BleConfig,
    /// `None` runs BLE only.
    pub tcp: Option<TcpConfig>,
    pub gate: ModeGate,
    pub mode: OperatingMode,
}

impl ManagerConfig {
    pub fn with_ble(mut self, ble: BleConfig) -> Self {
        self.ble = ble;
        self
    }

    pub fn with_tcp(mut self, tcp: TcpConfig) -> Self {
        self.tcp = Some(tcp);
        self
    }

    pub fn with_gate(mut self, gate: ModeGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Both links, the shared arbiter and the delegate dispatcher.
///
/// Constructed and owned by the application; nothing here is global. Send
/// methods return `false` when no link took the message; they never fail
/// otherwise.
pub struct TransportManager {
    arbiter: Arc<Arbiter>,
    ble: Option<BleHandle>,
    tcp: Option<TcpHandle>,
    dispatcher: Option<JoinHandle<()>>,
}

impl TransportManager {
    /// Start the adapters on the current tokio runtime.
    ///
    /// BLE runs when a `peripheral` is given, TCP when `config.tcp` is set.
    pub fn start<D: Delegate>(
        config: ManagerConfig,
        peripheral: Option<Arc<dyn GattPeripheral>>,
        delegate: D,
    ) -> Self {
        let arbiter = Arc::new(Arbiter::with_gate(config.gate));
        arbiter.set_mode(config.mode);

        let (tx, rx) = mpsc::unbounded_channel();
        let ble = peripheral.map(|peripheral| {
            BleAdapter::spawn(peripheral, Arc::clone(&arbiter), tx.clone(), config.ble)
        });
        let tcp = config
            .tcp
            .map(|tcp| TcpAdapter::spawn(Arc::clone(&arbiter), tx.clone(), tcp));
        drop(tx);

        if ble.is_none() && tcp.is_none() {
            warn!("transport manager started without any link");
        }
        info!(
            ble = ble.is_some(),
            tcp = tcp.is_some(),
            mode = %config.mode,
            "transport manager started"
        );

        Self {
            arbiter,
            ble,
            tcp,
            dispatcher: Some(tokio::spawn(dispatch(rx, delegate))),
        }
    }

    /// Queue for the platform's BLE callbacks; `None` without BLE.
    pub fn platform_events(&self) -> Option<mpsc::Sender<GattEvent>> {
        self.ble.as_ref().map(BleHandle::platform_events)
    }

    /// `true` while either link is up.
    pub fn is_connected(&self) -> bool {
        self.ble.as_ref().is_some_and(BleHandle::is_connected)
            || self.tcp.as_ref().is_some_and(TcpHandle::is_connected)
    }

    pub fn mode(&self) -> OperatingMode {
        self.arbiter.mode()
    }

    /// Change the operating mode; affects gating and the TCP heartbeat body.
    pub fn set_mode(&self, mode: OperatingMode) {
        self.arbiter.set_mode(mode);
    }

    pub fn arbiter(&self) -> &Arc<Arbiter> {
        &self.arbiter
    }

    pub async fn send_speak(
        &self,
        text: impl Into<String>,
        priority: SpeechPriority,
        force: bool,
    ) -> bool {
        self.send(Outbound::Speak(SpeakCommand {
            text: text.into(),
            priority,
            force,
        }))
        .await
    }

    pub async fn send_destination(&self, id: impl Into<String>) -> bool {
        self.send(Outbound::Destination(id.into())).await
    }

    pub async fn send_summon(&self, id: impl Into<String>) -> bool {
        self.send(Outbound::Summon(id.into())).await
    }

    pub async fn send_manage_command(&self, command: ManageCommand, param: Option<&str>) -> bool {
        self.send(Outbound::Manage {
            command,
            param: param.map(str::to_owned),
        })
        .await
    }

    pub async fn send_log_request(&self, request: impl Into<LogRequest>) -> bool {
        self.send(Outbound::LogRequest(request.into())).await
    }

    pub async fn activity_log(
        &self,
        category: impl Into<String>,
        text: impl Into<String>,
        memo: impl Into<String>,
    ) -> bool {
        self.send(Outbound::ActivityLog(ActivityLog {
            category: category.into(),
            text: text.into(),
            memo: memo.into(),
        }))
        .await
    }

    /// TCP when it is up, BLE otherwise.
    async fn send(&self, message: Outbound) -> bool {
        if let Some(tcp) = self.tcp.as_ref().filter(|tcp| tcp.is_connected()) {
            if tcp.send(&message) {
                return true;
            }
        }
        if let Some(ble) = &self.ble {
            return ble.send(&message).await;
        }
        debug!(message = message.name(), "no link available");
        false
    }

    /// Stop both adapters, then let the dispatcher deliver what is left.
    pub async fn shutdown(mut self) {
        if let Some(ble) = self.ble.take() {
            ble.shutdown().await;
        }
        if let Some(tcp) = self.tcp.take() {
            tcp.shutdown().await;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(err) = dispatcher.await {
                warn!(error = %err, "delegate dispatcher failed");
            }
        }
        info!("transport manager stopped");
    }
}
