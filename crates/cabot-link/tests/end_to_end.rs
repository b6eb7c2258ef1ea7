//! Both links against a scripted robot: a mock GATT central on one side and a
//! loopback socket on the other.

use std::sync::Arc;
use std::time::Duration;

use cabot_link::frame::{
    characteristic_uuid, fragment, Event, EventCodec, DESTINATION, HEARTBEAT,
};
use cabot_link::peer::{BleConfig, LivenessConfig, TcpConfig};
use cabot_link::proto::{
    Link, LogResponse, NavigationEvent, NavigationEventRequest, OperatingMode, SpeakRequest,
};
use cabot_link::transport::mock::MockPeripheral;
use cabot_link::transport::{AttRequest, CentralId, GattEvent, GattPeripheral, ManagerState};
use cabot_link::{Delegate, ManagerConfig, TransportManager};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connected(Link, bool),
    Version(Link, bool, String),
    Speak(SpeakRequest),
    Navigation(NavigationEventRequest),
    LogList(LogResponse),
    LogReport(LogResponse),
    Bluetooth(ManagerState),
}

struct Recorder(mpsc::UnboundedSender<Call>);

impl Recorder {
    fn record(&self, call: Call) {
        let _ = self.0.send(call);
    }
}

impl Delegate for Recorder {
    fn on_connected_changed(&mut self, link: Link, connected: bool) {
        self.record(Call::Connected(link, connected));
    }

    fn on_version_checked(&mut self, link: Link, matched: bool, version: &str) {
        self.record(Call::Version(link, matched, version.to_string()));
    }

    fn on_speak_request(&mut self, request: SpeakRequest) {
        self.record(Call::Speak(request));
    }

    fn on_navigation_event(&mut self, request: NavigationEventRequest) {
        self.record(Call::Navigation(request));
    }

    fn on_log_list(&mut self, response: LogResponse) {
        self.record(Call::LogList(response));
    }

    fn on_log_report(&mut self, response: LogResponse) {
        self.record(Call::LogReport(response));
    }

    fn on_bluetooth_state(&mut self, state: ManagerState) {
        self.record(Call::Bluetooth(state));
    }
}

struct Rig {
    manager: TransportManager,
    peripheral: Arc<MockPeripheral>,
    gatt: mpsc::Sender<GattEvent>,
    calls: mpsc::UnboundedReceiver<Call>,
}

impl Rig {
    async fn start(tcp: Option<TcpConfig>) -> Self {
        let peripheral = Arc::new(MockPeripheral::new());
        let (tx, calls) = mpsc::unbounded_channel();

        let ble = BleConfig::default().with_liveness(fast_liveness());
        let mut config = ManagerConfig::default().with_ble(ble);
        if let Some(tcp) = tcp {
            config = config.with_tcp(tcp);
        }
        let manager = TransportManager::start(
            config,
            Some(Arc::clone(&peripheral) as Arc<dyn GattPeripheral>),
            Recorder(tx),
        );

        let gatt = manager.platform_events().unwrap();
        gatt.send(GattEvent::StateUpdated(ManagerState::PoweredOn))
            .await
            .unwrap();
        gatt.send(GattEvent::ServiceAdded(Ok(()))).await.unwrap();

        let mut rig = Self {
            manager,
            peripheral,
            gatt,
            calls,
        };
        rig.expect(|c| *c == Call::Bluetooth(ManagerState::PoweredOn))
            .await;
        rig
    }

    async fn write(&self, handle: u16, payload: &[u8]) {
        self.gatt.send(writes(handle, payload)).await.unwrap();
    }

    /// Skip calls until one matches.
    async fn expect(&mut self, pred: impl Fn(&Call) -> bool) -> Call {
        loop {
            let call = tokio::time::timeout(Duration::from_secs(5), self.calls.recv())
                .await
                .expect("delegate was not called")
                .expect("dispatcher stopped");
            if pred(&call) {
                return call;
            }
        }
    }

    /// Every call made within `window`.
    async fn drain(&mut self, window: Duration) -> Vec<Call> {
        let deadline = tokio::time::Instant::now() + window;
        let mut calls = Vec::new();
        while let Ok(Some(call)) = tokio::time::timeout_at(deadline, self.calls.recv()).await {
            calls.push(call);
        }
        calls
    }
}

fn fast_liveness() -> LivenessConfig {
    LivenessConfig::default().with_interval(Duration::from_millis(50))
}

fn tcp_config(addr: String) -> TcpConfig {
    TcpConfig::new([addr], "phone-1")
        .with_reconnect_wait(Duration::from_millis(20))
        .with_liveness(fast_liveness())
}

async fn robot() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> Framed<TcpStream, EventCodec> {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("app never connected")
        .unwrap();
    Framed::new(stream, EventCodec::new())
}

async fn robot_recv(socket: &mut Framed<TcpStream, EventCodec>, name: &str) -> Event {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no event from app")
            .expect("socket closed")
            .unwrap();
        if event.event == name {
            return event;
        }
    }
}

fn navigation(request_id: i64) -> String {
    format!(r#"{{"request_id":{request_id},"type":"arrived","param":"gate-3"}}"#)
}

fn speak_json(request_id: i64, text: &str) -> String {
    serde_json::json!({ "request_id": request_id, "text": text }).to_string()
}

/// One write batch carrying `payload` as 20-byte fragments.
fn writes(handle: u16, payload: &[u8]) -> GattEvent {
    let requests = fragment(payload, 20)
        .unwrap()
        .into_iter()
        .enumerate()
        .map(|(i, value)| AttRequest {
            id: i as u64,
            central: CentralId("robot".to_string()),
            characteristic: characteristic_uuid(handle),
            offset: 0,
            value,
        })
        .collect();
    GattEvent::WriteRequests(requests)
}

#[tokio::test]
async fn going_to_gate_3_is_spoken() {
    let mut rig = Rig::start(None).await;
    rig.write(
        cabot_link::frame::SPEECH,
        speak_json(42, "Going to gate 3").as_bytes(),
    )
    .await;

    match rig.expect(|c| matches!(c, Call::Speak(_))).await {
        Call::Speak(request) => {
            assert_eq!(request.request_id, 42);
            assert_eq!(request.text, "Going to gate 3");
        }
        _ => unreachable!(),
    }
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn gzip_payload_is_inflated() {
    let mut rig = Rig::start(None).await;
    let packed = cabot_link::frame::gzip(speak_json(1, "Going to gate 3").as_bytes()).unwrap();
    rig.write(cabot_link::frame::SPEECH, &packed).await;

    assert!(matches!(
        rig.expect(|c| matches!(c, Call::Speak(_))).await,
        Call::Speak(SpeakRequest { ref text, .. }) if text == "Going to gate 3"
    ));
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn duplicate_across_transports_reaches_delegate_once() {
    let (listener, addr) = robot().await;
    let mut rig = Rig::start(Some(tcp_config(addr))).await;
    let mut socket = accept(&listener).await;

    socket
        .send(Event::new("navigate", navigation(7)))
        .await
        .unwrap();
    let first = rig.expect(|c| matches!(c, Call::Navigation(_))).await;
    assert!(matches!(first, Call::Navigation(ref n) if n.request_id == 7));

    rig.write(cabot_link::frame::NAVIGATION, navigation(7).as_bytes())
        .await;
    rig.write(cabot_link::frame::NAVIGATION, navigation(5).as_bytes())
        .await;
    rig.write(cabot_link::frame::NAVIGATION, navigation(8).as_bytes())
        .await;

    let ids: Vec<_> = rig
        .drain(Duration::from_millis(300))
        .await
        .into_iter()
        .filter_map(|c| match c {
            Call::Navigation(n) => Some((n.request_id, n.event)),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec![(8, NavigationEvent::Arrived)]);
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn outbound_prefers_tcp_and_falls_back_to_ble() {
    let (listener, addr) = robot().await;
    let mut rig = Rig::start(Some(tcp_config(addr))).await;
    let destination = characteristic_uuid(DESTINATION);
    rig.peripheral.subscribe(destination);

    let mut socket = accept(&listener).await;
    rig.expect(|c| *c == Call::Connected(Link::Tcp, true)).await;

    assert!(rig.manager.send_destination("gate-3").await);
    assert_eq!(robot_recv(&mut socket, "destination").await.data, "gate-3");
    assert!(rig.peripheral.updates_on(&destination).is_empty());

    drop(socket);
    drop(listener);
    rig.expect(|c| *c == Call::Connected(Link::Tcp, false)).await;

    assert!(rig.manager.send_destination("gate-4").await);
    assert_eq!(rig.peripheral.updates_on(&destination), vec![b"gate-4".to_vec()]);
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn version_mismatch_is_only_a_warning() {
    let (listener, addr) = robot().await;
    let mut rig = Rig::start(Some(tcp_config(addr))).await;
    let mut socket = accept(&listener).await;

    robot_recv(&mut socket, "req_version").await;
    socket
        .send(Event::new("cabot_version", "20220101"))
        .await
        .unwrap();
    assert_eq!(
        rig.expect(|c| matches!(c, Call::Version(..))).await,
        Call::Version(Link::Tcp, false, "20220101".to_string())
    );

    socket
        .send(Event::new("speak", speak_json(3, "still talking")))
        .await
        .unwrap();
    assert!(matches!(
        rig.expect(|c| matches!(c, Call::Speak(_))).await,
        Call::Speak(SpeakRequest { request_id: 3, .. })
    ));
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn debug_mode_ignores_navigation_events() {
    let mut rig = Rig::start(None).await;
    rig.manager.set_mode(OperatingMode::Debug);

    rig.write(cabot_link::frame::NAVIGATION, navigation(1).as_bytes())
        .await;
    rig.write(cabot_link::frame::SPEECH, speak_json(1, "hello").as_bytes())
        .await;
    let first = rig
        .expect(|c| matches!(c, Call::Navigation(_) | Call::Speak(_)))
        .await;
    assert!(matches!(first, Call::Speak(_)));

    rig.manager.set_mode(OperatingMode::Normal);
    rig.write(cabot_link::frame::NAVIGATION, navigation(1).as_bytes())
        .await;
    assert!(matches!(
        rig.expect(|c| matches!(c, Call::Navigation(_))).await,
        Call::Navigation(NavigationEventRequest { request_id: 1, .. })
    ));
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn log_responses_are_routed_by_kind() {
    let mut rig = Rig::start(None).await;
    let list = r#"{"request_id":1,"type":"list","log_list":[{"name":"2024-05-01-10-00-00"}]}"#;
    let report = r#"{"request_id":2,"type":"report","status":"OK"}"#;

    rig.write(cabot_link::frame::LOG_RESPONSE, list.as_bytes())
        .await;
    match rig.expect(|c| matches!(c, Call::LogList(_))).await {
        Call::LogList(response) => {
            assert_eq!(response.log_list.len(), 1);
            assert_eq!(response.log_list[0].name, "2024-05-01-10-00-00");
        }
        _ => unreachable!(),
    }

    rig.write(cabot_link::frame::LOG_RESPONSE, report.as_bytes())
        .await;
    assert!(matches!(
        rig.expect(|c| matches!(c, Call::LogReport(_))).await,
        Call::LogReport(LogResponse { request_id: 2, .. })
    ));
    rig.manager.shutdown().await;
}

#[tokio::test]
async fn ble_heartbeat_connects_and_shutdown_disconnects() {
    let mut rig = Rig::start(None).await;
    rig.peripheral.subscribe(characteristic_uuid(HEARTBEAT));
    rig.expect(|c| *c == Call::Connected(Link::Ble, true)).await;
    assert!(rig.manager.is_connected());

    let Rig {
        manager,
        peripheral,
        mut calls,
        ..
    } = rig;
    manager.shutdown().await;

    let mut rest = Vec::new();
    while let Some(call) = calls.recv().await {
        rest.push(call);
    }
    assert_eq!(rest, vec![Call::Connected(Link::Ble, false)]);
    assert!(peripheral.services().is_empty());
    assert!(!peripheral.is_advertising());
}
