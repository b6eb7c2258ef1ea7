//! Application callbacks.
//!
//! Every callback runs on one dispatcher task, in the order the adapters
//! reported the events, so implementations never see two calls at once.

use cabot_link_peer::PeerEvent;
use cabot_link_proto::{
    BatteryStatus, DeviceStatus, Link, LogRequestKind, LogResponse, Message,
    NavigationEventRequest, SpeakRequest, SystemStatus, TouchStatus,
};
use cabot_link_transport::ManagerState;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives what the robot sends.
///
/// All methods default to doing nothing.
#[allow(unused_variables)]
pub trait Delegate: Send + 'static {
    /// A link came up or went down. Reported once per transition.
    fn on_connected_changed(&mut self, link: Link, connected: bool) {}

    /// The robot announced its protocol version. A mismatch is a warning;
    /// the link keeps running.
    fn on_version_checked(&mut self, link: Link, matched: bool, version: &str) {}

    fn on_speak_request(&mut self, request: SpeakRequest) {}

    fn on_navigation_event(&mut self, request: NavigationEventRequest) {}

    fn on_device_status(&mut self, status: DeviceStatus) {}

    fn on_system_status(&mut self, status: SystemStatus) {}

    fn on_battery_status(&mut self, status: BatteryStatus) {}

    fn on_touch_status(&mut self, status: TouchStatus) {}

    fn on_log_list(&mut self, response: LogResponse) {}

    fn on_log_detail(&mut self, response: LogResponse) {}

    fn on_log_report(&mut self, response: LogResponse) {}

    fn on_bluetooth_state(&mut self, state: ManagerState) {}
}

/// Drain adapter events into `delegate` until every adapter has stopped.
pub(crate) async fn dispatch<D: Delegate>(
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
    mut delegate: D,
) {
    while let Some(event) = events.recv().await {
        deliver(&mut delegate, event);
    }
    debug!("delegate dispatcher stopped");
}

fn deliver<D: Delegate>(delegate: &mut D, event: PeerEvent) {
    match event {
        PeerEvent::ConnectionChanged { link, connected } => {
            delegate.on_connected_changed(link, connected)
        }
        PeerEvent::VersionChecked { link, check } => {
            delegate.on_version_checked(link, check.matched, &check.remote)
        }
        PeerEvent::BluetoothState(state) => delegate.on_bluetooth_state(state),
        PeerEvent::Message { message, .. } => match message {
            Message::Speak(request) => delegate.on_speak_request(request),
            Message::Navigation(request) => delegate.on_navigation_event(request),
            Message::Touch(status) => delegate.on_touch_status(status),
            Message::DeviceStatus(status) => delegate.on_device_status(status),
            Message::SystemStatus(status) => delegate.on_system_status(status),
            Message::BatteryStatus(status) => delegate.on_battery_status(status),
            Message::LogResponse(response) => match response.kind {
                LogRequestKind::List => delegate.on_log_list(response),
                LogRequestKind::Detail => delegate.on_log_detail(response),
                LogRequestKind::Report => delegate.on_log_report(response),
            },
            // Version announcements surface as VersionChecked.
            Message::Version(_) => {}
        },
    }
}
