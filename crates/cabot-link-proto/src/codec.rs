//! Payload codec.
//!
//! Inbound: every channel (BLE) or event name (TCP) is bound to one message
//! kind. The version announcement is plain text; everything else is JSON.
//!
//! Outbound: [`Outbound`] values encode to the same bytes on both links. On
//! BLE, [`chunk`] splits anything larger than one notify into header-prefixed
//! fragments.

use bytes::Bytes;
use cabot_link_frame::{
    channel_name, fragment, BATTERY_STATUS, DESTINATION, DEVICE_STATUS, HEARTBEAT, LOG,
    LOG_REQUEST, LOG_RESPONSE, MANAGE, NAVIGATION, SPEECH, SUMMON, SYSTEM_STATUS, TOUCH, VERSION,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CodecError, Result};
use crate::message::{
    ActivityLog, DeviceStatus, LogRequest, ManageCommand, Message, MessageKind, SpeakCommand,
};

/// Where an inbound message kind arrives on each link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundBinding {
    pub kind: MessageKind,
    pub handle: u16,
    pub event: &'static str,
}

pub const INBOUND: [InboundBinding; 8] = [
    InboundBinding {
        kind: MessageKind::VersionAnnounce,
        handle: VERSION,
        event: "cabot_version",
    },
    InboundBinding {
        kind: MessageKind::DeviceStatus,
        handle: DEVICE_STATUS,
        event: "device_status",
    },
    InboundBinding {
        kind: MessageKind::SystemStatus,
        handle: SYSTEM_STATUS,
        event: "system_status",
    },
    InboundBinding {
        kind: MessageKind::BatteryStatus,
        handle: BATTERY_STATUS,
        event: "battery_status",
    },
    InboundBinding {
        kind: MessageKind::SpeakRequest,
        handle: SPEECH,
        event: "speak",
    },
    InboundBinding {
        kind: MessageKind::NavigationEventRequest,
        handle: NAVIGATION,
        event: "navigate",
    },
    InboundBinding {
        kind: MessageKind::TouchStatus,
        handle: TOUCH,
        event: "touch",
    },
    InboundBinding {
        kind: MessageKind::LogResponse,
        handle: LOG_RESPONSE,
        event: "log_response",
    },
];

pub fn kind_for_channel(handle: u16) -> Option<MessageKind> {
    INBOUND.iter().find(|b| b.handle == handle).map(|b| b.kind)
}

pub fn kind_for_event(event: &str) -> Option<MessageKind> {
    INBOUND.iter().find(|b| b.event == event).map(|b| b.kind)
}

/// Decode a complete payload as `kind`.
///
/// Undecodable payloads are logged as text and returned as an error; the
/// caller drops them.
pub fn decode(kind: MessageKind, payload: &[u8]) -> Result<Message> {
    match kind {
        MessageKind::VersionAnnounce => {
            let text = std::str::from_utf8(payload)?;
            Ok(Message::Version(text.trim().to_string()))
        }
        MessageKind::SpeakRequest => json(kind, payload).map(Message::Speak),
        MessageKind::NavigationEventRequest => json(kind, payload).map(Message::Navigation),
        MessageKind::TouchStatus => json(kind, payload).map(Message::Touch),
        MessageKind::LogResponse => json(kind, payload).map(Message::LogResponse),
        MessageKind::DeviceStatus => {
            let mut status: DeviceStatus = json(kind, payload)?;
            status.sort_devices();
            Ok(Message::DeviceStatus(status))
        }
        MessageKind::SystemStatus => json(kind, payload).map(Message::SystemStatus),
        MessageKind::BatteryStatus => json(kind, payload).map(Message::BatteryStatus),
    }
}

/// Decode a payload reassembled on BLE channel `handle`.
pub fn decode_channel(handle: u16, payload: &[u8]) -> Result<Message> {
    let kind = kind_for_channel(handle).ok_or(CodecError::UnboundChannel(handle))?;
    decode(kind, payload)
}

/// Decode the data of TCP event `event`.
pub fn decode_event(event: &str, data: &str) -> Result<Message> {
    let kind = kind_for_event(event).ok_or_else(|| CodecError::UnboundEvent(event.to_string()))?;
    decode(kind, data.as_bytes())
}

fn json<T: DeserializeOwned>(kind: MessageKind, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|err| {
        warn!(
            %kind,
            error = %err,
            payload = %String::from_utf8_lossy(payload),
            "undecodable payload dropped"
        );
        CodecError::InvalidJson(err)
    })
}

/// A message the app sends to the robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Speak(SpeakCommand),
    Destination(String),
    Summon(String),
    Manage {
        command: ManageCommand,
        param: Option<String>,
    },
    LogRequest(LogRequest),
    ActivityLog(ActivityLog),
    /// Heartbeat body: `1` on BLE, `<device id>/<mode>` on TCP.
    Heartbeat(String),
    /// Ask the robot to announce its protocol version (TCP only).
    VersionRequest,
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::Speak(_) => "speak",
            Outbound::Destination(_) => "destination",
            Outbound::Summon(_) => "summon",
            Outbound::Manage { .. } => "manage",
            Outbound::LogRequest(_) => "log_request",
            Outbound::ActivityLog(_) => "log",
            Outbound::Heartbeat(_) => "heartbeat",
            Outbound::VersionRequest => "req_version",
        }
    }

    /// BLE channel carrying this message.
    pub fn channel(&self) -> Result<u16> {
        match self {
            Outbound::Speak(_) => Ok(SPEECH),
            Outbound::Destination(_) => Ok(DESTINATION),
            Outbound::Summon(_) => Ok(SUMMON),
            Outbound::Manage { .. } => Ok(MANAGE),
            Outbound::LogRequest(_) => Ok(LOG_REQUEST),
            Outbound::ActivityLog(_) => Ok(LOG),
            Outbound::Heartbeat(_) => Ok(HEARTBEAT),
            Outbound::VersionRequest => Err(CodecError::NoChannel(self.name())),
        }
    }

    /// TCP event name carrying this message.
    pub fn event(&self) -> &'static str {
        match self {
            Outbound::Manage { .. } => "manage_cabot",
            other => other.name(),
        }
    }

    /// Encoded body; identical on both links.
    pub fn encode(&self) -> Result<Bytes> {
        let body = match self {
            Outbound::Speak(cmd) => serde_json::to_vec(cmd)?,
            Outbound::Destination(id) | Outbound::Summon(id) | Outbound::Heartbeat(id) => {
                id.clone().into_bytes()
            }
            Outbound::Manage {
                command,
                param: Some(param),
            } => format!("{command}-{param}").into_bytes(),
            Outbound::Manage {
                command,
                param: None,
            } => command.as_str().as_bytes().to_vec(),
            Outbound::LogRequest(request) => serde_json::to_vec(request)?,
            Outbound::ActivityLog(entry) => serde_json::to_vec(entry)?,
            Outbound::VersionRequest => b"true".to_vec(),
        };
        Ok(Bytes::from(body))
    }
}

/// Split an encoded payload for a channel limited to `max_payload` bytes per notify.
///
/// Payloads that fit are sent as-is; larger ones become header-prefixed
/// fragments so the peer can reassemble them.
pub fn chunk(handle: u16, payload: Bytes, max_payload: usize) -> Result<Vec<Bytes>> {
    if payload.len() <= max_payload {
        return Ok(vec![payload]);
    }
    let chunks = fragment(&payload, max_payload)?;
    debug!(
        channel = channel_name(handle),
        len = payload.len(),
        chunks = chunks.len(),
        "payload fragmented"
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use cabot_link_frame::Reassembler;

    use super::*;
    use crate::message::{DeviceStatusLevel, NavigationEvent, SpeechPriority};

    #[test]
    fn every_binding_is_unique() {
        for (i, a) in INBOUND.iter().enumerate() {
            for b in &INBOUND[i + 1..] {
                assert_ne!(a.handle, b.handle);
                assert_ne!(a.event, b.event);
                assert_ne!(a.kind, b.kind);
            }
        }
    }

    #[test]
    fn going_to_gate_3() {
        let msg = decode_channel(SPEECH, br#"{"request_id":42,"text":"Going to gate 3"}"#).unwrap();
        match msg {
            Message::Speak(req) => {
                assert_eq!(req.request_id, 42);
                assert_eq!(req.text, "Going to gate 3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn version_text_is_trimmed() {
        let msg = decode_event("cabot_version", " 20230222\n").unwrap();
        assert_eq!(msg, Message::Version("20230222".to_string()));
    }

    #[test]
    fn device_status_is_sorted_on_decode() {
        let msg = decode_event(
            "device_status",
            r#"{"level":"Error","devices":[{"type":"a","level":"OK"},{"type":"b","level":"Error"}]}"#,
        )
        .unwrap();
        let Message::DeviceStatus(status) = msg else {
            panic!("not a device status");
        };
        assert_eq!(status.devices[0].level, DeviceStatusLevel::Error);
    }

    #[test]
    fn navigation_over_tcp() {
        let msg = decode_event("navigate", r#"{"request_id":5,"type":"arrived"}"#).unwrap();
        let Message::Navigation(req) = msg else {
            panic!("not a navigation event");
        };
        assert_eq!(req.event, NavigationEvent::Arrived);
    }

    #[test]
    fn bad_json_is_an_error_not_a_panic() {
        assert!(matches!(
            decode_channel(NAVIGATION, b"{not json"),
            Err(CodecError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_channel(VERSION, &[0xff, 0xfe]),
            Err(CodecError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn unbound_sources_rejected() {
        assert!(matches!(
            decode_channel(MANAGE, b"x"),
            Err(CodecError::UnboundChannel(MANAGE))
        ));
        assert!(matches!(
            decode_event("share", "{}"),
            Err(CodecError::UnboundEvent(_))
        ));
    }

    #[test]
    fn manage_command_encoding() {
        let plain = Outbound::Manage {
            command: ManageCommand::Reboot,
            param: None,
        };
        assert_eq!(plain.encode().unwrap().as_ref(), b"reboot");
        assert_eq!(plain.event(), "manage_cabot");
        assert_eq!(plain.channel().unwrap(), MANAGE);

        let with_param = Outbound::Manage {
            command: ManageCommand::Lang,
            param: Some("ja".to_string()),
        };
        assert_eq!(with_param.encode().unwrap().as_ref(), b"lang-ja");
    }

    #[test]
    fn activity_log_is_json() {
        let out = Outbound::ActivityLog(ActivityLog {
            category: "tour-text".into(),
            text: "Museum".into(),
            memo: "myuujiamu".into(),
        });
        let value: serde_json::Value = serde_json::from_slice(&out.encode().unwrap()).unwrap();
        assert_eq!(value["category"], "tour-text");
        assert_eq!(out.event(), "log");
        assert_eq!(out.channel().unwrap(), LOG);
    }

    #[test]
    fn speak_command_goes_to_speech_channel() {
        let out = Outbound::Speak(SpeakCommand {
            text: "hello".into(),
            priority: SpeechPriority::High,
            force: true,
        });
        assert_eq!(out.channel().unwrap(), SPEECH);
        let value: serde_json::Value = serde_json::from_slice(&out.encode().unwrap()).unwrap();
        assert_eq!(value["priority"], "High");
        assert_eq!(value["force"], true);
    }

    #[test]
    fn version_request_is_tcp_only() {
        assert!(matches!(
            Outbound::VersionRequest.channel(),
            Err(CodecError::NoChannel("req_version"))
        ));
        assert_eq!(Outbound::VersionRequest.encode().unwrap().as_ref(), b"true");
    }

    #[test]
    fn small_payload_is_not_fragmented() {
        let chunks = chunk(DESTINATION, Bytes::from_static(b"gate-3"), 20).unwrap();
        assert_eq!(chunks, vec![Bytes::from_static(b"gate-3")]);
    }

    #[test]
    fn large_payload_reassembles() {
        let payload: Bytes = serde_json::to_vec(&LogRequest::report("log", "t", "d".repeat(500)))
            .unwrap()
            .into();
        let chunks = chunk(LOG_REQUEST, payload.clone(), 64).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 64));

        let mut r = Reassembler::new();
        let mut out = None;
        for c in &chunks {
            out = r.push(0, c).unwrap();
        }
        assert_eq!(out.unwrap(), payload);
    }
}
