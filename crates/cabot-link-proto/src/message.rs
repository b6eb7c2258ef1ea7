//! Application messages exchanged with the robot.
//!
//! Inbound types mirror the robot's JSON; unknown fields are ignored and
//! optional fields default so that older robots still decode.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sender-assigned, strictly increasing per message type.
pub type RequestId = i64;

/// Type tag of an inbound message; one arbitration cursor exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    SpeakRequest,
    NavigationEventRequest,
    TouchStatus,
    LogResponse,
    DeviceStatus,
    SystemStatus,
    BatteryStatus,
    VersionAnnounce,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::SpeakRequest => "SpeakRequest",
            MessageKind::NavigationEventRequest => "NavigationEventRequest",
            MessageKind::TouchStatus => "TouchStatus",
            MessageKind::LogResponse => "LogResponse",
            MessageKind::DeviceStatus => "DeviceStatus",
            MessageKind::SystemStatus => "SystemStatus",
            MessageKind::BatteryStatus => "BatteryStatus",
            MessageKind::VersionAnnounce => "VersionAnnounce",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechPriority {
    Low,
    #[default]
    Normal,
    High,
    Required,
}

/// Text the robot wants spoken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub request_id: RequestId,
    pub text: String,
    /// Interrupt whatever is being spoken.
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default)]
    pub priority: SpeechPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationEvent {
    Next,
    Arrived,
    Subtour,
    Skip,
    Content,
    Sound,
    Getlanguage,
    Gethandleside,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEventRequest {
    pub request_id: RequestId,
    #[serde(rename = "type")]
    pub event: NavigationEvent,
    #[serde(default)]
    pub param: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchLevel {
    Touching,
    NoTouch,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Whether the user is holding the handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchStatus {
    #[serde(default)]
    pub level: TouchLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRequestKind {
    List,
    Detail,
    Report,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    #[default]
    OK,
    Error,
    #[serde(other)]
    Unknown,
}

/// One robot-side log bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_report_submitted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_uploaded_to_box: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogResponse {
    pub request_id: RequestId,
    #[serde(rename = "type")]
    pub kind: LogRequestKind,
    #[serde(default)]
    pub log_list: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogEntry>,
    #[serde(default)]
    pub status: LogStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatusLevel {
    OK,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DeviceStatusLevel {
    /// Display order: errors first, healthy devices last.
    pub fn severity_rank(self) -> u8 {
        match self {
            DeviceStatusLevel::Error => 0,
            DeviceStatusLevel::Unknown => 1,
            DeviceStatusLevel::OK => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusEntry {
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub model: String,
    pub level: DeviceStatusLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub level: DeviceStatusLevel,
    #[serde(default)]
    pub devices: Vec<DeviceStatusEntry>,
}

impl DeviceStatus {
    /// Stable sort of `devices` into Error, Unknown, OK order.
    pub fn sort_devices(&mut self) {
        self.devices.sort_by_key(|d| d.level.severity_rank());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemLevel {
    #[default]
    Unknown,
    Inactive,
    Active,
    Activating,
    Deactivating,
    Error,
}

/// ROS diagnostic level, carried as an integer on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiagnosticLevel {
    #[default]
    OK,
    Warning,
    Error,
    Stale,
}

impl TryFrom<u8> for DiagnosticLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(DiagnosticLevel::OK),
            1 => Ok(DiagnosticLevel::Warning),
            2 => Ok(DiagnosticLevel::Error),
            3 => Ok(DiagnosticLevel::Stale),
            other => Err(format!("diagnostic level out of range: {other}")),
        }
    }
}

impl From<DiagnosticLevel> for u8 {
    fn from(level: DiagnosticLevel) -> u8 {
        level as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticStatus {
    pub level: DiagnosticLevel,
    pub name: String,
    #[serde(default)]
    pub hardware_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

impl DiagnosticStatus {
    /// Last segment of the slash-separated diagnostic name.
    pub fn component_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub level: SystemLevel,
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticStatus>,
}

/// Battery diagnostics share the diagnostic status shape.
pub type BatteryStatus = DiagnosticStatus;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Speak(SpeakRequest),
    Navigation(NavigationEventRequest),
    Touch(TouchStatus),
    LogResponse(LogResponse),
    DeviceStatus(DeviceStatus),
    SystemStatus(SystemStatus),
    BatteryStatus(BatteryStatus),
    Version(String),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Speak(_) => MessageKind::SpeakRequest,
            Message::Navigation(_) => MessageKind::NavigationEventRequest,
            Message::Touch(_) => MessageKind::TouchStatus,
            Message::LogResponse(_) => MessageKind::LogResponse,
            Message::DeviceStatus(_) => MessageKind::DeviceStatus,
            Message::SystemStatus(_) => MessageKind::SystemStatus,
            Message::BatteryStatus(_) => MessageKind::BatteryStatus,
            Message::Version(_) => MessageKind::VersionAnnounce,
        }
    }

    /// Telemetry snapshots and version announcements carry no id.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::Speak(m) => Some(m.request_id),
            Message::Navigation(m) => Some(m.request_id),
            Message::LogResponse(m) => Some(m.request_id),
            _ => None,
        }
    }
}

/// Management commands understood by the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManageCommand {
    Reboot,
    Poweroff,
    Start,
    Stop,
    Lang,
    RestartLocalization,
    Handleside,
    Touchmode,
}

impl ManageCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            ManageCommand::Reboot => "reboot",
            ManageCommand::Poweroff => "poweroff",
            ManageCommand::Start => "start",
            ManageCommand::Stop => "stop",
            ManageCommand::Lang => "lang",
            ManageCommand::RestartLocalization => "restart_localization",
            ManageCommand::Handleside => "handleside",
            ManageCommand::Touchmode => "touchmode",
        }
    }
}

impl fmt::Display for ManageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for robot-side logs, sent as a flat string map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRequest(pub BTreeMap<String, String>);

impl LogRequest {
    fn of(kind: LogRequestKind) -> Self {
        let kind = match kind {
            LogRequestKind::List => "list",
            LogRequestKind::Detail => "detail",
            LogRequestKind::Report => "report",
        };
        let mut map = BTreeMap::new();
        map.insert("type".to_string(), kind.to_string());
        Self(map)
    }

    pub fn list() -> Self {
        Self::of(LogRequestKind::List)
    }

    pub fn detail(log_name: impl Into<String>) -> Self {
        Self::of(LogRequestKind::Detail).with("log_name", log_name)
    }

    pub fn report(
        log_name: impl Into<String>,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::of(LogRequestKind::Report)
            .with("log_name", log_name)
            .with("title", title)
            .with("detail", detail)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl From<BTreeMap<String, String>> for LogRequest {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// User-visible activity recorded in the robot's log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub category: String,
    pub text: String,
    pub memo: String,
}

/// Speech the app asks the robot side to voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakCommand {
    pub text: String,
    pub priority: SpeechPriority,
    pub force: bool,
}
