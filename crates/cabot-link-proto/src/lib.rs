//! Typed messages for cabot-link.
//!
//! This crate sits between framing and the link adapters:
//! - [`message`] defines what the robot and the app exchange
//! - [`codec`] binds BLE channels and TCP events to message kinds and
//!   encodes outbound messages
//! - [`arbiter`] admits each request at most once across both links, after
//!   the operating-mode gate in [`mode`]

pub mod arbiter;
pub mod codec;
pub mod error;
pub mod message;
pub mod mode;

pub use arbiter::{Arbiter, Link, Verdict};
pub use codec::{
    chunk, decode, decode_channel, decode_event, kind_for_channel, kind_for_event,
    InboundBinding, Outbound, INBOUND,
};
pub use error::{CodecError, Result};
pub use message::{
    ActivityLog, BatteryStatus, DeviceStatus, DeviceStatusEntry, DeviceStatusLevel,
    DiagnosticLevel, DiagnosticStatus, KeyValue, LogEntry, LogRequest, LogRequestKind,
    LogResponse, LogStatus, ManageCommand, Message, MessageKind, NavigationEvent,
    NavigationEventRequest, RequestId, SpeakCommand, SpeakRequest, SpeechPriority, SystemLevel,
    SystemStatus, TouchLevel, TouchStatus,
};
pub use mode::{ModeGate, OperatingMode};
