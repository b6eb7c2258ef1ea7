use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::message::MessageKind;

/// App operating mode, reported to the robot with every TCP heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    #[default]
    Normal,
    Advanced,
    Debug,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::Normal => "Normal",
            OperatingMode::Advanced => "Advanced",
            OperatingMode::Debug => "Debug",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(OperatingMode::Normal),
            "Advanced" => Ok(OperatingMode::Advanced),
            "Debug" => Ok(OperatingMode::Debug),
            other => Err(format!("unknown operating mode: {other}")),
        }
    }
}

/// Which message kinds are not honored in which modes.
///
/// Checked before request-id arbitration, so a gated message does not advance
/// its cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeGate {
    blocked: Vec<(OperatingMode, MessageKind)>,
}

impl Default for ModeGate {
    /// Navigation events are ignored in `Debug` mode.
    fn default() -> Self {
        Self::permissive().with_blocked(OperatingMode::Debug, MessageKind::NavigationEventRequest)
    }
}

impl ModeGate {
    /// A gate that lets everything through.
    pub fn permissive() -> Self {
        Self {
            blocked: Vec::new(),
        }
    }

    pub fn with_blocked(mut self, mode: OperatingMode, kind: MessageKind) -> Self {
        if !self.blocked.contains(&(mode, kind)) {
            self.blocked.push((mode, kind));
        }
        self
    }

    pub fn allows(&self, mode: OperatingMode, kind: MessageKind) -> bool {
        !self.blocked.contains(&(mode, kind))
    }
}
