//! The fixed BLE channel table.
//!
//! Every channel is one GATT characteristic whose UUID is derived from its
//! 16-bit handle. Handle 0 doubles as the service UUID.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FrameError, Result};
use crate::reassembly::{Reassembler, ReassemblyConfig};

/// Protocol version announcement (robot → app).
pub const VERSION: u16 = 0x0000;

/// Manage commands (app → robot).
pub const MANAGE: u16 = 0x0001;

/// Device status telemetry.
pub const DEVICE_STATUS: u16 = 0x0002;

/// System status telemetry.
pub const SYSTEM_STATUS: u16 = 0x0003;

/// Battery status telemetry.
pub const BATTERY_STATUS: u16 = 0x0004;

/// Activity log entries (app → robot).
pub const LOG: u16 = 0x0005;

/// Summon a robot to a destination.
pub const SUMMON: u16 = 0x0010;

/// Navigate to a destination.
pub const DESTINATION: u16 = 0x0011;

/// Speech requests in, speech text out.
pub const SPEECH: u16 = 0x0030;

/// Navigation events.
pub const NAVIGATION: u16 = 0x0040;

/// Handle touch status.
pub const TOUCH: u16 = 0x0041;

/// Log list/detail/report requests.
pub const LOG_REQUEST: u16 = 0x0050;

/// Responses to log requests.
pub const LOG_RESPONSE: u16 = 0x0051;

/// App heartbeat.
pub const HEARTBEAT: u16 = 0x9999;

/// Default per-notify payload when the peripheral reports no limit.
pub const DEFAULT_MAX_PAYLOAD: usize = 182;

const UUID_TEMPLATE: u128 = 0x35CE0000_5E89_4C0D_A3F6_8A6A507C1BF1;

/// UUID of the characteristic for `handle` (`35CEXXXX-5E89-4C0D-A3F6-8A6A507C1BF1`).
pub const fn characteristic_uuid(handle: u16) -> Uuid {
    Uuid::from_u128(UUID_TEMPLATE | ((handle as u128) << 96))
}

/// UUID of the primary service.
pub const fn service_uuid() -> Uuid {
    characteristic_uuid(VERSION)
}

/// Returns a human-readable name for a channel handle.
pub fn channel_name(handle: u16) -> &'static str {
    match handle {
        VERSION => "VERSION",
        MANAGE => "MANAGE",
        DEVICE_STATUS => "DEVICE_STATUS",
        SYSTEM_STATUS => "SYSTEM_STATUS",
        BATTERY_STATUS => "BATTERY_STATUS",
        LOG => "LOG",
        SUMMON => "SUMMON",
        DESTINATION => "DESTINATION",
        SPEECH => "SPEECH",
        NAVIGATION => "NAVIGATION",
        TOUCH => "TOUCH",
        LOG_REQUEST => "LOG_REQUEST",
        LOG_RESPONSE => "LOG_RESPONSE",
        HEARTBEAT => "HEARTBEAT",
        _ => "UNKNOWN",
    }
}

/// Who writes a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// App → robot, delivered with notify/indicate.
    Notify,
    /// Robot → app, delivered with GATT writes.
    Write,
    Both,
}

impl Direction {
    pub fn is_inbound(self) -> bool {
        matches!(self, Direction::Write | Direction::Both)
    }

    pub fn is_outbound(self) -> bool {
        matches!(self, Direction::Notify | Direction::Both)
    }
}

/// One logical BLE channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub handle: u16,
    pub direction: Direction,
    /// Largest single notify for this channel.
    pub max_payload: usize,
    pub uuid: Uuid,
}

impl Channel {
    pub const fn new(handle: u16, direction: Direction) -> Self {
        Self {
            handle,
            direction,
            max_payload: DEFAULT_MAX_PAYLOAD,
            uuid: characteristic_uuid(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        channel_name(self.handle)
    }
}

const DEFAULT_TABLE: [(u16, Direction); 14] = [
    (VERSION, Direction::Write),
    (MANAGE, Direction::Notify),
    (DEVICE_STATUS, Direction::Write),
    (SYSTEM_STATUS, Direction::Write),
    (BATTERY_STATUS, Direction::Write),
    (LOG, Direction::Notify),
    (SUMMON, Direction::Notify),
    (DESTINATION, Direction::Notify),
    (SPEECH, Direction::Both),
    (NAVIGATION, Direction::Write),
    (TOUCH, Direction::Write),
    (LOG_REQUEST, Direction::Notify),
    (LOG_RESPONSE, Direction::Write),
    (HEARTBEAT, Direction::Notify),
];

/// Immutable channel table plus the reassembly state of every inbound channel.
///
/// Each inbound channel owns its own [`Reassembler`]; nothing is shared between
/// channels.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    by_uuid: HashMap<Uuid, usize>,
    reassemblers: HashMap<u16, Reassembler>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// The standard CaBot channel table.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_PAYLOAD, ReassemblyConfig::default())
    }

    pub fn with_config(max_payload: usize, reassembly: ReassemblyConfig) -> Self {
        let channels = DEFAULT_TABLE.iter().map(|&(handle, direction)| Channel {
            max_payload,
            ..Channel::new(handle, direction)
        });
        Self::from_channels(channels, reassembly)
    }

    /// Build a registry from an explicit table. Later duplicates of a handle are ignored.
    pub fn from_channels(
        channels: impl IntoIterator<Item = Channel>,
        reassembly: ReassemblyConfig,
    ) -> Self {
        let mut table = Vec::new();
        let mut by_uuid = HashMap::new();
        let mut reassemblers = HashMap::new();

        for channel in channels {
            if by_uuid.contains_key(&channel.uuid) {
                warn!(handle = channel.handle, "duplicate channel handle ignored");
                continue;
            }
            by_uuid.insert(channel.uuid, table.len());
            if channel.direction.is_inbound() {
                reassemblers.insert(channel.handle, Reassembler::with_config(reassembly));
            }
            table.push(channel);
        }

        Self {
            channels: table,
            by_uuid,
            reassemblers,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, handle: u16) -> Option<&Channel> {
        self.channels.iter().find(|c| c.handle == handle)
    }

    pub fn by_uuid(&self, uuid: &Uuid) -> Option<&Channel> {
        self.by_uuid.get(uuid).map(|&idx| &self.channels[idx])
    }

    /// Route one link-level write to its channel's reassembler.
    ///
    /// Returns the channel handle and the complete payload once the last
    /// fragment has arrived.
    pub fn ingest(
        &mut self,
        uuid: &Uuid,
        link_offset: usize,
        data: &[u8],
    ) -> Result<Option<(u16, Bytes)>> {
        let handle = self
            .by_uuid(uuid)
            .filter(|c| c.direction.is_inbound())
            .map(|c| c.handle)
            .ok_or(FrameError::UnknownCharacteristic(*uuid))?;

        let reassembler = self
            .reassemblers
            .get_mut(&handle)
            .ok_or(FrameError::UnknownCharacteristic(*uuid))?;

        match reassembler.push(link_offset, data) {
            Ok(Some(payload)) => {
                debug!(
                    channel = channel_name(handle),
                    len = payload.len(),
                    "message reassembled"
                );
                Ok(Some((handle, payload)))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(channel = channel_name(handle), error = %err, "inbound write dropped");
                Err(err)
            }
        }
    }

    /// Abandon every partially assembled message.
    pub fn reset_all(&mut self) {
        for reassembler in self.reassemblers.values_mut() {
            reassembler.reset();
        }
    }

    /// Number of channels with a message in progress.
    pub fn in_progress(&self) -> usize {
        self.reassemblers.values().filter(|r| r.in_progress()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::fragment;

    #[test]
    fn uuid_template() {
        assert_eq!(
            service_uuid().to_string(),
            "35ce0000-5e89-4c0d-a3f6-8a6a507c1bf1"
        );
        assert_eq!(
            characteristic_uuid(SPEECH).to_string(),
            "35ce0030-5e89-4c0d-a3f6-8a6a507c1bf1"
        );
        assert_eq!(
            characteristic_uuid(HEARTBEAT).to_string(),
            "35ce9999-5e89-4c0d-a3f6-8a6a507c1bf1"
        );
    }

    #[test]
    fn default_table_directions() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.channels().len(), 14);
        assert_eq!(registry.get(SPEECH).unwrap().direction, Direction::Both);
        assert_eq!(registry.get(MANAGE).unwrap().direction, Direction::Notify);
        assert_eq!(registry.get(NAVIGATION).unwrap().direction, Direction::Write);
        assert!(registry
            .channels()
            .iter()
            .all(|c| c.max_payload == DEFAULT_MAX_PAYLOAD));
    }

    #[test]
    fn lookup_by_uuid() {
        let registry = ChannelRegistry::new();
        let channel = registry.by_uuid(&characteristic_uuid(TOUCH)).unwrap();
        assert_eq!(channel.handle, TOUCH);
        assert_eq!(channel.name(), "TOUCH");
        assert!(registry.by_uuid(&characteristic_uuid(0x0777)).is_none());
    }

    #[test]
    fn channels_reassemble_independently() {
        let mut registry = ChannelRegistry::new();
        let speech = characteristic_uuid(SPEECH);
        let nav = characteristic_uuid(NAVIGATION);

        let a = fragment(b"speech payload", 8).unwrap();
        let b = fragment(b"nav", 8).unwrap();

        assert!(registry.ingest(&speech, 0, &a[0]).unwrap().is_none());
        let (handle, payload) = registry.ingest(&nav, 0, &b[0]).unwrap().unwrap();
        assert_eq!(handle, NAVIGATION);
        assert_eq!(payload.as_ref(), b"nav");

        let mut done = None;
        for chunk in &a[1..] {
            done = registry.ingest(&speech, 0, chunk).unwrap();
        }
        assert_eq!(done.unwrap(), (SPEECH, Bytes::from_static(b"speech payload")));
    }

    #[test]
    fn writes_to_outbound_or_unknown_channel_rejected() {
        let mut registry = ChannelRegistry::new();
        let err = registry
            .ingest(&characteristic_uuid(MANAGE), 0, b"\x00\x01\x00\x00x")
            .unwrap_err();
        assert!(matches!(err, FrameError::UnknownCharacteristic(_)));

        let err = registry
            .ingest(&characteristic_uuid(0x0777), 0, b"\x00\x01\x00\x00x")
            .unwrap_err();
        assert!(matches!(err, FrameError::UnknownCharacteristic(_)));
    }

    #[test]
    fn reset_all_abandons_partial_messages() {
        let mut registry = ChannelRegistry::new();
        let chunks = fragment(b"0123456789", 6).unwrap();
        let uuid = characteristic_uuid(LOG_RESPONSE);

        registry.ingest(&uuid, 0, &chunks[0]).unwrap();
        assert_eq!(registry.in_progress(), 1);
        registry.reset_all();
        assert_eq!(registry.in_progress(), 0);

        let err = registry.ingest(&uuid, 0, &chunks[1]).unwrap_err();
        assert!(matches!(err, FrameError::NoActiveMessage));
    }

    #[test]
    fn duplicate_handles_ignored() {
        let registry = ChannelRegistry::from_channels(
            [
                Channel::new(SPEECH, Direction::Both),
                Channel::new(SPEECH, Direction::Write),
            ],
            ReassemblyConfig::default(),
        );
        assert_eq!(registry.channels().len(), 1);
        assert_eq!(registry.get(SPEECH).unwrap().direction, Direction::Both);
    }
}
