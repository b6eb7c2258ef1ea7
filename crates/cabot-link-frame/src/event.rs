use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Event header: magic (2) + length (4) = 6 bytes.
pub const EVENT_HEADER_SIZE: usize = 6;

/// Magic bytes: "CB" (0x43 0x42).
pub const EVENT_MAGIC: [u8; 2] = [0x43, 0x42];

/// Default maximum envelope size: 1 MiB.
pub const DEFAULT_MAX_EVENT: usize = 1024 * 1024;

/// A named event exchanged with the robot over TCP.
///
/// `data` is the message body as text; JSON messages are carried as their
/// serialized string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub data: String,
}

impl Event {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// `tokio_util` codec for [`Event`]s.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬────────────────────────────┐
/// │ Magic (2B)   │ Length    │ JSON {"event":..,"data":..} │
/// │ 0x43 0x42    │ (4B LE)   │ (Length bytes)             │
/// └──────────────┴───────────┴────────────────────────────┘
/// ```
#[derive(Debug, Clone)]
pub struct EventCodec {
    max_len: usize,
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCodec {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_EVENT)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Decoder for EventCodec {
    type Item = Event;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>> {
        if src.len() < EVENT_HEADER_SIZE {
            return Ok(None);
        }
        if src[0..2] != EVENT_MAGIC {
            return Err(FrameError::InvalidMagic);
        }

        let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if len > self.max_len {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_len,
            });
        }

        let total = EVENT_HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(EVENT_HEADER_SIZE);
        let body = src.split_to(len);
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

impl Encoder<Event> for EventCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Event, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)?;
        if body.len() > self.max_len {
            return Err(FrameError::PayloadTooLarge {
                size: body.len(),
                max: self.max_len,
            });
        }
        dst.reserve(EVENT_HEADER_SIZE + body.len());
        dst.put_slice(&EVENT_MAGIC);
        dst.put_u32_le(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
