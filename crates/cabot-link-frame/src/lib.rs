//! Fragment framing and per-channel reassembly for cabot-link.
//!
//! A BLE write carries at most one MTU worth of bytes, so larger messages are
//! split into fragments. The first link-level write of every fragment starts
//! with a 4-byte header:
//! - total payload length (2 bytes, big-endian)
//! - offset of this fragment in the payload (2 bytes, big-endian)
//!
//! Long-write continuations of the same fragment carry payload only.
//! Complete payloads are transparently gunzipped when they carry gzip magic.
//!
//! The `async` feature adds [`event::EventCodec`], the framing used on the
//! TCP link where messages always arrive whole.

pub mod channel;
pub mod compress;
pub mod error;
#[cfg(feature = "async")]
pub mod event;
pub mod fragment;
pub mod reassembly;

pub use channel::{
    channel_name, characteristic_uuid, service_uuid, Channel, ChannelRegistry, Direction,
    BATTERY_STATUS, DESTINATION, DEVICE_STATUS, HEARTBEAT, LOG, LOG_REQUEST, LOG_RESPONSE, MANAGE,
    NAVIGATION, SPEECH, SUMMON, SYSTEM_STATUS, TOUCH, VERSION,
};
pub use compress::{gunzip, gzip, is_gzip};
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use event::{Event, EventCodec};
pub use fragment::{fragment, FragmentHeader, HEADER_SIZE, MIN_CHUNK_SIZE};
pub use reassembly::{ReassemblyConfig, Reassembler};
