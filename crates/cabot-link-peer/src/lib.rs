//! BLE and TCP link adapters for cabot-link.
//!
//! Each adapter is an actor task owning its link: the BLE actor consumes
//! platform [`GattEvent`](cabot_link_transport::GattEvent)s, the TCP actor
//! owns a reconnecting socket. Both run a [`LivenessMonitor`] on a 1 Hz tick,
//! pass inbound messages through a shared
//! [`Arbiter`](cabot_link_proto::Arbiter) and report to their owner with
//! [`PeerEvent`]s.
//!
//! ```text
//!  platform ──GattEvent──► BleActor ──┐
//!                                     ├──► Arbiter ──► PeerEvent ──► owner
//!  robot socket ─Event──► TcpActor ───┘
//! ```

pub mod ble;
pub mod error;
pub mod event;
pub mod liveness;
pub mod tcp;
pub mod version;

pub use ble::{BleAdapter, BleConfig, BleHandle, HEARTBEAT_VALUE, LOCAL_NAME};
pub use error::{PeerError, Result};
pub use event::PeerEvent;
pub use liveness::{
    AdvertisingAction, LivenessConfig, LivenessMonitor, LivenessState, Tick,
    DEFAULT_MAX_RETRIES, DEFAULT_READVERTISE_TICKS,
};
pub use tcp::{TcpAdapter, TcpConfig, TcpHandle};
pub use version::{check_version, VersionCheck, PROTOCOL_VERSION};
