//! Companion-app transport layer for CaBot.
//!
//! The app talks to the robot over two redundant links at once: a BLE GATT
//! link where the app is the peripheral, and a TCP event socket. This crate
//! wires both into one [`TransportManager`] that de-duplicates what the robot
//! sends and hands it to a [`Delegate`].
//!
//! # Crate Structure
//!
//! - [`transport`]: physical link seams (GATT peripheral trait, TCP connect, retry)
//! - [`frame`]: channel table, BLE fragment reassembly, TCP event framing
//! - [`proto`]: typed messages, codec, mode gate and request-id arbiter
//! - [`peer`]: BLE and TCP adapters with liveness monitoring
//! - [`logging`]: stderr subscriber setup (behind `logging` feature)

pub mod delegate;
#[cfg(feature = "logging")]
pub mod logging;
pub mod manager;

/// Re-export transport types.
pub mod transport {
    pub use cabot_link_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cabot_link_frame::*;
}

/// Re-export message types.
pub mod proto {
    pub use cabot_link_proto::*;
}

/// Re-export adapter types.
pub mod peer {
    pub use cabot_link_peer::*;
}

pub use delegate::Delegate;
pub use manager::{ManagerConfig, TransportManager};
