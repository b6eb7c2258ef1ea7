//! Physical link seams for cabot-link.
//!
//! This is the lowest layer. It does not know about messages or framing:
//! - [`GattPeripheral`] abstracts the platform's BLE peripheral role
//!   (characteristic registration, notify, advertising, ATT responses)
//! - [`GattEvent`] is what the platform reports back
//! - [`RetryPolicy`] drives the bounded "retry until accepted" notify
//! - [`tcp`] connects to the robot's socket endpoint
//!
//! Everything above builds on these types.

pub mod error;
pub mod gatt;
pub mod retry;
pub mod tcp;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{Result, TransportError};
pub use gatt::{
    Advertisement, AttRequest, AttResult, CentralId, CharacteristicProperties, GattCharacteristic,
    GattEvent, GattPeripheral, GattService, ManagerState,
};
pub use retry::{notify_with_retry, RetryPolicy};
pub use tcp::{connect, AddressCandidates};
