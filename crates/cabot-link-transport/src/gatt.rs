use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;

/// Power/authorization state reported by the platform's peripheral manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// Opaque identifier of a connected central.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CentralId(pub String);

impl fmt::Display for CentralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// GATT characteristic properties used by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// Properties of a characteristic the peripheral pushes values on.
    pub const fn indicate() -> Self {
        Self {
            read: false,
            write: false,
            notify: false,
            indicate: true,
        }
    }

    /// Properties of a characteristic the central writes into.
    pub const fn write() -> Self {
        Self {
            read: false,
            write: true,
            notify: false,
            indicate: false,
        }
    }
}

/// A characteristic to register with the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// A primary service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Advertisement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: String,
    pub service_uuids: Vec<Uuid>,
}

/// An ATT read or write request delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttRequest {
    /// Platform token used to respond to this request.
    pub id: u64,
    pub central: CentralId,
    pub characteristic: Uuid,
    /// Link-level characteristic offset (non-zero for long-write continuations).
    pub offset: usize,
    pub value: Bytes,
}

/// ATT response codes the link uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttResult {
    Success,
    ReadNotPermitted,
    AttributeNotFound,
    InvalidOffset,
}

/// Callbacks from the platform's peripheral manager, delivered as values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    StateUpdated(ManagerState),
    ServiceAdded(std::result::Result<(), String>),
    AdvertisingStarted(std::result::Result<(), String>),
    Subscribed {
        central: CentralId,
        characteristic: Uuid,
    },
    Unsubscribed {
        central: CentralId,
        characteristic: Uuid,
    },
    ReadRequest(AttRequest),
    /// A batch of writes that must be answered with a single response.
    WriteRequests(Vec<AttRequest>),
    /// Relaunch with a saved restoration identifier.
    WillRestoreState { services: Vec<Uuid> },
}

/// The platform's BLE peripheral role.
///
/// Implementations wrap the OS API (CoreBluetooth, BlueZ, ...). Methods are
/// synchronous because the platform calls are; they must be callable from any
/// thread. Platform callbacks are not part of this trait: the implementation
/// forwards them as [`GattEvent`] values into the adapter.
pub trait GattPeripheral: Send + Sync {
    /// Register a service. Completion arrives as [`GattEvent::ServiceAdded`].
    fn add_service(&self, service: &GattService) -> Result<()>;

    /// Remove every service this process registered.
    fn remove_all_services(&self);

    /// Push a value to subscribed centrals.
    ///
    /// Returns `false` when the platform's transmit queue is full.
    fn update_value(&self, characteristic: &Uuid, value: &[u8]) -> bool;

    /// Number of centrals subscribed to a characteristic.
    fn subscribed_centrals(&self, characteristic: &Uuid) -> usize;

    fn start_advertising(&self, advertisement: &Advertisement);

    fn stop_advertising(&self);

    fn is_advertising(&self) -> bool;

    /// Answer a read request, or the first request of a write batch.
    fn respond(&self, request: &AttRequest, result: AttResult);

    /// Largest value a single update may carry, if the platform knows it.
    fn maximum_update_value_length(&self) -> Option<usize> {
        None
    }
}
