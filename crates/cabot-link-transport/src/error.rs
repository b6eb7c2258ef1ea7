use std::time::Duration;

/// Errors that can occur on a physical link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// The connection attempt did not complete in time.
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Nobody is subscribed to the characteristic.
    #[error("no subscribed centrals")]
    NoSubscribers,

    /// The peripheral kept rejecting the update.
    #[error("notify rejected after {attempts} attempts")]
    NotifyRejected { attempts: u32 },

    /// The platform refused to register the GATT service.
    #[error("failed to register service: {0}")]
    ServiceRegistration(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
