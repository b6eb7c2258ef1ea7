use std::time::Duration;

/// Errors that can occur inside a link adapter.
///
/// None of these cross the adapter boundary: they end up as a `false` return,
/// a dropped message or a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Physical link error.
    #[error("transport error: {0}")]
    Transport(#[from] cabot_link_transport::TransportError),

    /// Framing or reassembly error.
    #[error("frame error: {0}")]
    Frame(#[from] cabot_link_frame::FrameError),

    /// Payload decode or encode error.
    #[error("codec error: {0}")]
    Codec(#[from] cabot_link_proto::CodecError),

    /// The robot announced a version string that cannot be compared.
    #[error("invalid protocol version: {0}")]
    InvalidVersion(String),

    /// A write did not complete in time.
    #[error("emit timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, PeerError>;
