/// Errors that can occur while framing or reassembling messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The first write of a fragment is too short to hold the header.
    #[error("fragment header truncated ({len} bytes, need 4)")]
    MalformedHeader { len: usize },

    /// The header announces a zero-length message.
    #[error("fragment header announces an empty message")]
    EmptyMessage,

    /// A fragment does not fit into the announced message.
    #[error("fragment out of bounds (offset {offset}, {len} bytes, total {total})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        total: usize,
    },

    /// A continuation arrived while no message was being assembled.
    #[error("fragment without an active message")]
    NoActiveMessage,

    /// A fragment announces a different total length than the message in progress.
    #[error("fragment length mismatch (message is {expected} bytes, fragment says {got})")]
    LengthMismatch { expected: usize, got: usize },

    /// The gzip stream could not be decoded.
    #[error("gzip decode failed: {0}")]
    Decompress(std::io::Error),

    /// The payload exceeds what the wire format or configuration allows.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The chunk size cannot carry a header and at least one byte.
    #[error("chunk size {size} too small (min {min})")]
    ChunkTooSmall { size: usize, min: usize },

    /// The write targeted a characteristic no channel owns.
    #[error("no channel for characteristic {0}")]
    UnknownCharacteristic(uuid::Uuid),

    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4342 \"CB\")")]
    InvalidMagic,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The event envelope is not valid JSON.
    #[cfg(feature = "async")]
    #[error("event envelope: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
