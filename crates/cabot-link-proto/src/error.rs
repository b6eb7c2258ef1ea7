use cabot_link_frame::FrameError;

/// Errors that can occur while decoding or encoding messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not valid JSON for the channel's message type.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A text payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// No inbound message is bound to this channel.
    #[error("no inbound message on channel 0x{0:04x}")]
    UnboundChannel(u16),

    /// No inbound message is bound to this TCP event.
    #[error("no inbound message for event {0:?}")]
    UnboundEvent(String),

    /// The message has no representation on the requested link.
    #[error("{0} cannot be sent over BLE")]
    NoChannel(&'static str),

    /// Splitting the payload into fragments failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, CodecError>;
