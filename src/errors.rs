use thiserror::Error;

/// Every failure the codec and negotiation layers can surface.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The frame needs more bits than the carrier holds.
    #[error("Capacity error: need {needed_bits} bits, carrier holds {capacity_bits}")]
    Capacity { needed_bits: u64, capacity_bits: u64 },

    /// The stego magic did not match.
    #[error("Invalid stego header: {0}")]
    InvalidHeader(String),

    /// The bundle lacks a recognized offer/answer key or is not valid JSON.
    #[error("Malformed bundle: {0}")]
    MalformedBundle(String),

    /// An operation was invoked outside its valid session state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transport rejected a description or failed to set up.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The concatenated QR channels did not base64-decode or inflate.
    #[error("Inflate error: {0}")]
    Inflate(String),

    #[error("QR error: {0}")]
    Qr(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    pub fn capacity(needed_bits: u64, capacity_bits: u64) -> Self {
        LinkError::Capacity {
            needed_bits,
            capacity_bits,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        LinkError::Protocol(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        LinkError::Transport(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        LinkError::MalformedBundle(message.into())
    }
}

impl From<image::ImageError> for LinkError {
    fn from(err: image::ImageError) -> Self {
        LinkError::Image(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
