use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Invalid verse identity: {surah}:{ayah}")]
    InvalidVerseIdentity { surah: u16, ayah: u16 },

    #[error("Global verse number out of range: {0}")]
    InvalidGlobalNumber(u32),

    #[error("Invalid unit: {kind} {number}")]
    InvalidUnit { kind: String, number: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Content API error: HTTP {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl ContentError {
    /// Worth retrying later: transport failures and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ContentError::Bridge(_) => true,
            ContentError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ContentError>;
