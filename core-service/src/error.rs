use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Content error: {0}")]
    Content(#[from] core_content::ContentError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl From<core_runtime::Error> for CoreError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::InitializationFailed(other.to_string()),
        }
    }
}

impl CoreError {
    /// Errors a host should show to the user.
    pub fn is_user_visible(&self) -> bool {
        match self {
            CoreError::Playback(err) => err.is_user_visible(),
            CoreError::Content(core_content::ContentError::InvalidVerseIdentity { .. }) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
