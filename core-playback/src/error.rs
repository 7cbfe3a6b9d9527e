//! # Playback Error Types
//!
//! Error taxonomy for resolving, validating and playing recitation audio.
//!
//! Only two kinds ever reach the user: an invalid verse identity
//! ([`PlaybackError::InvalidVerseIdentity`], [`PlaybackError::InvalidGlobalNumber`])
//! and [`PlaybackError::AllSourcesExhausted`] for a verse the user asked for.
//! [`PlaybackError::SourceUnavailable`] drives fallback and
//! [`PlaybackError::StaleOperation`] is discarded wherever it surfaces.

use core_content::ContentError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Surah or ayah outside the verse table. Never retried.
    #[error("Invalid verse identity: {surah}:{ayah}")]
    InvalidVerseIdentity { surah: u16, ayah: u16 },

    /// Global verse number outside 1..=6236.
    #[error("Invalid global verse number: {global}")]
    InvalidGlobalNumber { global: u32 },

    // ========================================================================
    // Source Errors
    // ========================================================================
    /// One candidate failed validation or playback.
    #[error("Audio source unavailable: {url} ({reason})")]
    SourceUnavailable { url: String, reason: String },

    /// Every candidate for a verse failed.
    #[error("Audio unavailable for verse {verse} after {attempts} attempts")]
    AllSourcesExhausted { verse: String, attempts: usize },

    // ========================================================================
    // Concurrency Errors
    // ========================================================================
    /// A newer request superseded the one this result belongs to.
    #[error("Stale operation for request {request}")]
    StaleOperation { request: u64 },

    // ========================================================================
    // Sequencer Errors
    // ========================================================================
    #[error("No verse sequence loaded")]
    NoSequenceLoaded,

    #[error("Verse index {index} out of range (sequence has {len} verses)")]
    IndexOutOfRange { index: usize, len: usize },

    // ========================================================================
    // Platform / Collaborator Errors
    // ========================================================================
    /// Host audio output reported a failure outside a load attempt.
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Content error: {0}")]
    Content(ContentError),
}

impl From<ContentError> for PlaybackError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::InvalidVerseIdentity { surah, ayah } => {
                PlaybackError::InvalidVerseIdentity { surah, ayah }
            }
            ContentError::InvalidGlobalNumber(global) => PlaybackError::InvalidGlobalNumber { global },
            other => PlaybackError::Content(other),
        }
    }
}

impl PlaybackError {
    /// Superseded by a newer request. Discard silently.
    pub fn is_stale(&self) -> bool {
        matches!(self, PlaybackError::StaleOperation { .. })
    }

    /// Should be shown to the user when it results from a user action.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidVerseIdentity { .. }
                | PlaybackError::InvalidGlobalNumber { .. }
                | PlaybackError::AllSourcesExhausted { .. }
        )
    }

    /// Returns `true` if another source or a later retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::SourceUnavailable { .. } | PlaybackError::AudioOutput(_) => true,
            PlaybackError::Content(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
