//! Audio output bridge.
//!
//! The core never touches a platform audio element directly. Hosts implement
//! [`AudioOutput`] on top of whatever they have: an `HTMLAudioElement` in a
//! browser, AVPlayer on iOS, a rodio sink on desktop. The contract mirrors a
//! media element: open a URL (metadata only or full preload), play, pause,
//! stop, release, plus a per-handle event channel that reports natural end of
//! media and mid-stream errors.

use crate::error::Result;
use core_async::sync::mpsc;
use std::fmt;
use uuid::Uuid;

/// Remote audio resource handed to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    /// Absolute URL of the audio file.
    pub url: String,
    /// MIME type hint, e.g. `audio/mpeg`.
    pub mime_type: Option<String>,
}

impl AudioSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// How much of the resource the output should fetch when opening it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preload {
    /// Only enough to read duration and format. Used for probing.
    Metadata,
    /// Buffer for immediate playback.
    Auto,
}

/// Answer to "can this output decode this MIME type", mirroring
/// `HTMLMediaElement.canPlayType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSupport {
    Probably,
    Maybe,
    No,
}

/// Opaque identifier for one opened media resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(Uuid);

impl MediaHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MediaHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asynchronous notifications raised by an opened media resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// Playback reached the end of the media naturally.
    Ended,
    /// Decoding or network failure after the media was opened.
    Error { message: String },
}

pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;
pub type MediaEventReceiver = mpsc::UnboundedReceiver<MediaEvent>;

/// A successfully opened resource and its event stream.
#[derive(Debug)]
pub struct OpenedMedia {
    pub handle: MediaHandle,
    pub events: MediaEventReceiver,
}

impl OpenedMedia {
    /// Create a handle together with the sender the host uses to report events.
    pub fn channel() -> (Self, MediaEventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                handle: MediaHandle::new(),
                events: rx,
            },
            tx,
        )
    }
}

/// Platform audio output.
///
/// Every handle returned from [`AudioOutput::open`] must eventually be passed
/// to [`AudioOutput::release`]; the playback core guarantees this, including
/// on timeouts and cancellation.
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Whether the output can decode `mime_type`.
    fn can_play_type(&self, mime_type: &str) -> MediaSupport {
        let _ = mime_type;
        MediaSupport::Maybe
    }

    /// Open `source`. Resolves once the requested preload level is reached, or
    /// fails when the resource cannot be loaded.
    async fn open(&self, source: AudioSource, preload: Preload) -> Result<OpenedMedia>;

    /// Start or resume playback.
    async fn play(&self, handle: MediaHandle) -> Result<()>;

    /// Pause without releasing.
    async fn pause(&self, handle: MediaHandle) -> Result<()>;

    /// Stop playback and rewind.
    async fn stop(&self, handle: MediaHandle) -> Result<()>;

    /// Detach the resource and free decoder and network resources.
    async fn release(&self, handle: MediaHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_handles_are_unique() {
        let a = MediaHandle::new();
        let b = MediaHandle::new();
        assert_ne!(a, b);
        assert_eq!(a, MediaHandle::from_uuid(*a.as_uuid()));
    }

    #[test]
    fn audio_source_builder() {
        let source = AudioSource::new("https://everyayah.com/data/Alafasy_128kbps/001001.mp3")
            .with_mime_type("audio/mpeg");
        assert_eq!(source.mime_type.as_deref(), Some("audio/mpeg"));
    }

    #[tokio::test]
    async fn opened_media_channel_delivers_events() {
        let (mut opened, tx) = OpenedMedia::channel();
        tx.send(MediaEvent::Ended).unwrap();
        assert_eq!(opened.events.recv().await, Some(MediaEvent::Ended));
    }
}
