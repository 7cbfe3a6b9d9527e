//! Recitation service facade.
//!
//! Wires host-provided bridges (HTTP, audio output) into the content and
//! playback cores and exposes the actions a reader UI needs: play, pause,
//! stop, skip, toggle autoplay, the current verse and a dismissible error.
//! Desktop hosts enable `desktop-shims` to get a reqwest-backed HTTP client
//! by default.

pub mod error;
pub mod navigator;
pub mod service;

pub use error::{CoreError, Result};
pub use navigator::ContentNavigator;
pub use service::{RecitationService, ServiceBuilder};

pub use core_content::{UnitId, UnitKind, Verse, VerseKey, VerseSequence};
pub use core_playback::{FallbackOutcome, PlaybackSnapshot, SequencerOutcome};
pub use core_runtime::config::{CoreConfig, FeatureFlags};
pub use core_runtime::events::{CoreEvent, EventStream, PlaybackEvent, SequenceEvent};
