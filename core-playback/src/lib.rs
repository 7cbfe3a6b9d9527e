//! # Recitation Playback Core
//!
//! Resolves, validates and plays verse recitations with source fallback and
//! autoplay.
//!
//! ## Overview
//!
//! - [`resolver`]: ordered candidate URLs for a verse (pure)
//! - [`validator`]: bounded checks deciding whether a candidate is playable
//! - [`engine`]: the single audio handle, its state machine and request generations
//! - [`fallback`]: walks candidates until one plays
//! - [`sequencer`]: position, autoplay and cross-unit progression
//!
//! Components only reach the audio output through [`PlaybackEngine`]. Events
//! are published on the shared [`core_runtime::events::EventBus`].

pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod resolver;
pub mod sequencer;
pub mod validator;

pub use config::{AlternateFormat, AudioSourceConfig, PlaybackConfig};
pub use engine::{EngineState, PlayToken, PlaybackEngine, PlaybackSession, PlaybackSnapshot};
pub use error::{PlaybackError, Result};
pub use fallback::{AudioCandidateAttempt, FallbackCoordinator, FallbackOutcome};
pub use resolver::{CandidateResolver, CdnSourceResolver};
pub use sequencer::{Sequencer, SequencerOptions, SequencerOutcome, UnitNavigator};
pub use validator::{AttemptOutcome, MediaValidator, SourceValidator};
