//! # Core Content
//!
//! Quran data model and the content API client.
//!
//! - [`models`]: verse identity, verses, audio candidates, units, sequences
//! - [`quran`]: the verified per-surah verse-count table
//! - [`api`]: the [`ContentApi`] trait and the alquran.cloud client
//! - [`merge`]: building a [`VerseSequence`] from API responses

pub mod api;
pub mod error;
pub mod merge;
pub mod models;
pub mod quran;

pub use api::{AlQuranCloudClient, ApiVerse, ContentApi};
pub use error::{ContentError, Result};
pub use merge::build_sequence;
pub use models::{AudioCandidate, UnitId, UnitKind, Verse, VerseKey, VerseSequence};
