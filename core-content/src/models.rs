//! Domain models for verses, units and sequences.

use crate::error::{ContentError, Result};
use crate::quran::{self, SURAH_COUNT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Verse identity
// =============================================================================

/// A verse addressed as `surah:ayah`. Always within the verse-count table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerseKey {
    surah: u16,
    ayah: u16,
}

impl VerseKey {
    pub fn new(surah: u16, ayah: u16) -> Result<Self> {
        if !quran::is_valid_verse(surah, ayah) {
            return Err(ContentError::InvalidVerseIdentity { surah, ayah });
        }
        Ok(Self { surah, ayah })
    }

    /// Build from a global verse number (1..=6236).
    pub fn from_global(global: u32) -> Result<Self> {
        let (surah, ayah) =
            quran::split_global(global).ok_or(ContentError::InvalidGlobalNumber(global))?;
        Ok(Self { surah, ayah })
    }

    pub fn surah(&self) -> u16 {
        self.surah
    }

    pub fn ayah(&self) -> u16 {
        self.ayah
    }

    /// Continuous 1..=6236 index across the whole text.
    pub fn global_number(&self) -> u16 {
        quran::global_number_unchecked(self.surah, self.ayah)
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.surah, self.ayah)
    }
}

impl FromStr for VerseKey {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self> {
        let (surah, ayah) = s
            .split_once(':')
            .ok_or_else(|| ContentError::Parse(format!("expected surah:ayah, got '{}'", s)))?;
        let surah = surah
            .trim()
            .parse()
            .map_err(|_| ContentError::Parse(format!("invalid surah in '{}'", s)))?;
        let ayah = ayah
            .trim()
            .parse()
            .map_err(|_| ContentError::Parse(format!("invalid ayah in '{}'", s)))?;
        Self::new(surah, ayah)
    }
}

impl TryFrom<String> for VerseKey {
    type Error = ContentError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<VerseKey> for String {
    fn from(key: VerseKey) -> Self {
        key.to_string()
    }
}

// =============================================================================
// Verse content
// =============================================================================

/// One candidate audio resource for a verse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioCandidate {
    pub url: String,
    pub mime_type: String,
}

impl AudioCandidate {
    pub const MPEG: &'static str = "audio/mpeg";

    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn mp3(url: impl Into<String>) -> Self {
        Self::new(url, Self::MPEG)
    }
}

/// A fetched verse. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub key: VerseKey,
    pub arabic_text: String,
    /// Absent when the translation response had no entry for this verse.
    pub translation_text: Option<String>,
    /// Audio URLs supplied by the content API, in API order.
    pub audio: Vec<AudioCandidate>,
}

impl Verse {
    pub fn new(key: VerseKey, arabic_text: impl Into<String>) -> Self {
        Self {
            key,
            arabic_text: arabic_text.into(),
            translation_text: None,
            audio: Vec::new(),
        }
    }

    pub fn with_translation(mut self, text: impl Into<String>) -> Self {
        self.translation_text = Some(text.into());
        self
    }

    pub fn with_audio(mut self, candidate: AudioCandidate) -> Self {
        self.audio.push(candidate);
        self
    }

    pub fn global_number(&self) -> u16 {
        self.key.global_number()
    }
}

// =============================================================================
// Structural units
// =============================================================================

/// Reading divisions the text can be browsed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    Surah,
    Juz,
    Manzil,
    HizbQuarter,
    Ruku,
    Page,
}

impl UnitKind {
    pub const ALL: [UnitKind; 6] = [
        UnitKind::Surah,
        UnitKind::Juz,
        UnitKind::Manzil,
        UnitKind::HizbQuarter,
        UnitKind::Ruku,
        UnitKind::Page,
    ];

    /// How many units of this kind exist.
    pub fn count(&self) -> u16 {
        match self {
            UnitKind::Surah => SURAH_COUNT,
            UnitKind::Juz => 30,
            UnitKind::Manzil => 7,
            UnitKind::HizbQuarter => 240,
            UnitKind::Ruku => 556,
            UnitKind::Page => 604,
        }
    }

    /// Path segment used by the content API.
    pub fn api_path(&self) -> &'static str {
        match self {
            UnitKind::Surah => "surah",
            UnitKind::Juz => "juz",
            UnitKind::Manzil => "manzil",
            UnitKind::HizbQuarter => "hizbQuarter",
            UnitKind::Ruku => "ruku",
            UnitKind::Page => "page",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_path())
    }
}

impl FromStr for UnitKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self> {
        UnitKind::ALL
            .into_iter()
            .find(|kind| kind.api_path().eq_ignore_ascii_case(s))
            .ok_or_else(|| ContentError::Parse(format!("unknown unit kind '{}'", s)))
    }
}

/// One unit, e.g. juz 30 or page 604.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId {
    pub kind: UnitKind,
    pub number: u16,
}

impl UnitId {
    pub fn new(kind: UnitKind, number: u16) -> Result<Self> {
        if number == 0 || number > kind.count() {
            return Err(ContentError::InvalidUnit {
                kind: kind.to_string(),
                number,
            });
        }
        Ok(Self { kind, number })
    }

    pub fn surah(number: u16) -> Result<Self> {
        Self::new(UnitKind::Surah, number)
    }

    pub fn next(&self) -> Option<UnitId> {
        (self.number < self.kind.count()).then(|| UnitId {
            kind: self.kind,
            number: self.number + 1,
        })
    }

    pub fn previous(&self) -> Option<UnitId> {
        (self.number > 1).then(|| UnitId {
            kind: self.kind,
            number: self.number - 1,
        })
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.number)
    }
}

// =============================================================================
// Sequences
// =============================================================================

/// Ordered verses of one unit plus its neighbours.
///
/// Built once when a unit is loaded and never reordered afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseSequence {
    unit: UnitId,
    verses: Vec<Verse>,
    previous: Option<UnitId>,
    next: Option<UnitId>,
}

impl VerseSequence {
    pub fn new(unit: UnitId, verses: Vec<Verse>) -> Self {
        Self {
            unit,
            verses,
            previous: unit.previous(),
            next: unit.next(),
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn previous_unit(&self) -> Option<UnitId> {
        self.previous
    }

    pub fn next_unit(&self) -> Option<UnitId> {
        self.next
    }

    pub fn verses(&self) -> &[Verse] {
        &self.verses
    }

    pub fn get(&self, index: usize) -> Option<&Verse> {
        self.verses.get(index)
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    /// Index playback starts from, `None` for an empty unit.
    pub fn first_index(&self) -> Option<usize> {
        (!self.verses.is_empty()).then_some(0)
    }

    pub fn position_of(&self, key: &VerseKey) -> Option<usize> {
        self.verses.iter().position(|verse| verse.key == *key)
    }
}
