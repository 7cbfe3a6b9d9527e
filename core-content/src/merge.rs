//! Builds a [`VerseSequence`] from raw API responses.
//!
//! Translations are matched to Arabic verses by `surah:ayah`, never by array
//! position: translation responses are sometimes shorter than, or offset
//! from, the Arabic response for the same unit. A verse without a matching
//! translation keeps `translation_text = None` and stays in the sequence.

use crate::api::ApiVerse;
use crate::error::Result;
use crate::models::{AudioCandidate, UnitId, Verse, VerseKey, VerseSequence};
use std::collections::HashMap;
use tracing::{debug, warn};

pub fn build_sequence(
    unit: UnitId,
    arabic: Vec<ApiVerse>,
    translation: Option<Vec<ApiVerse>>,
) -> Result<VerseSequence> {
    let translation_len = translation.as_ref().map_or(0, Vec::len);
    let mut translations: HashMap<(u16, u16), String> = translation
        .unwrap_or_default()
        .into_iter()
        .map(|t| ((t.surah, t.number_in_surah), t.text))
        .collect();

    let arabic_len = arabic.len();
    let mut verses = Vec::with_capacity(arabic_len);

    for api_verse in arabic {
        let key = VerseKey::new(api_verse.surah, api_verse.number_in_surah)?;

        if api_verse.number != key.global_number() as u32 {
            warn!(
                verse = %key,
                api_number = api_verse.number,
                table_number = key.global_number(),
                "Content API global number disagrees with verse table"
            );
        }

        let mut verse = Verse::new(key, api_verse.text);
        verse.translation_text = translations.remove(&(key.surah(), key.ayah()));
        verse.audio = api_verse
            .audio
            .into_iter()
            .chain(api_verse.audio_secondary)
            .filter(|url| !url.is_empty())
            .map(AudioCandidate::mp3)
            .collect();

        verses.push(verse);
    }

    if translation_len > 0 && translation_len != arabic_len {
        warn!(
            unit = %unit,
            arabic = arabic_len,
            translation = translation_len,
            "Translation length differs from Arabic; merged by verse key"
        );
    }

    if !translations.is_empty() {
        debug!(unit = %unit, unmatched = translations.len(), "Dropped unmatched translations");
    }

    Ok(VerseSequence::new(unit, verses))
}
