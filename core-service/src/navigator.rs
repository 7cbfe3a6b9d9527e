//! Unit loading through the content API.

use async_trait::async_trait;
use core_content::{build_sequence, ContentApi, UnitId, VerseSequence};
use core_playback::UnitNavigator;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Builds verse sequences from the content API.
///
/// A failed translation request is logged and the unit loads without
/// translations; audio never depends on it.
pub struct ContentNavigator {
    api: Arc<dyn ContentApi>,
    arabic_edition: String,
    translation_edition: Option<String>,
}

impl ContentNavigator {
    pub fn new(
        api: Arc<dyn ContentApi>,
        arabic_edition: impl Into<String>,
        translation_edition: Option<String>,
    ) -> Self {
        Self {
            api,
            arabic_edition: arabic_edition.into(),
            translation_edition,
        }
    }

    #[instrument(skip(self, unit), fields(unit = %unit))]
    pub async fn fetch(&self, unit: UnitId) -> core_content::Result<VerseSequence> {
        let translation_request = async {
            match &self.translation_edition {
                Some(edition) => Some((edition, self.api.get_translation(unit, edition).await)),
                None => None,
            }
        };
        let (arabic, translation) = futures::join!(
            self.api.get_verses(unit, &self.arabic_edition),
            translation_request
        );
        let arabic = arabic?;

        let translation = match translation {
            Some((_, Ok(verses))) => Some(verses),
            Some((edition, Err(err))) => {
                warn!(edition = %edition, error = %err, "Translation unavailable, loading without it");
                None
            }
            None => None,
        };

        let sequence = build_sequence(unit, arabic, translation)?;
        debug!(verses = sequence.len(), "Unit loaded");
        Ok(sequence)
    }
}

#[async_trait]
impl UnitNavigator for ContentNavigator {
    async fn load_unit(&self, unit: UnitId) -> core_playback::Result<VerseSequence> {
        Ok(self.fetch(unit).await?)
    }
}
