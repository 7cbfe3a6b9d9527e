//! Candidate URL resolution.
//!
//! Turns a verse into an ordered, de-duplicated list of audio candidates.
//! Pure: no I/O, no state.
//!
//! Order:
//! 1. primary CDN at the primary bitrate (`{host}/quran/audio/{bitrate}/{reciter}/{global}.mp3`)
//! 2. secondary CDN (`{host}/data/{alias}_{bitrate}kbps/{sss}{aaa}.mp3`)
//! 3. primary CDN at the fallback bitrate
//! 4. primary CDN in the alternate format
//! 5. URLs embedded in the content API response

use crate::config::AudioSourceConfig;
use crate::error::{PlaybackError, Result};
use core_content::{AudioCandidate, Verse, VerseKey};
use std::collections::HashSet;

/// Produces playback candidates for a verse.
pub trait CandidateResolver: Send + Sync {
    /// Candidates for `verse` read by `reciter`, best first. May be empty.
    fn resolve(&self, verse: &Verse, reciter: &str) -> Result<Vec<AudioCandidate>>;
}

/// Resolver for the public Quran audio CDNs.
#[derive(Debug, Clone, Default)]
pub struct CdnSourceResolver {
    config: AudioSourceConfig,
}

impl CdnSourceResolver {
    pub fn new(config: AudioSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AudioSourceConfig {
        &self.config
    }

    /// Candidates for a raw `surah:ayah` pair.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidVerseIdentity`] when the pair is outside the verse table.
    pub fn resolve_identity(&self, surah: u16, ayah: u16, reciter: &str) -> Result<Vec<AudioCandidate>> {
        let key = VerseKey::new(surah, ayah)?;
        Ok(dedupe(self.cdn_candidates(key, reciter)))
    }

    /// Candidates for a global verse number (1..=6236).
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidGlobalNumber`] outside that range.
    pub fn resolve_global(&self, global: u32, reciter: &str) -> Result<Vec<AudioCandidate>> {
        let key = VerseKey::from_global(global)?;
        Ok(dedupe(self.cdn_candidates(key, reciter)))
    }

    /// Whole-surah recording (`{host}/quran/audio-surah/{bitrate}/{reciter}/{surah}.mp3`).
    pub fn surah_recording_url(&self, surah: u16, reciter: &str) -> Result<String> {
        if core_content::quran::verse_count(surah).is_none() {
            return Err(PlaybackError::InvalidVerseIdentity { surah, ayah: 0 });
        }
        Ok(format!(
            "{}/quran/audio-surah/{}/{}/{}.mp3",
            self.config.primary_host, self.config.primary_bitrate, reciter, surah
        ))
    }

    fn primary_url(&self, key: VerseKey, reciter: &str, bitrate: u32, extension: &str) -> String {
        format!(
            "{}/quran/audio/{}/{}/{}.{}",
            self.config.primary_host,
            bitrate,
            reciter,
            key.global_number(),
            extension
        )
    }

    fn secondary_url(&self, key: VerseKey, reciter: &str) -> String {
        format!(
            "{}/data/{}_{}kbps/{:03}{:03}.mp3",
            self.config.secondary_host,
            self.config.secondary_alias(reciter),
            self.config.secondary_bitrate,
            key.surah(),
            key.ayah()
        )
    }

    fn cdn_candidates(&self, key: VerseKey, reciter: &str) -> Vec<AudioCandidate> {
        let mut candidates = vec![
            AudioCandidate::mp3(self.primary_url(key, reciter, self.config.primary_bitrate, "mp3")),
            AudioCandidate::mp3(self.secondary_url(key, reciter)),
            AudioCandidate::mp3(self.primary_url(key, reciter, self.config.fallback_bitrate, "mp3")),
        ];

        if let Some(format) = &self.config.alternate_format {
            candidates.push(AudioCandidate::new(
                self.primary_url(key, reciter, self.config.primary_bitrate, &format.extension),
                format.mime_type.clone(),
            ));
        }

        candidates
    }
}

impl CandidateResolver for CdnSourceResolver {
    fn resolve(&self, verse: &Verse, reciter: &str) -> Result<Vec<AudioCandidate>> {
        let mut candidates = self.cdn_candidates(verse.key, reciter);
        if self.config.include_api_audio {
            candidates.extend(verse.audio.iter().cloned());
        }
        Ok(dedupe(candidates))
    }
}

/// Drop repeated URLs, keeping the first occurrence.
fn dedupe(candidates: Vec<AudioCandidate>) -> Vec<AudioCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verse(surah: u16, ayah: u16) -> Verse {
        Verse::new(VerseKey::new(surah, ayah).unwrap(), "")
    }

    fn urls(candidates: &[AudioCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.url.as_str()).collect()
    }

    #[test]
    fn test_candidate_order() {
        let resolver = CdnSourceResolver::default();
        let candidates = resolver.resolve(&verse(2, 255), "ar.alafasy").unwrap();

        assert_eq!(
            urls(&candidates),
            vec![
                "https://cdn.islamic.network/quran/audio/128/ar.alafasy/262.mp3",
                "https://everyayah.com/data/Alafasy_128kbps/002255.mp3",
                "https://cdn.islamic.network/quran/audio/64/ar.alafasy/262.mp3",
                "https://cdn.islamic.network/quran/audio/128/ar.alafasy/262.ogg",
            ]
        );
        assert_eq!(candidates[3].mime_type, "audio/ogg");
        assert_eq!(candidates[0].mime_type, AudioCandidate::MPEG);
    }

    #[test]
    fn test_api_audio_is_appended_and_deduplicated() {
        let resolver = CdnSourceResolver::default();
        let verse = verse(1, 1)
            .with_audio(AudioCandidate::mp3(
                "https://cdn.islamic.network/quran/audio/128/ar.alafasy/1.mp3",
            ))
            .with_audio(AudioCandidate::mp3("https://mirror.example.org/alafasy/1.mp3"));

        let candidates = resolver.resolve(&verse, "ar.alafasy").unwrap();

        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[4].url, "https://mirror.example.org/alafasy/1.mp3");
    }

    #[test]
    fn test_equal_bitrates_collapse() {
        let resolver = CdnSourceResolver::new(AudioSourceConfig {
            fallback_bitrate: 128,
            alternate_format: None,
            ..AudioSourceConfig::default()
        });

        let candidates = resolver.resolve(&verse(1, 1), "ar.alafasy").unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_unknown_reciter_uses_edition_on_secondary() {
        let resolver = CdnSourceResolver::default();
        let candidates = resolver.resolve(&verse(114, 6), "ar.custom").unwrap();
        assert_eq!(
            candidates[1].url,
            "https://everyayah.com/data/ar.custom_128kbps/114006.mp3"
        );
        assert!(candidates[0].url.ends_with("/6236.mp3"));
    }

    #[test]
    fn test_invalid_identity() {
        let resolver = CdnSourceResolver::default();
        assert!(matches!(
            resolver.resolve_identity(1, 8, "ar.alafasy"),
            Err(PlaybackError::InvalidVerseIdentity { surah: 1, ayah: 8 })
        ));
        assert!(matches!(
            resolver.resolve_global(0, "ar.alafasy"),
            Err(PlaybackError::InvalidGlobalNumber { global: 0 })
        ));
        let err = resolver.resolve_global(6237, "ar.alafasy").unwrap_err();
        assert!(err.is_user_visible());
        assert_eq!(err.to_string(), "Invalid global verse number: 6237");
        assert_eq!(
            resolver.resolve_global(8, "ar.alafasy").unwrap(),
            resolver.resolve_identity(2, 1, "ar.alafasy").unwrap()
        );
    }

    #[test]
    fn test_surah_recording_url() {
        let resolver = CdnSourceResolver::default();
        assert_eq!(
            resolver.surah_recording_url(36, "ar.alafasy").unwrap(),
            "https://cdn.islamic.network/quran/audio-surah/128/ar.alafasy/36.mp3"
        );
        assert!(resolver.surah_recording_url(115, "ar.alafasy").is_err());
    }
}
