//! # Playback Configuration
//!
//! CDN layout used to build candidate URLs and the time budgets that bound
//! every check and load.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Audio CDN configuration.
///
/// The primary CDN addresses verses by global number, the secondary CDN by
/// zero-padded `surah` + `ayah` under a per-reciter directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSourceConfig {
    /// Host of the global-number CDN (Pattern A / C).
    #[serde(default = "default_primary_host")]
    pub primary_host: String,

    /// Host of the surah/ayah CDN (Pattern B).
    #[serde(default = "default_secondary_host")]
    pub secondary_host: String,

    /// Bitrate tried first on the primary CDN.
    #[serde(default = "default_primary_bitrate")]
    pub primary_bitrate: u32,

    /// Lower bitrate tried on the primary CDN after the secondary CDN.
    #[serde(default = "default_fallback_bitrate")]
    pub fallback_bitrate: u32,

    /// Bitrate segment of secondary CDN directories, e.g. `128` in `Alafasy_128kbps`.
    #[serde(default = "default_secondary_bitrate")]
    pub secondary_bitrate: u32,

    /// Non-MP3 variant on the primary CDN, tried last. `None` disables it.
    #[serde(default = "default_alternate_format")]
    pub alternate_format: Option<AlternateFormat>,

    /// Reciter edition to secondary CDN directory name.
    /// Unknown reciters use the edition id unchanged.
    #[serde(default = "default_secondary_aliases")]
    pub secondary_aliases: HashMap<String, String>,

    /// Append audio URLs embedded in content API responses after the built ones.
    #[serde(default = "default_include_api_audio")]
    pub include_api_audio: bool,
}

/// An alternate container/codec served next to the MP3 files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateFormat {
    pub extension: String,
    pub mime_type: String,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            primary_host: default_primary_host(),
            secondary_host: default_secondary_host(),
            primary_bitrate: default_primary_bitrate(),
            fallback_bitrate: default_fallback_bitrate(),
            secondary_bitrate: default_secondary_bitrate(),
            alternate_format: default_alternate_format(),
            secondary_aliases: default_secondary_aliases(),
            include_api_audio: default_include_api_audio(),
        }
    }
}

impl AudioSourceConfig {
    /// Directory name of `reciter` on the secondary CDN.
    pub fn secondary_alias<'a>(&'a self, reciter: &'a str) -> &'a str {
        self.secondary_aliases
            .get(reciter)
            .map(String::as_str)
            .unwrap_or(reciter)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, host) in [
            ("primary_host", &self.primary_host),
            ("secondary_host", &self.secondary_host),
        ] {
            if !(host.starts_with("https://") || host.starts_with("http://")) {
                return Err(format!("{} must be an http(s) URL", name));
            }
            if host.ends_with('/') {
                return Err(format!("{} must not end with '/'", name));
            }
        }

        if self.primary_bitrate == 0 || self.fallback_bitrate == 0 || self.secondary_bitrate == 0 {
            return Err("bitrates must be > 0".to_string());
        }

        if self.fallback_bitrate > self.primary_bitrate {
            return Err("fallback_bitrate cannot exceed primary_bitrate".to_string());
        }

        if let Some(format) = &self.alternate_format {
            if format.extension.is_empty() || format.extension.starts_with('.') {
                return Err("alternate_format.extension must be non-empty, without a dot".to_string());
            }
            if !format.mime_type.starts_with("audio/") {
                return Err("alternate_format.mime_type must be an audio/* type".to_string());
            }
        }

        Ok(())
    }
}

/// Time budgets for validation, loading and fallback pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Budget for the HEAD existence check.
    #[serde(default = "default_existence_check_timeout")]
    pub existence_check_timeout: Duration,

    /// Budget for loading metadata through a temporary handle.
    #[serde(default = "default_metadata_check_timeout")]
    pub metadata_check_timeout: Duration,

    /// Budget for opening and starting the real playback handle.
    #[serde(default = "default_load_timeout")]
    pub load_timeout: Duration,

    /// Pause before the second candidate; doubles for each further one.
    #[serde(default = "default_candidate_backoff")]
    pub candidate_backoff: Duration,

    #[serde(default = "default_max_backoff")]
    pub max_backoff: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            existence_check_timeout: default_existence_check_timeout(),
            metadata_check_timeout: default_metadata_check_timeout(),
            load_timeout: default_load_timeout(),
            candidate_backoff: default_candidate_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl PlaybackConfig {
    /// Short budgets and no backoff. Used by tests and by hosts on local networks.
    pub fn fast() -> Self {
        Self {
            existence_check_timeout: Duration::from_millis(500),
            metadata_check_timeout: Duration::from_millis(500),
            load_timeout: Duration::from_secs(1),
            candidate_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.existence_check_timeout.is_zero()
            || self.metadata_check_timeout.is_zero()
            || self.load_timeout.is_zero()
        {
            return Err("check and load timeouts must be > 0".to_string());
        }

        if self.candidate_backoff > self.max_backoff {
            return Err("candidate_backoff cannot exceed max_backoff".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_primary_host() -> String {
    "https://cdn.islamic.network".to_string()
}

fn default_secondary_host() -> String {
    "https://everyayah.com".to_string()
}

fn default_primary_bitrate() -> u32 {
    128
}

fn default_fallback_bitrate() -> u32 {
    64
}

fn default_secondary_bitrate() -> u32 {
    128
}

fn default_alternate_format() -> Option<AlternateFormat> {
    Some(AlternateFormat {
        extension: "ogg".to_string(),
        mime_type: "audio/ogg".to_string(),
    })
}

fn default_secondary_aliases() -> HashMap<String, String> {
    [
        ("ar.alafasy", "Alafasy"),
        ("ar.husary", "Husary"),
        ("ar.husarymujawwad", "Husary_Mujawwad"),
        ("ar.minshawi", "Minshawy_Murattal"),
        ("ar.abdulbasitmurattal", "Abdul_Basit_Murattal"),
        ("ar.abdurrahmaansudais", "Abdurrahmaan_As-Sudais"),
        ("ar.mahermuaiqly", "MaherAlMuaiqly"),
        ("ar.shaatree", "Abu_Bakr_Ash-Shaatree"),
        ("ar.hudhaify", "Hudhaify"),
    ]
    .into_iter()
    .map(|(edition, dir)| (edition.to_string(), dir.to_string()))
    .collect()
}

fn default_include_api_audio() -> bool {
    true
}

fn default_existence_check_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_metadata_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_load_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_candidate_backoff() -> Duration {
    Duration::from_millis(150)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(2)
}
