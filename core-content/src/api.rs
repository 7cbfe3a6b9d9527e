//! Quran content API client.
//!
//! [`ContentApi`] is the seam the rest of the core depends on. The default
//! implementation, [`AlQuranCloudClient`], talks to the alquran.cloud REST API:
//!
//! ```text
//! GET {base}/{surah|juz|manzil|hizbQuarter|ruku|page}/{number}/{edition}
//! ```
//!
//! Every response is wrapped in `{ code, status, data }`. For unit listings
//! `data.ayahs` holds the verses; each ayah names its surah except on
//! surah-level responses, where the surah number sits on `data` itself.

use crate::error::{ContentError, Result};
use crate::models::{UnitId, UnitKind};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A verse as returned by the content API, before merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVerse {
    /// Global verse number as reported by the API.
    pub number: u32,
    pub surah: u16,
    pub number_in_surah: u16,
    pub text: String,
    /// Primary audio URL, present on audio editions only.
    pub audio: Option<String>,
    /// Alternate audio URLs, in API order.
    pub audio_secondary: Vec<String>,
}

/// Source of verse text and translations.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Verses of `unit` in `edition` (Arabic text or an audio edition).
    async fn get_verses(&self, unit: UnitId, edition: &str) -> Result<Vec<ApiVerse>>;

    /// Translation of `unit` in `edition`. May be shorter than the Arabic
    /// response for the same unit.
    async fn get_translation(&self, unit: UnitId, edition: &str) -> Result<Vec<ApiVerse>>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: u16,
    #[serde(default)]
    status: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct UnitPayload {
    /// Surah number on surah-level responses; unit number otherwise.
    #[serde(default)]
    number: Option<u16>,
    #[serde(default)]
    ayahs: Vec<WireAyah>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAyah {
    number: u32,
    text: String,
    number_in_surah: u16,
    #[serde(default)]
    surah: Option<WireSurahRef>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    audio_secondary: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WireSurahRef {
    number: u16,
}

// =============================================================================
// alquran.cloud client
// =============================================================================

/// [`ContentApi`] over an injected [`HttpClient`].
pub struct AlQuranCloudClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl AlQuranCloudClient {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn unit_url(&self, unit: UnitId, edition: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            unit.kind.api_path(),
            unit.number,
            edition
        )
    }

    async fn fetch_unit(&self, unit: UnitId, edition: &str) -> Result<Vec<ApiVerse>> {
        let url = self.unit_url(unit, edition);
        debug!(url = %url, "Fetching unit");

        let request = HttpRequest::get(&url)
            .header("Accept", "application/json")
            .timeout(self.timeout);
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "<non-utf8 body>".to_string());
            warn!(status = response.status, url = %url, "Content API request failed");
            return Err(ContentError::Api {
                status: response.status,
                message,
            });
        }

        let envelope: Envelope<UnitPayload> = serde_json::from_slice(&response.body)
            .map_err(|e| ContentError::Deserialization(format!("{}: {}", url, e)))?;

        if envelope.code != 200 {
            return Err(ContentError::Api {
                status: envelope.code,
                message: envelope.status,
            });
        }

        let surah_fallback = match unit.kind {
            UnitKind::Surah => envelope.data.number.or(Some(unit.number)),
            _ => None,
        };

        envelope
            .data
            .ayahs
            .into_iter()
            .map(|ayah| convert_ayah(ayah, surah_fallback))
            .collect()
    }
}

fn convert_ayah(ayah: WireAyah, surah_fallback: Option<u16>) -> Result<ApiVerse> {
    let surah = ayah
        .surah
        .map(|s| s.number)
        .or(surah_fallback)
        .ok_or_else(|| {
            ContentError::Deserialization(format!("ayah {} carries no surah number", ayah.number))
        })?;

    Ok(ApiVerse {
        number: ayah.number,
        surah,
        number_in_surah: ayah.number_in_surah,
        text: ayah.text,
        audio: ayah.audio.filter(|url| !url.is_empty()),
        audio_secondary: ayah.audio_secondary.unwrap_or_default(),
    })
}

#[async_trait]
impl ContentApi for AlQuranCloudClient {
    #[instrument(skip(self, unit), fields(unit = %unit))]
    async fn get_verses(&self, unit: UnitId, edition: &str) -> Result<Vec<ApiVerse>> {
        self.fetch_unit(unit, edition).await
    }

    #[instrument(skip(self, unit), fields(unit = %unit))]
    async fn get_translation(&self, unit: UnitId, edition: &str) -> Result<Vec<ApiVerse>> {
        self.fetch_unit(unit, edition).await
    }
}
