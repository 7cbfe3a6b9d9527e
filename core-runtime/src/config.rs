//! # Core Configuration Module
//!
//! Builder-based configuration for the recitation core.
//!
//! ## Required Dependencies
//!
//! - `AudioOutput` - the host media element. There is no default; every host
//!   injects its own.
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - content API calls and CDN checks (desktop default: reqwest)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .audio_output(Arc::new(MyAudioOutput::new()))
//!     .reciter("ar.husary")
//!     .enable_autoplay(true)
//!     .build()?;
//! ```
//!
//! `build()` fails fast with an actionable [`Error::CapabilityMissing`] when a
//! required bridge is absent.

use crate::error::{Error, Result};
use bridge_traits::{AudioOutput, HttpClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.alquran.cloud/v1";
pub const DEFAULT_ARABIC_EDITION: &str = "quran-uthmani";
pub const DEFAULT_TRANSLATION_EDITION: &str = "en.asad";
pub const DEFAULT_RECITER: &str = "ar.alafasy";

/// Core configuration for the recitation core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// HTTP client for content API calls and existence checks
    pub http_client: Arc<dyn HttpClient>,

    /// Host audio output (required)
    pub audio_output: Arc<dyn AudioOutput>,

    /// Content API endpoints and editions
    pub content_api: ContentApiConfig,

    /// Reciter edition used to build audio URLs, e.g. `ar.alafasy`
    pub reciter: String,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("audio_output", &"AudioOutput { ... }")
            .field("content_api", &self.content_api)
            .field("reciter", &self.reciter)
            .field("features", &self.features)
            .finish()
    }
}

/// Initial toggles. All of them can be changed at runtime through the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Advance to the next verse when one finishes
    pub autoplay: bool,

    /// Continue into the next unit when the current one finishes
    pub autoplay_across_units: bool,

    /// Fetch and merge a translation alongside the Arabic text
    pub show_translation: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            autoplay: true,
            autoplay_across_units: false,
            show_translation: true,
        }
    }
}

/// Content API endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentApiConfig {
    /// Base URL without a trailing slash
    pub base_url: String,

    /// Edition for the Arabic text
    pub arabic_edition: String,

    /// Edition for the translation
    pub translation_edition: String,

    /// Per-request timeout
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for ContentApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            arabic_edition: DEFAULT_ARABIC_EDITION.to_string(),
            translation_edition: DEFAULT_TRANSLATION_EDITION.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl ContentApiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_translation_edition(mut self, edition: impl Into<String>) -> Self {
        self.translation_edition = edition.into();
        self
    }

    pub fn with_arabic_edition(mut self, edition: impl Into<String>) -> Self {
        self.arabic_edition = edition.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Content API base URL must be http(s): {}",
                self.base_url
            )));
        }

        if self.arabic_edition.trim().is_empty() {
            return Err(Error::Config("Arabic edition cannot be empty".to_string()));
        }

        if self.translation_edition.trim().is_empty() {
            return Err(Error::Config(
                "Translation edition cannot be empty".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Content API request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.reciter.trim().is_empty() {
            return Err(Error::Config("Reciter cannot be empty".to_string()));
        }

        if self.reciter.contains('/') {
            return Err(Error::Config(format!(
                "Reciter '{}' must not contain '/'",
                self.reciter
            )));
        }

        self.content_api.validate()
    }
}

fn audio_output_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioOutput".to_string(),
        message: "AudioOutput implementation is required for recitation playback. \
                 Web: wrap an HTMLAudioElement. \
                 Mobile: wrap AVPlayer/ExoPlayer. \
                 Desktop: wrap a native audio sink."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Failed to create the default reqwest client: {}", e),
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for content and audio checks. \
                 Desktop: enable the 'desktop-shims' feature to use the default reqwest client. \
                 Other hosts: inject a platform HTTP client."
            .to_string(),
    })
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    audio_output: Option<Arc<dyn AudioOutput>>,
    content_api: Option<ContentApiConfig>,
    reciter: Option<String>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the audio output implementation (required).
    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    pub fn content_api(mut self, config: ContentApiConfig) -> Self {
        self.content_api = Some(config);
        self
    }

    pub fn reciter(mut self, reciter: impl Into<String>) -> Self {
        self.reciter = Some(reciter.into());
        self
    }

    pub fn enable_autoplay(mut self, enabled: bool) -> Self {
        self.features.autoplay = enabled;
        self
    }

    pub fn enable_autoplay_across_units(mut self, enabled: bool) -> Self {
        self.features.autoplay_across_units = enabled;
        self
    }

    pub fn show_translation(mut self, enabled: bool) -> Self {
        self.features.show_translation = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - `AudioOutput` missing
    /// - `HttpClient` missing and no desktop default available
    /// - Invalid reciter or content API settings
    pub fn build(self) -> Result<CoreConfig> {
        let audio_output = self.audio_output.ok_or_else(audio_output_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            http_client,
            audio_output,
            content_api: self.content_api.unwrap_or_default(),
            reciter: self.reciter.unwrap_or_else(|| DEFAULT_RECITER.to_string()),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        AudioSource, HttpRequest, HttpResponse, MediaHandle, OpenedMedia, Preload,
    };

    struct NullHttpClient;

    #[async_trait]
    impl HttpClient for NullHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                body: Default::default(),
            })
        }
    }

    struct NullAudioOutput;

    #[async_trait]
    impl AudioOutput for NullAudioOutput {
        async fn open(&self, _source: AudioSource, _preload: Preload) -> BridgeResult<OpenedMedia> {
            Ok(OpenedMedia::channel().0)
        }

        async fn play(&self, _handle: MediaHandle) -> BridgeResult<()> {
            Ok(())
        }

        async fn pause(&self, _handle: MediaHandle) -> BridgeResult<()> {
            Ok(())
        }

        async fn stop(&self, _handle: MediaHandle) -> BridgeResult<()> {
            Ok(())
        }

        async fn release(&self, _handle: MediaHandle) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .audio_output(Arc::new(NullAudioOutput))
    }

    #[test]
    fn test_builder_requires_audio_output() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .build();

        let err = result.unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { .. }));
        assert!(err.to_string().contains("AudioOutput"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client_without_shims() {
        let result = CoreConfig::builder()
            .audio_output(Arc::new(NullAudioOutput))
            .build();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("HttpClient"));
        assert!(err.contains("desktop-shims"));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_builder_uses_desktop_http_client() {
        let result = CoreConfig::builder()
            .audio_output(Arc::new(NullAudioOutput))
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.reciter, DEFAULT_RECITER);
        assert_eq!(config.content_api, ContentApiConfig::default());
        assert!(config.features.autoplay);
        assert!(!config.features.autoplay_across_units);
        assert!(config.features.show_translation);
    }

    #[test]
    fn test_builder_feature_toggles() {
        let config = builder()
            .reciter("ar.husary")
            .enable_autoplay(false)
            .enable_autoplay_across_units(true)
            .show_translation(false)
            .build()
            .unwrap();

        assert_eq!(config.reciter, "ar.husary");
        assert_eq!(
            config.features,
            FeatureFlags {
                autoplay: false,
                autoplay_across_units: true,
                show_translation: false,
            }
        );
    }

    #[test]
    fn test_validate_rejects_empty_reciter() {
        let err = builder().reciter("  ").build().unwrap_err();
        assert!(err.to_string().contains("Reciter cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let err = builder()
            .content_api(ContentApiConfig::default().with_base_url("ftp://example.com"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = ContentApiConfig::default().with_base_url("https://api.example.com/v1/");
        assert_eq!(api.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_content_api_config_serde_defaults() {
        let api: ContentApiConfig =
            serde_json::from_str(r#"{"translation_edition":"en.sahih","request_timeout":2500}"#)
                .unwrap();
        assert_eq!(api.translation_edition, "en.sahih");
        assert_eq!(api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(api.request_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("AudioOutput { ... }"));
        assert!(debug.contains("ar.alafasy"));
    }
}
