//! Source validation.
//!
//! Decides whether a candidate is worth handing to the engine. Strategies run
//! in order and each runs only when the previous one was inconclusive:
//!
//! 1. format support: the output says it cannot decode the MIME type
//! 2. existence check: `HEAD` answering 404 or 410
//! 3. metadata check: open a temporary handle with `Preload::Metadata`
//!
//! Every step has its own timeout and races the request's cancellation
//! token. The temporary handle is always released.

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::playback::{AudioOutput, AudioSource, MediaHandle, MediaSupport, Preload};
use core_async::time::timeout;
use core_async::CancellationToken;
use core_content::AudioCandidate;
use core_runtime::logging::redact_url;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of validating or attempting one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok,
    /// The resource provably does not exist.
    Missing,
    /// Unsupported, timed out or failed to load.
    Failed,
}

impl AttemptOutcome {
    pub fn is_playable(&self) -> bool {
        matches!(self, AttemptOutcome::Ok)
    }
}

/// Decides whether a candidate is playable.
#[async_trait]
pub trait SourceValidator: Send + Sync {
    /// Validate `candidate` within a bounded time budget.
    ///
    /// # Errors
    ///
    /// Only [`PlaybackError::StaleOperation`], when `cancel` fires first.
    async fn validate(
        &self,
        candidate: &AudioCandidate,
        request: u64,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome>;
}

/// Validator that checks candidates over HTTP and through the host audio output.
pub struct MediaValidator {
    http_client: Arc<dyn HttpClient>,
    output: Arc<dyn AudioOutput>,
    config: PlaybackConfig,
}

impl MediaValidator {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        output: Arc<dyn AudioOutput>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            http_client,
            output,
            config,
        }
    }

    /// `Some(Missing)` on 404/410, `None` when inconclusive.
    async fn existence_check(&self, url: &str) -> Option<AttemptOutcome> {
        let request = HttpRequest::head(url).timeout(self.config.existence_check_timeout);
        let check = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry());

        match timeout(self.config.existence_check_timeout, check).await {
            Ok(Ok(response)) if response.is_missing() => {
                debug!(status = response.status, url = %redact_url(url), "Existence check: missing");
                Some(AttemptOutcome::Missing)
            }
            Ok(Ok(response)) => {
                trace!(status = response.status, "Existence check inconclusive");
                None
            }
            Ok(Err(err)) => {
                trace!(error = %err, "Existence check failed, falling through");
                None
            }
            Err(_) => {
                trace!("Existence check timed out, falling through");
                None
            }
        }
    }

    async fn metadata_check(&self, candidate: &AudioCandidate) -> AttemptOutcome {
        let source =
            AudioSource::new(candidate.url.clone()).with_mime_type(candidate.mime_type.clone());
        let open = self.output.open(source, Preload::Metadata);

        match timeout(self.config.metadata_check_timeout, open).await {
            Ok(Ok(opened)) => {
                HandleGuard::new(Arc::clone(&self.output), opened.handle)
                    .release()
                    .await;
                AttemptOutcome::Ok
            }
            Ok(Err(err)) => {
                debug!(error = %err, url = %redact_url(&candidate.url), "Metadata check failed");
                AttemptOutcome::Failed
            }
            Err(_) => {
                debug!(url = %redact_url(&candidate.url), "Metadata check timed out");
                AttemptOutcome::Failed
            }
        }
    }

    async fn run_strategies(&self, candidate: &AudioCandidate) -> AttemptOutcome {
        if self.output.can_play_type(&candidate.mime_type) == MediaSupport::No {
            debug!(mime_type = %candidate.mime_type, "Output cannot decode candidate format");
            return AttemptOutcome::Failed;
        }

        if let Some(outcome) = self.existence_check(&candidate.url).await {
            return outcome;
        }

        self.metadata_check(candidate).await
    }
}

#[async_trait]
impl SourceValidator for MediaValidator {
    async fn validate(
        &self,
        candidate: &AudioCandidate,
        request: u64,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome> {
        core_async::select! {
            biased;
            _ = cancel.cancelled() => Err(PlaybackError::StaleOperation { request }),
            outcome = self.run_strategies(candidate) => Ok(outcome),
        }
    }
}

/// Releases a temporary media handle.
///
/// `release()` is the normal path. The handle is only forgotten once the
/// output has acknowledged the release, so if the owning future is dropped
/// first, or mid-release, the release is spawned from `Drop`.
struct HandleGuard {
    output: Arc<dyn AudioOutput>,
    handle: Option<MediaHandle>,
}

impl HandleGuard {
    fn new(output: Arc<dyn AudioOutput>, handle: MediaHandle) -> Self {
        Self {
            output,
            handle: Some(handle),
        }
    }

    async fn release(mut self) {
        if let Some(handle) = self.handle {
            if let Err(err) = self.output.release(handle).await {
                debug!(error = %err, %handle, "Failed to release temporary handle");
            }
            self.handle = None;
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let output = Arc::clone(&self.output);
            let spawned = core_async::task::spawn_detached(async move {
                let _ = output.release(handle).await;
            });
            if !spawned {
                debug!(%handle, "No runtime to release temporary handle");
            }
        }
    }
}
