//! Fallback coordination.
//!
//! Walks a verse's candidates in order: validate, then hand the first
//! playable one to the engine. A candidate that fails validation or loading
//! is recorded and skipped. Each candidate is tried at most once per request.

use crate::config::PlaybackConfig;
use crate::engine::{PlayToken, PlaybackEngine};
use crate::error::{PlaybackError, Result};
use crate::resolver::CandidateResolver;
use crate::validator::{AttemptOutcome, SourceValidator};
use core_async::time::{backoff_delay, sleep};
use core_content::{AudioCandidate, Verse, VerseKey};
use core_runtime::logging::redact_url;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One candidate tried during a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioCandidateAttempt {
    pub url: String,
    pub mime_type: String,
    pub outcome: AttemptOutcome,
    /// 1-based position of this attempt within the request.
    pub attempt_count: u32,
}

/// How a fallback run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    Playing {
        request: u64,
        candidate_index: usize,
        url: String,
        attempts: Vec<AudioCandidateAttempt>,
    },
    /// The verse was already audible; nothing was reloaded.
    AlreadyPlaying,
    /// Every candidate failed. `attempts` is empty when there were none.
    Exhausted { attempts: Vec<AudioCandidateAttempt> },
    /// A newer request took over before any candidate played.
    Superseded,
}

impl FallbackOutcome {
    pub fn is_playing(&self) -> bool {
        matches!(
            self,
            FallbackOutcome::Playing { .. } | FallbackOutcome::AlreadyPlaying
        )
    }
}

/// Drives a verse through its candidates until one plays.
#[derive(Clone)]
pub struct FallbackCoordinator {
    resolver: Arc<dyn CandidateResolver>,
    validator: Arc<dyn SourceValidator>,
    engine: PlaybackEngine,
    config: PlaybackConfig,
}

impl FallbackCoordinator {
    pub fn new(
        resolver: Arc<dyn CandidateResolver>,
        validator: Arc<dyn SourceValidator>,
        engine: PlaybackEngine,
    ) -> Self {
        let config = engine.config().clone();
        Self {
            resolver,
            validator,
            engine,
            config,
        }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    /// Candidates for `verse`, best first.
    pub fn resolve(&self, verse: &Verse, reciter: &str) -> Result<Vec<AudioCandidate>> {
        self.resolver.resolve(verse, reciter)
    }

    /// Play `verse` with full fallback as a fresh request.
    ///
    /// A verse that is already playing is left alone. Anything else that
    /// plays is stopped first, so an exhausted request leaves the engine idle.
    #[instrument(skip(self, verse), fields(verse = %verse.key))]
    pub async fn play_with_fallback(&self, verse: &Verse, reciter: &str) -> Result<FallbackOutcome> {
        if self.engine.is_playing(&verse.key) {
            debug!("Verse already playing");
            return Ok(FallbackOutcome::AlreadyPlaying);
        }

        let candidates = self.resolver.resolve(verse, reciter)?;
        self.engine.stop().await;
        let token = self.engine.begin_request();
        self.play_candidates(&token, verse.key, &candidates, 0).await
    }

    /// Try `candidates[start_index..]` under `token`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::StaleOperation`] as soon as `token` is superseded.
    /// Candidate failures are never errors; they end in
    /// [`FallbackOutcome::Exhausted`].
    #[instrument(skip(self, token, verse, candidates), fields(request = token.generation(), verse = %verse))]
    pub async fn play_candidates(
        &self,
        token: &PlayToken,
        verse: VerseKey,
        candidates: &[AudioCandidate],
        start_index: usize,
    ) -> Result<FallbackOutcome> {
        let mut attempts: Vec<AudioCandidateAttempt> = Vec::new();

        for (index, candidate) in candidates.iter().enumerate().skip(start_index) {
            if !attempts.is_empty() {
                self.pause_between_candidates(token, attempts.len() as u32 - 1)
                    .await?;
            }
            self.ensure_current(token)?;

            let attempt_count = attempts.len() as u32 + 1;
            let outcome = self
                .validator
                .validate(candidate, token.generation(), token.cancellation())
                .await?;

            if !outcome.is_playable() {
                debug!(
                    candidate_index = index,
                    url = %redact_url(&candidate.url),
                    ?outcome,
                    "Candidate rejected by validation"
                );
                attempts.push(attempt(candidate, outcome, attempt_count));
                continue;
            }

            match self
                .engine
                .play(token, verse, candidate, index, attempt_count - 1)
                .await
            {
                Ok(()) => {
                    attempts.push(attempt(candidate, AttemptOutcome::Ok, attempt_count));
                    info!(candidate_index = index, attempts = attempts.len(), "Playing candidate");
                    return Ok(FallbackOutcome::Playing {
                        request: token.generation(),
                        candidate_index: index,
                        url: candidate.url.clone(),
                        attempts,
                    });
                }
                Err(err) if err.is_stale() => return Err(err),
                Err(err) => {
                    debug!(candidate_index = index, error = %err, "Candidate failed to play");
                    attempts.push(attempt(candidate, AttemptOutcome::Failed, attempt_count));
                }
            }
        }

        self.ensure_current(token)?;
        warn!(attempts = attempts.len(), "All audio candidates failed");
        Ok(FallbackOutcome::Exhausted { attempts })
    }

    async fn pause_between_candidates(&self, token: &PlayToken, attempt: u32) -> Result<()> {
        let delay = backoff_delay(self.config.candidate_backoff, attempt, self.config.max_backoff);
        if delay.is_zero() {
            return Ok(());
        }
        core_async::select! {
            biased;
            _ = token.cancellation().cancelled() => Err(PlaybackError::StaleOperation {
                request: token.generation(),
            }),
            _ = sleep(delay) => Ok(()),
        }
    }

    fn ensure_current(&self, token: &PlayToken) -> Result<()> {
        if self.engine.is_current(token) {
            Ok(())
        } else {
            Err(PlaybackError::StaleOperation {
                request: token.generation(),
            })
        }
    }
}

fn attempt(candidate: &AudioCandidate, outcome: AttemptOutcome, attempt_count: u32) -> AudioCandidateAttempt {
    AudioCandidateAttempt {
        url: candidate.url.clone(),
        mime_type: candidate.mime_type.clone(),
        outcome,
        attempt_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CdnSourceResolver;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::playback::{AudioOutput, AudioSource, MediaHandle, OpenedMedia, Preload};
    use core_async::CancellationToken;
    use core_runtime::events::EventBus;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Validator answering from a URL table; unknown URLs are playable.
    #[derive(Default)]
    struct TableValidator {
        outcomes: HashMap<String, AttemptOutcome>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SourceValidator for TableValidator {
        async fn validate(
            &self,
            candidate: &AudioCandidate,
            _request: u64,
            _cancel: &CancellationToken,
        ) -> Result<AttemptOutcome> {
            self.seen.lock().push(candidate.url.clone());
            Ok(self
                .outcomes
                .get(&candidate.url)
                .copied()
                .unwrap_or(AttemptOutcome::Ok))
        }
    }

    #[derive(Default)]
    struct OpenLog {
        opened: Mutex<Vec<String>>,
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl AudioOutput for OpenLog {
        async fn open(&self, source: AudioSource, _preload: Preload) -> BridgeResult<OpenedMedia> {
            self.opened.lock().push(source.url.clone());
            if self.fail_urls.contains(&source.url) {
                return Err(BridgeError::Media("decode".to_string()));
            }
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

    fn verse(surah: u16, ayah: u16) -> Verse {
        Verse::new(VerseKey::new(surah, ayah).unwrap(), "")
    }

    fn coordinator(validator: Arc<TableValidator>, output: Arc<OpenLog>) -> FallbackCoordinator {
        let engine = PlaybackEngine::new(output, EventBus::new(64), PlaybackConfig::fast());
        FallbackCoordinator::new(Arc::new(CdnSourceResolver::default()), validator, engine)
    }

    #[tokio::test]
    async fn test_first_playable_candidate_wins() {
        let resolver = CdnSourceResolver::default();
        let candidates = resolver.resolve(&verse(2, 255), "ar.alafasy").unwrap();

        let validator = Arc::new(TableValidator {
            outcomes: HashMap::from([(candidates[0].url.clone(), AttemptOutcome::Missing)]),
            ..Default::default()
        });
        let output = Arc::new(OpenLog {
            fail_urls: vec![candidates[1].url.clone()],
            ..Default::default()
        });
        let coordinator = coordinator(validator.clone(), output.clone());

        let outcome = coordinator
            .play_with_fallback(&verse(2, 255), "ar.alafasy")
            .await
            .unwrap();

        match outcome {
            FallbackOutcome::Playing {
                candidate_index,
                attempts,
                ..
            } => {
                assert_eq!(candidate_index, 2);
                let outcomes: Vec<_> = attempts.iter().map(|a| a.outcome).collect();
                assert_eq!(
                    outcomes,
                    vec![AttemptOutcome::Missing, AttemptOutcome::Failed, AttemptOutcome::Ok]
                );
                assert_eq!(attempts[2].attempt_count, 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Missing candidate never reached the output.
        assert_eq!(
            *output.opened.lock(),
            vec![candidates[1].url.clone(), candidates[2].url.clone()]
        );
        assert_eq!(coordinator.engine().session().unwrap().retry_count, 2);
    }

    #[tokio::test]
    async fn test_exhaustion_tries_each_candidate_once() {
        let resolver = CdnSourceResolver::default();
        let candidates = resolver.resolve(&verse(1, 1), "ar.alafasy").unwrap();
        let validator = Arc::new(TableValidator {
            outcomes: candidates
                .iter()
                .map(|c| (c.url.clone(), AttemptOutcome::Failed))
                .collect(),
            ..Default::default()
        });
        let coordinator = coordinator(validator.clone(), Arc::new(OpenLog::default()));

        let outcome = coordinator
            .play_with_fallback(&verse(1, 1), "ar.alafasy")
            .await
            .unwrap();

        match outcome {
            FallbackOutcome::Exhausted { attempts } => assert_eq!(attempts.len(), candidates.len()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let seen = validator.seen.lock().clone();
        assert_eq!(seen, candidates.iter().map(|c| c.url.clone()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_already_playing_is_noop() {
        let validator = Arc::new(TableValidator::default());
        let output = Arc::new(OpenLog::default());
        let coordinator = coordinator(validator, output.clone());

        let first = coordinator
            .play_with_fallback(&verse(1, 1), "ar.alafasy")
            .await
            .unwrap();
        assert!(matches!(first, FallbackOutcome::Playing { .. }));

        let second = coordinator
            .play_with_fallback(&verse(1, 1), "ar.alafasy")
            .await
            .unwrap();
        assert_eq!(second, FallbackOutcome::AlreadyPlaying);
        assert_eq!(output.opened.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_from_later_candidate() {
        let validator = Arc::new(TableValidator::default());
        let coordinator = coordinator(validator.clone(), Arc::new(OpenLog::default()));
        let candidates = coordinator.resolve(&verse(1, 2), "ar.alafasy").unwrap();

        let token = coordinator.engine().begin_request();
        let outcome = coordinator
            .play_candidates(&token, verse(1, 2).key, &candidates, 2)
            .await
            .unwrap();

        assert!(matches!(outcome, FallbackOutcome::Playing { candidate_index: 2, .. }));
        assert_eq!(validator.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_token_stops_the_walk() {
        let validator = Arc::new(TableValidator::default());
        let output = Arc::new(OpenLog::default());
        let coordinator = coordinator(validator, output.clone());
        let candidates = coordinator.resolve(&verse(1, 3), "ar.alafasy").unwrap();

        let token = coordinator.engine().begin_request();
        coordinator.engine().begin_request();

        let result = coordinator
            .play_candidates(&token, verse(1, 3).key, &candidates, 0)
            .await;

        assert!(matches!(result, Err(PlaybackError::StaleOperation { .. })));
        assert!(output.opened.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_candidates_is_exhausted() {
        let coordinator = coordinator(Arc::new(TableValidator::default()), Arc::new(OpenLog::default()));
        let token = coordinator.engine().begin_request();

        let outcome = coordinator
            .play_candidates(&token, verse(1, 4).key, &[], 0)
            .await
            .unwrap();

        assert_eq!(outcome, FallbackOutcome::Exhausted { attempts: Vec::new() });
    }
}
