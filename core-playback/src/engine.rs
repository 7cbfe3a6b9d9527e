//! # Playback Engine
//!
//! Owns the single active audio handle and the session describing it.
//!
//! ## Request generations
//!
//! Every play request begins with [`PlaybackEngine::begin_request`], which
//! bumps a generation counter and cancels the token of the previous request.
//! An operation whose token is no longer current is stale: it must not
//! install a handle, mutate the session or emit events. It returns
//! [`PlaybackError::StaleOperation`] and releases anything it opened.
//!
//! ## Single active handle
//!
//! `play` and `stop` serialize on an async operation lock. The previous
//! handle is stopped and released before the next one is opened, so at most
//! one handle is ever playing.
//!
//! ## Media events
//!
//! A watcher task follows each installed handle until the session is torn
//! down. It is tied to the session, not to the request generation: starting
//! a new request while a verse is still audible does not blind the engine to
//! that verse ending. Natural end and mid-stream errors are published as
//! [`PlaybackEvent::Ended`] and [`PlaybackEvent::Interrupted`] with the
//! generation of the request that installed the handle.

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use bridge_traits::playback::{
    AudioOutput, AudioSource, MediaEvent, MediaEventReceiver, MediaHandle, Preload,
};
use core_async::sync::Mutex as AsyncMutex;
use core_async::time::timeout;
use core_async::CancellationToken;
use core_content::{AudioCandidate, VerseKey};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

/// The handle currently owned by the engine.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub request: u64,
    pub verse: VerseKey,
    pub handle: MediaHandle,
    pub is_playing: bool,
    pub candidate_index: usize,
    /// Candidates tried for this verse before this one.
    pub retry_count: u32,
    pub url: String,
    watch: CancellationToken,
}

/// Read-only view of the engine for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: EngineState,
    pub request: u64,
    pub verse: Option<VerseKey>,
    pub is_playing: bool,
    pub candidate_index: Option<usize>,
    pub retry_count: u32,
    pub url: Option<String>,
}

/// Identity of one play request.
///
/// The token is current until the next [`PlaybackEngine::begin_request`] or
/// [`PlaybackEngine::stop`]; at that point `cancel` fires.
#[derive(Debug, Clone)]
pub struct PlayToken {
    generation: u64,
    cancel: CancellationToken,
}

impl PlayToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct EngineInner {
    output: Arc<dyn AudioOutput>,
    bus: EventBus,
    config: PlaybackConfig,
    state: Mutex<EngineShared>,
    op_lock: AsyncMutex<()>,
}

struct EngineShared {
    generation: u64,
    cancel: CancellationToken,
    state: EngineState,
    session: Option<PlaybackSession>,
}

/// Audio playback engine. Cheap to clone.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, bus: EventBus, config: PlaybackConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                output,
                bus,
                config,
                state: Mutex::new(EngineShared {
                    generation: 0,
                    cancel: CancellationToken::new(),
                    state: EngineState::Idle,
                    session: None,
                }),
                op_lock: AsyncMutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Start a new request generation, invalidating every in-flight one.
    pub fn begin_request(&self) -> PlayToken {
        let mut shared = self.inner.state.lock();
        shared.cancel.cancel();
        shared.generation += 1;
        shared.cancel = CancellationToken::new();
        debug!(request = shared.generation, "Began play request");
        PlayToken {
            generation: shared.generation,
            cancel: shared.cancel.clone(),
        }
    }

    pub fn is_current(&self, token: &PlayToken) -> bool {
        self.inner.state.lock().generation == token.generation && !token.is_cancelled()
    }

    pub fn current_generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.lock().state
    }

    /// `true` while `verse` is loaded and audible.
    pub fn is_playing(&self, verse: &VerseKey) -> bool {
        let shared = self.inner.state.lock();
        shared.state == EngineState::Playing
            && shared
                .session
                .as_ref()
                .map_or(false, |s| s.is_playing && s.verse == *verse)
    }

    /// `true` while loading, playing or paused.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            EngineState::Loading | EngineState::Playing | EngineState::Paused
        )
    }

    pub fn session(&self) -> Option<PlaybackSession> {
        self.inner.state.lock().session.clone()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let shared = self.inner.state.lock();
        let session = shared.session.as_ref();
        PlaybackSnapshot {
            state: shared.state,
            request: shared.generation,
            verse: session.map(|s| s.verse),
            is_playing: session.map_or(false, |s| s.is_playing),
            candidate_index: session.map(|s| s.candidate_index),
            retry_count: session.map_or(0, |s| s.retry_count),
            url: session.map(|s| s.url.clone()),
        }
    }

    /// Load and start one candidate for `verse`.
    ///
    /// Any previously installed handle is stopped and released first.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::StaleOperation`] when `token` was superseded at any
    ///   point. Nothing is installed and nothing is emitted.
    /// - [`PlaybackError::SourceUnavailable`] when the candidate could not be
    ///   opened or started within the load budget.
    #[instrument(skip(self, token, verse, candidate), fields(request = token.generation, verse = %verse))]
    pub async fn play(
        &self,
        token: &PlayToken,
        verse: VerseKey,
        candidate: &AudioCandidate,
        candidate_index: usize,
        retry_count: u32,
    ) -> Result<()> {
        self.ensure_current(token)?;
        let _guard = self.inner.op_lock.lock().await;
        self.ensure_current(token)?;

        if let Some(previous) = self.take_session() {
            self.teardown(&previous).await;
            self.emit(PlaybackEvent::Stopped {
                request: previous.request,
                verse: Some(previous.verse.to_string()),
            });
        }
        self.ensure_current(token)?;

        self.set_state(EngineState::Loading);
        self.emit(PlaybackEvent::Loading {
            request: token.generation,
            verse: verse.to_string(),
            url: candidate.url.clone(),
            candidate_index,
        });

        let source = AudioSource::new(candidate.url.clone()).with_mime_type(candidate.mime_type.clone());
        let load_timeout = self.inner.config.load_timeout;
        let opened = core_async::select! {
            biased;
            _ = token.cancel.cancelled() => {
                return Err(PlaybackError::StaleOperation { request: token.generation });
            }
            result = timeout(load_timeout, self.inner.output.open(source, Preload::Auto)) => result,
        };

        let opened = match opened {
            Ok(Ok(opened)) => opened,
            Ok(Err(err)) => return Err(self.load_failed(token, verse, candidate, err.to_string())),
            Err(_) => {
                return Err(self.load_failed(
                    token,
                    verse,
                    candidate,
                    format!("load timed out after {:?}", load_timeout),
                ))
            }
        };
        let handle = opened.handle;

        if !self.is_current(token) {
            self.release(handle).await;
            return Err(PlaybackError::StaleOperation {
                request: token.generation,
            });
        }

        let started = core_async::select! {
            biased;
            _ = token.cancel.cancelled() => None,
            result = timeout(load_timeout, self.inner.output.play(handle)) => Some(result),
        };

        match started {
            None => {
                self.release(handle).await;
                return Err(PlaybackError::StaleOperation {
                    request: token.generation,
                });
            }
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(err))) => {
                self.release(handle).await;
                return Err(self.load_failed(token, verse, candidate, err.to_string()));
            }
            Some(Err(_)) => {
                self.release(handle).await;
                return Err(self.load_failed(
                    token,
                    verse,
                    candidate,
                    "start timed out".to_string(),
                ));
            }
        }

        let watch = CancellationToken::new();
        let installed = {
            let mut shared = self.inner.state.lock();
            let current = shared.generation == token.generation && !token.is_cancelled();
            if current {
                shared.session = Some(PlaybackSession {
                    request: token.generation,
                    verse,
                    handle,
                    is_playing: true,
                    candidate_index,
                    retry_count,
                    url: candidate.url.clone(),
                    watch: watch.clone(),
                });
                shared.state = EngineState::Playing;
            }
            current
        };

        if !installed {
            self.teardown_handle(handle).await;
            return Err(PlaybackError::StaleOperation {
                request: token.generation,
            });
        }

        info!(url = %redact_url(&candidate.url), candidate_index, "Recitation started");
        self.emit(PlaybackEvent::Started {
            request: token.generation,
            verse: verse.to_string(),
            url: candidate.url.clone(),
            candidate_index,
        });

        self.spawn_watcher(token.generation, watch, verse, handle, candidate_index, opened.events);
        Ok(())
    }

    /// Stop and release the active handle. Invalidates in-flight requests.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let (generation, was_active) = {
            let mut shared = self.inner.state.lock();
            shared.cancel.cancel();
            shared.generation += 1;
            shared.cancel = CancellationToken::new();
            (shared.generation, shared.state != EngineState::Idle)
        };

        let _guard = self.inner.op_lock.lock().await;
        let session = self.take_session();
        if let Some(session) = &session {
            self.teardown(session).await;
        }
        self.set_state(EngineState::Idle);

        if session.is_some() || was_active {
            self.emit(PlaybackEvent::Stopped {
                request: generation,
                verse: session.map(|s| s.verse.to_string()),
            });
        }
    }

    /// Pause the active handle. Returns `false` when nothing was playing.
    pub async fn pause(&self) -> Result<bool> {
        let _guard = self.inner.op_lock.lock().await;
        let Some(session) = self.playing_session(EngineState::Playing) else {
            return Ok(false);
        };

        self.inner
            .output
            .pause(session.handle)
            .await
            .map_err(|e| PlaybackError::AudioOutput(e.to_string()))?;

        self.update_session(session.handle, EngineState::Paused, false);
        self.emit(PlaybackEvent::Paused {
            request: session.request,
            verse: session.verse.to_string(),
        });
        Ok(true)
    }

    /// Resume a paused handle. Returns `false` when nothing was paused.
    pub async fn resume(&self) -> Result<bool> {
        let _guard = self.inner.op_lock.lock().await;
        let Some(session) = self.playing_session(EngineState::Paused) else {
            return Ok(false);
        };

        self.inner
            .output
            .play(session.handle)
            .await
            .map_err(|e| PlaybackError::AudioOutput(e.to_string()))?;

        self.update_session(session.handle, EngineState::Playing, true);
        self.emit(PlaybackEvent::Resumed {
            request: session.request,
            verse: session.verse.to_string(),
        });
        Ok(true)
    }

    fn ensure_current(&self, token: &PlayToken) -> Result<()> {
        if self.is_current(token) {
            Ok(())
        } else {
            Err(PlaybackError::StaleOperation {
                request: token.generation,
            })
        }
    }

    fn playing_session(&self, expected: EngineState) -> Option<PlaybackSession> {
        let shared = self.inner.state.lock();
        if shared.state != expected {
            return None;
        }
        shared.session.clone()
    }

    fn update_session(&self, handle: MediaHandle, state: EngineState, is_playing: bool) {
        let mut shared = self.inner.state.lock();
        if let Some(session) = shared.session.as_mut().filter(|s| s.handle == handle) {
            session.is_playing = is_playing;
            shared.state = state;
        }
    }

    fn take_session(&self) -> Option<PlaybackSession> {
        self.inner.state.lock().session.take()
    }

    fn set_state(&self, state: EngineState) {
        self.inner.state.lock().state = state;
    }

    fn load_failed(
        &self,
        token: &PlayToken,
        verse: VerseKey,
        candidate: &AudioCandidate,
        reason: String,
    ) -> PlaybackError {
        if !self.is_current(token) {
            return PlaybackError::StaleOperation {
                request: token.generation,
            };
        }

        warn!(url = %redact_url(&candidate.url), reason = %reason, "Candidate failed to load");
        self.set_state(EngineState::Error);
        self.emit(PlaybackEvent::Error {
            request: token.generation,
            verse: verse.to_string(),
            url: candidate.url.clone(),
            message: reason.clone(),
        });

        PlaybackError::SourceUnavailable {
            url: candidate.url.clone(),
            reason,
        }
    }

    async fn teardown(&self, session: &PlaybackSession) {
        debug!(request = session.request, verse = %session.verse, "Releasing previous handle");
        session.watch.cancel();
        self.teardown_handle(session.handle).await;
    }

    async fn teardown_handle(&self, handle: MediaHandle) {
        if let Err(err) = self.inner.output.stop(handle).await {
            debug!(error = %err, %handle, "Stop failed during teardown");
        }
        self.release(handle).await;
    }

    async fn release(&self, handle: MediaHandle) {
        if let Err(err) = self.inner.output.release(handle).await {
            warn!(error = %err, %handle, "Failed to release media handle");
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        self.inner.bus.emit(CoreEvent::Playback(event)).ok();
    }

    fn spawn_watcher(
        &self,
        request: u64,
        watch: CancellationToken,
        verse: VerseKey,
        handle: MediaHandle,
        candidate_index: usize,
        mut events: MediaEventReceiver,
    ) {
        let inner: Weak<EngineInner> = Arc::downgrade(&self.inner);
        core_async::spawn(async move {
            loop {
                let event = core_async::select! {
                    biased;
                    _ = watch.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };
                let Some(inner) = inner.upgrade() else { break };
                let engine = PlaybackEngine { inner };

                match event {
                    MediaEvent::Ended => {
                        if engine.finish_session(request, handle, EngineState::Ended) {
                            info!(request, verse = %verse, "Recitation ended");
                            engine.emit(PlaybackEvent::Ended {
                                request,
                                verse: verse.to_string(),
                            });
                        }
                        break;
                    }
                    MediaEvent::Error { message } => {
                        if engine.finish_session(request, handle, EngineState::Error) {
                            warn!(request, verse = %verse, error = %message, "Recitation interrupted");
                            engine.emit(PlaybackEvent::Interrupted {
                                request,
                                verse: verse.to_string(),
                                candidate_index,
                                message,
                            });
                        }
                        break;
                    }
                }
            }
        });
    }

    /// Mark the session finished if `handle` is still the installed one.
    /// The handle is released off the caller's path.
    fn finish_session(&self, request: u64, handle: MediaHandle, state: EngineState) -> bool {
        let finished = {
            let mut shared = self.inner.state.lock();
            let installed = shared
                .session
                .as_ref()
                .map_or(false, |s| s.request == request && s.handle == handle);
            if installed {
                shared.session = None;
                shared.state = state;
            }
            installed
        };

        if finished {
            let engine = self.clone();
            core_async::spawn(async move {
                let _guard = engine.inner.op_lock.lock().await;
                engine.release(handle).await;
            });
        }
        finished
    }
}
