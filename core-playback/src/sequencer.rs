//! # Sequencer
//!
//! Autoplay over a [`VerseSequence`].
//!
//! The sequencer owns the current position and the autoplay flags. It never
//! touches the audio handle; every play goes through the
//! [`FallbackCoordinator`] and every stop through the [`PlaybackEngine`].
//!
//! ## Epochs
//!
//! Each user action that redirects playback (select, skip, stop, autoplay
//! off, new unit) bumps an epoch. Autoplay chains remember the epoch they
//! started under and give up as soon as it moves, so a late `ended` or a slow
//! unit load can never move the position after the user did.
//!
//! ## Driver
//!
//! [`Sequencer::spawn_driver`] subscribes to the event bus and reacts to the
//! engine's `Ended` and `Interrupted` events for the active request only.

use crate::engine::{EngineState, PlayToken, PlaybackEngine};
use crate::error::{PlaybackError, Result};
use crate::fallback::{FallbackCoordinator, FallbackOutcome};
use async_trait::async_trait;
use core_async::task::JoinHandle;
use core_async::CancellationToken;
use core_content::{AudioCandidate, UnitId, Verse, VerseKey, VerseSequence};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, RecvError, SequenceEvent};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

/// Loads the sequence of another unit during cross-unit autoplay.
#[async_trait]
pub trait UnitNavigator: Send + Sync {
    async fn load_unit(&self, unit: UnitId) -> Result<VerseSequence>;
}

/// Initial autoplay flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerOptions {
    pub autoplay: bool,
    pub autoplay_across_units: bool,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            autoplay: true,
            autoplay_across_units: false,
        }
    }
}

/// What a sequencer operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerOutcome {
    Started { index: usize, candidate_index: usize },
    AlreadyPlaying,
    /// Every candidate failed for the verse at `index`.
    Exhausted { index: usize, attempts: usize },
    /// A newer action took over before this one finished.
    Superseded,
    /// Position moved without starting audio.
    Prepared { index: usize },
    /// Nothing further in that direction.
    AtBoundary,
}

enum UnitStep {
    Advanced,
    Finished,
    Superseded,
}

#[derive(Clone)]
struct ActiveRequest {
    token: PlayToken,
    index: usize,
    verse: VerseKey,
    candidates: Arc<Vec<AudioCandidate>>,
    user_initiated: bool,
}

struct SequencerState {
    sequence: Option<Arc<VerseSequence>>,
    current_index: usize,
    autoplay: bool,
    across_units: bool,
    active: Option<ActiveRequest>,
    epoch: u64,
    error: Option<String>,
}

struct SequencerInner {
    engine: PlaybackEngine,
    fallback: FallbackCoordinator,
    bus: EventBus,
    navigator: Option<Arc<dyn UnitNavigator>>,
    reciter: String,
    state: Mutex<SequencerState>,
    shutdown: CancellationToken,
}

/// Autoplay controller. Cheap to clone.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<SequencerInner>,
}

impl Sequencer {
    pub fn new(
        fallback: FallbackCoordinator,
        bus: EventBus,
        reciter: impl Into<String>,
        options: SequencerOptions,
        navigator: Option<Arc<dyn UnitNavigator>>,
    ) -> Self {
        Self {
            inner: Arc::new(SequencerInner {
                engine: fallback.engine().clone(),
                fallback,
                bus,
                navigator,
                reciter: reciter.into(),
                state: Mutex::new(SequencerState {
                    sequence: None,
                    current_index: 0,
                    autoplay: options.autoplay,
                    across_units: options.autoplay_across_units,
                    active: None,
                    epoch: 0,
                    error: None,
                }),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.inner.engine
    }

    pub fn sequence(&self) -> Option<Arc<VerseSequence>> {
        self.inner.state.lock().sequence.clone()
    }

    pub fn current_index(&self) -> usize {
        self.inner.state.lock().current_index
    }

    pub fn current_verse(&self) -> Option<Verse> {
        let state = self.inner.state.lock();
        state
            .sequence
            .as_ref()
            .and_then(|seq| seq.get(state.current_index).cloned())
    }

    pub fn is_playing(&self) -> bool {
        self.inner.engine.snapshot().is_playing
    }

    pub fn autoplay(&self) -> bool {
        self.inner.state.lock().autoplay
    }

    pub fn autoplay_across_units(&self) -> bool {
        self.inner.state.lock().across_units
    }

    /// Dismissible message for the last user-requested verse that could not play.
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.inner.state.lock().error = None;
    }

    /// Replace the sequence. Stops playback and resets the position to 0.
    #[instrument(skip(self, sequence), fields(unit = %sequence.unit(), verses = sequence.len()))]
    pub async fn load_sequence(&self, sequence: VerseSequence) {
        self.stop().await;

        let sequence = Arc::new(sequence);
        {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.sequence = Some(Arc::clone(&sequence));
            state.current_index = 0;
            state.error = None;
        }

        self.announce_sequence(&sequence);
    }

    /// Stop whatever plays and play the verse at `index`.
    ///
    /// Exhaustion is reported to the user: it sets [`Sequencer::error`] and
    /// emits one `SourcesExhausted` event. The position does not advance.
    #[instrument(skip(self))]
    pub async fn play_from(&self, index: usize) -> Result<SequencerOutcome> {
        let (sequence, epoch) = {
            let mut state = self.inner.state.lock();
            let sequence = state
                .sequence
                .clone()
                .ok_or(PlaybackError::NoSequenceLoaded)?;
            let verse = sequence.get(index).ok_or(PlaybackError::IndexOutOfRange {
                index,
                len: sequence.len(),
            })?;

            if state.current_index == index && self.inner.engine.is_playing(&verse.key) {
                return Ok(SequencerOutcome::AlreadyPlaying);
            }

            state.epoch += 1;
            state.current_index = index;
            state.error = None;
            state.active = None;
            (sequence, state.epoch)
        };

        self.emit_position(&sequence, index);
        self.inner.engine.stop().await;
        self.start_verse(&sequence, index, epoch, true).await
    }

    /// Play one verse outside the sequence. Autoplay does not follow it and
    /// the position does not move.
    ///
    /// Like [`Sequencer::play_from`], exhaustion sets [`Sequencer::error`] and
    /// emits one user-initiated `SourcesExhausted` event.
    #[instrument(skip(self, verse), fields(verse = %verse.key))]
    pub async fn play_single(&self, verse: &Verse) -> Result<FallbackOutcome> {
        if self.inner.engine.is_playing(&verse.key) {
            return Ok(FallbackOutcome::AlreadyPlaying);
        }

        let epoch = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.active = None;
            state.error = None;
            state.epoch
        };

        let outcome = match self
            .inner
            .fallback
            .play_with_fallback(verse, &self.inner.reciter)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) if err.is_stale() => {
                debug!("Single verse request superseded");
                return Ok(FallbackOutcome::Superseded);
            }
            Err(err) => return Err(err),
        };

        if let FallbackOutcome::Exhausted { attempts } = &outcome {
            if self.inner.state.lock().epoch != epoch {
                return Ok(FallbackOutcome::Superseded);
            }
            self.report_exhausted(verse.key, attempts.len());
        }
        Ok(outcome)
    }

    /// Select a verse in the UI.
    ///
    /// While autoplay is engaged this plays the verse. Otherwise only the
    /// position moves, so the next explicit play starts there.
    #[instrument(skip(self))]
    pub async fn on_manual_select(&self, index: usize) -> Result<SequencerOutcome> {
        let engaged = self.autoplay() && self.inner.engine.is_active();
        if engaged {
            return self.play_from(index).await;
        }

        let sequence = {
            let mut state = self.inner.state.lock();
            let sequence = state
                .sequence
                .clone()
                .ok_or(PlaybackError::NoSequenceLoaded)?;
            if index >= sequence.len() {
                return Err(PlaybackError::IndexOutOfRange {
                    index,
                    len: sequence.len(),
                });
            }
            state.current_index = index;
            state.error = None;
            sequence
        };

        self.emit_position(&sequence, index);
        Ok(SequencerOutcome::Prepared { index })
    }

    pub async fn skip_next(&self) -> Result<SequencerOutcome> {
        let (index, len) = self.position()?;
        if index + 1 >= len {
            return Ok(SequencerOutcome::AtBoundary);
        }
        self.play_from(index + 1).await
    }

    pub async fn skip_previous(&self) -> Result<SequencerOutcome> {
        let (index, _) = self.position()?;
        if index == 0 {
            return Ok(SequencerOutcome::AtBoundary);
        }
        self.play_from(index - 1).await
    }

    /// Stop audio and cancel any in-flight fallback or autoplay step.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.active = None;
        }
        self.inner.engine.stop().await;
    }

    /// Pause audio. A verse that is still loading is cancelled instead.
    pub async fn pause(&self) -> Result<bool> {
        if self.inner.engine.state() == EngineState::Loading {
            self.stop().await;
            return Ok(true);
        }
        self.inner.engine.pause().await
    }

    pub async fn resume(&self) -> Result<bool> {
        self.inner.engine.resume().await
    }

    /// Turn autoplay on or off. Turning it off stops audio immediately and
    /// keeps the current position.
    #[instrument(skip(self))]
    pub async fn set_autoplay(&self, enabled: bool) {
        let changed = {
            let mut state = self.inner.state.lock();
            let changed = state.autoplay != enabled;
            state.autoplay = enabled;
            if changed && !enabled {
                state.epoch += 1;
                state.active = None;
            }
            changed
        };

        if !changed {
            return;
        }
        if !enabled {
            self.inner.engine.stop().await;
        }

        info!(enabled, "Autoplay toggled");
        self.emit(SequenceEvent::AutoplayChanged { enabled });
    }

    pub fn set_autoplay_across_units(&self, enabled: bool) {
        self.inner.state.lock().across_units = enabled;
    }

    /// Start reacting to engine events. Call once.
    pub fn spawn_driver(&self) -> JoinHandle<()> {
        let mut events = self.inner.bus.subscribe();
        let weak: Weak<SequencerInner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        core_async::spawn(async move {
            loop {
                let event = core_async::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };

                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Sequencer driver lagged behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let Some(inner) = weak.upgrade() else { break };
                let sequencer = Sequencer { inner };

                match event {
                    CoreEvent::Playback(PlaybackEvent::Ended { request, .. }) => {
                        core_async::spawn(async move {
                            sequencer.on_ended(request).await;
                        });
                    }
                    CoreEvent::Playback(PlaybackEvent::Interrupted {
                        request,
                        candidate_index,
                        ..
                    }) => {
                        core_async::spawn(async move {
                            sequencer.on_interrupted(request, candidate_index).await;
                        });
                    }
                    _ => {}
                }
            }
            debug!("Sequencer driver stopped");
        })
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    // ------------------------------------------------------------------------
    // Engine event handling
    // ------------------------------------------------------------------------

    async fn on_ended(&self, request: u64) {
        let (start, epoch) = {
            let mut state = self.inner.state.lock();
            let Some(active) = state.active.take_if_request(request) else {
                return;
            };
            if !state.autoplay {
                debug!(request, "Verse ended; autoplay off");
                return;
            }
            (active.index + 1, state.epoch)
        };

        if let Err(err) = self.run_autoplay(start, epoch).await {
            warn!(error = %err, "Autoplay stopped");
        }
    }

    async fn on_interrupted(&self, request: u64, candidate_index: usize) {
        let (active, epoch) = {
            let state = self.inner.state.lock();
            match &state.active {
                Some(active) if active.token.generation() == request => {
                    (active.clone(), state.epoch)
                }
                _ => return,
            }
        };

        debug!(request, candidate_index, "Recovering interrupted verse with next candidate");
        let result = self
            .inner
            .fallback
            .play_candidates(
                &active.token,
                active.verse,
                &active.candidates,
                candidate_index + 1,
            )
            .await;

        match result {
            Ok(FallbackOutcome::Exhausted { attempts }) => {
                if !self.clear_active(epoch, request) {
                    return;
                }
                if active.user_initiated {
                    self.report_exhausted(active.verse, attempts.len());
                    return;
                }
                self.emit(SequenceEvent::SourcesExhausted {
                    verse: active.verse.to_string(),
                    attempts: attempts.len(),
                    user_initiated: false,
                });
                if self.autoplay() {
                    if let Err(err) = self.run_autoplay(active.index + 1, epoch).await {
                        warn!(error = %err, "Autoplay stopped");
                    }
                }
            }
            Ok(_) => {}
            Err(err) if err.is_stale() => {}
            Err(err) => warn!(error = %err, "Recovery after interruption failed"),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Play `sequence[index]` as a new request under `epoch`.
    async fn start_verse(
        &self,
        sequence: &Arc<VerseSequence>,
        index: usize,
        epoch: u64,
        user_initiated: bool,
    ) -> Result<SequencerOutcome> {
        let verse = sequence.get(index).ok_or(PlaybackError::IndexOutOfRange {
            index,
            len: sequence.len(),
        })?;
        let candidates = Arc::new(self.inner.fallback.resolve(verse, &self.inner.reciter)?);

        let Some(token) = self.issue_request(epoch, |token| ActiveRequest {
            token,
            index,
            verse: verse.key,
            candidates: Arc::clone(&candidates),
            user_initiated,
        }) else {
            return Ok(SequencerOutcome::Superseded);
        };

        let result = self
            .inner
            .fallback
            .play_candidates(&token, verse.key, &candidates, 0)
            .await;

        match result {
            Ok(FallbackOutcome::Playing {
                candidate_index, ..
            }) => Ok(SequencerOutcome::Started {
                index,
                candidate_index,
            }),
            Ok(FallbackOutcome::AlreadyPlaying) => Ok(SequencerOutcome::AlreadyPlaying),
            Ok(FallbackOutcome::Superseded) => Ok(SequencerOutcome::Superseded),
            Ok(FallbackOutcome::Exhausted { attempts }) => {
                if !self.clear_active(epoch, token.generation()) {
                    return Ok(SequencerOutcome::Superseded);
                }
                if user_initiated {
                    self.report_exhausted(verse.key, attempts.len());
                }
                Ok(SequencerOutcome::Exhausted {
                    index,
                    attempts: attempts.len(),
                })
            }
            Err(err) if err.is_stale() => {
                debug!(index, "Play request superseded");
                Ok(SequencerOutcome::Superseded)
            }
            Err(err) => Err(err),
        }
    }

    /// Advance from `start` to the next playable verse, crossing into the
    /// following unit when enabled. Never moves backwards.
    #[instrument(skip(self))]
    async fn run_autoplay(&self, start: usize, epoch: u64) -> Result<SequencerOutcome> {
        let mut next = start;

        loop {
            let Some(sequence) = self.autoplay_sequence(epoch) else {
                return Ok(SequencerOutcome::Superseded);
            };

            if next >= sequence.len() {
                match self.advance_unit(&sequence, epoch).await {
                    UnitStep::Advanced => {
                        next = 0;
                        continue;
                    }
                    UnitStep::Finished => return Ok(SequencerOutcome::AtBoundary),
                    UnitStep::Superseded => return Ok(SequencerOutcome::Superseded),
                }
            }

            let Some(verse) = sequence.get(next) else {
                return Ok(SequencerOutcome::AtBoundary);
            };

            let has_audio = match self.inner.fallback.resolve(verse, &self.inner.reciter) {
                Ok(candidates) => !candidates.is_empty(),
                Err(err) => {
                    warn!(verse = %verse.key, error = %err, "Could not resolve audio");
                    false
                }
            };
            if !has_audio {
                info!(index = next, verse = %verse.key, "Skipping verse without audio");
                self.emit(SequenceEvent::VerseSkipped {
                    index: next,
                    verse: verse.key.to_string(),
                    reason: "no audio sources".to_string(),
                });
                next += 1;
                continue;
            }

            if !self.move_to(epoch, next) {
                return Ok(SequencerOutcome::Superseded);
            }
            self.emit_position(&sequence, next);

            match self.start_verse(&sequence, next, epoch, false).await? {
                SequencerOutcome::Exhausted { attempts, .. } => {
                    warn!(index = next, verse = %verse.key, attempts, "Skipping verse: all audio sources failed");
                    self.emit(SequenceEvent::SourcesExhausted {
                        verse: verse.key.to_string(),
                        attempts,
                        user_initiated: false,
                    });
                    self.emit(SequenceEvent::VerseSkipped {
                        index: next,
                        verse: verse.key.to_string(),
                        reason: "all audio sources failed".to_string(),
                    });
                    next += 1;
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Emit `UnitCompleted` and, when enabled, install the following unit.
    async fn advance_unit(&self, sequence: &VerseSequence, epoch: u64) -> UnitStep {
        let from = sequence.unit();
        info!(unit = %from, "Unit completed");
        self.emit(SequenceEvent::UnitCompleted {
            unit: from.to_string(),
        });

        let across_units = self.inner.state.lock().across_units;
        let (Some(navigator), Some(to), true) = (
            self.inner.navigator.as_ref(),
            sequence.next_unit(),
            across_units,
        ) else {
            self.clear_active_for_epoch(epoch);
            return UnitStep::Finished;
        };

        let loaded = match navigator.load_unit(to).await {
            Ok(loaded) => Arc::new(loaded),
            Err(err) => {
                warn!(from = %from, to = %to, error = %err, "Failed to load next unit");
                self.clear_active_for_epoch(epoch);
                return UnitStep::Finished;
            }
        };

        {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || !state.autoplay {
                debug!(to = %to, "Unit load superseded");
                return UnitStep::Superseded;
            }
            state.sequence = Some(Arc::clone(&loaded));
            state.current_index = 0;
        }

        info!(from = %from, to = %to, "Advanced to next unit");
        self.emit(SequenceEvent::UnitAdvanced {
            from: from.to_string(),
            to: to.to_string(),
        });
        self.announce_sequence(&loaded);
        UnitStep::Advanced
    }

    fn autoplay_sequence(&self, epoch: u64) -> Option<Arc<VerseSequence>> {
        let state = self.inner.state.lock();
        if state.epoch != epoch || !state.autoplay {
            return None;
        }
        state.sequence.clone()
    }

    fn move_to(&self, epoch: u64, index: usize) -> bool {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return false;
        }
        state.current_index = index;
        true
    }

    /// Mint a request generation and make it active, unless `epoch` is over.
    ///
    /// Checking the epoch and calling `begin_request` under one lock keeps a
    /// superseded autoplay step from cancelling the request of a newer play.
    fn issue_request<F>(&self, epoch: u64, active: F) -> Option<PlayToken>
    where
        F: FnOnce(PlayToken) -> ActiveRequest,
    {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return None;
        }
        let token = self.inner.engine.begin_request();
        state.active = Some(active(token.clone()));
        Some(token)
    }

    fn clear_active(&self, epoch: u64, request: u64) -> bool {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return false;
        }
        state.active.take_if_request(request);
        true
    }

    fn clear_active_for_epoch(&self, epoch: u64) {
        let mut state = self.inner.state.lock();
        if state.epoch == epoch {
            state.active = None;
        }
    }

    fn position(&self) -> Result<(usize, usize)> {
        let state = self.inner.state.lock();
        let sequence = state
            .sequence
            .as_ref()
            .ok_or(PlaybackError::NoSequenceLoaded)?;
        Ok((state.current_index, sequence.len()))
    }

    fn report_exhausted(&self, verse: VerseKey, attempts: usize) {
        let message = PlaybackError::AllSourcesExhausted {
            verse: verse.to_string(),
            attempts,
        }
        .to_string();
        warn!(verse = %verse, attempts, "All audio sources failed for requested verse");
        self.inner.state.lock().error = Some(message);
        self.emit(SequenceEvent::SourcesExhausted {
            verse: verse.to_string(),
            attempts,
            user_initiated: true,
        });
    }

    fn announce_sequence(&self, sequence: &VerseSequence) {
        self.emit(SequenceEvent::Loaded {
            unit: sequence.unit().to_string(),
            verse_count: sequence.len(),
        });
        if !sequence.is_empty() {
            self.emit_position(sequence, 0);
        }
    }

    fn emit_position(&self, sequence: &VerseSequence, index: usize) {
        if let Some(verse) = sequence.get(index) {
            self.emit(SequenceEvent::PositionChanged {
                index,
                verse: verse.key.to_string(),
            });
        }
    }

    fn emit(&self, event: SequenceEvent) {
        self.inner.bus.emit(CoreEvent::Sequence(event)).ok();
    }
}

trait TakeIfRequest {
    fn take_if_request(&mut self, request: u64) -> Option<ActiveRequest>;
}

impl TakeIfRequest for Option<ActiveRequest> {
    fn take_if_request(&mut self, request: u64) -> Option<ActiveRequest> {
        match self {
            Some(active) if active.token.generation() == request => self.take(),
            _ => None,
        }
    }
}
