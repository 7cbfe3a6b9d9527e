//! Shared fakes for the playback integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::playback::{
    AudioOutput, AudioSource, MediaEvent, MediaEventSender, MediaHandle, OpenedMedia, Preload,
};
use bytes::Bytes;
use core_content::{ContentError, UnitId, Verse, VerseKey, VerseSequence};
use core_playback::{
    AudioSourceConfig, CandidateResolver, CdnSourceResolver, FallbackCoordinator, PlaybackConfig,
    PlaybackEngine, MediaValidator, Sequencer, SequencerOptions, UnitNavigator,
};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fake audio output
// ============================================================================

struct OpenHandle {
    url: String,
    sender: MediaEventSender,
}

#[derive(Default)]
struct OutputState {
    handles: HashMap<MediaHandle, OpenHandle>,
    playing: Vec<(MediaHandle, String)>,
    max_playing: usize,
    opens: Vec<(String, Preload)>,
    released: Vec<MediaHandle>,
}

/// Media-element stand-in. URLs can be scripted to fail or to load slowly;
/// tests end playback with [`FakeAudioOutput::finish`].
#[derive(Default)]
pub struct FakeAudioOutput {
    state: Mutex<OutputState>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Mutex<Option<Duration>>,
}

impl FakeAudioOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_url(&self, url: impl Into<String>) {
        self.failing.lock().insert(url.into());
    }

    pub fn delay_url(&self, url: impl Into<String>, delay: Duration) {
        self.delays.lock().insert(url.into(), delay);
    }

    pub fn delay_all(&self, delay: Duration) {
        *self.default_delay.lock() = Some(delay);
    }

    /// URLs currently audible.
    pub fn playing_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .playing
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn max_concurrent_playing(&self) -> usize {
        self.state.lock().max_playing
    }

    /// Every `open` call so far, in order.
    pub fn opens(&self) -> Vec<(String, Preload)> {
        self.state.lock().opens.clone()
    }

    pub fn open_count(&self, url: &str, preload: Preload) -> usize {
        self.state
            .lock()
            .opens
            .iter()
            .filter(|(u, p)| u == url && *p == preload)
            .count()
    }

    pub fn released_count(&self) -> usize {
        self.state.lock().released.len()
    }

    pub fn open_handle_count(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// End the audible handle playing `url` naturally.
    pub fn finish(&self, url: &str) -> bool {
        self.signal(url, MediaEvent::Ended)
    }

    /// Fail the audible handle playing `url` mid-stream.
    pub fn interrupt(&self, url: &str, message: &str) -> bool {
        self.signal(
            url,
            MediaEvent::Error {
                message: message.to_string(),
            },
        )
    }

    fn signal(&self, url: &str, event: MediaEvent) -> bool {
        let mut state = self.state.lock();
        let Some(position) = state.playing.iter().position(|(_, u)| u == url) else {
            return false;
        };
        let (handle, _) = state.playing.remove(position);
        match state.handles.get(&handle) {
            Some(open) => open.sender.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AudioOutput for FakeAudioOutput {
    async fn open(&self, source: AudioSource, preload: Preload) -> BridgeResult<OpenedMedia> {
        self.state.lock().opens.push((source.url.clone(), preload));

        let delay = self
            .delays
            .lock()
            .get(&source.url)
            .copied()
            .or(*self.default_delay.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&source.url) {
            return Err(BridgeError::Media(format!("cannot load {}", source.url)));
        }

        let (opened, sender) = OpenedMedia::channel();
        self.state.lock().handles.insert(
            opened.handle,
            OpenHandle {
                url: source.url,
                sender,
            },
        );
        Ok(opened)
    }

    async fn play(&self, handle: MediaHandle) -> BridgeResult<()> {
        let mut state = self.state.lock();
        let url = state
            .handles
            .get(&handle)
            .map(|open| open.url.clone())
            .ok_or_else(|| BridgeError::Media("unknown handle".to_string()))?;
        if !state.playing.iter().any(|(h, _)| *h == handle) {
            state.playing.push((handle, url));
        }
        state.max_playing = state.max_playing.max(state.playing.len());
        Ok(())
    }

    async fn pause(&self, handle: MediaHandle) -> BridgeResult<()> {
        self.state.lock().playing.retain(|(h, _)| *h != handle);
        Ok(())
    }

    async fn stop(&self, handle: MediaHandle) -> BridgeResult<()> {
        self.state.lock().playing.retain(|(h, _)| *h != handle);
        Ok(())
    }

    async fn release(&self, handle: MediaHandle) -> BridgeResult<()> {
        let mut state = self.state.lock();
        state.playing.retain(|(h, _)| *h != handle);
        state.handles.remove(&handle);
        state.released.push(handle);
        Ok(())
    }
}

// ============================================================================
// Fake HTTP client (existence checks)
// ============================================================================

/// Answers `HEAD` with 404 for scripted URLs and 200 otherwise.
#[derive(Default)]
pub struct FakeHttp {
    missing: Mutex<HashSet<String>>,
    heads: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn missing(&self, url: impl Into<String>) {
        self.missing.lock().insert(url.into());
    }

    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        if request.method == HttpMethod::Head {
            self.heads.lock().push(request.url.clone());
        }
        let status = if self.missing.lock().contains(&request.url) {
            404
        } else {
            200
        };
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        })
    }
}

// ============================================================================
// Navigator and sequences
// ============================================================================

/// Serves prebuilt sequences by unit.
#[derive(Default)]
pub struct StaticNavigator {
    units: Mutex<HashMap<UnitId, VerseSequence>>,
    requests: Mutex<Vec<UnitId>>,
}

impl StaticNavigator {
    pub fn with(sequence: VerseSequence) -> Arc<Self> {
        let navigator = Self::default();
        navigator.units.lock().insert(sequence.unit(), sequence);
        Arc::new(navigator)
    }

    pub fn requests(&self) -> Vec<UnitId> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl UnitNavigator for StaticNavigator {
    async fn load_unit(&self, unit: UnitId) -> core_playback::Result<VerseSequence> {
        self.requests.lock().push(unit);
        self.units
            .lock()
            .get(&unit)
            .cloned()
            .ok_or_else(|| {
                core_playback::PlaybackError::Content(ContentError::Api {
                    status: 404,
                    message: format!("no fixture for {}", unit),
                })
            })
    }
}

/// The first `ayat` verses of `surah` as a surah-level sequence.
pub fn surah_sequence(surah: u16, ayat: u16) -> VerseSequence {
    let verses = (1..=ayat)
        .map(|ayah| Verse::new(VerseKey::new(surah, ayah).unwrap(), format!("{}:{}", surah, ayah)))
        .collect();
    VerseSequence::new(UnitId::surah(surah).unwrap(), verses)
}

/// Candidate URLs the default resolver produces for `surah:ayah`.
pub fn candidate_urls(surah: u16, ayah: u16) -> Vec<String> {
    CdnSourceResolver::default()
        .resolve_identity(surah, ayah, RECITER)
        .unwrap()
        .into_iter()
        .map(|c| c.url)
        .collect()
}

/// Primary candidate for `surah:ayah`.
pub fn primary_url(surah: u16, ayah: u16) -> String {
    candidate_urls(surah, ayah).remove(0)
}

pub const RECITER: &str = "ar.alafasy";

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub output: Arc<FakeAudioOutput>,
    pub http: Arc<FakeHttp>,
    pub bus: EventBus,
    pub engine: PlaybackEngine,
    pub fallback: FallbackCoordinator,
    pub sequencer: Sequencer,
}

pub fn harness(options: SequencerOptions, navigator: Option<Arc<dyn UnitNavigator>>) -> Harness {
    harness_with_resolver(
        Arc::new(CdnSourceResolver::new(AudioSourceConfig::default())),
        options,
        navigator,
    )
}

pub fn harness_with_resolver(
    resolver: Arc<dyn CandidateResolver>,
    options: SequencerOptions,
    navigator: Option<Arc<dyn UnitNavigator>>,
) -> Harness {
    let output = FakeAudioOutput::new();
    let http = FakeHttp::new();
    let bus = EventBus::new(1024);
    let config = PlaybackConfig::fast();

    let engine = PlaybackEngine::new(output.clone(), bus.clone(), config.clone());
    let validator = Arc::new(MediaValidator::new(http.clone(), output.clone(), config));
    let fallback = FallbackCoordinator::new(resolver, validator, engine.clone());
    let sequencer = Sequencer::new(fallback.clone(), bus.clone(), RECITER, options, navigator);

    Harness {
        output,
        http,
        bus,
        engine,
        fallback,
        sequencer,
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until `url` is audible, then end it.
pub async fn play_through(output: &FakeAudioOutput, url: &str) {
    eventually(&format!("{} playing", url), || {
        output.playing_urls().iter().any(|u| u == url)
    })
    .await;
    assert!(output.finish(url), "{} was not playing", url);
}
