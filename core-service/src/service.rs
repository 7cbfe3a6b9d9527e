//! The recitation service.

use crate::error::{CoreError, Result};
use crate::navigator::ContentNavigator;
use core_async::task::JoinHandle;
use core_content::{AlQuranCloudClient, ContentApi, UnitId, Verse, VerseSequence};
use core_playback::{
    AudioSourceConfig, CdnSourceResolver, FallbackCoordinator, FallbackOutcome, PlaybackConfig,
    PlaybackEngine, PlaybackSnapshot, MediaValidator, Sequencer, SequencerOptions,
    SequencerOutcome, UnitNavigator,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument};

/// Builder for [`RecitationService`].
///
/// ```no_run
/// # async fn example(config: core_runtime::config::CoreConfig) -> core_service::Result<()> {
/// use core_service::ServiceBuilder;
///
/// let service = ServiceBuilder::new(config).build()?;
/// service.start()?;
/// service.load_unit(core_content::UnitId::surah(1)?).await?;
/// service.play().await?;
/// # Ok(())
/// # }
/// ```
pub struct ServiceBuilder {
    config: CoreConfig,
    audio_sources: AudioSourceConfig,
    playback: PlaybackConfig,
    content_api: Option<Arc<dyn ContentApi>>,
    event_buffer: usize,
}

impl ServiceBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            audio_sources: AudioSourceConfig::default(),
            playback: PlaybackConfig::default(),
            content_api: None,
            event_buffer: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }

    pub fn audio_sources(mut self, config: AudioSourceConfig) -> Self {
        self.audio_sources = config;
        self
    }

    pub fn playback(mut self, config: PlaybackConfig) -> Self {
        self.playback = config;
        self
    }

    /// Replace the alquran.cloud client, e.g. with a bundled offline source.
    pub fn content_api(mut self, api: Arc<dyn ContentApi>) -> Self {
        self.content_api = Some(api);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn build(self) -> Result<RecitationService> {
        self.config.validate()?;
        self.audio_sources
            .validate()
            .map_err(|e| CoreError::InitializationFailed(format!("audio sources: {}", e)))?;
        self.playback
            .validate()
            .map_err(|e| CoreError::InitializationFailed(format!("playback: {}", e)))?;
        if self.event_buffer == 0 {
            return Err(CoreError::InitializationFailed(
                "event buffer must be > 0".to_string(),
            ));
        }

        let config = self.config;
        let api: Arc<dyn ContentApi> = match self.content_api {
            Some(api) => api,
            None => Arc::new(
                AlQuranCloudClient::new(
                    Arc::clone(&config.http_client),
                    config.content_api.base_url.clone(),
                )
                .with_timeout(config.content_api.request_timeout),
            ),
        };

        let translation = config
            .features
            .show_translation
            .then(|| config.content_api.translation_edition.clone());
        let navigator = Arc::new(ContentNavigator::new(
            api,
            config.content_api.arabic_edition.clone(),
            translation,
        ));

        let bus = EventBus::new(self.event_buffer);
        let engine = PlaybackEngine::new(
            Arc::clone(&config.audio_output),
            bus.clone(),
            self.playback.clone(),
        );
        let validator = Arc::new(MediaValidator::new(
            Arc::clone(&config.http_client),
            Arc::clone(&config.audio_output),
            self.playback,
        ));
        let resolver = Arc::new(CdnSourceResolver::new(self.audio_sources));
        let fallback = FallbackCoordinator::new(resolver, validator, engine.clone());
        let sequencer = Sequencer::new(
            fallback,
            bus.clone(),
            config.reciter.clone(),
            SequencerOptions {
                autoplay: config.features.autoplay,
                autoplay_across_units: config.features.autoplay_across_units,
            },
            Some(Arc::clone(&navigator) as Arc<dyn UnitNavigator>),
        );

        info!(reciter = %config.reciter, "Recitation service ready");
        Ok(RecitationService {
            bus,
            engine,
            sequencer,
            navigator,
            driver: Mutex::new(None),
        })
    }
}

/// Facade over content loading, playback and autoplay.
///
/// Call [`RecitationService::start`] once from inside the async runtime
/// before playing so that natural verse ends drive autoplay.
pub struct RecitationService {
    bus: EventBus,
    engine: PlaybackEngine,
    sequencer: Sequencer,
    navigator: Arc<ContentNavigator>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl RecitationService {
    /// Service with the given CDN layout and time budgets.
    pub fn new(
        config: CoreConfig,
        audio_sources: AudioSourceConfig,
        playback: PlaybackConfig,
    ) -> Result<Self> {
        ServiceBuilder::new(config)
            .audio_sources(audio_sources)
            .playback(playback)
            .build()
    }

    pub fn builder(config: CoreConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    /// Start the autoplay driver. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`CoreError::InitializationFailed`] outside an async runtime.
    pub fn start(&self) -> Result<()> {
        if !core_async::runtime::in_runtime() {
            return Err(CoreError::InitializationFailed(
                "start() must be called from inside an async runtime".to_string(),
            ));
        }

        let mut driver = self.driver.lock();
        if driver.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return Ok(());
        }
        *driver = Some(self.sequencer.spawn_driver());
        Ok(())
    }

    /// Stop audio and the autoplay driver.
    pub async fn shutdown(&self) {
        self.sequencer.shutdown();
        self.sequencer.stop().await;
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Fetch `unit` and make it the current sequence. Returns its verse count.
    #[instrument(skip(self, unit), fields(unit = %unit))]
    pub async fn load_unit(&self, unit: UnitId) -> Result<usize> {
        let sequence = self.navigator.fetch(unit).await?;
        let len = sequence.len();
        self.sequencer.load_sequence(sequence).await;
        Ok(len)
    }

    /// Use an already built sequence.
    pub async fn load_sequence(&self, sequence: VerseSequence) {
        self.sequencer.load_sequence(sequence).await;
    }

    /// Play from the current position, or resume when paused.
    #[instrument(skip(self))]
    pub async fn play(&self) -> Result<SequencerOutcome> {
        if self.sequencer.resume().await? {
            return Ok(SequencerOutcome::Started {
                index: self.sequencer.current_index(),
                candidate_index: self.engine.snapshot().candidate_index.unwrap_or(0),
            });
        }
        let index = self.sequencer.current_index();
        Ok(self.sequencer.play_from(index).await?)
    }

    /// Play the verse at `index` of the current sequence.
    pub async fn play_verse(&self, index: usize) -> Result<SequencerOutcome> {
        Ok(self.sequencer.play_from(index).await?)
    }

    /// Play a single verse outside any sequence. Autoplay does not follow it.
    ///
    /// When no source plays, [`RecitationService::error_message`] is set.
    pub async fn play_single(&self, verse: &Verse) -> Result<FallbackOutcome> {
        Ok(self.sequencer.play_single(verse).await?)
    }

    /// Highlight a verse; plays it only while autoplay is engaged.
    pub async fn select_verse(&self, index: usize) -> Result<SequencerOutcome> {
        Ok(self.sequencer.on_manual_select(index).await?)
    }

    pub async fn pause(&self) -> Result<bool> {
        Ok(self.sequencer.pause().await?)
    }

    pub async fn resume(&self) -> Result<bool> {
        Ok(self.sequencer.resume().await?)
    }

    pub async fn stop(&self) {
        self.sequencer.stop().await;
    }

    pub async fn skip_next(&self) -> Result<SequencerOutcome> {
        Ok(self.sequencer.skip_next().await?)
    }

    pub async fn skip_previous(&self) -> Result<SequencerOutcome> {
        Ok(self.sequencer.skip_previous().await?)
    }

    /// Flip autoplay and return the new setting.
    ///
    /// Turning it off stops audio at once. Turning it on while nothing plays
    /// starts from the current verse.
    #[instrument(skip(self))]
    pub async fn toggle_autoplay(&self) -> Result<bool> {
        let enabled = !self.sequencer.autoplay();
        self.sequencer.set_autoplay(enabled).await;

        if enabled && !self.engine.is_active() && self.sequencer.sequence().is_some() {
            let index = self.sequencer.current_index();
            self.sequencer.play_from(index).await?;
        }
        Ok(enabled)
    }

    pub fn autoplay(&self) -> bool {
        self.sequencer.autoplay()
    }

    pub fn set_autoplay_across_units(&self, enabled: bool) {
        self.sequencer.set_autoplay_across_units(enabled);
    }

    pub fn current_index(&self) -> usize {
        self.sequencer.current_index()
    }

    pub fn current_verse(&self) -> Option<Verse> {
        self.sequencer.current_verse()
    }

    pub fn sequence(&self) -> Option<Arc<VerseSequence>> {
        self.sequencer.sequence()
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn playback_snapshot(&self) -> PlaybackSnapshot {
        self.engine.snapshot()
    }

    /// Message for a requested verse that could not be played, until dismissed.
    pub fn error_message(&self) -> Option<String> {
        self.sequencer.error()
    }

    pub fn dismiss_error(&self) {
        self.sequencer.dismiss_error();
    }

    /// Subscribe to playback and sequence events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.bus.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}
