//! Autoplay progression end to end.

mod common;

use common::*;
use core_content::{AudioCandidate, UnitId, Verse, VerseKey};
use core_playback::{
    CandidateResolver, CdnSourceResolver, EngineState, SequencerOptions, SequencerOutcome,
    UnitNavigator,
};
use core_runtime::events::{CoreEvent, EventStream, PlaybackEvent, SequenceEvent};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex as StdMutex};
use std::time::Duration;

/// Default CDN candidates, except ayah 3 which has none.
struct GapResolver {
    inner: CdnSourceResolver,
}

impl CandidateResolver for GapResolver {
    fn resolve(&self, verse: &Verse, reciter: &str) -> core_playback::Result<Vec<AudioCandidate>> {
        if verse.key.ayah() == 3 {
            return Ok(Vec::new());
        }
        self.inner.resolve(verse, reciter)
    }
}

/// Default CDN candidates; the `hold_on`-th resolution of `held` blocks the
/// calling thread until [`HoldingResolver::release`].
struct HoldingResolver {
    inner: CdnSourceResolver,
    held: VerseKey,
    hold_on: usize,
    calls: AtomicUsize,
    entered: AtomicBool,
    release_tx: StdMutex<mpsc::Sender<()>>,
    release_rx: StdMutex<mpsc::Receiver<()>>,
}

impl HoldingResolver {
    fn new(held: VerseKey, hold_on: usize) -> Arc<Self> {
        let (release_tx, release_rx) = mpsc::channel();
        Arc::new(Self {
            inner: CdnSourceResolver::default(),
            held,
            hold_on,
            calls: AtomicUsize::new(0),
            entered: AtomicBool::new(false),
            release_tx: StdMutex::new(release_tx),
            release_rx: StdMutex::new(release_rx),
        })
    }

    fn is_holding(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.release_tx.lock().unwrap().send(()).unwrap();
    }
}

impl CandidateResolver for HoldingResolver {
    fn resolve(&self, verse: &Verse, reciter: &str) -> core_playback::Result<Vec<AudioCandidate>> {
        if verse.key == self.held && self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.hold_on {
            self.entered.store(true, Ordering::SeqCst);
            let _ = self.release_rx.lock().unwrap().recv();
        }
        self.inner.resolve(verse, reciter)
    }
}

fn drain_positions(events: &mut EventStream) -> Vec<usize> {
    let mut positions = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        if let CoreEvent::Sequence(SequenceEvent::PositionChanged { index, .. }) = event {
            positions.push(index);
        }
    }
    positions
}

#[tokio::test]
async fn al_fatiha_autoplays_into_al_baqarah() {
    let navigator = StaticNavigator::with(surah_sequence(2, 5));
    let h = harness(
        SequencerOptions {
            autoplay: true,
            autoplay_across_units: true,
        },
        Some(navigator.clone() as Arc<dyn UnitNavigator>),
    );
    let driver = h.sequencer.spawn_driver();
    let mut events = EventStream::new(h.bus.subscribe());

    h.sequencer.load_sequence(surah_sequence(1, 7)).await;
    let outcome = h.sequencer.play_from(0).await.unwrap();
    assert!(matches!(outcome, SequencerOutcome::Started { index: 0, .. }));
    assert_eq!(h.engine.state(), EngineState::Playing);

    for ayah in 1..=7 {
        play_through(&h.output, &primary_url(1, ayah)).await;
    }

    eventually("Al-Baqarah 2:1 playing", || {
        h.output.playing_urls() == vec![primary_url(2, 1)]
    })
    .await;

    let sequence = h.sequencer.sequence().unwrap();
    assert_eq!(sequence.unit(), UnitId::surah(2).unwrap());
    assert_eq!(h.sequencer.current_index(), 0);
    assert_eq!(navigator.requests(), vec![UnitId::surah(2).unwrap()]);
    assert!(h.output.max_concurrent_playing() <= 1);

    let mut saw_completed = false;
    let mut saw_advanced = false;
    let mut positions = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        match event {
            CoreEvent::Sequence(SequenceEvent::UnitCompleted { unit }) => {
                assert_eq!(unit, "surah:1");
                saw_completed = true;
            }
            CoreEvent::Sequence(SequenceEvent::UnitAdvanced { from, to }) => {
                assert_eq!((from.as_str(), to.as_str()), ("surah:1", "surah:2"));
                saw_advanced = true;
            }
            CoreEvent::Sequence(SequenceEvent::PositionChanged { index, .. }) if !saw_advanced => {
                positions.push(index);
            }
            _ => {}
        }
    }
    assert!(saw_completed && saw_advanced);
    // Monotonic within Al-Fatiha.
    assert!(positions.windows(2).all(|w| w[0] <= w[1]), "{positions:?}");
    assert_eq!(positions.last(), Some(&6));

    h.sequencer.shutdown();
    driver.await.unwrap();
}

#[tokio::test]
async fn autoplay_stops_at_unit_end_without_cross_unit() {
    let h = harness(SequencerOptions::default(), None);
    let driver = h.sequencer.spawn_driver();
    let mut events = EventStream::new(h.bus.subscribe())
        .filter(|event| matches!(event, CoreEvent::Sequence(SequenceEvent::UnitCompleted { .. })));

    h.sequencer.load_sequence(surah_sequence(112, 4)).await;
    h.sequencer.play_from(2).await.unwrap();
    play_through(&h.output, &primary_url(112, 3)).await;
    play_through(&h.output, &primary_url(112, 4)).await;

    let completed = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        completed,
        CoreEvent::Sequence(SequenceEvent::UnitCompleted { .. })
    ));
    assert_eq!(h.sequencer.current_index(), 3);
    assert!(h.output.playing_urls().is_empty());

    h.sequencer.shutdown();
    driver.await.unwrap();
}

#[tokio::test]
async fn toggling_autoplay_off_stops_immediately() {
    let h = harness(SequencerOptions::default(), None);
    let driver = h.sequencer.spawn_driver();

    h.sequencer.load_sequence(surah_sequence(1, 7)).await;
    h.sequencer.play_from(0).await.unwrap();
    for ayah in 1..=3 {
        play_through(&h.output, &primary_url(1, ayah)).await;
    }
    eventually("verse 4 playing", || h.output.playing_urls() == vec![primary_url(1, 4)]).await;
    assert_eq!(h.sequencer.current_index(), 3);

    h.sequencer.set_autoplay(false).await;

    assert!(h.output.playing_urls().is_empty());
    assert_eq!(h.engine.state(), EngineState::Idle);
    assert_eq!(h.sequencer.current_index(), 3);
    assert!(!h.sequencer.is_playing());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.sequencer.current_index(), 3);
    assert!(h.output.playing_urls().is_empty());

    h.sequencer.shutdown();
    driver.await.unwrap();
}

#[tokio::test]
async fn verse_without_audio_is_skipped() {
    let h = harness_with_resolver(
        Arc::new(GapResolver {
            inner: CdnSourceResolver::default(),
        }),
        SequencerOptions::default(),
        None,
    );
    let driver = h.sequencer.spawn_driver();
    let mut events = EventStream::new(h.bus.subscribe());

    h.sequencer.load_sequence(surah_sequence(1, 5)).await;
    h.sequencer.play_from(0).await.unwrap();

    play_through(&h.output, &primary_url(1, 1)).await;
    play_through(&h.output, &primary_url(1, 2)).await;
    play_through(&h.output, &primary_url(1, 4)).await;
    play_through(&h.output, &primary_url(1, 5)).await;
    eventually("autoplay finished", || h.engine.state() == EngineState::Ended).await;

    let positions = drain_positions(&mut events);
    // Loaded announces position 0 before play_from does.
    assert_eq!(positions, vec![0, 0, 1, 3, 4]);

    let verse_three = candidate_urls(1, 3);
    assert!(h.output.opens().iter().all(|(url, _)| !verse_three.contains(url)));
    assert!(h.http.heads().iter().all(|url| !verse_three.contains(url)));

    h.sequencer.shutdown();
    driver.await.unwrap();
}

#[tokio::test]
async fn autoplay_skips_verse_whose_sources_all_fail() {
    let h = harness(SequencerOptions::default(), None);
    let driver = h.sequencer.spawn_driver();
    let mut events = EventStream::new(h.bus.subscribe());
    for url in candidate_urls(1, 2) {
        h.output.fail_url(url);
    }

    h.sequencer.load_sequence(surah_sequence(1, 7)).await;
    h.sequencer.play_from(0).await.unwrap();
    play_through(&h.output, &primary_url(1, 1)).await;

    eventually("verse 3 playing", || h.output.playing_urls() == vec![primary_url(1, 3)]).await;
    assert_eq!(h.sequencer.current_index(), 2);
    // Autoplay failures are not shown to the user.
    assert_eq!(h.sequencer.error(), None);

    let mut skipped = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        match event {
            CoreEvent::Sequence(SequenceEvent::VerseSkipped { index, .. }) => skipped.push(index),
            CoreEvent::Sequence(SequenceEvent::SourcesExhausted { user_initiated, .. }) => {
                assert!(!user_initiated)
            }
            _ => {}
        }
    }
    assert_eq!(skipped, vec![1]);

    h.sequencer.shutdown();
    driver.await.unwrap();
}

#[tokio::test]
async fn stale_ended_event_is_ignored_after_manual_skip() {
    let h = harness(SequencerOptions::default(), None);
    let driver = h.sequencer.spawn_driver();

    h.sequencer.load_sequence(surah_sequence(1, 7)).await;
    h.sequencer.play_from(0).await.unwrap();
    let first_request = h.engine.current_generation();
    h.sequencer.play_from(4).await.unwrap();

    // A late `ended` for the first verse must not advance the position.
    h.bus
        .emit(CoreEvent::Playback(PlaybackEvent::Ended {
            request: first_request,
            verse: "1:1".to_string(),
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.sequencer.current_index(), 4);
    assert_eq!(h.output.playing_urls(), vec![primary_url(1, 5)]);

    h.sequencer.shutdown();
    driver.await.unwrap();
}

#[tokio::test]
async fn manual_select_without_autoplay_prepares_next_play() {
    let h = harness(
        SequencerOptions {
            autoplay: false,
            autoplay_across_units: false,
        },
        None,
    );
    h.sequencer.load_sequence(surah_sequence(1, 7)).await;

    let outcome = h.sequencer.on_manual_select(5).await.unwrap();
    assert_eq!(outcome, SequencerOutcome::Prepared { index: 5 });
    assert!(h.output.opens().is_empty());

    let index = h.sequencer.current_index();
    h.sequencer.play_from(index).await.unwrap();
    assert_eq!(h.output.playing_urls(), vec![primary_url(1, 6)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_autoplay_step_cannot_cancel_user_skip() {
    // Autoplay resolves 1:2 once to check for audio and again to play it;
    // hold the second call, after the step has already moved the position.
    let resolver = HoldingResolver::new(VerseKey::new(1, 2).unwrap(), 2);
    let h = harness_with_resolver(resolver.clone(), SequencerOptions::default(), None);
    let driver = h.sequencer.spawn_driver();

    h.sequencer.load_sequence(surah_sequence(1, 7)).await;
    h.sequencer.play_from(0).await.unwrap();
    play_through(&h.output, &primary_url(1, 1)).await;
    eventually("autoplay step holding on 1:2", || resolver.is_holding()).await;

    let outcome = h.sequencer.play_from(5).await.unwrap();
    assert!(matches!(outcome, SequencerOutcome::Started { index: 5, .. }));

    resolver.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.output.playing_urls(), vec![primary_url(1, 6)]);
    assert_eq!(h.sequencer.current_index(), 5);

    // The skipped-to verse still drives autoplay when it ends.
    play_through(&h.output, &primary_url(1, 6)).await;
    eventually("1:7 playing", || h.output.playing_urls() == vec![primary_url(1, 7)]).await;
    assert_eq!(h.sequencer.current_index(), 6);
    assert!(h.output.max_concurrent_playing() <= 1);

    h.sequencer.shutdown();
    driver.await.unwrap();
}
