//! # Event Bus System
//!
//! Event-driven communication between the playback engine, the sequencer and
//! the host UI, built on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: typed enums for playback and sequence events
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit    ┌───────────┐
//! │ PlaybackEngine ├──────────>│           │   subscribe   ┌────────────┐
//! └────────────────┘           │ EventBus  ├──────────────>│ Sequencer  │
//!                              │ (broadcast│               └────────────┘
//! ┌────────────────┐   emit    │  channel) │   subscribe   ┌────────────┐
//! │   Sequencer    ├──────────>│           ├──────────────>│  Host UI   │
//! └────────────────┘           └───────────┘               └────────────┘
//! ```
//!
//! The sequencer is itself a subscriber: it advances autoplay when it sees
//! [`PlaybackEvent::Ended`] for the request it currently owns.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SequenceEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sequence(SequenceEvent::AutoplayChanged { enabled: true }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Autoplay toggled");
//! # }
//! ```
//!
//! ## Request identifiers
//!
//! Every playback event carries the `request` generation that produced it.
//! Consumers compare it with the generation they are waiting on and drop
//! anything older, so a late `Ended` from a superseded verse never advances
//! the sequence.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: all senders dropped. Treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Single-verse playback lifecycle
    Playback(PlaybackEvent),
    /// Sequence position and autoplay lifecycle
    Sequence(SequenceEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Sequence(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sequence(SequenceEvent::SourcesExhausted {
                user_initiated: true,
                ..
            }) => EventSeverity::Error,
            CoreEvent::Sequence(SequenceEvent::SourcesExhausted { .. })
            | CoreEvent::Sequence(SequenceEvent::VerseSkipped { .. })
            | CoreEvent::Playback(PlaybackEvent::Error { .. })
            | CoreEvent::Playback(PlaybackEvent::Interrupted { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. })
            | CoreEvent::Sequence(SequenceEvent::UnitCompleted { .. })
            | CoreEvent::Sequence(SequenceEvent::UnitAdvanced { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Request generation for playback events, `None` for sequence events.
    pub fn request(&self) -> Option<u64> {
        match self {
            CoreEvent::Playback(e) => Some(e.request()),
            CoreEvent::Sequence(_) => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Lifecycle of a single verse recording.
///
/// Verses are identified in `surah:ayah` form, e.g. `"2:255"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A candidate is being opened.
    Loading {
        request: u64,
        verse: String,
        url: String,
        candidate_index: usize,
    },
    /// Audio is audible.
    Started {
        request: u64,
        verse: String,
        url: String,
        candidate_index: usize,
    },
    Paused {
        request: u64,
        verse: String,
    },
    Resumed {
        request: u64,
        verse: String,
    },
    /// Playback was stopped on request. `verse` is `None` when nothing was loaded.
    Stopped {
        request: u64,
        verse: Option<String>,
    },
    /// The recording played to its natural end.
    Ended {
        request: u64,
        verse: String,
    },
    /// A candidate failed to load. The caller may still try the next one.
    Error {
        request: u64,
        verse: String,
        url: String,
        message: String,
    },
    /// An already playing candidate failed mid-stream.
    Interrupted {
        request: u64,
        verse: String,
        candidate_index: usize,
        message: String,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Loading { .. } => "Loading recitation",
            PlaybackEvent::Started { .. } => "Recitation started",
            PlaybackEvent::Paused { .. } => "Recitation paused",
            PlaybackEvent::Resumed { .. } => "Recitation resumed",
            PlaybackEvent::Stopped { .. } => "Recitation stopped",
            PlaybackEvent::Ended { .. } => "Recitation ended",
            PlaybackEvent::Error { .. } => "Audio source failed to load",
            PlaybackEvent::Interrupted { .. } => "Recitation interrupted",
        }
    }

    /// Generation of the play request that produced this event.
    pub fn request(&self) -> u64 {
        match self {
            PlaybackEvent::Loading { request, .. }
            | PlaybackEvent::Started { request, .. }
            | PlaybackEvent::Paused { request, .. }
            | PlaybackEvent::Resumed { request, .. }
            | PlaybackEvent::Stopped { request, .. }
            | PlaybackEvent::Ended { request, .. }
            | PlaybackEvent::Error { request, .. }
            | PlaybackEvent::Interrupted { request, .. } => *request,
        }
    }
}

// ============================================================================
// Sequence Events
// ============================================================================

/// Position, autoplay and unit navigation within a loaded verse sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SequenceEvent {
    /// A new unit was loaded and the position reset.
    Loaded {
        unit: String,
        verse_count: usize,
    },
    /// The highlighted verse changed.
    PositionChanged {
        index: usize,
        verse: String,
    },
    /// Autoplay passed over a verse it could not play.
    VerseSkipped {
        index: usize,
        verse: String,
        reason: String,
    },
    /// Every candidate for a verse failed.
    SourcesExhausted {
        verse: String,
        attempts: usize,
        /// `true` when the user asked for this verse directly; only then is an
        /// error surfaced.
        user_initiated: bool,
    },
    /// Autoplay reached the last verse of the unit.
    UnitCompleted {
        unit: String,
    },
    /// Autoplay crossed into the following unit.
    UnitAdvanced {
        from: String,
        to: String,
    },
    AutoplayChanged {
        enabled: bool,
    },
}

impl SequenceEvent {
    fn description(&self) -> &str {
        match self {
            SequenceEvent::Loaded { .. } => "Verse sequence loaded",
            SequenceEvent::PositionChanged { .. } => "Current verse changed",
            SequenceEvent::VerseSkipped { .. } => "Verse skipped",
            SequenceEvent::SourcesExhausted { .. } => "All audio sources failed",
            SequenceEvent::UnitCompleted { .. } => "Unit completed",
            SequenceEvent::UnitAdvanced { .. } => "Advanced to next unit",
            SequenceEvent::AutoplayChanged { .. } => "Autoplay toggled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning the bus is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let playback_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playback(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
