//! # Event Bus System
//!
//! Provides an event-driven architecture for the sync core using
//! `tokio::sync::broadcast`. Adapters and the message consumer publish typed
//! events; hosts subscribe to drive dashboards, cache invalidation or alerts.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps one enum per domain
//! - **EventBus**: central broadcast channel
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Media(MediaEvent::Removed { external_id: 42 }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Media removed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: all senders were dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns an error which publishers ignore.

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

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Image media synchronization events
    Media(MediaEvent),
    /// Taxon to category synchronization events
    Taxon(TaxonEvent),
    /// Message consumer lifecycle events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Media(e) => e.description(),
            CoreEvent::Taxon(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::MessageFailed { retryable: false, .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Sync(SyncEvent::MessageFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Media(MediaEvent::Unchanged { .. }) => EventSeverity::Debug,
            CoreEvent::Sync(SyncEvent::MessageHandled { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
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
// Media Events
// ============================================================================

/// Events emitted after an image message was committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MediaEvent {
    /// First synchronization of an external image created a media entity.
    Created {
        external_id: i64,
        media_id: String,
    },
    /// A new file version was appended.
    VersionAdded {
        external_id: i64,
        media_id: String,
        version: i64,
        size: i64,
    },
    /// The remote image had the same size as the latest version.
    Unchanged { external_id: i64 },
    /// The media and everything it owns was deleted.
    Removed { external_id: i64 },
}

impl MediaEvent {
    fn description(&self) -> &str {
        match self {
            MediaEvent::Created { .. } => "Media created",
            MediaEvent::VersionAdded { .. } => "Media version added",
            MediaEvent::Unchanged { .. } => "Media unchanged",
            MediaEvent::Removed { .. } => "Media removed",
        }
    }
}

// ============================================================================
// Taxon Events
// ============================================================================

/// Events emitted after a taxon message was committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TaxonEvent {
    /// A taxon (and possibly its subtree) was mirrored into categories.
    Synchronized {
        external_id: i64,
        /// Number of categories created or updated
        categories: usize,
    },
    /// The category tree rooted at the taxon was deleted.
    Removed { external_id: i64 },
}

impl TaxonEvent {
    fn description(&self) -> &str {
        match self {
            TaxonEvent::Synchronized { .. } => "Taxon synchronized",
            TaxonEvent::Removed { .. } => "Taxon removed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Message consumer events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A message was handled and its unit of work committed.
    MessageHandled { kind: String, id: i64 },
    /// A message failed; its staged writes were discarded.
    MessageFailed {
        kind: String,
        id: i64,
        error: String,
        /// Whether the bus should redeliver the message
        retryable: bool,
    },
    /// A batch of messages was committed in one unit of work.
    BatchCommitted { messages: usize },
    /// The consumer loop exited.
    ConsumerStopped { handled: u64, failed: u64 },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::MessageHandled { .. } => "Message handled",
            SyncEvent::MessageFailed { .. } => "Message failed",
            SyncEvent::BatchCommitted { .. } => "Batch committed",
            SyncEvent::ConsumerStopped { .. } => "Consumer stopped",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Clone it to get more producers; each `subscribe()` creates an independent
/// receiver that sees all future events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers falling behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
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

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
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
/// let media_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Media(_)));
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

    /// Only events matching `predicate` are returned by `recv()`.
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
