//! # Event Bus System
//!
//! Typed notifications from the task queue, the library synchronizer and the
//! media cache, delivered over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: one enum per emitting domain wrapped in [`CoreEvent`]
//! - **EventBus**: cloneable broadcast sender
//! - **EventStream**: receiver wrapper with an optional filter
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Task Queue  ├──────────────>│           │
//! └─────────────┘               │           │     subscribe    ┌────────────┐
//! ┌─────────────┐     emit      │ EventBus  ├─────────────────>│ Subscriber │
//! │ Synchronizer├──────────────>│           │                  └────────────┘
//! └─────────────┘               │           │     subscribe    ┌────────────┐
//! ┌─────────────┐     emit      │           ├─────────────────>│ Subscriber │
//! │ Media Cache ├──────────────>│           │                  └────────────┘
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Sync(_)));
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     provider: "bandcamp".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Library sync started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat it as shutdown.
//!
//! Producers ignore the result of [`EventBus::emit`]; having no subscribers is
//! normal.

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

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Task(TaskEvent),
    Sync(SyncEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Task(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Task(TaskEvent::Settled { state, .. }) if state == "failed" => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Sync(SyncEvent::Started { .. })
            | CoreEvent::Library(LibraryEvent::Reset) => EventSeverity::Info,
            _ => EventSeverity::Debug,
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
// Task Events
// ============================================================================

/// Lifecycle notifications from a task queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TaskEvent {
    /// A task was added to the queue and started.
    Enqueued {
        task_id: String,
        name: String,
        tag: String,
    },
    /// A task reached a terminal state and left the queue.
    Settled {
        task_id: String,
        name: String,
        tag: String,
        /// Terminal state name: `completed`, `failed` or `cancelled`.
        state: String,
    },
}

impl TaskEvent {
    fn description(&self) -> &str {
        match self {
            TaskEvent::Enqueued { .. } => "Task enqueued",
            TaskEvent::Settled { .. } => "Task settled",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while a provider library is copied into the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        provider: String,
    },
    /// A page was fetched and committed.
    Progress {
        provider: String,
        /// Provider-reported progress in `0.0..=1.0`.
        progress: f64,
        /// Items cached so far in this run.
        items_cached: u64,
    },
    Completed {
        provider: String,
        items_cached: u64,
        duration_ms: u64,
    },
    Failed {
        provider: String,
        message: String,
        items_cached: u64,
    },
    Cancelled {
        provider: String,
        items_cached: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Library sync started",
            SyncEvent::Progress { .. } => "Library sync in progress",
            SyncEvent::Completed { .. } => "Library sync completed",
            SyncEvent::Failed { .. } => "Library sync failed",
            SyncEvent::Cancelled { .. } => "Library sync cancelled",
        }
    }

    /// Provider the event belongs to.
    pub fn provider(&self) -> &str {
        match self {
            SyncEvent::Started { provider }
            | SyncEvent::Progress { provider, .. }
            | SyncEvent::Completed { provider, .. }
            | SyncEvent::Failed { provider, .. }
            | SyncEvent::Cancelled { provider, .. } => provider,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Changes committed to the media cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A write transaction committed.
    ItemsCached {
        /// Entity kind written (`tracks`, `albums`, `libraryItems`, ...).
        kind: String,
        count: u64,
    },
    /// Every table was purged and re-created.
    Reset,
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::ItemsCached { .. } => "Items cached",
            LibraryEvent::Reset => "Media cache reset",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every [`subscribe`](Self::subscribe)
/// call creates an independent receiver that sees events emitted after it.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers reached, or an error when there are
    /// none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

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

/// A `broadcast::Receiver` with an optional filter.
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

    /// Returns `None` if no matching event is currently buffered.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn started(provider: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            provider: provider.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::default();
        assert!(bus.emit(started("bandcamp")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(started("bandcamp")).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), started("bandcamp"));
        assert_eq!(sub2.recv().await.unwrap(), started("bandcamp"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Library(_)));

        bus.emit(started("bandcamp")).unwrap();
        bus.emit(CoreEvent::Task(TaskEvent::Enqueued {
            task_id: "t1".to_string(),
            name: "sync:bandcamp".to_string(),
            tag: "sync:bandcamp".to_string(),
        }))
        .unwrap();
        bus.emit(CoreEvent::Library(LibraryEvent::Reset)).unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event, CoreEvent::Library(LibraryEvent::Reset));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for i in 0..5 {
            bus.emit(started(&format!("p{}", i))).unwrap();
        }

        match stream.try_recv() {
            Some(Err(RecvError::Lagged(n))) => assert_eq!(n, 3),
            other => panic!("expected lag, got {:?}", other),
        }
        assert_eq!(stream.try_recv().unwrap().unwrap(), started("p3"));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            provider: "bandcamp".to_string(),
            message: "rate limited".to_string(),
            items_cached: 12,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let settled = CoreEvent::Task(TaskEvent::Settled {
            task_id: "t1".to_string(),
            name: "sync:all".to_string(),
            tag: "sync:all".to_string(),
            state: "failed".to_string(),
        });
        assert_eq!(settled.severity(), EventSeverity::Warning);

        assert_eq!(started("bandcamp").severity(), EventSeverity::Info);
        assert!(EventSeverity::Error > EventSeverity::Debug);
    }

    #[test]
    fn test_sync_event_provider() {
        let progress = SyncEvent::Progress {
            provider: "youtube".to_string(),
            progress: 0.5,
            items_cached: 100,
        };
        assert_eq!(progress.provider(), "youtube");
        assert_eq!(progress.description(), "Library sync in progress");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Library(LibraryEvent::ItemsCached {
            kind: "tracks".to_string(),
            count: 3,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Library");
        assert_eq!(json["payload"]["event"], "ItemsCached");
        assert_eq!(json["payload"]["count"], 3);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
