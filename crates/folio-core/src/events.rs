//! Typed domain event bus.
//!
//! Listeners register bounded inboxes at process start; `emit` fans out with
//! `try_send` so a slow listener drops events instead of stalling the emitter.

use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// Inbox depth per subscriber.
const INBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct ContentEvent {
    pub id: String,
    pub content_type: String,
    pub slug: String,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub visitor_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageEvent {
    pub session_id: String,
    pub role: String,
    pub tokens_used: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitEvent {
    pub ip_hash: String,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitEvent {
    pub name: String,
    pub previous_state: String,
    pub new_state: String,
    pub failure_count: u32,
}

/// Every event the process emits, with its payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    ContentCreated(ContentEvent),
    ContentUpdated(ContentEvent),
    ContentDeleted(ContentEvent),
    ContentRestored(ContentEvent),
    ChatSessionStarted(SessionEvent),
    ChatMessageSent(MessageEvent),
    ChatSessionEnded(SessionEvent),
    ChatRateLimited(RateLimitEvent),
    CircuitStateChanged(CircuitEvent),
}

impl Event {
    /// Wire name of the event, e.g. `content:created`.
    pub fn key(&self) -> &'static str {
        match self {
            Event::ContentCreated(_) => "content:created",
            Event::ContentUpdated(_) => "content:updated",
            Event::ContentDeleted(_) => "content:deleted",
            Event::ContentRestored(_) => "content:restored",
            Event::ChatSessionStarted(_) => "chat:session_started",
            Event::ChatMessageSent(_) => "chat:message_sent",
            Event::ChatSessionEnded(_) => "chat:session_ended",
            Event::ChatRateLimited(_) => "chat:rate_limited",
            Event::CircuitStateChanged(_) => "circuit:state_changed",
        }
    }
}

/// Fan-out bus for domain events.
pub struct EventBus {
    inboxes: RwLock<Vec<mpsc::Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inboxes: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener inbox. The caller owns the receiving end and
    /// drains it on its own task.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inboxes.write().unwrap().push(tx);
        rx
    }

    /// Deliver an event to every live listener. Never blocks: full or closed
    /// inboxes drop the event for that listener.
    pub fn emit(&self, event: Event) {
        let inboxes = self.inboxes.read().unwrap();
        for tx in inboxes.iter() {
            if let Err(e) = tx.try_send(event.clone()) {
                warn!(event = event.key(), error = %e, "event listener inbox unavailable");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::ContentCreated(ContentEvent {
            id: "content_abc".to_string(),
            content_type: "project".to_string(),
            slug: "demo".to_string(),
            version: 1,
        })
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(sample_event());

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.key(), "content:created");
    }

    #[tokio::test]
    async fn all_subscribers_receive_fan_out() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(sample_event());

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit(sample_event());
    }

    #[test]
    fn event_keys_are_stable() {
        let circuit = Event::CircuitStateChanged(CircuitEvent {
            name: "openai".to_string(),
            previous_state: "closed".to_string(),
            new_state: "open".to_string(),
            failure_count: 3,
        });
        assert_eq!(circuit.key(), "circuit:state_changed");

        let limited = Event::ChatRateLimited(RateLimitEvent {
            ip_hash: "abc".to_string(),
            retry_after_secs: 2,
        });
        assert_eq!(limited.key(), "chat:rate_limited");
    }
}
