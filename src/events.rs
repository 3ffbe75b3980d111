//! In-process event fan-out.
//!
//! Subscribers register per topic; `emit` calls them synchronously on the
//! emitting task, in registration order. Late subscribers do not see
//! earlier events.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SessionError;
use crate::terminal::TerminalSize;

/// Topic carrying [`TerminalEvent`]s from a transport session.
pub const TERMINAL_TOPIC: &str = "terminal";

/// Lifecycle and data notifications of one transport session.
#[derive(Clone, Debug, PartialEq)]
pub enum TerminalEvent {
    Connected,
    Data { payload: Vec<u8> },
    /// Always the last event of a session. Carries an error only when the
    /// close was caused by a failure.
    Closed { error: Option<SessionError> },
    Resized { size: TerminalSize },
}

impl TerminalEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TerminalEvent::Connected => "connected",
            TerminalEvent::Data { .. } => "data",
            TerminalEvent::Closed { .. } => "closed",
            TerminalEvent::Resized { .. } => "resized",
        }
    }

    /// JSON form for the C bridge. Data payloads are decoded lossily.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TerminalEvent::Connected => serde_json::json!({ "type": "connected" }),
            TerminalEvent::Data { payload } => serde_json::json!({
                "type": "data",
                "payload": String::from_utf8_lossy(payload),
            }),
            TerminalEvent::Closed { error } => serde_json::json!({
                "type": "closed",
                "error": error.as_ref().map(|e| e.to_string()),
            }),
            TerminalEvent::Resized { size } => serde_json::json!({
                "type": "resized",
                "size": size,
            }),
        }
    }
}

/// Token returned by [`EventBridge::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Topic-keyed subscriber lists.
pub struct EventBridge<E> {
    topics: Mutex<HashMap<String, Vec<(SubscriptionId, Handler<E>)>>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBridge<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBridge<E> {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, Handler<E>)>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.topics()
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.topics();
        let Some(handlers) = topics.get_mut(topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Drop every subscriber of `topic`.
    pub fn clear(&self, topic: &str) {
        self.topics().remove(topic);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics().get(topic).map_or(0, Vec::len)
    }

    /// Deliver `event` to the current subscribers of `topic` and return how
    /// many handlers completed.
    ///
    /// Handlers run on a snapshot of the list taken before the first call,
    /// so a handler may subscribe or unsubscribe; the change applies from
    /// the next emission. A panicking handler is logged and skipped.
    pub fn emit(&self, topic: &str, event: &E) -> usize {
        let snapshot: Vec<Handler<E>> = match self.topics().get(topic) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => log::error!("Subscriber on topic '{}' panicked, skipping", topic),
            }
        }
        delivered
    }
}
