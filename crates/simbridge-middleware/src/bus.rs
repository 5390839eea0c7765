//! Headless, topic-named publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Topics are addressed by their fully resolved name (see
//! [`crate::names::resolve_name`]).  A topic's channel is created on first use:
//!
//! | Call | Capacity used |
//! |---|---|
//! | [`EventBus::advertise`] | the publisher's `queue_size` |
//! | [`EventBus::subscribe`] / [`EventBus::publish`] | the bus default |
//!
//! The capacity is the backlog a slow subscriber may fall behind by before
//! the oldest messages are dropped for it.  Publishers are never blocked.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use simbridge_types::{BridgeError, Event, EventPayload};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity for topics created implicitly.
const DEFAULT_CAPACITY: usize = 256;

/// Anything frames or commands can be published through.
///
/// The simulation loop only sees this trait, so an in-process bus topic, a
/// network transport, or a test double can be plugged in interchangeably.
pub trait Publisher: Send + Sync {
    /// Resolved topic name this publisher writes to.
    fn topic(&self) -> &str;

    /// Publish `payload`.  Returns the number of receivers it was handed to.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the underlying fabric rejects
    /// the message.
    fn publish(&self, payload: EventPayload) -> Result<usize, BridgeError>;
}

/// Shared event bus. Clone it cheaply – all clones share the same topic
/// table.
#[derive(Clone, Debug)]
pub struct EventBus {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
    default_capacity: usize,
}

impl EventBus {
    /// Create a new bus whose implicitly created topics hold `capacity`
    /// buffered events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a broadcast channel needs room for at
    /// least one message).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "EventBus capacity must be non-zero");
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            default_capacity: capacity,
        }
    }

    /// Declare `topic` with an explicit backlog of `queue_size` messages and
    /// return a [`Publisher`] bound to it.
    ///
    /// If the topic already exists its original capacity is kept.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when `queue_size` is zero.
    pub fn advertise(
        &self,
        topic: impl Into<String>,
        queue_size: usize,
    ) -> Result<TopicPublisher, BridgeError> {
        let topic = topic.into();
        if queue_size == 0 {
            return Err(BridgeError::Config(format!(
                "queue_size for {topic} must be at least 1"
            )));
        }
        self.sender_with_capacity(&topic, queue_size);
        Ok(TopicPublisher {
            bus: self.clone(),
            topic,
        })
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// `Ok(0)` means nobody is currently listening, which is a normal
    /// condition, not an error.
    pub fn publish(&self, topic: &str, payload: EventPayload) -> Result<usize, BridgeError> {
        let sender = self.sender_with_capacity(topic, self.default_capacity);
        match sender.send(Event::new(topic, payload)) {
            Ok(n) => Ok(n),
            // The only send failure is "no receivers".
            Err(broadcast::error::SendError(_)) => Ok(0),
        }
    }

    /// Subscribe to `topic`, creating it with the default capacity if it does
    /// not exist yet.
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        TopicReceiver {
            topic: topic.to_string(),
            receiver: self
                .sender_with_capacity(topic, self.default_capacity)
                .subscribe(),
        }
    }

    /// Names of every topic created so far, sorted.
    pub fn topics(&self) -> Vec<String> {
        let table = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = table.keys().cloned().collect();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn sender_with_capacity(&self, topic: &str, capacity: usize) -> broadcast::Sender<Event> {
        {
            let table = self.topics.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = table.get(topic) {
                return sender.clone();
            }
        }
        let mut table = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        table
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic, capacity, "creating bus topic");
                broadcast::channel(capacity).0
            })
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Publisher bound to one topic
// ---------------------------------------------------------------------------

/// A [`Publisher`] that writes to one [`EventBus`] topic.
///
/// Obtained via [`EventBus::advertise`].
#[derive(Clone, Debug)]
pub struct TopicPublisher {
    bus: EventBus,
    topic: String,
}

impl Publisher for TopicPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, payload: EventPayload) -> Result<usize, BridgeError> {
        self.bus.publish(&self.topic, payload)
    }
}

// ---------------------------------------------------------------------------
// Receiver bound to one topic
// ---------------------------------------------------------------------------

/// An async receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// A receiver that fell behind skips the dropped messages (logging how
    /// many) and continues with the oldest one still buffered.  Returns `None`
    /// once the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged; oldest messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`][Self::recv]; `None` when nothing is
    /// buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged; oldest messages dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}
