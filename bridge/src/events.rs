//! Named event fan-out for streaming deliveries.
//!
//! Every delivery on a stream is republished as a [`BridgeEvent`] so that
//! long-lived UI subscribers, decoupled from the call site that opened the
//! stream, can consume it. Events are broadcast: each subscriber sees every
//! event published after it subscribed.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::callback::StreamReply;

/// Default number of undelivered events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Largest accepted per-subscriber buffer; larger requests are lowered to it.
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// One streaming delivery, in the text form the UI consumes.
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeEvent {
    /// Event name: the originating method, or the name given to
    /// [`Dispatcher::init_listener`](crate::Dispatcher::init_listener).
    pub name: String,
    /// Namespace of the node session that produced the delivery.
    pub namespace: String,
    /// Base64 response payload.
    pub result: Option<String>,
    /// Error text.
    pub error: Option<String>,
}

impl BridgeEvent {
    pub(crate) fn from_reply(name: &str, namespace: &str, reply: &StreamReply) -> Self {
        let (result, error) = match reply {
            Ok(data) => (Some(data.clone()), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self { name: name.to_string(), namespace: namespace.to_string(), result, error }
    }

    /// Returns `true` if this event carries an error.
    pub fn is_error(&self) -> bool { self.error.is_some() }
}

/// Publishes [`BridgeEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventEmitter {
    /// Creates an emitter buffering up to `capacity` events per subscriber.
    ///
    /// The capacity is clamped to `1..=MAX_EVENT_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self { tx }
    }

    /// Publishes an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: BridgeEvent) -> usize { self.tx.send(event).unwrap_or(0) }

    /// Subscribes to all events published from now on.
    pub fn subscribe(&self) -> EventSubscription { EventSubscription { rx: self.tx.subscribe() } }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize { self.tx.receiver_count() }
}

impl Default for EventEmitter {
    fn default() -> Self { Self::new(DEFAULT_EVENT_CAPACITY) }
}

/// Receiving end of an [`EventEmitter`].
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<BridgeEvent>,
}

impl EventSubscription {
    /// Waits for the next event.
    ///
    /// Events dropped because this subscriber fell behind are skipped with a
    /// warning. Returns `None` once the emitter is gone.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next event called `name`, discarding others.
    pub async fn recv_named(&mut self, name: &str) -> Option<BridgeEvent> {
        while let Some(event) = self.recv().await {
            if event.name == name {
                return Some(event);
            }
        }
        None
    }

    /// Returns an already buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged; events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let emitter = EventEmitter::new(4);
        let event = BridgeEvent::from_reply("SubscribeState", "ns", &Ok("AA==".into()));
        assert_eq!(emitter.emit(event), 0);
    }

    #[tokio::test]
    async fn test_oversized_capacity_is_clamped() {
        let emitter = EventEmitter::new(usize::MAX);
        let mut subscription = emitter.subscribe();
        let event = BridgeEvent::from_reply("SubscribeState", "ns", &Ok("AA==".into()));
        assert_eq!(emitter.emit(event.clone()), 1);
        assert_eq!(subscription.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_recv_named_filters() {
        let emitter = EventEmitter::default();
        let mut sub = emitter.subscribe();
        emitter.emit(BridgeEvent::from_reply("SubscribeState", "ns", &Ok("AQ==".into())));
        emitter.emit(BridgeEvent::from_reply(
            "SubscribeInvoices",
            "ns",
            &Err(BridgeError::handle_not_found("x")),
        ));

        let event = sub.recv_named("SubscribeInvoices").await.expect("event");
        assert!(event.is_error());
        assert_eq!(event.result, None);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let emitter = EventEmitter::new(1);
        let mut sub = emitter.subscribe();
        for i in 0..3 {
            emitter.emit(BridgeEvent::from_reply("e", "ns", &Ok(i.to_string())));
        }
        let event = sub.recv().await.expect("newest event survives");
        assert_eq!(event.result.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_closed_emitter_ends_subscription() {
        let emitter = EventEmitter::new(2);
        let mut sub = emitter.subscribe();
        drop(emitter);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_event_serializes_like_ui_payload() {
        let event = BridgeEvent::from_reply("SubscribeState", "wallet", &Ok("CAE=".into()));
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["result"], "CAE=");
        assert!(json["error"].is_null());
        assert_eq!(json["name"], "SubscribeState");
    }
}
