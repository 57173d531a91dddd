//! Callback adapters between node completions and the caller's convention.
//!
//! - [`UnaryCallback`] resolves exactly once. It is consumed on resolution,
//!   and if it is dropped unresolved (the node abandoned the call) it
//!   resolves itself with a closed-transport error.
//! - [`StreamCallback`] may be invoked any number of times, in arrival order.
//! - [`WriteCallback`] resolves exactly once with `Ok(())` or an error.
//!
//! Each has a `channel()` constructor for async callers.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use transport::{StreamItem, TransportError};

use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventEmitter};

/// Reply to a unary call: the base64 response payload, or an error.
pub type UnaryReply = Result<String, BridgeError>;

/// One delivery on a stream: a base64 payload, or an error.
pub type StreamReply = Result<String, BridgeError>;

/// Reply to a stream write. `Ok(())` means the node accepted the message.
pub type WriteReply = Result<(), BridgeError>;

/// Single-use callback that fires with `fallback` if dropped unresolved.
struct Once<T> {
    f: Option<Box<dyn FnOnce(T) + Send>>,
    fallback: fn() -> T,
}

impl<T> Once<T> {
    fn new(f: impl FnOnce(T) + Send + 'static, fallback: fn() -> T) -> Self {
        Self { f: Some(Box::new(f)), fallback }
    }

    fn resolve(&mut self, value: T) {
        if let Some(f) = self.f.take() {
            f(value);
        }
    }
}

impl<T> Drop for Once<T> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f((self.fallback)());
        }
    }
}

fn abandoned<T>() -> Result<T, BridgeError> {
    Err(BridgeError::Transport(TransportError::Closed("completion dropped by node".to_string())))
}

/// Caller callback for a unary invocation.
pub struct UnaryCallback {
    inner: Once<UnaryReply>,
}

impl UnaryCallback {
    /// Wraps a closure.
    pub fn new(f: impl FnOnce(UnaryReply) + Send + 'static) -> Self {
        Self { inner: Once::new(f, abandoned::<String>) }
    }

    /// Creates a callback whose reply arrives on the returned receiver.
    pub fn channel() -> (Self, oneshot::Receiver<UnaryReply>) {
        let (tx, rx) = oneshot::channel();
        let callback = Self::new(move |reply| {
            let _ = tx.send(reply);
        });
        (callback, rx)
    }

    /// Delivers the reply, consuming the callback.
    pub fn resolve(mut self, reply: UnaryReply) { self.inner.resolve(reply) }

    pub(crate) fn complete(self, result: transport::Result<Bytes>) {
        self.resolve(result.map(|bytes| codec::encode(&bytes)).map_err(BridgeError::from))
    }
}

impl fmt::Debug for UnaryCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryCallback").field("resolved", &self.inner.f.is_none()).finish()
    }
}

/// Caller callback for a streaming invocation.
#[derive(Clone)]
pub struct StreamCallback {
    f: Arc<dyn Fn(StreamReply) + Send + Sync>,
}

impl StreamCallback {
    /// Wraps a closure.
    pub fn new(f: impl Fn(StreamReply) + Send + Sync + 'static) -> Self { Self { f: Arc::new(f) } }

    /// Creates a callback whose deliveries arrive on the returned receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = Self::new(move |reply| {
            let _ = tx.send(reply);
        });
        (callback, rx)
    }

    /// A callback that ignores deliveries; events are still published.
    pub fn noop() -> Self { Self::new(|_| {}) }

    /// Invokes the callback with one delivery.
    pub fn deliver(&self, reply: StreamReply) { (self.f)(reply) }
}

impl fmt::Debug for StreamCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("StreamCallback") }
}

/// Caller callback for a stream write.
pub struct WriteCallback {
    inner: Once<WriteReply>,
}

impl WriteCallback {
    /// Wraps a closure.
    pub fn new(f: impl FnOnce(WriteReply) + Send + 'static) -> Self {
        Self { inner: Once::new(f, abandoned::<()>) }
    }

    /// Creates a callback whose reply arrives on the returned receiver.
    pub fn channel() -> (Self, oneshot::Receiver<WriteReply>) {
        let (tx, rx) = oneshot::channel();
        let callback = Self::new(move |reply| {
            let _ = tx.send(reply);
        });
        (callback, rx)
    }

    /// Delivers the reply, consuming the callback.
    pub fn resolve(mut self, reply: WriteReply) { self.inner.resolve(reply) }
}

impl fmt::Debug for WriteCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCallback").field("resolved", &self.inner.f.is_none()).finish()
    }
}

/// Routes stream deliveries to the caller's callback and republishes each
/// one as a named event.
#[derive(Debug, Clone)]
pub(crate) struct StreamAdapter {
    callback: StreamCallback,
    emitter: EventEmitter,
    event_name: String,
    namespace: String,
}

impl StreamAdapter {
    pub(crate) fn new(
        callback: StreamCallback,
        emitter: EventEmitter,
        event_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self { callback, emitter, event_name: event_name.into(), namespace: namespace.into() }
    }

    /// Delivers one item from the node.
    pub(crate) fn deliver(&self, item: StreamItem) {
        let reply = item.map(|bytes| codec::encode(&bytes)).map_err(BridgeError::from);
        self.publish(reply);
    }

    /// Delivers a bridge-side failure.
    pub(crate) fn fail(&self, err: BridgeError) { self.publish(Err(err)) }

    fn publish(&self, reply: StreamReply) {
        self.emitter.emit(BridgeEvent::from_reply(&self.event_name, &self.namespace, &reply));
        self.callback.deliver(reply);
    }
}
