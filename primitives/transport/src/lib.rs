#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! # `nodebridge-transport` — Node-side boundary
//!
//! This crate defines the interface the embedded node exposes to the bridge.
//! The node is reachable only through plain function calls keyed by method
//! name; every request and response is an opaque, already serialized protobuf
//! message carried as raw bytes.
//!
//! ## Core Concepts
//!
//! ### Invocation traits
//! There is one trait per invocation shape:
//!
//! - [`UnaryMethod`]: one request, exactly one response or error.
//! - [`ServerStreamMethod`]: one request, then zero or more deliveries pushed
//!   through a [`StreamSink`].
//! - [`BidiStreamMethod`]: opens a stream whose receive side is a
//!   [`StreamSink`] and whose send side is a [`WriteHandle`].
//!
//! Closures with the matching shape implement these traits, so a backend can
//! register `|req| async move { ... }` directly.
//!
//! ### `StreamSink`
//! The channel-backed replacement for a native "receive stream" callback
//! object. The node calls [`StreamSink::on_response`] / [`StreamSink::on_error`]
//! from whatever execution context it likes. When every clone of the sink is
//! dropped the stream is over, which the bridge observes as a terminal signal.
//!
//! ### `TransportError`
//! Enumerates the failures surfaced by the node itself. The bridge forwards
//! these verbatim to the caller.
//!
//! ### `NodeLauncher`
//! Starts and stops the embedded node process for a namespace.
//!
//! ## Example
//! ```
//! use bytes::Bytes;
//! use transport::{StreamSink, UnaryMethod};
//!
//! # tokio_test_block_on(async {
//! let get_info = |req: Bytes| async move { Ok::<_, transport::TransportError>(req) };
//! let reply = get_info.call(Bytes::from_static(b"\x08\x01")).await.expect("echo");
//! assert_eq!(reply.as_ref(), b"\x08\x01");
//!
//! let (sink, mut deliveries) = StreamSink::channel();
//! sink.on_response(Bytes::from_static(b"state"));
//! drop(sink);
//! assert!(deliveries.recv().await.expect("one item").is_ok());
//! assert!(deliveries.recv().await.is_none());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().expect("runtime").block_on(f)
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Type alias for results produced by the node boundary.
pub type Result<T> = std::result::Result<T, TransportError>;

/// One delivery on a streaming invocation.
pub type StreamItem = Result<Bytes>;

/// Canonical error type for failures raised by the embedded node.
///
/// The bridge never inspects or rewraps these values; they reach the UI
/// exactly as the node produced them.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The node executed the call and returned an error.
    #[error("{0}")]
    Rpc(String),

    /// The stream or write handle was already closed by the node.
    #[error("stream closed: {0}")]
    Closed(String),

    /// The node process for this namespace has not been started.
    #[error("node not started")]
    NotStarted,

    /// Starting or stopping the node process failed.
    #[error("node launch failed: {0}")]
    Launch(String),

    /// Any other error not covered by the specific variants above.
    #[error("{0}")]
    Other(String),
}

/// A node entry point that answers one request with one response.
#[async_trait]
pub trait UnaryMethod: Send + Sync {
    /// Invokes the method with serialized request bytes.
    async fn call(&self, request: Bytes) -> Result<Bytes>;
}

#[async_trait]
impl<F, Fut> UnaryMethod for F
where
    F: Fn(Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    async fn call(&self, request: Bytes) -> Result<Bytes> { (self)(request).await }
}

/// A node entry point that pushes zero or more responses for one request.
///
/// Implementations must return promptly; deliveries happen later through the
/// sink, on any thread. Returning `Err` means the stream never started.
pub trait ServerStreamMethod: Send + Sync {
    /// Starts the subscription.
    fn subscribe(&self, request: Bytes, sink: StreamSink) -> Result<()>;
}

impl<F> ServerStreamMethod for F
where
    F: Fn(Bytes, StreamSink) -> Result<()> + Send + Sync,
{
    fn subscribe(&self, request: Bytes, sink: StreamSink) -> Result<()> { (self)(request, sink) }
}

/// A node entry point for bidirectional streams.
pub trait BidiStreamMethod: Send + Sync {
    /// Opens the stream. Node messages arrive through `sink`; the returned
    /// handle carries caller messages to the node.
    fn open(&self, sink: StreamSink) -> Result<Arc<dyn WriteHandle>>;
}

impl<F> BidiStreamMethod for F
where
    F: Fn(StreamSink) -> Result<Arc<dyn WriteHandle>> + Send + Sync,
{
    fn open(&self, sink: StreamSink) -> Result<Arc<dyn WriteHandle>> { (self)(sink) }
}

/// Send side of an open bidirectional stream.
#[async_trait]
pub trait WriteHandle: Send + Sync {
    /// Sends one serialized message to the node.
    async fn send(&self, payload: Bytes) -> Result<()>;
}

/// Receive side of a streaming invocation, handed to the node.
///
/// Cloning is cheap; the stream ends once the node has dropped every clone.
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: mpsc::UnboundedSender<StreamItem>,
}

impl StreamSink {
    /// Creates a sink and the receiver the bridge drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers a response message. Returns `false` once nobody is listening.
    pub fn on_response(&self, data: Bytes) -> bool { self.tx.send(Ok(data)).is_ok() }

    /// Delivers an error. The stream stays open unless the node drops the sink.
    pub fn on_error(&self, err: TransportError) -> bool { self.tx.send(Err(err)).is_ok() }

    /// Returns `true` when the bridge has stopped listening.
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// Starts and stops the embedded node process.
///
/// One process is addressed per namespace.
#[async_trait]
pub trait NodeLauncher: Send + Sync {
    /// Starts the node for `namespace` with a fully assembled argument string.
    async fn start(&self, namespace: &str, args: &str) -> Result<()>;

    /// Stops the node for `namespace`.
    async fn stop(&self, namespace: &str) -> Result<()>;
}

/// Type alias for a shared, dynamically dispatched launcher.
pub type DynLauncher = Arc<dyn NodeLauncher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::Rpc("wallet locked".into()).to_string(), "wallet locked");
        assert_eq!(TransportError::NotStarted.to_string(), "node not started");
        assert!(TransportError::Closed("ChannelAcceptor".into())
            .to_string()
            .contains("ChannelAcceptor"));
    }

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (sink, rx) = StreamSink::channel();
        assert!(!sink.is_closed());
        assert!(sink.on_response(Bytes::from_static(b"a")));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.on_error(TransportError::Other("late".into())));
    }

    #[tokio::test]
    async fn test_server_stream_closure() {
        let method = |req: Bytes, sink: StreamSink| -> Result<()> {
            sink.on_response(req.clone());
            sink.on_response(req);
            Ok(())
        };
        let (sink, mut rx) = StreamSink::channel();
        method.subscribe(Bytes::from_static(b"x"), sink).expect("subscribe");
        assert_eq!(rx.recv().await.expect("first").expect("ok").as_ref(), b"x");
        assert_eq!(rx.recv().await.expect("second").expect("ok").as_ref(), b"x");
        assert!(rx.recv().await.is_none());
    }
}
