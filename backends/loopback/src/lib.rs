#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! # `nodebridge-loopback` — In-process loopback node
//!
//! A stand-in for the embedded node that answers every method of the LND
//! catalogue without running a node process.
//!
//! ## Behaviour
//!
//! - Unary methods echo the request bytes.
//! - Server streams deliver the request once and then keep the stream open
//!   until [`LoopbackNode::close_streams`] is called.
//! - `ChannelAcceptor` echoes every written message back on its receive side.
//! - Methods marked with [`LoopbackNode::fail`] return
//!   [`TransportError::Rpc`] instead.
//!
//! [`RecordingWriter`] and [`LoopbackLauncher`] record what the bridge sends
//! them so tests can assert on it.
//!
//! ## Example
//! ```
//! use loopback::LoopbackNode;
//! use registry::InvocationKind;
//!
//! let node = LoopbackNode::new().fail("GetInfo", "wallet locked");
//! let registry = node.registry().expect("catalogue has no duplicates");
//! assert!(registry.covers_catalogue());
//! assert!(registry.lookup("ChannelAcceptor", InvocationKind::BidiStream).is_some());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use registry::{lnd, InvocationKind, MethodRegistry, RegistryBuilder, RegistryError};
use tracing::debug;
use transport::{NodeLauncher, StreamSink, TransportError, WriteHandle};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct NodeState {
    failures: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
    held: Mutex<Vec<StreamSink>>,
}

impl NodeState {
    fn record(&self, method: &str) -> transport::Result<()> {
        lock(&self.calls).push(method.to_string());
        match self.failures.get(method) {
            Some(message) => Err(TransportError::Rpc(message.clone())),
            None => Ok(()),
        }
    }
}

/// Loopback implementation of every catalogue method.
///
/// Clones share call records and held streams.
#[derive(Clone, Default)]
pub struct LoopbackNode {
    state: Arc<NodeState>,
}

impl LoopbackNode {
    /// Creates a node that answers every method successfully.
    pub fn new() -> Self { Self::default() }

    /// Makes `method` fail with `message`.
    ///
    /// Takes effect for registries built afterwards.
    pub fn fail(self, method: impl Into<String>, message: impl Into<String>) -> Self {
        let mut state = NodeState {
            failures: self.state.failures.clone(),
            calls: Mutex::new(lock(&self.state.calls).clone()),
            held: Mutex::default(),
        };
        state.failures.insert(method.into(), message.into());
        Self { state: Arc::new(state) }
    }

    /// Builds a registry with one entry per catalogue method.
    pub fn registry(&self) -> Result<MethodRegistry, RegistryError> {
        self.register(MethodRegistry::builder()).build()
    }

    /// Adds the catalogue entries to `builder`.
    pub fn register(&self, builder: RegistryBuilder) -> RegistryBuilder {
        let builder = lnd::entries(InvocationKind::Unary)
            .fold(builder, |builder, entry| builder.unary(entry.name, self.unary(entry.name)));
        let builder = lnd::entries(InvocationKind::ServerStream).fold(builder, |builder, entry| {
            builder.server_stream(entry.name, self.server_stream(entry.name))
        });
        lnd::entries(InvocationKind::BidiStream).fold(builder, |builder, entry| {
            builder.bidi_stream(entry.name, self.bidi_stream(entry.name))
        })
    }

    fn unary(
        &self,
        name: &'static str,
    ) -> impl Fn(Bytes) -> std::future::Ready<transport::Result<Bytes>> + Send + Sync + 'static {
        let state = Arc::clone(&self.state);
        move |request| std::future::ready(state.record(name).map(|()| request))
    }

    fn server_stream(
        &self,
        name: &'static str,
    ) -> impl Fn(Bytes, StreamSink) -> transport::Result<()> + Send + Sync + 'static {
        let state = Arc::clone(&self.state);
        move |request, sink| {
            state.record(name)?;
            sink.on_response(request);
            lock(&state.held).push(sink);
            Ok(())
        }
    }

    fn bidi_stream(
        &self,
        name: &'static str,
    ) -> impl Fn(StreamSink) -> transport::Result<Arc<dyn WriteHandle>> + Send + Sync + 'static
    {
        let state = Arc::clone(&self.state);
        move |sink| {
            state.record(name)?;
            let handle: Arc<dyn WriteHandle> = Arc::new(EchoWriter { method: name, sink });
            Ok(handle)
        }
    }

    /// Method names invoked so far, in call order.
    pub fn calls(&self) -> Vec<String> { lock(&self.state.calls).clone() }

    /// Number of invocations of `method`.
    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.state.calls).iter().filter(|call| call.as_str() == method).count()
    }

    /// Server streams still held open.
    pub fn open_streams(&self) -> usize {
        lock(&self.state.held).iter().filter(|sink| !sink.is_closed()).count()
    }

    /// Pushes `data` to every held server stream. Returns how many accepted it.
    pub fn broadcast(&self, data: Bytes) -> usize {
        lock(&self.state.held).iter().filter(|sink| sink.on_response(data.clone())).count()
    }

    /// Ends every held server stream by dropping its sink.
    pub fn close_streams(&self) -> usize {
        let closed = lock(&self.state.held).drain(..).count();
        debug!(closed, "loopback streams closed");
        closed
    }
}

impl fmt::Debug for LoopbackNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNode")
            .field("failures", &self.state.failures)
            .field("calls", &lock(&self.state.calls).len())
            .finish()
    }
}

// Send side of a loopback bidirectional stream.
struct EchoWriter {
    method: &'static str,
    sink: StreamSink,
}

#[async_trait]
impl WriteHandle for EchoWriter {
    async fn send(&self, payload: Bytes) -> transport::Result<()> {
        if self.sink.on_response(payload) {
            Ok(())
        } else {
            Err(TransportError::Closed(self.method.to_string()))
        }
    }
}

/// Write handle that records every message it is sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingWriter {
    sent: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingWriter {
    /// Creates an empty recorder.
    pub fn new() -> Self { Self::default() }

    /// Messages received so far, in order.
    pub fn recorded(&self) -> Vec<Bytes> { lock(&self.sent).clone() }
}

#[async_trait]
impl WriteHandle for RecordingWriter {
    async fn send(&self, payload: Bytes) -> transport::Result<()> {
        lock(&self.sent).push(payload);
        Ok(())
    }
}

/// One launcher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchEvent {
    /// `start(namespace, args)`.
    Started {
        /// Namespace passed to the launcher.
        namespace: String,
        /// Argument string passed to the launcher.
        args: String,
    },
    /// `stop(namespace)`.
    Stopped {
        /// Namespace passed to the launcher.
        namespace: String,
    },
}

/// Launcher that records start and stop requests without spawning anything.
#[derive(Debug, Clone, Default)]
pub struct LoopbackLauncher {
    events: Arc<Mutex<Vec<LaunchEvent>>>,
    fail_start: Option<String>,
}

impl LoopbackLauncher {
    /// Creates a launcher that always succeeds.
    pub fn new() -> Self { Self::default() }

    /// Creates a launcher whose `start` fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { fail_start: Some(message.into()), ..Self::default() }
    }

    /// Requests received so far, in order.
    pub fn events(&self) -> Vec<LaunchEvent> { lock(&self.events).clone() }
}

#[async_trait]
impl NodeLauncher for LoopbackLauncher {
    async fn start(&self, namespace: &str, args: &str) -> transport::Result<()> {
        if let Some(message) = &self.fail_start {
            return Err(TransportError::Launch(message.clone()));
        }
        debug!(namespace, args, "loopback node started");
        lock(&self.events)
            .push(LaunchEvent::Started { namespace: namespace.to_string(), args: args.to_string() });
        Ok(())
    }

    async fn stop(&self, namespace: &str) -> transport::Result<()> {
        debug!(namespace, "loopback node stopped");
        lock(&self.events).push(LaunchEvent::Stopped { namespace: namespace.to_string() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unary_echo_and_failure() {
        let node = LoopbackNode::new().fail("WalletBalance", "wallet locked");
        let registry = node.registry().expect("registry");

        let get_info = registry.lookup_unary("GetInfo").expect("GetInfo");
        assert_eq!(get_info.call(Bytes::from_static(b"\x01")).await, Ok(Bytes::from_static(b"\x01")));

        let balance = registry.lookup_unary("WalletBalance").expect("WalletBalance");
        assert_eq!(
            balance.call(Bytes::new()).await,
            Err(TransportError::Rpc("wallet locked".to_string()))
        );
        assert_eq!(node.calls(), vec!["GetInfo".to_string(), "WalletBalance".to_string()]);
    }

    #[tokio::test]
    async fn test_server_stream_is_held_until_closed() {
        let node = LoopbackNode::new();
        let registry = node.registry().expect("registry");
        let subscribe = registry.lookup_server_stream("SubscribeState").expect("SubscribeState");

        let (sink, mut rx) = StreamSink::channel();
        subscribe.subscribe(Bytes::from_static(b"s"), sink).expect("subscribe");
        assert_eq!(rx.recv().await, Some(Ok(Bytes::from_static(b"s"))));
        assert_eq!(node.open_streams(), 1);
        assert_eq!(node.broadcast(Bytes::from_static(b"t")), 1);
        assert_eq!(rx.recv().await, Some(Ok(Bytes::from_static(b"t"))));

        assert_eq!(node.close_streams(), 1);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_channel_acceptor_echoes_writes() {
        let registry = LoopbackNode::new().registry().expect("registry");
        let acceptor = registry.lookup_bidi_stream("ChannelAcceptor").expect("ChannelAcceptor");

        let (sink, mut rx) = StreamSink::channel();
        let handle = acceptor.open(sink).expect("open");
        handle.send(Bytes::from_static(b"accept")).await.expect("send");
        assert_eq!(rx.recv().await, Some(Ok(Bytes::from_static(b"accept"))));

        drop(rx);
        assert!(matches!(
            handle.send(Bytes::from_static(b"late")).await,
            Err(TransportError::Closed(_))
        ));
    }
}
