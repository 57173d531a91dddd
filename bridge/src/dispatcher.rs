//! Command Dispatcher.
//!
//! The façade the UI side talks to. Every operation returns immediately;
//! node calls and stream deliveries run on the dispatcher's runtime and
//! reach the caller through its callback. Validation failures travel the
//! same way, so nothing is ever raised past this type.

use std::fmt;
use std::sync::Arc;

use registry::{InvocationKind, MethodRegistry};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use transport::{StreamItem, StreamSink, TransportError, WriteHandle};

use crate::callback::{StreamAdapter, StreamCallback, UnaryCallback, WriteCallback};
use crate::error::BridgeError;
use crate::events::{EventEmitter, EventSubscription};
use crate::session::{SessionManager, StreamTicket, Teardown, WriteRequest};

struct Inner {
    registry: Arc<MethodRegistry>,
    sessions: SessionManager,
    events: EventEmitter,
    runtime: Handle,
}

/// Routes UI commands to the node and node replies back to the UI.
///
/// Cloning is cheap; clones share the registry, session state and event
/// channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher with a default-sized event channel.
    ///
    /// Node calls and stream forwarding are spawned on `runtime`.
    pub fn new(registry: impl Into<Arc<MethodRegistry>>, runtime: Handle) -> Self {
        Self::with_events(registry, EventEmitter::default(), runtime)
    }

    /// Creates a dispatcher publishing stream events on `events`.
    pub fn with_events(
        registry: impl Into<Arc<MethodRegistry>>,
        events: EventEmitter,
        runtime: Handle,
    ) -> Self {
        let inner =
            Inner { registry: registry.into(), sessions: SessionManager::new(), events, runtime };
        Self { inner: Arc::new(inner) }
    }

    /// Invokes a unary method.
    ///
    /// `callback` fires exactly once, with the base64 response or an error.
    pub fn send_command(&self, namespace: &str, method: &str, payload: &str, callback: UnaryCallback) {
        let request = match codec::decode(payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(namespace, method, %err, "rejecting unary call");
                return callback.resolve(Err(err.into()));
            }
        };
        let Some(entry) = self.inner.registry.lookup_unary(method) else {
            warn!(namespace, method, "unary method not found");
            return callback.resolve(Err(BridgeError::method_not_found(InvocationKind::Unary, method)));
        };

        debug!(namespace, method, bytes = request.len(), "sending command");
        self.inner.runtime.spawn(async move { callback.complete(entry.call(request).await) });
    }

    /// Starts a server-streaming method.
    ///
    /// Each delivery reaches `callback` and is republished as an event named
    /// after `method`. With `stream_only_once` set, a second call while the
    /// stream for `(namespace, method)` is active does nothing at all.
    pub fn send_stream_command(
        &self,
        namespace: &str,
        method: &str,
        payload: &str,
        stream_only_once: bool,
        callback: StreamCallback,
    ) {
        self.start_server_stream(namespace, method, method, payload, stream_only_once, callback)
    }

    /// Starts a server-streaming method whose deliveries are published only
    /// as events named `event_name`.
    pub fn init_listener(&self, namespace: &str, method: &str, event_name: &str, payload: &str) {
        self.start_server_stream(namespace, method, event_name, payload, false, StreamCallback::noop())
    }

    fn start_server_stream(
        &self,
        namespace: &str,
        method: &str,
        event_name: &str,
        payload: &str,
        stream_only_once: bool,
        callback: StreamCallback,
    ) {
        let Some((ticket, stop)) = self.admit(namespace, method, stream_only_once) else {
            return;
        };
        let adapter =
            StreamAdapter::new(callback, self.inner.events.clone(), event_name, namespace);

        let request = match codec::decode(payload) {
            Ok(request) => request,
            Err(err) => return self.abort(&ticket, &adapter, err.into()),
        };
        let Some(entry) = self.inner.registry.lookup_server_stream(method) else {
            let err = BridgeError::method_not_found(InvocationKind::ServerStream, method);
            return self.abort(&ticket, &adapter, err);
        };

        let (sink, deliveries) = StreamSink::channel();
        if let Err(err) = entry.subscribe(request, sink) {
            return self.abort(&ticket, &adapter, err.into());
        }
        debug!(namespace, method, "stream started");
        self.forward(ticket, stop, deliveries, adapter);
    }

    /// Opens a bidirectional stream.
    ///
    /// Node messages reach `callback` and the event channel. Messages to the
    /// node go through [`write_to_stream`](Self::write_to_stream).
    pub fn send_bidi_stream_command(
        &self,
        namespace: &str,
        method: &str,
        stream_only_once: bool,
        callback: StreamCallback,
    ) {
        let Some((ticket, stop)) = self.admit(namespace, method, stream_only_once) else {
            return;
        };
        let adapter = StreamAdapter::new(callback, self.inner.events.clone(), method, namespace);

        let Some(entry) = self.inner.registry.lookup_bidi_stream(method) else {
            let err = BridgeError::method_not_found(InvocationKind::BidiStream, method);
            return self.abort(&ticket, &adapter, err);
        };
        let (sink, deliveries) = StreamSink::channel();
        let handle = match entry.open(sink) {
            Ok(handle) => handle,
            Err(err) => return self.abort(&ticket, &adapter, err.into()),
        };

        let (queue, requests) = mpsc::unbounded_channel();
        self.spawn_writer(method, handle, requests);
        if !self.inner.sessions.attach_writer(&ticket, queue) {
            debug!(namespace, method, "stream torn down before its handle was stored");
        }
        debug!(namespace, method, "bidirectional stream opened");
        self.forward(ticket, stop, deliveries, adapter);
    }

    /// Sends one message on the open bidirectional stream for `method`.
    ///
    /// `callback` receives `Ok(())` once the node accepted the message.
    /// Writes to the same stream are delivered to the node in call order.
    pub fn write_to_stream(&self, method: &str, payload: &str, callback: WriteCallback) {
        let Some(queue) = self.inner.sessions.writer(method) else {
            warn!(method, "write to a stream that is not open");
            return callback.resolve(Err(BridgeError::handle_not_found(method)));
        };
        let message = match codec::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(method, %err, "rejecting stream write");
                return callback.resolve(Err(err.into()));
            }
        };

        if let Err(mpsc::error::SendError((_, callback))) = queue.send((message, callback)) {
            let closed = TransportError::Closed(method.to_string());
            callback.resolve(Err(closed.into()));
        }
    }

    /// Tears down every stream and write handle owned by `namespace`.
    ///
    /// Idempotent. Afterwards single-flight methods can be started again.
    pub fn disconnect(&self, namespace: &str) -> Teardown {
        let teardown = self.inner.sessions.disconnect(namespace);
        info!(namespace, streams = teardown.streams, writers = teardown.writers, "disconnected");
        teardown
    }

    /// Subscribes to stream events published from now on.
    pub fn events(&self) -> EventSubscription { self.inner.events.subscribe() }

    /// The emitter stream deliveries are published on.
    pub fn emitter(&self) -> &EventEmitter { &self.inner.events }

    /// The method tables this dispatcher routes to.
    pub fn registry(&self) -> &MethodRegistry { &self.inner.registry }

    /// Stream bookkeeping shared by this dispatcher's clones.
    pub fn sessions(&self) -> &SessionManager { &self.inner.sessions }

    /// Returns `true` while a stream for `(namespace, method)` is active.
    pub fn is_stream_active(&self, namespace: &str, method: &str) -> bool {
        self.inner.sessions.is_active(namespace, method)
    }

    /// Sorted methods with an active stream in `namespace`.
    pub fn active_streams(&self, namespace: &str) -> Vec<String> {
        self.inner.sessions.active_streams(namespace)
    }

    /// Returns `true` while `method` accepts writes.
    pub fn has_write_handle(&self, method: &str) -> bool { self.inner.sessions.has_writer(method) }

    fn admit(
        &self,
        namespace: &str,
        method: &str,
        stream_only_once: bool,
    ) -> Option<(StreamTicket, oneshot::Receiver<()>)> {
        match self.inner.sessions.try_register(namespace, method, stream_only_once) {
            Ok(admitted) => Some(admitted),
            Err(err) => {
                warn!("Attempting to stream {method} twice, not allowing");
                debug!(%err, "duplicate stream dropped");
                None
            }
        }
    }

    fn abort(&self, ticket: &StreamTicket, adapter: &StreamAdapter, err: BridgeError) {
        warn!(stream = %ticket.key(), %err, "stream failed to start");
        self.inner.sessions.release(ticket);
        adapter.fail(err);
    }

    fn spawn_writer(
        &self,
        method: &str,
        handle: Arc<dyn WriteHandle>,
        mut requests: mpsc::UnboundedReceiver<WriteRequest>,
    ) {
        let method = method.to_string();
        self.inner.runtime.spawn(async move {
            while let Some((message, callback)) = requests.recv().await {
                let result = handle.send(message).await;
                if let Err(err) = &result {
                    warn!(method = %method, %err, "stream write failed");
                }
                callback.resolve(result.map_err(BridgeError::from));
            }
            debug!(method = %method, "write handle closed");
        });
    }

    // Drains the node's deliveries until the node drops the sink or the
    // namespace is torn down.
    fn forward(
        &self,
        ticket: StreamTicket,
        mut stop: oneshot::Receiver<()>,
        mut deliveries: mpsc::UnboundedReceiver<StreamItem>,
        adapter: StreamAdapter,
    ) {
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop => {
                        debug!(stream = %ticket.key(), "stream torn down");
                        return;
                    }
                    item = deliveries.recv() => match item {
                        Some(item) => adapter.deliver(item),
                        None => {
                            if inner.sessions.release(&ticket) {
                                debug!(stream = %ticket.key(), "stream ended by node");
                            }
                            return;
                        }
                    },
                }
            }
        });
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("sessions", &self.inner.sessions)
            .finish()
    }
}

