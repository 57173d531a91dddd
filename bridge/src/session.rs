//! Streaming Session Manager.
//!
//! Tracks which streaming invocations are active per `(namespace, method)`
//! and which bidirectional streams currently accept writes. All state sits
//! behind one mutex; critical sections never await.
//!
//! Per key the life cycle is `Idle -> Active -> Idle`. A key leaves `Active`
//! when the node ends the stream ([`SessionManager::release`]) or when its
//! namespace is torn down ([`SessionManager::disconnect`]). Each started
//! invocation gets a generation number so that a stream which ends late can
//! only release its own entry, never a newer subscription for the same key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::callback::WriteCallback;
use crate::error::BridgeError;

/// Identity of a streaming subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// Node session the stream belongs to.
    pub namespace: String,
    /// Streaming method name.
    pub method: String,
}

impl StreamKey {
    /// Builds a key.
    pub fn new(namespace: impl Into<String>, method: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), method: method.into() }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.method)
    }
}

/// Proof that a streaming invocation was admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTicket {
    key: StreamKey,
    generation: u64,
}

impl StreamTicket {
    /// Key the ticket was issued for.
    pub fn key(&self) -> &StreamKey { &self.key }
}

/// Message queued for a bidirectional stream's writer task.
pub(crate) type WriteRequest = (Bytes, WriteCallback);

struct PendingStream {
    generation: u64,
    // Dropping the sender tells the stream's forwarder to stop.
    _stop: oneshot::Sender<()>,
}

struct Writer {
    namespace: String,
    generation: u64,
    queue: mpsc::UnboundedSender<WriteRequest>,
}

#[derive(Default)]
struct SessionState {
    next_generation: u64,
    pending: HashMap<StreamKey, Vec<PendingStream>>,
    writers: HashMap<String, Writer>,
}

/// Counts of what a [`SessionManager::disconnect`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Teardown {
    /// Pending streams removed.
    pub streams: usize,
    /// Write handles removed.
    pub writers: usize,
}

/// Tracks active streams and open write handles.
#[derive(Default)]
pub struct SessionManager {
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Creates an empty manager.
    pub fn new() -> Self { Self::default() }

    // The guarded maps stay consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a streaming invocation for `(namespace, method)`.
    ///
    /// The returned receiver resolves when the entry is torn down by
    /// [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateStream`] if `single_flight` is set and
    /// the key is already active.
    pub fn try_register(
        &self,
        namespace: &str,
        method: &str,
        single_flight: bool,
    ) -> Result<(StreamTicket, oneshot::Receiver<()>), BridgeError> {
        let key = StreamKey::new(namespace, method);
        let mut state = self.lock();
        let active = state.pending.get(&key).is_some_and(|streams| !streams.is_empty());
        if single_flight && active {
            return Err(BridgeError::DuplicateStream {
                namespace: key.namespace,
                method: key.method,
            });
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let (stop_tx, stop_rx) = oneshot::channel();
        state
            .pending
            .entry(key.clone())
            .or_default()
            .push(PendingStream { generation, _stop: stop_tx });
        Ok((StreamTicket { key, generation }, stop_rx))
    }

    /// Returns the ticket's key to `Idle`.
    ///
    /// Removes the pending entry and, for bidirectional streams, the write
    /// handle, provided both still belong to this ticket. Returns `true` if
    /// anything was removed.
    pub fn release(&self, ticket: &StreamTicket) -> bool {
        let mut state = self.lock();
        let mut removed = false;

        if let Some(streams) = state.pending.get_mut(&ticket.key) {
            let before = streams.len();
            streams.retain(|stream| stream.generation != ticket.generation);
            removed = streams.len() != before;
            if streams.is_empty() {
                state.pending.remove(&ticket.key);
            }
        }

        let owns_writer = state.writers.get(&ticket.key.method).is_some_and(|writer| {
            writer.generation == ticket.generation && writer.namespace == ticket.key.namespace
        });
        if owns_writer {
            state.writers.remove(&ticket.key.method);
            removed = true;
        }
        removed
    }

    /// Stores the write queue of a freshly opened bidirectional stream.
    ///
    /// Replaces any handle previously stored under the same method. Returns
    /// `false`, storing nothing, if the ticket was torn down in the meantime.
    pub(crate) fn attach_writer(
        &self,
        ticket: &StreamTicket,
        queue: mpsc::UnboundedSender<WriteRequest>,
    ) -> bool {
        let mut state = self.lock();
        let live = state.pending.get(&ticket.key).is_some_and(|streams| {
            streams.iter().any(|stream| stream.generation == ticket.generation)
        });
        if !live {
            return false;
        }
        state.writers.insert(
            ticket.key.method.clone(),
            Writer {
                namespace: ticket.key.namespace.clone(),
                generation: ticket.generation,
                queue,
            },
        );
        true
    }

    /// Write queue for `method`, if a bidirectional stream is open.
    pub(crate) fn writer(&self, method: &str) -> Option<mpsc::UnboundedSender<WriteRequest>> {
        self.lock().writers.get(method).map(|writer| writer.queue.clone())
    }

    /// Removes every pending stream and write handle owned by `namespace`.
    ///
    /// Idempotent: a second call removes nothing.
    pub fn disconnect(&self, namespace: &str) -> Teardown {
        let mut state = self.lock();
        let mut teardown = Teardown::default();

        state.pending.retain(|key, streams| {
            if key.namespace == namespace {
                teardown.streams += streams.len();
                false
            } else {
                true
            }
        });
        state.writers.retain(|_, writer| {
            if writer.namespace == namespace {
                teardown.writers += 1;
                false
            } else {
                true
            }
        });
        teardown
    }

    /// Returns `true` if a stream for `(namespace, method)` is active.
    pub fn is_active(&self, namespace: &str, method: &str) -> bool {
        self.lock().pending.contains_key(&StreamKey::new(namespace, method))
    }

    /// Sorted methods with an active stream in `namespace`.
    pub fn active_streams(&self, namespace: &str) -> Vec<String> {
        let mut methods: Vec<String> = self
            .lock()
            .pending
            .keys()
            .filter(|key| key.namespace == namespace)
            .map(|key| key.method.clone())
            .collect();
        methods.sort();
        methods
    }

    /// Namespaces that currently own any stream or write handle.
    pub fn namespaces(&self) -> Vec<String> {
        let state = self.lock();
        let mut namespaces: Vec<String> = state
            .pending
            .keys()
            .map(|key| key.namespace.clone())
            .chain(state.writers.values().map(|writer| writer.namespace.clone()))
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Returns `true` if `method` has an open write handle.
    pub fn has_writer(&self, method: &str) -> bool { self.lock().writers.contains_key(method) }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SessionManager")
            .field("pending", &state.pending.keys().collect::<Vec<_>>())
            .field("writers", &state.writers.keys().collect::<Vec<_>>())
            .finish()
    }
}
