//! Embedded node life cycle.
//!
//! [`NodeManager`] owns the [`Dispatcher`] together with the launcher that
//! starts and stops one node process per namespace, and tracks each
//! namespace's [`NodeStatus`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nodebridge_config::NodeConfig;
use tracing::{debug, info, warn};
use transport::{DynLauncher, TransportError};

use crate::callback::UnaryCallback;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Method that asks the node to shut itself down.
pub const STOP_METHOD: &str = "StopDaemon";

const UNLOCK_METHODS: [&str; 2] = ["UnlockWallet", "InitWallet"];

/// Bit flags describing a namespace's node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeStatus(u32);

impl NodeStatus {
    /// The bridge is available. Always set.
    pub const SERVICE_BOUND: NodeStatus = NodeStatus(1);
    /// The node process was started.
    pub const PROCESS_STARTED: NodeStatus = NodeStatus(2);
    /// A wallet unlock or init call succeeded.
    pub const WALLET_UNLOCKED: NodeStatus = NodeStatus(4);

    /// Raw flag bits.
    pub fn bits(self) -> u32 { self.0 }

    /// Returns `true` if every flag in `other` is set.
    pub fn contains(self, other: NodeStatus) -> bool { self.0 & other.0 == other.0 }

    fn insert(&mut self, other: NodeStatus) { self.0 |= other.0 }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::SERVICE_BOUND, "service-bound"),
            (Self::PROCESS_STARTED, "process-started"),
            (Self::WALLET_UNLOCKED, "wallet-unlocked"),
        ];
        let set: Vec<&str> =
            names.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect();
        if set.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&set.join("|"))
        }
    }
}

/// Builds the node's start argument string from `config`.
pub fn start_args(config: &NodeConfig) -> String {
    let mut args = format!("--lnd.nolisten --lnd.lnddir=\"{}\"", config.lnd_dir.display());
    if let Some(network) = &config.network {
        args.push_str(&format!(" --bitcoin.{network}"));
    }
    for extra in &config.extra_args {
        args.push(' ');
        args.push_str(extra);
    }
    if config.tor_enabled {
        args.push_str(" --tor.active");
    }
    args
}

type Statuses = Arc<Mutex<HashMap<String, NodeStatus>>>;

fn lock(statuses: &Statuses) -> MutexGuard<'_, HashMap<String, NodeStatus>> {
    statuses.lock().unwrap_or_else(PoisonError::into_inner)
}

fn mark(statuses: &Statuses, namespace: &str, flag: NodeStatus) {
    lock(statuses).entry(namespace.to_string()).or_default().insert(flag);
}

/// Starts, stops and tracks embedded nodes.
pub struct NodeManager {
    dispatcher: Dispatcher,
    launcher: DynLauncher,
    statuses: Statuses,
    // Serialises start and stop so a namespace is never launched twice.
    lifecycle: tokio::sync::Mutex<()>,
}

impl NodeManager {
    /// Creates a manager routing commands through `dispatcher`.
    pub fn new(dispatcher: Dispatcher, launcher: DynLauncher) -> Self {
        Self {
            dispatcher,
            launcher,
            statuses: Arc::default(),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// The dispatcher commands are routed through.
    pub fn dispatcher(&self) -> &Dispatcher { &self.dispatcher }

    /// Current flags for `namespace`.
    pub fn status(&self, namespace: &str) -> NodeStatus {
        let mut status = lock(&self.statuses).get(namespace).copied().unwrap_or_default();
        status.insert(NodeStatus::SERVICE_BOUND);
        status
    }

    /// Starts the node for `namespace`. A no-op if it is already running.
    pub async fn start(&self, namespace: &str, config: &NodeConfig) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.status(namespace).contains(NodeStatus::PROCESS_STARTED) {
            debug!(namespace, "node already started");
            return Ok(());
        }

        let args = start_args(config);
        info!(namespace, %args, "starting node");
        self.launcher.start(namespace, &args).await?;
        mark(&self.statuses, namespace, NodeStatus::PROCESS_STARTED);
        Ok(())
    }

    /// Stops the node for `namespace` and tears down its streams.
    ///
    /// The node is first asked to stop itself with [`STOP_METHOD`]; a
    /// failure there is logged and the launcher is stopped regardless.
    pub async fn stop(&self, namespace: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if !self.status(namespace).contains(NodeStatus::PROCESS_STARTED) {
            return Err(TransportError::NotStarted.into());
        }

        let (callback, reply) = UnaryCallback::channel();
        self.dispatcher.send_command(namespace, STOP_METHOD, "", callback);
        match reply.await {
            Ok(Ok(_)) => debug!(namespace, "node acknowledged stop"),
            Ok(Err(err)) => warn!(namespace, %err, "node rejected stop request"),
            Err(_) => warn!(namespace, "stop request dropped"),
        }

        let stopped = self.launcher.stop(namespace).await;
        self.dispatcher.disconnect(namespace);
        lock(&self.statuses).remove(namespace);
        info!(namespace, "node stopped");
        stopped?;
        Ok(())
    }

    /// Stops every started namespace, returning the first error.
    pub async fn shutdown(&self) -> Result<()> {
        let started: Vec<String> = lock(&self.statuses)
            .iter()
            .filter(|(_, status)| status.contains(NodeStatus::PROCESS_STARTED))
            .map(|(namespace, _)| namespace.clone())
            .collect();

        let mut first_error = None;
        for namespace in started {
            if let Err(err) = self.stop(&namespace).await {
                warn!(namespace = %namespace, %err, "failed to stop node");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Invokes a unary method through the dispatcher.
    ///
    /// A successful wallet unlock or init sets
    /// [`NodeStatus::WALLET_UNLOCKED`] for `namespace`.
    pub fn send_command(&self, namespace: &str, method: &str, payload: &str, callback: UnaryCallback) {
        if !UNLOCK_METHODS.contains(&method) {
            return self.dispatcher.send_command(namespace, method, payload, callback);
        }

        let statuses = Arc::clone(&self.statuses);
        let owner = namespace.to_string();
        let tracked = UnaryCallback::new(move |reply| {
            if reply.is_ok() {
                mark(&statuses, &owner, NodeStatus::WALLET_UNLOCKED);
            }
            callback.resolve(reply);
        });
        self.dispatcher.send_command(namespace, method, payload, tracked);
    }
}

impl fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeManager")
            .field("dispatcher", &self.dispatcher)
            .field("statuses", &*lock(&self.statuses))
            .finish()
    }
}
