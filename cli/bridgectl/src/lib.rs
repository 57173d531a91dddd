#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
//! Building blocks of the `bridgectl` command-line harness.
//!
//! A [`Session`] wires a [`Dispatcher`] to the loopback node so every bridge
//! operation can be exercised from a shell.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge::{
    BridgeError, BridgeEvent, Dispatcher, EventEmitter, StreamCallback, UnaryCallback,
    WriteCallback,
};
use loopback::LoopbackNode;
use nodebridge_config::{BridgeSettings, Config, ConfigError};
use nodebridge_logging::LoggingError;
use registry::{lnd, InvocationKind, MethodRegistryReader, RegistryError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::timeout;

/// Bidirectional method used by [`Session::accept`].
pub const ACCEPTOR_METHOD: &str = "ChannelAcceptor";

/// Errors reported by `bridgectl`.
#[derive(Debug, Error)]
pub enum CliError {
    /// The bridge rejected or failed the command.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// The method tables could not be built.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Loading or saving configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Installing the log subscriber failed.
    #[error(transparent)]
    Logging(#[from] LoggingError),
    /// Encoding output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Writing output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Any other failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// A dispatcher backed by the loopback node.
#[derive(Debug)]
pub struct Session {
    dispatcher: Dispatcher,
    node: LoopbackNode,
}

impl Session {
    /// Builds a session on the current runtime.
    pub fn loopback(settings: &BridgeSettings) -> Result<Self> {
        let node = LoopbackNode::new();
        let dispatcher = Dispatcher::with_events(
            node.registry()?,
            EventEmitter::new(settings.event_capacity),
            Handle::current(),
        );
        Ok(Self { dispatcher, node })
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher { &self.dispatcher }

    /// Runs a unary command and returns the base64 reply.
    pub async fn call(&self, namespace: &str, method: &str, payload: &str) -> Result<String> {
        let (callback, reply) = UnaryCallback::channel();
        self.dispatcher.send_command(namespace, method, payload, callback);
        let reply = reply.await.map_err(|_| CliError::Message("no reply".to_string()))?;
        Ok(reply?)
    }

    /// Starts a stream and collects up to `count` events, waiting at most
    /// `wait` for each.
    pub async fn subscribe(
        &self,
        namespace: &str,
        method: &str,
        payload: &str,
        count: usize,
        wait: Duration,
    ) -> Result<Vec<BridgeEvent>> {
        let request = codec::decode(payload).map_err(BridgeError::from)?;
        let mut events = self.dispatcher.events();
        self.dispatcher.send_stream_command(namespace, method, payload, true, StreamCallback::noop());
        // The loopback stream echoes the request once; replay it for the rest.
        for _ in 1..count {
            self.node.broadcast(request.clone());
        }

        let mut collected = Vec::with_capacity(count);
        while collected.len() < count {
            match timeout(wait, events.recv_named(method)).await {
                Ok(Some(event)) => {
                    let failed = event.is_error();
                    collected.push(event);
                    if failed {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.dispatcher.disconnect(namespace);
        Ok(collected)
    }

    /// Opens the channel acceptor, writes `message` and returns the echo.
    pub async fn accept(&self, namespace: &str, message: &str, wait: Duration) -> Result<String> {
        let (callback, mut replies) = StreamCallback::channel();
        self.dispatcher.send_bidi_stream_command(namespace, ACCEPTOR_METHOD, true, callback);

        let (written, write_reply) = WriteCallback::channel();
        self.dispatcher.write_to_stream(ACCEPTOR_METHOD, message, written);
        write_reply.await.map_err(|_| CliError::Message("write not acknowledged".to_string()))??;

        let echoed = timeout(wait, replies.recv())
            .await
            .map_err(|_| CliError::Message(format!("no reply from {ACCEPTOR_METHOD}")))?
            .ok_or_else(|| CliError::Message(format!("{ACCEPTOR_METHOD} closed")))?;
        self.dispatcher.disconnect(namespace);
        Ok(echoed?)
    }
}

/// Writes the catalogue, optionally restricted to one kind, one method per
/// line as `kind<TAB>name<TAB>category`.
pub fn list_methods(kind: Option<InvocationKind>, out: &mut impl Write) -> Result<()> {
    let registry = LoopbackNode::new().registry()?;
    let kinds: Vec<InvocationKind> = match kind {
        Some(kind) => vec![kind],
        None => InvocationKind::ALL.to_vec(),
    };
    for kind in kinds {
        for name in registry.method_names(kind) {
            let category = lnd::find(kind, name)
                .map(|entry| entry.category.display_name())
                .unwrap_or("custom");
            writeln!(out, "{kind}\t{name}\t{category}")?;
        }
    }
    Ok(())
}

/// Resolves `--config`, falling back to the default location.
pub fn config_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(Config::default_path()?),
    }
}

/// Writes a default configuration to `path`.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn init_config(path: &Path, force: bool) -> Result<Config> {
    if path.exists() && !force {
        return Err(CliError::Message(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let config = Config::default();
    config.save(path)?;
    Ok(config)
}
