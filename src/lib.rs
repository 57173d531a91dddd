// SPDX-License-Identifier: CC0-1.0

//! NodeBridge umbrella crate.
//!
//! Re-exports the public surface of the workspace so that an embedding
//! application (the UI runtime side of the bridge) can depend on a single
//! crate. All functional code lives in the member crates under `primitives/`,
//! `bridge/`, `backends/` and `infra/`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![warn(deprecated_in_future)]
#![doc(test(attr(warn(unused))))]

pub use bridge::{
    BridgeError, BridgeEvent, Dispatcher, EventEmitter, EventSubscription, NodeManager,
    NodeStatus, StreamCallback, UnaryCallback, WriteCallback,
};
pub use codec::{decode, encode, DecodeError};
pub use registry::{InvocationKind, MethodRegistry, RegistryBuilder, RegistryError};
pub use transport::{NodeLauncher, StreamSink, TransportError, WriteHandle};

/// Miscellaneous metadata about the NodeBridge workspace.
pub mod nodebridge_meta {
    /// Version string for the umbrella crate, as reported by Cargo.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
