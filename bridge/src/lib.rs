#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! # `nodebridge-bridge` — UI to node command bridge
//!
//! Lets a UI runtime drive an embedded node by method name, with payloads
//! carried as base64 text on the UI side and raw bytes on the node side.
//!
//! ## Core Concepts
//!
//! ### `Dispatcher`
//! The façade. It decodes the payload, looks the method up in the
//! [`MethodRegistry`](registry::MethodRegistry) table for the invocation
//! kind, invokes the node and routes the outcome to the caller's callback.
//! Every failure is delivered through that callback.
//!
//! ### Callbacks
//! [`UnaryCallback`] fires exactly once, [`StreamCallback`] once per
//! delivery and [`WriteCallback`] once per write. Stream deliveries are also
//! republished as [`BridgeEvent`]s on an [`EventEmitter`].
//!
//! ### `SessionManager`
//! Tracks active streams per `(namespace, method)` and the write side of
//! open bidirectional streams. `disconnect(namespace)` clears both.
//!
//! ### `NodeManager`
//! Starts and stops the node process per namespace and reports its
//! [`NodeStatus`].
//!
//! ## Example
//! ```
//! use bridge::{Dispatcher, UnaryCallback};
//! use bytes::Bytes;
//! use registry::MethodRegistry;
//!
//! # let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! # runtime.block_on(async {
//! let registry = MethodRegistry::builder()
//!     .unary("GetInfo", |req: Bytes| async move { Ok::<_, transport::TransportError>(req) })
//!     .build()
//!     .expect("registry");
//! let dispatcher = Dispatcher::new(registry, tokio::runtime::Handle::current());
//!
//! let (callback, reply) = UnaryCallback::channel();
//! dispatcher.send_command("default", "GetInfo", "CAE=", callback);
//! assert_eq!(reply.await.expect("resolved"), Ok("CAE=".to_string()));
//! # });
//! ```

mod callback;
mod dispatcher;
mod error;
mod events;
mod node;
mod session;

pub use callback::{
    StreamCallback, StreamReply, UnaryCallback, UnaryReply, WriteCallback, WriteReply,
};
pub use dispatcher::Dispatcher;
pub use error::{BridgeError, Result};
pub use events::{BridgeEvent, EventEmitter, EventSubscription, DEFAULT_EVENT_CAPACITY, MAX_EVENT_CAPACITY};
pub use node::{start_args, NodeManager, NodeStatus, STOP_METHOD};
pub use session::{SessionManager, StreamKey, StreamTicket, Teardown};
