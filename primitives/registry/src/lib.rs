#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! Method Registry: the immutable map from method name to node entry point.
//!
//! A registry is partitioned into three disjoint tables, one per
//! [`InvocationKind`]. Names are matched exactly (case-sensitive, no
//! normalization); the same name may appear in more than one table and the
//! entries are unrelated.
//!
//! Registries are assembled once with a [`RegistryBuilder`]. Registering the
//! same name twice in one table is reported by [`RegistryBuilder::build`], so
//! a misconfigured backend fails at startup instead of at call time.
//!
//! ```
//! use bytes::Bytes;
//! use registry::{InvocationKind, MethodRegistryReader, RegistryBuilder};
//!
//! let registry = RegistryBuilder::new()
//!     .unary("GetInfo", |req: Bytes| async move { Ok::<_, transport::TransportError>(req) })
//!     .build()
//!     .expect("no duplicates");
//!
//! assert!(registry.contains(InvocationKind::Unary, "GetInfo"));
//! assert!(!registry.contains(InvocationKind::Unary, "getinfo"));
//! assert!(registry.lookup_unary("NoSuchMethod").is_none());
//! ```

pub mod lnd;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use transport::{BidiStreamMethod, ServerStreamMethod, UnaryMethod};

pub use lnd::{CatalogueEntry, MethodCategory};

/// Result alias for registry construction.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised while assembling a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The same name was registered twice in one table.
    #[error("method {name} registered twice as {kind}")]
    DuplicateMethod {
        /// Table that received the duplicate.
        kind: InvocationKind,
        /// The repeated method name.
        name: String,
    },
}

/// Invocation shape of a method, fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationKind {
    /// One request, one response.
    Unary,
    /// One request, zero or more pushed responses.
    ServerStream,
    /// Long-lived stream with messages in both directions.
    BidiStream,
}

impl InvocationKind {
    /// All kinds, in table order.
    pub const ALL: [InvocationKind; 3] =
        [InvocationKind::Unary, InvocationKind::ServerStream, InvocationKind::BidiStream];

    /// Get the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationKind::Unary => "unary",
            InvocationKind::ServerStream => "server-stream",
            InvocationKind::BidiStream => "bidi-stream",
        }
    }

    /// Returns `true` for the two streaming kinds.
    pub fn is_streaming(&self) -> bool { !matches!(self, InvocationKind::Unary) }
}

impl FromStr for InvocationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unary" => Ok(InvocationKind::Unary),
            "server-stream" => Ok(InvocationKind::ServerStream),
            "bidi-stream" => Ok(InvocationKind::BidiStream),
            _ => Err(format!("Unknown invocation kind: {}", s)),
        }
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A registered node entry point of any kind.
#[derive(Clone)]
pub enum MethodEntry {
    /// Unary entry.
    Unary(Arc<dyn UnaryMethod>),
    /// Server-stream entry.
    ServerStream(Arc<dyn ServerStreamMethod>),
    /// Bidirectional-stream entry.
    BidiStream(Arc<dyn BidiStreamMethod>),
}

impl MethodEntry {
    /// Kind of this entry.
    pub fn kind(&self) -> InvocationKind {
        match self {
            MethodEntry::Unary(_) => InvocationKind::Unary,
            MethodEntry::ServerStream(_) => InvocationKind::ServerStream,
            MethodEntry::BidiStream(_) => InvocationKind::BidiStream,
        }
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodEntry").field(&self.kind()).finish()
    }
}

/// Collects entries for a [`MethodRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    unary: BTreeMap<String, Arc<dyn UnaryMethod>>,
    server_stream: BTreeMap<String, Arc<dyn ServerStreamMethod>>,
    bidi_stream: BTreeMap<String, Arc<dyn BidiStreamMethod>>,
    duplicate: Option<RegistryError>,
}

impl RegistryBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self { Self::default() }

    /// Registers a unary entry.
    pub fn unary(mut self, name: impl Into<String>, method: impl UnaryMethod + 'static) -> Self {
        let name = name.into();
        if self.unary.contains_key(&name) {
            self.note_duplicate(InvocationKind::Unary, name);
        } else {
            self.unary.insert(name, Arc::new(method));
        }
        self
    }

    /// Registers a server-stream entry.
    pub fn server_stream(
        mut self,
        name: impl Into<String>,
        method: impl ServerStreamMethod + 'static,
    ) -> Self {
        let name = name.into();
        if self.server_stream.contains_key(&name) {
            self.note_duplicate(InvocationKind::ServerStream, name);
        } else {
            self.server_stream.insert(name, Arc::new(method));
        }
        self
    }

    /// Registers a bidirectional-stream entry.
    pub fn bidi_stream(
        mut self,
        name: impl Into<String>,
        method: impl BidiStreamMethod + 'static,
    ) -> Self {
        let name = name.into();
        if self.bidi_stream.contains_key(&name) {
            self.note_duplicate(InvocationKind::BidiStream, name);
        } else {
            self.bidi_stream.insert(name, Arc::new(method));
        }
        self
    }

    // Only the first duplicate is reported.
    fn note_duplicate(&mut self, kind: InvocationKind, name: String) {
        if self.duplicate.is_none() {
            self.duplicate = Some(RegistryError::DuplicateMethod { kind, name });
        }
    }

    /// Freezes the tables.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateMethod`] if any table received the
    /// same name twice.
    pub fn build(self) -> Result<MethodRegistry> {
        if let Some(err) = self.duplicate {
            return Err(err);
        }
        Ok(MethodRegistry {
            unary: self.unary,
            server_stream: self.server_stream,
            bidi_stream: self.bidi_stream,
        })
    }
}

/// Immutable, string-keyed tables of node entry points.
#[derive(Default)]
pub struct MethodRegistry {
    unary: BTreeMap<String, Arc<dyn UnaryMethod>>,
    server_stream: BTreeMap<String, Arc<dyn ServerStreamMethod>>,
    bidi_stream: BTreeMap<String, Arc<dyn BidiStreamMethod>>,
}

impl MethodRegistry {
    /// Start assembling a registry.
    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

    /// Looks `name` up in the table for `kind`.
    pub fn lookup(&self, name: &str, kind: InvocationKind) -> Option<MethodEntry> {
        match kind {
            InvocationKind::Unary => self.lookup_unary(name).map(MethodEntry::Unary),
            InvocationKind::ServerStream => {
                self.lookup_server_stream(name).map(MethodEntry::ServerStream)
            }
            InvocationKind::BidiStream => self.lookup_bidi_stream(name).map(MethodEntry::BidiStream),
        }
    }

    /// Looks up a unary entry.
    pub fn lookup_unary(&self, name: &str) -> Option<Arc<dyn UnaryMethod>> {
        self.unary.get(name).cloned()
    }

    /// Looks up a server-stream entry.
    pub fn lookup_server_stream(&self, name: &str) -> Option<Arc<dyn ServerStreamMethod>> {
        self.server_stream.get(name).cloned()
    }

    /// Looks up a bidirectional-stream entry.
    pub fn lookup_bidi_stream(&self, name: &str) -> Option<Arc<dyn BidiStreamMethod>> {
        self.bidi_stream.get(name).cloned()
    }

    /// Catalogue methods this registry does not provide, in catalogue order.
    pub fn missing_from_catalogue(&self) -> Vec<&'static CatalogueEntry> {
        lnd::CATALOGUE.iter().filter(|entry| !self.contains(entry.kind, entry.name)).collect()
    }

    /// Returns `true` when every catalogue method is registered.
    pub fn covers_catalogue(&self) -> bool { self.missing_from_catalogue().is_empty() }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("unary", &self.unary.keys().collect::<Vec<_>>())
            .field("server_stream", &self.server_stream.keys().collect::<Vec<_>>())
            .field("bidi_stream", &self.bidi_stream.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Read-only interface to a [`MethodRegistry`].
///
/// Provides a clean API for introspection without exposing the entries.
pub trait MethodRegistryReader {
    /// Sorted method names registered for `kind`.
    fn method_names(&self, kind: InvocationKind) -> Vec<&str>;

    /// Returns `true` if `name` is registered for `kind`.
    fn contains(&self, kind: InvocationKind, name: &str) -> bool;

    /// Number of methods registered for `kind`.
    fn method_count(&self, kind: InvocationKind) -> usize;
}

impl MethodRegistryReader for MethodRegistry {
    fn method_names(&self, kind: InvocationKind) -> Vec<&str> {
        match kind {
            InvocationKind::Unary => self.unary.keys().map(|s| s.as_str()).collect(),
            InvocationKind::ServerStream => self.server_stream.keys().map(|s| s.as_str()).collect(),
            InvocationKind::BidiStream => self.bidi_stream.keys().map(|s| s.as_str()).collect(),
        }
    }

    fn contains(&self, kind: InvocationKind, name: &str) -> bool {
        match kind {
            InvocationKind::Unary => self.unary.contains_key(name),
            InvocationKind::ServerStream => self.server_stream.contains_key(name),
            InvocationKind::BidiStream => self.bidi_stream.contains_key(name),
        }
    }

    fn method_count(&self, kind: InvocationKind) -> usize {
        match kind {
            InvocationKind::Unary => self.unary.len(),
            InvocationKind::ServerStream => self.server_stream.len(),
            InvocationKind::BidiStream => self.bidi_stream.len(),
        }
    }
}
