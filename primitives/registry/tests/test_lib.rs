use std::sync::Arc;

use bytes::Bytes;
use registry::{
    lnd, InvocationKind, MethodEntry, MethodRegistry, MethodRegistryReader, RegistryBuilder,
    RegistryError,
};
use transport::{StreamSink, TransportError, WriteHandle};

/// Helper returning a unary entry that echoes its request
fn echo() -> impl Fn(Bytes) -> std::future::Ready<Result<Bytes, TransportError>> + Send + Sync {
    |req: Bytes| std::future::ready(Ok(req))
}

/// Helper returning a server-stream entry that delivers nothing
fn silent_stream() -> impl Fn(Bytes, StreamSink) -> Result<(), TransportError> + Send + Sync {
    |_req: Bytes, _sink: StreamSink| Ok(())
}

/// Helper returning a bidi entry that cannot be opened
fn refusing_bidi() -> impl Fn(StreamSink) -> Result<Arc<dyn WriteHandle>, TransportError> + Send + Sync
{
    |_sink: StreamSink| Err(TransportError::Other("refused".to_string()))
}

#[test]
fn test_empty_registry() {
    let registry = RegistryBuilder::new().build().expect("empty registry builds");
    for kind in InvocationKind::ALL {
        assert_eq!(registry.method_count(kind), 0);
        assert!(registry.method_names(kind).is_empty());
    }
    assert!(registry.lookup("GetInfo", InvocationKind::Unary).is_none());
}

#[test]
fn test_exact_name_matching() {
    let registry = MethodRegistry::builder().unary("GetInfo", echo()).build().expect("builds");

    assert!(registry.lookup_unary("GetInfo").is_some());
    assert!(registry.lookup_unary("getinfo").is_none());
    assert!(registry.lookup_unary("GETINFO").is_none());
    assert!(registry.lookup_unary(" GetInfo").is_none());
    assert!(registry.lookup_unary("GetInfo ").is_none());
}

#[test]
fn test_tables_are_independent_namespaces() {
    let registry = RegistryBuilder::new()
        .unary("SubscribeState", echo())
        .server_stream("SubscribeState", silent_stream())
        .build()
        .expect("same name in different tables is allowed");

    assert!(registry.contains(InvocationKind::Unary, "SubscribeState"));
    assert!(registry.contains(InvocationKind::ServerStream, "SubscribeState"));
    assert!(!registry.contains(InvocationKind::BidiStream, "SubscribeState"));

    match registry.lookup("SubscribeState", InvocationKind::ServerStream) {
        Some(entry @ MethodEntry::ServerStream(_)) => {
            assert_eq!(entry.kind(), InvocationKind::ServerStream)
        }
        other => panic!("unexpected lookup result: {:?}", other),
    }
}

#[test]
fn test_duplicate_is_a_startup_error() {
    let result = RegistryBuilder::new()
        .unary("GetInfo", echo())
        .unary("WalletBalance", echo())
        .unary("GetInfo", echo())
        .build();

    match result {
        Err(RegistryError::DuplicateMethod { kind, name }) => {
            assert_eq!(kind, InvocationKind::Unary);
            assert_eq!(name, "GetInfo");
        }
        Ok(_) => panic!("duplicate registration must fail"),
    }
}

#[test]
fn test_first_duplicate_is_reported() {
    let err = RegistryBuilder::new()
        .bidi_stream("ChannelAcceptor", refusing_bidi())
        .bidi_stream("ChannelAcceptor", refusing_bidi())
        .server_stream("SubscribeInvoices", silent_stream())
        .server_stream("SubscribeInvoices", silent_stream())
        .build()
        .expect_err("duplicates present");

    assert_eq!(
        err,
        RegistryError::DuplicateMethod {
            kind: InvocationKind::BidiStream,
            name: "ChannelAcceptor".to_string()
        }
    );
    assert_eq!(err.to_string(), "method ChannelAcceptor registered twice as bidi-stream");
}

#[test]
fn test_method_names_are_sorted() {
    let registry = RegistryBuilder::new()
        .unary("WalletBalance", echo())
        .unary("AddInvoice", echo())
        .unary("GetInfo", echo())
        .build()
        .expect("builds");

    assert_eq!(
        registry.method_names(InvocationKind::Unary),
        vec!["AddInvoice", "GetInfo", "WalletBalance"]
    );
}

#[tokio::test]
async fn test_lookup_returns_callable_entry() {
    let registry = RegistryBuilder::new().unary("GetInfo", echo()).build().expect("builds");
    let entry = registry.lookup_unary("GetInfo").expect("registered");
    let reply = entry.call(Bytes::from_static(b"\x01\x02")).await.expect("echo");
    assert_eq!(reply.as_ref(), b"\x01\x02");
}

#[test]
fn test_catalogue_coverage() {
    let mut builder = RegistryBuilder::new();
    for entry in lnd::entries(InvocationKind::Unary) {
        builder = builder.unary(entry.name, echo());
    }
    let partial = builder.build().expect("builds");
    let missing = partial.missing_from_catalogue();
    assert!(!partial.covers_catalogue());
    assert_eq!(missing.len(), 9);
    assert!(missing.iter().all(|entry| entry.kind.is_streaming()));

    let mut builder = RegistryBuilder::new();
    for entry in lnd::CATALOGUE {
        builder = match entry.kind {
            InvocationKind::Unary => builder.unary(entry.name, echo()),
            InvocationKind::ServerStream => builder.server_stream(entry.name, silent_stream()),
            InvocationKind::BidiStream => builder.bidi_stream(entry.name, refusing_bidi()),
        };
    }
    let full = builder.build().expect("builds");
    assert!(full.covers_catalogue());
}

#[test]
fn test_kind_parsing() {
    for kind in InvocationKind::ALL {
        assert_eq!(kind.as_str().parse::<InvocationKind>(), Ok(kind));
    }
    assert!("Unary".parse::<InvocationKind>().is_err());
}
