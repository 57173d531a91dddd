//! Catalogue of the method names exposed by the embedded LND node.
//!
//! The catalogue is the reference list a backend is expected to register.
//! It carries no entry points itself; [`MethodRegistry::missing_from_catalogue`]
//! compares a registry against it.
//!
//! [`MethodRegistry::missing_from_catalogue`]: crate::MethodRegistry::missing_from_catalogue

use crate::InvocationKind;

/// Functional grouping of a catalogue method, used for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MethodCategory {
    /// Invoice creation, lookup and subscription
    Invoice,
    /// Channel lifecycle and backups
    Channel,
    /// Payments and routing
    Payment,
    /// On-chain wallet operations
    Onchain,
    /// Wallet creation, unlocking and key derivation
    Wallet,
    /// Peer connections
    Peer,
    /// Network graph queries
    Graph,
    /// Message signing and verification
    Signer,
    /// Autopilot channel management
    Autopilot,
    /// Node state subscription
    State,
    /// Node process control
    Control,
}

impl MethodCategory {
    /// Canonical display name used for sorting and headings
    pub fn display_name(&self) -> &'static str {
        match self {
            MethodCategory::Invoice => "invoice",
            MethodCategory::Channel => "channel",
            MethodCategory::Payment => "payment",
            MethodCategory::Onchain => "onchain",
            MethodCategory::Wallet => "wallet",
            MethodCategory::Peer => "peer",
            MethodCategory::Graph => "graph",
            MethodCategory::Signer => "signer",
            MethodCategory::Autopilot => "autopilot",
            MethodCategory::State => "state",
            MethodCategory::Control => "control",
        }
    }
}

/// One method the node is expected to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueEntry {
    /// Exact method name.
    pub name: &'static str,
    /// Table the method lives in.
    pub kind: InvocationKind,
    /// Functional grouping.
    pub category: MethodCategory,
}

const fn unary(name: &'static str, category: MethodCategory) -> CatalogueEntry {
    CatalogueEntry { name, kind: InvocationKind::Unary, category }
}

const fn server_stream(name: &'static str, category: MethodCategory) -> CatalogueEntry {
    CatalogueEntry { name, kind: InvocationKind::ServerStream, category }
}

const fn bidi_stream(name: &'static str, category: MethodCategory) -> CatalogueEntry {
    CatalogueEntry { name, kind: InvocationKind::BidiStream, category }
}

use MethodCategory as C;

/// Every method name the embedded node exposes, grouped by table.
pub static CATALOGUE: &[CatalogueEntry] = &[
    unary("AddInvoice", C::Invoice),
    unary("InvoicesCancelInvoice", C::Invoice),
    unary("LookupInvoice", C::Invoice),
    unary("ListInvoices", C::Invoice),
    unary("DecodePayReq", C::Payment),
    unary("SendPaymentSync", C::Payment),
    unary("RouterResetMissionControl", C::Payment),
    unary("QueryRoutes", C::Payment),
    unary("ListPayments", C::Payment),
    unary("ConnectPeer", C::Peer),
    unary("ListPeers", C::Peer),
    unary("DisconnectPeer", C::Peer),
    unary("DescribeGraph", C::Graph),
    unary("GetNodeInfo", C::Graph),
    unary("GetChanInfo", C::Graph),
    unary("GetNetworkInfo", C::Graph),
    unary("GetInfo", C::State),
    unary("GetRecoveryInfo", C::State),
    unary("ChannelBalance", C::Channel),
    unary("ListChannels", C::Channel),
    unary("OpenChannelSync", C::Channel),
    unary("PendingChannels", C::Channel),
    unary("ClosedChannels", C::Channel),
    unary("ExportAllChannelBackups", C::Channel),
    unary("RestoreChannelBackups", C::Channel),
    unary("VerifyChanBackup", C::Channel),
    unary("AbandonChannel", C::Channel),
    unary("GetTransactions", C::Onchain),
    unary("NewAddress", C::Onchain),
    unary("SendCoins", C::Onchain),
    unary("WalletBalance", C::Onchain),
    unary("WalletKitListUnspent", C::Onchain),
    unary("BumpFee", C::Onchain),
    unary("GenSeed", C::Wallet),
    unary("InitWallet", C::Wallet),
    unary("UnlockWallet", C::Wallet),
    unary("WalletKitDeriveKey", C::Wallet),
    unary("VerifyMessage", C::Signer),
    unary("SignMessage", C::Signer),
    unary("SignerSignMessage", C::Signer),
    unary("AutopilotStatus", C::Autopilot),
    unary("AutopilotModifyStatus", C::Autopilot),
    unary("AutopilotQueryScores", C::Autopilot),
    unary("AutopilotSetScores", C::Autopilot),
    unary("StopDaemon", C::Control),
    server_stream("RouterSendPaymentV2", C::Payment),
    server_stream("RouterTrackPaymentV2", C::Payment),
    server_stream("SubscribeState", C::State),
    server_stream("CloseChannel", C::Channel),
    server_stream("SubscribeChannelEvents", C::Channel),
    server_stream("SubscribeChannelGraph", C::Graph),
    server_stream("SubscribeTransactions", C::Onchain),
    server_stream("SubscribeInvoices", C::Invoice),
    bidi_stream("ChannelAcceptor", C::Channel),
];

/// Catalogue entries of one kind.
pub fn entries(kind: InvocationKind) -> impl Iterator<Item = &'static CatalogueEntry> {
    CATALOGUE.iter().filter(move |entry| entry.kind == kind)
}

/// Finds the catalogue entry for `name` in the table for `kind`.
pub fn find(kind: InvocationKind, name: &str) -> Option<&'static CatalogueEntry> {
    entries(kind).find(|entry| entry.name == name)
}
