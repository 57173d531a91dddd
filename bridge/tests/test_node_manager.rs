use std::path::PathBuf;
use std::sync::Arc;

use bridge::{BridgeError, Dispatcher, NodeManager, NodeStatus, StreamCallback, UnaryCallback};
use loopback::{LaunchEvent, LoopbackLauncher, LoopbackNode};
use nodebridge_config::NodeConfig;
use tokio::runtime::Handle;
use transport::TransportError;

fn node_config() -> NodeConfig {
    NodeConfig {
        lnd_dir: PathBuf::from("/data/lnd"),
        network: Some("testnet".to_string()),
        tor_enabled: false,
        extra_args: vec!["--norest".to_string()],
    }
}

fn manager(node: &LoopbackNode, launcher: &LoopbackLauncher) -> NodeManager {
    let dispatcher = Dispatcher::new(node.registry().expect("registry"), Handle::current());
    NodeManager::new(dispatcher, Arc::new(launcher.clone()))
}

async fn unary(manager: &NodeManager, namespace: &str, method: &str) -> bridge::UnaryReply {
    let (callback, reply) = UnaryCallback::channel();
    manager.send_command(namespace, method, "", callback);
    reply.await.expect("resolved")
}

#[tokio::test]
async fn test_service_is_always_bound() {
    let manager = manager(&LoopbackNode::new(), &LoopbackLauncher::new());
    assert_eq!(manager.status("anything"), NodeStatus::SERVICE_BOUND);
}

#[tokio::test]
async fn test_start_passes_arguments_and_is_idempotent() {
    let launcher = LoopbackLauncher::new();
    let manager = manager(&LoopbackNode::new(), &launcher);

    manager.start("wallet", &node_config()).await.expect("start");
    manager.start("wallet", &node_config()).await.expect("second start is a no-op");

    assert_eq!(
        launcher.events(),
        vec![LaunchEvent::Started {
            namespace: "wallet".to_string(),
            args: "--lnd.nolisten --lnd.lnddir=\"/data/lnd\" --bitcoin.testnet --norest"
                .to_string(),
        }]
    );
    assert_eq!(manager.status("wallet").bits(), 3);
    assert_eq!(manager.status("other").bits(), 1);
}

#[tokio::test]
async fn test_failed_start_leaves_process_flag_clear() {
    let manager = manager(&LoopbackNode::new(), &LoopbackLauncher::failing("no binary"));
    let err = manager.start("wallet", &node_config()).await.expect_err("launch fails");
    assert_eq!(err, BridgeError::Transport(TransportError::Launch("no binary".to_string())));
    assert!(!manager.status("wallet").contains(NodeStatus::PROCESS_STARTED));
}

#[tokio::test]
async fn test_stop_sends_stop_daemon_and_tears_down() {
    let node = LoopbackNode::new();
    let launcher = LoopbackLauncher::new();
    let manager = manager(&node, &launcher);
    manager.start("wallet", &node_config()).await.expect("start");
    assert!(unary(&manager, "wallet", "UnlockWallet").await.is_ok());

    let (callback, _replies) = StreamCallback::channel();
    manager.dispatcher().send_stream_command("wallet", "SubscribeState", "", true, callback);
    assert!(manager.dispatcher().is_stream_active("wallet", "SubscribeState"));

    manager.stop("wallet").await.expect("stop");

    assert_eq!(node.call_count("StopDaemon"), 1);
    assert_eq!(
        launcher.events().last(),
        Some(&LaunchEvent::Stopped { namespace: "wallet".to_string() })
    );
    assert!(!manager.dispatcher().is_stream_active("wallet", "SubscribeState"));
    assert_eq!(manager.status("wallet"), NodeStatus::SERVICE_BOUND);
}

#[tokio::test]
async fn test_stop_proceeds_when_node_rejects_stop_daemon() {
    let node = LoopbackNode::new().fail("StopDaemon", "already stopping");
    let launcher = LoopbackLauncher::new();
    let manager = manager(&node, &launcher);
    manager.start("wallet", &node_config()).await.expect("start");

    manager.stop("wallet").await.expect("stop");
    assert_eq!(launcher.events().len(), 2);
}

#[tokio::test]
async fn test_stop_without_start_is_not_started() {
    let manager = manager(&LoopbackNode::new(), &LoopbackLauncher::new());
    assert_eq!(
        manager.stop("wallet").await,
        Err(BridgeError::Transport(TransportError::NotStarted))
    );
}

#[tokio::test]
async fn test_wallet_unlock_sets_flag_only_on_success() {
    let node = LoopbackNode::new().fail("InitWallet", "wallet exists");
    let manager = manager(&node, &LoopbackLauncher::new());

    assert!(unary(&manager, "wallet", "InitWallet").await.is_err());
    assert!(!manager.status("wallet").contains(NodeStatus::WALLET_UNLOCKED));

    assert_eq!(unary(&manager, "wallet", "GetInfo").await, Ok(String::new()));
    assert!(!manager.status("wallet").contains(NodeStatus::WALLET_UNLOCKED));

    assert!(unary(&manager, "wallet", "UnlockWallet").await.is_ok());
    assert!(manager.status("wallet").contains(NodeStatus::WALLET_UNLOCKED));
    assert!(!manager.status("other").contains(NodeStatus::WALLET_UNLOCKED));
}

#[tokio::test]
async fn test_shutdown_stops_every_started_namespace() {
    let launcher = LoopbackLauncher::new();
    let manager = manager(&LoopbackNode::new(), &launcher);
    manager.start("a", &node_config()).await.expect("start a");
    manager.start("b", &node_config()).await.expect("start b");

    manager.shutdown().await.expect("shutdown");

    let mut stopped: Vec<LaunchEvent> = launcher
        .events()
        .into_iter()
        .filter(|event| matches!(event, LaunchEvent::Stopped { .. }))
        .collect();
    stopped.sort_by_key(|event| format!("{event:?}"));
    assert_eq!(
        stopped,
        vec![
            LaunchEvent::Stopped { namespace: "a".to_string() },
            LaunchEvent::Stopped { namespace: "b".to_string() },
        ]
    );
    assert_eq!(manager.status("a"), NodeStatus::SERVICE_BOUND);
    assert_eq!(manager.status("b"), NodeStatus::SERVICE_BOUND);
}
