//! End-to-end scenarios over real loopback UDP sockets.

use bitdht::config::Config;
use bitdht::node::Node;
use bitdht::{Contact, Error};
use std::sync::Arc;

async fn spin_up() -> Arc<Node> {
    let mut config = Config::default();
    config.listen_addr = "127.0.0.1".to_string();
    config.listen_port = 0;
    config.data_dir = std::env::temp_dir()
        .join(format!("bitdht-test-{}", bitdht::NodeId::random()))
        .to_string_lossy()
        .to_string();
    let node = Node::new(config).await.expect("node should bind");
    let node = Arc::new(node);
    let _ = node.start();
    node
}

#[tokio::test]
async fn single_node_get_miss_returns_absent() {
    let a = spin_up().await;
    let result = a.get(b"x").await;
    assert!(result.is_none());
}

#[tokio::test]
async fn two_node_set_then_get_round_trips() {
    let a = spin_up().await;
    let b = spin_up().await;

    let b_addr = b.local_addr().unwrap();
    let b_contact = Contact::new(b.local_id(), b_addr);
    a.bootstrap(vec![b_contact]).await.unwrap();

    let ok = a
        .set(b"x", bitdht::Value::String("v".to_string()))
        .await
        .unwrap();
    assert!(ok);

    let found = b.get(b"x").await;
    assert_eq!(found, Some(bitdht::Value::String("v".to_string())));
}

#[tokio::test]
async fn set_on_empty_routing_table_fails_without_transmitting() {
    let a = spin_up().await;
    let err = a
        .set(b"x", bitdht::Value::Bool(true))
        .await
        .expect_err("no neighbors yet");
    assert!(matches!(err, Error::NoNeighbors));
}
