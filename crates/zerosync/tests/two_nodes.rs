//! End-to-end reconciliation between nodes over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use zerosync::store::{SqliteStore, Store};
use zerosync::sync::{MemoryNetwork, MemoryTransport};
use zerosync::{Database, Node, NodeConfig, PeerId, State};
use zerosync_testkit::TestRoot;

type TestNode = Node<SqliteStore, MemoryTransport>;

struct Peer {
    id: PeerId,
    dir: TestRoot,
    node: Arc<TestNode>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn peer(network: &Arc<MemoryNetwork>, name: &str) -> Peer {
    let id = PeerId::new(name);
    let dir = TestRoot::new();
    let config = NodeConfig::new(dir.path())
        .with_database(Database::Memory)
        .with_chunk_size(4);
    let transport = Arc::new(network.create_transport(id.clone(), config.sync.chunk_size));
    let node = Arc::new(Node::open(config, transport).await.unwrap());
    Peer { id, dir, node }
}

async fn connect(network: &MemoryNetwork, peers: &[&Peer]) {
    for p in peers {
        network.attach(p.id.clone(), p.node.callbacks()).await;
    }
}

/// Make sure the next write gets a strictly later mtime.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_new_file_propagates_without_echo() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = peer(&network, "a").await;
    let b = peer(&network, "b").await;
    connect(&network, &[&a, &b]).await;

    a.dir.write("docs/readme.md", b"hello, peers");
    let report = a.node.index_once().await;
    assert_eq!(report.state, Some(State(1)));

    assert_eq!(b.dir.read("docs/readme.md").as_deref(), Some(&b"hello, peers"[..]));

    // B received the change; it must not announce it as its own
    assert!(b.node.index_once().await.is_empty());
    assert_eq!(b.node.store().latest_state().await.unwrap(), State::ZERO);
    assert!(a.node.index_once().await.is_empty());
}

#[tokio::test]
async fn test_rename_and_delete_propagate() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = peer(&network, "a").await;
    let b = peer(&network, "b").await;
    connect(&network, &[&a, &b]).await;

    a.dir.write("old.txt", b"moving content");
    a.node.index_once().await;
    b.node.index_once().await;
    assert!(b.dir.exists("old.txt"));

    a.dir.rename("old.txt", "new.txt");
    let report = a.node.index_once().await;
    assert_eq!(report.state, Some(State(2)));

    assert!(!b.dir.exists("old.txt"));
    assert_eq!(b.dir.read("new.txt").as_deref(), Some(&b"moving content"[..]));
    assert!(b.node.index_once().await.is_empty());

    a.dir.remove("new.txt");
    assert_eq!(a.node.index_once().await.state, Some(State(3)));

    assert!(!b.dir.exists("new.txt"));
    assert!(b.node.index_once().await.is_empty());
    assert!(b.node.store().file_record("new.txt").await.unwrap().unwrap().flags.deleted);
}

#[tokio::test]
async fn test_catch_up_keeps_newer_local_content() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = peer(&network, "a").await;
    let b = peer(&network, "b").await;

    // Both edit offline; B's edit is later
    a.dir.write("shared.txt", b"from a");
    a.node.index_once().await;
    tick().await;
    b.dir.write("shared.txt", b"from b, later");
    b.node.index_once().await;

    connect(&network, &[&a, &b]).await;
    b.node.start().await.unwrap();
    assert_eq!(b.dir.read("shared.txt").as_deref(), Some(&b"from b, later"[..]));

    a.node.start().await.unwrap();
    assert_eq!(a.dir.read("shared.txt").as_deref(), Some(&b"from b, later"[..]));

    assert!(a.node.index_once().await.is_empty());
    assert!(b.node.index_once().await.is_empty());
}

#[tokio::test]
async fn test_three_peers_converge() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = peer(&network, "a").await;
    let b = peer(&network, "b").await;
    let c = peer(&network, "c").await;
    connect(&network, &[&a, &b, &c]).await;

    a.dir.write("one.bin", &[1u8; 37]);
    a.node.index_once().await;
    tick().await;
    c.dir.write("two.bin", &[2u8; 5]);
    c.node.index_once().await;

    for p in [&a, &b, &c] {
        assert_eq!(p.dir.read("one.bin"), Some(vec![1u8; 37]));
        assert_eq!(p.dir.read("two.bin"), Some(vec![2u8; 5]));
        assert!(p.node.index_once().await.is_empty());
    }
}

#[tokio::test]
async fn test_empty_file_propagates() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = peer(&network, "a").await;
    let b = peer(&network, "b").await;
    connect(&network, &[&a, &b]).await;

    a.dir.write("empty", b"");
    a.node.index_once().await;

    assert_eq!(b.dir.read("empty"), Some(Vec::new()));
    assert!(b.node.index_once().await.is_empty());
}
