//! S1 — a single writer adds then tombstones a node; the tombstone dot
//! lands in the OR-Set's tombstone set and `observedFrontier`/`appliedVV`
//! both advance to the writer's last lamport.

use eventgraph::config::EngineConfig;
use eventgraph::materialize::Graph;
use eventgraph::model::{Dot, Frontier, Oid};
use eventgraph::storage_port::{CommitWithTreeRequest, InMemoryObjectStore, ObjectStore, TreeEntry};

async fn commit_patch(store: &InMemoryObjectStore, parent: Option<&Oid>, patch: &eventgraph::crdt::Patch) -> Oid {
    let mut buf = Vec::new();
    ciborium::into_writer(patch, &mut buf).unwrap();
    let blob = store.write_blob(&buf).await.unwrap();
    let tree = store.write_tree(&[TreeEntry::new("patch.cbor", blob)]).await.unwrap();
    let parents: Vec<Oid> = parent.cloned().into_iter().collect();
    store
        .commit_node_with_tree(CommitWithTreeRequest { tree_oid: tree, parents: &parents, message: "patch" })
        .await
        .unwrap()
}

#[tokio::test]
async fn add_then_tombstone_hides_node_and_advances_frontier() {
    use eventgraph::crdt::{Op, Patch};

    let store = InMemoryObjectStore::new();

    let p1 = Patch::new("alice", 1, Frontier::new(), vec![Op::NodeAdd { node_id: "a".into() }]);
    let c1 = commit_patch(&store, None, &p1).await;

    let p2 = Patch::new("alice", 2, Frontier::new(), vec![Op::NodeTombstone { node_id: "a".into() }]);
    let c2 = commit_patch(&store, Some(&c1), &p2).await;

    store.update_ref("refs/eventgraph/g/writers/alice", &c2).await.unwrap();

    let mut coverage_frontier = Frontier::new();
    coverage_frontier.set("alice", c2.clone());
    let frontier_blob = store.write_blob(&coverage_frontier.to_cbor().unwrap()).await.unwrap();
    let coverage_tree = store.write_tree(&[TreeEntry::new("frontier.cbor", frontier_blob)]).await.unwrap();
    let coverage_commit = store
        .commit_node_with_tree(CommitWithTreeRequest { tree_oid: coverage_tree, parents: &[], message: "coverage" })
        .await
        .unwrap();
    store.update_ref("refs/eventgraph/g/coverage", &coverage_commit).await.unwrap();

    let graph = Graph::open(&store, "eventgraph", "g", EngineConfig::default());
    let state = graph.materialize().await.unwrap();

    assert!(!state.node_alive.is_visible(&"a".to_string()));
    assert!(state.node_alive.is_tombstoned(&Dot::new("alice", 1)));
    assert_eq!(state.observed_frontier.get("alice"), 2);

    let applied_vv = state.derive_applied_vv();
    assert_eq!(applied_vv.get("alice"), 1);
}
