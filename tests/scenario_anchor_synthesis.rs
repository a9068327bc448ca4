//! S6 — when the current ref tip and a new tip have diverged (neither is
//! an ancestor of the other), `sync_head` synthesizes an anchor commit
//! whose parents are `[current, newTip]` in that order, points the ref
//! at it, and reports `{updated: true, anchor: true}`.

use eventgraph::refsync::GraphRefManager;
use eventgraph::storage_port::{CommitRequest, InMemoryObjectStore, ObjectStore};

#[tokio::test]
async fn diverged_tips_produce_an_ordered_anchor() {
    let store = InMemoryObjectStore::new();

    let current = store.commit_node(CommitRequest { message: "a", parents: &[] }).await.unwrap();
    store.update_ref("refs/eventgraph/g/checkpoints/head", &current).await.unwrap();

    let new_tip = store.commit_node(CommitRequest { message: "b", parents: &[] }).await.unwrap();

    let result = GraphRefManager::sync_head(&store, "refs/eventgraph/g/checkpoints/head", "g", &new_tip)
        .await
        .unwrap();

    assert!(result.updated);
    assert!(result.anchor);
    let anchor_oid = result.sha.clone().unwrap();

    let info = store.get_node_info(&anchor_oid).await.unwrap();
    assert_eq!(info.parents, vec![current, new_tip]);

    let ref_tip = store.read_ref("refs/eventgraph/g/checkpoints/head").await.unwrap();
    assert_eq!(ref_tip, Some(anchor_oid));
}
