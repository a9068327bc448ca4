//! Invariant 4 — for any edge `(src, tgt)` added to the bitmap index,
//! `tgt` is contained in `getChildren(src)` and `src` is contained in
//! `getParents(tgt)`, for both the in-memory and the streaming builder.

use std::collections::BTreeSet;

use proptest::prelude::*;

use eventgraph::bitmap::{BitmapIndexBuilder, BitmapIndexReader, StreamingBitmapIndexBuilder};
use eventgraph::config::IntegrityPolicy;
use eventgraph::model::Oid;
use eventgraph::storage_port::InMemoryObjectStore;

fn oid(byte: u8) -> Oid {
    Oid::new_unchecked(format!("{:02x}", byte).repeat(20))
}

fn edges_strategy() -> impl Strategy<Value = Vec<(u8, u8)>> {
    proptest::collection::vec((0u8..6, 0u8..6), 1..20).prop_filter("no self-loops", |edges| {
        edges.iter().all(|(a, b)| a != b)
    })
}

async fn assert_contains_all(edges: &[(u8, u8)], entries: std::collections::BTreeMap<String, Oid>, store: &InMemoryObjectStore) {
    let reader = BitmapIndexReader::open(store, entries, IntegrityPolicy::Strict, 16)
        .await
        .unwrap();
    let mut expected_children: std::collections::BTreeMap<Oid, BTreeSet<Oid>> = std::collections::BTreeMap::new();
    let mut expected_parents: std::collections::BTreeMap<Oid, BTreeSet<Oid>> = std::collections::BTreeMap::new();
    for &(src, tgt) in edges {
        expected_children.entry(oid(src)).or_default().insert(oid(tgt));
        expected_parents.entry(oid(tgt)).or_default().insert(oid(src));
    }

    for (node, expected) in &expected_children {
        let children: BTreeSet<Oid> = reader.get_children(node).await.unwrap().into_iter().collect();
        assert_eq!(&children, expected);
    }
    for (node, expected) in &expected_parents {
        let parents: BTreeSet<Oid> = reader.get_parents(node).await.unwrap().into_iter().collect();
        assert_eq!(&parents, expected);
    }
}

proptest! {
    #[test]
    fn in_memory_builder_round_trips_adjacency(edges in edges_strategy()) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let store = InMemoryObjectStore::new();
            let mut builder = BitmapIndexBuilder::new();
            for &(src, tgt) in &edges {
                builder.add_edge(&oid(src), &oid(tgt));
            }
            let entries = builder.write_all(&store, None).await.unwrap();
            assert_contains_all(&edges, entries, &store).await;
        });
    }

    #[test]
    fn streaming_builder_round_trips_adjacency(edges in edges_strategy()) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let store = InMemoryObjectStore::new();
            let mut builder = StreamingBitmapIndexBuilder::new(1);
            for &(src, tgt) in &edges {
                builder.add_edge(&store, &oid(src), &oid(tgt)).await.unwrap();
            }
            let entries = builder.finalize(&store, None).await.unwrap();
            assert_contains_all(&edges, entries, &store).await;
        });
    }
}
