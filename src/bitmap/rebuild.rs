//! `IndexRebuildService`: orchestrates walk -> build -> persist -> load
//! for the bitmap index, picking the in-memory or streaming builder
//! based on how large the walked object DAG turns out to be.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::abort::{check, AbortSignal, NeverAbort};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::{Frontier, Oid};
use crate::storage_port::ObjectStore;
use crate::storage_port::NodeInfo;

use super::builder::BitmapIndexBuilder;
use super::streaming::StreamingBitmapIndexBuilder;

/// Above this many visited commit-like objects, `rebuild` switches from
/// the in-memory builder to the streaming one.
const STREAMING_THRESHOLD_NODES: usize = 200_000;

/// Walks the object store's commit graph from `roots` backward through
/// parent links, builds a forward/reverse adjacency index over it
/// (`parent -> child`), and persists it.
pub struct IndexRebuildService;

impl IndexRebuildService {
    /// Rebuilds the index from scratch, starting the walk at `roots`
    /// (typically every writer's current tip plus the checkpoint ref).
    pub async fn rebuild(
        store: &dyn ObjectStore,
        roots: &[Oid],
        frontier: Option<&Frontier>,
        config: &EngineConfig,
    ) -> Result<BTreeMap<String, Oid>> {
        Self::rebuild_with_signal(store, roots, frontier, config, &NeverAbort).await
    }

    /// As [`Self::rebuild`], but checks `signal` every
    /// [`EngineConfig::traversal_batch_size`] nodes visited.
    pub async fn rebuild_with_signal(
        store: &dyn ObjectStore,
        roots: &[Oid],
        frontier: Option<&Frontier>,
        config: &EngineConfig,
        signal: &dyn AbortSignal,
    ) -> Result<BTreeMap<String, Oid>> {
        let edges = Self::walk(store, roots, config, signal).await?;

        if edges.visited.len() > STREAMING_THRESHOLD_NODES {
            let mut builder = StreamingBitmapIndexBuilder::new(config.streaming_builder_max_memory_bytes);
            for (parent, child) in &edges.edges {
                builder.add_edge(store, parent, child).await?;
            }
            builder.finalize(store, frontier).await
        } else {
            let mut builder = BitmapIndexBuilder::new();
            for oid in &edges.visited {
                builder.register_node(oid);
            }
            for (parent, child) in &edges.edges {
                builder.add_edge(parent, child);
            }
            builder.write_all(store, frontier).await
        }
    }

    async fn walk(
        store: &dyn ObjectStore,
        roots: &[Oid],
        config: &EngineConfig,
        signal: &dyn AbortSignal,
    ) -> Result<WalkResult> {
        let mut visited: BTreeSet<Oid> = BTreeSet::new();
        let mut edges: Vec<(Oid, Oid)> = Vec::new();
        let mut queue: VecDeque<Oid> = roots.iter().cloned().collect();
        let mut processed_since_check = 0usize;

        while let Some(oid) = queue.pop_front() {
            if !visited.insert(oid.clone()) {
                continue;
            }

            let NodeInfo { parents, .. } = store.get_node_info(&oid).await?;
            for parent in parents {
                edges.push((parent.clone(), oid.clone()));
                if !visited.contains(&parent) {
                    queue.push_back(parent);
                }
            }

            processed_since_check += 1;
            if processed_since_check >= config.traversal_batch_size {
                check(signal)?;
                processed_since_check = 0;
            }
        }

        Ok(WalkResult { visited, edges })
    }
}

struct WalkResult {
    visited: BTreeSet<Oid>,
    edges: Vec<(Oid, Oid)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_port::{CommitRequest, InMemoryObjectStore};

    #[tokio::test]
    async fn rebuild_indexes_the_full_ancestry() {
        let store = InMemoryObjectStore::new();
        let root = store.commit_node(CommitRequest { message: "root", parents: &[] }).await.unwrap();
        let mid = store
            .commit_node(CommitRequest { message: "mid", parents: &[root.clone()] })
            .await
            .unwrap();
        let tip = store
            .commit_node(CommitRequest { message: "tip", parents: &[mid.clone()] })
            .await
            .unwrap();

        let config = EngineConfig::default();
        let paths = IndexRebuildService::rebuild(&store, &[tip.clone()], None, &config)
            .await
            .unwrap();

        let entries: BTreeMap<String, Oid> = paths;
        let reader = super::super::reader::BitmapIndexReader::open(
            &store,
            entries,
            crate::config::IntegrityPolicy::Strict,
            16,
        )
        .await
        .unwrap();

        assert_eq!(reader.get_children(&root).await.unwrap(), vec![mid.clone()]);
        assert_eq!(reader.get_parents(&tip).await.unwrap(), vec![mid]);
    }

    #[tokio::test]
    async fn rebuild_respects_an_already_tripped_abort_signal() {
        use crate::abort::FlagAbort;

        let store = InMemoryObjectStore::new();
        let root = store.commit_node(CommitRequest { message: "root", parents: &[] }).await.unwrap();
        let mut config = EngineConfig::default();
        config.traversal_batch_size = 1;
        let flag = FlagAbort::new();
        flag.abort();

        let result = IndexRebuildService::rebuild_with_signal(&store, &[root], None, &config, &flag).await;
        assert!(result.is_err());
    }
}
