//! The materialization orchestrator: the `Graph` handle that ties
//! together checkpoint loading, incremental patch replay, ceiling-based
//! time travel, adjacency caching, and opportunistic checkpoint/GC.
//!
//! Grounded on `sombra::admin::util::{open_graph, open_pager}`'s
//! open/build/load orchestration and on `sombra::db::Connection`'s single
//! owning handle over the pager/WAL pair (`examples/maskdotdev-sombra/src/db/connection.rs`).
//! A `Graph` is, by design, `!Sync`: one handle drives one cooperative
//! single-threaded session (spec §5); independent handles may run on
//! separate tasks.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tracing::{debug, info};

use crate::canonical::{sha256_hex, to_canonical_json};
use crate::checkpoint::{CheckpointHandle, CheckpointService, PatchLoader};
use crate::config::EngineConfig;
use crate::crdt::{JoinReducer, Patch, ReceiptMode, WarpState};
use crate::error::{EventgraphError, Result};
use crate::model::{Frontier, Oid};
use crate::storage_port::ObjectStore;

const PATCH_FILE: &str = "patch.cbor";

fn writer_ref(graph_root: &str, graph: &str, writer_id: &str) -> String {
    format!("refs/{graph_root}/{graph}/writers/{writer_id}")
}

/// Walks a single writer's patch chain backward from a tip commit,
/// reading `patch.cbor` out of each commit's tree.
///
/// Grounded on `sombra`'s WAL-replay walk
/// (`examples/maskdotdev-sombra/src/db/recovery.rs`): read the newest
/// record, follow the back-link, stop at the known-durable point.
pub struct ObjectStorePatchLoader<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectStorePatchLoader<'a> {
    /// A loader reading patch chains from `store`.
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        ObjectStorePatchLoader { store }
    }
}

#[async_trait]
impl PatchLoader for ObjectStorePatchLoader<'_> {
    async fn load_patches(&self, _writer_id: &str, since: Option<&Oid>, until: &Oid) -> Result<Vec<(Oid, Patch)>> {
        let mut patches = Vec::new();
        let mut current = Some(until.clone());

        while let Some(oid) = current {
            if since == Some(&oid) {
                break;
            }

            let tree = self.store.read_tree_oids(&oid).await?;
            let patch_oid = tree
                .get(PATCH_FILE)
                .ok_or_else(|| EventgraphError::Invariant(format!("patch commit {oid} missing patch.cbor")))?;
            let bytes = self.store.read_blob(patch_oid).await?;
            let patch: Patch = ciborium::from_reader(bytes.as_slice())
                .map_err(|e| EventgraphError::corruption(PATCH_FILE, e.to_string()))?;

            let info = self.store.get_node_info(&oid).await?;
            patches.push((oid.clone(), patch));
            current = info.parents.into_iter().next();
        }

        patches.reverse();
        Ok(patches)
    }
}

/// Outcome of [`Graph::run_gc`].
#[derive(Clone, Debug)]
pub struct GcOutcome {
    /// Total dots across `nodeAlive`/`edgeAlive` before compaction.
    pub dots_before: usize,
    /// Total dots after compaction.
    pub dots_after: usize,
}

fn count_dots(state: &WarpState) -> (usize, usize) {
    let node_dots = state.node_alive.all_dots().count();
    let edge_dots = state.edge_alive.all_dots().count();
    (node_dots, edge_dots)
}

fn tombstone_ratio(state: &WarpState) -> (usize, f64) {
    let mut total = 0usize;
    let mut tombstoned = 0usize;
    for dot in state.node_alive.all_dots().chain(state.edge_alive.all_dots()) {
        total += 1;
        if state.node_alive.is_tombstoned(dot) || state.edge_alive.is_tombstoned(dot) {
            tombstoned += 1;
        }
    }
    if total == 0 {
        (0, 0.0)
    } else {
        (tombstoned, tombstoned as f64 / total as f64)
    }
}

struct GcState {
    last_run: Instant,
    patches_since: u64,
}

/// A single cooperative-scheduling session over one graph: loads and
/// caches materialized state, drives checkpoint/GC policy, and answers
/// ceiling-based time-travel queries with a seek cache.
///
/// Not `Sync`: wrap in its own task if concurrent graphs are needed.
pub struct Graph<'a> {
    store: &'a dyn ObjectStore,
    graph_root: String,
    graph: String,
    config: EngineConfig,
    cached_state: RefCell<Option<WarpState>>,
    cached_frontier: RefCell<Frontier>,
    seek_cache: RefCell<LruCache<String, WarpState>>,
    gc_state: RefCell<GcState>,
}

impl<'a> Graph<'a> {
    /// Opens a handle over `graph` within `graph_root`, using `config`'s
    /// policy for opportunistic checkpoint/GC and LRU sizing.
    pub fn open(store: &'a dyn ObjectStore, graph_root: impl Into<String>, graph: impl Into<String>, config: EngineConfig) -> Self {
        let seek_capacity = NonZeroUsize::new(config.bitmap_lru_capacity.max(1)).expect("nonzero");
        Graph {
            store,
            graph_root: graph_root.into(),
            graph: graph.into(),
            config,
            cached_state: RefCell::new(None),
            cached_frontier: RefCell::new(Frontier::new()),
            seek_cache: RefCell::new(LruCache::new(seek_capacity)),
            gc_state: RefCell::new(GcState { last_run: Instant::now(), patches_since: 0 }),
        }
    }

    fn writer_ref_name(&self, writer_id: &str) -> String {
        writer_ref(&self.graph_root, &self.graph, writer_id)
    }

    async fn current_target_frontier(&self) -> Result<Frontier> {
        let coverage_ref = format!("refs/{}/{}/coverage", self.graph_root, self.graph);
        let Some(coverage_oid) = self.store.read_ref(&coverage_ref).await? else {
            return Ok(Frontier::new());
        };
        let tree = self.store.read_tree_oids(&coverage_oid).await?;
        let Some(frontier_oid) = tree.get("frontier.cbor") else {
            return Ok(Frontier::new());
        };
        let bytes = self.store.read_blob(frontier_oid).await?;
        Frontier::from_cbor(&bytes)
    }

    /// Loads the latest checkpoint (or an empty state), replays every
    /// patch since its frontier across all writers, caches the result,
    /// and opportunistically checkpoints/GCs per `config`.
    pub async fn materialize(&self) -> Result<WarpState> {
        let target_frontier = self.current_target_frontier().await?;
        let loader = ObjectStorePatchLoader::new(self.store);
        let service = CheckpointService;

        let state = service
            .materialize_incremental(self.store, &self.graph_root, &self.graph, &target_frontier, &loader)
            .await?;

        // Counts writers that advanced, not individual patches (the
        // checkpoint service owns the per-writer patch fetch and doesn't
        // report a count back) — a conservative proxy for the checkpoint
        // threshold: a writer can only advance by committing a patch.
        let mut writers_advanced = 0u64;
        for (writer_id, tip) in target_frontier.iter() {
            if self.cached_frontier.borrow().get(writer_id) != Some(tip) {
                writers_advanced += 1;
            }
        }

        *self.cached_state.borrow_mut() = Some(state.clone());
        *self.cached_frontier.borrow_mut() = target_frontier;

        {
            let mut gc = self.gc_state.borrow_mut();
            gc.patches_since += writers_advanced;
        }

        if self.config.auto_checkpoint {
            self.maybe_checkpoint().await?;
            self.maybe_run_gc().await?;
        }

        Ok(state)
    }

    async fn maybe_checkpoint(&self) -> Result<()> {
        let due = self.gc_state.borrow().patches_since >= self.config.checkpoint_patches_threshold;
        if due {
            self.create_checkpoint().await?;
        }
        Ok(())
    }

    /// Gathers writer tips from the cached frontier, materializes, and
    /// delegates to the checkpoint service.
    pub async fn create_checkpoint(&self) -> Result<CheckpointHandle> {
        let state = self
            .cached_state
            .borrow()
            .clone()
            .ok_or_else(|| EventgraphError::Invariant("create_checkpoint called before materialize".to_string()))?;
        let frontier = self.cached_frontier.borrow().clone();

        let service = CheckpointService;
        let handle = service
            .build(self.store, &self.graph_root, &self.graph, &state, &frontier, true)
            .await?;

        self.gc_state.borrow_mut().patches_since = 0;
        Ok(handle)
    }

    /// Bypasses the checkpoint chain entirely: loads every writer's full
    /// patch history, keeps only patches with `lamport <= ceiling`, and
    /// replays them. Results are cached under a fingerprint of
    /// `(ceiling, frontier)`.
    pub async fn materialize_at(&self, ceiling: u64, frontier: &Frontier) -> Result<WarpState> {
        let fingerprint = Self::seek_fingerprint(ceiling, frontier)?;
        if let Some(cached) = self.seek_cache.borrow_mut().get(&fingerprint) {
            return Ok(cached.clone());
        }

        let loader = ObjectStorePatchLoader::new(self.store);
        let mut pending: Vec<(Oid, Patch)> = Vec::new();
        for (writer_id, tip) in frontier.iter() {
            let patches = loader.load_patches(writer_id, None, tip).await?;
            pending.extend(patches.into_iter().filter(|(_, patch)| patch.lamport <= ceiling));
        }
        pending.sort_by(|(a_oid, a), (b_oid, b)| {
            (a.lamport, &a.writer_id, a_oid.as_str()).cmp(&(b.lamport, &b.writer_id, b_oid.as_str()))
        });

        let mut state = WarpState::new();
        for (oid, patch) in &pending {
            JoinReducer::apply_patch(&mut state, oid, patch, ReceiptMode::Silent)?;
        }

        self.seek_cache.borrow_mut().put(fingerprint, state.clone());
        Ok(state)
    }

    fn seek_fingerprint(ceiling: u64, frontier: &Frontier) -> Result<String> {
        #[derive(serde::Serialize)]
        struct Key<'a> {
            ceiling: u64,
            frontier: BTreeMap<&'a str, String>,
        }
        let key = Key {
            ceiling,
            frontier: frontier.iter().map(|(w, oid)| (w, oid.as_str().to_string())).collect(),
        };
        let bytes = to_canonical_json(&key)?;
        Ok(sha256_hex(&bytes))
    }

    /// Drops any seek-cache entry that fails to deserialize cleanly on
    /// next use. Exposed so callers can self-heal a corrupted persistent
    /// seek cache without restarting the process.
    pub fn evict_seek_entry(&self, ceiling: u64, frontier: &Frontier) -> Result<()> {
        let fingerprint = Self::seek_fingerprint(ceiling, frontier)?;
        self.seek_cache.borrow_mut().pop(&fingerprint);
        Ok(())
    }

    /// Unconditionally compacts the cached state's tombstoned dots that
    /// are dominated by the derived applied VV.
    pub async fn run_gc(&self) -> Result<GcOutcome> {
        let mut state = self
            .cached_state
            .borrow()
            .clone()
            .ok_or_else(|| EventgraphError::Invariant("run_gc called before materialize".to_string()))?;

        let (before_nodes, before_edges) = count_dots(&state);
        let applied_vv = state.derive_applied_vv();
        state.compact(&applied_vv);
        let (after_nodes, after_edges) = count_dots(&state);

        *self.cached_state.borrow_mut() = Some(state);
        let mut gc = self.gc_state.borrow_mut();
        gc.last_run = Instant::now();
        gc.patches_since = 0;

        info!(before = before_nodes + before_edges, after = after_nodes + after_edges, "gc compacted state");

        Ok(GcOutcome {
            dots_before: before_nodes + before_edges,
            dots_after: after_nodes + after_edges,
        })
    }

    /// Runs GC only if the configured policy thresholds are met: enough
    /// tombstones by ratio and absolute count, or enough patches/time
    /// since the last run.
    pub async fn maybe_run_gc(&self) -> Result<Option<GcOutcome>> {
        let policy = self.config.gc_policy.clone();
        self.maybe_run_gc_with_policy(&policy).await
    }

    /// As [`Self::maybe_run_gc`], but checks `policy`'s thresholds
    /// instead of the config this handle was opened with — lets ops
    /// tooling try a different policy without reopening the graph.
    pub async fn maybe_run_gc_with_policy(&self, policy: &crate::config::GcPolicy) -> Result<Option<GcOutcome>> {
        let Some(state) = self.cached_state.borrow().clone() else {
            return Ok(None);
        };

        let (tombstoned, ratio) = tombstone_ratio(&state);
        let gc = self.gc_state.borrow();
        let patches_due = gc.patches_since >= policy.patches_since_last_gc_threshold;
        let age_due = gc.last_run.elapsed() >= policy.max_age_since_last_gc;
        let size_due = tombstoned >= policy.min_tombstones && ratio >= policy.tombstone_ratio_threshold;
        drop(gc);

        if patches_due || age_due || size_due {
            debug!(tombstoned, ratio, patches_due, age_due, size_due, "gc threshold met");
            Ok(Some(self.run_gc().await?))
        } else {
            Ok(None)
        }
    }

    /// The graph root prefix this handle was opened with.
    pub fn graph_root(&self) -> &str {
        &self.graph_root
    }

    /// The graph name this handle was opened with.
    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    /// The currently cached frontier, if `materialize` has run at least
    /// once.
    pub fn cached_frontier(&self) -> Frontier {
        self.cached_frontier.borrow().clone()
    }

    /// The currently cached state, if `materialize` has run at least
    /// once.
    pub fn cached_state(&self) -> Option<WarpState> {
        self.cached_state.borrow().clone()
    }

    /// Patches (writer advances) replayed since the last GC run, per the
    /// bookkeeping [`Self::maybe_run_gc`] consults.
    pub fn patches_since_last_gc(&self) -> u64 {
        self.gc_state.borrow().patches_since
    }

    /// Wall-clock time elapsed since the last GC run (or since this
    /// handle was opened, if GC has never run).
    pub fn last_gc_elapsed(&self) -> Duration {
        self.gc_state.borrow().last_run.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_port::InMemoryObjectStore;

    fn dummy_duration_cfg() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.gc_policy.max_age_since_last_gc = Duration::from_secs(u64::MAX / 2);
        cfg
    }

    #[tokio::test]
    async fn materialize_on_empty_graph_returns_empty_state() {
        let store = InMemoryObjectStore::new();
        let graph = Graph::open(&store, "eventgraph", "g", dummy_duration_cfg());
        let state = graph.materialize().await.unwrap();
        assert!(state.node_alive.is_empty());
    }

    #[tokio::test]
    async fn materialize_at_ceiling_zero_on_empty_frontier_is_empty() {
        let store = InMemoryObjectStore::new();
        let graph = Graph::open(&store, "eventgraph", "g", dummy_duration_cfg());
        let frontier = Frontier::new();
        let state = graph.materialize_at(0, &frontier).await.unwrap();
        assert!(state.node_alive.is_empty());
    }

    #[tokio::test]
    async fn run_gc_without_prior_materialize_errs() {
        let store = InMemoryObjectStore::new();
        let graph = Graph::open(&store, "eventgraph", "g", dummy_duration_cfg());
        assert!(graph.run_gc().await.is_err());
    }
}
