//! `admin::stats::collect`: a point-in-time snapshot of a graph handle's
//! state, frontier, and GC bookkeeping.
//!
//! Grounded on `sombra::admin::stats::StatsReport`
//! (`examples/maskdotdev-sombra/src/admin/stats.rs`): one top-level
//! `Serialize` report composed of small, independently meaningful
//! sections.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::materialize::Graph;
use crate::model::Oid;
use crate::storage_port::ObjectStore;

/// Size and shard-count statistics for a bitmap index tree, if one was
/// supplied to [`collect`].
#[derive(Clone, Debug, Serialize)]
pub struct BitmapStatsSection {
    /// Number of blobs in the index tree (meta + fwd + rev shards, plus
    /// any frontier blobs).
    pub shard_count: usize,
    /// Total bytes across every blob in the index tree.
    pub total_bytes: u64,
}

/// Tombstone accounting for the materialized state.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TombstoneStatsSection {
    /// Total dots tracked across `nodeAlive`/`edgeAlive`.
    pub total_dots: usize,
    /// Dots that have been tombstoned.
    pub tombstoned_dots: usize,
    /// `tombstoned_dots / total_dots`, or `0.0` if `total_dots` is zero.
    pub ratio: f64,
}

/// GC scheduling bookkeeping, mirroring the thresholds in
/// [`crate::config::GcPolicy`].
#[derive(Clone, Debug, Serialize)]
pub struct GcStatsSection {
    /// Patches (writer advances) replayed since the last GC run.
    pub patches_since_last_run: u64,
    /// Seconds elapsed since the last GC run.
    pub seconds_since_last_run: u64,
}

/// Comprehensive statistics report for a graph handle.
#[derive(Clone, Debug, Serialize)]
pub struct StatsReport {
    /// The graph this report covers.
    pub graph: String,
    /// Per-writer lamport high-water mark from the cached observed
    /// frontier, or empty if `materialize` has not run yet.
    pub observed_frontier: BTreeMap<String, u64>,
    /// Number of live nodes in the cached state.
    pub live_node_count: usize,
    /// Number of live edges in the cached state.
    pub live_edge_count: usize,
    /// Tombstone accounting.
    pub tombstones: TombstoneStatsSection,
    /// GC scheduling bookkeeping.
    pub gc: GcStatsSection,
    /// Bitmap index statistics, if an index tree was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitmap: Option<BitmapStatsSection>,
}

/// Collects a [`StatsReport`] for `graph`. If `bitmap_entries` (a
/// `path -> OID` index tree listing, as returned by
/// [`crate::bitmap::BitmapIndexBuilder::write_all`] or
/// [`crate::bitmap::IndexRebuildService::rebuild`]) is supplied, its
/// shard count and total byte size are included.
pub async fn collect(
    graph: &Graph<'_>,
    store: &dyn ObjectStore,
    bitmap_entries: Option<&BTreeMap<String, Oid>>,
) -> Result<StatsReport> {
    let observed_frontier = match graph.cached_state() {
        Some(state) => state
            .observed_frontier
            .iter()
            .map(|(writer, counter)| (writer.to_string(), counter))
            .collect(),
        None => BTreeMap::new(),
    };

    let (live_node_count, live_edge_count, tombstones) = match graph.cached_state() {
        Some(state) => {
            let live_nodes = state.node_alive.visible_elements().count();
            let live_edges = state.edge_alive.visible_elements().count();

            let mut total = 0usize;
            let mut tombstoned = 0usize;
            for dot in state.node_alive.all_dots().chain(state.edge_alive.all_dots()) {
                total += 1;
                if state.node_alive.is_tombstoned(dot) || state.edge_alive.is_tombstoned(dot) {
                    tombstoned += 1;
                }
            }
            let ratio = if total == 0 { 0.0 } else { tombstoned as f64 / total as f64 };

            (live_nodes, live_edges, TombstoneStatsSection { total_dots: total, tombstoned_dots: tombstoned, ratio })
        }
        None => (0, 0, TombstoneStatsSection::default()),
    };

    let bitmap = match bitmap_entries {
        Some(entries) => {
            let mut total_bytes = 0u64;
            for oid in entries.values() {
                total_bytes += store.read_blob(oid).await?.len() as u64;
            }
            Some(BitmapStatsSection { shard_count: entries.len(), total_bytes })
        }
        None => None,
    };

    Ok(StatsReport {
        graph: graph.graph_name().to_string(),
        observed_frontier,
        live_node_count,
        live_edge_count,
        tombstones,
        gc: GcStatsSection {
            patches_since_last_run: graph.patches_since_last_gc(),
            seconds_since_last_run: graph.last_gc_elapsed().as_secs(),
        },
        bitmap,
    })
}
