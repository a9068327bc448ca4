//! Engine-wide configuration, modeled on `sombra`'s `Config`/`SyncMode`
//! split: one plain-data struct, a `Default`, and named presets.

use std::time::Duration;

/// Selects how the bitmap reader handles shard-level corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityPolicy {
    /// Surface corruption/validation errors to the caller.
    Strict,
    /// Log once, cache an empty shard, and return empty results.
    Lenient,
}

/// Thresholds that decide when `maybeRunGC` should compact the state.
#[derive(Debug, Clone)]
pub struct GcPolicy {
    /// Trigger GC once tombstones make up at least this fraction of all
    /// dots tracked by `nodeAlive`/`edgeAlive`.
    pub tombstone_ratio_threshold: f64,
    /// Never trigger GC below this many tombstoned dots, regardless of
    /// ratio, so small graphs don't compact on every write.
    pub min_tombstones: usize,
    /// Trigger GC after this many patches have been applied since the last
    /// run.
    pub patches_since_last_gc_threshold: u64,
    /// Trigger GC after this much wall-clock time has passed since the
    /// last run.
    pub max_age_since_last_gc: Duration,
}

impl Default for GcPolicy {
    fn default() -> Self {
        GcPolicy {
            tombstone_ratio_threshold: 0.3,
            min_tombstones: 1000,
            patches_since_last_gc_threshold: 5000,
            max_age_since_last_gc: Duration::from_secs(3600),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root prefix used when building ref names: `refs/<graph_root>/<graph>/...`.
    pub graph_root: String,
    /// Error policy for the bitmap index reader.
    pub bitmap_reader_policy: IntegrityPolicy,
    /// Number of shards the bitmap reader's LRU cache holds at once.
    pub bitmap_lru_capacity: usize,
    /// Memory budget, in bytes, before the streaming builder flushes.
    pub streaming_builder_max_memory_bytes: usize,
    /// Nodes processed between abort-signal checks in walks and traversals.
    pub traversal_batch_size: usize,
    /// Thresholds governing opportunistic GC.
    pub gc_policy: GcPolicy,
    /// Trigger an opportunistic checkpoint after this many patches have
    /// been replayed since the last one.
    pub checkpoint_patches_threshold: u64,
    /// Whether `materialize()` may opportunistically checkpoint and GC.
    pub auto_checkpoint: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            graph_root: "eventgraph".to_string(),
            bitmap_reader_policy: IntegrityPolicy::Strict,
            bitmap_lru_capacity: 64,
            streaming_builder_max_memory_bytes: 64 * 1024 * 1024,
            traversal_batch_size: 1000,
            gc_policy: GcPolicy::default(),
            checkpoint_patches_threshold: 1000,
            auto_checkpoint: true,
        }
    }
}

impl EngineConfig {
    /// A production-leaning preset: lenient shard reads (prefer degraded
    /// availability over hard failure on a single bad shard) and a larger
    /// LRU cache.
    pub fn production() -> Self {
        EngineConfig {
            bitmap_reader_policy: IntegrityPolicy::Lenient,
            bitmap_lru_capacity: 256,
            streaming_builder_max_memory_bytes: 256 * 1024 * 1024,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_preset_prefers_lenient_reads() {
        let cfg = EngineConfig::production();
        assert_eq!(cfg.bitmap_reader_policy, IntegrityPolicy::Lenient);
    }
}
