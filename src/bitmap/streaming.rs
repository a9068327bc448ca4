//! `StreamingBitmapIndexBuilder`: a memory-bounded variant of
//! [`super::builder::BitmapIndexBuilder`] used when rebuilding an index
//! over a history too large to hold entirely in RAM.
//!
//! Instead of accumulating every shard in memory and serializing once,
//! it flushes the in-progress forward/reverse bitmaps to the object
//! store whenever their estimated size crosses
//! `config::EngineConfig::streaming_builder_max_memory_bytes`, then merges
//! the flushed chunks at `finalize()` one 2-hex shard prefix at a time, so
//! peak memory is bounded by a single shard's adjacency rather than the
//! whole graph's. Each flushed chunk is written with
//! [`super::envelope::VERSION_NON_CANONICAL`] — the per-chunk checksum
//! only needs to be self-consistent, not comparable byte-for-byte against
//! the in-memory builder's output (see `spec.md` §9's note on this being a
//! deliberately preserved quirk of the original rather than a defect to
//! fix) — while the merged shard each prefix finalizes to is written
//! [`super::envelope::VERSION_CANONICAL`], matching what the in-memory
//! builder would have produced for the same edges.

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::error::{EventgraphError, Result};
use crate::model::{Frontier, Oid};
use crate::storage_port::ObjectStore;

use super::builder::{decode_bitmap, encode_bitmap};
use super::envelope::{Envelope, MetaData, ShardData, VERSION_CANONICAL, VERSION_NON_CANONICAL};

fn estimate_bitmap_bytes(bitmap: &RoaringBitmap) -> usize {
    bitmap.serialized_size()
}

/// Per-prefix flushed chunks for one direction (forward or reverse).
#[derive(Default)]
struct Direction {
    pending: BTreeMap<u32, RoaringBitmap>,
    /// 2-hex shard prefix -> oids of flushed chunks covering that prefix,
    /// in flush order.
    chunks: BTreeMap<String, Vec<Oid>>,
}

/// Builds the forward/reverse adjacency index incrementally, flushing
/// partial shards to the object store to bound peak memory use.
pub struct StreamingBitmapIndexBuilder {
    sha_to_id: FxHashMap<Oid, u32>,
    id_to_sha: Vec<Oid>,
    fwd: Direction,
    rev: Direction,
    max_memory_bytes: usize,
}

impl StreamingBitmapIndexBuilder {
    /// A new builder that flushes a direction's pending bitmaps once
    /// their estimated serialized size exceeds `max_memory_bytes`.
    pub fn new(max_memory_bytes: usize) -> Self {
        StreamingBitmapIndexBuilder {
            sha_to_id: FxHashMap::default(),
            id_to_sha: Vec::new(),
            fwd: Direction::default(),
            rev: Direction::default(),
            max_memory_bytes,
        }
    }

    fn register_node(&mut self, sha: &Oid) -> u32 {
        if let Some(&id) = self.sha_to_id.get(sha) {
            return id;
        }
        let id = self.id_to_sha.len() as u32;
        self.sha_to_id.insert(sha.clone(), id);
        self.id_to_sha.push(sha.clone());
        id
    }

    /// Registers both endpoints and records `src -> tgt`, flushing either
    /// direction's pending bitmaps to `store` if they've grown past the
    /// configured memory bound.
    pub async fn add_edge(&mut self, store: &dyn ObjectStore, src: &Oid, tgt: &Oid) -> Result<()> {
        let src_id = self.register_node(src);
        let tgt_id = self.register_node(tgt);
        self.fwd.pending.entry(src_id).or_default().insert(tgt_id);
        self.rev.pending.entry(tgt_id).or_default().insert(src_id);

        self.maybe_flush(store).await
    }

    async fn maybe_flush(&mut self, store: &dyn ObjectStore) -> Result<()> {
        let fwd_bytes: usize = self.fwd.pending.values().map(estimate_bitmap_bytes).sum();
        if fwd_bytes > self.max_memory_bytes {
            Self::flush_direction(&mut self.fwd, &self.id_to_sha, store).await?;
        }
        let rev_bytes: usize = self.rev.pending.values().map(estimate_bitmap_bytes).sum();
        if rev_bytes > self.max_memory_bytes {
            Self::flush_direction(&mut self.rev, &self.id_to_sha, store).await?;
        }
        Ok(())
    }

    /// Forces a flush of both directions' pending bitmaps, regardless of
    /// size. Call before `finalize()` to ensure nothing pending is lost.
    pub async fn flush(&mut self, store: &dyn ObjectStore) -> Result<()> {
        Self::flush_direction(&mut self.fwd, &self.id_to_sha, store).await?;
        Self::flush_direction(&mut self.rev, &self.id_to_sha, store).await
    }

    /// Splits `dir`'s pending bitmaps by the owning id's 2-hex shard
    /// prefix and writes one chunk blob per prefix, so a later merge only
    /// ever has to read the chunks for the one prefix it's assembling.
    async fn flush_direction(dir: &mut Direction, id_to_sha: &[Oid], store: &dyn ObjectStore) -> Result<()> {
        if dir.pending.is_empty() {
            return Ok(());
        }

        let mut by_prefix: BTreeMap<String, ShardData> = BTreeMap::new();
        for (&id, bitmap) in dir.pending.iter() {
            let sha = &id_to_sha[id as usize];
            by_prefix
                .entry(sha.shard_prefix().to_string())
                .or_default()
                .insert(sha.as_str().to_string(), encode_bitmap(bitmap)?);
        }

        for (prefix, shard) in by_prefix {
            let checksum_bytes = super::envelope::non_canonical_stringify(&shard)?;
            let envelope = Envelope {
                version: VERSION_NON_CANONICAL,
                checksum: crate::canonical::sha256_hex(&checksum_bytes),
                data: shard,
            };
            let payload = serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("<chunk>", e.to_string()))?;
            let oid = store.write_blob(&payload).await?;
            dir.chunks.entry(prefix).or_default().push(oid);
        }

        dir.pending.clear();
        Ok(())
    }

    fn group_meta_by_prefix(&self) -> BTreeMap<String, MetaData> {
        let mut out: BTreeMap<String, MetaData> = BTreeMap::new();
        for (sha, &id) in &self.sha_to_id {
            out.entry(sha.shard_prefix().to_string())
                .or_default()
                .insert(sha.as_str().to_string(), id);
        }
        out
    }

    /// Merges one direction's chunks covering `prefix` into a single
    /// canonical shard, reading only that prefix's chunks into memory.
    async fn merge_prefix(store: &dyn ObjectStore, chunks: &[Oid]) -> Result<ShardData> {
        let mut merged: BTreeMap<String, RoaringBitmap> = BTreeMap::new();
        for oid in chunks {
            let bytes = store.read_blob(oid).await?;
            let envelope: Envelope<ShardData> =
                serde_json::from_slice(&bytes).map_err(|e| EventgraphError::corruption("<chunk>", e.to_string()))?;
            envelope.verify()?;
            for (sha_str, b64) in envelope.data {
                let bitmap = decode_bitmap(&b64)?;
                merged.entry(sha_str).or_default().union_with(&bitmap);
            }
        }
        let mut shard: ShardData = BTreeMap::new();
        for (sha_str, bitmap) in merged {
            shard.insert(sha_str, encode_bitmap(&bitmap)?);
        }
        Ok(shard)
    }

    /// Flushes any remaining pending bitmaps, then merges and writes the
    /// index one shard prefix at a time: for each 2-hex prefix seen across
    /// either direction's chunks or the registered node table, reads only
    /// that prefix's flushed chunks, merges them, and writes the merged
    /// shard before moving to the next prefix.
    pub async fn finalize(mut self, store: &dyn ObjectStore, frontier: Option<&Frontier>) -> Result<BTreeMap<String, Oid>> {
        self.flush(store).await?;

        let meta_by_prefix = self.group_meta_by_prefix();

        let mut prefixes: std::collections::BTreeSet<String> = meta_by_prefix.keys().cloned().collect();
        prefixes.extend(self.fwd.chunks.keys().cloned());
        prefixes.extend(self.rev.chunks.keys().cloned());

        let mut out = BTreeMap::new();
        for prefix in prefixes {
            if let Some(meta) = meta_by_prefix.get(&prefix) {
                let envelope = Envelope::new(VERSION_CANONICAL, meta.clone())?;
                out.insert(
                    format!("meta_{prefix}.json"),
                    store
                        .write_blob(&serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("meta", e.to_string()))?)
                        .await?,
                );
            }

            if let Some(chunks) = self.fwd.chunks.get(&prefix) {
                let shard = Self::merge_prefix(store, chunks).await?;
                let envelope = Envelope::new(VERSION_CANONICAL, shard)?;
                out.insert(
                    format!("shards_fwd_{prefix}.json"),
                    store
                        .write_blob(&serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("shards_fwd", e.to_string()))?)
                        .await?,
                );
            }

            if let Some(chunks) = self.rev.chunks.get(&prefix) {
                let shard = Self::merge_prefix(store, chunks).await?;
                let envelope = Envelope::new(VERSION_CANONICAL, shard)?;
                out.insert(
                    format!("shards_rev_{prefix}.json"),
                    store
                        .write_blob(&serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("shards_rev", e.to_string()))?)
                        .await?,
                );
            }
        }

        if let Some(frontier) = frontier {
            out.insert("frontier.cbor".to_string(), store.write_blob(&frontier.to_cbor()?).await?);
            out.insert("frontier.json".to_string(), store.write_blob(&frontier.to_json()?).await?);
        }

        Ok(out)
    }
}
