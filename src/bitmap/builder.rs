//! `BitmapIndexBuilder`: the in-memory forward/reverse adjacency index
//! builder.
//!
//! Grounded on `sombra`'s `rustc-hash = "1.1"` dependency for hot-path id
//! tables, and on the `roaring` dependency shared by several pack repos
//! (`MystenLabs-sui`, `meilisearch-arroy`) for the bitmap payloads
//! themselves.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::error::{EventgraphError, Result};
use crate::model::{Frontier, Oid};
use crate::storage_port::{ObjectStore, TreeEntry};

use super::envelope::{Envelope, MetaData, ShardData, VERSION_CANONICAL};

/// Base64-encodes a Roaring bitmap's serialized form. Shared with
/// [`super::streaming::StreamingBitmapIndexBuilder`]'s per-shard merge.
pub(crate) fn encode_bitmap(bitmap: &RoaringBitmap) -> Result<String> {
    let mut buf = Vec::new();
    bitmap
        .serialize_into(&mut buf)
        .map_err(|e| EventgraphError::corruption("<bitmap>", e.to_string()))?;
    Ok(BASE64.encode(buf))
}

/// Decodes a base64-encoded Roaring bitmap payload.
pub fn decode_bitmap(b64: &str) -> Result<RoaringBitmap> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| EventgraphError::corruption("<bitmap>", e.to_string()))?;
    RoaringBitmap::deserialize_from(bytes.as_slice())
        .map_err(|e| EventgraphError::corruption("<bitmap>", e.to_string()))
}

/// Assigns dense, zero-based ids to node OIDs in first-seen order, and
/// accumulates forward/reverse adjacency as Roaring bitmaps over those
/// ids.
#[derive(Default)]
pub struct BitmapIndexBuilder {
    sha_to_id: FxHashMap<Oid, u32>,
    id_to_sha: Vec<Oid>,
    fwd: BTreeMap<u32, RoaringBitmap>,
    rev: BTreeMap<u32, RoaringBitmap>,
}

impl BitmapIndexBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        BitmapIndexBuilder::default()
    }

    /// Returns the id assigned to `sha`, assigning a fresh one in
    /// insertion order if this is the first time it's seen.
    pub fn register_node(&mut self, sha: &Oid) -> u32 {
        if let Some(&id) = self.sha_to_id.get(sha) {
            return id;
        }
        let id = self.id_to_sha.len() as u32;
        self.sha_to_id.insert(sha.clone(), id);
        self.id_to_sha.push(sha.clone());
        id
    }

    /// Registers both endpoints (if new) and records a directed edge
    /// `src -> tgt` in both the forward and reverse bitmaps.
    pub fn add_edge(&mut self, src: &Oid, tgt: &Oid) {
        let src_id = self.register_node(src);
        let tgt_id = self.register_node(tgt);
        self.fwd.entry(src_id).or_default().insert(tgt_id);
        self.rev.entry(tgt_id).or_default().insert(src_id);
    }

    /// Number of distinct nodes registered.
    pub fn node_count(&self) -> usize {
        self.id_to_sha.len()
    }

    fn group_meta_by_shard(&self) -> BTreeMap<String, MetaData> {
        let mut out: BTreeMap<String, MetaData> = BTreeMap::new();
        for (sha, &id) in &self.sha_to_id {
            out.entry(sha.shard_prefix().to_string())
                .or_default()
                .insert(sha.as_str().to_string(), id);
        }
        out
    }

    fn group_shards_by_shard(&self, bitmaps: &BTreeMap<u32, RoaringBitmap>) -> Result<BTreeMap<String, ShardData>> {
        let mut out: BTreeMap<String, ShardData> = BTreeMap::new();
        for (&id, bitmap) in bitmaps {
            let sha = &self.id_to_sha[id as usize];
            out.entry(sha.shard_prefix().to_string())
                .or_default()
                .insert(sha.as_str().to_string(), encode_bitmap(bitmap)?);
        }
        Ok(out)
    }

    /// Serializes the index into `filename -> bytes` blobs, ready to be
    /// written to the object store and assembled into a tree. If
    /// `frontier` is supplied, `frontier.cbor`/`frontier.json` are
    /// included for staleness detection.
    pub fn serialize(&self, frontier: Option<&Frontier>) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut out = BTreeMap::new();

        for (prefix, data) in self.group_meta_by_shard() {
            let envelope = Envelope::new(VERSION_CANONICAL, data)?;
            out.insert(
                format!("meta_{prefix}.json"),
                serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("meta", e.to_string()))?,
            );
        }
        for (prefix, data) in self.group_shards_by_shard(&self.fwd)? {
            let envelope = Envelope::new(VERSION_CANONICAL, data)?;
            out.insert(
                format!("shards_fwd_{prefix}.json"),
                serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("shards_fwd", e.to_string()))?,
            );
        }
        for (prefix, data) in self.group_shards_by_shard(&self.rev)? {
            let envelope = Envelope::new(VERSION_CANONICAL, data)?;
            out.insert(
                format!("shards_rev_{prefix}.json"),
                serde_json::to_vec(&envelope).map_err(|e| EventgraphError::corruption("shards_rev", e.to_string()))?,
            );
        }
        if let Some(frontier) = frontier {
            out.insert("frontier.cbor".to_string(), frontier.to_cbor()?);
            out.insert("frontier.json".to_string(), frontier.to_json()?);
        }
        Ok(out)
    }

    /// Serializes and writes every blob, returning `filename -> OID` ready
    /// for [`TreeEntry`] assembly.
    pub async fn write_all(&self, store: &dyn ObjectStore, frontier: Option<&Frontier>) -> Result<BTreeMap<String, Oid>> {
        let blobs = self.serialize(frontier)?;
        let mut out = BTreeMap::new();
        for (path, bytes) in blobs {
            let oid = store.write_blob(&bytes).await?;
            out.insert(path, oid);
        }
        Ok(out)
    }
}

/// Builds the sorted [`TreeEntry`] list for a `path -> OID` map produced
/// by either builder's `write_all`/`finalize`.
pub fn tree_entries(paths: &BTreeMap<String, Oid>) -> Vec<TreeEntry> {
    paths.iter().map(|(path, oid)| TreeEntry::new(path.clone(), oid.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: char) -> Oid {
        Oid::new_unchecked(byte.to_string().repeat(40))
    }

    #[test]
    fn ids_are_dense_and_first_seen_order() {
        let mut builder = BitmapIndexBuilder::new();
        assert_eq!(builder.register_node(&oid('b')), 0);
        assert_eq!(builder.register_node(&oid('c')), 1);
        assert_eq!(builder.register_node(&oid('b')), 0);
        assert_eq!(builder.node_count(), 2);
    }

    #[test]
    fn add_edge_populates_forward_and_reverse() {
        let mut builder = BitmapIndexBuilder::new();
        builder.add_edge(&oid('a'), &oid('b'));
        let a_id = builder.sha_to_id[&oid('a')];
        let b_id = builder.sha_to_id[&oid('b')];
        assert!(builder.fwd[&a_id].contains(b_id));
        assert!(builder.rev[&b_id].contains(a_id));
    }

    #[test]
    fn serialize_produces_version_matching_checksums() {
        let mut builder = BitmapIndexBuilder::new();
        builder.add_edge(&oid('a'), &oid('b'));
        let blobs = builder.serialize(None).unwrap();
        for (path, bytes) in &blobs {
            if path.starts_with("meta_") || path.starts_with("shards_") {
                let envelope: Envelope<serde_json::Value> = serde_json::from_slice(bytes).unwrap();
                envelope.verify().unwrap();
            }
        }
    }

    #[test]
    fn bitmap_round_trips_through_base64() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(1);
        bitmap.insert(1000);
        let encoded = encode_bitmap(&bitmap).unwrap();
        let decoded = decode_bitmap(&encoded).unwrap();
        assert_eq!(bitmap, decoded);
    }
}
