//! `BitmapIndexReader`: lazy, LRU-cached lookups over a persisted
//! forward/reverse adjacency index.
//!
//! Grounded on `sombra`'s page-cache pattern
//! (`examples/maskdotdev-sombra/src/db/cache.rs`, `lru::LruCache` behind
//! a `parking_lot::Mutex`) applied here to decoded bitmap shards instead
//! of database pages.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::config::IntegrityPolicy;
use crate::error::{EventgraphError, Result};
use crate::model::Oid;
use crate::storage_port::ObjectStore;

use super::builder::decode_bitmap;
use super::envelope::{Envelope, MetaData, ShardData};

enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    fn shard_prefix_tag(&self) -> &'static str {
        match self {
            Direction::Forward => "shards_fwd_",
            Direction::Reverse => "shards_rev_",
        }
    }
}

/// The id<->OID mapping built from every `meta_*.json` shard, loaded at
/// most once per reader (see [`BitmapIndexReader::meta`]).
struct MetaTables {
    sha_to_id: std::collections::HashMap<Oid, u32>,
    id_to_sha: Vec<Oid>,
}

/// Reads a persisted bitmap index, resolving node ids and
/// forward/reverse adjacency on demand.
pub struct BitmapIndexReader<'a> {
    store: &'a dyn ObjectStore,
    entries: BTreeMap<String, Oid>,
    policy: IntegrityPolicy,
    meta: OnceCell<MetaTables>,
    shard_cache: Mutex<LruCache<String, ShardData>>,
}

impl<'a> BitmapIndexReader<'a> {
    /// Opens a reader over the index tree at `entries` (`path -> OID`).
    /// Does no I/O: the id<->OID mapping built from `meta_*.json` and
    /// adjacency shards are both loaded lazily, on first query, and cached
    /// thereafter.
    pub async fn open(
        store: &'a dyn ObjectStore,
        entries: BTreeMap<String, Oid>,
        policy: IntegrityPolicy,
        lru_capacity: usize,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(lru_capacity.max(1)).expect("nonzero");
        Ok(BitmapIndexReader {
            store,
            entries,
            policy,
            meta: OnceCell::new(),
            shard_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Loads and verifies every `meta_*.json` shard into the id<->OID
    /// tables, or returns the already-loaded tables. The underlying
    /// `OnceCell` guarantees the parse/verify work — and, under
    /// [`IntegrityPolicy::Lenient`], the warning log for any corrupt meta
    /// shard — runs at most once per reader regardless of how many
    /// queries race to call this first.
    async fn meta(&self) -> Result<&MetaTables> {
        self.meta.get_or_try_init(|| self.load_meta()).await
    }

    async fn load_meta(&self) -> Result<MetaTables> {
        let mut sha_to_id = std::collections::HashMap::new();
        let mut id_to_sha: Vec<Option<Oid>> = Vec::new();

        for (path, oid) in self.entries.iter().filter(|(p, _)| p.starts_with("meta_")) {
            let bytes = self.store.read_blob(oid).await?;
            let envelope: Envelope<MetaData> = serde_json::from_slice(&bytes)
                .map_err(|e| EventgraphError::corruption(path, e.to_string()))?;
            if let Err(e) = envelope.verify() {
                match self.policy {
                    IntegrityPolicy::Strict => return Err(e),
                    IntegrityPolicy::Lenient => {
                        warn!(path, error = %e, "dropping corrupt meta shard");
                        continue;
                    }
                }
            }
            for (sha_str, id) in envelope.data {
                let sha = Oid::new_unchecked(sha_str);
                sha_to_id.insert(sha.clone(), id);
                let idx = id as usize;
                if id_to_sha.len() <= idx {
                    id_to_sha.resize(idx + 1, None);
                }
                id_to_sha[idx] = Some(sha);
            }
        }

        let id_to_sha = id_to_sha
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| {
                    EventgraphError::corruption("<bitmap meta>", format!("missing node id {idx} in meta shards"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MetaTables { sha_to_id, id_to_sha })
    }

    /// Looks up the dense numeric id assigned to `oid`, if it was
    /// registered in this index.
    pub async fn lookup_id(&self, oid: &Oid) -> Result<Option<u32>> {
        Ok(self.meta().await?.sha_to_id.get(oid).copied())
    }

    async fn load_shard(&self, direction: &Direction, prefix: &str) -> Result<ShardData> {
        let path = format!("{}{}.json", direction.shard_prefix_tag(), prefix);
        if let Some(cached) = self.shard_cache.lock().get(&path) {
            return Ok(cached.clone());
        }
        let Some(oid) = self.entries.get(&path) else {
            return Ok(ShardData::new());
        };
        let bytes = self.store.read_blob(oid).await?;
        let envelope: Envelope<ShardData> = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                return match self.policy {
                    IntegrityPolicy::Strict => Err(EventgraphError::corruption(&path, e.to_string())),
                    IntegrityPolicy::Lenient => {
                        warn!(path, error = %e, "dropping corrupt adjacency shard");
                        self.shard_cache.lock().put(path, ShardData::new());
                        Ok(ShardData::new())
                    }
                }
            }
        };
        if let Err(e) = envelope.verify() {
            return match self.policy {
                IntegrityPolicy::Strict => Err(e),
                IntegrityPolicy::Lenient => {
                    warn!(path, error = %e, "dropping corrupt adjacency shard");
                    self.shard_cache.lock().put(path, ShardData::new());
                    Ok(ShardData::new())
                }
            };
        }
        self.shard_cache.lock().put(path, envelope.data.clone());
        Ok(envelope.data)
    }

    async fn adjacency(&self, direction: Direction, oid: &Oid) -> Result<Vec<Oid>> {
        let shard = self.load_shard(&direction, oid.shard_prefix()).await?;
        let Some(b64) = shard.get(oid.as_str()) else {
            return Ok(Vec::new());
        };
        let bitmap: RoaringBitmap = match decode_bitmap(b64) {
            Ok(b) => b,
            Err(e) => {
                return match self.policy {
                    IntegrityPolicy::Strict => Err(e),
                    IntegrityPolicy::Lenient => {
                        warn!(oid = %oid, error = %e, "dropping corrupt bitmap entry");
                        Ok(Vec::new())
                    }
                }
            }
        };
        let meta = self.meta().await?;
        Ok(bitmap
            .iter()
            .filter_map(|id| meta.id_to_sha.get(id as usize).cloned())
            .collect())
    }

    /// Returns the nodes `oid` has an outgoing edge to.
    pub async fn get_children(&self, oid: &Oid) -> Result<Vec<Oid>> {
        self.adjacency(Direction::Forward, oid).await
    }

    /// Returns the nodes with an outgoing edge to `oid`.
    pub async fn get_parents(&self, oid: &Oid) -> Result<Vec<Oid>> {
        self.adjacency(Direction::Reverse, oid).await
    }

    /// Number of nodes registered in this index.
    pub async fn node_count(&self) -> Result<usize> {
        Ok(self.meta().await?.id_to_sha.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::builder::BitmapIndexBuilder;
    use crate::storage_port::InMemoryObjectStore;

    fn oid(byte: char) -> Oid {
        Oid::new_unchecked(byte.to_string().repeat(40))
    }

    async fn build_index(store: &InMemoryObjectStore) -> BTreeMap<String, Oid> {
        let mut builder = BitmapIndexBuilder::new();
        builder.add_edge(&oid('a'), &oid('b'));
        builder.add_edge(&oid('a'), &oid('c'));
        builder.write_all(store, None).await.unwrap()
    }

    #[tokio::test]
    async fn resolves_children_and_parents() {
        let store = InMemoryObjectStore::new();
        let entries = build_index(&store).await;
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Strict, 16)
            .await
            .unwrap();

        let mut children = reader.get_children(&oid('a')).await.unwrap();
        children.sort();
        let mut expected = vec![oid('b'), oid('c')];
        expected.sort();
        assert_eq!(children, expected);

        let parents = reader.get_parents(&oid('b')).await.unwrap();
        assert_eq!(parents, vec![oid('a')]);
    }

    #[tokio::test]
    async fn lookup_id_returns_none_for_unknown_oid() {
        let store = InMemoryObjectStore::new();
        let entries = build_index(&store).await;
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Strict, 16)
            .await
            .unwrap();
        assert_eq!(reader.lookup_id(&oid('z')).await.unwrap(), None);
    }

    #[tokio::test]
    async fn lenient_policy_returns_empty_on_corrupt_shard() {
        let store = InMemoryObjectStore::new();
        let mut entries = build_index(&store).await;
        let bad_oid = store.write_blob(b"not json").await.unwrap();
        let fwd_key = entries.keys().find(|k| k.starts_with("shards_fwd_")).unwrap().clone();
        entries.insert(fwd_key, bad_oid);

        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Lenient, 16)
            .await
            .unwrap();
        let children = reader.get_children(&oid('a')).await.unwrap();
        assert!(children.is_empty());
    }

    /// Counts reads per OID so the test below can assert the corrupt shard
    /// is fetched from storage exactly once across two queries.
    struct CountingStore {
        inner: InMemoryObjectStore,
        reads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ObjectStore for CountingStore {
        async fn write_blob(&self, bytes: &[u8]) -> Result<Oid> {
            self.inner.write_blob(bytes).await
        }
        async fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.read_blob(oid).await
        }
        async fn write_tree(&self, entries: &[crate::storage_port::TreeEntry]) -> Result<Oid> {
            self.inner.write_tree(entries).await
        }
        async fn read_tree_oids(&self, oid: &Oid) -> Result<BTreeMap<String, Oid>> {
            self.inner.read_tree_oids(oid).await
        }
        async fn commit_node_with_tree(&self, req: crate::storage_port::CommitWithTreeRequest<'_>) -> Result<Oid> {
            self.inner.commit_node_with_tree(req).await
        }
        async fn commit_node(&self, req: crate::storage_port::CommitRequest<'_>) -> Result<Oid> {
            self.inner.commit_node(req).await
        }
        async fn read_ref(&self, name: &str) -> Result<Option<Oid>> {
            self.inner.read_ref(name).await
        }
        async fn update_ref(&self, name: &str, oid: &Oid) -> Result<()> {
            self.inner.update_ref(name, oid).await
        }
        async fn is_ancestor(&self, a: &Oid, b: &Oid) -> Result<bool> {
            self.inner.is_ancestor(a, b).await
        }
        async fn get_node_info(&self, oid: &Oid) -> Result<crate::storage_port::NodeInfo> {
            self.inner.get_node_info(oid).await
        }
    }

    #[tokio::test]
    async fn lenient_policy_caches_corrupt_shard_after_one_fetch() {
        let inner = InMemoryObjectStore::new();
        let mut entries = build_index(&inner).await;
        let bad_oid = inner.write_blob(b"not json").await.unwrap();
        let fwd_key = entries.keys().find(|k| k.starts_with("shards_fwd_")).unwrap().clone();
        entries.insert(fwd_key, bad_oid);

        let store = CountingStore {
            inner,
            reads: std::sync::atomic::AtomicUsize::new(0),
        };
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Lenient, 16)
            .await
            .unwrap();

        assert!(reader.get_children(&oid('a')).await.unwrap().is_empty());
        let reads_after_first = store.reads.load(std::sync::atomic::Ordering::SeqCst);
        assert!(reader.get_children(&oid('a')).await.unwrap().is_empty());
        let reads_after_second = store.reads.load(std::sync::atomic::Ordering::SeqCst);

        assert_eq!(reads_after_first, reads_after_second, "corrupt shard must not be re-fetched");
    }
}
