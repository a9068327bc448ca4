//! The object store: the single external collaborator this crate depends
//! on. Everything above this module talks to storage only through
//! [`ObjectStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{acquire_lock, EventgraphError, Result};
use crate::model::Oid;

/// One entry in a tree object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeEntry {
    /// Path of the entry within the tree.
    pub path: String,
    /// Blob this path points at.
    pub oid: Oid,
}

impl TreeEntry {
    /// Builds a tree entry.
    pub fn new(path: impl Into<String>, oid: Oid) -> Self {
        TreeEntry {
            path: path.into(),
            oid,
        }
    }
}

/// Request to create a commit-like object over an already-written tree.
#[derive(Clone, Debug)]
pub struct CommitWithTreeRequest<'a> {
    /// The tree this commit points at.
    pub tree_oid: Oid,
    /// Parent commit-like objects.
    pub parents: &'a [Oid],
    /// Commit message, including trailers.
    pub message: &'a str,
}

/// Request to create a commit-like object pointing at the empty tree.
#[derive(Clone, Debug)]
pub struct CommitRequest<'a> {
    /// Commit message, including trailers.
    pub message: &'a str,
    /// Parent commit-like objects.
    pub parents: &'a [Oid],
}

/// `{ message, parents }` as read back from a commit-like object.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    /// The commit message, trailers included.
    pub message: String,
    /// Parent object hashes.
    pub parents: Vec<Oid>,
}

/// Port to the content-addressed object store backing the graph.
///
/// `read_tree_oids` accepts either a tree OID or a commit-like OID that
/// wraps one; implementations resolve the commit → tree indirection
/// internally so callers never need to track which kind of OID they hold.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `bytes` as a blob. Idempotent: identical bytes always produce
    /// the same OID.
    async fn write_blob(&self, bytes: &[u8]) -> Result<Oid>;
    /// Reads back a blob previously written with [`Self::write_blob`].
    async fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>>;
    /// Writes a tree object. `entries` must be sorted by path.
    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid>;
    /// Reads a tree (or a commit-like object's tree) as a flat path map.
    async fn read_tree_oids(&self, oid: &Oid) -> Result<BTreeMap<String, Oid>>;
    /// Creates a commit-like object over a tree.
    async fn commit_node_with_tree(&self, req: CommitWithTreeRequest<'_>) -> Result<Oid>;
    /// Creates a commit-like object pointing at the empty tree.
    async fn commit_node(&self, req: CommitRequest<'_>) -> Result<Oid>;
    /// Reads the current value of a named reference.
    async fn read_ref(&self, name: &str) -> Result<Option<Oid>>;
    /// Updates a named reference to point at `oid`.
    async fn update_ref(&self, name: &str, oid: &Oid) -> Result<()>;
    /// True iff `a` is reachable from `b` by following parent edges.
    async fn is_ancestor(&self, a: &Oid, b: &Oid) -> Result<bool>;
    /// Reads a commit-like object's message and parents.
    async fn get_node_info(&self, oid: &Oid) -> Result<NodeInfo>;
}

/// SHA-256 truncated to 20 bytes (40 hex characters), matching [`crate::model::OID_HEX_LEN`].
fn content_oid(bytes: &[u8]) -> Oid {
    let digest = Sha256::digest(bytes);
    Oid::new_unchecked(hex::encode(&digest[..20]))
}

#[derive(Clone)]
struct CommitRecord {
    message: String,
    parents: Vec<Oid>,
    tree: BTreeMap<String, Oid>,
}

#[derive(Default)]
struct Store {
    blobs: BTreeMap<Oid, Vec<u8>>,
    trees: BTreeMap<Oid, BTreeMap<String, Oid>>,
    commits: BTreeMap<Oid, CommitRecord>,
    refs: BTreeMap<String, Oid>,
}

/// A fully in-process [`ObjectStore`], used by every integration test and
/// by nothing else — grounded on `sombra`'s convention of exercising a
/// `GraphDB` handle directly in `tests/integration/*.rs` with no real I/O.
#[derive(Default)]
pub struct InMemoryObjectStore {
    inner: Mutex<Store>,
}

impl InMemoryObjectStore {
    /// An empty store.
    pub fn new() -> Self {
        InMemoryObjectStore::default()
    }

    fn canonical_tree_bytes(entries: &[TreeEntry]) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in entries {
            buf.extend_from_slice(format!("100644 blob {}\t{}\n", entry.oid, entry.path).as_bytes());
        }
        buf
    }

    fn canonical_commit_bytes(tree: &BTreeMap<String, Oid>, parents: &[Oid], message: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        for (path, oid) in tree {
            buf.extend_from_slice(format!("tree-entry {path} {oid}\n").as_bytes());
        }
        for parent in parents {
            buf.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        buf.extend_from_slice(b"\n");
        buf.extend_from_slice(message.as_bytes());
        buf
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn write_blob(&self, bytes: &[u8]) -> Result<Oid> {
        let oid = content_oid(bytes);
        let mut store = acquire_lock(&self.inner)?;
        store.blobs.entry(oid.clone()).or_insert_with(|| bytes.to_vec());
        Ok(oid)
    }

    async fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        let store = acquire_lock(&self.inner)?;
        store
            .blobs
            .get(oid)
            .cloned()
            .ok_or_else(|| EventgraphError::load(crate::error::StringError(format!("blob not found: {oid}"))))
    }

    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        let oid = content_oid(&Self::canonical_tree_bytes(&sorted));
        let map: BTreeMap<String, Oid> = sorted.into_iter().map(|e| (e.path, e.oid)).collect();
        let mut store = acquire_lock(&self.inner)?;
        store.trees.entry(oid.clone()).or_insert(map);
        Ok(oid)
    }

    async fn read_tree_oids(&self, oid: &Oid) -> Result<BTreeMap<String, Oid>> {
        let store = acquire_lock(&self.inner)?;
        if let Some(tree) = store.trees.get(oid) {
            return Ok(tree.clone());
        }
        if let Some(commit) = store.commits.get(oid) {
            return Ok(commit.tree.clone());
        }
        Err(EventgraphError::load(crate::error::StringError(format!(
            "tree not found: {oid}"
        ))))
    }

    async fn commit_node_with_tree(&self, req: CommitWithTreeRequest<'_>) -> Result<Oid> {
        let tree = {
            let store = acquire_lock(&self.inner)?;
            store
                .trees
                .get(&req.tree_oid)
                .cloned()
                .ok_or_else(|| EventgraphError::load(crate::error::StringError(format!("tree not found: {}", req.tree_oid))))?
        };
        let oid = content_oid(&Self::canonical_commit_bytes(&tree, req.parents, req.message));
        let mut store = acquire_lock(&self.inner)?;
        store.commits.entry(oid.clone()).or_insert(CommitRecord {
            message: req.message.to_string(),
            parents: req.parents.to_vec(),
            tree,
        });
        Ok(oid)
    }

    async fn commit_node(&self, req: CommitRequest<'_>) -> Result<Oid> {
        let tree = BTreeMap::new();
        let oid = content_oid(&Self::canonical_commit_bytes(&tree, req.parents, req.message));
        let mut store = acquire_lock(&self.inner)?;
        store.commits.entry(oid.clone()).or_insert(CommitRecord {
            message: req.message.to_string(),
            parents: req.parents.to_vec(),
            tree,
        });
        Ok(oid)
    }

    async fn read_ref(&self, name: &str) -> Result<Option<Oid>> {
        let store = acquire_lock(&self.inner)?;
        Ok(store.refs.get(name).cloned())
    }

    async fn update_ref(&self, name: &str, oid: &Oid) -> Result<()> {
        let mut store = acquire_lock(&self.inner)?;
        store.refs.insert(name.to_string(), oid.clone());
        Ok(())
    }

    async fn is_ancestor(&self, a: &Oid, b: &Oid) -> Result<bool> {
        if a == b {
            return Ok(true);
        }
        let store = acquire_lock(&self.inner)?;
        let mut frontier = vec![b.clone()];
        let mut visited = std::collections::BTreeSet::new();
        while let Some(current) = frontier.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(commit) = store.commits.get(&current) else {
                continue;
            };
            for parent in &commit.parents {
                if parent == a {
                    return Ok(true);
                }
                frontier.push(parent.clone());
            }
        }
        Ok(false)
    }

    async fn get_node_info(&self, oid: &Oid) -> Result<NodeInfo> {
        let store = acquire_lock(&self.inner)?;
        store
            .commits
            .get(oid)
            .map(|c| NodeInfo {
                message: c.message.clone(),
                parents: c.parents.clone(),
            })
            .ok_or_else(|| EventgraphError::load(crate::error::StringError(format!("commit not found: {oid}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_blob_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let a = store.write_blob(b"hello").await.unwrap();
        let b = store.write_blob(b"hello").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn tree_round_trips_through_commit() {
        let store = InMemoryObjectStore::new();
        let blob = store.write_blob(b"data").await.unwrap();
        let tree_oid = store
            .write_tree(&[TreeEntry::new("state.cbor", blob.clone())])
            .await
            .unwrap();
        let commit_oid = store
            .commit_node_with_tree(CommitWithTreeRequest {
                tree_oid: tree_oid.clone(),
                parents: &[],
                message: "checkpoint",
            })
            .await
            .unwrap();
        let entries = store.read_tree_oids(&commit_oid).await.unwrap();
        assert_eq!(entries.get("state.cbor"), Some(&blob));
    }

    #[tokio::test]
    async fn is_ancestor_walks_parent_chain() {
        let store = InMemoryObjectStore::new();
        let root = store
            .commit_node(CommitRequest { message: "root", parents: &[] })
            .await
            .unwrap();
        let child = store
            .commit_node(CommitRequest {
                message: "child",
                parents: &[root.clone()],
            })
            .await
            .unwrap();
        assert!(store.is_ancestor(&root, &child).await.unwrap());
        assert!(!store.is_ancestor(&child, &root).await.unwrap());
    }
}
