//! `PatchSession`: compare-and-swap writer-ref semantics for appending a
//! patch to a writer's chain.
//!
//! Grounded on `sombra::db::transaction::Transaction` (`examples/maskdotdev-sombra/src/db/transaction.rs`):
//! a handle opened against the current state, accumulating mutations, that
//! consumes itself on `commit` and fails closed rather than leaving partial
//! durable state. Here the "current state" being compared-and-swapped is
//! the writer's ref, not a page header.

use tracing::warn;

use crate::checkpoint::Message;
use crate::crdt::{Op, Patch, PATCH_SCHEMA};
use crate::error::{EventgraphError, Result, WriterError};
use crate::model::{Frontier, Oid};
use crate::storage_port::{CommitWithTreeRequest, ObjectStore, TreeEntry};

const PATCH_FILE: &str = "patch.cbor";

fn writer_ref(graph_root: &str, graph: &str, writer_id: &str) -> String {
    format!("refs/{graph_root}/{graph}/writers/{writer_id}")
}

/// Reads back a writer's most recent patch, used by [`PatchSession::open`]
/// to derive the next lamport timestamp.
async fn read_patch(store: &dyn ObjectStore, oid: &Oid) -> Result<Patch> {
    let tree = store.read_tree_oids(oid).await?;
    let patch_oid = tree
        .get(PATCH_FILE)
        .ok_or_else(|| EventgraphError::Invariant(format!("patch commit {oid} missing patch.cbor")))?;
    let bytes = store.read_blob(patch_oid).await?;
    ciborium::from_reader(bytes.as_slice()).map_err(|e| EventgraphError::corruption(PATCH_FILE, e.to_string()))
}

/// A patch session: opened against a writer's current tip, accumulates
/// ops, and on `commit` verifies the tip hasn't advanced before appending.
///
/// Not `Send`/reusable across an await that outlives it — one session
/// authors exactly one patch.
pub struct PatchSession<'a> {
    store: &'a dyn ObjectStore,
    graph_root: String,
    graph: String,
    writer_id: String,
    opened_tip: Option<Oid>,
    lamport: u64,
    parent_tips: Frontier,
    ops: Vec<Op>,
}

impl<'a> PatchSession<'a> {
    /// Opens a session for `writer_id`, reading its current tip and, if one
    /// exists, the lamport timestamp of the patch it points to so the new
    /// patch's lamport can be derived as `previous + 1`.
    ///
    /// `parent_tips` is the frontier this writer observed at open time,
    /// recorded on the patch for downstream conflict/causality bookkeeping
    /// — it is unrelated to the CAS check, which is scoped to this
    /// writer's own ref.
    pub async fn open(
        store: &'a dyn ObjectStore,
        graph_root: impl Into<String>,
        graph: impl Into<String>,
        writer_id: impl Into<String>,
        parent_tips: Frontier,
    ) -> Result<Self> {
        let graph_root = graph_root.into();
        let graph = graph.into();
        let writer_id = writer_id.into();

        let ref_name = writer_ref(&graph_root, &graph, &writer_id);
        let opened_tip = store.read_ref(&ref_name).await?;

        let lamport = match &opened_tip {
            Some(tip) => read_patch(store, tip).await?.lamport + 1,
            None => 1,
        };

        Ok(PatchSession {
            store,
            graph_root,
            graph,
            writer_id,
            opened_tip,
            lamport,
            parent_tips,
            ops: Vec::new(),
        })
    }

    /// The lamport timestamp the committed patch will carry.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// Appends an op to the patch under construction.
    pub fn push(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Builds the patch, writes its blob/tree/commit, and compare-and-swaps
    /// the writer ref from `opened_tip` to the new commit.
    ///
    /// Raises [`WriterError::EmptyPatch`] if no ops were pushed,
    /// [`WriterError::WriterRefAdvanced`] if the writer ref no longer reads
    /// back as `opened_tip`, and [`WriterError::PersistWriteFailed`] if any
    /// of the blob/tree/commit/ref writes fail.
    pub async fn commit(self) -> Result<Oid> {
        if self.ops.is_empty() {
            return Err(EventgraphError::Writer(WriterError::EmptyPatch));
        }

        let ref_name = writer_ref(&self.graph_root, &self.graph, &self.writer_id);
        let current = self.store.read_ref(&ref_name).await?;
        if current != self.opened_tip {
            warn!(
                graph = %self.graph,
                writer_id = %self.writer_id,
                "writer ref advanced since session open"
            );
            return Err(EventgraphError::Writer(WriterError::WriterRefAdvanced));
        }

        let persist_failed = |e: EventgraphError| EventgraphError::Writer(WriterError::PersistWriteFailed(e.to_string()));

        let patch = Patch::new(self.writer_id.clone(), self.lamport, self.parent_tips, self.ops);
        let patch_bytes = {
            let mut buf = Vec::new();
            ciborium::into_writer(&patch, &mut buf).map_err(|e| persist_failed(EventgraphError::corruption(PATCH_FILE, e.to_string())))?;
            buf
        };

        let patch_oid = self.store.write_blob(&patch_bytes).await.map_err(persist_failed)?;
        let tree_oid = self
            .store
            .write_tree(&[TreeEntry::new(PATCH_FILE, patch_oid)])
            .await
            .map_err(persist_failed)?;

        let parents: Vec<Oid> = self.opened_tip.clone().into_iter().collect();
        let message = Message::Patch {
            graph: self.graph.clone(),
            schema: PATCH_SCHEMA,
        }
        .format(&format!("patch: {}", self.writer_id));

        let commit_oid = self
            .store
            .commit_node_with_tree(CommitWithTreeRequest {
                tree_oid,
                parents: &parents,
                message: &message,
            })
            .await
            .map_err(persist_failed)?;

        self.store.update_ref(&ref_name, &commit_oid).await.map_err(persist_failed)?;

        Ok(commit_oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_port::InMemoryObjectStore;

    #[tokio::test]
    async fn first_patch_has_no_parents_and_lamport_one() {
        let store = InMemoryObjectStore::new();
        let mut session = PatchSession::open(&store, "eventgraph", "g", "alice", Frontier::new()).await.unwrap();
        assert_eq!(session.lamport(), 1);
        session.push(Op::NodeAdd { node_id: "a".into() });
        let commit_oid = session.commit().await.unwrap();

        let info = store.get_node_info(&commit_oid).await.unwrap();
        assert!(info.parents.is_empty());
        let tip = store.read_ref("refs/eventgraph/g/writers/alice").await.unwrap();
        assert_eq!(tip, Some(commit_oid));
    }

    #[tokio::test]
    async fn second_patch_chains_and_increments_lamport() {
        let store = InMemoryObjectStore::new();
        let mut first = PatchSession::open(&store, "eventgraph", "g", "alice", Frontier::new()).await.unwrap();
        first.push(Op::NodeAdd { node_id: "a".into() });
        let first_oid = first.commit().await.unwrap();

        let mut second = PatchSession::open(&store, "eventgraph", "g", "alice", Frontier::new()).await.unwrap();
        assert_eq!(second.lamport(), 2);
        second.push(Op::NodeAdd { node_id: "b".into() });
        let second_oid = second.commit().await.unwrap();

        let info = store.get_node_info(&second_oid).await.unwrap();
        assert_eq!(info.parents, vec![first_oid]);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let store = InMemoryObjectStore::new();
        let session = PatchSession::open(&store, "eventgraph", "g", "alice", Frontier::new()).await.unwrap();
        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, EventgraphError::Writer(WriterError::EmptyPatch)));
    }

    #[tokio::test]
    async fn commit_after_concurrent_advance_raises_writer_ref_advanced() {
        let store = InMemoryObjectStore::new();
        let mut session = PatchSession::open(&store, "eventgraph", "g", "alice", Frontier::new()).await.unwrap();
        session.push(Op::NodeAdd { node_id: "a".into() });

        // Simulate a concurrent writer session committing first.
        let mut racer = PatchSession::open(&store, "eventgraph", "g", "alice", Frontier::new()).await.unwrap();
        racer.push(Op::NodeAdd { node_id: "b".into() });
        racer.commit().await.unwrap();

        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, EventgraphError::Writer(WriterError::WriterRefAdvanced)));
    }
}
