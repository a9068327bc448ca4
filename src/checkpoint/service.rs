//! `CheckpointService`: build/load checkpoint objects and drive incremental
//! materialization from one.
//!
//! Grounded on `sombra::admin::checkpoint`'s "gather state, serialize,
//! write blobs, write tree, update ref" shape and on
//! `sombra::admin::util::{open_graph, open_pager}`'s open/build/load
//! orchestration split.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::crdt::{JoinReducer, Patch, ReceiptMode, WarpState};
use crate::error::{EventgraphError, Result};
use crate::model::{Frontier, Oid, VersionVector};
use crate::refsync::GraphRefManager;
use crate::storage_port::{CommitWithTreeRequest, ObjectStore, TreeEntry};

use super::message::Message;
use super::serialize::{
    compute_state_hash, compute_visible_projection, deserialize_full_state, serialize_full_state,
};

const STATE_FILE: &str = "state.cbor";
const VISIBLE_FILE: &str = "visible.cbor";
const FRONTIER_FILE: &str = "frontier.cbor";
const APPLIED_VV_FILE: &str = "appliedVV.cbor";

/// Checkpoint schema carried in the commit trailer. Gates load-time
/// strictness, independent of [`super::serialize::FULL_STATE_VERSION`]
/// (the state-format tag inside `state.cbor`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckpointSchema {
    /// Tolerates a missing `appliedVV.cbor`; it is recomputed from state.
    V2,
    /// Requires `appliedVV.cbor` to be present in the tree.
    V3,
}

impl CheckpointSchema {
    fn as_u32(self) -> u32 {
        match self {
            CheckpointSchema::V2 => 2,
            CheckpointSchema::V3 => 3,
        }
    }

    fn from_u32(n: u32) -> Result<Self> {
        match n {
            2 => Ok(CheckpointSchema::V2),
            3 => Ok(CheckpointSchema::V3),
            other => Err(EventgraphError::Invariant(format!(
                "unsupported checkpoint schema: {other}"
            ))),
        }
    }
}

/// Result of [`CheckpointService::build`].
#[derive(Clone, Debug)]
pub struct CheckpointHandle {
    /// The commit-like object recording this checkpoint.
    pub commit_oid: Oid,
    /// The checkpoint tree object.
    pub tree_oid: Oid,
    /// Hex digest of the visible projection.
    pub state_hash: String,
    /// OID of the `frontier.cbor` blob.
    pub frontier_oid: Oid,
}

/// A checkpoint loaded back from storage.
#[derive(Clone, Debug)]
pub struct LoadedCheckpoint {
    /// The full materialized state at checkpoint time.
    pub state: WarpState,
    /// Writer tips recorded at checkpoint time.
    pub frontier: Frontier,
    /// Applied version vector, read from `appliedVV.cbor` if present,
    /// otherwise recomputed from `state`.
    pub applied_vv: VersionVector,
    /// The checkpoint's own commit OID.
    pub commit_oid: Oid,
}

/// Supplies the ordered patch history between two writer tips. Injected by
/// the caller (the materialization orchestrator), since only it knows how
/// a writer's chain is laid out in the backing store.
#[async_trait]
pub trait PatchLoader: Send + Sync {
    /// Loads every patch authored by `writer_id` strictly after `since`
    /// (or from the beginning of the chain if `since` is `None`) up to and
    /// including `until`.
    async fn load_patches(&self, writer_id: &str, since: Option<&Oid>, until: &Oid) -> Result<Vec<(Oid, Patch)>>;
}

/// Builds and loads checkpoint objects.
pub struct CheckpointService;

impl CheckpointService {
    fn checkpoint_ref(graph_root: &str, graph: &str) -> String {
        format!("refs/{graph_root}/{graph}/checkpoints/head")
    }

    /// Builds a checkpoint from `state` and `writer_tips`, writes it, and
    /// advances the checkpoint ref. If `compact` is true (the default), a
    /// clone of `state` is compacted against the derived applied VV before
    /// serialization.
    pub async fn build(
        &self,
        store: &dyn ObjectStore,
        graph_root: &str,
        graph: &str,
        state: &WarpState,
        writer_tips: &Frontier,
        compact: bool,
    ) -> Result<CheckpointHandle> {
        let applied_vv = state.derive_applied_vv();

        let mut write_state = state.clone();
        if compact {
            write_state.compact(&applied_vv);
        }

        let projection = compute_visible_projection(&write_state);
        let state_hash = compute_state_hash(&projection)?;

        let state_bytes = serialize_full_state(&write_state)?;
        let visible_bytes = {
            let mut buf = Vec::new();
            ciborium::into_writer(&projection, &mut buf)
                .map_err(|e| EventgraphError::corruption(VISIBLE_FILE, e.to_string()))?;
            buf
        };
        let frontier_bytes = writer_tips.to_cbor()?;
        let applied_vv_bytes = {
            let mut buf = Vec::new();
            ciborium::into_writer(&applied_vv, &mut buf)
                .map_err(|e| EventgraphError::corruption(APPLIED_VV_FILE, e.to_string()))?;
            buf
        };

        let state_oid = store.write_blob(&state_bytes).await?;
        let visible_oid = store.write_blob(&visible_bytes).await?;
        let frontier_oid = store.write_blob(&frontier_bytes).await?;
        let applied_vv_oid = store.write_blob(&applied_vv_bytes).await?;

        let tree_oid = store
            .write_tree(&[
                TreeEntry::new(STATE_FILE, state_oid),
                TreeEntry::new(VISIBLE_FILE, visible_oid),
                TreeEntry::new(FRONTIER_FILE, frontier_oid.clone()),
                TreeEntry::new(APPLIED_VV_FILE, applied_vv_oid),
            ])
            .await?;

        let parents: Vec<Oid> = writer_tips.iter().map(|(_, tip)| tip.clone()).collect();
        let message = Message::Checkpoint {
            graph: graph.to_string(),
            schema: CheckpointSchema::V3.as_u32(),
            state_hash: state_hash.clone(),
            frontier_oid: frontier_oid.clone(),
            index_oid: None,
        };
        let commit_oid = store
            .commit_node_with_tree(CommitWithTreeRequest {
                tree_oid: tree_oid.clone(),
                parents: &parents,
                message: &message.format(&format!("checkpoint: {graph}")),
            })
            .await?;

        GraphRefManager::sync_head(store, &Self::checkpoint_ref(graph_root, graph), graph, &commit_oid).await?;

        info!(graph, state_hash = %state_hash, "checkpoint built");

        Ok(CheckpointHandle {
            commit_oid,
            tree_oid,
            state_hash,
            frontier_oid,
        })
    }

    /// Loads the latest checkpoint for `graph`, or `None` if no checkpoint
    /// has ever been created.
    pub async fn load(&self, store: &dyn ObjectStore, graph_root: &str, graph: &str) -> Result<Option<LoadedCheckpoint>> {
        let Some(commit_oid) = store.read_ref(&Self::checkpoint_ref(graph_root, graph)).await? else {
            return Ok(None);
        };

        let info = store.get_node_info(&commit_oid).await?;
        let message = Message::parse(&info.message)?;
        let Message::Checkpoint { schema, .. } = message else {
            return Err(EventgraphError::Invariant(
                "checkpoint ref does not point at a checkpoint commit".to_string(),
            ));
        };
        let schema = CheckpointSchema::from_u32(schema)?;

        let tree = store.read_tree_oids(&commit_oid).await?;

        let state_oid = tree
            .get(STATE_FILE)
            .ok_or_else(|| EventgraphError::Invariant("checkpoint tree missing state.cbor".to_string()))?;
        let frontier_oid = tree
            .get(FRONTIER_FILE)
            .ok_or_else(|| EventgraphError::Invariant("checkpoint tree missing frontier.cbor".to_string()))?;

        let state_bytes = store.read_blob(state_oid).await?;
        let state = deserialize_full_state(&state_bytes)?;

        let frontier_bytes = store.read_blob(frontier_oid).await?;
        let frontier = Frontier::from_cbor(&frontier_bytes)?;

        let applied_vv = match tree.get(APPLIED_VV_FILE) {
            Some(oid) => {
                let bytes = store.read_blob(oid).await?;
                ciborium::from_reader(bytes.as_slice())
                    .map_err(|e| EventgraphError::corruption(APPLIED_VV_FILE, e.to_string()))?
            }
            None if schema == CheckpointSchema::V2 => state.derive_applied_vv(),
            None => {
                return Err(EventgraphError::Invariant(
                    "schema-3 checkpoint missing appliedVV.cbor".to_string(),
                ))
            }
        };

        Ok(Some(LoadedCheckpoint {
            state,
            frontier,
            applied_vv,
            commit_oid,
        }))
    }

    /// Loads the latest checkpoint (or an empty state if none exists) and
    /// replays every patch between its frontier and `target_frontier`,
    /// folding all writers' patches through a single lamport-ordered
    /// linearization as required by the reducer's determinism contract.
    pub async fn materialize_incremental(
        &self,
        store: &dyn ObjectStore,
        graph_root: &str,
        graph: &str,
        target_frontier: &Frontier,
        patch_loader: &dyn PatchLoader,
    ) -> Result<WarpState> {
        let loaded = self.load(store, graph_root, graph).await?;
        let (mut state, checkpoint_frontier) = match loaded {
            Some(cp) => (cp.state, cp.frontier),
            None => (WarpState::new(), Frontier::new()),
        };

        let mut pending: Vec<(Oid, Patch)> = Vec::new();
        for (writer_id, target_tip) in target_frontier.iter() {
            let since = checkpoint_frontier.get(writer_id);
            if since == Some(target_tip) {
                continue;
            }
            let patches = patch_loader.load_patches(writer_id, since, target_tip).await?;
            pending.extend(patches);
        }

        pending.sort_by(|(a_oid, a), (b_oid, b)| {
            a.lamport
                .cmp(&b.lamport)
                .then_with(|| a.writer_id.cmp(&b.writer_id))
                .then_with(|| a_oid.as_str().cmp(b_oid.as_str()))
        });

        debug!(graph, pending = pending.len(), "replaying pending patches");

        for (patch_oid, patch) in &pending {
            JoinReducer::apply_patch(&mut state, patch_oid, patch, ReceiptMode::Silent)?;
        }

        Ok(state)
    }
}
