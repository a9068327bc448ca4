//! `GraphRefManager`: keeps the graph's durable reference pointed at
//! reachable history, fast-forwarding when possible and synthesizing an
//! anchor commit when writer tips have diverged.
//!
//! Grounded on `sombra`'s rule of writing durable state before updating
//! the header (`examples/maskdotdev-sombra/src/db/transaction.rs`),
//! applied here to the ref-CAS algorithm instead of a WAL frame.

use tracing::{info, warn};

use crate::checkpoint::Message;
use crate::error::Result;
use crate::model::Oid;
use crate::storage_port::{CommitRequest, ObjectStore};

/// Outcome of [`GraphRefManager::sync_head`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncResult {
    /// Whether the ref was changed.
    pub updated: bool,
    /// Whether the update synthesized an anchor (as opposed to a plain
    /// fast-forward, or the ref having been unset).
    pub anchor: bool,
    /// The OID the ref now points at, if it was updated.
    pub sha: Option<Oid>,
}

/// Schema tag carried in an anchor commit's `eg-schema` trailer. Anchors
/// are pure bookkeeping with no payload format to version, so this stays
/// fixed rather than tracking [`crate::crdt::PATCH_SCHEMA`] or
/// [`super::checkpoint::CheckpointSchema`].
const ANCHOR_SCHEMA: u32 = 1;

/// Synchronizes a named reference toward `new_tip`.
pub struct GraphRefManager;

impl GraphRefManager {
    /// Implements the fast-forward/anchor-synthesis algorithm from the
    /// durability design: read the current value, fast-forward if
    /// `new_tip` is a descendant, otherwise synthesize an anchor with
    /// parents `[current, new_tip]` so neither tip becomes unreachable.
    /// `graph` is carried in the synthesized anchor's `eg-graph` trailer.
    pub async fn sync_head(store: &dyn ObjectStore, ref_name: &str, graph: &str, new_tip: &Oid) -> Result<SyncResult> {
        let current = store.read_ref(ref_name).await?;

        let Some(current) = current else {
            store.update_ref(ref_name, new_tip).await?;
            info!(ref_name, sha = %new_tip, "ref initialized");
            return Ok(SyncResult {
                updated: true,
                anchor: false,
                sha: Some(new_tip.clone()),
            });
        };

        if &current == new_tip {
            return Ok(SyncResult {
                updated: false,
                anchor: false,
                sha: None,
            });
        }

        if store.is_ancestor(&current, new_tip).await? {
            store.update_ref(ref_name, new_tip).await?;
            info!(ref_name, sha = %new_tip, "ref fast-forwarded");
            return Ok(SyncResult {
                updated: true,
                anchor: false,
                sha: Some(new_tip.clone()),
            });
        }

        warn!(ref_name, current = %current, new_tip = %new_tip, "diverged tips, synthesizing anchor");
        let message = Message::Anchor {
            graph: graph.to_string(),
            schema: ANCHOR_SCHEMA,
        }
        .format("eventgraph anchor");
        let anchor_oid = store
            .commit_node(CommitRequest {
                message: &message,
                parents: &[current, new_tip.clone()],
            })
            .await?;
        store.update_ref(ref_name, &anchor_oid).await?;

        Ok(SyncResult {
            updated: true,
            anchor: true,
            sha: Some(anchor_oid),
        })
    }
}
