//! `JoinReducer`: pure fold of one patch into a [`WarpState`].
//!
//! The reducer never touches storage. Callers (the materialization
//! orchestrator) walk the commit graph, read each patch's bytes and its
//! content hash, and fold them in commit order through [`JoinReducer::apply_patch`].

use tracing::debug;

use crate::error::{EventgraphError, Result, WriterError};
use crate::model::{Dot, EdgeKey, EventId, Oid, PropKey};

use super::lww::Lww;
use super::patch::{Op, Patch, PropTarget, PATCH_SCHEMA};
use super::state::WarpState;
use super::value::PropValue;

/// Whether [`JoinReducer::apply_patch`] reports per-op outcomes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ReceiptMode {
    /// Fold silently.
    #[default]
    Silent,
    /// Collect one [`OpReceipt`] per op, in order.
    Collect,
}

/// Whether an op changed observable state when folded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpOutcome {
    /// The op changed the state: a new dot became visible, a tombstone
    /// newly hid something, or an LWW write won.
    Applied,
    /// A `PropSet`/`BlobValue` write lost to an incumbent with a greater
    /// `EventId`.
    Superseded,
    /// An add whose element was already visible, or a tombstone of
    /// something already invisible.
    Redundant,
}

/// Outcome of applying a single op within a patch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpReceipt {
    /// Index of the op within the patch's `ops` array.
    pub op_index: u32,
    /// The event id assigned to this op.
    pub event_id: EventId,
    /// Whether this op changed observable state.
    pub outcome: OpOutcome,
}

/// Stateless reducer: every method takes the state to fold into explicitly.
pub struct JoinReducer;

impl JoinReducer {
    /// Folds `patch` (whose content hash is `patch_oid`) into `state`.
    ///
    /// Idempotent: if `state.observed_frontier.get(patch.writer_id) >=
    /// patch.lamport`, the patch has already been applied and this call is a
    /// no-op. This is what makes checkpoint-then-incremental-replay safe to
    /// run against an overlapping commit range.
    pub fn apply_patch(
        state: &mut WarpState,
        patch_oid: &Oid,
        patch: &Patch,
        receipts: ReceiptMode,
    ) -> Result<Option<Vec<OpReceipt>>> {
        if patch.schema != PATCH_SCHEMA {
            return Err(EventgraphError::Migration(format!(
                "patch schema {} is not supported (expected {PATCH_SCHEMA})",
                patch.schema
            )));
        }
        if patch.ops.is_empty() {
            return Err(EventgraphError::Writer(WriterError::EmptyPatch));
        }

        if state.observed_frontier.get(&patch.writer_id) >= patch.lamport {
            debug!(
                writer = %patch.writer_id,
                lamport = patch.lamport,
                "patch already covered by observed frontier, skipping"
            );
            return Ok(match receipts {
                ReceiptMode::Collect => Some(Vec::new()),
                ReceiptMode::Silent => None,
            });
        }

        let dot = Dot::new(patch.writer_id.clone(), patch.lamport);
        let mut out = Vec::with_capacity(patch.ops.len());

        for (index, op) in patch.ops.iter().enumerate() {
            let op_index = index as u32;
            let event_id = EventId {
                lamport: patch.lamport,
                writer_id: patch.writer_id.clone(),
                patch_sha: patch_oid.clone(),
                op_index,
            };
            let outcome = Self::apply_op(state, op, &dot, &event_id);
            if receipts == ReceiptMode::Collect {
                out.push(OpReceipt {
                    op_index,
                    event_id,
                    outcome,
                });
            }
        }

        state.observed_frontier.observe(&patch.writer_id, patch.lamport);

        Ok(match receipts {
            ReceiptMode::Collect => Some(out),
            ReceiptMode::Silent => None,
        })
    }

    fn apply_op(state: &mut WarpState, op: &Op, dot: &Dot, event_id: &EventId) -> OpOutcome {
        match op {
            Op::NodeAdd { node_id } => {
                let newly_visible = state.node_alive.add(node_id.clone(), dot.clone());
                Self::added_outcome(newly_visible)
            }
            Op::NodeTombstone { node_id } => Self::removed_outcome(state.node_alive.remove(node_id)),
            Op::EdgeAdd { from, to, label } => {
                let key = EdgeKey::new(from, to, label);
                let newly_visible = state.edge_alive.add(key.clone(), dot.clone());
                state.observe_edge_birth(key, event_id.clone());
                Self::added_outcome(newly_visible)
            }
            Op::EdgeTombstone { from, to, label } => {
                let key = EdgeKey::new(from, to, label);
                Self::removed_outcome(state.edge_alive.remove(&key))
            }
            Op::PropSet { target, key, value } => {
                Self::apply_prop_write(state, target, key, value.clone(), event_id)
            }
            Op::BlobValue { target, key, blob } => {
                Self::apply_prop_write(state, target, key, PropValue::BlobRef(blob.clone()), event_id)
            }
        }
    }

    fn added_outcome(newly_visible: bool) -> OpOutcome {
        if newly_visible {
            OpOutcome::Applied
        } else {
            OpOutcome::Redundant
        }
    }

    fn removed_outcome(newly_tombstoned: bool) -> OpOutcome {
        if newly_tombstoned {
            OpOutcome::Applied
        } else {
            OpOutcome::Redundant
        }
    }

    fn apply_prop_write(
        state: &mut WarpState,
        target: &PropTarget,
        key: &str,
        value: PropValue,
        event_id: &EventId,
    ) -> OpOutcome {
        let prop_key = match target {
            PropTarget::Node { node_id } => PropKey::node(node_id, key),
            PropTarget::Edge { from, to, label } => PropKey::edge(from, to, label, key),
        };
        match state.prop.get_mut(&prop_key) {
            Some(existing) => {
                if existing.write(event_id.clone(), value) {
                    OpOutcome::Applied
                } else {
                    OpOutcome::Superseded
                }
            }
            None => {
                state.prop.insert(prop_key, Lww::new(event_id.clone(), value));
                OpOutcome::Applied
            }
        }
    }
}
