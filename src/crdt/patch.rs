//! Patch schema (v2): the unit of mutation a writer appends.

use serde::{Deserialize, Serialize};

use crate::model::{Frontier, Oid};

use super::value::PropValue;

/// Schema version this crate accepts. Schema 1 patches are rejected with a
/// [`crate::error::EventgraphError::Migration`] error.
pub const PATCH_SCHEMA: u32 = 2;

/// The target of a [`Op::PropSet`] or [`Op::BlobValue`] op.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PropTarget {
    /// A node property.
    Node {
        /// The node being annotated.
        node_id: String,
    },
    /// An edge property.
    Edge {
        /// Source node of the edge.
        from: String,
        /// Destination node of the edge.
        to: String,
        /// Edge label.
        label: String,
    },
}

/// A single mutation within a patch.
///
/// Ops carry only payload data — never dots or event ids. The reducer
/// assigns those deterministically as it consumes the patch (spec §4.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Op {
    /// Adds a node to the live set.
    NodeAdd {
        /// The node being added.
        node_id: String,
    },
    /// Removes a node from the live set.
    NodeTombstone {
        /// The node being removed.
        node_id: String,
    },
    /// Adds a directed, labeled edge to the live set.
    EdgeAdd {
        /// Source node.
        from: String,
        /// Destination node.
        to: String,
        /// Edge label.
        label: String,
    },
    /// Removes a directed, labeled edge from the live set.
    EdgeTombstone {
        /// Source node.
        from: String,
        /// Destination node.
        to: String,
        /// Edge label.
        label: String,
    },
    /// Sets a node or edge property via LWW upsert.
    PropSet {
        /// The node or edge being annotated.
        target: PropTarget,
        /// Property name.
        key: String,
        /// New value.
        value: PropValue,
    },
    /// Identical to [`Op::PropSet`] with a blob-reference value.
    BlobValue {
        /// The node or edge being annotated.
        target: PropTarget,
        /// Property name.
        key: String,
        /// Reference to the out-of-line blob.
        blob: Oid,
    },
}

/// A patch: an ordered batch of ops authored by one writer at one logical
/// time, appended as a child object of the writer's tip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Patch {
    /// Schema version; must equal [`PATCH_SCHEMA`].
    pub schema: u32,
    /// The writer that authored this patch.
    pub writer_id: String,
    /// Lamport timestamp of this patch.
    pub lamport: u64,
    /// The frontier this writer had observed when authoring the patch.
    pub parent_tips: Frontier,
    /// The ordered list of mutations.
    pub ops: Vec<Op>,
    /// Optional read-set, used by optimistic-concurrency callers; opaque
    /// to the reducer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reads: Option<Vec<String>>,
    /// Optional write-set, used by optimistic-concurrency callers; opaque
    /// to the reducer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writes: Option<Vec<String>>,
}

impl Patch {
    /// Builds a new schema-2 patch.
    pub fn new(
        writer_id: impl Into<String>,
        lamport: u64,
        parent_tips: Frontier,
        ops: Vec<Op>,
    ) -> Self {
        Patch {
            schema: PATCH_SCHEMA,
            writer_id: writer_id.into(),
            lamport,
            parent_tips,
            ops,
            reads: None,
            writes: None,
        }
    }
}
