//! Per-writer event identity: [`Dot`], [`EventId`], and [`VersionVector`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Oid;

/// A single writer's monotonic event identity: `(writerId, counter)`.
///
/// Canonical encoding is `"<writerId>:<counter>"`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Dot {
    /// Stable identifier of the writer that produced this dot.
    pub writer_id: String,
    /// Monotonic per-writer counter; always positive.
    pub counter: u64,
}

impl Dot {
    /// Builds a new dot. `counter` must be positive per the spec invariant;
    /// callers (the reducer) are responsible for only ever minting
    /// increasing, positive counters.
    pub fn new(writer_id: impl Into<String>, counter: u64) -> Self {
        Dot {
            writer_id: writer_id.into(),
            counter,
        }
    }

    /// Canonical `"<writerId>:<counter>"` encoding.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.writer_id, self.counter)
    }
}

/// Total-order event identity: `(lamport, writerId, patchSha, opIndex)`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventId {
    /// Lamport timestamp of the patch this op belongs to.
    pub lamport: u64,
    /// Writer that authored the patch.
    pub writer_id: String,
    /// Content hash of the patch object.
    pub patch_sha: Oid,
    /// Index of this op within the patch's `ops` array.
    pub op_index: u32,
}

impl EventId {
    /// Sentinel writer id used by the legacy bare-lamport edge-birth
    /// deserializer. Never a real writer; excluded from applied-VV and
    /// checkpoint writer accounting.
    pub const LEGACY_SENTINEL_WRITER: &'static str = "";
    /// Sentinel patch sha paired with [`Self::LEGACY_SENTINEL_WRITER`].
    pub const LEGACY_SENTINEL_PATCH_SHA: &'static str = "0000";

    /// True if this event id is the legacy placeholder synthesized when
    /// deserializing a bare-lamport edge-birth entry.
    pub fn is_legacy_sentinel(&self) -> bool {
        self.writer_id == Self::LEGACY_SENTINEL_WRITER
            && self.patch_sha.as_str() == Self::LEGACY_SENTINEL_PATCH_SHA
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.writer_id.cmp(&other.writer_id))
            .then_with(|| self.patch_sha.as_str().cmp(other.patch_sha.as_str()))
            .then_with(|| self.op_index.cmp(&other.op_index))
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-writer high-water mark: `writerId -> max counter observed`.
///
/// Merge is element-wise max; comparison between two vectors is a partial
/// order (neither dominates, one dominates, or they're equal).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<String, u64>);

/// Result of comparing two [`VersionVector`]s.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VvOrdering {
    /// Both vectors have identical counters for every writer.
    Equal,
    /// `self` dominates `other` (>= everywhere, > somewhere).
    Greater,
    /// `other` dominates `self`.
    Less,
    /// Neither dominates; the vectors are concurrent.
    Concurrent,
}

impl VersionVector {
    /// An empty version vector.
    pub fn new() -> Self {
        VersionVector(BTreeMap::new())
    }

    /// The counter observed for `writer`, or zero if never observed.
    pub fn get(&self, writer: &str) -> u64 {
        self.0.get(writer).copied().unwrap_or(0)
    }

    /// Sets the counter for `writer` to `value`.
    pub fn set(&mut self, writer: impl Into<String>, value: u64) {
        self.0.insert(writer.into(), value);
    }

    /// Raises the counter for `writer` to `max(current, candidate)`.
    pub fn observe(&mut self, writer: &str, candidate: u64) {
        let entry = self.0.entry(writer.to_string()).or_insert(0);
        if candidate > *entry {
            *entry = candidate;
        }
    }

    /// Element-wise max merge of two vectors.
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (writer, counter) in &other.0 {
            out.observe(writer, *counter);
        }
        out
    }

    /// Merges `other` into `self` in place.
    pub fn merge_in_place(&mut self, other: &Self) {
        for (writer, counter) in &other.0 {
            self.observe(writer, *counter);
        }
    }

    /// Iterates writer/counter pairs in sorted writer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(w, c)| (w.as_str(), *c))
    }

    /// Number of writers tracked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no writer has been observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Partial-order comparison against `other`.
    pub fn compare(&self, other: &Self) -> VvOrdering {
        let mut self_greater = false;
        let mut other_greater = false;

        let mut writers: Vec<&str> = self.0.keys().map(String::as_str).collect();
        for w in other.0.keys() {
            if !self.0.contains_key(w) {
                writers.push(w.as_str());
            }
        }

        for w in writers {
            let a = self.get(w);
            let b = other.get(w);
            match a.cmp(&b) {
                Ordering::Greater => self_greater = true,
                Ordering::Less => other_greater = true,
                Ordering::Equal => {}
            }
        }

        match (self_greater, other_greater) {
            (false, false) => VvOrdering::Equal,
            (true, false) => VvOrdering::Greater,
            (false, true) => VvOrdering::Less,
            (true, true) => VvOrdering::Concurrent,
        }
    }
}
