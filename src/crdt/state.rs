//! The materialized CRDT state: `WarpState` (schema v5).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeKey, EventId, PropKey, VersionVector};

use super::lww::Lww;
use super::orset::OrSet;
use super::value::PropValue;

/// The full CRDT state the reducer folds patches into.
///
/// Field names follow the spec's data-model table directly:
/// `nodeAlive`, `edgeAlive`, `prop`, `observedFrontier`, `edgeBirthEvent`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WarpState {
    /// Live set of node ids.
    pub node_alive: OrSet<String>,
    /// Live set of directed labeled edges.
    pub edge_alive: OrSet<EdgeKey>,
    /// Node and edge properties, each an LWW register.
    pub prop: BTreeMap<PropKey, Lww<PropValue>>,
    /// Per-writer high-water mark of patches already merged. This is a
    /// lamport-counter vector, distinct from the OID-keyed [`crate::model::Frontier`]
    /// used for checkpoint/ref bookkeeping.
    pub observed_frontier: VersionVector,
    /// Event id of the first add of each edge, used to gate edge-property
    /// visibility and to answer "who created this edge" queries.
    pub edge_birth_event: BTreeMap<EdgeKey, EventId>,
}

impl WarpState {
    /// An empty state.
    pub fn new() -> Self {
        WarpState::default()
    }

    /// True iff both endpoints of `(from, to, label)` are currently visible
    /// nodes — the invariant that gates edge visibility regardless of
    /// whether the edge itself is tombstoned.
    pub fn edge_endpoints_visible(&self, from: &str, to: &str) -> bool {
        self.node_alive.is_visible(&from.to_string()) && self.node_alive.is_visible(&to.to_string())
    }

    /// True iff the edge is visible: present in `edgeAlive` *and* both
    /// endpoints are live nodes.
    pub fn edge_visible(&self, key: &EdgeKey) -> bool {
        if !self.edge_alive.is_visible(key) {
            return false;
        }
        match key.parts() {
            Some((from, to, _label)) => self.edge_endpoints_visible(&from, &to),
            None => false,
        }
    }

    /// Records the birth event for `key` if one is not already recorded, or
    /// keeps the existing one if it sorts lower (earlier in the total
    /// order) than `candidate` — birth is "min by EventId" per spec §4.1.
    pub fn observe_edge_birth(&mut self, key: EdgeKey, candidate: EventId) {
        match self.edge_birth_event.get(&key) {
            Some(existing) if *existing <= candidate => {}
            _ => {
                self.edge_birth_event.insert(key, candidate);
            }
        }
    }

    /// Derives the applied version vector by scanning every dot present in
    /// `nodeAlive.entries` and `edgeAlive.entries`, including dots that are
    /// tombstoned but still physically present. Represents what has been
    /// *applied*, not what is *visible*.
    ///
    /// The legacy edge-birth sentinel writer (`""`) is never a source of
    /// dots (birth events are not dots), so it never needs special-casing
    /// here; this derivation only ever walks `OrSet` entries.
    pub fn derive_applied_vv(&self) -> VersionVector {
        let mut vv = VersionVector::new();
        for dot in self.node_alive.all_dots() {
            vv.observe(&dot.writer_id, dot.counter);
        }
        for dot in self.edge_alive.all_dots() {
            vv.observe(&dot.writer_id, dot.counter);
        }
        vv
    }

    /// Compacts `nodeAlive` and `edgeAlive` in place against `applied_vv`,
    /// physically dropping tombstoned dots the applied VV dominates.
    pub fn compact(&mut self, applied_vv: &VersionVector) {
        self.node_alive.compact(applied_vv);
        self.edge_alive.compact(applied_vv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dot, Oid};

    fn ev(lamport: u64, writer: &str) -> EventId {
        EventId {
            lamport,
            writer_id: writer.to_string(),
            patch_sha: Oid::new_unchecked("a".repeat(40)),
            op_index: 0,
        }
    }

    #[test]
    fn edge_visible_requires_both_endpoints_alive() {
        let mut state = WarpState::new();
        let key = EdgeKey::new("a", "b", "knows");
        state.edge_alive.add(key.clone(), Dot::new("alice", 1));
        // Neither endpoint is alive yet.
        assert!(!state.edge_visible(&key));

        state.node_alive.add("a".to_string(), Dot::new("alice", 2));
        state.node_alive.add("b".to_string(), Dot::new("alice", 3));
        assert!(state.edge_visible(&key));
    }

    #[test]
    fn edge_birth_keeps_lexicographically_smaller_event_id() {
        let mut state = WarpState::new();
        let key = EdgeKey::new("a", "b", "knows");
        state.observe_edge_birth(key.clone(), ev(3, "bob"));
        state.observe_edge_birth(key.clone(), ev(3, "alice"));
        assert_eq!(state.edge_birth_event[&key].writer_id, "alice");
    }

    #[test]
    fn applied_vv_counts_tombstoned_dots() {
        let mut state = WarpState::new();
        state.node_alive.add("a".to_string(), Dot::new("alice", 1));
        state.node_alive.remove(&"a".to_string());
        let vv = state.derive_applied_vv();
        assert_eq!(vv.get("alice"), 1);
    }
}
