//! Add-wins observed-remove set.
//!
//! An element is visible iff at least one of the dots that added it has not
//! been moved into the tombstone set. Concurrent add/remove resolves to
//! add-wins: a remove only tombstones the dots it observed, so a concurrent
//! add (carrying a fresh dot the remove never saw) keeps the element
//! visible.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Dot, VersionVector};

/// Add-wins OR-Set over elements of type `E`.
///
/// `entries` and `tombstones` are kept in `BTreeMap`/`BTreeSet` so that
/// `serde` serialization is canonical (sorted keys, sorted dots) with no
/// extra bookkeeping, matching the spec's serialization requirement.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrSet<E: Ord> {
    entries: BTreeMap<E, BTreeSet<Dot>>,
    tombstones: BTreeSet<Dot>,
}

impl<E: Ord + Clone> OrSet<E> {
    /// An empty OR-Set.
    pub fn new() -> Self {
        OrSet {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// Records a fresh `dot` as having added `element`. Returns `true`
    /// unless `element` was already visible, in which case the add is
    /// redundant (the dot is still recorded, but it changes nothing
    /// observable).
    pub fn add(&mut self, element: E, dot: Dot) -> bool {
        let was_visible = self.is_visible(&element);
        self.entries.entry(element).or_default().insert(dot);
        !was_visible
    }

    /// Moves every dot currently visible for `element` into the tombstone
    /// set. A no-op (redundant remove) if the element is already invisible.
    ///
    /// Returns `true` if any dot was newly tombstoned.
    pub fn remove(&mut self, element: &E) -> bool {
        let Some(dots) = self.entries.get(element) else {
            return false;
        };
        let mut moved = false;
        for dot in dots.clone() {
            if self.tombstones.insert(dot) {
                moved = true;
            }
        }
        moved
    }

    /// The dots recorded as having added `element`, visible or not.
    pub fn dots_of(&self, element: &E) -> BTreeSet<Dot> {
        self.entries.get(element).cloned().unwrap_or_default()
    }

    /// True iff `element` has at least one dot not present in the
    /// tombstone set.
    pub fn is_visible(&self, element: &E) -> bool {
        self.entries
            .get(element)
            .is_some_and(|dots| dots.iter().any(|d| !self.tombstones.contains(d)))
    }

    /// Elements with at least one non-tombstoned dot, in key order.
    pub fn visible_elements(&self) -> impl Iterator<Item = &E> {
        self.entries
            .iter()
            .filter(move |(_, dots)| dots.iter().any(|d| !self.tombstones.contains(d)))
            .map(|(e, _)| e)
    }

    /// All elements this set has ever recorded a dot for, visible or not.
    pub fn all_elements(&self) -> impl Iterator<Item = &E> {
        self.entries.keys()
    }

    /// Every dot present in `entries`, including tombstoned ones. Used to
    /// derive the applied version vector.
    pub fn all_dots(&self) -> impl Iterator<Item = &Dot> {
        self.entries.values().flat_map(|dots| dots.iter())
    }

    /// Whether `dot` has been tombstoned.
    pub fn is_tombstoned(&self, dot: &Dot) -> bool {
        self.tombstones.contains(dot)
    }

    /// Physically removes any tombstoned dot whose counter is less than or
    /// equal to the writer's applied counter, and drops elements left with
    /// no remaining dots. Mirrors the checkpoint-time compaction rule.
    pub fn compact(&mut self, applied_vv: &VersionVector) {
        let covered = |dot: &Dot| dot.counter <= applied_vv.get(&dot.writer_id);
        let tombstoned_before: BTreeSet<Dot> = self.tombstones.clone();

        self.entries.retain(|_, dots| {
            dots.retain(|dot| !(tombstoned_before.contains(dot) && covered(dot)));
            !dots.is_empty()
        });

        self.tombstones.retain(|dot| !covered(dot));
    }

    /// Number of distinct elements tracked (visible or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no element has ever been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(writer: &str, counter: u64) -> Dot {
        Dot::new(writer, counter)
    }

    #[test]
    fn add_then_remove_hides_element() {
        let mut set = OrSet::new();
        set.add("a".to_string(), dot("alice", 1));
        assert!(set.is_visible(&"a".to_string()));
        set.remove(&"a".to_string());
        assert!(!set.is_visible(&"a".to_string()));
    }

    #[test]
    fn concurrent_add_wins_over_remove() {
        // S1/S2-style scenario: a remove observes only the first dot; a
        // concurrent add contributes a second dot the remove never saw.
        let mut set = OrSet::new();
        set.add("a".to_string(), dot("alice", 1));
        set.remove(&"a".to_string());
        assert!(!set.is_visible(&"a".to_string()));

        set.add("a".to_string(), dot("bob", 1));
        assert!(set.is_visible(&"a".to_string()));
    }

    #[test]
    fn add_reports_redundant_once_already_visible() {
        let mut set = OrSet::new();
        assert!(set.add("a".to_string(), dot("alice", 1)));
        assert!(!set.add("a".to_string(), dot("alice", 2)));
    }

    #[test]
    fn redundant_remove_is_noop() {
        let mut set = OrSet::new();
        set.add("a".to_string(), dot("alice", 1));
        set.remove(&"a".to_string());
        assert!(!set.remove(&"a".to_string()));
    }

    #[test]
    fn compact_drops_covered_tombstones_only() {
        let mut set = OrSet::new();
        set.add("a".to_string(), dot("alice", 1));
        set.add("a".to_string(), dot("alice", 2));
        set.remove(&"a".to_string());

        let mut vv = VersionVector::new();
        vv.set("alice", 1);
        set.compact(&vv);
        // Only the dot with counter <= 1 was covered and dropped; the
        // element is still tracked via dot(alice,2) in `entries`, but
        // `entries` retains it as a tombstoned dot only if counter > vv.
        assert!(set
            .dots_of(&"a".to_string())
            .iter()
            .all(|d| d.counter > 1));
    }

    #[test]
    fn visible_elements_sorted_by_key() {
        let mut set = OrSet::new();
        set.add("b".to_string(), dot("alice", 1));
        set.add("a".to_string(), dot("alice", 2));
        let elems: Vec<_> = set.visible_elements().cloned().collect();
        assert_eq!(elems, vec!["a".to_string(), "b".to_string()]);
    }
}
