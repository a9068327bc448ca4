//! `IndexStalenessChecker`: decides whether a persisted bitmap index is
//! still valid for a given replay frontier, so callers don't pay to
//! rebuild an index that already covers the state they need.

use crate::model::Frontier;

/// Whether an index built at `indexed_frontier` still covers
/// `current_frontier`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Staleness {
    /// The index covers everything in `current_frontier`; safe to reuse.
    Fresh,
    /// `current_frontier` has writers at tips the index didn't see (new
    /// writers or writers that have advanced); must be rebuilt.
    Stale {
        /// Writers whose current tip diverges from what the index recorded.
        diverged_writers: Vec<String>,
    },
}

/// Compares a persisted index's recorded frontier against the frontier
/// being queried.
pub struct IndexStalenessChecker;

impl IndexStalenessChecker {
    /// An index is fresh only if every writer tracked in
    /// `current_frontier` is at the exact tip `indexed_frontier` recorded
    /// for it.
    pub fn check(indexed_frontier: &Frontier, current_frontier: &Frontier) -> Staleness {
        let diverged = current_frontier.advanced_writers(indexed_frontier);
        if diverged.is_empty() {
            Staleness::Fresh
        } else {
            Staleness::Stale { diverged_writers: diverged }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Oid;

    fn oid(byte: char) -> Oid {
        Oid::new_unchecked(byte.to_string().repeat(40))
    }

    #[test]
    fn equal_frontiers_are_fresh() {
        let mut f = Frontier::new();
        f.set("alice", oid('a'));
        assert_eq!(IndexStalenessChecker::check(&f, &f), Staleness::Fresh);
    }

    #[test]
    fn advanced_writer_tip_is_stale() {
        let mut indexed = Frontier::new();
        indexed.set("alice", oid('a'));
        let mut current = indexed.clone();
        current.set("alice", oid('b'));
        match IndexStalenessChecker::check(&indexed, &current) {
            Staleness::Stale { diverged_writers } => assert_eq!(diverged_writers, vec!["alice".to_string()]),
            Staleness::Fresh => panic!("expected stale"),
        }
    }

    #[test]
    fn new_writer_in_current_is_stale() {
        let mut indexed = Frontier::new();
        indexed.set("alice", oid('a'));
        let mut current = indexed.clone();
        current.set("bob", oid('b'));
        match IndexStalenessChecker::check(&indexed, &current) {
            Staleness::Stale { diverged_writers } => assert_eq!(diverged_writers, vec!["bob".to_string()]),
            Staleness::Fresh => panic!("expected stale"),
        }
    }
}
