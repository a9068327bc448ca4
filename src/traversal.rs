//! `DagTraversal`: BFS/DFS, ancestor, descendant, and reachability
//! queries over a [`BitmapIndexReader`], with bounded node/depth limits
//! and cooperative cancellation.

use std::collections::{BTreeSet, VecDeque};

use crate::abort::{check, AbortSignal, NeverAbort};
use crate::bitmap::BitmapIndexReader;
use crate::error::Result;
use crate::model::Oid;

/// Which adjacency direction a traversal follows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Follow child edges (the object's descendants).
    Forward,
    /// Follow parent edges (the object's ancestors).
    Reverse,
}

/// One node visited by a traversal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Visit {
    /// The node visited.
    pub sha: Oid,
    /// Distance from `start` in edges.
    pub depth: u32,
    /// The node this one was reached from, if any (`start` has none).
    pub parent: Option<Oid>,
}

/// Caps a traversal so it can't run unbounded over a large graph.
#[derive(Clone, Debug)]
pub struct TraversalLimits {
    /// Stop after visiting this many nodes. `None` for unbounded.
    pub max_nodes: Option<usize>,
    /// Stop descending past this depth. `None` for unbounded.
    pub max_depth: Option<u32>,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        TraversalLimits { max_nodes: None, max_depth: None }
    }
}

/// BFS/DFS/ancestor/descendant/reachability queries layered over a
/// bitmap index.
pub struct DagTraversal<'a> {
    reader: &'a BitmapIndexReader<'a>,
    /// Nodes processed between abort-signal checks.
    batch_size: usize,
}

impl<'a> DagTraversal<'a> {
    /// A traversal over `reader`, checking the abort signal every
    /// `batch_size` nodes yielded.
    pub fn new(reader: &'a BitmapIndexReader<'a>, batch_size: usize) -> Self {
        DagTraversal { reader, batch_size: batch_size.max(1) }
    }

    async fn neighbors(&self, oid: &Oid, direction: Direction) -> Result<Vec<Oid>> {
        match direction {
            Direction::Forward => self.reader.get_children(oid).await,
            Direction::Reverse => self.reader.get_parents(oid).await,
        }
    }

    /// Breadth-first traversal from `start`, following `direction`.
    pub async fn bfs(&self, start: &Oid, direction: Direction, limits: &TraversalLimits) -> Result<Vec<Visit>> {
        self.bfs_with_signal(start, direction, limits, &NeverAbort).await
    }

    /// As [`Self::bfs`], checking `signal` every `batch_size` yielded nodes.
    pub async fn bfs_with_signal(
        &self,
        start: &Oid,
        direction: Direction,
        limits: &TraversalLimits,
        signal: &dyn AbortSignal,
    ) -> Result<Vec<Visit>> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((start.clone(), 0u32, None::<Oid>));
        let mut out = Vec::new();

        while let Some((sha, depth, parent)) = queue.pop_front() {
            if !visited.insert(sha.clone()) {
                continue;
            }
            out.push(Visit { sha: sha.clone(), depth, parent });

            if out.len() % self.batch_size == 0 {
                check(signal)?;
            }
            if let Some(max_nodes) = limits.max_nodes {
                if out.len() >= max_nodes {
                    break;
                }
            }
            if limits.max_depth.is_some_and(|max_depth| depth >= max_depth) {
                continue;
            }

            for next in self.neighbors(&sha, direction).await? {
                if !visited.contains(&next) {
                    queue.push_back((next, depth + 1, Some(sha.clone())));
                }
            }
        }

        Ok(out)
    }

    /// Depth-first traversal from `start`, following `direction`.
    pub async fn dfs(&self, start: &Oid, direction: Direction, limits: &TraversalLimits) -> Result<Vec<Visit>> {
        self.dfs_with_signal(start, direction, limits, &NeverAbort).await
    }

    /// As [`Self::dfs`], checking `signal` every `batch_size` yielded nodes.
    pub async fn dfs_with_signal(
        &self,
        start: &Oid,
        direction: Direction,
        limits: &TraversalLimits,
        signal: &dyn AbortSignal,
    ) -> Result<Vec<Visit>> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![(start.clone(), 0u32, None::<Oid>)];
        let mut out = Vec::new();

        while let Some((sha, depth, parent)) = stack.pop() {
            if !visited.insert(sha.clone()) {
                continue;
            }
            out.push(Visit { sha: sha.clone(), depth, parent });

            if out.len() % self.batch_size == 0 {
                check(signal)?;
            }
            if let Some(max_nodes) = limits.max_nodes {
                if out.len() >= max_nodes {
                    break;
                }
            }
            if limits.max_depth.is_some_and(|max_depth| depth >= max_depth) {
                continue;
            }

            for next in self.neighbors(&sha, direction).await? {
                if !visited.contains(&next) {
                    stack.push((next, depth + 1, Some(sha.clone())));
                }
            }
        }

        Ok(out)
    }

    /// Alias for `bfs(start, Reverse, limits)`.
    pub async fn ancestors(&self, start: &Oid, limits: &TraversalLimits) -> Result<Vec<Visit>> {
        self.bfs(start, Direction::Reverse, limits).await
    }

    /// Alias for `bfs(start, Forward, limits)`.
    pub async fn descendants(&self, start: &Oid, limits: &TraversalLimits) -> Result<Vec<Visit>> {
        self.bfs(start, Direction::Forward, limits).await
    }

    /// Whether `target` is reachable from `start` following `direction`.
    /// Falls back to an unbounded BFS; callers needing a cheaper answer
    /// should consult `ObjectStore::is_ancestor` directly instead.
    pub async fn is_reachable(&self, start: &Oid, target: &Oid, direction: Direction) -> Result<bool> {
        if start == target {
            return Ok(true);
        }
        let visits = self.bfs(start, direction, &TraversalLimits::default()).await?;
        Ok(visits.iter().any(|v| &v.sha == target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BitmapIndexBuilder;
    use crate::storage_port::InMemoryObjectStore;
    use crate::config::IntegrityPolicy;

    fn oid(byte: char) -> Oid {
        Oid::new_unchecked(byte.to_string().repeat(40))
    }

    async fn chain_index(store: &InMemoryObjectStore) -> std::collections::BTreeMap<String, Oid> {
        let mut builder = BitmapIndexBuilder::new();
        builder.add_edge(&oid('a'), &oid('b'));
        builder.add_edge(&oid('b'), &oid('c'));
        builder.add_edge(&oid('b'), &oid('d'));
        builder.write_all(store, None).await.unwrap()
    }

    #[tokio::test]
    async fn bfs_forward_visits_in_breadth_first_order() {
        let store = InMemoryObjectStore::new();
        let entries = chain_index(&store).await;
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Strict, 16).await.unwrap();
        let traversal = DagTraversal::new(&reader, 1000);

        let visits = traversal.bfs(&oid('a'), Direction::Forward, &TraversalLimits::default()).await.unwrap();
        let shas: Vec<_> = visits.iter().map(|v| v.sha.clone()).collect();
        assert_eq!(shas[0], oid('a'));
        assert_eq!(shas[1], oid('b'));
        assert_eq!(visits.len(), 4);
    }

    #[tokio::test]
    async fn max_depth_limits_traversal() {
        let store = InMemoryObjectStore::new();
        let entries = chain_index(&store).await;
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Strict, 16).await.unwrap();
        let traversal = DagTraversal::new(&reader, 1000);

        let limits = TraversalLimits { max_nodes: None, max_depth: Some(1) };
        let visits = traversal.bfs(&oid('a'), Direction::Forward, &limits).await.unwrap();
        assert_eq!(visits.len(), 2);
    }

    #[tokio::test]
    async fn is_reachable_finds_descendant() {
        let store = InMemoryObjectStore::new();
        let entries = chain_index(&store).await;
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Strict, 16).await.unwrap();
        let traversal = DagTraversal::new(&reader, 1000);

        assert!(traversal.is_reachable(&oid('a'), &oid('d'), Direction::Forward).await.unwrap());
        assert!(!traversal.is_reachable(&oid('c'), &oid('d'), Direction::Forward).await.unwrap());
    }

    #[tokio::test]
    async fn ancestors_alias_follows_reverse_direction() {
        let store = InMemoryObjectStore::new();
        let entries = chain_index(&store).await;
        let reader = BitmapIndexReader::open(&store, entries, IntegrityPolicy::Strict, 16).await.unwrap();
        let traversal = DagTraversal::new(&reader, 1000);

        let visits = traversal.ancestors(&oid('c'), &TraversalLimits::default()).await.unwrap();
        let shas: BTreeSet<_> = visits.iter().map(|v| v.sha.clone()).collect();
        assert!(shas.contains(&oid('b')));
        assert!(shas.contains(&oid('a')));
    }
}
