//! Invariant 1 — reducing any patch set through the single global
//! `(lamport, writerId, patchSha, opIndex)` linearization is independent
//! of the order patches were handed to the folder: shuffle the input,
//! re-sort by the canonical key before folding, and the resulting
//! visible projection must be identical either way.

use proptest::prelude::*;

use eventgraph::checkpoint::compute_visible_projection;
use eventgraph::crdt::{JoinReducer, Op, Patch, ReceiptMode, WarpState};
use eventgraph::model::{Frontier, Oid};

#[derive(Clone, Debug)]
struct Entry {
    writer: String,
    lamport: u64,
    oid: Oid,
    node: String,
}

fn fold_sorted(entries: &[Entry]) -> WarpState {
    let mut ordered = entries.to_vec();
    ordered.sort_by(|a, b| (a.lamport, &a.writer, a.oid.as_str()).cmp(&(b.lamport, &b.writer, b.oid.as_str())));

    let mut state = WarpState::new();
    for entry in &ordered {
        let patch = Patch::new(
            entry.writer.clone(),
            entry.lamport,
            Frontier::new(),
            vec![Op::NodeAdd { node_id: entry.node.clone() }],
        );
        JoinReducer::apply_patch(&mut state, &entry.oid, &patch, ReceiptMode::Silent).unwrap();
    }
    state
}

fn entries_strategy() -> impl Strategy<Value = Vec<Entry>> {
    proptest::collection::vec((1u64..50, 0u8..4u8), 1..20).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (lamport, writer_tag))| Entry {
                writer: format!("writer-{writer_tag}"),
                lamport,
                oid: Oid::new_unchecked(format!("{:040x}", i)),
                node: format!("node-{i}"),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn shuffled_arrival_order_yields_identical_projection(entries in entries_strategy()) {
        let canonical = fold_sorted(&entries);

        let mut shuffled = entries.clone();
        shuffled.reverse();
        if shuffled.len() > 1 {
            shuffled.rotate_left(1);
        }
        let reshuffled_then_sorted = fold_sorted(&shuffled);

        prop_assert_eq!(
            compute_visible_projection(&canonical),
            compute_visible_projection(&reshuffled_then_sorted)
        );
    }
}
