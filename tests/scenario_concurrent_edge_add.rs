//! S2 — two writers submit the identical `EdgeAdd` op at the same lamport
//! time. Both dots are recorded, the edge is visible exactly once, and
//! the birth event is the lexicographically smaller `EventId`.

use eventgraph::crdt::{JoinReducer, Op, Patch, ReceiptMode};
use eventgraph::model::{Dot, EdgeKey, Frontier, Oid};

fn oid(byte: char) -> Oid {
    Oid::new_unchecked(byte.to_string().repeat(40))
}

#[test]
fn concurrent_identical_edge_add_merges_both_dots() {
    let mut state = eventgraph::crdt::WarpState::new();

    JoinReducer::apply_patch(
        &mut state,
        &oid('a'),
        &Patch::new("alice", 1, Frontier::new(), vec![Op::NodeAdd { node_id: "a".into() }]),
        ReceiptMode::Silent,
    )
    .unwrap();
    JoinReducer::apply_patch(
        &mut state,
        &oid('b'),
        &Patch::new("alice", 1, Frontier::new(), vec![Op::NodeAdd { node_id: "b".into() }]),
        ReceiptMode::Silent,
    )
    .unwrap();

    let edge_op = vec![Op::EdgeAdd { from: "a".into(), to: "b".into(), label: "knows".into() }];

    JoinReducer::apply_patch(
        &mut state,
        &oid('c'),
        &Patch::new("alice", 3, Frontier::new(), edge_op.clone()),
        ReceiptMode::Silent,
    )
    .unwrap();
    JoinReducer::apply_patch(
        &mut state,
        &oid('d'),
        &Patch::new("bob", 3, Frontier::new(), edge_op),
        ReceiptMode::Silent,
    )
    .unwrap();

    let key = EdgeKey::new("a", "b", "knows");
    let dots = state.edge_alive.dots_of(&key);
    assert!(dots.contains(&Dot::new("alice", 3)));
    assert!(dots.contains(&Dot::new("bob", 3)));

    assert!(state.edge_visible(&key));

    let birth = &state.edge_birth_event[&key];
    assert_eq!(birth.writer_id, "alice");
}
