//! S5 — an index recorded at `{alice: X}` is reported stale once `alice`
//! advances to `Y`, naming `alice` as the diverged writer.

use eventgraph::bitmap::{IndexStalenessChecker, Staleness};
use eventgraph::model::{Frontier, Oid};

fn oid(byte: char) -> Oid {
    Oid::new_unchecked(byte.to_string().repeat(40))
}

#[test]
fn advancing_a_writer_past_the_indexed_tip_reports_stale() {
    let mut indexed = Frontier::new();
    indexed.set("alice", oid('x'));

    let mut current = Frontier::new();
    current.set("alice", oid('y'));

    match IndexStalenessChecker::check(&indexed, &current) {
        Staleness::Stale { diverged_writers } => assert_eq!(diverged_writers, vec!["alice".to_string()]),
        Staleness::Fresh => panic!("expected the index to be reported stale"),
    }
}
