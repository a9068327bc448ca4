//! Invariant 3 — for any builder output, `checksum(canonical-stringify(
//! envelope.data)) == envelope.checksum`.

use std::collections::BTreeMap;

use proptest::prelude::*;

use eventgraph::bitmap::envelope::Envelope;
use eventgraph::bitmap::VERSION_CANONICAL;
use eventgraph::canonical::{sha256_hex, to_canonical_json};

proptest! {
    #[test]
    fn checksum_matches_canonical_stringify_of_data(
        entries in proptest::collection::btree_map(any::<String>(), any::<u32>(), 0..12)
    ) {
        let data: BTreeMap<String, u32> = entries;
        let envelope = Envelope::new(VERSION_CANONICAL, data.clone()).unwrap();
        prop_assert_eq!(envelope.checksum.clone(), sha256_hex(&to_canonical_json(&data).unwrap()));
        prop_assert!(envelope.verify().is_ok());
    }
}
