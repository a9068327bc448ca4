//! The bitmap index: content-addressed, prefix-sharded forward/reverse
//! adjacency over the object store's commit graph, with an in-memory and
//! a memory-bounded streaming builder, a lazy LRU-cached reader, a
//! staleness detector, and the rebuild orchestrator tying them together.

pub mod builder;
pub mod envelope;
pub mod reader;
pub mod rebuild;
pub mod staleness;
pub mod streaming;

pub use builder::BitmapIndexBuilder;
pub use envelope::{Envelope, MetaData, ShardData, VERSION_CANONICAL, VERSION_NON_CANONICAL};
pub use reader::BitmapIndexReader;
pub use rebuild::IndexRebuildService;
pub use staleness::{IndexStalenessChecker, Staleness};
pub use streaming::StreamingBitmapIndexBuilder;
