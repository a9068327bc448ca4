//! Core value types shared across the engine: object ids, event identity,
//! version vectors, key encodings, and the writer frontier.

mod dot;
mod frontier;
mod keys;
mod oid;

pub use dot::{Dot, EventId, VersionVector, VvOrdering};
pub use frontier::Frontier;
pub use keys::{EdgeKey, PropKey, PropKeyTarget};
pub use oid::{Oid, OID_HEX_LEN};
