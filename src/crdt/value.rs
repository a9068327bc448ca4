//! Property value representation.

use serde::{Deserialize, Serialize};

use crate::model::Oid;

/// A value stored in a node or edge property.
///
/// Mirrors the common typed-property-value shape (bool/int/float/string/
/// bytes) with one addition: [`PropValue::BlobRef`], used by the `BlobValue`
/// op to point at a payload stored as a blob in the object store rather
/// than inlined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Arbitrary inline bytes.
    Bytes(Vec<u8>),
    /// Reference to a blob stored out-of-line in the object store.
    BlobRef(Oid),
}
