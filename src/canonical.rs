//! Canonical JSON stringification and checksums shared by the checkpoint
//! and bitmap index layers.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{EventgraphError, Result};

/// Serializes `value` to JSON, then canonicalizes it (object keys sorted
/// recursively, independent of field declaration order) and returns the
/// resulting bytes. Two values that differ only in map insertion order
/// produce identical output.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_value(value)
        .map_err(|e| EventgraphError::corruption("<canonical-json>", e.to_string()))?;
    Ok(canonicalize(&json).into_bytes())
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap(),
    }
}

/// sha256 hex digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
