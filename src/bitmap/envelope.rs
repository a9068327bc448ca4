//! The `{ version, checksum, data }` wrapper every shard is written in,
//! plus the two canonicalizers a shard's version selects between.
//!
//! Versions are a closed, version-gated contract, not an implementation
//! detail: the in-memory builder always writes version 2 (canonical JSON
//! checksum); the streaming builder's per-flush chunks always write
//! version 1 (non-canonical `serde_json` checksum). The reader picks the
//! matching canonicalizer by `envelope.version` rather than guessing.

use serde::{Deserialize, Serialize};

use crate::canonical::{sha256_hex, to_canonical_json};
use crate::error::{EventgraphError, Result};

/// Canonical JSON checksum, used by the in-memory builder and by meta
/// shards regardless of which builder wrote them.
pub const VERSION_CANONICAL: u32 = 2;
/// Non-canonical (`serde_json` declared-field-order) checksum, used by the
/// streaming builder's bitmap-shard chunks.
pub const VERSION_NON_CANONICAL: u32 = 1;

/// `nodeOid -> compact numeric id`.
pub type MetaData = std::collections::BTreeMap<String, u32>;
/// `nodeOid -> base64(Roaring bitmap)`.
pub type ShardData = std::collections::BTreeMap<String, String>;

/// `{ version, checksum, data }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Selects the checksum canonicalizer.
    pub version: u32,
    /// `sha256hex(canonicalizer(data))`.
    pub checksum: String,
    /// The payload.
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    /// Builds an envelope around `data`, computing `checksum` with the
    /// canonicalizer `version` selects.
    pub fn new(version: u32, data: T) -> Result<Self> {
        let checksum = checksum_for_version(version, &data)?;
        Ok(Envelope { version, checksum, data })
    }

    /// Recomputes the checksum with the canonicalizer `self.version`
    /// selects and compares it against `self.checksum`.
    pub fn verify(&self) -> Result<()> {
        if !matches!(self.version, VERSION_NON_CANONICAL | VERSION_CANONICAL) {
            return Err(EventgraphError::Validation {
                message: format!("unsupported shard envelope version: {}", self.version),
                path: None,
                oid: None,
            });
        }
        let expected = checksum_for_version(self.version, &self.data)?;
        if expected != self.checksum {
            return Err(EventgraphError::Validation {
                message: "shard checksum mismatch".to_string(),
                path: None,
                oid: None,
            });
        }
        Ok(())
    }
}

/// `serde_json`'s default stringify: declared/insertion field order, no
/// recursive key sorting. Version 1's canonicalizer.
pub fn non_canonical_stringify<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(data).map_err(|e| EventgraphError::corruption("<envelope>", e.to_string()))
}

fn checksum_for_version<T: Serialize>(version: u32, data: &T) -> Result<String> {
    let bytes = if version == VERSION_NON_CANONICAL {
        non_canonical_stringify(data)?
    } else {
        to_canonical_json(data)?
    };
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn canonical_envelope_verifies() {
        let mut data = BTreeMap::new();
        data.insert("b".to_string(), 2u32);
        data.insert("a".to_string(), 1u32);
        let envelope = Envelope::new(VERSION_CANONICAL, data).unwrap();
        envelope.verify().unwrap();
    }

    #[test]
    fn tampered_checksum_fails_verification() {
        let data: BTreeMap<String, u32> = [("a".to_string(), 1u32)].into_iter().collect();
        let mut envelope = Envelope::new(VERSION_CANONICAL, data).unwrap();
        envelope.checksum = "0".repeat(64);
        assert!(envelope.verify().is_err());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let data: BTreeMap<String, u32> = BTreeMap::new();
        let mut envelope = Envelope::new(VERSION_CANONICAL, data).unwrap();
        envelope.version = 99;
        assert!(envelope.verify().is_err());
    }
}
