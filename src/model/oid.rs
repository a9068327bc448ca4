//! Content-addressed object identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EventgraphError, Result};

/// Number of hex characters in a valid [`Oid`].
pub const OID_HEX_LEN: usize = 40;

/// Opaque content identifier for an object in the backing store.
///
/// Equality is byte equality on the canonical lowercase hex string; the
/// engine never interprets the bytes an OID encodes.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// Wraps a string that is already known to be a valid OID, without
    /// re-validating it. Used internally where the value was just produced
    /// by a hash function.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Oid(s.into())
    }

    /// Parses and validates a 40-hex-character object id.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.len() != OID_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EventgraphError::validation(format!(
                "invalid object id: {s:?}"
            )));
        }
        Ok(Oid(s.to_ascii_lowercase()))
    }

    /// Returns the underlying hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first two hex characters, used as the bitmap index shard prefix.
    pub fn shard_prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Oid {
    type Err = EventgraphError;

    fn from_str(s: &str) -> Result<Self> {
        Oid::parse(s)
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
