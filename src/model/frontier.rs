//! Per-writer tip map, canonically serializable as CBOR or JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EventgraphError, Result};
use crate::model::Oid;

const FRONTIER_ENVELOPE_VERSION: u32 = 1;

/// `writerId -> tip object hash`, the local view of how far each writer's
/// patch chain has been observed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Frontier(BTreeMap<String, Oid>);

/// On-the-wire envelope around a [`Frontier`]: `{ version, writerCount,
/// frontier }`, with `frontier` serialized as a sorted-key object.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct FrontierEnvelope {
    version: u32,
    #[serde(rename = "writerCount")]
    writer_count: usize,
    frontier: BTreeMap<String, String>,
}

impl Frontier {
    /// An empty frontier.
    pub fn new() -> Self {
        Frontier(BTreeMap::new())
    }

    /// The tip recorded for `writer`, if any.
    pub fn get(&self, writer: &str) -> Option<&Oid> {
        self.0.get(writer)
    }

    /// Records `writer`'s tip as `oid`.
    pub fn set(&mut self, writer: impl Into<String>, oid: Oid) {
        self.0.insert(writer.into(), oid);
    }

    /// Iterates `(writerId, tip)` pairs in sorted writer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Oid)> {
        self.0.iter().map(|(w, o)| (w.as_str(), o))
    }

    /// Number of writers tracked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no writer is tracked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Writers present in `self` but absent or at a different tip in
    /// `other`. Used by the staleness checker.
    pub fn advanced_writers(&self, other: &Frontier) -> Vec<String> {
        self.0
            .iter()
            .filter(|(w, tip)| other.get(w) != Some(tip))
            .map(|(w, _)| w.clone())
            .collect()
    }

    fn to_envelope(&self) -> FrontierEnvelope {
        FrontierEnvelope {
            version: FRONTIER_ENVELOPE_VERSION,
            writer_count: self.0.len(),
            frontier: self
                .0
                .iter()
                .map(|(w, o)| (w.clone(), o.as_str().to_string()))
                .collect(),
        }
    }

    fn from_envelope(env: FrontierEnvelope) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (writer, oid) in env.frontier {
            map.insert(writer, Oid::parse(oid)?);
        }
        Ok(Frontier(map))
    }

    /// Encodes this frontier as the CBOR envelope described in the spec.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(&self.to_envelope(), &mut buf)
            .map_err(|e| EventgraphError::corruption("frontier.cbor", e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a frontier from its CBOR envelope.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let env: FrontierEnvelope = ciborium::from_reader(bytes)
            .map_err(|e| EventgraphError::corruption("frontier.cbor", e.to_string()))?;
        Frontier::from_envelope(env)
    }

    /// Encodes this frontier as the JSON envelope described in the spec.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.to_envelope())
            .map_err(|e| EventgraphError::corruption("frontier.json", e.to_string()))
    }

    /// Decodes a frontier from its JSON envelope.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let env: FrontierEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| EventgraphError::corruption("frontier.json", e.to_string()))?;
        Frontier::from_envelope(env)
    }
}

impl FromIterator<(String, Oid)> for Frontier {
    fn from_iter<I: IntoIterator<Item = (String, Oid)>>(iter: I) -> Self {
        Frontier(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: char) -> Oid {
        Oid::new_unchecked(byte.to_string().repeat(40))
    }

    #[test]
    fn cbor_round_trip() {
        let mut f = Frontier::new();
        f.set("alice", oid('a'));
        f.set("bob", oid('b'));
        let bytes = f.to_cbor().unwrap();
        let back = Frontier::from_cbor(&bytes).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn json_round_trip() {
        let mut f = Frontier::new();
        f.set("alice", oid('a'));
        let bytes = f.to_json().unwrap();
        let back = Frontier::from_json(&bytes).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn advanced_writers_detects_divergence() {
        let mut old = Frontier::new();
        old.set("alice", oid('a'));
        let mut new = Frontier::new();
        new.set("alice", oid('b'));
        assert_eq!(new.advanced_writers(&old), vec!["alice".to_string()]);
        assert!(old.advanced_writers(&new).contains(&"alice".to_string()));
    }
}
