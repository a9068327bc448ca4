//! Canonical encodings for edge keys and property keys.
//!
//! Namespaces are kept disjoint with a reserved separator byte (`0x00`) and
//! a prefix byte (`0x01`) on edge-property keys, so a node-property key can
//! never collide with an edge-property key even if the underlying strings
//! happen to share a prefix.

use serde::{Deserialize, Serialize};

const SEPARATOR: u8 = 0x00;
const EDGE_PROP_PREFIX: u8 = 0x01;

/// Canonical key for a directed, labeled edge: `from \0 to \0 label`.
///
/// Used as the element type of the `edgeAlive` OR-Set.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeKey(Vec<u8>);

impl EdgeKey {
    /// Builds the canonical key for `(from, to, label)`.
    pub fn new(from: &str, to: &str, label: &str) -> Self {
        let mut buf = Vec::with_capacity(from.len() + to.len() + label.len() + 2);
        buf.extend_from_slice(from.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(to.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(label.as_bytes());
        EdgeKey(buf)
    }

    /// Splits the key back into `(from, to, label)`. Returns `None` if the
    /// bytes are not valid UTF-8 or do not contain exactly two separators.
    pub fn parts(&self) -> Option<(String, String, String)> {
        let mut pieces = self.0.splitn(3, |&b| b == SEPARATOR);
        let from = pieces.next()?;
        let to = pieces.next()?;
        let label = pieces.next()?;
        if pieces.next().is_some() {
            return None;
        }
        Some((
            String::from_utf8(from.to_vec()).ok()?,
            String::from_utf8(to.to_vec()).ok()?,
            String::from_utf8(label.to_vec()).ok()?,
        ))
    }

    /// Raw canonical bytes, for use as a map key or set element.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Canonical key for a node or edge property: `nodeId \0 propKey` for node
/// properties, or the edge-property-prefixed variant below for edges.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropKey(Vec<u8>);

impl PropKey {
    /// Builds a node-property key: `(nodeId, propKey)`.
    pub fn node(node_id: &str, prop_key: &str) -> Self {
        let mut buf = Vec::with_capacity(node_id.len() + prop_key.len() + 1);
        buf.extend_from_slice(node_id.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(prop_key.as_bytes());
        PropKey(buf)
    }

    /// Builds an edge-property key: `(from, to, label, propKey)`, tagged
    /// with the reserved edge-property prefix byte so it can never collide
    /// with a node-property key.
    pub fn edge(from: &str, to: &str, label: &str, prop_key: &str) -> Self {
        let mut buf = Vec::with_capacity(from.len() + to.len() + label.len() + prop_key.len() + 4);
        buf.push(EDGE_PROP_PREFIX);
        buf.extend_from_slice(from.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(to.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(label.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(prop_key.as_bytes());
        PropKey(buf)
    }

    /// True if this key was built by [`Self::edge`].
    pub fn is_edge_prop(&self) -> bool {
        self.0.first() == Some(&EDGE_PROP_PREFIX)
    }

    /// Raw canonical bytes, for use as a map key or set element.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Splits the key back into the entity it annotates and the property
    /// name. Returns `None` if the bytes are not valid UTF-8 or do not
    /// contain the expected number of separators.
    pub fn decode(&self) -> Option<(PropKeyTarget, String)> {
        if self.is_edge_prop() {
            let mut pieces = self.0[1..].splitn(4, |&b| b == SEPARATOR);
            let from = pieces.next()?;
            let to = pieces.next()?;
            let label = pieces.next()?;
            let key = pieces.next()?;
            if pieces.next().is_some() {
                return None;
            }
            Some((
                PropKeyTarget::Edge {
                    from: String::from_utf8(from.to_vec()).ok()?,
                    to: String::from_utf8(to.to_vec()).ok()?,
                    label: String::from_utf8(label.to_vec()).ok()?,
                },
                String::from_utf8(key.to_vec()).ok()?,
            ))
        } else {
            let mut pieces = self.0.splitn(2, |&b| b == SEPARATOR);
            let node_id = pieces.next()?;
            let key = pieces.next()?;
            if pieces.next().is_some() {
                return None;
            }
            Some((
                PropKeyTarget::Node {
                    node_id: String::from_utf8(node_id.to_vec()).ok()?,
                },
                String::from_utf8(key.to_vec()).ok()?,
            ))
        }
    }
}

/// The entity a [`PropKey`] annotates, as recovered by [`PropKey::decode`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropKeyTarget {
    /// A node property.
    Node {
        /// The annotated node.
        node_id: String,
    },
    /// An edge property.
    Edge {
        /// Source node of the edge.
        from: String,
        /// Destination node of the edge.
        to: String,
        /// Edge label.
        label: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_key_round_trips() {
        let key = EdgeKey::new("a", "b", "knows");
        assert_eq!(
            key.parts(),
            Some(("a".to_string(), "b".to_string(), "knows".to_string()))
        );
    }

    #[test]
    fn prop_key_decode_round_trips() {
        let node_key = PropKey::node("a", "name");
        assert_eq!(
            node_key.decode(),
            Some((PropKeyTarget::Node { node_id: "a".to_string() }, "name".to_string()))
        );

        let edge_key = PropKey::edge("a", "b", "knows", "weight");
        assert_eq!(
            edge_key.decode(),
            Some((
                PropKeyTarget::Edge {
                    from: "a".to_string(),
                    to: "b".to_string(),
                    label: "knows".to_string()
                },
                "weight".to_string()
            ))
        );
    }

    #[test]
    fn node_and_edge_prop_keys_never_collide() {
        // Even if the raw strings superficially overlap, the edge-prop
        // prefix byte guarantees distinct byte sequences.
        let node_key = PropKey::node("x", "y\0z:w");
        let edge_key = PropKey::edge("x", "y", "z", "w");
        assert_ne!(node_key.as_bytes(), edge_key.as_bytes());
        assert!(!node_key.is_edge_prop());
        assert!(edge_key.is_edge_prop());
    }
}
