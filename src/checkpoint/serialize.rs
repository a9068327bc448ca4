//! Full-state and visible-projection encoders.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::canonical::{sha256_hex, to_canonical_json};
use crate::crdt::{Lww, OrSet, PropTarget, PropValue, WarpState};
use crate::error::{EventgraphError, Result};
use crate::model::{EdgeKey, EventId, Oid, PropKey, PropKeyTarget, VersionVector};

/// Version tag carried by every serialized full state.
pub const FULL_STATE_VERSION: &str = "full-v5";

#[derive(Clone, Debug)]
struct LegacyTolerantEventId(EventId);

impl Serialize for LegacyTolerantEventId {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for LegacyTolerantEventId {
    /// Tolerates the legacy bare-lamport encoding of an edge-birth event
    /// (a plain integer) alongside the normal `EventId` map, synthesizing
    /// the sentinel writer/patch-sha pair for the former.
    fn deserialize<D>(d: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = LegacyTolerantEventId;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an EventId object or a legacy bare-lamport integer")
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(LegacyTolerantEventId(EventId {
                    lamport: v,
                    writer_id: EventId::LEGACY_SENTINEL_WRITER.to_string(),
                    patch_sha: Oid::new_unchecked(EventId::LEGACY_SENTINEL_PATCH_SHA),
                    op_index: 0,
                }))
            }

            fn visit_map<A>(self, map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let event_id = EventId::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(LegacyTolerantEventId(event_id))
            }
        }
        d.deserialize_any(V)
    }
}

#[derive(Serialize, Deserialize)]
struct FullStateWire {
    version: String,
    node_alive: OrSet<String>,
    edge_alive: OrSet<EdgeKey>,
    prop: BTreeMap<PropKey, Lww<PropValue>>,
    observed_frontier: VersionVector,
    edge_birth_event: BTreeMap<EdgeKey, LegacyTolerantEventId>,
}

/// Encodes `state` as the CBOR full-state blob (`state.cbor`).
pub fn serialize_full_state(state: &WarpState) -> Result<Vec<u8>> {
    let wire = FullStateWire {
        version: FULL_STATE_VERSION.to_string(),
        node_alive: state.node_alive.clone(),
        edge_alive: state.edge_alive.clone(),
        prop: state.prop.clone(),
        observed_frontier: state.observed_frontier.clone(),
        edge_birth_event: state
            .edge_birth_event
            .iter()
            .map(|(k, v)| (k.clone(), LegacyTolerantEventId(v.clone())))
            .collect(),
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&wire, &mut buf)
        .map_err(|e| EventgraphError::corruption("state.cbor", e.to_string()))?;
    Ok(buf)
}

/// Decodes `state.cbor` into a [`WarpState`]. Tolerates missing optional
/// fields and the legacy bare-lamport edge-birth encoding.
pub fn deserialize_full_state(bytes: &[u8]) -> Result<WarpState> {
    let wire: FullStateWire = ciborium::from_reader(bytes)
        .map_err(|e| EventgraphError::corruption("state.cbor", e.to_string()))?;
    if wire.version != FULL_STATE_VERSION {
        return Err(EventgraphError::Invariant(format!(
            "unsupported full-state version: {}",
            wire.version
        )));
    }
    Ok(WarpState {
        node_alive: wire.node_alive,
        edge_alive: wire.edge_alive,
        prop: wire.prop,
        observed_frontier: wire.observed_frontier,
        edge_birth_event: wire
            .edge_birth_event
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect(),
    })
}

/// A property entry in a [`VisibleProjection`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibleProp {
    /// The node or edge this property annotates.
    pub target: PropTarget,
    /// Property name.
    pub key: String,
    /// Current value.
    pub value: PropValue,
}

/// The derived, queryable view of a [`WarpState`]: visible nodes, visible
/// edges, and visible properties. Cacheable, never authoritative for
/// resume — `state.cbor`, not this, is what a checkpoint reloads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleProjection {
    /// Visible node ids, sorted.
    pub nodes: Vec<String>,
    /// Visible `(from, to, label)` edges, sorted.
    pub edges: Vec<(String, String, String)>,
    /// Visible properties, sorted by `(target, key)`.
    pub props: Vec<VisibleProp>,
}

/// Derives the visible projection of `state`: live nodes, edges whose
/// endpoints are both live, and properties whose target is currently
/// visible.
pub fn compute_visible_projection(state: &WarpState) -> VisibleProjection {
    let nodes: Vec<String> = state.node_alive.visible_elements().cloned().collect();

    let edges: Vec<(String, String, String)> = state
        .edge_alive
        .visible_elements()
        .filter(|key| state.edge_visible(key))
        .filter_map(|key| key.parts())
        .collect();

    let mut props: Vec<VisibleProp> = Vec::new();
    for (prop_key, lww) in &state.prop {
        let Some((target, key)) = prop_key.decode() else {
            continue;
        };
        let visible = match &target {
            crate::model::PropKeyTarget::Node { node_id } => state.node_alive.is_visible(node_id),
            crate::model::PropKeyTarget::Edge { from, to, label } => {
                state.edge_visible(&EdgeKey::new(from, to, label))
            }
        };
        if !visible {
            continue;
        }
        let target = match target {
            crate::model::PropKeyTarget::Node { node_id } => PropTarget::Node { node_id },
            crate::model::PropKeyTarget::Edge { from, to, label } => PropTarget::Edge { from, to, label },
        };
        props.push(VisibleProp {
            target,
            key,
            value: lww.value().clone(),
        });
    }

    VisibleProjection { nodes, edges, props }
}

/// Hex digest identifying a checkpoint's visible projection, carried as
/// the `eg-state-hash` trailer.
pub fn compute_state_hash(projection: &VisibleProjection) -> Result<String> {
    Ok(sha256_hex(&to_canonical_json(projection)?))
}
