//! Commit message trailers.
//!
//! Every commit-like object this crate writes carries a one-line title
//! followed by a blank line and a block of `key: value` trailers, in the
//! style of a human VCS commit message. Modeled as a tagged sum type
//! rather than a loosely-typed map, matching `sombra::error`'s enum-of-
//! reasons style for closed, exhaustively-matched variants.

use crate::error::{EventgraphError, Result};
use crate::model::Oid;

/// The decoded form of a commit message's trailer block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// A patch object appended to a writer's chain.
    Patch {
        /// Graph this patch belongs to.
        graph: String,
        /// Patch schema version.
        schema: u32,
    },
    /// A checkpoint object.
    Checkpoint {
        /// Graph this checkpoint belongs to.
        graph: String,
        /// Checkpoint envelope schema version (2 or 3).
        schema: u32,
        /// Hex digest of the visible projection at checkpoint time.
        state_hash: String,
        /// OID of the `frontier.cbor` blob.
        frontier_oid: Oid,
        /// OID of the bitmap index tree built against this checkpoint, if
        /// one was built alongside it.
        index_oid: Option<Oid>,
    },
    /// An anchor synthesized purely to keep divergent tips reachable.
    Anchor {
        /// Graph this anchor belongs to.
        graph: String,
        /// Schema version carried for consistency with the other kinds.
        schema: u32,
    },
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::Patch { .. } => "patch",
            Message::Checkpoint { .. } => "checkpoint",
            Message::Anchor { .. } => "anchor",
        }
    }

    /// Formats `self` as a full commit message: `title`, a blank line, then
    /// the trailer block.
    pub fn format(&self, title: &str) -> String {
        let mut lines = vec![format!("eg-kind: {}", self.kind())];
        match self {
            Message::Patch { graph, schema } => {
                lines.push(format!("eg-graph: {graph}"));
                lines.push(format!("eg-schema: {schema}"));
            }
            Message::Checkpoint {
                graph,
                schema,
                state_hash,
                frontier_oid,
                index_oid,
            } => {
                lines.push(format!("eg-graph: {graph}"));
                lines.push(format!("eg-schema: {schema}"));
                lines.push(format!("eg-state-hash: {state_hash}"));
                lines.push(format!("eg-frontier-oid: {frontier_oid}"));
                if let Some(index_oid) = index_oid {
                    lines.push(format!("eg-index-oid: {index_oid}"));
                }
            }
            Message::Anchor { graph, schema } => {
                lines.push(format!("eg-graph: {graph}"));
                lines.push(format!("eg-schema: {schema}"));
            }
        }
        format!("{title}\n\n{}\n", lines.join("\n"))
    }

    /// Parses the trailer block out of a full commit message.
    pub fn parse(text: &str) -> Result<Message> {
        let trailer_block = text
            .split_once("\n\n")
            .map(|(_, rest)| rest)
            .unwrap_or(text);

        let mut fields = std::collections::BTreeMap::new();
        for line in trailer_block.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| EventgraphError::corruption("<message>", format!("malformed trailer line: {line:?}")))?;
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }

        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| EventgraphError::corruption("<message>", format!("missing trailer: {name}")))
        };
        let schema = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| EventgraphError::corruption("<message>", format!("malformed eg-schema: {s}")))
        };

        match field("eg-kind")?.as_str() {
            "patch" => Ok(Message::Patch {
                graph: field("eg-graph")?,
                schema: schema(&field("eg-schema")?)?,
            }),
            "checkpoint" => Ok(Message::Checkpoint {
                graph: field("eg-graph")?,
                schema: schema(&field("eg-schema")?)?,
                state_hash: field("eg-state-hash")?,
                frontier_oid: Oid::parse(field("eg-frontier-oid")?)?,
                index_oid: fields.get("eg-index-oid").map(|s| Oid::parse(s.clone())).transpose()?,
            }),
            "anchor" => Ok(Message::Anchor {
                graph: field("eg-graph")?,
                schema: schema(&field("eg-schema")?)?,
            }),
            other => Err(EventgraphError::corruption("<message>", format!("unknown eg-kind: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: char) -> Oid {
        Oid::new_unchecked(byte.to_string().repeat(40))
    }

    #[test]
    fn checkpoint_message_round_trips() {
        let msg = Message::Checkpoint {
            graph: "social".to_string(),
            schema: 3,
            state_hash: "abc123".to_string(),
            frontier_oid: oid('a'),
            index_oid: Some(oid('b')),
        };
        let text = msg.format("checkpoint: social");
        let parsed = Message::parse(&text).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn anchor_message_round_trips_without_index_oid() {
        let msg = Message::Anchor {
            graph: "social".to_string(),
            schema: 1,
        };
        let text = msg.format("anchor");
        assert_eq!(Message::parse(&text).unwrap(), msg);
    }

    #[test]
    fn rejects_unknown_kind() {
        let text = "title\n\neg-kind: bogus\neg-graph: x\neg-schema: 1\n";
        assert!(Message::parse(text).is_err());
    }
}
