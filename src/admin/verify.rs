//! `admin::verify::verify`: checks the invariants that durability and
//! integrity depend on without requiring a healthy graph to already be
//! loaded.
//!
//! Grounded on `sombra::admin::verify::verify`
//! (`examples/maskdotdev-sombra/src/admin/verify.rs`): a level-gated scan
//! producing a flat `Vec<VerifyFinding>` plus a `success` summary flag.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::bitmap::Envelope;
use crate::checkpoint::{
    compute_state_hash, compute_visible_projection, deserialize_full_state, CheckpointService, VisibleProjection,
};
use crate::error::Result;
use crate::model::Oid;
use crate::storage_port::ObjectStore;

/// Depth of verification to perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Checkpoint presence and the state/visible-projection equality
    /// invariant only.
    Fast,
    /// As `Fast`, plus re-verifying every bitmap shard's envelope
    /// checksum.
    Deep,
}

/// Severity of a single verification finding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational, not a problem.
    Info,
    /// Worth investigating but not necessarily data loss.
    Warning,
    /// Confirmed corruption or invariant violation.
    Error,
}

/// One issue (or informational note) surfaced by verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// How serious this finding is.
    pub severity: VerifySeverity,
    /// Human-readable description.
    pub message: String,
}

impl VerifyFinding {
    fn info(message: impl Into<String>) -> Self {
        VerifyFinding { severity: VerifySeverity::Info, message: message.into() }
    }

    fn error(message: impl Into<String>) -> Self {
        VerifyFinding { severity: VerifySeverity::Error, message: message.into() }
    }
}

/// Full verification report.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The level that was run.
    pub level: VerifyLevel,
    /// True iff no `Error`-severity finding was recorded.
    pub success: bool,
    /// Every finding recorded, in the order checks ran.
    pub findings: Vec<VerifyFinding>,
}

/// Verifies `graph`'s checkpoint (if any) and, at [`VerifyLevel::Deep`],
/// every bitmap shard in `bitmap_entries`.
pub async fn verify(
    store: &dyn ObjectStore,
    graph_root: &str,
    graph: &str,
    level: VerifyLevel,
    bitmap_entries: Option<&BTreeMap<String, Oid>>,
) -> Result<VerifyReport> {
    let mut findings = Vec::new();

    let service = CheckpointService;
    match service.load(store, graph_root, graph).await? {
        None => findings.push(VerifyFinding::info("no checkpoint has been created yet")),
        Some(loaded) => {
            findings.push(VerifyFinding::info(format!("checkpoint at {}", loaded.commit_oid)));

            let tree = store.read_tree_oids(&loaded.commit_oid).await?;

            if let Some(visible_oid) = tree.get("visible.cbor") {
                let recomputed = compute_visible_projection(&loaded.state);
                let recomputed_hash = compute_state_hash(&recomputed)?;

                let stored_bytes = store.read_blob(visible_oid).await?;
                let stored: VisibleProjection = ciborium::from_reader(stored_bytes.as_slice())
                    .map_err(|e| crate::error::EventgraphError::corruption("visible.cbor", e.to_string()))?;

                if stored != recomputed {
                    findings.push(VerifyFinding::error(
                        "state.cbor does not deterministically yield visible.cbor's projection",
                    ));
                }

                if let Some(state_oid) = tree.get("state.cbor") {
                    let state_bytes = store.read_blob(state_oid).await?;
                    let reparsed = deserialize_full_state(&state_bytes)?;
                    let reparsed_hash = compute_state_hash(&compute_visible_projection(&reparsed))?;
                    if reparsed_hash != recomputed_hash {
                        findings.push(VerifyFinding::error("state.cbor round-trip changed its state hash"));
                    }
                }
            } else {
                findings.push(VerifyFinding::error("checkpoint tree missing visible.cbor"));
            }
        }
    }

    if level == VerifyLevel::Deep {
        if let Some(entries) = bitmap_entries {
            for (path, oid) in entries {
                if !path.starts_with("meta_") && !path.starts_with("shards_") {
                    continue;
                }
                let bytes = store.read_blob(oid).await?;
                match serde_json::from_slice::<Envelope<serde_json::Value>>(&bytes) {
                    Ok(envelope) => {
                        if let Err(e) = envelope.verify() {
                            findings.push(VerifyFinding::error(format!("{path}: {e}")));
                        }
                    }
                    Err(e) => findings.push(VerifyFinding::error(format!("{path}: unparseable envelope ({e})"))),
                }
            }
        } else {
            findings.push(VerifyFinding::info("deep verification requested but no bitmap index was supplied"));
        }
    }

    let success = !findings.iter().any(|f| f.severity == VerifySeverity::Error);
    Ok(VerifyReport { level, success, findings })
}
