//! `admin::gc::run`: a thin, independently constructible wrapper over
//! [`crate::materialize::Graph::run_gc`]/`maybe_run_gc`, exposing the
//! policy thresholds as an ops-tool-facing report.
//!
//! Grounded on `sombra::admin::vacuum::vacuum_into`
//! (`examples/maskdotdev-sombra/src/admin/vacuum.rs`): a reclamation
//! operation reported back as counts, not just a unit result.

use serde::Serialize;

use crate::config::GcPolicy;
use crate::error::Result;
use crate::materialize::Graph;

/// Outcome of an `admin::gc::run` invocation.
#[derive(Clone, Debug, Serialize)]
pub struct GcReport {
    /// Whether compaction actually ran (policy thresholds were met, or
    /// `force` was set).
    pub ran: bool,
    /// Total dots before compaction, if it ran.
    pub dots_before: Option<usize>,
    /// Total dots after compaction, if it ran.
    pub dots_after: Option<usize>,
}

/// Runs GC against `graph`'s cached state per `policy`'s thresholds,
/// unless `force` is set, in which case compaction always runs.
pub async fn run(graph: &Graph<'_>, policy: &GcPolicy, force: bool) -> Result<GcReport> {
    let outcome = if force { Some(graph.run_gc().await?) } else { graph.maybe_run_gc_with_policy(policy).await? };

    match outcome {
        Some(o) => Ok(GcReport { ran: true, dots_before: Some(o.dots_before), dots_after: Some(o.dots_after) }),
        None => Ok(GcReport { ran: false, dots_before: None, dots_after: None }),
    }
}
