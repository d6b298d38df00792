//! `report` — assemble and persist the final analysis report.
//!
//! The report JSON becomes both the `stage-completed` detail and the
//! job's terminal result; its durable copy lives in object storage.

use async_trait::async_trait;

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

/// Incident clusters included in the report body.
const MAX_REPORT_INCIDENTS: usize = 10;

pub struct Report;

#[async_trait]
impl StageHandler for Report {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let narrative = ctx
            .artifacts
            .narrative
            .as_deref()
            .ok_or_else(|| StageError::Permanent("analyze output missing".to_string()))?;
        let incidents = ctx.artifacts.incidents.as_deref().unwrap_or_default();
        let signatures = ctx.artifacts.signatures.as_deref().unwrap_or_default();

        let report = serde_json::json!({
            "job_id": ctx.job.id,
            "format": ctx.artifacts.format,
            "lines": ctx.artifacts.line_count,
            "items_redacted": ctx.artifacts.items_redacted,
            "redaction_warnings": ctx.artifacts.redaction_warnings,
            "chunks": ctx.artifacts.chunks.as_ref().map(Vec::len),
            "incidents": incidents.iter().take(MAX_REPORT_INCIDENTS).collect::<Vec<_>>(),
            "error_signatures": signatures,
            "narrative": narrative,
            "stored_refs": ctx.artifacts.stored_refs,
        });

        let bytes = serde_json::to_vec_pretty(&report)
            .map_err(|e| StageError::Permanent(format!("report serialization failed: {e}")))?;
        let report_ref = ctx.providers.storage.put(bytes).await?;

        let mut detail = report.clone();
        if let Some(object) = detail.as_object_mut() {
            object.insert(
                "report_ref".to_string(),
                serde_json::Value::String(report_ref.clone()),
            );
        }

        ctx.artifacts.report = Some(detail.clone());

        Ok(StageOutcome {
            summary: format!("Report assembled ({report_ref})"),
            detail,
        })
    }
}
