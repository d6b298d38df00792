//! `redact` — scrub sensitive spans before anything leaves the pipeline.
//!
//! Every later stage (embedding, storage, analysis) sees only the
//! redacted text.

use async_trait::async_trait;
use triage_core::redaction;

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

pub struct Redact;

#[async_trait]
impl StageHandler for Redact {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let raw = ctx
            .artifacts
            .raw_text
            .as_deref()
            .ok_or_else(|| StageError::Permanent("classify output missing".to_string()))?;

        let outcome = redaction::redact(raw);
        let detail = serde_json::json!({
            "items_redacted": outcome.items_redacted,
            "warnings": outcome.warnings,
        });
        let summary = format!("Redacted {} sensitive item(s)", outcome.items_redacted);

        ctx.artifacts.redacted_text = Some(outcome.text);
        ctx.artifacts.items_redacted = Some(outcome.items_redacted);
        ctx.artifacts.redaction_warnings = outcome.warnings;

        Ok(StageOutcome { summary, detail })
    }
}
