//! `analyze` — generate the incident narrative via the analysis
//! provider.
//!
//! One awaited call for lifecycle purposes; transient provider failures
//! are retried by the executor per this stage's policy, invisibly to
//! the job's event stream.

use async_trait::async_trait;
use triage_core::prompt::{build_analysis_prompt, AnalysisContext};

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

/// Upper bound on the redacted-context excerpt sent with the prompt.
const MAX_CONTEXT_BYTES: usize = 8192;

pub struct Analyze;

#[async_trait]
impl StageHandler for Analyze {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let incidents = ctx
            .artifacts
            .incidents
            .as_deref()
            .ok_or_else(|| StageError::Permanent("correlate output missing".to_string()))?;
        let signatures = ctx
            .artifacts
            .signatures
            .as_deref()
            .ok_or_else(|| StageError::Permanent("correlate output missing".to_string()))?;
        let redacted = ctx
            .artifacts
            .redacted_text
            .as_deref()
            .ok_or_else(|| StageError::Permanent("redact output missing".to_string()))?;

        let prompt = build_analysis_prompt(&AnalysisContext {
            format: ctx.artifacts.format.as_deref().unwrap_or("text"),
            line_count: ctx.artifacts.line_count.unwrap_or(0),
            items_redacted: ctx.artifacts.items_redacted.unwrap_or(0),
            incidents,
            signatures,
        });

        // Redacted excerpt only; the raw upload never reaches the provider.
        let context = truncate_on_char_boundary(redacted, MAX_CONTEXT_BYTES);

        let narrative = ctx.providers.analyst.complete(&prompt, context).await?;
        if narrative.trim().is_empty() {
            return Err(StageError::Permanent(
                "analysis provider returned an empty narrative".to_string(),
            ));
        }

        let detail = serde_json::json!({
            "narrative_chars": narrative.len(),
            "provider": ctx.job.provider,
            "model": ctx.job.model,
        });
        let summary = "Generated incident narrative".to_string();
        ctx.artifacts.narrative = Some(narrative);

        Ok(StageOutcome { summary, detail })
    }
}

fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
