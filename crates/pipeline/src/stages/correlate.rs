//! `correlate` — group chunks into incident clusters and count error
//! signatures.

use async_trait::async_trait;
use triage_core::correlation::{cluster_chunks, error_signatures, DEFAULT_SIMILARITY_THRESHOLD};

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

pub struct Correlate;

#[async_trait]
impl StageHandler for Correlate {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let chunks = ctx
            .artifacts
            .chunks
            .as_ref()
            .ok_or_else(|| StageError::Permanent("chunk output missing".to_string()))?;
        let embeddings = ctx
            .artifacts
            .embeddings
            .as_ref()
            .ok_or_else(|| StageError::Permanent("embed output missing".to_string()))?;
        let redacted = ctx
            .artifacts
            .redacted_text
            .as_deref()
            .ok_or_else(|| StageError::Permanent("redact output missing".to_string()))?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let incidents = cluster_chunks(&texts, embeddings, DEFAULT_SIMILARITY_THRESHOLD);
        let signatures = error_signatures(redacted);

        let detail = serde_json::json!({
            "incidents": incidents.len(),
            "error_signatures": signatures.len(),
        });
        let summary = format!(
            "Correlated {} chunk(s) into {} incident(s), {} error signature(s)",
            texts.len(),
            incidents.len(),
            signatures.len()
        );

        ctx.artifacts.incidents = Some(incidents);
        ctx.artifacts.signatures = Some(signatures);

        Ok(StageOutcome { summary, detail })
    }
}
