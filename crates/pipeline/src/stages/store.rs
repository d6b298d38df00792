//! `store` — persist redacted text and the chunk/embedding bundle.
//!
//! Durability of the analysis inputs is delegated to the object-storage
//! collaborator here; later stages and the final report only reference
//! the returned keys.

use async_trait::async_trait;

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

pub struct StoreArtifacts;

#[async_trait]
impl StageHandler for StoreArtifacts {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let redacted = ctx
            .artifacts
            .redacted_text
            .as_deref()
            .ok_or_else(|| StageError::Permanent("redact output missing".to_string()))?;
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

        let text_ref = ctx
            .providers
            .storage
            .put(redacted.as_bytes().to_vec())
            .await?;

        let bundle = serde_json::json!({
            "job_id": ctx.job.id,
            "chunks": chunks,
            "embeddings": embeddings,
        });
        let bundle_bytes = serde_json::to_vec(&bundle)
            .map_err(|e| StageError::Permanent(format!("bundle serialization failed: {e}")))?;
        let bundle_ref = ctx.providers.storage.put(bundle_bytes).await?;

        ctx.artifacts.stored_refs = vec![text_ref.clone(), bundle_ref.clone()];

        let detail = serde_json::json!({
            "redacted_text_ref": text_ref,
            "bundle_ref": bundle_ref,
        });
        Ok(StageOutcome {
            summary: "Persisted redacted text and embedding bundle".to_string(),
            detail,
        })
    }
}
