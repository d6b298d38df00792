//! `embed` — vectorize chunks through the embedding provider.

use async_trait::async_trait;

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

/// Chunks per provider call. Bounded so a huge upload cannot produce an
/// oversized request body.
const EMBED_BATCH_SIZE: usize = 32;

pub struct Embed;

#[async_trait]
impl StageHandler for Embed {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let chunks = ctx
            .artifacts
            .chunks
            .as_ref()
            .ok_or_else(|| StageError::Permanent("chunk output missing".to_string()))?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let vectors = ctx.providers.embedder.embed(batch).await?;
            embeddings.extend(vectors);
        }

        if embeddings.len() != texts.len() {
            return Err(StageError::Permanent(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                texts.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        let detail = serde_json::json!({
            "embeddings": embeddings.len(),
            "dimension": dimension,
        });
        let summary = format!("Embedded {} chunk(s)", embeddings.len());
        ctx.artifacts.embeddings = Some(embeddings);

        Ok(StageOutcome { summary, detail })
    }
}
