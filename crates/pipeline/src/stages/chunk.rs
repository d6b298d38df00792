//! `chunk` — split redacted text into embedder-sized pieces.

use async_trait::async_trait;
use triage_core::chunking::{chunk_lines, ChunkConfig};

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

pub struct ChunkStage;

#[async_trait]
impl StageHandler for ChunkStage {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let text = ctx
            .artifacts
            .redacted_text
            .as_deref()
            .ok_or_else(|| StageError::Permanent("redact output missing".to_string()))?;

        let chunks = chunk_lines(text, &ChunkConfig::default());
        if chunks.is_empty() {
            return Err(StageError::Permanent(
                "no chunkable content after redaction".to_string(),
            ));
        }

        let detail = serde_json::json!({ "chunks": chunks.len() });
        let summary = format!("Split input into {} chunk(s)", chunks.len());
        ctx.artifacts.chunks = Some(chunks);

        Ok(StageOutcome { summary, detail })
    }
}
