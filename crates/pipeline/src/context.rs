//! Per-job execution context and accumulated stage artifacts.

use std::sync::Arc;

use triage_core::chunking::Chunk;
use triage_core::correlation::{ErrorSignature, IncidentCluster};
use triage_db::models::job::Job;
use triage_providers::{AnalysisProvider, EmbeddingProvider, ObjectStorage};

/// The external collaborators a pipeline run may call.
pub struct ProviderSet {
    pub storage: Arc<dyn ObjectStorage>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub analyst: Arc<dyn AnalysisProvider>,
}

/// Intermediate results accumulated across stages.
///
/// Each stage reads what earlier stages produced and fills in its own
/// slot; the `report` stage folds everything into the final artifact.
/// Fields are `Option` so a handler can assert its preconditions
/// explicitly instead of trusting stage order implicitly.
#[derive(Debug, Default)]
pub struct StageArtifacts {
    /// Combined raw input text, classify's format label and line count.
    pub raw_text: Option<String>,
    pub format: Option<String>,
    pub line_count: Option<usize>,

    /// Redaction results.
    pub redacted_text: Option<String>,
    pub items_redacted: Option<usize>,
    pub redaction_warnings: Vec<String>,

    /// Chunking / embedding results.
    pub chunks: Option<Vec<Chunk>>,
    pub embeddings: Option<Vec<Vec<f32>>>,

    /// Storage references written by the `store` stage.
    pub stored_refs: Vec<String>,

    /// Correlation results.
    pub incidents: Option<Vec<IncidentCluster>>,
    pub signatures: Option<Vec<ErrorSignature>>,

    /// Analysis narrative.
    pub narrative: Option<String>,

    /// Final report artifact assembled by the `report` stage.
    pub report: Option<serde_json::Value>,
}

/// Everything a stage handler sees: the job snapshot, the artifacts so
/// far, and the provider set.
pub struct StageContext {
    pub job: Job,
    pub artifacts: StageArtifacts,
    pub providers: Arc<ProviderSet>,
}

impl StageContext {
    pub fn new(job: Job, providers: Arc<ProviderSet>) -> Self {
        Self {
            job,
            artifacts: StageArtifacts::default(),
            providers,
        }
    }
}
