//! Stage descriptors and the fixed pipeline registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::StageContext;
use crate::error::StageError;
use crate::retry::RetryPolicy;
use crate::stages;

/// Default bound on a single stage attempt. An attempt that exceeds it
/// is treated as a transient failure eligible for retry.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Successful stage result: a human summary plus structured detail that
/// lands in the `stage-completed` event.
#[derive(Debug)]
pub struct StageOutcome {
    pub summary: String,
    pub detail: serde_json::Value,
}

/// One step of the pipeline.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError>;
}

/// Immutable description of one pipeline stage.
#[derive(Clone)]
pub struct StageDescriptor {
    pub name: &'static str,
    /// This stage's contribution to the overall 0–100 progress scale.
    pub progress_start: i16,
    pub progress_end: i16,
    pub retry: RetryPolicy,
    /// Bound on a single attempt's wall time.
    pub timeout: Duration,
    pub handler: Arc<dyn StageHandler>,
}

impl StageDescriptor {
    fn new(
        name: &'static str,
        progress: (i16, i16),
        retry: RetryPolicy,
        handler: Arc<dyn StageHandler>,
    ) -> Self {
        Self {
            name,
            progress_start: progress.0,
            progress_end: progress.1,
            retry,
            timeout: DEFAULT_STAGE_TIMEOUT,
            handler,
        }
    }
}

/// The fixed, ordered stage sequence.
///
/// Progress ranges are contiguous and span 0–100; local computation
/// stages get no retries, provider-facing stages retry with backoff.
pub fn registry() -> Vec<StageDescriptor> {
    let provider_retry = RetryPolicy::default();
    let analyze_retry = RetryPolicy {
        max_attempts: 4,
        ..Default::default()
    };

    vec![
        StageDescriptor::new(
            "classify",
            (0, 10),
            RetryPolicy {
                // Storage reads can hiccup; everything else is local.
                max_attempts: 3,
                ..Default::default()
            },
            Arc::new(stages::classify::Classify),
        ),
        StageDescriptor::new(
            "redact",
            (10, 40),
            RetryPolicy::none(),
            Arc::new(stages::redact::Redact),
        ),
        StageDescriptor::new(
            "chunk",
            (40, 50),
            RetryPolicy::none(),
            Arc::new(stages::chunk::ChunkStage),
        ),
        StageDescriptor::new(
            "embed",
            (50, 60),
            provider_retry.clone(),
            Arc::new(stages::embed::Embed),
        ),
        StageDescriptor::new(
            "store",
            (60, 70),
            provider_retry.clone(),
            Arc::new(stages::store::StoreArtifacts),
        ),
        StageDescriptor::new(
            "correlate",
            (70, 75),
            RetryPolicy::none(),
            Arc::new(stages::correlate::Correlate),
        ),
        StageDescriptor::new(
            "analyze",
            (75, 90),
            analyze_retry,
            Arc::new(stages::analyze::Analyze),
        ),
        StageDescriptor::new(
            "report",
            (90, 100),
            provider_retry,
            Arc::new(stages::report::Report),
        ),
    ]
}
