//! Scriptable provider fakes for pipeline tests.
//!
//! Exposed as a normal module (not `#[cfg(test)]`) so downstream crates
//! can drive their own executor and scheduler tests with deterministic
//! provider behavior.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::analysis::AnalysisProvider;
use crate::embedding::{EmbeddingProvider, HashEmbedder};
use crate::error::ProviderError;

/// One scripted reply from a fake provider.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Ok(String),
    Transient(String),
    Permanent(String),
}

impl ScriptedReply {
    fn into_result(self) -> Result<String, ProviderError> {
        match self {
            Self::Ok(s) => Ok(s),
            Self::Transient(s) => Err(ProviderError::Transient(s)),
            Self::Permanent(s) => Err(ProviderError::Permanent(s)),
        }
    }
}

/// Analysis fake that replays a fixed script, one reply per call.
///
/// Calls past the end of the script repeat the final reply, so
/// "fail twice then succeed" scripts stay stable under extra retries.
pub struct ScriptedAnalyst {
    script: Vec<ScriptedReply>,
    calls: AtomicUsize,
}

impl ScriptedAnalyst {
    pub fn new(script: Vec<ScriptedReply>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// A fake that always succeeds with `narrative`.
    pub fn always(narrative: &str) -> Self {
        Self::new(vec![ScriptedReply::Ok(narrative.to_string())])
    }

    /// A fake that fails transiently `failures` times, then succeeds.
    pub fn flaky(failures: usize, narrative: &str) -> Self {
        let mut script = vec![ScriptedReply::Transient("simulated timeout".to_string()); failures];
        script.push(ScriptedReply::Ok(narrative.to_string()));
        Self::new(script)
    }

    /// Number of `complete` calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedAnalyst {
    async fn complete(&self, _prompt: &str, _context: &str) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(ScriptedReply::Permanent("empty script".to_string()));
        reply.into_result()
    }
}

/// Embedding fake: deterministic hash vectors, with an optional number
/// of leading transient failures.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    failures: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: HashEmbedder::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::Transient("simulated rate limit".to_string()));
        }
        self.inner.embed(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flaky_analyst_fails_then_succeeds() {
        let analyst = ScriptedAnalyst::flaky(2, "all clear");
        assert!(analyst.complete("p", "c").await.is_err());
        assert!(analyst.complete("p", "c").await.is_err());
        assert_eq!(analyst.complete("p", "c").await.unwrap(), "all clear");
        assert_eq!(analyst.call_count(), 3);
    }

    #[tokio::test]
    async fn script_end_repeats_last_reply() {
        let analyst = ScriptedAnalyst::always("done");
        for _ in 0..3 {
            assert_eq!(analyst.complete("p", "c").await.unwrap(), "done");
        }
    }

    #[tokio::test]
    async fn flaky_embedder_recovers() {
        let embedder = FlakyEmbedder::new(1);
        assert!(embedder.embed(&["x".to_string()]).await.is_err());
        assert!(embedder.embed(&["x".to_string()]).await.is_ok());
    }
}
