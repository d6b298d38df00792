//! Environment-driven wiring for provider collaborators.
//!
//! Shared by the worker binary and the API server's embedded scheduler
//! so both resolve the same environment variables the same way.

use std::sync::Arc;

use triage_pipeline::ProviderSet;
use triage_providers::{
    HashEmbedder, HttpAnalyst, HttpEmbedder, LocalStorage, ObjectStorage, S3Storage,
};

/// Default OpenAI-compatible endpoints (a local Ollama-style server).
const DEFAULT_EMBEDDING_ENDPOINT: &str = "http://localhost:11434/v1/embeddings";
const DEFAULT_ANALYSIS_ENDPOINT: &str = "http://localhost:11434/v1/chat/completions";

/// Build the provider set from environment variables.
///
/// | Env Var               | Default                                     |
/// |-----------------------|---------------------------------------------|
/// | `S3_BUCKET`           | unset (use local storage)                   |
/// | `S3_PREFIX`           | `triage/`                                   |
/// | `STORAGE_DIR`         | `./data/objects`                            |
/// | `EMBEDDING_ENDPOINT`  | local OpenAI-compatible server, or `hash` for the offline embedder |
/// | `EMBEDDING_MODEL`     | `nomic-embed-text`                          |
/// | `EMBEDDING_API_KEY`   | unset                                       |
/// | `ANALYSIS_ENDPOINT`   | local OpenAI-compatible server              |
/// | `ANALYSIS_MODEL`      | `llama3`                                    |
/// | `ANALYSIS_API_KEY`    | unset                                       |
pub async fn providers_from_env() -> Arc<ProviderSet> {
    let storage: Arc<dyn ObjectStorage> = match std::env::var("S3_BUCKET") {
        Ok(bucket) => {
            let prefix = std::env::var("S3_PREFIX").unwrap_or_else(|_| "triage/".to_string());
            tracing::info!(%bucket, %prefix, "Using S3 object storage");
            Arc::new(S3Storage::from_env(bucket, prefix).await)
        }
        Err(_) => {
            let dir =
                std::env::var("STORAGE_DIR").unwrap_or_else(|_| "./data/objects".to_string());
            tracing::info!(%dir, "Using local object storage");
            Arc::new(LocalStorage::new(dir))
        }
    };

    let embedding_endpoint = std::env::var("EMBEDDING_ENDPOINT")
        .unwrap_or_else(|_| DEFAULT_EMBEDDING_ENDPOINT.to_string());
    let embedder: Arc<dyn triage_providers::EmbeddingProvider> = if embedding_endpoint == "hash" {
        tracing::info!("Using offline hash embedder");
        Arc::new(HashEmbedder::new())
    } else {
        let model =
            std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".to_string());
        Arc::new(HttpEmbedder::new(
            embedding_endpoint,
            model,
            std::env::var("EMBEDDING_API_KEY").ok(),
        ))
    };

    let analysis_endpoint = std::env::var("ANALYSIS_ENDPOINT")
        .unwrap_or_else(|_| DEFAULT_ANALYSIS_ENDPOINT.to_string());
    let analysis_model = std::env::var("ANALYSIS_MODEL").unwrap_or_else(|_| "llama3".to_string());
    let analyst = Arc::new(HttpAnalyst::new(
        analysis_endpoint,
        analysis_model,
        std::env::var("ANALYSIS_API_KEY").ok(),
    ));

    Arc::new(ProviderSet {
        storage,
        embedder,
        analyst,
    })
}
