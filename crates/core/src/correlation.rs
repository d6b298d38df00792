//! Incident correlation over chunk embeddings (PRD-33).
//!
//! Two passes: greedy cosine-similarity clustering groups chunks that
//! talk about the same failure, and signature extraction counts repeated
//! error shapes (numbers and hex spans normalized away so `timeout after
//! 30s` and `timeout after 45s` collapse to one signature).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Chunks whose cosine similarity to a cluster centroid is at or above
/// this threshold join that cluster.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.82;

/// Error-ish log levels that mark a line as an incident candidate.
const ERROR_MARKERS: [&str; 4] = ["ERROR", "FATAL", "CRITICAL", "PANIC"];

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:0x[0-9a-fA-F]+|\d+)\b").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A group of chunks judged to describe the same incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCluster {
    /// Indices into the chunk list this cluster was built from.
    pub chunk_indices: Vec<usize>,
    /// Representative text: the first member chunk's first line.
    pub representative: String,
}

/// A normalized error line shape and how often it occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSignature {
    pub signature: String,
    pub occurrences: usize,
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Cosine similarity of two equal-length vectors, in `-1.0..=1.0`.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Greedily cluster chunk embeddings by cosine similarity.
///
/// Each chunk joins the first existing cluster whose running centroid is
/// within `threshold`, otherwise it starts a new cluster. Order-dependent
/// by design: log chunks arrive in time order and adjacent failures
/// usually belong together.
pub fn cluster_chunks(
    texts: &[String],
    embeddings: &[Vec<f32>],
    threshold: f32,
) -> Vec<IncidentCluster> {
    let mut clusters: Vec<IncidentCluster> = Vec::new();
    let mut centroids: Vec<Vec<f32>> = Vec::new();

    for (idx, vector) in embeddings.iter().enumerate() {
        let mut placed = false;
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if cosine_similarity(centroid, vector) >= threshold {
                let n = clusters[c].chunk_indices.len() as f32;
                for (dim, v) in centroid.iter_mut().zip(vector) {
                    *dim = (*dim * n + v) / (n + 1.0);
                }
                clusters[c].chunk_indices.push(idx);
                placed = true;
                break;
            }
        }
        if !placed {
            centroids.push(vector.clone());
            clusters.push(IncidentCluster {
                chunk_indices: vec![idx],
                representative: texts
                    .get(idx)
                    .and_then(|t| t.lines().next())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    clusters
}

// ---------------------------------------------------------------------------
// Error signatures
// ---------------------------------------------------------------------------

/// Extract and count normalized error-line signatures from raw text.
///
/// Only lines containing one of the [`ERROR_MARKERS`] participate.
/// Results are sorted by occurrence count, most frequent first.
pub fn error_signatures(text: &str) -> Vec<ErrorSignature> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for line in text.lines() {
        if !ERROR_MARKERS.iter().any(|m| line.contains(m)) {
            continue;
        }
        let normalized = NUMERIC_RE.replace_all(line.trim(), "<N>").into_owned();
        *counts.entry(normalized).or_default() += 1;
    }

    let mut signatures: Vec<ErrorSignature> = counts
        .into_iter()
        .map(|(signature, occurrences)| ErrorSignature {
            signature,
            occurrences,
        })
        .collect();
    signatures.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then(a.signature.cmp(&b.signature)));
    signatures
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![0.5, 0.25, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn identical_embeddings_share_a_cluster() {
        let texts = vec!["timeout a".to_string(), "timeout b".to_string()];
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        let clusters = cluster_chunks(&texts, &embeddings, 0.9);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].chunk_indices, vec![0, 1]);
        assert_eq!(clusters[0].representative, "timeout a");
    }

    #[test]
    fn dissimilar_embeddings_split_clusters() {
        let texts = vec!["disk full".to_string(), "oom killed".to_string()];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let clusters = cluster_chunks(&texts, &embeddings, 0.9);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn empty_input_clusters_to_nothing() {
        assert!(cluster_chunks(&[], &[], 0.8).is_empty());
    }

    #[test]
    fn signatures_collapse_numeric_variance() {
        let text = "ERROR timeout after 30s\nERROR timeout after 45s\nINFO all good";
        let sigs = error_signatures(text);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].occurrences, 2);
        assert!(sigs[0].signature.contains("<N>"));
    }

    #[test]
    fn signatures_sorted_by_frequency() {
        let text = "ERROR a\nERROR b\nERROR b";
        let sigs = error_signatures(text);
        assert_eq!(sigs[0].signature, "ERROR b");
        assert_eq!(sigs[0].occurrences, 2);
        assert_eq!(sigs[1].occurrences, 1);
    }

    #[test]
    fn non_error_lines_ignored() {
        assert!(error_signatures("INFO fine\nDEBUG also fine").is_empty());
    }
}
