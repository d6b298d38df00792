//! Analysis prompt assembly (PRD-34).
//!
//! Builds the single prompt handed to the analysis provider from the
//! artifacts accumulated by earlier stages. Context is capped so prompt
//! size stays bounded regardless of input volume.

use crate::correlation::{ErrorSignature, IncidentCluster};

/// Maximum incident clusters quoted in the prompt context.
const MAX_PROMPT_INCIDENTS: usize = 5;

/// Maximum error signatures quoted in the prompt context.
const MAX_PROMPT_SIGNATURES: usize = 8;

/// Inputs for [`build_analysis_prompt`].
#[derive(Debug, Clone)]
pub struct AnalysisContext<'a> {
    /// Classified log format label (e.g. `"json-lines"`).
    pub format: &'a str,
    pub line_count: usize,
    pub items_redacted: usize,
    pub incidents: &'a [IncidentCluster],
    pub signatures: &'a [ErrorSignature],
}

/// Render the instruction prompt for the analysis provider.
///
/// The provider sees only redacted material: representatives and
/// signatures are taken from post-redaction text.
pub fn build_analysis_prompt(ctx: &AnalysisContext<'_>) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(
        "You are an incident analyst. Given the findings below from an uploaded log, \
         write a concise incident narrative: probable root cause, impact, and suggested \
         next steps. Do not invent details that are not supported by the findings.\n\n",
    );
    prompt.push_str(&format!(
        "Log format: {}\nLines analyzed: {}\nSensitive items redacted: {}\n",
        ctx.format, ctx.line_count, ctx.items_redacted
    ));

    if ctx.incidents.is_empty() {
        prompt.push_str("\nNo correlated incident clusters were found.\n");
    } else {
        prompt.push_str(&format!(
            "\nTop incident clusters ({} of {}):\n",
            ctx.incidents.len().min(MAX_PROMPT_INCIDENTS),
            ctx.incidents.len()
        ));
        for (i, cluster) in ctx.incidents.iter().take(MAX_PROMPT_INCIDENTS).enumerate() {
            prompt.push_str(&format!(
                "{}. [{} chunks] {}\n",
                i + 1,
                cluster.chunk_indices.len(),
                cluster.representative
            ));
        }
    }

    if !ctx.signatures.is_empty() {
        prompt.push_str("\nRepeated error signatures:\n");
        for sig in ctx.signatures.iter().take(MAX_PROMPT_SIGNATURES) {
            prompt.push_str(&format!("- ({}x) {}\n", sig.occurrences, sig.signature));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cluster(text: &str, size: usize) -> IncidentCluster {
        IncidentCluster {
            chunk_indices: (0..size).collect(),
            representative: text.to_string(),
        }
    }

    #[test]
    fn prompt_includes_counts_and_format() {
        let ctx = AnalysisContext {
            format: "syslog",
            line_count: 120,
            items_redacted: 4,
            incidents: &[],
            signatures: &[],
        };
        let prompt = build_analysis_prompt(&ctx);
        assert!(prompt.contains("Log format: syslog"));
        assert!(prompt.contains("Lines analyzed: 120"));
        assert!(prompt.contains("redacted: 4"));
        assert!(prompt.contains("No correlated incident clusters"));
    }

    #[test]
    fn incidents_are_capped() {
        let clusters: Vec<_> = (0..10)
            .map(|i| sample_cluster(&format!("incident {i}"), 1))
            .collect();
        let ctx = AnalysisContext {
            format: "text",
            line_count: 10,
            items_redacted: 0,
            incidents: &clusters,
            signatures: &[],
        };
        let prompt = build_analysis_prompt(&ctx);
        assert!(prompt.contains("incident 4"));
        assert!(!prompt.contains("incident 5"));
    }

    #[test]
    fn signatures_listed_with_counts() {
        let sigs = vec![ErrorSignature {
            signature: "ERROR timeout after <N>s".to_string(),
            occurrences: 7,
        }];
        let ctx = AnalysisContext {
            format: "text",
            line_count: 7,
            items_redacted: 0,
            incidents: &[],
            signatures: &sigs,
        };
        let prompt = build_analysis_prompt(&ctx);
        assert!(prompt.contains("(7x) ERROR timeout after <N>s"));
    }
}
