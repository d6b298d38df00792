//! Sensitive-data redaction for uploaded log text (PRD-31).
//!
//! The pattern catalog here is deliberately small: email addresses, IPv4
//! addresses, and bearer/API credentials. Site-specific catalogs plug in
//! upstream; the pipeline only depends on the outcome shape.
//!
//! Redaction is pure: same input, same output, no side effects.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid regex")
});

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("valid regex")
});

/// Matches `Bearer <token>` headers and `api_key=...` / `token=...` pairs.
static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:bearer\s+[A-Za-z0-9\-._~+/]{8,}=*|(?:api[_-]?key|token|secret)\s*[=:]\s*\S{8,})")
        .expect("valid regex")
});

/// Replacement markers, aligned with the pattern list above.
const MARKER_EMAIL: &str = "[REDACTED:email]";
const MARKER_IPV4: &str = "[REDACTED:ip]";
const MARKER_CREDENTIAL: &str = "[REDACTED:credential]";

/// If more than this fraction of lines contained a credential match, the
/// outcome carries a warning so operators can double-check the source.
const CREDENTIAL_WARN_RATIO: f64 = 0.5;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of scrubbing one text blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionOutcome {
    /// The scrubbed text with markers in place of sensitive spans.
    pub text: String,
    /// Total number of spans replaced.
    pub items_redacted: usize,
    /// Non-fatal observations (e.g. suspiciously credential-dense input).
    pub warnings: Vec<String>,
}

/// Scrub sensitive spans from `input`.
///
/// Patterns are applied credential-first so that tokens containing an
/// embedded `@` or dotted quad are not half-replaced by a later pattern.
pub fn redact(input: &str) -> RedactionOutcome {
    let mut count = 0usize;

    let pass = |re: &Regex, marker: &str, text: &str, count: &mut usize| -> String {
        let mut local = 0usize;
        let out = re
            .replace_all(text, |_: &regex::Captures<'_>| {
                local += 1;
                marker.to_string()
            })
            .into_owned();
        *count += local;
        out
    };

    let text = pass(&CREDENTIAL_RE, MARKER_CREDENTIAL, input, &mut count);
    let credential_hits = count;
    let text = pass(&EMAIL_RE, MARKER_EMAIL, &text, &mut count);
    let text = pass(&IPV4_RE, MARKER_IPV4, &text, &mut count);

    let mut warnings = Vec::new();
    let line_count = input.lines().count().max(1);
    if credential_hits as f64 / line_count as f64 > CREDENTIAL_WARN_RATIO {
        warnings.push(format!(
            "{credential_hits} credential-like spans in {line_count} lines; source may embed secrets"
        ));
    }

    RedactionOutcome {
        text,
        items_redacted: count,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
