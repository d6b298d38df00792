//! `classify` — load the input manifest and sniff the log format.

use async_trait::async_trait;

use crate::context::StageContext;
use crate::error::StageError;
use crate::stage::{StageHandler, StageOutcome};

/// Fraction of sampled lines that must parse as JSON objects for the
/// input to be classified as `json-lines`.
const JSON_LINES_RATIO: f64 = 0.8;

/// Lines sampled for format sniffing.
const SNIFF_SAMPLE: usize = 50;

pub struct Classify;

#[async_trait]
impl StageHandler for Classify {
    async fn run(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        let mut combined = String::new();
        for attachment in &ctx.job.manifest {
            let bytes = ctx.providers.storage.get(&attachment.storage_key).await?;
            combined.push_str(&String::from_utf8_lossy(&bytes));
            if !combined.ends_with('\n') {
                combined.push('\n');
            }
        }

        let line_count = combined.lines().filter(|l| !l.trim().is_empty()).count();
        if line_count == 0 {
            return Err(StageError::Permanent(
                "no processable content in attached files".to_string(),
            ));
        }

        let format = sniff_format(&combined);
        let detail = serde_json::json!({
            "format": format,
            "files": ctx.job.manifest.len(),
            "lines": line_count,
        });
        let summary = format!(
            "Classified {} file(s) as {format} ({line_count} lines)",
            ctx.job.manifest.len()
        );

        ctx.artifacts.raw_text = Some(combined);
        ctx.artifacts.format = Some(format.to_string());
        ctx.artifacts.line_count = Some(line_count);

        Ok(StageOutcome { summary, detail })
    }
}

/// Best-effort format label for a log blob.
fn sniff_format(text: &str) -> &'static str {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_SAMPLE)
        .collect();
    if sample.is_empty() {
        return "text";
    }

    let json_lines = sample
        .iter()
        .filter(|l| {
            serde_json::from_str::<serde_json::Value>(l)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
        .count();
    if json_lines as f64 / sample.len() as f64 >= JSON_LINES_RATIO {
        return "json-lines";
    }

    let stamped = sample.iter().filter(|l| looks_timestamped(l)).count();
    if stamped as f64 / sample.len() as f64 >= 0.5 {
        return "syslog";
    }

    "text"
}

/// Whether a line opens with something timestamp-shaped: an ISO date or
/// a syslog month abbreviation.
fn looks_timestamped(line: &str) -> bool {
    let line = line.trim_start();
    let iso = line.len() >= 10
        && line.as_bytes()[..10]
            .iter()
            .enumerate()
            .all(|(i, b)| match i {
                4 | 7 => *b == b'-',
                _ => b.is_ascii_digit(),
            });
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    iso || MONTHS.iter().any(|m| line.starts_with(m))
}
