//! Line-aware text chunking for embedding (PRD-32).
//!
//! Log lines are the natural unit of meaning, so chunks never split a
//! line. A small line overlap between consecutive chunks keeps cross-line
//! context (stack traces, multi-line errors) visible to the embedder.

use serde::{Deserialize, Serialize};

/// Tunable parameters for the chunker.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Soft upper bound on chunk size in bytes. A single oversized line
    /// still becomes its own chunk rather than being split.
    pub max_chunk_bytes: usize,
    /// Number of trailing lines repeated at the start of the next chunk.
    pub overlap_lines: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 2048,
            overlap_lines: 2,
        }
    }
}

/// One chunk of input text, with its position in the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based index of this chunk in emission order.
    pub index: usize,
    /// 1-based line number of the first line in the chunk.
    pub start_line: usize,
    pub text: String,
}

/// Split `input` into line-aligned chunks.
///
/// Blank-only input yields no chunks. Overlapping lines count toward the
/// size bound of the chunk they are repeated into.
pub fn chunk_lines(input: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = input.lines().collect();
    let mut chunks = Vec::new();

    let mut current = String::new();
    let mut current_start = 0usize; // zero-based index into `lines`
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        let projected = current.len() + line.len() + 1;

        if !current.is_empty() && projected > config.max_chunk_bytes {
            push_chunk(&mut chunks, &current, current_start);
            // Step back for overlap, but always make forward progress.
            let overlap_start = i.saturating_sub(config.overlap_lines).max(current_start + 1);
            current = lines[overlap_start..i].join("\n");
            if !current.is_empty() {
                current.push('\n');
            }
            current_start = overlap_start;
        }

        current.push_str(line);
        current.push('\n');
        i += 1;
    }

    if !current.trim().is_empty() {
        push_chunk(&mut chunks, &current, current_start);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, start: usize) {
    if text.trim().is_empty() {
        return;
    }
    chunks.push(Chunk {
        index: chunks.len(),
        start_line: start + 1,
        text: text.trim_end_matches('\n').to_string(),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig {
            max_chunk_bytes: max,
            overlap_lines: overlap,
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_lines("", &ChunkConfig::default()).is_empty());
        assert!(chunk_lines("\n\n  \n", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn small_input_is_one_chunk() {
        let chunks = chunk_lines("line one\nline two", &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].text, "line one\nline two");
    }

    #[test]
    fn splits_on_size_bound() {
        let input = (0..20).map(|i| format!("log line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_lines(&input, &cfg(40, 0));
        assert!(chunks.len() > 1);
        // Every source line appears in some chunk.
        for i in 0..20 {
            let needle = format!("log line {i}");
            assert!(chunks.iter().any(|c| c.text.contains(&needle)), "{needle} missing");
        }
    }

    #[test]
    fn overlap_repeats_trailing_lines() {
        let input = "a1\na2\na3\na4\na5\na6";
        let chunks = chunk_lines(input, &cfg(9, 1));
        assert!(chunks.len() >= 2);
        // Last line of chunk N reappears at the head of chunk N+1.
        for pair in chunks.windows(2) {
            let tail = pair[0].text.lines().last().unwrap();
            assert_eq!(pair[1].text.lines().next().unwrap(), tail);
        }
    }

    #[test]
    fn oversized_single_line_becomes_own_chunk() {
        let long = "x".repeat(100);
        let input = format!("short\n{long}\nshort again");
        let chunks = chunk_lines(&input, &cfg(32, 0));
        assert!(chunks.iter().any(|c| c.text == long));
    }

    #[test]
    fn indices_are_sequential() {
        let input = (0..50).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_lines(&input, &cfg(16, 1));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }
}
