//! Overlapping window chunker with newline-aware boundaries.
//!
//! Splits file content into segments of at most `chunk_size` bytes with
//! `overlap` bytes carried between consecutive segments. Interior window
//! edges are snapped backward to the nearest newline, but only when that
//! newline sits past the window midpoint, so no chunk degenerates below
//! half the target size.
//!
//! Each chunk gets a deterministic identifier derived from
//! `(repo_id, file_path, chunk_index)`, which makes re-indexing the same
//! content an idempotent upsert rather than an append.
//!
//! Chunking is pure: no I/O, no clock, no randomness. Per-file problems
//! (empty content, blank paths) are collected as skips and never abort
//! the batch.

use serde_json::Value;

use crate::error::PipelineError;
use crate::models::{Chunk, FileRecord};

/// Chunking parameters, validated before any I/O.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    /// Target window size in bytes.
    pub chunk_size: usize,
    /// Bytes carried over between consecutive chunks.
    pub overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, PipelineError> {
        if chunk_size == 0 {
            return Err(PipelineError::config("chunk_size must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(PipelineError::config(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

/// Outcome of chunking a batch of file records: the produced chunks plus
/// the files that were skipped, so callers can assert on skip behavior.
#[derive(Debug, Default)]
pub struct ChunkBatch {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedFile>,
}

/// A file that was skipped during chunking, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub source_path: String,
    pub reason: String,
}

/// A raw fragment of content: the text plus its byte offset into the
/// original file. Offsets let reconstruction splice overlapping chunks
/// back together without duplicating the overlap region.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub content: String,
    pub start_offset: usize,
}

/// Build the deterministic chunk identifier.
///
/// Stable across runs on unchanged content: same repo, path, and index
/// always yield the same id. Leading path separators are stripped so
/// `/src/main.rs` and `src/main.rs` identify the same file.
pub fn chunk_id(repo_id: &str, file_path: &str, chunk_index: usize) -> String {
    let path = file_path.trim_start_matches(['/', '\\']);
    format!("{repo_id}::{path}::chunk_{chunk_index}")
}

/// Split `content` into overlapping fragments.
///
/// Content no longer than `chunk_size` comes back as a single fragment.
/// Empty or whitespace-only content yields no fragments; callers treat
/// that as a skip, not an error.
pub fn split_content(content: &str, params: ChunkParams) -> Vec<Fragment> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let len = content.len();
    if len <= params.chunk_size {
        return vec![Fragment {
            content: content.to_string(),
            start_offset: 0,
        }];
    }

    let mut fragments = Vec::new();
    let mut start = 0usize;

    loop {
        let raw_end = start + params.chunk_size;
        if raw_end >= len {
            fragments.push(Fragment {
                content: content[start..].to_string(),
                start_offset: start,
            });
            break;
        }

        let mut end = floor_char_boundary(content, raw_end);
        if end <= start {
            // Degenerate window (chunk_size smaller than one multibyte
            // char): take at least one char to keep moving.
            end = next_char_boundary(content, start + 1);
        }

        // Snap backward to the nearest newline inside the window. Only
        // accept it when the snapped end lies past the midpoint (no
        // sub-half chunks) and past start+overlap (next start must
        // strictly advance).
        if let Some(pos) = content[start..end].rfind('\n') {
            let candidate = start + pos + 1;
            if candidate > start + params.chunk_size / 2
                && candidate > start + params.overlap
                && candidate < end
            {
                end = candidate;
            }
        }

        fragments.push(Fragment {
            content: content[start..end].to_string(),
            start_offset: start,
        });

        if end >= len {
            break;
        }

        let mut next = floor_char_boundary(content, end - params.overlap);
        if next <= start {
            // Only reachable when overlap is within a few bytes of
            // chunk_size and char-boundary snapping ate the difference.
            next = next_char_boundary(content, start + 1);
        }
        start = next;
    }

    fragments
}

/// Chunk a single file record into fully-formed [`Chunk`]s.
///
/// Metadata is the file's metadata merged with the positional keys
/// (`file_path`, `chunk_index`, `total_chunks`, `start_offset`); the
/// positional keys win on collision.
pub fn chunk_file(repo_id: &str, record: &FileRecord, params: ChunkParams) -> Vec<Chunk> {
    let fragments = split_content(&record.content, params);
    let total = fragments.len();

    fragments
        .into_iter()
        .enumerate()
        .map(|(index, fragment)| {
            let mut metadata = record.metadata.to_map();
            metadata.insert("file_path".into(), Value::from(record.source_path.clone()));
            metadata.insert("chunk_index".into(), Value::from(index));
            metadata.insert("total_chunks".into(), Value::from(total));
            metadata.insert("start_offset".into(), Value::from(fragment.start_offset));

            Chunk {
                repo_id: repo_id.to_string(),
                file_path: record.source_path.clone(),
                chunk_id: chunk_id(repo_id, &record.source_path, index),
                chunk_index: index,
                total_chunks: total,
                content: fragment.content,
                metadata,
            }
        })
        .collect()
}

/// Chunk a batch of file records.
///
/// Validates parameters and `repo_id` up front; individual files that
/// cannot be chunked are recorded as skips and the batch continues.
pub fn chunk_files(
    repo_id: &str,
    records: &[FileRecord],
    params: ChunkParams,
) -> Result<ChunkBatch, PipelineError> {
    if repo_id.trim().is_empty() {
        return Err(PipelineError::config("repo_id must not be empty"));
    }

    let mut batch = ChunkBatch::default();

    for record in records {
        if record.source_path.trim().is_empty() {
            batch.skipped.push(SkippedFile {
                source_path: record.source_path.clone(),
                reason: "missing source path".into(),
            });
            continue;
        }

        let chunks = chunk_file(repo_id, record, params);
        if chunks.is_empty() {
            batch.skipped.push(SkippedFile {
                source_path: record.source_path.clone(),
                reason: "empty or whitespace-only content".into(),
            });
            continue;
        }

        batch.chunks.extend(chunks);
    }

    if !batch.skipped.is_empty() {
        let shown: Vec<&str> = batch
            .skipped
            .iter()
            .take(10)
            .map(|s| s.source_path.as_str())
            .collect();
        tracing::warn!(
            skipped = batch.skipped.len(),
            files = ?shown,
            "skipped files during chunking"
        );
    }

    Ok(batch)
}

/// Largest valid char boundary at or below `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest valid char boundary at or above `index`.
fn next_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileMetadata;

    fn params(chunk_size: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(chunk_size, overlap).unwrap()
    }

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            source_path: path.to_string(),
            content: content.to_string(),
            metadata: FileMetadata {
                file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
                extension: ".rs".into(),
                directory: "src".into(),
                line_count: content.lines().count(),
                char_count: content.len(),
                language: "rust".into(),
            },
        }
    }

    /// Rebuild the original content from fragments by splicing on offsets.
    fn reassemble(fragments: &[Fragment]) -> String {
        let mut out = String::new();
        let mut emitted = 0usize;
        for f in fragments {
            let skip = emitted.saturating_sub(f.start_offset);
            out.push_str(&f.content[skip..]);
            emitted = f.start_offset + f.content.len();
        }
        out
    }

    #[test]
    fn test_params_reject_overlap_ge_chunk_size() {
        assert!(ChunkParams::new(100, 100).is_err());
        assert!(ChunkParams::new(100, 150).is_err());
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(100, 99).is_ok());
    }

    #[test]
    fn test_small_content_single_fragment() {
        let fragments = split_content("fn main() {}", params(1000, 200));
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content, "fn main() {}");
        assert_eq!(fragments[0].start_offset, 0);
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        assert!(split_content("", params(1000, 200)).is_empty());
        assert!(split_content("  \n\t\n  ", params(1000, 200)).is_empty());
    }

    #[test]
    fn test_overlap_carried_between_fragments() {
        let content = "a".repeat(2500);
        let fragments = split_content(&content, params(1000, 200));
        assert!(fragments.len() >= 2);
        for pair in fragments.windows(2) {
            let prev_end = pair[0].start_offset + pair[0].content.len();
            assert_eq!(pair[1].start_offset, prev_end - 200);
        }
        assert_eq!(reassemble(&fragments), content);
    }

    #[test]
    fn test_newline_snap_past_midpoint() {
        // One newline at byte 700 of a 2000-byte file: inside the first
        // window and past its midpoint, so the first fragment ends there.
        let content = format!("{}\n{}", "x".repeat(699), "y".repeat(1300));
        let fragments = split_content(&content, params(1000, 100));
        assert_eq!(fragments[0].content.len(), 700);
        assert!(fragments[0].content.ends_with('\n'));
        assert_eq!(fragments[1].start_offset, 600);
        assert_eq!(reassemble(&fragments), content);
    }

    #[test]
    fn test_newline_before_midpoint_ignored() {
        // Newline at byte 100: before the midpoint of a 1000-byte window,
        // so the raw boundary is used instead.
        let content = format!("{}\n{}", "x".repeat(99), "y".repeat(1900));
        let fragments = split_content(&content, params(1000, 100));
        assert_eq!(fragments[0].content.len(), 1000);
    }

    #[test]
    fn test_window_scenario_with_line_structure() {
        // 2500 bytes as lines of 312 (311 chars + newline), final line
        // unterminated: snapping walks the windows to four chunks.
        let mut content = String::new();
        for _ in 0..7 {
            content.push_str(&"x".repeat(311));
            content.push('\n');
        }
        content.push_str(&"x".repeat(316));
        assert_eq!(content.len(), 2500);

        let fragments = split_content(&content, params(1000, 200));
        assert_eq!(fragments.len(), 4);
        for f in &fragments {
            assert!(f.content.len() <= 1000);
            assert!(!f.content.is_empty());
        }
        assert_eq!(reassemble(&fragments), content);

        let chunks = chunk_file("demo", &record("src/big.rs", &content), params(1000, 200));
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, 4);
        }
    }

    #[test]
    fn test_plain_content_stops_after_final_window() {
        // 2500 bytes without newlines: windows at 0..1000, 800..1800, and
        // a final 1600..2500. No fourth chunk is emitted for a tail that
        // would consist solely of bytes the third window already covers.
        let content = "a".repeat(2500);
        let fragments = split_content(&content, params(1000, 200));
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].start_offset, 0);
        assert_eq!(fragments[1].start_offset, 800);
        assert_eq!(fragments[2].start_offset, 1600);
        assert_eq!(fragments[2].content.len(), 900);
        assert_eq!(reassemble(&fragments), content);
    }

    #[test]
    fn test_terminates_with_large_overlap() {
        let content = "z".repeat(10_000);
        let fragments = split_content(&content, params(100, 99));
        assert!(!fragments.is_empty());
        let mut prev = None;
        for f in &fragments {
            if let Some(p) = prev {
                assert!(f.start_offset > p, "start offsets must strictly increase");
            }
            prev = Some(f.start_offset);
        }
        assert_eq!(reassemble(&fragments), content);
    }

    #[test]
    fn test_multibyte_content_respects_char_boundaries() {
        let content = "日本語のテキスト。".repeat(200);
        let fragments = split_content(&content, params(500, 50));
        for f in &fragments {
            assert!(!f.content.is_empty());
        }
        assert_eq!(reassemble(&fragments), content);
    }

    #[test]
    fn test_chunk_id_deterministic_and_strips_leading_separator() {
        assert_eq!(chunk_id("repo", "src/main.rs", 0), "repo::src/main.rs::chunk_0");
        assert_eq!(chunk_id("repo", "/src/main.rs", 0), "repo::src/main.rs::chunk_0");
        assert_eq!(
            chunk_id("repo", "src/main.rs", 3),
            chunk_id("repo", "src/main.rs", 3)
        );
    }

    #[test]
    fn test_chunk_file_metadata_merge() {
        let content = "fn main() {}\n".repeat(200);
        let chunks = chunk_file("demo", &record("src/main.rs", &content), params(1000, 200));
        assert!(chunks.len() > 1);
        let first = &chunks[0];
        assert_eq!(first.metadata["language"], "rust");
        assert_eq!(first.metadata["file_path"], "src/main.rs");
        assert_eq!(first.metadata["chunk_index"], 0);
        assert_eq!(first.metadata["total_chunks"], chunks.len());
        assert_eq!(first.metadata["start_offset"], 0);
    }

    #[test]
    fn test_rechunking_produces_identical_ids() {
        let content = "let x = 1;\n".repeat(300);
        let rec = record("src/lib.rs", &content);
        let a: Vec<String> = chunk_file("demo", &rec, params(1000, 200))
            .into_iter()
            .map(|c| c.chunk_id)
            .collect();
        let b: Vec<String> = chunk_file("demo", &rec, params(1000, 200))
            .into_iter()
            .map(|c| c.chunk_id)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_skips_bad_files_and_continues() {
        let records = vec![
            record("src/good.rs", "fn ok() {}"),
            record("src/empty.rs", "   \n"),
            record("", "orphan content"),
            record("src/also_good.rs", "fn fine() {}"),
        ];
        let batch = chunk_files("demo", &records, params(1000, 200)).unwrap();
        assert_eq!(batch.chunks.len(), 2);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].source_path, "src/empty.rs");
    }

    #[test]
    fn test_batch_rejects_empty_repo_id() {
        let records = vec![record("src/a.rs", "fn a() {}")];
        let err = chunk_files("  ", &records, params(1000, 200)).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
