//! Repository ingestion: clone a git repository and load its text files.
//!
//! Cloning happens into a temporary directory that is removed when the
//! returned records have been collected. Only files with a known text
//! extension are loaded; binary and vendored content is skipped.

use std::path::Path;

use git2::build::RepoBuilder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::models::{FileMetadata, FileRecord};

/// Extensions considered indexable documentation or source text.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdx", "py", "rs", "js", "jsx", "ts", "tsx", "go", "rb", "java", "json",
    "yaml", "yml", "toml", "txt", "rst",
];

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "venv",
    ".venv",
    "__pycache__",
    ".idea",
    ".vscode",
];

/// Files larger than this are skipped outright.
const MAX_FILE_BYTES: u64 = 1_000_000;

/// Derives a stable repository identifier from a clone URL.
///
/// The final path segment (minus a trailing `.git`) is lowercased and any
/// character outside `[a-z0-9_-]` becomes `-`. A URL with no path segment
/// after the host (or an empty result) is an error so downstream
/// collection names stay well formed.
pub fn repo_id_from_url(url: &str) -> Result<String, PipelineError> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let Some((_, segment)) = without_scheme.rsplit_once('/') else {
        return Err(PipelineError::Ingest(format!(
            "url {url:?} has no repository path"
        )));
    };
    let segment = segment.trim_end_matches(".git");
    let id: String = segment
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        return Err(PipelineError::Ingest(format!(
            "cannot derive repository id from url {url:?}"
        )));
    }
    Ok(id)
}

/// Clones `url` into a temporary directory and loads every indexable file.
///
/// This does blocking filesystem and network work and is meant to be run
/// via `tokio::task::spawn_blocking`.
pub fn clone_and_load(url: &str) -> Result<Vec<FileRecord>, PipelineError> {
    let tmp = tempfile::tempdir()
        .map_err(|e| PipelineError::Ingest(format!("failed to create temp dir: {e}")))?;
    info!(url, path = %tmp.path().display(), "cloning repository");
    RepoBuilder::new()
        .clone(url, tmp.path())
        .map_err(|e| PipelineError::Ingest(format!("clone of {url} failed: {e}")))?;
    let files = load_files(tmp.path());
    info!(url, files = files.len(), "repository loaded");
    Ok(files)
}

/// Walks `root` and loads every allowed text file as a [`FileRecord`].
///
/// Paths are recorded relative to `root` with `/` separators so the same
/// repository produces identical chunk ids on every platform.
pub fn load_files(root: &Path) -> Vec<FileRecord> {
    let mut records = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            return !SKIP_DIRS.contains(&name.as_ref());
        }
        true
    });
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_lowercase(),
            None => continue,
        };
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() > MAX_FILE_BYTES {
                debug!(path = %path.display(), bytes = meta.len(), "skipping oversized file");
                continue;
            }
        }
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let metadata = build_metadata(&rel, &ext, &content);
        records.push(FileRecord {
            source_path: rel,
            content,
            metadata,
        });
    }
    records.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    records
}

fn build_metadata(rel_path: &str, ext: &str, content: &str) -> FileMetadata {
    let (directory, file_name) = match rel_path.rsplit_once('/') {
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => (String::new(), rel_path.to_string()),
    };
    FileMetadata {
        file_name,
        extension: format!(".{ext}"),
        directory,
        line_count: content.lines().count(),
        char_count: content.chars().count(),
        language: language_for_extension(ext).to_string(),
    }
}

/// Maps a file extension to a display language name.
pub fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "md" | "markdown" | "mdx" => "Markdown",
        "py" => "Python",
        "rs" => "Rust",
        "js" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "rb" => "Ruby",
        "java" => "Java",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "rst" => "reStructuredText",
        "txt" => "Plain Text",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn repo_id_strips_git_suffix_and_lowercases() {
        let id = repo_id_from_url("https://github.com/Acme/My-Repo.git").unwrap();
        assert_eq!(id, "my-repo");
    }

    #[test]
    fn repo_id_handles_trailing_slash() {
        let id = repo_id_from_url("https://github.com/acme/tools/").unwrap();
        assert_eq!(id, "tools");
    }

    #[test]
    fn repo_id_sanitizes_odd_characters() {
        let id = repo_id_from_url("https://example.com/weird%20name").unwrap();
        assert_eq!(id, "weird-20name");
    }

    #[test]
    fn repo_id_rejects_host_only_url() {
        assert!(repo_id_from_url("https://example.com").is_err());
        assert!(repo_id_from_url("https://example.com///").is_err());
    }

    #[test]
    fn repo_id_rejects_empty_segment() {
        assert!(repo_id_from_url("///").is_err());
        assert!(repo_id_from_url("https://example.com/.git").is_err());
    }

    #[test]
    fn load_files_skips_vendored_and_binary_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "# hello\n").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/pkg.js"), "x").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let records = load_files(dir.path());
        let paths: Vec<&str> = records.iter().map(|r| r.source_path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
    }

    #[test]
    fn metadata_captures_language_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/guide.md"), "line one\nline two\n").unwrap();

        let records = load_files(dir.path());
        assert_eq!(records.len(), 1);
        let meta = &records[0].metadata;
        assert_eq!(meta.file_name, "guide.md");
        assert_eq!(meta.directory, "docs");
        assert_eq!(meta.extension, ".md");
        assert_eq!(meta.language, "Markdown");
        assert_eq!(meta.line_count, 2);
    }
}
