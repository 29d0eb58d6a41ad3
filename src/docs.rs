//! Documentation generation and question answering over an indexed
//! repository.
//!
//! Both features are retrieval-augmented: relevant chunks are pulled from
//! the vector store and handed to the chat model as context. Generation
//! asks for a fixed set of sections in JSON mode so the response parses
//! into a stable structure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::llm::completion::CompletionClient;
use crate::models::{AskResponse, FileEntry, SourceRef};
use crate::retrieval::Retriever;

/// Section ids and titles generated for every repository, in render order.
const SECTIONS: &[(&str, &str)] = &[
    ("overview", "Overview"),
    ("getting-started", "Getting Started"),
    ("architecture", "Architecture"),
    ("core-concepts", "Core Concepts"),
    ("api-reference", "API Reference"),
    ("configuration", "Configuration"),
    ("examples", "Examples"),
    ("testing", "Testing"),
    ("deployment", "Deployment"),
    ("faq", "FAQ"),
];

/// Number of chunks retrieved as context for doc generation.
const DOC_CONTEXT_RESULTS: usize = 15;
/// Number of chunks retrieved as context for a question.
const ASK_CONTEXT_RESULTS: usize = 8;
/// Chunks actually quoted in a prompt, after ranking.
const PROMPT_CHUNKS: usize = 10;
/// Per-chunk character cap in prompts.
const PROMPT_CHUNK_CHARS: usize = 400;
/// Sources cited back to the caller per answer.
const CITED_SOURCES: usize = 5;
/// Character cap on file content sent for single-file explanation.
const FILE_DOC_CHARS: usize = 6000;

/// One rendered documentation section.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// A node in the repository file tree. Folders carry children, files do not.
#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

/// Aggregate facts about the indexed repository.
#[derive(Debug, Clone, Serialize)]
pub struct DocMetadata {
    pub file_count: usize,
    pub primary_language: String,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
}

/// Everything the docs endpoint returns for one repository.
#[derive(Debug, Clone, Serialize)]
pub struct DocsData {
    pub repo_id: String,
    pub sections: Vec<Section>,
    pub file_tree: Vec<FileNode>,
    pub metadata: DocMetadata,
}

/// Generated explanation of a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileDoc {
    pub repo_id: String,
    pub path: String,
    pub summary: String,
}

/// Generates documentation and answers questions using retrieved context.
pub struct DocGenerator {
    retriever: Arc<Retriever>,
    completion: Arc<CompletionClient>,
}

impl DocGenerator {
    pub fn new(retriever: Arc<Retriever>, completion: Arc<CompletionClient>) -> Self {
        Self {
            retriever,
            completion,
        }
    }

    /// Builds the full docs payload for `repo_id`.
    ///
    /// A repository with no indexed chunks yields placeholder sections and
    /// an empty tree rather than an error, so the endpoint stays usable
    /// before indexing completes.
    pub async fn generate(&self, repo_id: &str) -> Result<DocsData, PipelineError> {
        let files = self.retriever.list_files(repo_id).await?;
        let metadata = gather_metadata(&files);
        let file_tree = build_file_tree(&files);
        if files.is_empty() {
            warn!(repo_id, "no indexed files, emitting placeholder docs");
            return Ok(DocsData {
                repo_id: repo_id.to_string(),
                sections: placeholder_sections(),
                file_tree,
                metadata,
            });
        }

        let hits = self
            .retriever
            .query_repository(
                repo_id,
                "What is the main purpose, structure, and functionality of this repository?",
                DOC_CONTEXT_RESULTS,
                None,
            )
            .await?;
        let context = render_context(
            hits.iter()
                .map(|h| (chunk_label(&h.metadata), h.document.as_str())),
        );

        let section_list: Vec<String> = SECTIONS
            .iter()
            .map(|(id, title)| format!("\"{id}\" ({title})"))
            .collect();
        let system = format!(
            "You are a technical writer producing documentation for a software \
             repository. Respond with a single JSON object whose keys are \
             exactly: {}. Each value is the section body in Markdown.",
            section_list.join(", ")
        );
        let user = format!(
            "Repository: {repo_id}\nPrimary language: {}\nFiles indexed: {}\n\n\
             Relevant source excerpts:\n{context}",
            metadata.primary_language, metadata.file_count
        );
        let body = self.completion.complete_json(&system, &user).await?;
        let sections = sections_from_json(&body);
        info!(repo_id, sections = sections.len(), "documentation generated");

        Ok(DocsData {
            repo_id: repo_id.to_string(),
            sections,
            file_tree,
            metadata,
        })
    }

    /// Explains a single file based on its reconstructed content.
    pub async fn generate_file_docs(
        &self,
        repo_id: &str,
        path: &str,
    ) -> Result<FileDoc, PipelineError> {
        let content = self.retriever.reconstruct_file(repo_id, path).await?;
        if content.is_empty() {
            return Ok(FileDoc {
                repo_id: repo_id.to_string(),
                path: path.to_string(),
                summary: "This file is not in the index.".to_string(),
            });
        }
        let mut end = content.len().min(FILE_DOC_CHARS);
        while end < content.len() && !content.is_char_boundary(end) {
            end += 1;
        }
        let system = "You explain one source file from a software repository. \
                      Describe its purpose, its main definitions, and how it \
                      fits into the project, in Markdown.";
        let user = format!("File: {path}\n\n```\n{}\n```", &content[..end]);
        let summary = self.completion.complete(system, &user).await?;
        Ok(FileDoc {
            repo_id: repo_id.to_string(),
            path: path.to_string(),
            summary,
        })
    }

    /// Answers a free-form question about the repository, citing sources.
    pub async fn answer_question(
        &self,
        repo_id: &str,
        question: &str,
    ) -> Result<AskResponse, PipelineError> {
        let hits = self
            .retriever
            .query_repository(repo_id, question, ASK_CONTEXT_RESULTS, None)
            .await?;
        if hits.is_empty() {
            return Ok(AskResponse {
                question: question.to_string(),
                answer: "This repository has no indexed content yet. Index it first, then ask again."
                    .to_string(),
                sources: Vec::new(),
            });
        }
        let context = render_context(
            hits.iter()
                .map(|h| (chunk_label(&h.metadata), h.document.as_str())),
        );
        let system = "You answer questions about a software repository using only \
                      the provided source excerpts. If the excerpts do not contain \
                      the answer, say so plainly.";
        let user = format!("Question: {question}\n\nSource excerpts:\n{context}");
        let answer = self.completion.complete(system, &user).await?;

        let sources = hits
            .iter()
            .take(CITED_SOURCES)
            .map(|h| SourceRef {
                file_path: chunk_label(&h.metadata),
                chunk_id: h.id.clone(),
                similarity: h.similarity,
            })
            .collect();
        Ok(AskResponse {
            question: question.to_string(),
            answer,
            sources,
        })
    }
}

fn placeholder_sections() -> Vec<Section> {
    SECTIONS
        .iter()
        .map(|(id, title)| Section {
            id: (*id).to_string(),
            title: (*title).to_string(),
            content: "This repository has not been indexed yet.".to_string(),
        })
        .collect()
}

fn sections_from_json(body: &Value) -> Vec<Section> {
    SECTIONS
        .iter()
        .map(|(id, title)| {
            let content = body
                .get(id)
                .and_then(Value::as_str)
                .unwrap_or("No content generated for this section.")
                .to_string();
            Section {
                id: (*id).to_string(),
                title: (*title).to_string(),
                content,
            }
        })
        .collect()
}

fn chunk_label(metadata: &Value) -> String {
    metadata
        .get("file_path")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn render_context<'a>(chunks: impl Iterator<Item = (String, &'a str)>) -> String {
    let mut out = String::new();
    for (label, text) in chunks.take(PROMPT_CHUNKS) {
        let mut end = text.len().min(PROMPT_CHUNK_CHARS);
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        out.push_str(&format!("--- {label} ---\n{}\n\n", &text[..end]));
    }
    out
}

/// Builds a nested tree from flat file paths. Folders sort before files,
/// then alphabetically.
pub fn build_file_tree(files: &[FileEntry]) -> Vec<FileNode> {
    let mut roots: Vec<FileNode> = Vec::new();
    for file in files {
        insert_path(&mut roots, &file.file_path, "");
    }
    sort_tree(&mut roots);
    roots
}

fn insert_path(nodes: &mut Vec<FileNode>, remainder: &str, prefix: &str) {
    let (head, rest) = match remainder.split_once('/') {
        Some((h, r)) => (h, Some(r)),
        None => (remainder, None),
    };
    if head.is_empty() {
        return;
    }
    let path = if prefix.is_empty() {
        head.to_string()
    } else {
        format!("{prefix}/{head}")
    };
    match rest {
        None => {
            if !nodes.iter().any(|n| n.node_type == "file" && n.name == head) {
                nodes.push(FileNode {
                    name: head.to_string(),
                    path,
                    node_type: "file".to_string(),
                    children: Vec::new(),
                });
            }
        }
        Some(rest) => {
            let pos = nodes
                .iter()
                .position(|n| n.node_type == "folder" && n.name == head);
            let idx = match pos {
                Some(i) => i,
                None => {
                    nodes.push(FileNode {
                        name: head.to_string(),
                        path: path.clone(),
                        node_type: "folder".to_string(),
                        children: Vec::new(),
                    });
                    nodes.len() - 1
                }
            };
            insert_path(&mut nodes[idx].children, rest, &path);
        }
    }
}

fn sort_tree(nodes: &mut [FileNode]) {
    nodes.sort_by(|a, b| {
        (a.node_type != "folder")
            .cmp(&(b.node_type != "folder"))
            .then_with(|| a.name.cmp(&b.name))
    });
    for node in nodes {
        sort_tree(&mut node.children);
    }
}

/// Derives summary metadata from the indexed file list. The primary
/// language is the most common one, ties broken alphabetically.
pub fn gather_metadata(files: &[FileEntry]) -> DocMetadata {
    use std::collections::BTreeMap;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        if !file.language.is_empty() && file.language != "Unknown" {
            *counts.entry(file.language.as_str()).or_default() += 1;
        }
    }
    let primary_language = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(lang, _)| (*lang).to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let languages = counts.keys().map(|l| (*l).to_string()).collect();

    let mut frameworks = Vec::new();
    for file in files {
        let marker = match file.file_name.as_str() {
            "Cargo.toml" => Some("Cargo"),
            "package.json" => Some("Node.js"),
            "pyproject.toml" | "requirements.txt" => Some("Python packaging"),
            "go.mod" => Some("Go modules"),
            "pom.xml" => Some("Maven"),
            "Gemfile" => Some("Bundler"),
            _ => None,
        };
        if let Some(m) = marker {
            if !frameworks.iter().any(|f| f == m) {
                frameworks.push(m.to_string());
            }
        }
    }
    frameworks.sort();

    DocMetadata {
        file_count: files.len(),
        primary_language,
        languages,
        frameworks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, language: &str) -> FileEntry {
        let name = path.rsplit('/').next().unwrap().to_string();
        FileEntry {
            file_path: path.to_string(),
            file_name: name,
            language: language.to_string(),
            extension: String::new(),
        }
    }

    #[test]
    fn file_tree_nests_and_orders_folders_first() {
        let files = vec![
            entry("README.md", "Markdown"),
            entry("src/main.rs", "Rust"),
            entry("src/util/strings.rs", "Rust"),
            entry("src/lib.rs", "Rust"),
        ];
        let tree = build_file_tree(&files);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "src");
        assert_eq!(tree[0].node_type, "folder");
        assert_eq!(tree[1].name, "README.md");

        let src = &tree[0].children;
        assert_eq!(src[0].name, "util");
        assert_eq!(src[1].name, "lib.rs");
        assert_eq!(src[2].name, "main.rs");
        assert_eq!(src[2].path, "src/main.rs");
    }

    #[test]
    fn metadata_picks_majority_language() {
        let files = vec![
            entry("a.rs", "Rust"),
            entry("b.rs", "Rust"),
            entry("c.py", "Python"),
            entry("Cargo.toml", "TOML"),
        ];
        let meta = gather_metadata(&files);
        assert_eq!(meta.primary_language, "Rust");
        assert_eq!(meta.file_count, 4);
        assert_eq!(meta.frameworks, vec!["Cargo"]);
        assert!(meta.languages.contains(&"Python".to_string()));
    }

    #[test]
    fn metadata_of_empty_repo_is_unknown() {
        let meta = gather_metadata(&[]);
        assert_eq!(meta.primary_language, "Unknown");
        assert!(meta.languages.is_empty());
        assert!(meta.frameworks.is_empty());
    }

    #[test]
    fn sections_fill_missing_keys_with_fallback() {
        let body = serde_json::json!({"overview": "An overview."});
        let sections = sections_from_json(&body);
        assert_eq!(sections.len(), SECTIONS.len());
        assert_eq!(sections[0].content, "An overview.");
        assert_eq!(sections[1].content, "No content generated for this section.");
    }
}
