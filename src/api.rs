//! HTTP surface: route table and request handlers.
//!
//! Handlers stay thin. They validate input, call into the pipeline, and
//! map [`PipelineError`] onto status codes. Everything stateful lives in
//! [`AppState`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::error::PipelineError;
use crate::ingest;
use crate::models::{
    AskRequest, AskResponse, IndexReport, IndexRequest, SearchRequest, SearchResponse,
};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Builds the application router. CORS is permissive so a browser-based
/// frontend on another origin can call the API directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/repos/index", post(index_repo))
        .route("/api/search", post(search))
        .route("/api/repos/ask", post(ask))
        .route("/api/repos/{repo_id}/docs", get(repo_docs))
        .route("/api/repos/{repo_id}/files", get(repo_files))
        .route("/api/repos/{repo_id}/file", get(repo_file))
        .route("/api/repos/{repo_id}/file/docs", get(repo_file_docs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "service": "repodocs", "status": "ok" }))
}

/// Clones the repository, chunks and embeds its files, and upserts them
/// into the per-repository collection.
async fn index_repo(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> ApiResult<IndexReport> {
    let url = req.repo_url.trim().to_string();
    if url.is_empty() {
        return Err(bad_request("repo_url must not be empty"));
    }
    let repo_id = ingest::repo_id_from_url(&url).map_err(pipeline_error)?;
    let files = tokio::task::spawn_blocking(move || ingest::clone_and_load(&url))
        .await
        .map_err(|e| {
            error!(error = %e, "ingest task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "repository ingestion failed".to_string(),
            )
        })?
        .map_err(pipeline_error)?;
    let params = state.config.chunk_params().map_err(pipeline_error)?;
    let report = state
        .indexer
        .index(&repo_id, &files, params)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(report))
}

/// Semantic search over one repository's indexed chunks.
async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    if req.repo_id.trim().is_empty() {
        return Err(bad_request("repo_id must not be empty"));
    }
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let n_results = if req.n_results == 0 {
        state.config.n_results
    } else {
        req.n_results
    };
    let results = state
        .retriever
        .query_repository(&req.repo_id, &req.query, n_results, req.filter.as_ref())
        .await
        .map_err(pipeline_error)?;
    Ok(Json(SearchResponse {
        query: req.query,
        results,
    }))
}

/// Retrieval-augmented question answering over one repository.
async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> ApiResult<AskResponse> {
    if req.repo_id.trim().is_empty() {
        return Err(bad_request("repo_id must not be empty"));
    }
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let response = state
        .docs
        .answer_question(&req.repo_id, &req.question)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(response))
}

async fn repo_docs(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> ApiResult<crate::docs::DocsData> {
    let docs = state.docs.generate(&repo_id).await.map_err(pipeline_error)?;
    Ok(Json(docs))
}

async fn repo_files(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> ApiResult<Value> {
    let files = state
        .retriever
        .list_files(&repo_id)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(json!({ "repo_id": repo_id, "files": files })))
}

#[derive(Deserialize)]
struct FileQuery {
    path: String,
}

/// Reassembles one file's original content from its stored chunks.
async fn repo_file(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Value> {
    if query.path.trim().is_empty() {
        return Err(bad_request("path must not be empty"));
    }
    let content = state
        .retriever
        .reconstruct_file(&repo_id, &query.path)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(json!({
        "repo_id": repo_id,
        "path": query.path,
        "content": content,
    })))
}

/// Generates a Markdown explanation of one indexed file.
async fn repo_file_docs(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Query(query): Query<FileQuery>,
) -> ApiResult<crate::docs::FileDoc> {
    if query.path.trim().is_empty() {
        return Err(bad_request("path must not be empty"));
    }
    let doc = state
        .docs
        .generate_file_docs(&repo_id, &query.path)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(doc))
}

fn bad_request(msg: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.to_string())
}

fn pipeline_error(err: PipelineError) -> (StatusCode, String) {
    let status = match &err {
        PipelineError::Configuration(_) => StatusCode::BAD_REQUEST,
        PipelineError::Ingest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(error = %err, "request failed");
    (status, err.to_string())
}
