//! `POST /upload-pdf` and `POST /process-webpages`: both feed the
//! ingestion orchestrator and return the same `{status, details}` shape.
//!
//! Multipart parsing and `infer`-based content sniffing follow the same
//! pattern the other upload surfaces in this crate use; the response
//! shape carries a per-file outcome list rather than a single-document
//! summary.

use std::sync::Arc;

use axum::{extract::Multipart, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::domain::Page;
use crate::error::{CoreError, Result};
use crate::ingestion::FileInput;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestDetails {
    pub files_processed: usize,
    pub total_chunks: usize,
    pub filenames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub details: IngestDetails,
}

/// Builds the response: 200 when at least one file succeeded, else a
/// fatal response.
fn summarize(outcomes: Vec<crate::ingestion::FileOutcome>) -> (StatusCode, Json<IngestResponse>) {
    let total_chunks: usize = outcomes.iter().map(|o| o.chunks_added).sum();
    let files_processed = outcomes.iter().filter(|o| o.error.is_none()).count();
    let filenames = outcomes.iter().map(|o| o.source.clone()).collect();
    let all_failed = files_processed == 0 && !outcomes.is_empty();

    let status = if all_failed { StatusCode::UNPROCESSABLE_ENTITY } else { StatusCode::OK };

    (
        status,
        Json(IngestResponse {
            status: if all_failed { "failed".to_string() } else { "ok".to_string() },
            details: IngestDetails {
                files_processed,
                total_chunks,
                filenames,
            },
        }),
    )
}

/// `POST /upload-pdf`. Accepts one or more files under the multipart field
/// `files`; every field with that name is sniffed, loaded, chunked,
/// embedded and stored through the ingestion orchestrator, one outcome per
/// file.
pub async fn upload_pdf_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| CoreError::BadRequest("multipart file field is missing a filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| CoreError::BadRequest(format!("failed to read file bytes: {e}")))?;

        validate_content_matches_extension(&filename, &bytes)?;

        files.push(FileInput {
            source: filename,
            bytes: bytes.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(CoreError::BadRequest("no files were provided under the `files` field".to_string()));
    }

    let outcomes = state.ingestion.ingest_batch(files).await;
    Ok(summarize(outcomes))
}

#[derive(Debug, Deserialize)]
pub struct ProcessWebpagesRequest {
    pub urls: Vec<String>,
}

/// `POST /process-webpages`. Fetches each URL, strips markup down to
/// visible body text (`document::extract_webpage_text`, shared with the
/// `.html` branch of the upload loader), and runs the result through the
/// same chunk/embed/store pipeline as an uploaded document.
pub async fn process_webpages_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessWebpagesRequest>,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    if req.urls.is_empty() {
        return Err(CoreError::BadRequest("no urls were provided".to_string()));
    }

    let mut docs = Vec::with_capacity(req.urls.len());
    for url in req.urls {
        let page = fetch_webpage_page(&state.http_client, &url).await;
        docs.push((url, vec![page]));
    }

    let outcomes = state.ingestion.ingest_pages(docs).await;
    Ok(summarize(outcomes))
}

/// Magic-number sniffing for the two formats `infer` can reliably
/// recognize; `.txt`/`.md`/`.html` have no consistent signature bytes so
/// extension dispatch is trusted for them (the loader rejects anything
/// else at the format-dispatch stage anyway).
fn validate_content_matches_extension(filename: &str, bytes: &[u8]) -> Result<()> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let Some(kind) = infer::get(bytes) else {
        return Ok(());
    };

    let matches_claim = match ext.as_str() {
        "pdf" => kind.extension() == "pdf",
        "docx" => matches!(kind.extension(), "docx" | "zip"),
        _ => true,
    };

    if !matches_claim {
        return Err(CoreError::BadRequest(format!(
            "{filename}: content looks like {} (detected via magic bytes), not .{ext}",
            kind.extension()
        )));
    }

    Ok(())
}

async fn fetch_webpage_page(client: &reqwest::Client, url: &str) -> Page {
    let text = match client.get(url).send().await {
        Ok(response) => match response.text().await {
            Ok(html) => crate::document::loader::extract_webpage_text(&html),
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to read webpage body");
                String::new()
            }
        },
        Err(e) => {
            tracing::warn!(url, error = %e, "failed to fetch webpage");
            String::new()
        }
    };

    Page {
        source: url.to_string(),
        page_index: 0,
        total_pages: 1,
        text,
    }
}
