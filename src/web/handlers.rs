//! Route handlers

use crate::{
    error::BgRemovalError,
    mode::ProcessingMode,
    services::ImageIOService,
    web::{
        error::{JsonError, WebError},
        storage::{content_type_for, StorageLayout},
        upload::{output_file_name, secure_filename, UploadForm, INVALID_NAME_MESSAGE, NO_FILE_MESSAGE},
        views, AppState,
    },
};
use axum::{
    extract::{Multipart, Path as RoutePath, Query, State},
    http::header,
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info as trace_info, instrument};

#[derive(Debug, Deserialize)]
pub struct ResultManualQuery {
    image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManualSaveResponse {
    pub success: bool,
    pub output_path: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
    backend: &'static str,
    cached_sessions: usize,
    modes: Vec<&'static str>,
}

pub async fn index() -> Html<String> {
    Html(views::index())
}

pub async fn manual_editor() -> Html<String> {
    Html(views::manual_editor(None))
}

/// Upload an image and remove its background with the selected mode
#[instrument(skip(state, multipart), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn remove(State(state): State<AppState>, multipart: Multipart) -> Result<Html<String>, WebError> {
    let mut form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let upload = form.validated_image()?;
    let mode = parse_mode(form.mode.as_deref())?;
    let filename = secure_filename(&upload.file_name).ok_or_else(|| WebError::bad_request(INVALID_NAME_MESSAGE))?;
    let output_name = output_file_name(&filename);

    let input_path = state.storage.input_dir().join(&filename);
    let output_path = state.storage.output_dir().join(&output_name);
    save_upload(&input_path, &upload.data).await?;

    state.ensure_models(mode).await?;

    let processor = Arc::clone(&state.processor);
    let written = tokio::task::spawn_blocking(move || processor.process_file(&input_path, &output_path, mode))
        .await
        .map_err(|e| WebError::internal(format!("Processing task failed: {e}")))??;

    trace_info!(
        filename = %filename,
        mode = %mode,
        output = %written.display(),
        "Upload processed"
    );

    Ok(Html(views::result(
        &format!("uploads/input/{filename}"),
        &format!("uploads/output/{output_name}"),
    )))
}

/// Upload an image and open it in the manual editor
#[instrument(skip(state, multipart), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn upload_for_manual(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Html<String>, WebError> {
    let mut form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let upload = form.validated_image()?;
    let filename = secure_filename(&upload.file_name).ok_or_else(|| WebError::bad_request(INVALID_NAME_MESSAGE))?;

    save_upload(&state.storage.input_dir().join(&filename), &upload.data).await?;
    trace_info!(filename = %filename, "Upload opened in manual editor");

    Ok(Html(views::manual_editor(Some(&format!("/static/uploads/input/{filename}")))))
}

/// Store a manually edited image as a timestamped PNG
#[instrument(skip(state, multipart), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn save_manual_edit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ManualSaveResponse>, JsonError> {
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let upload = form.image.ok_or_else(|| JsonError::bad_request(NO_FILE_MESSAGE))?;

    let filename = format!("manual_edit_{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let path = state.storage.manual_dir().join(&filename);

    tokio::task::spawn_blocking(move || -> crate::Result<()> {
        let image = ImageIOService::load_from_bytes(&upload.data)?;
        ImageIOService::save_png(&image.to_rgba8(), &path)
    })
    .await
    .map_err(|e| JsonError::internal(format!("Save task failed: {e}")))??;

    trace_info!(filename = %filename, "Manual edit saved");
    Ok(Json(ManualSaveResponse {
        success: true,
        output_path: format!("uploads/manual/{filename}"),
    }))
}

pub async fn result_manual(Query(query): Query<ResultManualQuery>) -> Html<String> {
    Html(views::result_manual(query.image.as_deref().unwrap_or_default()))
}

/// Files under the uploads folder
pub async fn uploaded_file(State(state): State<AppState>, RoutePath(path): RoutePath<String>) -> Result<Response, WebError> {
    serve_file(&state.storage.uploads_dir(), &path).await
}

/// Files under the static root
pub async fn static_file(State(state): State<AppState>, RoutePath(path): RoutePath<String>) -> Result<Response, WebError> {
    serve_file(state.storage.static_dir(), &path).await
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "Available",
        backend: state.processor.backend_name(),
        cached_sessions: state.processor.session_stats().total_sessions,
        modes: ProcessingMode::ALL.iter().map(|mode| mode.as_str()).collect(),
    })
}

fn parse_mode(raw: Option<&str>) -> Result<ProcessingMode, WebError> {
    raw.map_or(Ok(ProcessingMode::Best), |value| {
        value.parse().map_err(|e: BgRemovalError| WebError::bad_request(e.to_string()))
    })
}

async fn save_upload(path: &Path, data: &[u8]) -> Result<(), WebError> {
    tokio::fs::write(path, data)
        .await
        .map_err(|e| BgRemovalError::file_io_error("save upload", path, &e).into())
}

async fn serve_file(root: &Path, relative: &str) -> Result<Response, WebError> {
    let path = StorageLayout::resolve_under(root, relative).ok_or(WebError::NotFound)?;
    let is_file = tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_file());
    if !is_file {
        return Err(WebError::NotFound);
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| WebError::internal(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&path))], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode_defaults_to_best() {
        assert_eq!(parse_mode(None).unwrap(), ProcessingMode::Best);
        assert_eq!(parse_mode(Some("fast")).unwrap(), ProcessingMode::Fast);

        let err = parse_mode(Some("ultra")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("best, portrait, fast, advanced"));
    }

    #[tokio::test]
    async fn test_serve_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.png"), b"png").unwrap();

        let response = serve_file(temp_dir.path(), "a.png").await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        assert!(matches!(serve_file(temp_dir.path(), "missing.png").await, Err(WebError::NotFound)));
        assert!(matches!(serve_file(temp_dir.path(), "../a.png").await, Err(WebError::NotFound)));
    }
}
