//! Route handlers

use super::{docs, error::ErrorBody, AppState};
use crate::{
    config::SUPPORTED_FORMAT_NAMES,
    error::{BgRemovalError, Result},
    processor::BackgroundRemovalProcessor,
    services::{OutputFormatHandler, UploadMeta},
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{info, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Service name reported by the metadata endpoint
pub const SERVICE_NAME: &str = "AI Background Removal API";

pub const REMOVE_BACKGROUND_PATH: &str = "/api/remove-bg";
pub const HEALTH_PATH: &str = "/health";

/// Multipart field name used when no field carries a filename
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    #[schema(value_type = Vec<String>)]
    pub supported_formats: &'static [&'static str],
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Endpoints {
    pub remove_background: &'static str,
    pub health: &'static str,
    /// Swagger UI
    pub documentation: &'static str,
    pub redoc: &'static str,
    pub openapi: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
}

/// Multipart form accepted by `POST /api/remove-bg`
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    /// Image to process (JPEG, PNG, GIF, BMP, TIFF, WebP, ICO, ...)
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Service metadata
#[utoipa::path(
    get,
    path = "/",
    tag = "service",
    responses((status = 200, description = "Service name, version and endpoints", body = ServiceInfo))
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        supported_formats: SUPPORTED_FORMAT_NAMES,
        endpoints: Endpoints {
            remove_background: REMOVE_BACKGROUND_PATH,
            health: HEALTH_PATH,
            documentation: docs::DOCS_PATH,
            redoc: docs::REDOC_PATH,
            openapi: docs::OPENAPI_PATH,
        },
    })
}

/// Liveness and model readiness
#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses((status = 200, description = "Service is up; `model_loaded` tells whether uploads can be served", body = HealthStatus))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        model_loaded: state.lifecycle.is_ready(),
    })
}

/// Remove the background from an uploaded image
///
/// Reads one file from the multipart form, validates it, removes the
/// background on a blocking thread and returns the encoded image.
#[utoipa::path(
    post,
    path = "/api/remove-bg",
    tag = "background-removal",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image with a transparent background, sent as an attachment named `nobg_<stem>.png`"),
        (status = 400, description = "Empty, oversized or unsupported upload, or a malformed form", body = ErrorBody),
        (status = 500, description = "The image could not be processed", body = ErrorBody),
        (status = 503, description = "Model is not loaded", body = ErrorBody)
    )
)]
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("remove_background", %request_id);
    remove_background_inner(state, multipart)
        .instrument(span)
        .await
}

async fn remove_background_inner(
    state: AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let session = state.lifecycle.session()?;
    let mut multipart = multipart.map_err(|rejection| {
        BgRemovalError::bad_request(format!(
            "Invalid multipart request: {}",
            rejection.body_text()
        ))
    })?;

    let (meta, bytes) = read_upload(&mut multipart, state.validator.max_upload_bytes()).await?;
    info!(
        filename = meta.filename.as_deref().unwrap_or("<none>"),
        content_type = meta.content_type.as_deref().unwrap_or("<none>"),
        bytes = bytes.len(),
        "Received upload"
    );

    state.validator.validate(&meta, bytes.len() as u64)?;

    let format = state.config.output_format;
    let processor = BackgroundRemovalProcessor::new(session, state.config.normalize_mask);
    let result = tokio::task::spawn_blocking(move || processor.process_upload(&bytes, format))
        .await
        .map_err(|e| {
            if e.is_panic() {
                BgRemovalError::internal("Background removal worker panicked")
            } else {
                BgRemovalError::internal(format!("Background removal worker failed: {e}"))
            }
        })??;

    let filename = OutputFormatHandler::output_filename(meta.filename.as_deref(), format);
    info!(
        output = %filename,
        width = result.dimensions.0,
        height = result.dimensions.1,
        total_ms = result.timings.total_ms,
        "Processed upload"
    );

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                OutputFormatHandler::content_type(format).to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                OutputFormatHandler::content_disposition(&filename),
            ),
        ],
        result.data,
    )
        .into_response())
}

/// Find the upload field and read it, stopping once it exceeds `max_bytes`
async fn read_upload(multipart: &mut Multipart, max_bytes: u64) -> Result<(UploadMeta, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.file_name().is_none() && field.name() != Some(FILE_FIELD) {
            continue;
        }

        let meta = UploadMeta::new(
            field.content_type().map(str::to_string),
            field.file_name().map(str::to_string),
        );
        let bytes = read_field_capped(field, max_bytes).await?;
        return Ok((meta, bytes));
    }

    Err(BgRemovalError::bad_request(
        "No file uploaded. Send the image in a multipart field named 'file'",
    ))
}

/// Read a field chunk by chunk, keeping at most `max_bytes + 1` bytes
///
/// One byte past the limit is enough for the validator to reject the upload.
async fn read_field_capped(mut field: Field<'_>, max_bytes: u64) -> Result<Vec<u8>> {
    let cap = usize::try_from(max_bytes.saturating_add(1)).unwrap_or(usize::MAX);
    let mut data = Vec::new();

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        append_capped(&mut data, &chunk, cap);
        if data.len() >= cap {
            break;
        }
    }

    Ok(data)
}

fn append_capped(data: &mut Vec<u8>, chunk: &Bytes, cap: usize) {
    let remaining = cap.saturating_sub(data.len());
    let take = remaining.min(chunk.len());
    data.extend_from_slice(chunk.get(..take).unwrap_or_default());
}

fn multipart_error(error: MultipartError, max_bytes: u64) -> BgRemovalError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // The body limit only trips well past the upload limit
        BgRemovalError::payload_too_large(max_bytes)
    } else {
        BgRemovalError::bad_request(format!("Invalid multipart request: {}", error.body_text()))
    }
}
