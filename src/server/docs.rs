//! OpenAPI document and interactive documentation pages
//!
//! The document is generated at compile time from the handler annotations.
//! Both pages are static HTML that load their viewer from a CDN and read
//! `/openapi.json`.

use super::{error::ErrorBody, handlers};
use axum::response::{Html, Json};
use utoipa::OpenApi;

pub const DOCS_PATH: &str = "/docs";
pub const REDOC_PATH: &str = "/redoc";
pub const OPENAPI_PATH: &str = "/openapi.json";

const SWAGGER_UI_HTML: &str = include_str!("../../templates/swagger-ui.html");
const REDOC_HTML: &str = include_str!("../../templates/redoc.html");

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AI Background Removal API",
        description = "Removes image backgrounds with a pretrained U²-Net family segmentation model"
    ),
    paths(handlers::root, handlers::health, handlers::remove_background),
    components(schemas(
        handlers::ServiceInfo,
        handlers::Endpoints,
        handlers::HealthStatus,
        handlers::UploadForm,
        ErrorBody,
    )),
    tags(
        (name = "service", description = "Service metadata and health"),
        (name = "background-removal", description = "Background removal")
    )
)]
pub struct ApiDoc;

/// `GET /openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// `GET /docs`
pub async fn swagger_ui() -> Html<&'static str> {
    Html(SWAGGER_UI_HTML)
}

/// `GET /redoc`
pub async fn redoc() -> Html<&'static str> {
    Html(REDOC_HTML)
}
