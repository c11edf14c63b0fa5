//! Shared helpers for HTTP-level tests
//!
//! Builds a ready application around a mock backend, hand-writes multipart
//! bodies and decodes JSON or image responses.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use bgremove_api::{
    backends::MockBackend,
    lifecycle::{LifecycleController, ModelLoader},
    server::{self, AppState},
    BgRemovalError, InferenceBackend, Result, ServiceConfig,
};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

pub const BOUNDARY: &str = "bgremove-test-boundary";
pub const UPLOAD_PATH: &str = "/api/remove-bg";

/// Loader that hands out a prepared backend
pub struct StaticLoader(pub Arc<dyn InferenceBackend>);

#[async_trait]
impl ModelLoader for StaticLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceBackend>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Loader that always fails, as a missing model file would
pub struct FailingLoader;

#[async_trait]
impl ModelLoader for FailingLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceBackend>> {
        Err(BgRemovalError::model("model file is corrupt"))
    }
}

pub struct TestApp {
    pub router: Router,
    pub lifecycle: Arc<LifecycleController>,
}

impl TestApp {
    /// Application with a loaded mock session and default configuration
    pub async fn ready() -> Self {
        Self::ready_with(default_config(), MockBackend::new()).await
    }

    pub async fn ready_with(config: ServiceConfig, backend: MockBackend) -> Self {
        let lifecycle = Arc::new(LifecycleController::new());
        lifecycle
            .start(&StaticLoader(Arc::new(backend)))
            .await
            .expect("mock session should load");
        Self::from_parts(config, lifecycle)
    }

    /// Application whose session was never started
    pub fn uninitialized() -> Self {
        Self::from_parts(default_config(), Arc::new(LifecycleController::new()))
    }

    fn from_parts(config: ServiceConfig, lifecycle: Arc<LifecycleController>) -> Self {
        let router = server::app(AppState::new(config, Arc::clone(&lifecycle)));
        Self { router, lifecycle }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn upload(&self, part: Part<'_>) -> Response<Body> {
        self.send(upload_request(multipart_body(&[part]))).await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

pub fn default_config() -> ServiceConfig {
    ServiceConfig::builder()
        .mock_backend(true)
        .build()
        .expect("default config is valid")
}

/// One multipart form part
#[derive(Clone, Copy)]
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "file",
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::post(UPLOAD_PATH)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable")
        .to_vec()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("response body should be JSON")
}

pub async fn detail(response: Response<Body>) -> String {
    json_body(response).await["detail"]
        .as_str()
        .expect("error body carries a detail string")
        .to_string()
}

pub fn header_str<'a>(response: &'a Response<Body>, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Gradient RGB photo, encoded in the given format
pub fn encoded_rgb(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let intensity = ((x + y) % 100) as u8;
        image::Rgb([intensity, 128, 255 - intensity])
    });
    encode(&DynamicImage::ImageRgb8(image), format)
}

/// RGBA image whose left half is already fully transparent
pub fn encoded_half_transparent_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, _| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        image::Rgba([200, 40, 40, alpha])
    });
    encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// Indexed PNG whose left half uses a fully transparent palette entry
pub fn encoded_paletted_png(width: u32, height: u32) -> Vec<u8> {
    let indices: Vec<u8> = (0..height)
        .flat_map(|_| (0..width).map(move |x| u8::from(x >= width / 2)))
        .collect();
    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(vec![200, 40, 40, 40, 200, 40]);
    encoder.set_trns(vec![0, 255]);
    let mut writer = encoder.write_header().expect("png header should encode");
    writer
        .write_image_data(&indices)
        .expect("png data should encode");
    writer.finish().expect("png should finish");
    bytes
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .expect("test image should encode");
    buffer
}

pub fn decode(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory(bytes).expect("response should be a decodable image")
}
