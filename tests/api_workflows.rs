//! End-to-end tests for the HTTP surface
//!
//! Every test drives the full router (middleware included) with a mock
//! inference backend, so no model file or network access is needed.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use bgremove_api::{backends::MockBackend, server, OutputFormat, ServiceConfig};
use common::{
    body_bytes, decode, default_config, detail, encoded_half_transparent_png,
    encoded_paletted_png, encoded_rgb, header_str, json_body, multipart_body, upload_request, Part, TestApp,
};
use image::{GenericImageView, ImageFormat};
use tower::ServiceExt;

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn test_jpeg_upload_returns_transparent_png() {
    let app = TestApp::ready().await;
    let jpeg = encoded_rgb(100, 100, ImageFormat::Jpeg);

    let response = app.upload(Part::file("photo.jpg", "image/jpeg", &jpeg)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), "image/png");
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION),
        "attachment; filename=nobg_photo.png"
    );

    let bytes = body_bytes(response).await;
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);

    let output = decode(&bytes);
    assert_eq!(output.dimensions(), (100, 100));
    assert!(output.color().has_alpha());

    let rgba = output.to_rgba8();
    assert_eq!(rgba.get_pixel(50, 50)[3], 255, "subject stays opaque");
    assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 0], "background is cleared");
}

#[tokio::test]
async fn test_non_square_upload_keeps_dimensions() {
    let app = TestApp::ready().await;
    let png = encoded_rgb(240, 120, ImageFormat::Png);

    let response = app.upload(Part::file("wide.png", "image/png", &png)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let output = decode(&body_bytes(response).await);
    assert_eq!(output.dimensions(), (240, 120));
    let rgba = output.to_rgba8();
    assert_eq!(rgba.get_pixel(120, 60)[3], 255);
    assert_eq!(rgba.get_pixel(0, 0)[3], 0);
}

#[tokio::test]
async fn test_source_transparency_is_preserved() {
    let app = TestApp::ready().await;
    let png = encoded_half_transparent_png(100, 100);

    let response = app.upload(Part::file("sticker.png", "image/png", &png)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let rgba = decode(&body_bytes(response).await).to_rgba8();
    // Inside the subject, but transparent in the source
    assert_eq!(rgba.get_pixel(45, 50).0, [0, 0, 0, 0]);
    // Inside the subject and opaque in the source
    assert_eq!(rgba.get_pixel(55, 50)[3], 255);
}

#[tokio::test]
async fn test_paletted_transparency_is_preserved() {
    let app = TestApp::ready().await;
    let png = encoded_paletted_png(100, 100);

    let response = app.upload(Part::file("logo.png", "image/png", &png)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let rgba = decode(&body_bytes(response).await).to_rgba8();
    assert_eq!(rgba.dimensions(), (100, 100));
    assert_eq!(rgba.get_pixel(45, 50).0, [0, 0, 0, 0]);
    assert_eq!(rgba.get_pixel(55, 50)[3], 255);
}

#[tokio::test]
async fn test_grayscale_upload_is_normalized() {
    let app = TestApp::ready().await;
    let gray = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
        64,
        64,
        image::Luma([90]),
    ));
    let png = common::encode(&gray, ImageFormat::Png);

    let response = app.upload(Part::file("scan.png", "image/png", &png)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let rgba = decode(&body_bytes(response).await).to_rgba8();
    assert_eq!(rgba.dimensions(), (64, 64));
    let center = rgba.get_pixel(32, 32);
    assert_eq!(center.0, [90, 90, 90, 255]);
}

#[tokio::test]
async fn test_resubmission_is_deterministic() {
    let app = TestApp::ready().await;
    let jpeg = encoded_rgb(80, 60, ImageFormat::Jpeg);

    let first = app.upload(Part::file("a.jpg", "image/jpeg", &jpeg)).await;
    let second = app.upload(Part::file("a.jpg", "image/jpeg", &jpeg)).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_bytes(first).await, body_bytes(second).await);
}

#[tokio::test]
async fn test_webp_output_format() {
    let config = ServiceConfig::builder()
        .output_format(OutputFormat::WebP)
        .build()
        .unwrap();
    let app = TestApp::ready_with(config, MockBackend::new()).await;
    let jpeg = encoded_rgb(50, 50, ImageFormat::Jpeg);

    let response = app.upload(Part::file("photo.jpeg", "image/jpeg", &jpeg)).await;

    if cfg!(feature = "webp-support") {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), "image/webp");
        assert_eq!(
            header_str(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=nobg_photo.webp"
        );
    } else {
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#[tokio::test]
async fn test_missing_content_type_falls_back_to_extension() {
    let app = TestApp::ready().await;
    let png = encoded_rgb(40, 40, ImageFormat::Png);
    let part = Part {
        name: "file",
        filename: Some("holiday.PNG"),
        content_type: None,
        data: &png,
    };

    let response = app.upload(part).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION),
        "attachment; filename=nobg_holiday.png"
    );
}

#[tokio::test]
async fn test_filename_with_spaces_survives_in_header() {
    let app = TestApp::ready().await;
    let jpeg = encoded_rgb(32, 32, ImageFormat::Jpeg);

    let response = app
        .upload(Part::file("my photo.jpg", "image/jpeg", &jpeg))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION),
        "attachment; filename=\"nobg_my photo.png\"; filename*=UTF-8''nobg_my%20photo.png"
    );
}

#[tokio::test]
async fn test_file_field_without_filename_is_accepted() {
    let app = TestApp::ready().await;
    let jpeg = encoded_rgb(32, 32, ImageFormat::Jpeg);
    let part = Part {
        name: "file",
        filename: None,
        content_type: Some("image/jpeg"),
        data: &jpeg,
    };

    let response = app.upload(part).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION),
        "attachment; filename=nobg_image.png"
    );
}

#[tokio::test]
async fn test_extra_form_fields_are_skipped() {
    let app = TestApp::ready().await;
    let jpeg = encoded_rgb(32, 32, ImageFormat::Jpeg);
    let body = multipart_body(&[
        Part::text("note", "please hurry"),
        Part::file("cat.jpg", "image/jpeg", &jpeg),
    ]);

    let response = app.send(upload_request(body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION),
        "attachment; filename=nobg_cat.png"
    );
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let app = TestApp::ready().await;

    let response = app.upload(Part::file("x.png", "image/png", &[])).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(detail(response).await, "Empty file uploaded");
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let app = TestApp::ready().await;
    let data = vec![0u8; 10 * MIB + MIB / 2];

    let response = app.upload(Part::file("big.png", "image/png", &data)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(detail(response).await, "File too large. Maximum size: 10.0MB");
}

#[tokio::test]
async fn test_body_past_transport_limit_rejected_as_too_large() {
    let app = TestApp::ready().await;
    let data = vec![0u8; 11 * MIB];

    let response = app.upload(Part::file("huge.png", "image/png", &data)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(detail(response).await, "File too large. Maximum size: 10.0MB");
}

#[tokio::test]
async fn test_upload_exactly_at_limit_passes_size_check() {
    let config = ServiceConfig::builder()
        .max_upload_bytes(1024)
        .build()
        .unwrap();
    let app = TestApp::ready_with(config, MockBackend::new()).await;

    // Right size, wrong contents: rejected later by the decoder, not the size check
    let data = vec![7u8; 1024];
    let response = app.upload(Part::file("edge.png", "image/png", &data)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let data = vec![7u8; 1025];
    let response = app.upload(Part::file("edge.png", "image/png", &data)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(detail(response).await, "File too large. Maximum size: 1.0KB");
}

#[tokio::test]
async fn test_unsupported_type_rejected() {
    let app = TestApp::ready().await;

    let response = app
        .upload(Part::file("notes.txt", "text/plain", b"hello"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(detail(response).await.starts_with("Invalid file type"));
}

#[tokio::test]
async fn test_missing_file_field_rejected() {
    let app = TestApp::ready().await;
    let body = multipart_body(&[Part::text("note", "no image here")]);

    let response = app.send(upload_request(body)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(detail(response).await.starts_with("No file uploaded"));
}

#[tokio::test]
async fn test_non_multipart_request_rejected() {
    let app = TestApp::ready().await;
    let request = Request::post(common::UPLOAD_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(detail(response).await.starts_with("Invalid multipart request"));
}

#[tokio::test]
async fn test_undecodable_image_is_processing_failure() {
    let app = TestApp::ready().await;

    let response = app
        .upload(Part::file("broken.png", "image/png", b"definitely not a png"))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(detail(response)
        .await
        .starts_with("Failed to process image: "));
}

#[tokio::test]
async fn test_inference_failure_reported() {
    let app = TestApp::ready_with(default_config(), MockBackend::new_failing_inference()).await;
    let jpeg = encoded_rgb(40, 40, ImageFormat::Jpeg);

    let response = app.upload(Part::file("photo.jpg", "image/jpeg", &jpeg)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        detail(response).await,
        "Failed to process image: Mock inference failure"
    );
}

#[tokio::test]
async fn test_validation_failure_skips_inference() {
    let backend = MockBackend::new();
    let app = TestApp::ready_with(default_config(), backend.clone()).await;

    let response = app
        .upload(Part::file("notes.txt", "text/plain", b"hello"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_root_metadata() {
    let app = TestApp::ready().await;

    let response = app.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["name"], "AI Background Removal API");
    assert_eq!(body["status"], "running");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["endpoints"]["remove_background"], "/api/remove-bg");
    assert_eq!(body["endpoints"]["health"], "/health");
    assert_eq!(body["endpoints"]["documentation"], "/docs");
    assert_eq!(body["endpoints"]["redoc"], "/redoc");
    let formats = body["supported_formats"].as_array().unwrap();
    assert!(formats.iter().any(|f| f == "JPEG"));
    assert!(formats.iter().any(|f| f == "WebP"));
}

#[tokio::test]
async fn test_openapi_document_describes_upload() {
    let app = TestApp::ready().await;

    let response = app.get("/openapi.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert_eq!(doc["info"]["title"], "AI Background Removal API");
    let upload = &doc["paths"]["/api/remove-bg"]["post"];
    assert!(upload["requestBody"]["content"]["multipart/form-data"].is_object());
    assert!(upload["responses"]["503"].is_object());
    assert!(doc["paths"]["/health"]["get"].is_object());
}

#[tokio::test]
async fn test_documentation_pages_are_served() {
    let app = TestApp::uninitialized();

    for (path, marker) in [("/docs", "swagger-ui"), ("/redoc", "redoc")] {
        let response = app.get(path).await;

        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert!(header_str(&response, header::CONTENT_TYPE).starts_with("text/html"));
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains(marker), "{path}");
        assert!(html.contains("/openapi.json"), "{path}");
    }
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = TestApp::ready().await;

    let response = app.get("/does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["detail"], "Not Found");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = TestApp::ready().await;
    let request = Request::get("/health")
        .header(header::ORIGIN, "https://example.org")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
}

#[tokio::test]
async fn test_handler_panic_becomes_500() {
    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    let router = Router::new().route("/boom", get(explode));
    let app = server::with_middleware(router, &default_config());

    let response = app
        .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["detail"], "Internal server error");
}
