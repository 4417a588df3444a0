//! End-to-end tests of the HTTP routes against a live server

mod common;

use bgremove_web::{config::DEFAULT_MAX_UPLOAD_BYTES, MockBackendFactory};
use common::{encode, test_image, TestServer};
use image::{GenericImageView, ImageFormat};
use reqwest::{
    multipart::{Form, Part},
    Client, StatusCode,
};
use serde_json::Value;

/// Form sending file names verbatim, as browsers do
fn form() -> Form {
    Form::new().percent_encode_noop()
}

fn image_part(bytes: Vec<u8>, file_name: &str) -> Part {
    Part::bytes(bytes).file_name(file_name.to_string())
}

async fn post_form(server: &TestServer, path: &str, form: Form) -> reqwest::Response {
    Client::new()
        .post(server.url(path))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_remove_fast_writes_rgba_png() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let jpeg = encode(&test_image(60, 40), ImageFormat::Jpeg);

    let form = form()
        .text("mode", "fast")
        .part("image", image_part(jpeg, "photo.jpg"));
    let response = post_form(&server, "/remove", form).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("/static/uploads/input/photo.jpg"));
    assert!(body.contains("/static/uploads/output/photo.png"));

    assert!(server.uploads().join("input/photo.jpg").exists());
    let output = image::open(server.uploads().join("output/photo.png")).unwrap();
    assert_eq!(output.dimensions(), (60, 40));
    assert_eq!(output.color(), image::ColorType::Rgba8);

    let served = Client::new()
        .get(server.url("/static/uploads/output/photo.png"))
        .send()
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(served.headers()["content-type"], "image/png");

    let fallback = Client::new().get(server.url("/uploads/output/photo.png")).send().await.unwrap();
    assert_eq!(fallback.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_mode_defaults_to_best_and_sanitizes_name() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let png = encode(&test_image(32, 32), ImageFormat::Png);

    let form = form().part("image", image_part(png, "../My Photo.PNG"));
    let response = post_form(&server, "/remove", form).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(server.uploads().join("input/My_Photo.PNG").exists());
    assert!(server.uploads().join("output/My_Photo.png").exists());
    assert_eq!(server.factory.created_count(), 1);
}

#[tokio::test]
async fn test_missing_file_is_rejected() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = post_form(&server, "/remove", form().text("mode", "fast")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "No file uploaded");
}

#[tokio::test]
async fn test_empty_file_name_is_rejected() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;

    let form = form().part("image", image_part(b"data".to_vec(), ""));
    let response = post_form(&server, "/remove", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Invalid file name");
}

#[tokio::test]
async fn test_disallowed_extension_lists_formats() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;

    let form = form().part("image", image_part(b"%PDF-1.4".to_vec(), "doc.pdf"));
    let response = post_form(&server, "/remove", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "File type not allowed. Supported formats: PNG, JPG, JPEG, WEBP, SVG, ICO"
    );
    assert!(!server.uploads().join("input/doc.pdf").exists());
}

#[tokio::test]
async fn test_unknown_mode_is_rejected() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let png = encode(&test_image(16, 16), ImageFormat::Png);

    let form = form()
        .text("mode", "ultra")
        .part("image", image_part(png, "a.png"));
    let response = post_form(&server, "/remove", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("ultra"));
    assert_eq!(server.factory.created_count(), 0);
}

#[tokio::test]
async fn test_processing_failure_is_500() {
    let server = TestServer::start(MockBackendFactory::failing(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let png = encode(&test_image(16, 16), ImageFormat::Png);

    let form = form().part("image", image_part(png, "a.png"));
    let response = post_form(&server, "/remove", form).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().starts_with("Error processing image: "));
    // The saved input stays behind
    assert!(server.uploads().join("input/a.png").exists());
}

#[tokio::test]
async fn test_undecodable_upload_is_500() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;

    let form = form().part("image", image_part(b"not an image".to_vec(), "broken.png"));
    let response = post_form(&server, "/remove", form).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().starts_with("Error processing image: "));
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let server = TestServer::start(MockBackendFactory::new(), 1024).await;

    let form = form().part("image", image_part(vec![0u8; 4096], "big.png"));
    let response = post_form(&server, "/remove", form).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_manual_edit_round_trip() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let png = encode(&test_image(20, 10), ImageFormat::Png);

    let response = post_form(
        &server,
        "/save_manual_edit",
        form().part("image", image_part(png, "blob")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    let output_path = body["output_path"].as_str().unwrap();
    assert!(output_path.starts_with("uploads/manual/manual_edit_"));
    assert!(output_path.ends_with(".png"));
    // manual_edit_YYYYmmdd_HHMMSS.png
    assert_eq!(output_path.len(), "uploads/manual/manual_edit_20240101_120000.png".len());

    let saved = server.static_dir.path().join(output_path);
    assert_eq!(image::open(&saved).unwrap().dimensions(), (20, 10));

    let view = Client::new()
        .get(server.url(&format!("/result_manual?image={output_path}")))
        .send()
        .await
        .unwrap();
    assert!(view.text().await.unwrap().contains(&format!("/static/{output_path}")));
}

#[tokio::test]
async fn test_manual_edit_without_file_is_json_400() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = post_form(&server, "/save_manual_edit", form().text("note", "x")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_upload_for_manual_preloads_editor() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let png = encode(&test_image(8, 8), ImageFormat::Png);

    let response = post_form(
        &server,
        "/upload_for_manual",
        form().part("image", image_part(png, "sketch.png")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("data-image=\"/static/uploads/input/sketch.png\""));
    assert!(server.uploads().join("input/sketch.png").exists());
    assert_eq!(server.factory.created_count(), 0);

    let rejected = post_form(
        &server,
        "/upload_for_manual",
        form().part("image", image_part(b"x".to_vec(), "notes.txt")),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pages_and_health() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    let client = Client::new();

    let index = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(index.status(), StatusCode::OK);
    assert!(index.text().await.unwrap().contains("action=\"/remove\""));

    let editor = client.get(server.url("/manual_editor")).send().await.unwrap();
    assert_eq!(editor.status(), StatusCode::OK);

    let escaped = client
        .get(server.url("/result_manual?image=%3Cscript%3E"))
        .send()
        .await
        .unwrap();
    assert!(escaped.text().await.unwrap().contains("&lt;script&gt;"));

    let health: Value = client.get(server.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "Available");
    assert_eq!(health["backend"], "mock");
}

#[tokio::test]
async fn test_static_paths_cannot_escape_root() {
    let server = TestServer::start(MockBackendFactory::new(), DEFAULT_MAX_UPLOAD_BYTES).await;
    std::fs::write(server.static_dir.path().join("secret.txt"), b"secret").unwrap();

    let response = Client::new()
        .get(server.url("/uploads/..%2Fsecret.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let missing = Client::new().get(server.url("/static/nope.png")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
