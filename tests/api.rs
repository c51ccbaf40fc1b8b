use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
    routing::post,
};
use base64::Engine;
use image::{Rgba, RgbaImage};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

use pixelforge::{
    AppState, Config,
    background::{BackgroundRemover, RemovalError},
    image_processing,
    imagepig::ImagePigClient,
    router,
    storage::{JsonRecordStore, LocalFileStorage},
};

const USER_HEADER: &str = "x-auth-request-email";
const BOUNDARY: &str = "pixelforge-test-boundary";

struct EchoRemover;

#[async_trait]
impl BackgroundRemover for EchoRemover {
    async fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError> {
        Ok(image.to_vec())
    }
}

struct BrokenRemover;

#[async_trait]
impl BackgroundRemover for BrokenRemover {
    async fn remove(&self, _image: &[u8]) -> Result<Vec<u8>, RemovalError> {
        Err(RemovalError::OutputMissing)
    }
}

struct Harness {
    _dir: TempDir,
    app: Router,
    public_dir: PathBuf,
    scratch_dir: PathBuf,
}

async fn harness_with(
    vendor_base: &str,
    remover: Arc<dyn BackgroundRemover>,
    max_upload_bytes: u64,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let public_dir = dir.path().join("public");
    let scratch_dir = dir.path().join("tmp");
    let config = Config {
        api_key: Some("test-key".to_string()),
        imagepig_base_url: vendor_base.to_string(),
        data_dir: dir.path().join("records"),
        public_dir: public_dir.clone(),
        scratch_dir: scratch_dir.clone(),
        max_upload_bytes,
        ..Config::default()
    };
    std::fs::create_dir_all(&public_dir).unwrap();
    std::fs::create_dir_all(&scratch_dir).unwrap();

    let records = JsonRecordStore::open(config.data_dir.clone()).await.unwrap();
    let state = AppState {
        files: Arc::new(LocalFileStorage::new(public_dir.clone())),
        records: Arc::new(records),
        imagepig: Arc::new(ImagePigClient::new(vendor_base, config.api_key.clone())),
        remover,
        http: reqwest::Client::new(),
        config: Arc::new(config),
    };
    Harness {
        _dir: dir,
        app: router(state),
        public_dir,
        scratch_dir,
    }
}

async fn harness() -> Harness {
    harness_with("http://127.0.0.1:9", Arc::new(EchoRemover), 10 * 1024 * 1024).await
}

/// Serves `reply` for every vendor endpoint.
async fn vendor_stub(reply: Value) -> String {
    let handler = move || {
        let reply = reply.clone();
        async move { Json(reply) }
    };
    let app = Router::new()
        .route("/flux", post(handler.clone()))
        .route("/faceswap", post(handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(user: Option<&str>, field: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/removebg")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn png(color: [u8; 4], width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    image_processing::encode_png(&image).unwrap()
}

fn png_data_uri(color: [u8; 4]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(png(color, 2, 2));
    format!("data:image/png;base64,{encoded}")
}

fn dir_entries(path: &PathBuf) -> usize {
    std::fs::read_dir(path).map(|dir| dir.count()).unwrap_or(0)
}

#[tokio::test]
async fn gallery_requires_a_session() {
    let h = harness().await;
    let response = send(&h.app, get_request("/api/images", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"error": "Unauthorized"}));
}

#[tokio::test]
async fn saving_requires_a_session() {
    let h = harness().await;
    let request = json_request(
        "POST",
        "/api/images",
        None,
        json!({"imageUrl": png_data_uri([1, 2, 3, 255]), "type": "generated"}),
    );
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(dir_entries(&h.public_dir), 0);
}

#[tokio::test]
async fn empty_prompt_is_a_bad_request() {
    let h = harness().await;
    let request = json_request("POST", "/api/generate-image", None, json!({"prompt": "  "}));
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Prompt is required");
}

#[tokio::test]
async fn vendor_reply_without_image_data_is_a_server_error() {
    let base = vendor_stub(json!({"started_at": "2024-01-01T00:00:00Z"})).await;
    let h = harness_with(&base, Arc::new(EchoRemover), 1024).await;
    let request = json_request("POST", "/api/generate-image", None, json!({"prompt": "a fox"}));
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Failed to get image data");
}

#[tokio::test]
async fn generated_image_is_returned_as_data_uri() {
    let base = vendor_stub(json!({"image_data": "/9j/AAAA"})).await;
    let h = harness_with(&base, Arc::new(EchoRemover), 1024).await;
    let request = json_request("POST", "/api/generate-image", None, json!({"prompt": "a fox"}));
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"imageUrl": "data:image/jpeg;base64,/9j/AAAA"})
    );
}

#[tokio::test]
async fn face_swap_needs_both_images() {
    let h = harness().await;
    let request = json_request("POST", "/api/faceswap", None, json!({"sourceImage": "abc"}));
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn face_swap_response_gains_url() {
    let base = vendor_stub(json!({"image_data": "QUJD", "mime_type": "image/jpeg"})).await;
    let h = harness_with(&base, Arc::new(EchoRemover), 1024).await;
    let request = json_request(
        "POST",
        "/api/faceswap",
        None,
        json!({"sourceImage": "https://example.com/a.jpg", "targetImage": "/9j/BBBB"}),
    );
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["url"], "data:image/jpeg;base64,QUJD");
    assert_eq!(body["mime_type"], "image/jpeg");
}

#[tokio::test]
async fn saved_images_are_listed_newest_first_per_user() {
    let h = harness().await;
    for (user, color) in [
        ("alice@example.com", [255, 0, 0, 255]),
        ("bob@example.com", [0, 255, 0, 255]),
        ("alice@example.com", [0, 0, 255, 255]),
    ] {
        let request = json_request(
            "POST",
            "/api/images",
            Some(user),
            json!({"imageUrl": png_data_uri(color), "type": "generated"}),
        );
        let response = send(&h.app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("/uploads/generated_"));
    }

    let response = send(&h.app, get_request("/api/images", Some("alice@example.com"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|r| r["userId"] == "alice@example.com"));
    let first = listed[0]["createdAt"].as_str().unwrap();
    let second = listed[1]["createdAt"].as_str().unwrap();
    let first = chrono::DateTime::parse_from_rfc3339(first).unwrap();
    let second = chrono::DateTime::parse_from_rfc3339(second).unwrap();
    assert!(first >= second);

    let response = send(&h.app, get_request("/api/images", Some("carol@example.com"))).await;
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn legacy_kind_is_stored_as_removebg_and_filterable() {
    let h = harness().await;
    let request = json_request(
        "POST",
        "/api/images",
        Some("a@b.c"),
        json!({"imageUrl": png_data_uri([9, 9, 9, 255]), "type": "bgremoval"}),
    );
    assert_eq!(send(&h.app, request).await.status(), StatusCode::OK);
    let request = json_request(
        "POST",
        "/api/images",
        Some("a@b.c"),
        json!({"imageUrl": png_data_uri([8, 8, 8, 255]), "type": "faceswap"}),
    );
    assert_eq!(send(&h.app, request).await.status(), StatusCode::OK);

    let response = send(&h.app, get_request("/api/images?type=removebg", Some("a@b.c"))).await;
    let listed = body_json(response).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["type"], "removebg");
}

#[tokio::test]
async fn unknown_kind_is_a_bad_request() {
    let h = harness().await;
    let request = json_request(
        "POST",
        "/api/images",
        Some("a@b.c"),
        json!({"imageUrl": png_data_uri([9, 9, 9, 255]), "type": "upscaled"}),
    );
    assert_eq!(send(&h.app, request).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn removebg_rejects_non_multipart_requests() {
    let h = harness().await;
    let request = json_request("POST", "/api/removebg", Some("a@b.c"), json!({}));
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Content-Type must be multipart/form-data"
    );
}

#[tokio::test]
async fn removebg_without_image_field_is_a_bad_request() {
    let h = harness().await;
    let response = send(&h.app, multipart_request(Some("a@b.c"), "file", b"data")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No file uploaded");
}

#[tokio::test]
async fn removebg_stores_result_and_record() {
    let h = harness().await;
    let upload = png([200, 100, 50, 255], 4, 4);
    let response = send(&h.app, multipart_request(Some("a@b.c"), "image", &upload)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Background removed successfully");
    let image_url = body["imageUrl"].as_str().unwrap().to_string();
    assert!(image_url.starts_with('/') && image_url.ends_with(".png"));

    let stored = std::fs::read(h.public_dir.join(image_url.trim_start_matches('/'))).unwrap();
    assert_eq!(stored, upload);
    assert_eq!(dir_entries(&h.scratch_dir), 0);

    let served = send(&h.app, get_request(&image_url, None)).await;
    assert_eq!(served.status(), StatusCode::OK);

    let response = send(&h.app, get_request("/api/images", Some("a@b.c"))).await;
    let listed = body_json(response).await;
    assert_eq!(listed[0]["imageUrl"], image_url.as_str());
    assert_eq!(listed[0]["type"], "removebg");
}

#[tokio::test]
async fn removebg_rejects_oversized_uploads() {
    let h = harness_with("http://127.0.0.1:9", Arc::new(EchoRemover), 1024).await;
    let response = send(&h.app, multipart_request(Some("a@b.c"), "image", &[0u8; 4096])).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(dir_entries(&h.scratch_dir), 0);
}

#[tokio::test]
async fn removebg_failure_cleans_up_and_records_nothing() {
    let h = harness_with("http://127.0.0.1:9", Arc::new(BrokenRemover), 1024 * 1024).await;
    let upload = png([1, 1, 1, 255], 2, 2);
    let response = send(&h.app, multipart_request(Some("a@b.c"), "image", &upload)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Output file was not created");
    assert_eq!(dir_entries(&h.scratch_dir), 0);
    assert_eq!(dir_entries(&h.public_dir), 0);

    let response = send(&h.app, get_request("/api/images", Some("a@b.c"))).await;
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn edit_exports_cropped_png() {
    let h = harness().await;
    let source = RgbaImage::from_fn(200, 150, |x, y| Rgba([x as u8, y as u8, 0, 255]));
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(image_processing::encode_png(&source).unwrap());
    let request = json_request(
        "POST",
        "/api/edit",
        Some("a@b.c"),
        json!({
            "image": format!("data:image/png;base64,{encoded}"),
            "crop": {"x": 10, "y": 10, "width": 100, "height": 80},
            "scale": 150,
        }),
    );
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("edited-image.png")
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let exported = image_processing::decode_image(&bytes).unwrap();
    assert_eq!(exported.dimensions(), (100, 80));
    assert_eq!(exported.get_pixel(0, 0), source.get_pixel(10, 10));
}

#[tokio::test]
async fn edit_requires_a_session() {
    let h = harness().await;
    let request = json_request(
        "POST",
        "/api/edit",
        None,
        json!({"image": png_data_uri([1, 2, 3, 255])}),
    );
    assert_eq!(send(&h.app, request).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn edit_rejects_far_crop_offset() {
    let h = harness().await;
    let request = json_request(
        "POST",
        "/api/edit",
        Some("a@b.c"),
        json!({
            "image": png_data_uri([1, 2, 3, 255]),
            "crop": {"x": 1e19, "y": 0, "width": 10, "height": 10},
        }),
    );
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid edit settings"));
}

#[tokio::test]
async fn edit_rejects_out_of_range_settings() {
    let h = harness().await;
    let request = json_request(
        "POST",
        "/api/edit",
        Some("a@b.c"),
        json!({"image": png_data_uri([1, 2, 3, 255]), "brightness": 500}),
    );
    assert_eq!(send(&h.app, request).await.status(), StatusCode::BAD_REQUEST);
}
