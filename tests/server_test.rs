//! HTTP integration tests


use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use head_pose_server::server::router;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use test_helpers::*;
use tower::ServiceExt;

const BODY_LIMIT: usize = 4 * 1024 * 1024;

fn test_router(output_dir: &Path, yaw: f64) -> Router {
    let pose = pose_from_angles(yaw, 0.0, 0.0, 1000.0);
    let objects = vec![detection(1, 0.9), detection(1, 0.6), detection(3, 0.99)];
    let app = build_app(models_for_pose(&pose, objects), output_dir);
    router(Arc::new(app), BODY_LIMIT)
}

async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    post_raw(app, uri, Some("application/json"), body.to_string()).await
}

async fn post_raw(app: Router, uri: &str, content_type: Option<&str>, body: String) -> (StatusCode, Value) {
    let mut request = Request::builder().method(Method::POST).uri(uri);
    if let Some(content_type) = content_type {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    let response = app.oneshot(request.body(Body::from(body)).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_router(dir.path(), 0.0)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "healthy");
}

#[tokio::test]
async fn test_predict_pose_right() {
    let dir = tempfile::tempdir().unwrap();
    let img = png_data_url(&textured_image(IMAGE_WIDTH, IMAGE_HEIGHT));
    let (status, body) = post_json(test_router(dir.path(), 25.0), "/predict_pose", &json!({ "img": img })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["direction"], "Right");
    let yaw = body["angles"]["yaw"].as_f64().unwrap();
    assert!((yaw - 25.0).abs() < 0.1);
    assert!(body["angles"]["pitch"].is_f64());
    assert!(body["angles"]["roll"].is_f64());
}

#[tokio::test]
async fn test_predict_pose_no_face() {
    let dir = tempfile::tempdir().unwrap();
    let img = png_base64(&solid_image(IMAGE_WIDTH, IMAGE_HEIGHT, [0, 0, 0]));
    let (status, body) = post_json(test_router(dir.path(), 0.0), "/predict_pose", &json!({ "img": img })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "no_face", "message": "Face not found" }));
    assert!(body.get("angles").is_none());
}

#[tokio::test]
async fn test_json_parsed_without_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let img = png_base64(&textured_image(IMAGE_WIDTH, IMAGE_HEIGHT));
    let body = json!({ "img": img }).to_string();
    let (status, value) = post_raw(test_router(dir.path(), -30.0), "/predict_pose", None, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["direction"], "Left");
}

#[tokio::test]
async fn test_invalid_base64_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    for uri in ["/predict_pose", "/predict_people", "/save_img"] {
        let (status, body) =
            post_json(test_router(dir.path(), 0.0), uri, &json!({ "img": "data:image/png;base64,%%%" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["detail"].as_str().unwrap().contains("Decode"), "{uri}");
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = post_raw(
        test_router(dir.path(), 0.0),
        "/predict_pose",
        Some("application/json"),
        "{not json".to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, _) = post_json(test_router(dir.path(), 0.0), "/predict_people", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_predict_people() {
    let dir = tempfile::tempdir().unwrap();
    let img = png_base64(&textured_image(40, 30));
    let (status, body) = post_json(test_router(dir.path(), 0.0), "/predict_people", &json!({ "img": img })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "people": 2 }));
}

#[tokio::test]
async fn test_save_img_sanitizes_user() {
    let dir = tempfile::tempdir().unwrap();
    let img = png_base64(&textured_image(16, 16));
    let (status, body) =
        post_json(test_router(dir.path(), 0.0), "/save_img", &json!({ "img": img, "user": "a/b" })).await;

    assert_eq!(status, StatusCode::OK);
    let path = body["path"].as_str().unwrap();
    assert_eq!(Path::new(path), dir.path().join("a_b.jpg"));
    assert!(Path::new(path).is_file());
}

#[tokio::test]
async fn test_save_img_default_user() {
    let dir = tempfile::tempdir().unwrap();
    let img = png_base64(&textured_image(16, 16));
    let (status, body) = post_json(test_router(dir.path(), 0.0), "/save_img", &json!({ "img": img })).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["path"].as_str().unwrap().ends_with("unknown.jpg"));
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = json!({ "img": "A".repeat(BODY_LIMIT + 1) }).to_string();
    let (status, _) = post_raw(test_router(dir.path(), 0.0), "/predict_pose", Some("application/json"), body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_cors_preflight() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_router(dir.path(), 0.0)
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/predict_pose")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
