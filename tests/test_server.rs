//! Integration test: Server API endpoints

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use datawizard::server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "wizard-test-boundary";

const CSV: &str = "size,shape,label\n\
1.0,round,a\n2.0,square,a\n,round,a\n4.0,square,a\n5.0,round,a\n6.0,square,a\n\
10.0,round,b\n11.0,square,b\n12.0,round,b\n13.0,square,b\n14.0,round,b\n15.0,square,b\n";

fn test_app() -> Router {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_upload_size: 10 * 1024 * 1024,
    };
    create_router(Arc::new(AppState::new(config)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(uri: &str, file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
Content-Type: application/octet-stream\r\n\r\n{contents}\r\n--{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn new_session(app: &Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/sessions")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let (status, body) = send_json(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_estimators_by_problem() {
    let app = test_app();
    let (status, body) = send_json(&app, get("/api/estimators?problem=regression")).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body["estimators"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["label"].as_str().unwrap())
        .collect();
    assert!(labels.contains(&"Linear Regression"));
    assert!(labels.contains(&"Support Vector Regression"));
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = test_app();
    let uri = format!("/api/sessions/{}", uuid::Uuid::new_v4());
    let (status, body) = send_json(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_out_of_order_actions_conflict() {
    let app = test_app();
    let id = new_session(&app).await;

    let (status, body) = send_json(&app, post_json(&format!("/api/sessions/{id}/train"), json!({"target": "label"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("upload a dataset"));

    let (status, _) = send_json(&app, get(&format!("/api/sessions/{id}/data/preview"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send_json(&app, get(&format!("/api/sessions/{id}/model/download"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unsupported_upload_is_400() {
    let app = test_app();
    let id = new_session(&app).await;
    let (status, body) = send_json(&app, upload(&format!("/api/sessions/{id}/upload"), "notes.txt", "hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("txt"));

    let (_, session) = send_json(&app, get(&format!("/api/sessions/{id}"))).await;
    assert_eq!(session["session"]["stage"], "empty");
}

#[tokio::test]
async fn test_full_flow() {
    let app = test_app();
    let id = new_session(&app).await;
    let base = format!("/api/sessions/{id}");

    let (status, body) = send_json(&app, upload(&format!("{base}/upload"), "shapes.csv", CSV)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["profile"]["rows"], 12);
    assert_eq!(body["profile"]["missing_cells"], 1);

    let (status, overview) = send_json(&app, get(&format!("{base}/preprocess/overview"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["missing"][0]["column"], "size");

    let plan = json!({
        "missing": [{"column": "size", "strategy": "mean"}],
        "scaling": {"method": "minmax", "columns": ["size"]},
        "encoding": [{"column": "shape", "method": "one_hot"}],
        "drop_duplicates": true
    });
    let (status, body) = send_json(&app, post_json(&format!("{base}/preprocess"), plan)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["report"]["columns_removed"][0], "shape");

    let request = json!({
        "target": "label",
        "problem": "classification",
        "estimator": "decision_tree",
        "test_size": 0.25,
        "cv_folds": 2,
        "seed": 42
    });
    let (status, report) = send_json(&app, post_json(&format!("{base}/train"), request)).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["summary"]["estimator"], "Decision Tree");
    assert_eq!(report["summary"]["test_rows"], 3);
    assert!(report["metrics"]["accuracy"].is_number());
    assert_eq!(report["metrics"]["cross_validation"]["n_folds"], 2);

    let response = app
        .clone()
        .oneshot(get(&format!("{base}/model/download")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"model.json\""
    );

    let chart = json!({"source": "processed", "chart": {"kind": "histogram", "column": "size", "bins": 5}});
    let (status, body) = send_json(&app, post_json(&format!("{base}/visualize"), chart)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["kind"], "histogram");

    let (_, session) = send_json(&app, get(&base)).await;
    assert_eq!(session["session"]["stage"], "trained");

    let delete = Request::builder().method("DELETE").uri(&base).body(Body::empty()).unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
