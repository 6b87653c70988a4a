use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use chunk_upload_kit::routes::{create_routes, AppState};
use chunk_upload_kit::services::blob_store::MemoryBlobStore;
use chunk_upload_kit::services::chunk_assembler::ChunkAssembler;
use chunk_upload_kit::services::session_store::MemorySessionStore;

const BOUNDARY: &str = "chunk-upload-test-boundary";

fn app_with_blobs() -> (Router, Arc<MemoryBlobStore>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let assembler = Arc::new(ChunkAssembler::new(
        Arc::new(MemorySessionStore::new()),
        blobs.clone(),
    ));
    let router = create_routes(AppState {
        assembler,
        max_chunk_bytes: 1024,
    });
    (router, blobs)
}

fn app() -> Router {
    app_with_blobs().0
}

fn multipart_body(offset: Option<&str>, chunk: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(offset) = offset {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"offset\"\r\n\r\n{offset}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(chunk);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn create_request(filename: &str, total_size: i64) -> Request<Body> {
    Request::post("/uploads")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "filename": filename, "total_size": total_size }).to_string(),
        ))
        .unwrap()
}

fn chunk_request(token: &str, offset: Option<&str>, chunk: &[u8]) -> Request<Body> {
    Request::post(format!("/uploads/{token}/chunks"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(offset, chunk)))
        .unwrap()
}

async fn create(app: &Router, filename: &str, total_size: i64) -> String {
    let (status, body) = send_json(app, create_request(filename, total_size)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["offset"], 0);
    body["upload_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_upload_over_http() {
    let app = app();
    let token = create(&app, "video.mp4", 10).await;

    let (status, ack) = send_json(&app, chunk_request(&token, Some("0"), b"01234")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["offset"], 5);
    assert_eq!(ack["progress"], 50.0);
    assert_eq!(ack["completed"], false);

    let (_, ack) = send_json(&app, chunk_request(&token, Some("5"), b"56789")).await;
    assert_eq!(ack["offset"], 10);
    assert_eq!(ack["completed"], true);

    let (status, body) = send_json(
        &app,
        Request::get(format!("/uploads/{token}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["chunk_count"], 2);
    assert_eq!(body["filename"], "video.mp4");

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/uploads/{token}/complete"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"video.mp4\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"0123456789");

    let (status, _) = send_json(
        &app,
        Request::get(format!("/uploads/{token}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_create_is_a_bad_request() {
    let app = app();
    let (status, body) = send_json(&app, create_request("a.bin", -1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("total_size"));
}

#[tokio::test]
async fn chunk_without_offset_is_a_bad_request() {
    let app = app();
    let token = create(&app, "a.bin", 4).await;

    let (status, _) = send_json(&app, chunk_request(&token, None, b"ab")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&app, chunk_request(&token, Some("-3"), b"ab")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn offset_beyond_total_size_is_a_bad_request() {
    let (app, blobs) = app_with_blobs();
    let token = create(&app, "a.bin", 4).await;

    let (status, body) =
        send_json(&app, chunk_request(&token, Some("1125899906842624"), b"ab")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("offset"));

    let (_, body) = send_json(
        &app,
        Request::get(format!("/uploads/{token}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body["uploaded_size"], 0);
    assert_eq!(body["status"], "pending");
    assert!(blobs.keys().await.is_empty());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let app = app();
    let (status, body) = send_json(&app, chunk_request("missing", Some("0"), b"ab")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn premature_complete_is_a_conflict() {
    let app = app();
    let token = create(&app, "a.bin", 4).await;
    send_json(&app, chunk_request(&token, Some("0"), b"ab")).await;

    let (status, _) = send_json(
        &app,
        Request::post(format!("/uploads/{token}/complete"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelled_upload_rejects_chunks_and_can_be_deleted() {
    let app = app();
    let token = create(&app, "a.bin", 4).await;

    let (status, body) = send_json(
        &app,
        Request::post(format!("/uploads/{token}/cancel"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send_json(&app, chunk_request(&token, Some("0"), b"ab")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Request::delete(format!("/uploads/{token}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send_json(
        &app,
        Request::post(format!("/uploads/{token}/fail"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_chunk_is_rejected() {
    let app = app();
    let token = create(&app, "big.bin", 1_000_000).await;
    let chunk = vec![7u8; 200 * 1024];

    let (status, _) = send(&app, chunk_request(&token, Some("0"), &chunk)).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn root_describes_the_service() {
    let app = app();
    let (status, body) = send_json(&app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"].as_array().unwrap().len() > 3);
}
