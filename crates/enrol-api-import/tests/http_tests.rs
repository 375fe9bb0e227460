//! HTTP surface tests: routing, status codes and problem documents.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Duration;
use common::{csv, multipart_body, multipart_content_type, student, TestContext, STRONG_PASSWORD};
use enrol_api_import::ImportConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(uri: &str, fields: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(fields)))
        .unwrap()
}

fn content_type(response: &Response) -> &str {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
async fn test_healthz() {
    let ctx = TestContext::new();
    let response = send(
        ctx.router(),
        Request::get("/healthz").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_bulk_import_returns_json_report() {
    let ctx = TestContext::new();
    let data = csv(&[
        &student("alice@u.edu"),
        &student("alice@u.edu"),
        &student("oops"),
    ]);

    let response = send(
        ctx.router(),
        upload("/bulk-import", &[("file", Some("students.csv"), data.as_slice())]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["summary"]["total_rows"], 3);
    assert_eq!(body["summary"]["created"], 1);
    assert_eq!(body["summary"]["skipped_duplicate"], 1);
    assert_eq!(body["summary"]["rejected_invalid"], 1);

    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows[0]["line_number"], 2);
    assert_eq!(rows[0]["outcome"], "created");
    assert_eq!(rows[0]["delivery"]["status"], "sent");
    assert_eq!(rows[1]["outcome"], "skipped_duplicate");
    assert_eq!(rows[1]["duplicate_of"]["source"], "in_file");
    assert_eq!(rows[1]["duplicate_of"]["first_line"], 2);
    assert_eq!(rows[2]["outcome"], "rejected_invalid");
    assert_eq!(rows[2]["column"], "email");
}

#[tokio::test]
async fn test_bulk_import_csv_report() {
    let ctx = TestContext::new();
    let data = csv(&[&student("alice@u.edu")]);

    let response = send(
        ctx.router(),
        upload(
            "/bulk-import?format=csv",
            &[("file", Some("students.csv"), data.as_slice())],
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(content_type(&response).starts_with("text/csv"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "line_number,email,outcome,detail");
    assert_eq!(lines[1], "2,alice@u.edu,created,token sent");
}

#[tokio::test]
async fn test_bulk_import_without_file_is_malformed() {
    let ctx = TestContext::new();
    let response = send(
        ctx.router(),
        upload("/bulk-import", &[("delimiter", None, b";".as_slice())]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(content_type(&response), "application/problem+json");
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/malformed-input");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_bulk_import_honours_delimiter_field() {
    let ctx = TestContext::new();
    let data = b"email;first_name;last_name;university\nsam@u.edu;Sam;Lee;Uni\n";

    let response = send(
        ctx.router(),
        upload(
            "/bulk-import",
            &[("delimiter", None, b";".as_slice()), ("file", Some("students.csv"), data.as_slice())],
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["summary"]["created"], 1);
    assert_eq!(ctx.users.len().await, 1);
}

#[tokio::test]
async fn test_bulk_import_file_over_limit_is_413() {
    let ctx = TestContext::with_config(ImportConfig {
        max_file_bytes: 64,
        ..Default::default()
    });
    let rows: Vec<String> = (0..10).map(|i| student(&format!("s{i}@u.edu"))).collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let data = csv(&refs);

    let response = send(
        ctx.router(),
        upload("/bulk-import", &[("file", Some("students.csv"), data.as_slice())]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/file-too-large");
    assert!(ctx.users.is_empty().await);
}

#[tokio::test]
async fn test_token_request_is_accepted_for_known_and_unknown_emails() {
    let ctx = TestContext::new();
    ctx.seed_user("bob@u.edu").await;

    let known = send(
        ctx.router(),
        post_json("/token/request", json!({"email": "bob@u.edu"})),
    )
    .await;
    let unknown = send(
        ctx.router(),
        post_json("/token/request", json!({"email": "ghost@u.edu"})),
    )
    .await;

    assert_eq!(known.status(), StatusCode::ACCEPTED);
    assert_eq!(unknown.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(known).await, body_json(unknown).await);
    assert_eq!(ctx.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_verify_unknown_token_is_404() {
    let ctx = TestContext::new();
    let response = send(
        ctx.router(),
        post_json("/token/verify", json!({"token": "not-a-token"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/token-not-found");
}

#[tokio::test]
async fn test_full_activation_flow_over_http() {
    let ctx = TestContext::new();
    let bob = ctx.seed_user("bob@u.edu").await;

    let response = send(
        ctx.router(),
        post_json("/token/request", json!({"email": "bob@u.edu"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let token = ctx.notifier.token_for("bob@u.edu").unwrap();

    let response = send(
        ctx.router(),
        post_json("/token/verify", json!({"token": token})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user_id"], bob.id.to_string());

    let commit = json!({"token": token, "new_password": STRONG_PASSWORD});
    let response = send(ctx.router(), post_json("/token/commit", commit.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user_id"], bob.id.to_string());

    let response = send(ctx.router(), post_json("/token/commit", commit)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/token-already-used");
}

#[tokio::test]
async fn test_commit_before_verify_is_409() {
    let ctx = TestContext::new();
    ctx.seed_user("bob@u.edu").await;
    let token = ctx.request_token("bob@u.edu").await;

    let response = send(
        ctx.router(),
        post_json(
            "/token/commit",
            json!({"token": token, "new_password": STRONG_PASSWORD}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/token-not-verified");
}

#[tokio::test]
async fn test_weak_password_lists_violations() {
    let ctx = TestContext::new();
    ctx.seed_user("bob@u.edu").await;
    let token = ctx.request_token("bob@u.edu").await;
    ctx.lifecycle.verify_token(&token).await.unwrap();

    let response = send(
        ctx.router(),
        post_json(
            "/token/commit",
            json!({"token": token, "new_password": "short"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(content_type(&response), "application/problem+json");
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/weak-password");
    assert_eq!(
        body["violations"],
        json!(["min_length", "uppercase", "digit", "special"])
    );
}

#[tokio::test]
async fn test_expired_token_is_410() {
    let ctx = TestContext::new();
    ctx.seed_user("bob@u.edu").await;
    let token = ctx.request_token("bob@u.edu").await;
    ctx.clock.advance(Duration::hours(1));

    let response = send(
        ctx.router(),
        post_json("/token/verify", json!({"token": token})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::GONE);
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://enrol.dev/errors/token-expired");
}
