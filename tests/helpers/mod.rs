#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

use auditdesk::auth::middleware::PUBLIC_ADDRESS_HEADER;
use auditdesk::auth::signature::{SignatureVerifier, StaticVerifier};
use auditdesk::config::Config;
use auditdesk::store::AppState;

/// Bootstrap admin address, seeded by `test_state`.
pub const ADMIN_ADDRESS: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000adc";

/// Build a test `AppState` on an in-memory database.
///
/// - Runs migrations and seeds the bootstrap admin user
/// - Accepts every signature (the chain node is not involved)
pub async fn test_state() -> AppState {
    test_state_with(Arc::new(StaticVerifier::accepting())).await
}

/// Same as `test_state` but with a caller-supplied signature verifier.
pub async fn test_state_with(verifier: Arc<dyn SignatureVerifier>) -> AppState {
    let pool = auditdesk::store::pool::connect("sqlite::memory:")
        .await
        .expect("in-memory pool");

    auditdesk::store::bootstrap::run(&pool, Some(ADMIN_ADDRESS), "admin")
        .await
        .expect("bootstrap failed");

    let config = Config {
        listen: "127.0.0.1:0".into(),
        database_url: "sqlite::memory:".into(),
        rpc_url: "http://localhost:1".into(),
        admin_address: Some(ADMIN_ADDRESS.into()),
        admin_name: "admin".into(),
        cors_origins: vec![],
        dev_mode: true,
    };

    AppState {
        pool,
        verifier,
        config: Arc::new(config),
    }
}

/// Build the full API router with the given state.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(auditdesk::api::router())
        .with_state(state)
}

/// A deterministic 66-char test address from a small seed.
pub fn test_address(seed: u32) -> String {
    format!("0x{seed:064x}")
}

/// Insert a company directly. Returns its id.
pub async fn create_company(pool: &SqlitePool, role: &str, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO companies (id, role, name, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
    )
    .bind(id)
    .bind(role)
    .bind(name)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("insert company");
    id
}

/// Insert a user directly. Returns its id.
pub async fn create_user(
    pool: &SqlitePool,
    role: &str,
    name: &str,
    address: &str,
    company_id: Option<Uuid>,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, role, public_address, name, company_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    )
    .bind(id)
    .bind(role)
    .bind(address.to_lowercase())
    .bind(name)
    .bind(company_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("insert user");
    id
}

/// Grant a manager seat directly.
pub async fn make_manager(pool: &SqlitePool, company_id: Uuid, user_id: Uuid) {
    sqlx::query("INSERT INTO company_managers (company_id, user_id) VALUES (?1, ?2)")
        .bind(company_id)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("insert manager");
}

/// Merge the signature fields into a request body. The accepting test
/// verifier never inspects them, but the shape must be present.
pub fn signed(mut body: Value, address: &str) -> Value {
    let obj = body.as_object_mut().expect("signed body must be an object");
    obj.insert("signedMessage".into(), serde_json::json!(["0x1", "0x2"]));
    obj.insert("publicAddress".into(), serde_json::json!(address));
    obj.insert("signData".into(), serde_json::json!("0xdead"));
    body
}

/// Send a GET request authenticated by public-address header.
pub async fn get_json(app: &Router, address: &str, path: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if !address.is_empty() {
        builder = builder.header(PUBLIC_ADDRESS_HEADER, address);
    }
    let req = builder.body(Body::empty()).unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

pub async fn post_json(app: &Router, address: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, address, "POST", path, Some(body)).await
}

pub async fn patch_json(
    app: &Router,
    address: &str,
    path: &str,
    body: Value,
) -> (StatusCode, Value) {
    send_json(app, address, "PATCH", path, Some(body)).await
}

pub async fn put_json(app: &Router, address: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, address, "PUT", path, Some(body)).await
}

pub async fn delete_json(app: &Router, address: &str, path: &str) -> (StatusCode, Value) {
    send_json(app, address, "DELETE", path, None).await
}

async fn send_json(
    app: &Router,
    address: &str,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if !address.is_empty() {
        builder = builder.header(PUBLIC_ADDRESS_HEADER, address);
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}
