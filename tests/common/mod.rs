#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use makers_api::db::{create_pool, run_migrations, SessionProvider};
use makers_api::{app, AppState, Config};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

/// Connects to `TEST_DATABASE_URL` (or `DATABASE_URL`) and applies migrations.
/// Returns `None` when no database is configured so the caller can skip.
pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;

    let pool = create_pool(&url, false)
        .await
        .expect("failed to connect to test database");
    run_migrations(&pool)
        .await
        .expect("failed to apply migrations");
    Some(pool)
}

macro_rules! require_db {
    () => {
        match common::test_pool().await {
            Some(pool) => pool,
            None => {
                eprintln!("skipping: TEST_DATABASE_URL / DATABASE_URL not set");
                return;
            }
        }
    };
}

pub fn test_config() -> Arc<Config> {
    Arc::new(
        Config::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "SECRET_KEY" => Some("test-secret-key-do-not-use-in-production".to_string()),
            "APP_ENV" => Some("testing".to_string()),
            _ => None,
        })
        .expect("test config"),
    )
}

pub fn test_app(sessions: Arc<dyn SessionProvider>) -> Router {
    app(AppState::new(test_config(), sessions))
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).expect("request"))
        .await
        .expect("router call");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON response body")
    };
    (status, value)
}
