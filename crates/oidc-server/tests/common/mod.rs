//! Shared helpers for token endpoint tests
//!
//! Seeding hashes every secret with argon2, so one seeded state is built per
//! test binary and shared by all tests.

#![allow(dead_code)]

use std::sync::{Arc, LazyLock};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use oidc_server::config::Config;
use oidc_server::keys::SigningKey;
use oidc_server::AppState;

pub const CONSOLE_SECRET: &str = "388D45FA-B36B-4988-BA59-B187D329C207";
pub const PASSWORD_SECRET: &str = "901564A5-E7FE-42CB-B10D-61EF6A8F3654";
pub const PUBLIC_URL: &str = "http://localhost:5000";

const FIXTURE: &str = include_str!("../fixtures/signing-key.pem");

pub static STATE: LazyLock<Arc<AppState>> = LazyLock::new(|| {
    let key = SigningKey::from_pem(FIXTURE).expect("fixture key should parse");
    let state = AppState::with_signing_key(Config::default(), PUBLIC_URL, key)
        .expect("state should build");
    Arc::new(state)
});

pub fn app() -> Router {
    oidc_server::router(Arc::clone(&STATE))
}

pub fn token_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/connect/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
