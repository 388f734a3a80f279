#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use marks_api::config::Config;
use marks_api::AppState;
use marks_common::id::prefixed_ulid;

pub const TEST_SECRET: &str = "test-identity-secret";
pub const TEST_ISSUER: &str = "https://id.test";
pub const TEST_AUDIENCE: &str = "marks";

pub fn test_config() -> Config {
    Config {
        database_url: None,
        identity_secret: TEST_SECRET.to_string(),
        identity_issuer: TEST_ISSUER.to_string(),
        identity_audience: TEST_AUDIENCE.to_string(),
        port: 0,
        public_url: None,
    }
}

/// Build a test AppState with in-memory bookmark and KV stores.
pub fn test_state() -> AppState {
    AppState::in_memory(test_config())
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    (marks_api::app(state.clone()), state)
}

/// Bind a real listener on an ephemeral port and serve the app in the background.
pub async fn start_server() -> (SocketAddr, AppState) {
    let state = test_state();
    let app = marks_api::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

#[derive(Debug, Serialize)]
pub struct TestIdentityClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl TestIdentityClaims {
    pub fn for_user(user_id: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            iss: TEST_ISSUER.to_string(),
            sub: user_id.to_string(),
            aud: TEST_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::seconds(300)).timestamp(),
            jti: prefixed_ulid("jti"),
            email: Some(format!("{user_id}@example.com")),
        }
    }
}

pub fn sign(claims: &TestIdentityClaims, secret: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("mint identity token")
}

/// Mint a valid identity assertion for `user_id`.
pub fn mint_identity_token(user_id: &str) -> String {
    sign(&TestIdentityClaims::for_user(user_id), TEST_SECRET)
}

pub fn new_user_id() -> String {
    prefixed_ulid("usr")
}

/// Log a user in and return their access token.
pub async fn login(server: &axum_test::TestServer, user_id: &str) -> String {
    let resp = server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({ "id_token": mint_identity_token(user_id) }))
        .await;
    resp.assert_status_ok();
    resp.json::<serde_json::Value>()["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}
