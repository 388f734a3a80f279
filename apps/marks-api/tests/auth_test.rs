mod common;

use async_trait::async_trait;
use axum_test::TestServer;
use marks_api::auth::identity::validate_identity_token;
use marks_api::db::kv::{KeyValueStore, MemoryStore};
use marks_api::error::ApiError;
use parking_lot::Mutex;

/// Records the TTL of every claimed key.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    claimed: Mutex<Vec<(String, u64)>>,
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        self.inner.set_ex(key, value, ttl_secs).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        self.inner.get(key).await
    }

    async fn del(&self, key: &str) -> Result<(), ApiError> {
        self.inner.del(key).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, ApiError> {
        self.claimed.lock().push((key.to_string(), ttl_secs));
        self.inner.set_nx_ex(key, value, ttl_secs).await
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_with_valid_identity_returns_token_and_user() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let user_id = common::new_user_id();

    let resp = server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({ "id_token": common::mint_identity_token(&user_id) }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert!(body["access_token"].as_str().unwrap().starts_with("mat_"));
    assert_eq!(body["user"]["id"], user_id);
    assert_eq!(body["user"]["email"], format!("{user_id}@example.com"));
}

#[tokio::test]
async fn login_rejects_wrong_secret() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let claims = common::TestIdentityClaims::for_user(&common::new_user_id());
    let token = common::sign(&claims, "some-other-secret");

    let resp = server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({ "id_token": token }))
        .await;
    resp.assert_status(http::StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn login_rejects_wrong_audience_and_expired_tokens() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let mut wrong_aud = common::TestIdentityClaims::for_user(&common::new_user_id());
    wrong_aud.aud = "someone-else".to_string();

    let mut expired = common::TestIdentityClaims::for_user(&common::new_user_id());
    expired.iat -= 3600;
    expired.exp -= 3600;

    for claims in [wrong_aud, expired] {
        let resp = server
            .post("/api/v1/auth/login")
            .json(&serde_json::json!({ "id_token": common::sign(&claims, common::TEST_SECRET) }))
            .await;
        resp.assert_status(http::StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn login_rejects_replayed_identity_token() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::mint_identity_token(&common::new_user_id());

    server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({ "id_token": token }))
        .await
        .assert_status_ok();

    server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({ "id_token": token }))
        .await
        .assert_status(http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn used_jti_is_remembered_for_the_token_lifetime() {
    let config = common::test_config();
    let kv = RecordingStore::default();

    let mut claims = common::TestIdentityClaims::for_user(&common::new_user_id());
    claims.exp = claims.iat + 3600;
    claims.jti = "jti_long_lived".to_string();
    let token = common::sign(&claims, common::TEST_SECRET);

    validate_identity_token(&token, &config, &kv).await.unwrap();
    assert!(validate_identity_token(&token, &config, &kv).await.is_err());

    let claimed = kv.claimed.lock().clone();
    let (key, ttl) = &claimed[0];
    assert!(key.ends_with("jti_long_lived"));
    let remaining = (claims.exp - chrono::Utc::now().timestamp()) as u64;
    assert!(*ttl >= remaining, "ttl {ttl} shorter than remaining lifetime {remaining}");
}

#[tokio::test]
async fn concurrent_logins_with_one_token_admit_one() {
    let (addr, _state) = common::start_server().await;
    let token = common::mint_identity_token(&common::new_user_id());
    let url = format!("http://{addr}/api/v1/auth/login");
    let client = reqwest::Client::new();

    let attempts = (0..8).map(|_| {
        client
            .post(&url)
            .json(&serde_json::json!({ "id_token": token }))
            .send()
    });
    let responses = futures_util::future::join_all(attempts).await;

    let admitted = responses
        .into_iter()
        .map(|r| r.unwrap().status())
        .filter(|status| status.is_success())
        .count();
    assert_eq!(admitted, 1);
}

// ---------------------------------------------------------------------------
// GET /api/v1/auth/session, POST /api/v1/auth/logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_reports_current_user() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let user_id = common::new_user_id();
    let token = common::login(&server, &user_id).await;

    let resp = server
        .get("/api/v1/auth/session")
        .authorization_bearer(&token)
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["user"]["id"], user_id);
}

#[tokio::test]
async fn session_without_token_is_unauthorized() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    server
        .get("/api/v1/auth/session")
        .await
        .assert_status(http::StatusCode::UNAUTHORIZED);

    server
        .get("/api/v1/auth/session")
        .authorization_bearer("mat_bogus")
        .await
        .assert_status(http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_access_token() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&server, &common::new_user_id()).await;

    server
        .post("/api/v1/auth/logout")
        .authorization_bearer(&token)
        .await
        .assert_status(http::StatusCode::NO_CONTENT);

    server
        .get("/api/v1/auth/session")
        .authorization_bearer(&token)
        .await
        .assert_status(http::StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// POST /api/v1/gateway/ticket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gateway_ticket_requires_session() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    server
        .post("/api/v1/gateway/ticket")
        .await
        .assert_status(http::StatusCode::UNAUTHORIZED);

    let token = common::login(&server, &common::new_user_id()).await;
    let resp = server
        .post("/api/v1/gateway/ticket")
        .authorization_bearer(&token)
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert!(body["ticket"].as_str().unwrap().starts_with("wst_"));
    assert!(body["ws_url"].as_str().unwrap().ends_with("/gateway"));
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["status"], "ok");
}
