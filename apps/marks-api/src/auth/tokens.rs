//! Access token and WebSocket ticket management.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Who a token or ticket was issued to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSubject {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

async fn store<T: Serialize>(
    kv: &dyn KeyValueStore,
    key: &str,
    data: &T,
    ttl_secs: u64,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(data)?;
    kv.set_ex(key, &value, ttl_secs).await
}

fn decode<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>, ApiError> {
    value
        .map(|v| serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt token data")))
        .transpose()
}

// ---------------------------------------------------------------------------
// Access token, 1-hour TTL
// ---------------------------------------------------------------------------

/// Access token TTL in seconds (1 hour).
pub const ACCESS_TOKEN_TTL_SECS: u64 = 3600;

fn access_key(token: &str) -> String {
    format!("marks:at:{token}")
}

pub fn generate_access_token() -> String {
    generate_opaque_token("mat", 32)
}

pub async fn store_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
    subject: &TokenSubject,
) -> Result<(), ApiError> {
    store(kv, &access_key(token), subject, ACCESS_TOKEN_TTL_SECS).await
}

pub async fn lookup_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<TokenSubject>, ApiError> {
    decode(kv.get(&access_key(token)).await?)
}

pub async fn revoke_access_token(kv: &dyn KeyValueStore, token: &str) -> Result<(), ApiError> {
    kv.del(&access_key(token)).await
}

// ---------------------------------------------------------------------------
// WebSocket ticket, 30-second TTL and single use
// ---------------------------------------------------------------------------

/// WS ticket TTL in seconds.
pub const WS_TICKET_TTL_SECS: u64 = 30;

fn ticket_key(ticket: &str) -> String {
    format!("marks:wst:{ticket}")
}

pub fn generate_ws_ticket() -> String {
    generate_opaque_token("wst", 32)
}

pub async fn store_ws_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
    subject: &TokenSubject,
) -> Result<(), ApiError> {
    store(kv, &ticket_key(ticket), subject, WS_TICKET_TTL_SECS).await
}

/// Consume a ticket. A second call with the same ticket returns `None`.
pub async fn consume_ws_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
) -> Result<Option<TokenSubject>, ApiError> {
    decode(kv.take(&ticket_key(ticket)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryStore;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: "usr_1".to_string(),
            email: Some("a@example.com".to_string()),
        }
    }

    #[test]
    fn opaque_tokens_are_prefixed_and_unique() {
        let a = generate_access_token();
        let b = generate_access_token();
        assert!(a.starts_with("mat_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn access_token_round_trip_and_revoke() {
        let kv = MemoryStore::new();
        let token = generate_access_token();
        store_access_token(&kv, &token, &subject()).await.unwrap();

        let found = lookup_access_token(&kv, &token).await.unwrap().unwrap();
        assert_eq!(found.user_id, "usr_1");

        revoke_access_token(&kv, &token).await.unwrap();
        assert!(lookup_access_token(&kv, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ws_ticket_is_single_use() {
        let kv = MemoryStore::new();
        let ticket = generate_ws_ticket();
        store_ws_ticket(&kv, &ticket, &subject()).await.unwrap();

        assert!(consume_ws_ticket(&kv, &ticket).await.unwrap().is_some());
        assert!(consume_ws_ticket(&kv, &ticket).await.unwrap().is_none());
    }
}
