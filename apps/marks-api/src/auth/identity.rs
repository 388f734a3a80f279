//! Validation of identity assertions minted by the external identity provider.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Claims carried by an identity assertion.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub iss: String,
    /// Opaque owner identity.
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Validate an identity assertion and return its claims.
///
/// Checks:
///   1. HS256 signature with the shared identity secret
///   2. `exp` (jsonwebtoken handles this)
///   3. `aud` and `iss` match the configuration
///   4. `jti`, when present, has not been used before. It stays marked
///      until the token itself expires.
pub async fn validate_identity_token(
    token: &str,
    config: &Config,
    kv: &dyn KeyValueStore,
) -> Result<IdentityClaims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.identity_audience.as_str()]);
    validation.set_issuer(&[config.identity_issuer.as_str()]);

    let key = DecodingKey::from_secret(config.identity_secret.as_bytes());
    let claims = jsonwebtoken::decode::<IdentityClaims>(token, &key, &validation)
        .map_err(|e| {
            tracing::debug!(?e, "identity token validation failed");
            ApiError::unauthorized("Invalid or expired identity token")
        })?
        .claims;

    if claims.sub.trim().is_empty() {
        return Err(ApiError::unauthorized("Identity token has no subject"));
    }

    if let Some(jti) = &claims.jti {
        let jti_key = format!("marks:id_jti:{jti}");
        let ttl = jti_ttl_secs(claims.exp, chrono::Utc::now().timestamp());
        if !kv.set_nx_ex(&jti_key, "1", ttl).await? {
            return Err(ApiError::unauthorized("Identity token already used"));
        }
    }

    Ok(claims)
}

/// Seconds a used `jti` must be remembered: the token's remaining lifetime,
/// at least one.
fn jti_ttl_secs(exp: i64, now: i64) -> u64 {
    u64::try_from(exp.saturating_sub(now)).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jti_ttl_covers_remaining_lifetime() {
        assert_eq!(jti_ttl_secs(1_000 + 3_600, 1_000), 3_600);
        assert_eq!(jti_ttl_secs(1_000, 1_000), 1);
        assert_eq!(jti_ttl_secs(900, 1_000), 1);
    }
}
