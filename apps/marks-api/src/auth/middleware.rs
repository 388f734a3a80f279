//! Bearer access token extraction.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::auth::tokens;
use crate::error::ApiError;
use crate::AppState;

/// The caller behind `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    /// Raw access token, needed to revoke the session on logout.
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    MalformedHeader,
    UnknownToken,
    LookupFailed,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            AuthRejection::MissingHeader => "Missing Authorization header",
            AuthRejection::MalformedHeader => "Authorization header must be `Bearer <token>`",
            AuthRejection::UnknownToken => "Invalid or expired token",
            AuthRejection::LookupFailed => "Token lookup failed",
        };
        ApiError::unauthorized(message).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthRejection::MissingHeader)?
        .to_str()
        .map_err(|_| AuthRejection::MalformedHeader)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthRejection::MalformedHeader)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        let subject = match tokens::lookup_access_token(state.kv.as_ref(), token).await {
            Ok(Some(subject)) => subject,
            Ok(None) => return Err(AuthRejection::UnknownToken),
            Err(err) => {
                tracing::error!(?err, "access token lookup failed");
                return Err(AuthRejection::LookupFailed);
            }
        };

        Ok(AuthUser {
            user_id: subject.user_id,
            email: subject.email,
            token: token.to_string(),
        })
    }
}
