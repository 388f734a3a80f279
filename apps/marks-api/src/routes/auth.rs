//! Session routes: identity login, session lookup, logout and gateway tickets.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use marks_common::api::{
    GatewayTicketResponse, LoginRequest, LoginResponse, SessionResponse, SessionUser,
};

use crate::auth::identity::validate_identity_token;
use crate::auth::middleware::AuthUser;
use crate::auth::tokens::{self, TokenSubject};
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/session", get(session))
        .route("/auth/logout", post(logout))
        .route("/gateway/ticket", post(gateway_ticket))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/login
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid identity token", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let claims =
        validate_identity_token(&body.id_token, &state.config, state.kv.as_ref()).await?;

    let subject = TokenSubject {
        user_id: claims.sub,
        email: claims.email,
    };
    let access_token = tokens::generate_access_token();
    tokens::store_access_token(state.kv.as_ref(), &access_token, &subject).await?;

    tracing::info!(user_id = %subject.user_id, "session started");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: tokens::ACCESS_TOKEN_TTL_SECS,
        user: SessionUser {
            id: subject.user_id,
            email: subject.email,
        },
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/auth/session
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/auth/session",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "No active session", body = ApiErrorBody),
    ),
)]
pub async fn session(user: AuthUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        user: SessionUser {
            id: user.user_id,
            email: user.email,
        },
    })
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/logout
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No active session", body = ApiErrorBody),
    ),
)]
pub async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    tokens::revoke_access_token(state.kv.as_ref(), &user.token).await?;
    tracing::info!(user_id = %user.user_id, "session ended");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/v1/gateway/ticket
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/gateway/ticket",
    tag = "Gateway",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Single-use gateway ticket", body = GatewayTicketResponse),
        (status = 401, description = "No active session", body = ApiErrorBody),
    ),
)]
pub async fn gateway_ticket(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<GatewayTicketResponse>, ApiError> {
    let ticket = tokens::generate_ws_ticket();
    tokens::store_ws_ticket(
        state.kv.as_ref(),
        &ticket,
        &TokenSubject {
            user_id: user.user_id,
            email: user.email,
        },
    )
    .await?;

    Ok(Json(GatewayTicketResponse {
        ticket,
        ws_url: state.config.gateway_url(),
    }))
}
