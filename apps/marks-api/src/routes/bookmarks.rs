//! Owner-scoped bookmark endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use marks_common::api::ListBookmarksResponse;
use marks_common::gateway::{BookmarkDeletePayload, EventName};
use marks_common::Bookmark;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::fanout::BroadcastPayload;
use crate::AppState;

const MAX_TITLE_CHARS: usize = 200;
const MAX_URL_CHARS: usize = 2048;

/// Path alias for the bearer's own owner id.
const SELF_ALIAS: &str = "@me";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/{owner_id}/bookmarks",
            get(list_bookmarks).post(create_bookmark),
        )
        .route(
            "/users/{owner_id}/bookmarks/{bookmark_id}",
            delete(delete_bookmark),
        )
}

/// Resolve the `{owner_id}` path segment against the bearer identity.
fn resolve_owner(owner_id: &str, user: &AuthUser) -> Result<String, ApiError> {
    if owner_id == SELF_ALIAS || owner_id == user.user_id {
        Ok(user.user_id.clone())
    } else {
        Err(ApiError::forbidden("Bookmarks are only visible to their owner"))
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/users/:owner_id/bookmarks
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/users/{owner_id}/bookmarks",
    tag = "Bookmarks",
    security(("bearer" = [])),
    params(("owner_id" = String, Path, description = "Owner ID or @me")),
    responses(
        (status = 200, description = "Bookmarks, newest first", body = ListBookmarksResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the owner", body = ApiErrorBody),
    ),
)]
pub async fn list_bookmarks(
    user: AuthUser,
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<ListBookmarksResponse>, ApiError> {
    let owner_id = resolve_owner(&owner_id, &user)?;
    let data = state.bookmarks.list(&owner_id).await?;
    Ok(Json(ListBookmarksResponse { data }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/users/:owner_id/bookmarks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookmarkRequest {
    pub title: Option<String>,
    pub url: Option<String>,
}

fn check_field(
    errors: &mut Vec<FieldError>,
    field: &str,
    label: &str,
    value: Option<&str>,
    max_chars: usize,
) {
    match value {
        None | Some("") => errors.push(FieldError::new(field, format!("{label} is required"))),
        Some(v) if v.chars().count() > max_chars => errors.push(FieldError::new(
            field,
            format!("{label} must be at most {max_chars} characters"),
        )),
        Some(_) => {}
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{owner_id}/bookmarks",
    tag = "Bookmarks",
    security(("bearer" = [])),
    params(("owner_id" = String, Path, description = "Owner ID or @me")),
    request_body = CreateBookmarkRequest,
    responses(
        (status = 201, description = "Bookmark created", body = Bookmark),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the owner", body = ApiErrorBody),
    ),
)]
pub async fn create_bookmark(
    user: AuthUser,
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(body): Json<CreateBookmarkRequest>,
) -> Result<(StatusCode, Json<Bookmark>), ApiError> {
    let owner_id = resolve_owner(&owner_id, &user)?;

    let title = body.title.as_deref().map(str::trim);
    let url = body.url.as_deref().map(str::trim);

    let mut errors = Vec::new();
    check_field(&mut errors, "title", "Title", title, MAX_TITLE_CHARS);
    check_field(&mut errors, "url", "URL", url, MAX_URL_CHARS);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let created = state
        .bookmarks
        .insert(&owner_id, title.unwrap_or_default(), url.unwrap_or_default())
        .await?;

    let reached = state.broadcast.dispatch(
        &owner_id,
        BroadcastPayload {
            event_name: EventName::BOOKMARK_CREATE.to_string(),
            data: serde_json::to_value(&created)?,
        },
    );
    tracing::debug!(bookmark_id = %created.id, %owner_id, sessions = reached, "bookmark created");

    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/users/:owner_id/bookmarks/:bookmark_id
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BookmarkPath {
    pub owner_id: String,
    pub bookmark_id: String,
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{owner_id}/bookmarks/{bookmark_id}",
    tag = "Bookmarks",
    security(("bearer" = [])),
    params(
        ("owner_id" = String, Path, description = "Owner ID or @me"),
        ("bookmark_id" = String, Path, description = "Bookmark ID"),
    ),
    responses(
        (status = 204, description = "Bookmark deleted, or nothing matched"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn delete_bookmark(
    user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<BookmarkPath>,
) -> Result<StatusCode, ApiError> {
    // A foreign owner segment matches no row of the bearer: nothing to do.
    let Ok(owner_id) = resolve_owner(&path.owner_id, &user) else {
        return Ok(StatusCode::NO_CONTENT);
    };

    let removed = state.bookmarks.delete(&path.bookmark_id, &owner_id).await?;
    if removed {
        state.broadcast.dispatch(
            &owner_id,
            BroadcastPayload {
                event_name: EventName::BOOKMARK_DELETE.to_string(),
                data: serde_json::to_value(BookmarkDeletePayload {
                    id: path.bookmark_id.clone(),
                    owner_id: owner_id.clone(),
                })?,
            },
        );
        tracing::debug!(bookmark_id = %path.bookmark_id, %owner_id, "bookmark deleted");
    }

    Ok(StatusCode::NO_CONTENT)
}
