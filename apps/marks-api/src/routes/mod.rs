pub mod auth;
pub mod bookmarks;
pub mod health;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", auth::router().merge(bookmarks::router()))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::session,
        auth::logout,
        auth::gateway_ticket,
        bookmarks::list_bookmarks,
        bookmarks::create_bookmark,
        bookmarks::delete_bookmark,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            marks_common::Bookmark,
            marks_common::api::LoginRequest,
            marks_common::api::LoginResponse,
            marks_common::api::SessionUser,
            marks_common::api::SessionResponse,
            marks_common::api::ListBookmarksResponse,
            marks_common::api::GatewayTicketResponse,
            health::HealthResponse,
            bookmarks::CreateBookmarkRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Sessions"),
        (name = "Gateway", description = "Change notification gateway"),
        (name = "Bookmarks", description = "Bookmark management"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_bookmark_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/users/{owner_id}/bookmarks"));
        assert!(doc
            .paths
            .paths
            .contains_key("/api/v1/users/{owner_id}/bookmarks/{bookmark_id}"));
    }
}
