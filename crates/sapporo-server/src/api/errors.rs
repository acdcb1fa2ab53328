//! Error pages
//!
//! Handlers return [`PageError`]. Its response only carries the status and a
//! marker; the [`render_error_pages`] middleware turns the marker into a full
//! HTML page with the usual layout.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use sapporo_core::CoreError;

use crate::csrf::CsrfToken;
use crate::error::ServerError;
use crate::server::SapporoServer;
use crate::session::SESSION_COOKIE;

/// Error returned by page handlers
#[derive(Debug)]
pub enum PageError {
    /// Forbidden (403)
    Forbidden(String),
    /// Not found (404)
    NotFound(String),
    /// Wrapped server error
    ServerError(ServerError),
}

impl From<ServerError> for PageError {
    fn from(err: ServerError) -> Self {
        PageError::ServerError(err)
    }
}

impl From<CoreError> for PageError {
    fn from(err: CoreError) -> Self {
        PageError::ServerError(err.into())
    }
}

/// Status and message of an error response still to be rendered
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub message: String,
}

impl PageError {
    fn page(&self) -> ErrorPage {
        let (status, message) = match self {
            PageError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            PageError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            PageError::ServerError(err) => match err {
                ServerError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                ServerError::ValidationError(_) | ServerError::Conflict(_) => {
                    (StatusCode::BAD_REQUEST, err.user_message())
                }
                ServerError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
                ServerError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
                ServerError::WesError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A server error occurred. Please contact the administrator.".to_string(),
                ),
            },
        };
        ErrorPage { status, message }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let page = self.page();
        if page.status.is_server_error() {
            error!(error = ?self, "Request failed");
        }
        let mut response = (page.status, page.message.clone()).into_response();
        response.extensions_mut().insert(page);
        response
    }
}

/// Fallback for unknown paths
pub async fn not_found() -> PageError {
    PageError::NotFound("The requested resource was not found on this server.".to_string())
}

/// Render [`ErrorPage`] markers into HTML
pub async fn render_error_pages(
    State(server): State<Arc<SapporoServer>>,
    request: Request,
    next: Next,
) -> Response {
    let csrf = request
        .extensions()
        .get::<CsrfToken>()
        .cloned()
        .unwrap_or_else(|| CsrfToken(String::new()));
    let session = SignedCookieJar::from_headers(request.headers(), server.cookie_key())
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    let response = next.run(request).await;
    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };

    let user = match session {
        Some(token) => server.session_user(&token).await.unwrap_or_default(),
        None => None,
    };
    let layout = server.layout(user, &csrf);
    let title = page.status.canonical_reason().unwrap_or("Error");
    match server.templates.render(
        "error.html",
        &layout,
        json!({"status": page.status.as_u16(), "title": title, "message": page.message}),
    ) {
        Ok(html) => (page.status, Html(html)).into_response(),
        Err(err) => {
            error!(?err, "Failed to render error page");
            response
        }
    }
}
