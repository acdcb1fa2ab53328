//! Request extractors for the signed-in user and the CSRF token

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use std::convert::Infallible;
use std::sync::Arc;

use sapporo_core::User;

use super::errors::PageError;
use crate::csrf::CsrfToken;
use crate::server::SapporoServer;
use crate::session::SESSION_COOKIE;

/// Path of the sign-in page
pub const LOGIN_URL: &str = "/signin";

async fn resolve_user(parts: &Parts, server: &SapporoServer) -> Result<Option<User>, PageError> {
    let jar = SignedCookieJar::from_headers(&parts.headers, server.cookie_key());
    match jar.get(SESSION_COOKIE) {
        Some(cookie) => Ok(server.session_user(cookie.value()).await?),
        None => Ok(None),
    }
}

/// `/signin?next=<current path>`
pub fn login_redirect(parts: &Parts) -> Redirect {
    let next = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    match serde_urlencoded::to_string([("next", next)]) {
        Ok(query) => Redirect::to(&format!("{}?{}", LOGIN_URL, query)),
        Err(_) => Redirect::to(LOGIN_URL),
    }
}

/// Signed-in user, or nobody
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<SapporoServer>> for MaybeUser {
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, server: &Arc<SapporoServer>) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve_user(parts, server).await?))
    }
}

/// Signed-in user; anonymous visitors are sent to the sign-in page
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<SapporoServer>> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, server: &Arc<SapporoServer>) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, server).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(login_redirect(parts).into_response()),
            Err(err) => Err(err.into_response()),
        }
    }
}

/// Signed-in staff user; other users get 403
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<SapporoServer>> for StaffUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, server: &Arc<SapporoServer>) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, server).await?;
        if !user.is_staff {
            return Err(
                PageError::Forbidden("You do not have permission to access the administration.".to_string())
                    .into_response(),
            );
        }
        Ok(StaffUser(user))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CsrfToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .unwrap_or_else(|| CsrfToken(String::new())))
    }
}
