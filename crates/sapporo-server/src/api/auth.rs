//! Sign-up, sign-in and sign-out

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

use sapporo_core::domain::user::validate_username;
use sapporo_core::UserDraft;

use super::errors::PageError;
use super::extract::MaybeUser;
use crate::auth::{authenticate, hash_password, validate_password};
use crate::csrf::CsrfToken;
use crate::error::ServerError;
use crate::server::SapporoServer;
use crate::session::{removal_cookie, session_cookie, SESSION_COOKIE};

/// Where to go after signing in or out
pub const LOGIN_REDIRECT_URL: &str = "/";
pub const LOGOUT_REDIRECT_URL: &str = "/";

const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SigninForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 150, message = "Username: ensure this value has 1 to 150 characters."))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password: this field is required."))]
    pub password1: String,
    #[serde(default)]
    #[validate(must_match = "password1")]
    pub password2: String,
}

/// Only same-site absolute paths are followed after sign-in
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(next)
            if next.starts_with('/')
                && !next.starts_with("//")
                && !next.contains('\\')
                && HeaderValue::from_str(next).is_ok() =>
        {
            next
        }
        _ => LOGIN_REDIRECT_URL,
    }
}

fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let field_errors = errors.field_errors();
    let mut messages = Vec::new();
    for field in ["username", "password1", "password2"] {
        for error in field_errors.get(field).map(|v| v.as_slice()).unwrap_or_default() {
            let message = match (&error.message, &*error.code) {
                (Some(message), _) => message.to_string(),
                (None, "must_match") => "The two password fields didn't match.".to_string(),
                (None, code) => format!("{}: {}", field, code),
            };
            messages.push(message);
        }
    }
    messages
}

fn render(
    server: &SapporoServer,
    csrf: &CsrfToken,
    template: &str,
    page: serde_json::Value,
) -> Result<Response, PageError> {
    let layout = server.layout(None, csrf);
    Ok(Html(server.templates.render(template, &layout, page)?).into_response())
}

pub async fn signin_form(
    State(server): State<Arc<SapporoServer>>,
    csrf: CsrfToken,
    Query(query): Query<NextQuery>,
) -> Result<Response, PageError> {
    let next = safe_next(query.next.as_deref()).to_string();
    render(
        &server,
        &csrf,
        "signin.html",
        json!({"errors": [], "username": "", "next": next}),
    )
}

pub async fn signin(
    State(server): State<Arc<SapporoServer>>,
    csrf: CsrfToken,
    headers: HeaderMap,
    Form(form): Form<SigninForm>,
) -> Result<Response, PageError> {
    let jar = SignedCookieJar::from_headers(&headers, server.cookie_key());
    let next = safe_next(form.next.as_deref()).to_string();
    let user = server.repos.users.find_by_username(form.username.trim()).await?;

    let Some(user) = user.filter(|user| authenticate(user, &form.password)) else {
        warn!(username = %form.username, "Failed sign-in");
        return render(
            &server,
            &csrf,
            "signin.html",
            json!({"errors": [INVALID_LOGIN], "username": form.username, "next": next}),
        );
    };

    if let Some(old) = jar.get(SESSION_COOKIE) {
        server.sessions.destroy(old.value());
    }
    let token = server.sessions.create(user.id);
    server.repos.users.record_login(user.id).await?;
    info!(user_id = user.id, username = %user.username, "User signed in");

    Ok((jar.add(session_cookie(token)), Redirect::to(&next)).into_response())
}

pub async fn signup_form(
    State(server): State<Arc<SapporoServer>>,
    csrf: CsrfToken,
) -> Result<Response, PageError> {
    if !server.config.user_signup {
        return Err(PageError::Forbidden("Sign-up is disabled.".to_string()));
    }
    render(&server, &csrf, "signup.html", json!({"errors": [], "username": ""}))
}

pub async fn signup(
    State(server): State<Arc<SapporoServer>>,
    csrf: CsrfToken,
    Form(form): Form<SignupForm>,
) -> Result<Response, PageError> {
    if !server.config.user_signup {
        return Err(PageError::Forbidden("Sign-up is disabled.".to_string()));
    }

    let username = form.username.trim().to_string();
    let mut errors = match form.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => validation_messages(&errors),
    };
    if let Err(err) = validate_username(&username) {
        errors.push(ServerError::from(err).user_message());
    }
    if !form.password1.is_empty() && form.password1 == form.password2 {
        errors.extend(validate_password(&form.password1, &username));
    }

    if errors.is_empty() {
        let draft = UserDraft::regular(username.clone(), hash_password(&form.password1));
        match server.repos.users.insert(draft).await {
            Ok(user) => {
                info!(user_id = user.id, username = %user.username, "User signed up");
                return Ok(Redirect::to("/signin").into_response());
            }
            Err(err) => {
                let err = ServerError::from(err);
                if !err.is_user_error() {
                    return Err(err.into());
                }
                if matches!(err, ServerError::Conflict(_)) {
                    errors.push("A user with that username already exists.".to_string());
                } else {
                    errors.push(err.user_message());
                }
            }
        }
    }

    render(
        &server,
        &csrf,
        "signup.html",
        json!({"errors": errors, "username": username}),
    )
}

pub async fn signout(
    State(server): State<Arc<SapporoServer>>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
) -> Response {
    let jar = SignedCookieJar::from_headers(&headers, server.cookie_key());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        server.sessions.destroy(cookie.value());
    }
    if let Some(user) = user {
        info!(user_id = user.id, "User signed out");
    }
    (jar.remove(removal_cookie()), Redirect::to(LOGOUT_REDIRECT_URL)).into_response()
}
