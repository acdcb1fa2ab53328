//! Double-submit cookie CSRF protection
//!
//! Every response carries a `csrftoken` cookie. Unsafe requests must echo the
//! cookie value in the `csrfmiddlewaretoken` form field or the `X-CSRFToken`
//! header, otherwise they are rejected with 403 before reaching a handler.

use axum::{
    body::{self, Body},
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";
pub const CSRF_HEADER: &str = "x-csrftoken";

/// Largest form body buffered for the token check
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// Token of the current request, placed in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Middleware enforcing the token on unsafe methods
pub async fn csrf_protect(mut request: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let existing = jar
        .get(CSRF_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    if !is_safe(request.method()) {
        let Some(expected) = existing.as_deref() else {
            warn!(path = %request.uri().path(), "Rejected request without CSRF cookie");
            return reject("CSRF cookie not set.");
        };
        let submitted = match submitted_token(request).await {
            Ok((submitted, rebuilt)) => {
                request = rebuilt;
                submitted
            }
            Err(response) => return response,
        };
        if !tokens_match(expected, submitted.as_deref()) {
            warn!(path = %request.uri().path(), "Rejected request with bad CSRF token");
            return reject("CSRF token missing or incorrect.");
        }
    }

    let (token, fresh) = match existing {
        Some(token) => (token, false),
        None => (generate_token(), true),
    };
    request.extensions_mut().insert(CsrfToken(token.clone()));

    let mut response = next.run(request).await;
    if fresh {
        let cookie = Cookie::build((CSRF_COOKIE, token))
            .path("/")
            .same_site(SameSite::Lax)
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => error!(?err, "Failed to encode CSRF cookie"),
        }
    }
    response
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

fn tokens_match(expected: &str, submitted: Option<&str>) -> bool {
    match submitted {
        Some(submitted) => expected.as_bytes().ct_eq(submitted.as_bytes()).into(),
        None => false,
    }
}

/// Read the token from the header or the form body, handing back an
/// equivalent request for the handler
async fn submitted_token(request: Request) -> Result<(Option<String>, Request), Response> {
    if let Some(value) = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        let value = value.to_string();
        return Ok((Some(value), request));
    }

    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if !is_form {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| (StatusCode::PAYLOAD_TOO_LARGE, "Form body too large").into_response())?;
    let token = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
        .ok()
        .and_then(|pairs| {
            pairs
                .into_iter()
                .find(|(key, _)| key == CSRF_FIELD)
                .map(|(_, value)| value)
        });
    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn reject(reason: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Html(format!(
            "<!DOCTYPE html><html><head><title>403 Forbidden</title></head>\
             <body><h1>Forbidden (403)</h1><p>CSRF verification failed. Request aborted.</p>\
             <p>{}</p></body></html>",
            reason
        )),
    )
        .into_response()
}
