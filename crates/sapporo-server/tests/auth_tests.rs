mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use pretty_assertions::assert_eq;

use common::{body_text, location, session_cookie, test_config, MockWes, TestApp, CSRF, PASSWORD};
use sapporo_server::ServerConfig;

#[tokio::test]
async fn signup_is_forbidden_when_disabled() {
    let config = ServerConfig {
        user_signup: false,
        ..test_config()
    };
    let app = TestApp::new(config, MockWes::new());

    let response = app.get("/signup").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("Sign-up is disabled."));

    let response = app
        .post(
            "/signup",
            &[("username", "alice"), ("password1", PASSWORD), ("password2", PASSWORD)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.server.repos.users.find_by_username("alice").await.unwrap().is_none());

    let signin = body_text(app.get("/signin").await).await;
    assert!(!signin.contains("href=\"/signup\""));
}

#[tokio::test]
async fn signup_creates_an_account() {
    let app = TestApp::with_defaults();

    let response = app
        .post(
            "/signup",
            &[("username", "alice"), ("password1", PASSWORD), ("password2", PASSWORD)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/signin");

    let user = app.server.repos.users.find_by_username("alice").await.unwrap().unwrap();
    assert!(user.is_active);
    assert!(!user.is_staff);
    assert!(user.password_hash.starts_with("pbkdf2_sha256$260000$"));
}

#[tokio::test]
async fn signup_reports_weak_passwords_and_duplicates() {
    let app = TestApp::with_defaults();
    app.create_user("bob", false).await;

    let response = app
        .post(
            "/signup",
            &[("username", "carol"), ("password1", "12345678"), ("password2", "12345678")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("This password is entirely numeric."));
    assert!(html.contains("This password is too common."));

    let response = app
        .post(
            "/signup",
            &[("username", "bob"), ("password1", PASSWORD), ("password2", PASSWORD)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("A user with that username already exists."));
}

#[tokio::test]
async fn signin_redirects_to_next() {
    let app = TestApp::with_defaults();
    let user = app.create_user("alice", false).await;

    let response = app
        .post(
            "/signin",
            &[("username", "alice"), ("password", PASSWORD), ("next", "/runs")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/runs");
    assert!(session_cookie(&response).is_some());

    let user = app.server.repos.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn signin_ignores_external_next() {
    let app = TestApp::with_defaults();
    app.create_user("alice", false).await;

    let response = app
        .post(
            "/signin",
            &[("username", "alice"), ("password", PASSWORD), ("next", "https://evil.example.com/")],
        )
        .await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn next_with_control_characters_falls_back_to_top() {
    let app = TestApp::with_defaults();
    app.create_user("alice", false).await;

    let response = app
        .post(
            "/signin",
            &[("username", "alice"), ("password", PASSWORD), ("next", "/runs\n")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn bad_credentials_rerender_the_form() {
    let app = TestApp::with_defaults();
    let user = app.create_user("alice", false).await;

    let response = app
        .post("/signin", &[("username", "alice"), ("password", "wrong-password")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());
    assert!(body_text(response)
        .await
        .contains("Please enter a correct username and password."));

    let mut draft = sapporo_core::UserDraft::regular(user.username.clone(), user.password_hash.clone());
    draft.is_active = false;
    app.server.repos.users.update(user.id, draft).await.unwrap();

    let response = app
        .post("/signin", &[("username", "alice"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn signin_page_has_no_placeholders() {
    let app = TestApp::with_defaults();
    let response = app.get("/signin").await;
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("<html lang=\"ja\">"));
    assert!(html.contains("href=\"/signup\""));
    assert!(!html.contains("placeholder"));
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_signin() {
    let app = TestApp::with_defaults();

    for path in ["/", "/runs", "/services/1"] {
        let response = app.get(path).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", path);
        let target = location(&response);
        assert!(target.starts_with("/signin?next="), "{}", target);
    }
    assert_eq!(location(&app.get("/runs").await), "/signin?next=%2Fruns");
}

#[tokio::test]
async fn signout_ends_the_session() {
    let mut app = TestApp::with_defaults();
    app.create_user("alice", false).await;
    app.sign_in("alice").await;

    assert_eq!(app.get("/").await.status(), StatusCode::OK);
    assert_eq!(app.server.sessions.len(), 1);

    let response = app.post("/signout", &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(app.server.sessions.is_empty());

    // The old cookie no longer resolves to anyone
    assert_eq!(app.get("/").await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn tampered_session_cookie_is_ignored() {
    let app = TestApp::with_defaults();
    app.create_user("alice", false).await;
    let token = app.server.sessions.create(1);

    let request = Request::builder()
        .uri("/")
        .header(header::COOKIE, format!("csrftoken={}; sessionid={}", CSRF, token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn posts_without_csrf_token_are_rejected() {
    let app = TestApp::with_defaults();
    app.create_user("alice", false).await;

    let request = Request::builder()
        .method("POST")
        .uri("/signin")
        .header(header::COOKIE, format!("csrftoken={}", CSRF))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username=alice&password={}", PASSWORD)))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("CSRF verification failed"));
}

#[tokio::test]
async fn first_visit_issues_csrf_cookie() {
    let app = TestApp::with_defaults();
    let request = Request::builder().uri("/signin").body(Body::empty()).unwrap();
    let response = app.send(request).await;

    let cookie = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("csrftoken="))
        .map(str::to_string)
        .unwrap();
    let token = cookie.trim_start_matches("csrftoken=").split(';').next().unwrap();
    assert!(body_text(response).await.contains(token));
}
