//! Shared fixtures for the router tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use mockall::mock;
use std::sync::Arc;
use tower::ServiceExt;

use sapporo_core::{RunState, User, UserDraft};
use sapporo_server::api::build_router;
use sapporo_server::auth::hash_password;
use sapporo_server::wes::{RunRequest, ServiceInfo, WesClient};
use sapporo_server::{SapporoServer, ServerConfig, ServerResult};

pub const CSRF: &str = "test-csrf-token";
pub const PASSWORD: &str = "correct-horse-battery";

/// The WES calls as a plain trait; [`FakeWes`] forwards [`WesClient`] to its mock
#[async_trait]
pub trait WesCalls: Send + Sync {
    async fn service_info(&self, endpoint: &str) -> ServerResult<ServiceInfo>;
    async fn submit_run(&self, endpoint: &str, request: &RunRequest) -> ServerResult<String>;
    async fn run_status(&self, endpoint: &str, run_id: &str) -> ServerResult<RunState>;
}

mock! {
    pub Wes {}

    #[async_trait]
    impl WesCalls for Wes {
        async fn service_info(&self, endpoint: &str) -> ServerResult<ServiceInfo>;
        async fn submit_run(&self, endpoint: &str, request: &RunRequest) -> ServerResult<String>;
        async fn run_status(&self, endpoint: &str, run_id: &str) -> ServerResult<RunState>;
    }
}

pub struct FakeWes(pub MockWes);

impl std::fmt::Debug for FakeWes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FakeWes")
    }
}

#[async_trait]
impl WesClient for FakeWes {
    async fn service_info(&self, endpoint: &str) -> ServerResult<ServiceInfo> {
        self.0.service_info(endpoint).await
    }

    async fn submit_run(&self, endpoint: &str, request: &RunRequest) -> ServerResult<String> {
        self.0.submit_run(endpoint, request).await
    }

    async fn run_status(&self, endpoint: &str, run_id: &str) -> ServerResult<RunState> {
        self.0.run_status(endpoint, run_id).await
    }
}

/// Router over an in-memory store plus the cookies of one browser
pub struct TestApp {
    pub server: Arc<SapporoServer>,
    router: Router,
    session: Option<String>,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        debug: true,
        language_code: "ja".to_string(),
        time_zone: "Asia/Tokyo".to_string(),
        ..ServerConfig::default()
    }
}

impl TestApp {
    pub fn new(config: ServerConfig, wes: MockWes) -> Self {
        let repos = sapporo_state_inmemory::create_repositories();
        let server = SapporoServer::new(config, repos, Arc::new(FakeWes(wes)), "test-secret-key").unwrap();
        let server = Arc::new(server);
        let router = build_router(server.clone());
        Self {
            server,
            router,
            session: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(test_config(), MockWes::new())
    }

    pub async fn create_user(&self, username: &str, staff: bool) -> User {
        let draft = if staff {
            UserDraft::superuser(username, hash_password(PASSWORD))
        } else {
            UserDraft::regular(username, hash_password(PASSWORD))
        };
        self.server.repos.users.insert(draft).await.unwrap()
    }

    fn cookies(&self) -> String {
        match &self.session {
            Some(session) => format!("csrftoken={}; {}", CSRF, session),
            None => format!("csrftoken={}", CSRF),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str) -> Response {
        let request = Request::builder()
            .uri(path)
            .header(header::COOKIE, self.cookies())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Post a form with the CSRF field filled in
    pub async fn post(&self, path: &str, pairs: &[(&str, &str)]) -> Response {
        let mut fields: Vec<(&str, &str)> = vec![("csrfmiddlewaretoken", CSRF)];
        fields.extend_from_slice(pairs);
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::COOKIE, self.cookies())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(serde_urlencoded::to_string(&fields).unwrap()))
            .unwrap();
        self.send(request).await
    }

    /// Sign in through the form and keep the session cookie
    pub async fn sign_in(&mut self, username: &str) {
        let response = self
            .post("/signin", &[("username", username), ("password", PASSWORD)])
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        self.session = Some(session_cookie(&response).expect("session cookie"));
    }

    pub fn sign_out_locally(&mut self) {
        self.session = None;
    }
}

/// `sessionid=<value>` from the Set-Cookie headers
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.starts_with("sessionid="))
        .map(|value| value.split(';').next().unwrap_or_default().to_string())
        .next()
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
