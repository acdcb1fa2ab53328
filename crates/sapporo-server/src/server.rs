//! Main sapporo-web server
//!
//! `SapporoServer` owns everything a request handler needs: configuration,
//! repositories, sessions, templates and the WES client.

use axum_extra::extract::cookie::Key;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha512};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use sapporo_core::{Repositories, User};

use crate::admin::AdminSite;
use crate::config::ServerConfig;
use crate::csrf::CsrfToken;
use crate::error::ServerResult;
use crate::session::SessionStore;
use crate::templates::{Layout, Templates};
use crate::wes::WesClient;

pub struct SapporoServer {
    pub config: ServerConfig,
    pub repos: Repositories,
    pub sessions: SessionStore,
    pub templates: Templates,
    pub wes: Arc<dyn WesClient>,
    pub admin: AdminSite,
    /// Signs the session cookie; derived from the secret key
    cookie_key: Key,
}

impl std::fmt::Debug for SapporoServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SapporoServer")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("wes", &self.wes)
            .finish()
    }
}

impl SapporoServer {
    pub fn new(
        config: ServerConfig,
        repos: Repositories,
        wes: Arc<dyn WesClient>,
        secret_key: &str,
    ) -> ServerResult<Self> {
        let templates = Templates::new(config.tz())?;
        let sessions = SessionStore::new(Duration::from_secs(config.session_idle_timeout_secs));
        Ok(Self {
            config,
            repos,
            sessions,
            templates,
            wes,
            admin: AdminSite::default_site(),
            cookie_key: Key::from(&Sha512::digest(secret_key.as_bytes())),
        })
    }

    pub fn cookie_key(&self) -> Key {
        self.cookie_key.clone()
    }

    /// Layout data for a page rendered for `user`
    pub fn layout(&self, user: Option<User>, csrf: &CsrfToken) -> Layout {
        Layout {
            language_code: self.config.language_code.clone(),
            user,
            csrf_token: csrf.0.clone(),
            user_signup: self.config.user_signup,
            debug: self.config.debug,
        }
    }

    /// Format a timestamp in the configured time zone
    pub fn localtime(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.config.tz())
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()
    }

    /// Resolve a session token to an active user
    pub async fn session_user(&self, token: &str) -> ServerResult<Option<User>> {
        let Some(user_id) = self.sessions.touch(token) else {
            return Ok(None);
        };
        match self.repos.users.find_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(Some(user)),
            _ => {
                self.sessions.destroy(token);
                Ok(None)
            }
        }
    }

    /// Serve HTTP until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting sapporo-web");

        let server = Arc::new(self);
        let app = crate::api::build_router(server.clone());

        let listener = TcpListener::bind(server.config.listen_address()).await?;
        let addr = listener.local_addr()?;
        info!("Listening on {}", addr);

        let cleanup = server.sessions.spawn_cleanup();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        cleanup.abort();
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
