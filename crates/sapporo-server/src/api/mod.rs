//! HTTP layer of the sapporo-web server
//!
//! Routes, extractors and error pages. Everything except `/health` renders
//! HTML; state-changing requests are form posts guarded by the CSRF layer.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Redirect,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod errors;
pub mod extract;
pub mod health;
pub mod pages;

use crate::csrf::csrf_protect;
use crate::server::SapporoServer;

/// Build the router for every page
pub fn build_router(server: Arc<SapporoServer>) -> Router {
    Router::new()
        // Pages
        .route("/", get(pages::home))
        .route("/services/:id", get(pages::service_detail))
        .route("/workflows/:id", get(pages::workflow_detail))
        .route("/workflows/:id/runs", post(pages::create_run))
        .route("/runs", get(pages::runs))
        .route("/runs/:id/refresh", post(pages::refresh_run))
        // Accounts
        .route("/signup", get(auth::signup_form).post(auth::signup))
        .route("/signin", get(auth::signin_form).post(auth::signin))
        .route("/signout", post(auth::signout))
        // Admin console
        .route("/admin", get(|| async { Redirect::permanent("/admin/") }))
        .route("/admin/", get(admin::index))
        .route("/admin/:model/", get(admin::list))
        .route("/admin/:model/add", get(admin::add_form).post(admin::add))
        .route("/admin/:model/:id/change", get(admin::change_form).post(admin::change))
        .route("/admin/:model/:id/delete", get(admin::delete_confirm).post(admin::delete))
        .route("/admin/:model/:id/sync", post(admin::sync))
        // Health check
        .route("/health", get(health::health_check))
        .fallback(errors::not_found)
        .layer(from_fn_with_state(server.clone(), errors::render_error_pages))
        .layer(from_fn(csrf_protect))
        .layer(TraceLayer::new_for_http())
        // Shared state
        .with_state(server)
}
