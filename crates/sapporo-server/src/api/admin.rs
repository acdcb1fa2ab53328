//! Admin console handlers
//!
//! Routes are generic over the registered models: `/admin/:model/` lists,
//! `add`, `:id/change` and `:id/delete` edit, and `:id/sync` imports
//! service-info for models that support it.

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use sapporo_core::User;

use super::errors::PageError;
use super::extract::StaffUser;
use crate::admin::{sync, AdminModel, FormData};
use crate::csrf::{CsrfToken, CSRF_FIELD};
use crate::server::SapporoServer;

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

fn model(server: &SapporoServer, slug: &str) -> Result<Arc<dyn AdminModel>, PageError> {
    server
        .admin
        .get(slug)
        .ok_or_else(|| PageError::NotFound(format!("Unknown model: {}", slug)))
}

fn render(
    server: &SapporoServer,
    user: User,
    csrf: &CsrfToken,
    template: &str,
    page: serde_json::Value,
) -> Result<Response, PageError> {
    let layout = server.layout(Some(user), csrf);
    Ok(Html(server.templates.render(template, &layout, page)?).into_response())
}

fn redirect_with_notice(path: &str, notice: &str) -> Response {
    match serde_urlencoded::to_string([("notice", notice)]) {
        Ok(query) => Redirect::to(&format!("{}?{}", path, query)).into_response(),
        Err(_) => Redirect::to(path).into_response(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn render_form(
    server: &SapporoServer,
    user: User,
    csrf: &CsrfToken,
    model: &dyn AdminModel,
    id: Option<i64>,
    form: &FormData,
    errors: Vec<String>,
    notice: Option<String>,
) -> Result<Response, PageError> {
    let fields = form.bind(model.fields(server, id).await?);
    render(
        server,
        user,
        csrf,
        "admin/form.html",
        json!({
            "model": model.meta(),
            "object_id": id,
            "fields": fields,
            "errors": errors,
            "notice": notice,
            "can_sync": model.can_sync(),
        }),
    )
}

/// Save the submitted form, re-rendering it on user errors
async fn save(
    server: &SapporoServer,
    user: User,
    csrf: &CsrfToken,
    model: &dyn AdminModel,
    id: Option<i64>,
    pairs: Vec<(String, String)>,
) -> Result<Response, PageError> {
    let form = FormData::new(pairs.into_iter().filter(|(key, _)| key != CSRF_FIELD).collect());
    match model.save(server, id, &form).await {
        Ok(saved) => {
            let meta = model.meta();
            info!(model = meta.slug, id = saved, by = %user.username, "Saved via admin");
            Ok(redirect_with_notice(
                &format!("/admin/{}/", meta.slug),
                &format!("The {} was saved successfully.", meta.name.to_lowercase()),
            ))
        }
        Err(err) if err.is_user_error() => {
            render_form(server, user, csrf, model, id, &form, vec![err.user_message()], None).await
        }
        Err(err) => Err(err.into()),
    }
}

/// `/admin/`: registered models
pub async fn index(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
) -> Result<Response, PageError> {
    let metas = server.admin.metas();
    render(&server, user, &csrf, "admin/index.html", json!({ "models": metas }))
}

pub async fn list(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
    Path(slug): Path<String>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    let rows = model.rows(&server).await?;
    render(
        &server,
        user,
        &csrf,
        "admin/list.html",
        json!({ "model": model.meta(), "rows": rows, "notice": query.notice }),
    )
}

pub async fn add_form(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
    Path(slug): Path<String>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    let mut initial = FormData::default();
    if slug == "users" {
        initial.set("is_active", "on");
    }
    render_form(&server, user, &csrf, model.as_ref(), None, &initial, Vec::new(), None).await
}

pub async fn add(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
    Path(slug): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    save(&server, user, &csrf, model.as_ref(), None, pairs).await
}

pub async fn change_form(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
    Path((slug, id)): Path<(String, i64)>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    let initial = model.initial(&server, id).await?;
    render_form(&server, user, &csrf, model.as_ref(), Some(id), &initial, Vec::new(), query.notice).await
}

pub async fn change(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
    Path((slug, id)): Path<(String, i64)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    save(&server, user, &csrf, model.as_ref(), Some(id), pairs).await
}

pub async fn delete_confirm(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    csrf: CsrfToken,
    Path((slug, id)): Path<(String, i64)>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    let label = model.label(&server, id).await?;
    render(
        &server,
        user,
        &csrf,
        "admin/confirm_delete.html",
        json!({ "model": model.meta(), "object_id": id, "label": label }),
    )
}

pub async fn delete(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    Path((slug, id)): Path<(String, i64)>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    let label = model.label(&server, id).await?;
    model.delete(&server, id).await?;
    let meta = model.meta();
    info!(model = meta.slug, id, by = %user.username, "Deleted via admin");
    Ok(redirect_with_notice(
        &format!("/admin/{}/", meta.slug),
        &format!("The {} \"{}\" was deleted successfully.", meta.name.to_lowercase(), label),
    ))
}

/// `POST /admin/:model/:id/sync`
pub async fn sync(
    State(server): State<Arc<SapporoServer>>,
    StaffUser(user): StaffUser,
    Path((slug, id)): Path<(String, i64)>,
) -> Result<Response, PageError> {
    let model = model(&server, &slug)?;
    if !model.can_sync() {
        return Err(PageError::NotFound(format!("{} has no sync action", model.meta().name)));
    }
    let change_url = format!("/admin/{}/{}/change", slug, id);
    match sync::sync_service(&server, id).await {
        Ok(report) => {
            info!(service = id, by = %user.username, "Service synced via admin");
            Ok(redirect_with_notice(&change_url, &report.to_string()))
        }
        Err(err) if err.is_user_error() || matches!(err, crate::error::ServerError::WesError(_)) => {
            warn!(?err, service = id, "Sync from service-info failed");
            Ok(redirect_with_notice(&change_url, &format!("Sync failed: {}", err.user_message())))
        }
        Err(err) => Err(err.into()),
    }
}
