//! Pages for signed-in users: services, workflows and runs

use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use sapporo_core::{
    Run, RunDraft, RunState, Service, User, Workflow, WorkflowEngine, WorkflowType,
};

use super::errors::PageError;
use super::extract::CurrentUser;
use crate::csrf::CsrfToken;
use crate::error::{ServerError, ServerResult};
use crate::server::SapporoServer;
use crate::wes::RunRequest;

#[derive(Debug, Serialize)]
struct EngineItem {
    engine: WorkflowEngine,
    types: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WorkflowItem {
    workflow: Workflow,
    type_label: String,
}

#[derive(Debug, Serialize)]
struct RunItem {
    run: Run,
    workflow_name: String,
    engine_label: String,
}

/// Values of the run creation form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub workflow_engine_id: Option<i64>,
    #[serde(default)]
    pub parameters: String,
    /// Checkbox: submit to the WES endpoint right away
    #[serde(default)]
    pub submit: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunFormView {
    name: String,
    workflow_engine_id: Option<i64>,
    parameters: String,
    submit: bool,
}

fn render<P: Serialize>(
    server: &SapporoServer,
    user: User,
    csrf: &CsrfToken,
    template: &str,
    page: P,
) -> Result<Response, PageError> {
    let layout = server.layout(Some(user), csrf);
    Ok(Html(server.templates.render(template, &layout, page)?).into_response())
}

async fn find_service(server: &SapporoServer, id: i64) -> Result<Service, PageError> {
    server
        .repos
        .services
        .find_by_id(id)
        .await?
        .ok_or_else(|| PageError::NotFound(format!("Service {} does not exist.", id)))
}

async fn find_workflow(server: &SapporoServer, id: i64) -> Result<Workflow, PageError> {
    server
        .repos
        .workflows
        .find_by_id(id)
        .await?
        .ok_or_else(|| PageError::NotFound(format!("Workflow {} does not exist.", id)))
}

async fn type_labels(server: &SapporoServer) -> ServerResult<HashMap<i64, WorkflowType>> {
    Ok(server
        .repos
        .workflow_types
        .list()
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect())
}

/// `/`: registered services
pub async fn home(
    State(server): State<Arc<SapporoServer>>,
    CurrentUser(user): CurrentUser,
    csrf: CsrfToken,
) -> Result<Response, PageError> {
    let services = server.repos.services.list().await?;
    render(&server, user, &csrf, "home.html", json!({ "services": services }))
}

/// `/services/:id`: versions, engines and workflows of a service
pub async fn service_detail(
    State(server): State<Arc<SapporoServer>>,
    CurrentUser(user): CurrentUser,
    csrf: CsrfToken,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let service = find_service(&server, id).await?;
    let types = type_labels(&server).await?;
    let label = |id: &i64| {
        types
            .get(id)
            .map(|t| format!("{} {}", t.name, t.version))
            .unwrap_or_default()
    };

    let wes_versions = server.repos.wes_versions.list_for_service(id).await?;
    let engines: Vec<EngineItem> = server
        .repos
        .workflow_engines
        .list_for_service(id)
        .await?
        .into_iter()
        .map(|engine| EngineItem {
            types: engine.workflow_type_ids.iter().map(label).collect(),
            engine,
        })
        .collect();
    let workflows: Vec<WorkflowItem> = server
        .repos
        .workflows
        .list_for_service(id)
        .await?
        .into_iter()
        .map(|workflow| WorkflowItem {
            type_label: workflow.workflow_type_id.as_ref().map(label).unwrap_or_default(),
            workflow,
        })
        .collect();

    render(
        &server,
        user,
        &csrf,
        "service.html",
        json!({
            "service": service,
            "wes_versions": wes_versions,
            "engines": engines,
            "workflows": workflows,
        }),
    )
}

async fn render_workflow(
    server: &SapporoServer,
    user: User,
    csrf: &CsrfToken,
    workflow: Workflow,
    form: RunFormView,
    errors: Vec<String>,
) -> Result<Response, PageError> {
    let service = find_service(server, workflow.service_id).await?;
    let engines = server.repos.workflow_engines.list_for_service(service.id).await?;
    let executable: Vec<&WorkflowEngine> = workflow.find_executable_engines(&engines);
    let workflow_type = match workflow.workflow_type_id {
        Some(type_id) => server.repos.workflow_types.find_by_id(type_id).await?,
        None => None,
    };
    render(
        server,
        user,
        csrf,
        "workflow.html",
        json!({
            "workflow": workflow,
            "service": service,
            "workflow_type": workflow_type,
            "engines": executable,
            "form": form,
            "errors": errors,
        }),
    )
}

/// `/workflows/:id`: workflow detail and the run form
pub async fn workflow_detail(
    State(server): State<Arc<SapporoServer>>,
    CurrentUser(user): CurrentUser,
    csrf: CsrfToken,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let workflow = find_workflow(&server, id).await?;
    let form = RunFormView {
        name: workflow.name.clone(),
        workflow_engine_id: None,
        parameters: workflow.parameters_template.clone(),
        submit: true,
    };
    render_workflow(&server, user, &csrf, workflow, form, Vec::new()).await
}

/// `POST /workflows/:id/runs`: record a run and optionally submit it
pub async fn create_run(
    State(server): State<Arc<SapporoServer>>,
    CurrentUser(user): CurrentUser,
    csrf: CsrfToken,
    Path(id): Path<i64>,
    Form(form): Form<RunForm>,
) -> Result<Response, PageError> {
    let workflow = find_workflow(&server, id).await?;
    let engines = server.repos.workflow_engines.list_for_service(workflow.service_id).await?;
    let engine = form
        .workflow_engine_id
        .and_then(|engine_id| engines.iter().find(|engine| engine.id == engine_id))
        .filter(|engine| workflow.can_run_on(engine))
        .cloned();

    let view = RunFormView {
        name: form.name.clone(),
        workflow_engine_id: form.workflow_engine_id,
        parameters: form.parameters.clone(),
        submit: form.submit.is_some(),
    };

    let Some(engine) = engine else {
        let errors = vec!["Select a workflow engine that can execute this workflow.".to_string()];
        return render_workflow(&server, user, &csrf, workflow, view, errors).await;
    };

    let draft = RunDraft {
        user_id: user.id,
        workflow_id: workflow.id,
        workflow_engine_id: Some(engine.id),
        name: form.name.trim().to_string(),
        run_id: None,
        state: RunState::Unknown,
        parameters: form.parameters.clone(),
    };
    let run = match server.repos.runs.insert(draft).await {
        Ok(run) => run,
        Err(err) => {
            let err = ServerError::from(err);
            if !err.is_user_error() {
                return Err(err.into());
            }
            return render_workflow(&server, user, &csrf, workflow, view, vec![err.user_message()]).await;
        }
    };
    info!(run = run.id, workflow = workflow.id, engine = engine.id, "Run created");

    if form.submit.is_some() {
        if let Err(err) = submit(&server, &run, &workflow, &engine).await {
            error!(?err, run = run.id, "Failed to submit run");
        }
    }

    Ok(Redirect::to("/runs").into_response())
}

async fn submit(
    server: &SapporoServer,
    run: &Run,
    workflow: &Workflow,
    engine: &WorkflowEngine,
) -> ServerResult<()> {
    let service = server
        .repos
        .services
        .find_by_id(workflow.service_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("service {}", workflow.service_id)))?;
    let workflow_type = match workflow.workflow_type_id {
        Some(type_id) => server.repos.workflow_types.find_by_id(type_id).await?,
        None => None,
    };
    let (type_name, type_version) = workflow_type
        .map(|t| (t.name, t.version))
        .unwrap_or_default();

    let request = RunRequest {
        workflow_params: if run.parameters.trim().is_empty() {
            "{}".to_string()
        } else {
            run.parameters.clone()
        },
        workflow_type: type_name,
        workflow_type_version: type_version,
        tags: "{}".to_string(),
        workflow_engine_name: Some(engine.name.clone()),
        workflow_engine_parameters: "{}".to_string(),
        workflow_url: workflow.location.clone(),
        workflow_name: Some(workflow.name.clone()),
    };
    let run_id = server.wes.submit_run(&service.endpoint, &request).await?;
    server
        .repos
        .runs
        .update_state(run.id, Some(run_id), RunState::Queued)
        .await?;
    Ok(())
}

/// `/runs`: the user's runs, newest first
pub async fn runs(
    State(server): State<Arc<SapporoServer>>,
    CurrentUser(user): CurrentUser,
    csrf: CsrfToken,
) -> Result<Response, PageError> {
    let workflows: HashMap<i64, String> = server
        .repos
        .workflows
        .list()
        .await?
        .into_iter()
        .map(|workflow| (workflow.id, workflow.name))
        .collect();
    let engines: HashMap<i64, String> = server
        .repos
        .workflow_engines
        .list()
        .await?
        .into_iter()
        .map(|engine| (engine.id, format!("{} {}", engine.name, engine.version)))
        .collect();

    let items: Vec<RunItem> = server
        .repos
        .runs
        .list_for_user(user.id)
        .await?
        .into_iter()
        .map(|run| RunItem {
            workflow_name: workflows.get(&run.workflow_id).cloned().unwrap_or_default(),
            engine_label: run
                .workflow_engine_id
                .and_then(|id| engines.get(&id).cloned())
                .unwrap_or_default(),
            run,
        })
        .collect();

    render(&server, user, &csrf, "runs.html", json!({ "runs": items }))
}

/// `POST /runs/:id/refresh`: poll the WES endpoint for the run state
pub async fn refresh_run(
    State(server): State<Arc<SapporoServer>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let run = server
        .repos
        .runs
        .find_by_id(id)
        .await?
        .filter(|run| run.user_id == user.id)
        .ok_or_else(|| PageError::NotFound(format!("Run {} does not exist.", id)))?;

    if run.state.is_terminal() {
        debug!(run = run.id, state = %run.state, "Run already finished, not polling");
        return Ok(Redirect::to("/runs").into_response());
    }

    if let Some(run_id) = run.run_id.clone() {
        let workflow = find_workflow(&server, run.workflow_id).await?;
        let service = find_service(&server, workflow.service_id).await?;
        match server.wes.run_status(&service.endpoint, &run_id).await {
            Ok(state) => {
                server.repos.runs.update_state(run.id, None, state).await?;
                info!(run = run.id, %state, "Run state refreshed");
            }
            Err(err) => warn!(?err, run = run.id, "Failed to refresh run state"),
        }
    }

    Ok(Redirect::to("/runs").into_response())
}
