//! Admin models for every sapporo-web entity

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use sapporo_core::inspect::{inspect_workflow, parameters_template_for};
use sapporo_core::{
    CoreError, RunDraft, RunState, ServiceDraft, SupportedWesVersionDraft, UserDraft, WorkflowDraft,
    WorkflowEngineDraft, WorkflowTypeDraft,
};

use super::{AdminModel, AdminRow, Choice, FieldKind, FieldSpec, FormData, ModelMeta};
use crate::auth::{hash_password, validate_password};
use crate::error::{ServerError, ServerResult};
use crate::server::SapporoServer;

fn missing(entity: &'static str, id: i64) -> ServerError {
    CoreError::not_found(entity, id).into()
}

fn flag(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        ""
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

async fn service_choices(server: &SapporoServer) -> ServerResult<Vec<Choice>> {
    Ok(server
        .repos
        .services
        .list()
        .await?
        .into_iter()
        .map(|service| Choice::new(service.id, service.name))
        .collect())
}

async fn service_names(server: &SapporoServer) -> ServerResult<HashMap<i64, String>> {
    Ok(server
        .repos
        .services
        .list()
        .await?
        .into_iter()
        .map(|service| (service.id, service.name))
        .collect())
}

async fn workflow_type_labels(server: &SapporoServer) -> ServerResult<HashMap<i64, String>> {
    Ok(server
        .repos
        .workflow_types
        .list()
        .await?
        .into_iter()
        .map(|t| (t.id, format!("{} {}", t.name, t.version)))
        .collect())
}

fn lookup(names: &HashMap<i64, String>, id: i64) -> String {
    names.get(&id).cloned().unwrap_or_else(|| format!("#{}", id))
}

/// Collect password rule failures into one validation error
fn check_password(password: &str, username: &str) -> ServerResult<()> {
    let errors = validate_password(password, username);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServerError::ValidationError(format!("password: {}", errors.join(" "))))
    }
}

pub struct ServiceAdmin;

static SERVICE_META: ModelMeta = ModelMeta {
    slug: "services",
    name: "Service",
    name_plural: "Services",
    columns: &["Name", "Endpoint", "Updated"],
};

impl ServiceAdmin {
    fn draft(form: &FormData) -> ServiceDraft {
        ServiceDraft {
            name: form.text("name"),
            endpoint: form.text("endpoint"),
            auth_instructions_url: form.optional("auth_instructions_url"),
            contact_info_url: form.optional("contact_info_url"),
        }
    }
}

#[async_trait]
impl AdminModel for ServiceAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &SERVICE_META
    }

    async fn fields(&self, _server: &SapporoServer, _id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        Ok(vec![
            FieldSpec::new("name", "Name", FieldKind::Text),
            FieldSpec::new("endpoint", "Endpoint", FieldKind::Url)
                .help("Base URL of the WES API, e.g. http://localhost:1122"),
            FieldSpec::new("auth_instructions_url", "Auth instructions URL", FieldKind::Url).optional(),
            FieldSpec::new("contact_info_url", "Contact info URL", FieldKind::Url).optional(),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        Ok(server
            .repos
            .services
            .list()
            .await?
            .into_iter()
            .map(|service| AdminRow {
                id: service.id,
                cells: vec![service.name, service.endpoint, server.localtime(service.updated_at)],
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let service = server
            .repos
            .services
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("service", id))?;
        let mut form = FormData::default();
        form.set("name", service.name);
        form.set("endpoint", service.endpoint);
        form.set("auth_instructions_url", service.auth_instructions_url.unwrap_or_default());
        form.set("contact_info_url", service.contact_info_url.unwrap_or_default());
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let draft = Self::draft(form);
        let service = match id {
            Some(id) => server.repos.services.update(id, draft).await?,
            None => server.repos.services.insert(draft).await?,
        };
        Ok(service.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        Ok(server.repos.services.delete(id).await?)
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let service = server
            .repos
            .services
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("service", id))?;
        Ok(service.to_string())
    }

    fn can_sync(&self) -> bool {
        true
    }
}

pub struct SupportedWesVersionAdmin;

static WES_VERSION_META: ModelMeta = ModelMeta {
    slug: "supported-wes-versions",
    name: "Supported WES version",
    name_plural: "Supported WES versions",
    columns: &["Version", "Service"],
};

#[async_trait]
impl AdminModel for SupportedWesVersionAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &WES_VERSION_META
    }

    async fn fields(&self, server: &SapporoServer, _id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        Ok(vec![
            FieldSpec::new(
                "service",
                "Service",
                FieldKind::Select {
                    choices: service_choices(server).await?,
                },
            ),
            FieldSpec::new("version", "Version", FieldKind::Text),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        let services = service_names(server).await?;
        Ok(server
            .repos
            .wes_versions
            .list()
            .await?
            .into_iter()
            .map(|version| AdminRow {
                id: version.id,
                cells: vec![version.version, lookup(&services, version.service_id)],
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let version = server
            .repos
            .wes_versions
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("supported WES version", id))?;
        let mut form = FormData::default();
        form.set("service", version.service_id.to_string());
        form.set("version", version.version);
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let draft = SupportedWesVersionDraft {
            service_id: form.id("service")?,
            version: form.text("version"),
        };
        let version = match id {
            Some(id) => server.repos.wes_versions.update(id, draft).await?,
            None => server.repos.wes_versions.insert(draft).await?,
        };
        Ok(version.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        Ok(server.repos.wes_versions.delete(id).await?)
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let version = server
            .repos
            .wes_versions
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("supported WES version", id))?;
        Ok(version.to_string())
    }
}

pub struct WorkflowTypeAdmin;

static WORKFLOW_TYPE_META: ModelMeta = ModelMeta {
    slug: "workflow-types",
    name: "Workflow type",
    name_plural: "Workflow types",
    columns: &["Name", "Version"],
};

#[async_trait]
impl AdminModel for WorkflowTypeAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &WORKFLOW_TYPE_META
    }

    async fn fields(&self, _server: &SapporoServer, _id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        Ok(vec![
            FieldSpec::new("name", "Name", FieldKind::Text).help("Workflow language, e.g. CWL"),
            FieldSpec::new("version", "Version", FieldKind::Text),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        Ok(server
            .repos
            .workflow_types
            .list()
            .await?
            .into_iter()
            .map(|t| AdminRow {
                id: t.id,
                cells: vec![t.name, t.version],
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let workflow_type = server
            .repos
            .workflow_types
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("workflow type", id))?;
        let mut form = FormData::default();
        form.set("name", workflow_type.name);
        form.set("version", workflow_type.version);
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let draft = WorkflowTypeDraft::new(form.text("name"), form.text("version"));
        let workflow_type = match id {
            Some(id) => server.repos.workflow_types.update(id, draft).await?,
            None => server.repos.workflow_types.insert(draft).await?,
        };
        Ok(workflow_type.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        Ok(server.repos.workflow_types.delete(id).await?)
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let workflow_type = server
            .repos
            .workflow_types
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("workflow type", id))?;
        Ok(workflow_type.to_string())
    }
}

pub struct WorkflowEngineAdmin;

static WORKFLOW_ENGINE_META: ModelMeta = ModelMeta {
    slug: "workflow-engines",
    name: "Workflow engine",
    name_plural: "Workflow engines",
    columns: &["Name", "Version", "Service", "Workflow types"],
};

#[async_trait]
impl AdminModel for WorkflowEngineAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &WORKFLOW_ENGINE_META
    }

    async fn fields(&self, server: &SapporoServer, _id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        let types = server
            .repos
            .workflow_types
            .list()
            .await?
            .into_iter()
            .map(|t| Choice::new(t.id, format!("{} {}", t.name, t.version)))
            .collect();
        Ok(vec![
            FieldSpec::new(
                "service",
                "Service",
                FieldKind::Select {
                    choices: service_choices(server).await?,
                },
            ),
            FieldSpec::new("name", "Name", FieldKind::Text),
            FieldSpec::new("version", "Version", FieldKind::Text),
            FieldSpec::new("workflow_types", "Workflow types", FieldKind::MultiSelect { choices: types })
                .optional(),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        let services = service_names(server).await?;
        let types = workflow_type_labels(server).await?;
        Ok(server
            .repos
            .workflow_engines
            .list()
            .await?
            .into_iter()
            .map(|engine| {
                let type_labels: Vec<String> =
                    engine.workflow_type_ids.iter().map(|id| lookup(&types, *id)).collect();
                AdminRow {
                    id: engine.id,
                    cells: vec![
                        engine.name,
                        engine.version,
                        lookup(&services, engine.service_id),
                        type_labels.join(", "),
                    ],
                }
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let engine = server
            .repos
            .workflow_engines
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("workflow engine", id))?;
        let mut form = FormData::default();
        form.set("service", engine.service_id.to_string());
        form.set("name", engine.name);
        form.set("version", engine.version);
        for type_id in engine.workflow_type_ids {
            form.push("workflow_types", type_id.to_string());
        }
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let draft = WorkflowEngineDraft {
            service_id: form.id("service")?,
            name: form.text("name"),
            version: form.text("version"),
            workflow_type_ids: form.ids("workflow_types")?,
        };
        let engine = match id {
            Some(id) => server.repos.workflow_engines.update(id, draft).await?,
            None => server.repos.workflow_engines.insert(draft).await?,
        };
        Ok(engine.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        Ok(server.repos.workflow_engines.delete(id).await?)
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let engine = server
            .repos
            .workflow_engines
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("workflow engine", id))?;
        Ok(engine.to_string())
    }
}

pub struct WorkflowAdmin;

static WORKFLOW_META: ModelMeta = ModelMeta {
    slug: "workflows",
    name: "Workflow",
    name_plural: "Workflows",
    columns: &["Name", "Version", "Service", "Type"],
};

impl WorkflowAdmin {
    /// Fill in the type and parameters template from the content when they
    /// were left blank
    async fn complete(server: &SapporoServer, draft: &mut WorkflowDraft) -> ServerResult<()> {
        if draft.content.trim().is_empty() {
            return Ok(());
        }
        if draft.workflow_type_id.is_none() {
            match inspect_workflow(&draft.content) {
                Ok(detected) if detected.is_known() => {
                    draft.workflow_type_id = server
                        .repos
                        .workflow_types
                        .find_by_name_version(&detected.type_name, &detected.version)
                        .await?
                        .map(|t| t.id);
                }
                Ok(_) => {}
                Err(err) => debug!(%err, "Workflow content not inspectable"),
            }
        }
        if draft.parameters_template.trim().is_empty() {
            draft.parameters_template = match parameters_template_for(&draft.content) {
                Ok(template) => {
                    info!(name = %draft.name, "Generated parameters template");
                    template
                }
                Err(err) => {
                    debug!(%err, name = %draft.name, "No parameters template for this content");
                    "{}".to_string()
                }
            };
        }
        Ok(())
    }
}

#[async_trait]
impl AdminModel for WorkflowAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &WORKFLOW_META
    }

    async fn fields(&self, server: &SapporoServer, _id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        let types = server
            .repos
            .workflow_types
            .list()
            .await?
            .into_iter()
            .map(|t| Choice::new(t.id, format!("{} {}", t.name, t.version)))
            .collect();
        Ok(vec![
            FieldSpec::new(
                "service",
                "Service",
                FieldKind::Select {
                    choices: service_choices(server).await?,
                },
            ),
            FieldSpec::new("name", "Name", FieldKind::Text),
            FieldSpec::new("version", "Version", FieldKind::Text),
            FieldSpec::new("workflow_type", "Workflow type", FieldKind::Select { choices: types })
                .optional()
                .help("Detected from the content when left blank"),
            FieldSpec::new("location", "Location", FieldKind::Url),
            FieldSpec::new("content", "Content", FieldKind::Textarea),
            FieldSpec::new(
                "parameters_template_location",
                "Parameters template location",
                FieldKind::Url,
            ),
            FieldSpec::new("parameters_template", "Parameters template", FieldKind::Textarea)
                .optional()
                .help("Generated from the content when left blank"),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        let services = service_names(server).await?;
        let types = workflow_type_labels(server).await?;
        Ok(server
            .repos
            .workflows
            .list()
            .await?
            .into_iter()
            .map(|workflow| AdminRow {
                id: workflow.id,
                cells: vec![
                    workflow.name,
                    workflow.version,
                    lookup(&services, workflow.service_id),
                    workflow
                        .workflow_type_id
                        .map(|id| lookup(&types, id))
                        .unwrap_or_default(),
                ],
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let workflow = server
            .repos
            .workflows
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("workflow", id))?;
        let mut form = FormData::default();
        form.set("service", workflow.service_id.to_string());
        form.set("name", workflow.name);
        form.set("version", workflow.version);
        form.set(
            "workflow_type",
            workflow.workflow_type_id.map(|id| id.to_string()).unwrap_or_default(),
        );
        form.set("location", workflow.location);
        form.set("content", workflow.content);
        form.set("parameters_template_location", workflow.parameters_template_location);
        form.set("parameters_template", workflow.parameters_template);
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let mut draft = WorkflowDraft {
            service_id: form.id("service")?,
            name: form.text("name"),
            version: form.text("version"),
            workflow_type_id: form.optional_id("workflow_type")?,
            location: form.text("location"),
            content: form.get("content").to_string(),
            parameters_template_location: form.text("parameters_template_location"),
            parameters_template: form.get("parameters_template").to_string(),
        };
        Self::complete(server, &mut draft).await?;
        let workflow = match id {
            Some(id) => server.repos.workflows.update(id, draft).await?,
            None => server.repos.workflows.insert(draft).await?,
        };
        Ok(workflow.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        Ok(server.repos.workflows.delete(id).await?)
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let workflow = server
            .repos
            .workflows
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("workflow", id))?;
        Ok(workflow.to_string())
    }
}

pub struct RunAdmin;

static RUN_META: ModelMeta = ModelMeta {
    slug: "runs",
    name: "Run",
    name_plural: "Runs",
    columns: &["Name", "User", "Workflow", "State", "Run ID"],
};

#[async_trait]
impl AdminModel for RunAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &RUN_META
    }

    async fn fields(&self, server: &SapporoServer, _id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        let users = server
            .repos
            .users
            .list()
            .await?
            .into_iter()
            .map(|user| Choice::new(user.id, user.username))
            .collect();
        let workflows = server
            .repos
            .workflows
            .list()
            .await?
            .into_iter()
            .map(|workflow| Choice::new(workflow.id, format!("{} {}", workflow.name, workflow.version)))
            .collect();
        let engines = server
            .repos
            .workflow_engines
            .list()
            .await?
            .into_iter()
            .map(|engine| Choice::new(engine.id, format!("{} {}", engine.name, engine.version)))
            .collect();
        let states = RunState::ALL
            .iter()
            .map(|state| Choice::new(state.as_str(), state.as_str()))
            .collect();
        Ok(vec![
            FieldSpec::new("user", "User", FieldKind::Select { choices: users }),
            FieldSpec::new("workflow", "Workflow", FieldKind::Select { choices: workflows }),
            FieldSpec::new("workflow_engine", "Workflow engine", FieldKind::Select { choices: engines })
                .optional(),
            FieldSpec::new("name", "Name", FieldKind::Text),
            FieldSpec::new("run_id", "Run ID", FieldKind::Text).optional(),
            FieldSpec::new("state", "State", FieldKind::Select { choices: states }),
            FieldSpec::new("parameters", "Parameters", FieldKind::Textarea).optional(),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        let users: HashMap<i64, String> = server
            .repos
            .users
            .list()
            .await?
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect();
        let workflows: HashMap<i64, String> = server
            .repos
            .workflows
            .list()
            .await?
            .into_iter()
            .map(|workflow| (workflow.id, workflow.name))
            .collect();
        Ok(server
            .repos
            .runs
            .list()
            .await?
            .into_iter()
            .map(|run| AdminRow {
                id: run.id,
                cells: vec![
                    run.name,
                    lookup(&users, run.user_id),
                    lookup(&workflows, run.workflow_id),
                    run.state.to_string(),
                    run.run_id.unwrap_or_default(),
                ],
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let run = server
            .repos
            .runs
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("run", id))?;
        let mut form = FormData::default();
        form.set("user", run.user_id.to_string());
        form.set("workflow", run.workflow_id.to_string());
        form.set(
            "workflow_engine",
            run.workflow_engine_id.map(|id| id.to_string()).unwrap_or_default(),
        );
        form.set("name", run.name);
        form.set("run_id", run.run_id.unwrap_or_default());
        form.set("state", run.state.as_str());
        form.set("parameters", run.parameters);
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let state = match form.optional("state") {
            Some(state) => state.parse::<RunState>()?,
            None => RunState::default(),
        };
        let draft = RunDraft {
            user_id: form.id("user")?,
            workflow_id: form.id("workflow")?,
            workflow_engine_id: form.optional_id("workflow_engine")?,
            name: form.text("name"),
            run_id: form.optional("run_id"),
            state,
            parameters: form.get("parameters").to_string(),
        };
        let run = match id {
            Some(id) => server.repos.runs.update(id, draft).await?,
            None => server.repos.runs.insert(draft).await?,
        };
        Ok(run.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        Ok(server.repos.runs.delete(id).await?)
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let run = server
            .repos
            .runs
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("run", id))?;
        Ok(run.to_string())
    }
}

pub struct UserAdmin;

static USER_META: ModelMeta = ModelMeta {
    slug: "users",
    name: "User",
    name_plural: "Users",
    columns: &["Username", "Staff", "Superuser", "Active", "Last login"],
};

#[async_trait]
impl AdminModel for UserAdmin {
    fn meta(&self) -> &'static ModelMeta {
        &USER_META
    }

    async fn fields(&self, _server: &SapporoServer, id: Option<i64>) -> ServerResult<Vec<FieldSpec>> {
        let password = FieldSpec::new("password", "Password", FieldKind::Password);
        let password = match id {
            Some(_) => password.optional().help("Leave blank to keep the current password."),
            None => password,
        };
        Ok(vec![
            FieldSpec::new("username", "Username", FieldKind::Text)
                .help("150 characters or fewer. Letters, digits and @/./+/-/_ only."),
            password,
            FieldSpec::new("is_active", "Active", FieldKind::Checkbox).optional(),
            FieldSpec::new("is_staff", "Staff status", FieldKind::Checkbox)
                .optional()
                .help("Staff users can sign in to this console."),
            FieldSpec::new("is_superuser", "Superuser status", FieldKind::Checkbox).optional(),
        ])
    }

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>> {
        Ok(server
            .repos
            .users
            .list()
            .await?
            .into_iter()
            .map(|user| AdminRow {
                id: user.id,
                cells: vec![
                    user.username,
                    yes_no(user.is_staff),
                    yes_no(user.is_superuser),
                    yes_no(user.is_active),
                    user.last_login.map(|at| server.localtime(at)).unwrap_or_default(),
                ],
            })
            .collect())
    }

    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData> {
        let user = server
            .repos
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("user", id))?;
        let mut form = FormData::default();
        form.set("username", user.username);
        form.set("is_active", flag(user.is_active));
        form.set("is_staff", flag(user.is_staff));
        form.set("is_superuser", flag(user.is_superuser));
        Ok(form)
    }

    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64> {
        let username = form.text("username");
        let password = form.get("password");
        let mut draft = UserDraft {
            username: username.clone(),
            password_hash: String::new(),
            is_active: form.checkbox("is_active"),
            is_staff: form.checkbox("is_staff"),
            is_superuser: form.checkbox("is_superuser"),
        };

        let Some(id) = id else {
            if password.is_empty() {
                return Err(ServerError::ValidationError("password: this field is required".to_string()));
            }
            check_password(password, &username)?;
            draft.password_hash = hash_password(password);
            return Ok(server.repos.users.insert(draft).await?.id);
        };

        let existing = server
            .repos
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("user", id))?;
        if !password.is_empty() {
            check_password(password, &username)?;
        }
        draft.password_hash = existing.password_hash;
        let user = server.repos.users.update(id, draft).await?;
        if !password.is_empty() {
            server.repos.users.set_password(id, &hash_password(password)).await?;
            server.sessions.destroy_for_user(id);
        }
        if !user.is_active {
            server.sessions.destroy_for_user(id);
        }
        Ok(user.id)
    }

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()> {
        server.repos.users.delete(id).await?;
        server.sessions.destroy_for_user(id);
        Ok(())
    }

    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String> {
        let user = server
            .repos
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| missing("user", id))?;
        Ok(user.username)
    }
}
