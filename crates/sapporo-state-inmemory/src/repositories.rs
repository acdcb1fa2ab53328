use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use sapporo_core::{
    CoreError, Run, RunDraft, RunRepository, RunState, Service, ServiceDraft, ServiceRepository,
    StoreHealth, SupportedWesVersion, SupportedWesVersionDraft, SupportedWesVersionRepository,
    User, UserDraft, UserRepository, Workflow, WorkflowDraft, WorkflowEngine, WorkflowEngineDraft,
    WorkflowEngineRepository, WorkflowRepository, WorkflowType, WorkflowTypeDraft,
    WorkflowTypeRepository,
};

use crate::{InMemoryStore, Tables};

fn check_username_free(tables: &Tables, username: &str, except: Option<i64>) -> Result<(), CoreError> {
    let taken = tables
        .users
        .values()
        .any(|u| u.username == username && Some(u.id) != except);
    if taken {
        return Err(CoreError::Conflict(format!(
            "a user with username '{username}' already exists"
        )));
    }
    Ok(())
}

fn check_service_name_free(tables: &Tables, name: &str, except: Option<i64>) -> Result<(), CoreError> {
    if tables
        .services
        .values()
        .any(|s| s.name == name && Some(s.id) != except)
    {
        return Err(CoreError::Conflict(format!("a service named '{name}' already exists")));
    }
    Ok(())
}

fn check_wes_version_free(
    tables: &Tables,
    draft: &SupportedWesVersionDraft,
    except: Option<i64>,
) -> Result<(), CoreError> {
    if tables.wes_versions.values().any(|v| {
        v.service_id == draft.service_id && v.version == draft.version && Some(v.id) != except
    }) {
        return Err(CoreError::Conflict(format!(
            "service {} already lists WES version '{}'",
            draft.service_id, draft.version
        )));
    }
    Ok(())
}

fn check_workflow_type_free(
    tables: &Tables,
    draft: &WorkflowTypeDraft,
    except: Option<i64>,
) -> Result<(), CoreError> {
    if tables.workflow_types.values().any(|t| {
        t.name == draft.name && t.version == draft.version && Some(t.id) != except
    }) {
        return Err(CoreError::Conflict(format!(
            "workflow type '{} {}' already exists",
            draft.name, draft.version
        )));
    }
    Ok(())
}

fn check_engine_refs(tables: &Tables, draft: &WorkflowEngineDraft) -> Result<(), CoreError> {
    tables.require_service(draft.service_id)?;
    for type_id in &draft.workflow_type_ids {
        tables.require_workflow_type(*type_id)?;
    }
    Ok(())
}

fn check_workflow_refs(tables: &Tables, draft: &WorkflowDraft) -> Result<(), CoreError> {
    tables.require_service(draft.service_id)?;
    if let Some(type_id) = draft.workflow_type_id {
        tables.require_workflow_type(type_id)?;
    }
    Ok(())
}

fn check_run_refs(tables: &Tables, draft: &RunDraft) -> Result<(), CoreError> {
    tables.require_user(draft.user_id)?;
    tables.require_workflow(draft.workflow_id)?;
    if let Some(engine_id) = draft.workflow_engine_id {
        tables.require_workflow_engine(engine_id)?;
    }
    Ok(())
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<User>, CoreError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn insert(&self, draft: UserDraft) -> Result<User, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_username_free(&tables, &draft.username, None)?;

        let user = User {
            id: tables.allocate_id(),
            username: draft.username,
            password_hash: draft.password_hash,
            is_active: draft.is_active,
            is_staff: draft.is_staff,
            is_superuser: draft.is_superuser,
            date_joined: Utc::now(),
            last_login: None,
        };
        debug!(user_id = user.id, username = %user.username, "Inserted user");
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, draft: UserDraft) -> Result<User, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_username_free(&tables, &draft.username, Some(id))?;

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("user", id))?;
        user.username = draft.username;
        user.password_hash = draft.password_hash;
        user.is_active = draft.is_active;
        user.is_staff = draft.is_staff;
        user.is_superuser = draft.is_superuser;
        Ok(user.clone())
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), CoreError> {
        if password_hash.is_empty() {
            return Err(CoreError::ValidationError("password: this field is required".to_string()));
        }
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("user", id))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn record_login(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("user", id))?;
        user.last_login = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables.require_user(id).map_err(|_| CoreError::not_found("user", id))?;
        tables.delete_user(id);
        Ok(())
    }
}

#[async_trait]
impl ServiceRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<Service>, CoreError> {
        Ok(self.tables.read().await.services.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Service>, CoreError> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables.services.values().find(|s| s.name == name).cloned())
    }

    async fn insert(&self, draft: ServiceDraft) -> Result<Service, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_service_name_free(&tables, &draft.name, None)?;

        let now = Utc::now();
        let service = Service {
            id: tables.allocate_id(),
            name: draft.name,
            endpoint: draft.endpoint,
            auth_instructions_url: draft.auth_instructions_url,
            contact_info_url: draft.contact_info_url,
            created_at: now,
            updated_at: now,
        };
        tables.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn update(&self, id: i64, draft: ServiceDraft) -> Result<Service, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_service_name_free(&tables, &draft.name, Some(id))?;

        let service = tables
            .services
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("service", id))?;
        service.name = draft.name;
        service.endpoint = draft.endpoint;
        service.auth_instructions_url = draft.auth_instructions_url;
        service.contact_info_url = draft.contact_info_url;
        service.updated_at = Utc::now();
        Ok(service.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables.require_service(id).map_err(|_| CoreError::not_found("service", id))?;
        tables.delete_service(id);
        debug!(service_id = id, "Deleted service and dependent rows");
        Ok(())
    }
}

#[async_trait]
impl SupportedWesVersionRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<SupportedWesVersion>, CoreError> {
        Ok(self.tables.read().await.wes_versions.values().cloned().collect())
    }

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<SupportedWesVersion>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .wes_versions
            .values()
            .filter(|v| v.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SupportedWesVersion>, CoreError> {
        Ok(self.tables.read().await.wes_versions.get(&id).cloned())
    }

    async fn insert(&self, draft: SupportedWesVersionDraft) -> Result<SupportedWesVersion, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        tables.require_service(draft.service_id)?;
        check_wes_version_free(&tables, &draft, None)?;

        let now = Utc::now();
        let version = SupportedWesVersion {
            id: tables.allocate_id(),
            service_id: draft.service_id,
            version: draft.version,
            created_at: now,
            updated_at: now,
        };
        tables.wes_versions.insert(version.id, version.clone());
        Ok(version)
    }

    async fn update(
        &self,
        id: i64,
        draft: SupportedWesVersionDraft,
    ) -> Result<SupportedWesVersion, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        tables.require_service(draft.service_id)?;
        check_wes_version_free(&tables, &draft, Some(id))?;

        let version = tables
            .wes_versions
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("supported WES version", id))?;
        version.service_id = draft.service_id;
        version.version = draft.version;
        version.updated_at = Utc::now();
        Ok(version.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .wes_versions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("supported WES version", id))
    }
}

#[async_trait]
impl WorkflowTypeRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<WorkflowType>, CoreError> {
        Ok(self.tables.read().await.workflow_types.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkflowType>, CoreError> {
        Ok(self.tables.read().await.workflow_types.get(&id).cloned())
    }

    async fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowType>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .workflow_types
            .values()
            .find(|t| t.name == name && t.version == version)
            .cloned())
    }

    async fn insert(&self, draft: WorkflowTypeDraft) -> Result<WorkflowType, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_workflow_type_free(&tables, &draft, None)?;

        let now = Utc::now();
        let workflow_type = WorkflowType {
            id: tables.allocate_id(),
            name: draft.name,
            version: draft.version,
            created_at: now,
            updated_at: now,
        };
        tables.workflow_types.insert(workflow_type.id, workflow_type.clone());
        Ok(workflow_type)
    }

    async fn update(&self, id: i64, draft: WorkflowTypeDraft) -> Result<WorkflowType, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_workflow_type_free(&tables, &draft, Some(id))?;

        let workflow_type = tables
            .workflow_types
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("workflow type", id))?;
        workflow_type.name = draft.name;
        workflow_type.version = draft.version;
        workflow_type.updated_at = Utc::now();
        Ok(workflow_type.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .require_workflow_type(id)
            .map_err(|_| CoreError::not_found("workflow type", id))?;
        tables.delete_workflow_type(id);
        Ok(())
    }
}

#[async_trait]
impl WorkflowEngineRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<WorkflowEngine>, CoreError> {
        Ok(self.tables.read().await.workflow_engines.values().cloned().collect())
    }

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<WorkflowEngine>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .workflow_engines
            .values()
            .filter(|e| e.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkflowEngine>, CoreError> {
        Ok(self.tables.read().await.workflow_engines.get(&id).cloned())
    }

    async fn insert(&self, draft: WorkflowEngineDraft) -> Result<WorkflowEngine, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_engine_refs(&tables, &draft)?;

        let now = Utc::now();
        let engine = WorkflowEngine {
            id: tables.allocate_id(),
            service_id: draft.service_id,
            workflow_type_ids: draft.unique_type_ids(),
            name: draft.name,
            version: draft.version,
            created_at: now,
            updated_at: now,
        };
        tables.workflow_engines.insert(engine.id, engine.clone());
        Ok(engine)
    }

    async fn update(&self, id: i64, draft: WorkflowEngineDraft) -> Result<WorkflowEngine, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_engine_refs(&tables, &draft)?;

        let type_ids = draft.unique_type_ids();
        let engine = tables
            .workflow_engines
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("workflow engine", id))?;
        engine.service_id = draft.service_id;
        engine.name = draft.name;
        engine.version = draft.version;
        engine.workflow_type_ids = type_ids;
        engine.updated_at = Utc::now();
        Ok(engine.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .require_workflow_engine(id)
            .map_err(|_| CoreError::not_found("workflow engine", id))?;
        tables.delete_workflow_engine(id);
        Ok(())
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<Workflow>, CoreError> {
        Ok(self.tables.read().await.workflows.values().cloned().collect())
    }

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<Workflow>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .workflows
            .values()
            .filter(|w| w.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Workflow>, CoreError> {
        Ok(self.tables.read().await.workflows.get(&id).cloned())
    }

    async fn insert(&self, draft: WorkflowDraft) -> Result<Workflow, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_workflow_refs(&tables, &draft)?;

        let now = Utc::now();
        let workflow = Workflow {
            id: tables.allocate_id(),
            service_id: draft.service_id,
            name: draft.name,
            version: draft.version,
            workflow_type_id: draft.workflow_type_id,
            location: draft.location,
            content: draft.content,
            parameters_template_location: draft.parameters_template_location,
            parameters_template: draft.parameters_template,
            created_at: now,
            updated_at: now,
        };
        tables.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn update(&self, id: i64, draft: WorkflowDraft) -> Result<Workflow, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_workflow_refs(&tables, &draft)?;

        let workflow = tables
            .workflows
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("workflow", id))?;
        workflow.service_id = draft.service_id;
        workflow.name = draft.name;
        workflow.version = draft.version;
        workflow.workflow_type_id = draft.workflow_type_id;
        workflow.location = draft.location;
        workflow.content = draft.content;
        workflow.parameters_template_location = draft.parameters_template_location;
        workflow.parameters_template = draft.parameters_template;
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .require_workflow(id)
            .map_err(|_| CoreError::not_found("workflow", id))?;
        tables.delete_workflow(id);
        Ok(())
    }
}

#[async_trait]
impl RunRepository for InMemoryStore {
    async fn list(&self) -> Result<Vec<Run>, CoreError> {
        Ok(self.tables.read().await.runs.values().cloned().collect())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Run>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .values()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Run>, CoreError> {
        Ok(self.tables.read().await.runs.get(&id).cloned())
    }

    async fn insert(&self, draft: RunDraft) -> Result<Run, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_run_refs(&tables, &draft)?;

        let now = Utc::now();
        let run = Run {
            id: tables.allocate_id(),
            user_id: draft.user_id,
            workflow_id: draft.workflow_id,
            workflow_engine_id: draft.workflow_engine_id,
            name: draft.name,
            run_id: draft.run_id,
            state: draft.state,
            parameters: draft.parameters,
            created_at: now,
            updated_at: now,
        };
        tables.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn update(&self, id: i64, draft: RunDraft) -> Result<Run, CoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        check_run_refs(&tables, &draft)?;

        let run = tables
            .runs
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("run", id))?;
        run.user_id = draft.user_id;
        run.workflow_id = draft.workflow_id;
        run.workflow_engine_id = draft.workflow_engine_id;
        run.name = draft.name;
        run.run_id = draft.run_id;
        run.state = draft.state;
        run.parameters = draft.parameters;
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    async fn update_state(
        &self,
        id: i64,
        run_id: Option<String>,
        state: RunState,
    ) -> Result<Run, CoreError> {
        let mut tables = self.tables.write().await;
        let run = tables
            .runs
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("run", id))?;
        if run_id.is_some() {
            run.run_id = run_id;
        }
        run.state = state;
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .runs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("run", id))
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn health_check(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}
