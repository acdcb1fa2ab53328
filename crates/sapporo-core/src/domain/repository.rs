//! Repository traits for sapporo-web
//!
//! Each entity gets its own repository trait. Stores implement all of them
//! and hand out a [`Repositories`] bundle. Implementations must keep
//! referential integrity: inserts and updates that point at missing rows fail
//! with [`CoreError::ReferenceError`], deletes cascade or clear references the
//! same way the database schema does.

use async_trait::async_trait;
use std::sync::Arc;

use super::run::{Run, RunDraft, RunState};
use super::service::{Service, ServiceDraft, SupportedWesVersion, SupportedWesVersionDraft};
use super::user::{User, UserDraft};
use super::workflow::{Workflow, WorkflowDraft};
use super::workflow_engine::{WorkflowEngine, WorkflowEngineDraft};
use super::workflow_type::{WorkflowType, WorkflowTypeDraft};
use crate::CoreError;

/// Repository for user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// All users ordered by id
    async fn list(&self) -> Result<Vec<User>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError>;

    /// Exact, case-sensitive username lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, CoreError>;

    /// Create a user; duplicate usernames are a [`CoreError::Conflict`]
    async fn insert(&self, draft: UserDraft) -> Result<User, CoreError>;

    async fn update(&self, id: i64, draft: UserDraft) -> Result<User, CoreError>;

    /// Replace the stored password hash
    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), CoreError>;

    /// Stamp `last_login` with the current time
    async fn record_login(&self, id: i64) -> Result<(), CoreError>;

    /// Delete a user and, through the cascade, their runs
    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository for WES services
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Service>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Service>, CoreError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, CoreError>;

    async fn insert(&self, draft: ServiceDraft) -> Result<Service, CoreError>;

    async fn update(&self, id: i64, draft: ServiceDraft) -> Result<Service, CoreError>;

    /// Delete a service together with its versions, engines, workflows and runs
    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository for the WES versions a service supports
#[async_trait]
pub trait SupportedWesVersionRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<SupportedWesVersion>, CoreError>;

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<SupportedWesVersion>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<SupportedWesVersion>, CoreError>;

    async fn insert(&self, draft: SupportedWesVersionDraft) -> Result<SupportedWesVersion, CoreError>;

    async fn update(
        &self,
        id: i64,
        draft: SupportedWesVersionDraft,
    ) -> Result<SupportedWesVersion, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository for workflow types
#[async_trait]
pub trait WorkflowTypeRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<WorkflowType>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkflowType>, CoreError>;

    async fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowType>, CoreError>;

    async fn insert(&self, draft: WorkflowTypeDraft) -> Result<WorkflowType, CoreError>;

    async fn update(&self, id: i64, draft: WorkflowTypeDraft) -> Result<WorkflowType, CoreError>;

    /// Delete a type; workflows referencing it keep existing without a type
    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository for workflow engines
#[async_trait]
pub trait WorkflowEngineRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<WorkflowEngine>, CoreError>;

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<WorkflowEngine>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkflowEngine>, CoreError>;

    async fn insert(&self, draft: WorkflowEngineDraft) -> Result<WorkflowEngine, CoreError>;

    async fn update(&self, id: i64, draft: WorkflowEngineDraft) -> Result<WorkflowEngine, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository for workflows
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Workflow>, CoreError>;

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<Workflow>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Workflow>, CoreError>;

    async fn insert(&self, draft: WorkflowDraft) -> Result<Workflow, CoreError>;

    async fn update(&self, id: i64, draft: WorkflowDraft) -> Result<Workflow, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository for runs
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Run>, CoreError>;

    /// Runs owned by `user_id`, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Run>, CoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Run>, CoreError>;

    async fn insert(&self, draft: RunDraft) -> Result<Run, CoreError>;

    async fn update(&self, id: i64, draft: RunDraft) -> Result<Run, CoreError>;

    /// Record the remote run id and state after talking to the WES endpoint
    async fn update_state(
        &self,
        id: i64,
        run_id: Option<String>,
        state: RunState,
    ) -> Result<Run, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

/// Store health probe
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// `Ok(true)` when the backing store answers queries
    async fn health_check(&self) -> Result<bool, CoreError>;
}

/// Every repository of one store, shared behind trait objects
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub wes_versions: Arc<dyn SupportedWesVersionRepository>,
    pub workflow_types: Arc<dyn WorkflowTypeRepository>,
    pub workflow_engines: Arc<dyn WorkflowEngineRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub runs: Arc<dyn RunRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Repositories {
    /// Bundle a store that implements every repository trait
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + ServiceRepository
            + SupportedWesVersionRepository
            + WorkflowTypeRepository
            + WorkflowEngineRepository
            + WorkflowRepository
            + RunRepository
            + StoreHealth
            + 'static,
    {
        Self {
            users: store.clone(),
            services: store.clone(),
            wes_versions: store.clone(),
            workflow_types: store.clone(),
            workflow_engines: store.clone(),
            workflows: store.clone(),
            runs: store.clone(),
            health: store,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
