//!
//! sapporo-core - domain layer of sapporo-web
//!
//! This crate defines the entities (services, workflow engines, workflow
//! types, workflows, runs, users), the repository traits that state stores
//! implement, and the small pieces of business logic the web layer needs.

#![forbid(unsafe_code)]

/// Domain layer - entities, drafts and repository interfaces
pub mod domain;

/// Error types
pub mod error;

/// Workflow content inspection (CWL)
pub mod inspect;

/// Environment setting parsers
pub mod settings;

pub use domain::repository::{
    Repositories, RunRepository, ServiceRepository, StoreHealth, SupportedWesVersionRepository,
    UserRepository, WorkflowEngineRepository, WorkflowRepository, WorkflowTypeRepository,
};
pub use domain::run::{Run, RunDraft, RunState};
pub use domain::service::{Service, ServiceDraft, SupportedWesVersion, SupportedWesVersionDraft};
pub use domain::user::{User, UserDraft};
pub use domain::workflow::{Workflow, WorkflowDraft};
pub use domain::workflow_engine::{WorkflowEngine, WorkflowEngineDraft};
pub use domain::workflow_type::{WorkflowType, WorkflowTypeDraft};
pub use error::{CoreError, CoreResult};
