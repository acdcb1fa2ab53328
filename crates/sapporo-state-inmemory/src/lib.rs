//! In-memory state store for sapporo-web
//!
//! This crate implements every repository trait from `sapporo-core` on top of
//! plain maps. It backs DEBUG deployments and the test suites, so it enforces
//! the same referential rules as the PostgreSQL schema: unique keys, foreign
//! keys on write, and cascade / set-null on delete.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use sapporo_core::{
    CoreError, Repositories, Run, Service, SupportedWesVersion, User, Workflow, WorkflowEngine,
    WorkflowType,
};

pub mod repositories;


/// All tables, guarded together so cross-table checks see one snapshot
#[derive(Debug, Default)]
pub(crate) struct Tables {
    next_id: i64,
    pub(crate) users: BTreeMap<i64, User>,
    pub(crate) services: BTreeMap<i64, Service>,
    pub(crate) wes_versions: BTreeMap<i64, SupportedWesVersion>,
    pub(crate) workflow_types: BTreeMap<i64, WorkflowType>,
    pub(crate) workflow_engines: BTreeMap<i64, WorkflowEngine>,
    pub(crate) workflows: BTreeMap<i64, Workflow>,
    pub(crate) runs: BTreeMap<i64, Run>,
}

impl Tables {
    /// Ids are unique across tables, which keeps test fixtures unambiguous
    pub(crate) fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn require_service(&self, id: i64) -> Result<(), CoreError> {
        if self.services.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::ReferenceError(format!("service {id} does not exist")))
        }
    }

    pub(crate) fn require_workflow_type(&self, id: i64) -> Result<(), CoreError> {
        if self.workflow_types.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::ReferenceError(format!("workflow type {id} does not exist")))
        }
    }

    pub(crate) fn require_user(&self, id: i64) -> Result<(), CoreError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::ReferenceError(format!("user {id} does not exist")))
        }
    }

    pub(crate) fn require_workflow(&self, id: i64) -> Result<(), CoreError> {
        if self.workflows.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::ReferenceError(format!("workflow {id} does not exist")))
        }
    }

    pub(crate) fn require_workflow_engine(&self, id: i64) -> Result<(), CoreError> {
        if self.workflow_engines.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::ReferenceError(format!("workflow engine {id} does not exist")))
        }
    }

    pub(crate) fn delete_user(&mut self, id: i64) {
        if self.users.remove(&id).is_some() {
            self.runs.retain(|_, run| run.user_id != id);
        }
    }

    pub(crate) fn delete_workflow(&mut self, id: i64) {
        if self.workflows.remove(&id).is_some() {
            self.runs.retain(|_, run| run.workflow_id != id);
        }
    }

    pub(crate) fn delete_workflow_engine(&mut self, id: i64) {
        if self.workflow_engines.remove(&id).is_some() {
            for run in self.runs.values_mut() {
                if run.workflow_engine_id == Some(id) {
                    run.workflow_engine_id = None;
                }
            }
        }
    }

    pub(crate) fn delete_workflow_type(&mut self, id: i64) {
        if self.workflow_types.remove(&id).is_some() {
            for workflow in self.workflows.values_mut() {
                if workflow.workflow_type_id == Some(id) {
                    workflow.workflow_type_id = None;
                }
            }
            for engine in self.workflow_engines.values_mut() {
                engine.workflow_type_ids.retain(|type_id| *type_id != id);
            }
        }
    }

    pub(crate) fn delete_service(&mut self, id: i64) {
        if self.services.remove(&id).is_none() {
            return;
        }
        self.wes_versions.retain(|_, v| v.service_id != id);

        let engine_ids: Vec<i64> = self
            .workflow_engines
            .values()
            .filter(|e| e.service_id == id)
            .map(|e| e.id)
            .collect();
        for engine_id in engine_ids {
            self.delete_workflow_engine(engine_id);
        }

        let workflow_ids: Vec<i64> = self
            .workflows
            .values()
            .filter(|w| w.service_id == id)
            .map(|w| w.id)
            .collect();
        for workflow_id in workflow_ids {
            self.delete_workflow(workflow_id);
        }
    }
}

/// In-memory store implementing every sapporo-web repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    pub(crate) tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        debug!("Creating in-memory sapporo-web store");
        Self::default()
    }

    /// Bundle this store as trait objects for the server
    pub fn repositories(&self) -> Repositories {
        Repositories::from_store(Arc::new(self.clone()))
    }
}

/// Convenience constructor used by the server and tests
pub fn create_repositories() -> Repositories {
    InMemoryStore::new().repositories()
}
