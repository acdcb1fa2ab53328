use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{check_text, MAX_FIELD_LENGTH};
use crate::CoreError;

/// An engine (cwltool, toil, cromwell, ...) available on a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEngine {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub version: String,
    /// Workflow types this engine can execute
    pub workflow_type_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowEngine {
    pub fn supports(&self, workflow_type_id: i64) -> bool {
        self.workflow_type_ids.contains(&workflow_type_id)
    }
}

impl fmt::Display for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkflowEngine: {} {}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowEngineDraft {
    pub service_id: i64,
    pub name: String,
    pub version: String,
    pub workflow_type_ids: Vec<i64>,
}

impl WorkflowEngineDraft {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_text("name", &self.name, MAX_FIELD_LENGTH)?;
        check_text("version", &self.version, MAX_FIELD_LENGTH)
    }

    /// Type ids in ascending order without duplicates, the order stores report them in
    pub fn unique_type_ids(&self) -> Vec<i64> {
        let mut ids = self.workflow_type_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
