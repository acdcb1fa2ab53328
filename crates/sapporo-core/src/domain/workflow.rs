use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::workflow_engine::WorkflowEngine;
use super::{check_text, check_url, MAX_FIELD_LENGTH};
use crate::CoreError;

/// A workflow definition registered against a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub version: String,
    /// Cleared when the referenced type is deleted
    pub workflow_type_id: Option<i64>,
    pub location: String,
    pub content: String,
    pub parameters_template_location: String,
    pub parameters_template: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Engines able to execute this workflow.
    ///
    /// Keeps the engines that belong to the workflow's service and list the
    /// workflow's type, in the order given. A workflow without a type has no
    /// executable engines.
    pub fn find_executable_engines<'a>(&self, engines: &'a [WorkflowEngine]) -> Vec<&'a WorkflowEngine> {
        let Some(type_id) = self.workflow_type_id else {
            return Vec::new();
        };

        engines
            .iter()
            .filter(|engine| engine.service_id == self.service_id && engine.supports(type_id))
            .collect()
    }

    /// Whether `engine` is one of the executable engines of this workflow
    pub fn can_run_on(&self, engine: &WorkflowEngine) -> bool {
        !self.find_executable_engines(std::slice::from_ref(engine)).is_empty()
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Workflow: {}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub service_id: i64,
    pub name: String,
    pub version: String,
    pub workflow_type_id: Option<i64>,
    pub location: String,
    pub content: String,
    pub parameters_template_location: String,
    pub parameters_template: String,
}

impl WorkflowDraft {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_text("name", &self.name, MAX_FIELD_LENGTH)?;
        check_text("version", &self.version, MAX_FIELD_LENGTH)?;
        check_url("location", &self.location)?;
        if self.content.trim().is_empty() {
            return Err(CoreError::ValidationError("content: this field is required".to_string()));
        }
        check_url("parameters_template_location", &self.parameters_template_location)?;
        if self.parameters_template.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "parameters_template: this field is required".to_string(),
            ));
        }
        Ok(())
    }
}
