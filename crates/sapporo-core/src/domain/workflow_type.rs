use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{check_text, MAX_FIELD_LENGTH};
use crate::CoreError;

/// A workflow language and version, e.g. CWL v1.0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowType {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkflowType: {} {}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowTypeDraft {
    pub name: String,
    pub version: String,
}

impl WorkflowTypeDraft {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        check_text("name", &self.name, MAX_FIELD_LENGTH)?;
        check_text("version", &self.version, MAX_FIELD_LENGTH)
    }
}
