use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{check_max_length, check_text, MAX_FIELD_LENGTH};
use crate::CoreError;

/// Run state as reported by a WES endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    #[default]
    Unknown,
    Queued,
    Initializing,
    Running,
    Paused,
    Complete,
    ExecutorError,
    SystemError,
    Canceled,
    Canceling,
}

impl RunState {
    pub const ALL: [RunState; 10] = [
        RunState::Unknown,
        RunState::Queued,
        RunState::Initializing,
        RunState::Running,
        RunState::Paused,
        RunState::Complete,
        RunState::ExecutorError,
        RunState::SystemError,
        RunState::Canceled,
        RunState::Canceling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Unknown => "UNKNOWN",
            RunState::Queued => "QUEUED",
            RunState::Initializing => "INITIALIZING",
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Complete => "COMPLETE",
            RunState::ExecutorError => "EXECUTOR_ERROR",
            RunState::SystemError => "SYSTEM_ERROR",
            RunState::Canceled => "CANCELED",
            RunState::Canceling => "CANCELING",
        }
    }

    /// No further state changes are expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Complete | RunState::ExecutorError | RunState::SystemError | RunState::Canceled
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::ValidationError(format!("state: unknown run state '{s}'")))
    }
}

/// A user's execution of a workflow on one of its engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub user_id: i64,
    pub workflow_id: i64,
    /// Cleared when the engine is deleted
    pub workflow_engine_id: Option<i64>,
    pub name: String,
    /// Identifier assigned by the WES endpoint once submitted
    pub run_id: Option<String>,
    pub state: RunState,
    /// Workflow parameters, JSON
    pub parameters: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Run: {}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunDraft {
    pub user_id: i64,
    pub workflow_id: i64,
    pub workflow_engine_id: Option<i64>,
    pub name: String,
    pub run_id: Option<String>,
    pub state: RunState,
    pub parameters: String,
}

impl RunDraft {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_text("name", &self.name, MAX_FIELD_LENGTH)?;
        if let Some(run_id) = &self.run_id {
            check_max_length("run_id", run_id, MAX_FIELD_LENGTH)?;
        }
        if !self.parameters.trim().is_empty() {
            serde_json::from_str::<serde_json::Value>(&self.parameters).map_err(|e| {
                CoreError::ValidationError(format!("parameters: not valid JSON ({e})"))
            })?;
        }
        Ok(())
    }
}
