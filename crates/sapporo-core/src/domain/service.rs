use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{check_text, check_url, MAX_FIELD_LENGTH};
use crate::CoreError;

/// A GA4GH WES endpoint the users can run workflows on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    /// Base URL, `service-info` and `runs` hang off it
    pub endpoint: String,
    pub auth_instructions_url: Option<String>,
    pub contact_info_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service: {}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDraft {
    pub name: String,
    pub endpoint: String,
    pub auth_instructions_url: Option<String>,
    pub contact_info_url: Option<String>,
}

impl ServiceDraft {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_text("name", &self.name, MAX_FIELD_LENGTH)?;
        check_url("endpoint", &self.endpoint)?;
        if let Some(url) = &self.auth_instructions_url {
            check_url("auth_instructions_url", url)?;
        }
        if let Some(url) = &self.contact_info_url {
            check_url("contact_info_url", url)?;
        }
        Ok(())
    }
}

/// A WES API version advertised by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedWesVersion {
    pub id: i64,
    pub service_id: i64,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for SupportedWesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SupportedWesVersion: {}", self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupportedWesVersionDraft {
    pub service_id: i64,
    pub version: String,
}

impl SupportedWesVersionDraft {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_text("version", &self.version, MAX_FIELD_LENGTH)
    }
}
