/// Registered accounts
pub mod user;

/// WES services and the WES versions they speak
pub mod service;

/// Workflow languages (CWL, WDL, ...)
pub mod workflow_type;

/// Workflow engines offered by a service
pub mod workflow_engine;

/// Workflows registered against a service
pub mod workflow;

/// Workflow runs
pub mod run;

/// Repository interfaces
pub mod repository;

use crate::CoreError;

/// Maximum length of the short text columns
pub const MAX_FIELD_LENGTH: usize = 256;

/// Reject empty values and values longer than `max` characters
pub(crate) fn check_text(field: &str, value: &str, max: usize) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationError(format!("{field}: this field is required")));
    }
    check_max_length(field, value, max)
}

pub(crate) fn check_max_length(field: &str, value: &str, max: usize) -> Result<(), CoreError> {
    let len = value.chars().count();
    if len > max {
        return Err(CoreError::ValidationError(format!(
            "{field}: ensure this value has at most {max} characters (it has {len})"
        )));
    }
    Ok(())
}

/// Reject anything that is not an absolute http(s) URL with a host
pub(crate) fn check_url(field: &str, value: &str) -> Result<(), CoreError> {
    check_text(field, value, MAX_FIELD_LENGTH)?;
    if !is_http_url(value) {
        return Err(CoreError::ValidationError(format!("{field}: enter a valid URL")));
    }
    Ok(())
}

/// True when `value` looks like `http://host...` or `https://host...`
pub fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}
