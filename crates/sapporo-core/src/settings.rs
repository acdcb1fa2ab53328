//! Parsing helpers for environment-driven settings

use crate::CoreError;

/// Message shown when a boolean setting cannot be parsed
pub const BOOL_HINT: &str = "Please check your docker-compose.yml:environment, \
The bool value should be 'true value are y, yes, t, true, on and 1; \
false values are n, no, f, false, off and 0'";

/// Parse a boolean setting.
///
/// Accepts `y yes t true on 1` and `n no f false off 0`, ignoring case and
/// surrounding whitespace.
pub fn str_to_bool(value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(CoreError::ConfigurationError(BOOL_HINT.to_string())),
    }
}

/// Parse an optional boolean setting, falling back to `default` when unset
pub fn bool_or(value: Option<&str>, default: bool) -> Result<bool, CoreError> {
    value.map(str_to_bool).unwrap_or(Ok(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_truthy_spellings() {
        for v in ["y", "YES", "t", "True", "on", "1", " true "] {
            assert!(str_to_bool(v).unwrap(), "{v} should be true");
        }
    }

    #[test]
    fn accepts_falsy_spellings() {
        for v in ["n", "No", "f", "FALSE", "off", "0"] {
            assert!(!str_to_bool(v).unwrap(), "{v} should be false");
        }
    }

    #[test]
    fn rejects_anything_else() {
        for v in ["", "2", "enabled", "truthy", "nope"] {
            let err = str_to_bool(v).unwrap_err();
            assert_eq!(err, CoreError::ConfigurationError(BOOL_HINT.to_string()));
        }
    }

    #[test]
    fn bool_or_uses_default_when_unset() {
        assert!(bool_or(None, true).unwrap());
        assert!(!bool_or(Some("off"), true).unwrap());
        assert!(bool_or(Some("maybe"), false).is_err());
    }
}
