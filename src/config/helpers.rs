use std::str::FromStr;

use crate::error::ConfigError;

/// Source of environment values. The process environment in production, a
/// map in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Result<Option<String>, ConfigError>;

/// Read `key` from the process environment.
pub fn process_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "not valid unicode".to_string(),
        }),
    }
}

/// Look up `key`, treating empty values as unset.
pub(crate) fn optional_env(lookup: EnvLookup<'_>, key: &str) -> Result<Option<String>, ConfigError> {
    Ok(lookup(key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Parse `key` if set, else fall back to `default`.
pub(crate) fn parse_optional_env<T>(
    lookup: EnvLookup<'_>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(lookup, key)?
        .map(|s| s.parse())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a positive integer: {e}"),
        })
        .map(|v| v.unwrap_or(default))
}

/// An empty environment.
#[cfg(test)]
pub(crate) fn no_env(_key: &str) -> Result<Option<String>, ConfigError> {
    Ok(None)
}
