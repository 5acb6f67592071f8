use thiserror::Error;

use crate::config::ConfigError;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// This is a thin wrapper around `std::env::var` that provides a more
/// ergonomic and specific error type for missing variables.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    std::env::var(name).map_err(|_| MissingEnvVarError(name.to_string()))
}

/// Reads an optional environment variable. Blank values count as unset.
pub fn get_env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads a boolean flag such as `ENABLE_LOCAL_DB`, falling back to `default` when unset.
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off` in any case.
pub fn get_env_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    flag_or(name, get_env_opt(name), default)
}

/// Reads a numeric variable, falling back to `default` when unset.
pub fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    parse_or(name, get_env_opt(name), default)
}

/// Interprets an already looked-up value of flag `name`.
pub fn flag_or(name: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
            name: name.to_string(),
            value: raw,
        }),
    }
}

/// Parses an already looked-up value of variable `name`.
pub fn parse_or<T: std::str::FromStr>(
    name: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}

/// Parses the flag spellings accepted by [`get_env_flag`].
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" yes "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("Off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn missing_var_names_the_variable() {
        let err = get_env_var("SHARED_UTILS_SURELY_UNSET_VAR").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing environment variable: SHARED_UTILS_SURELY_UNSET_VAR"
        );
    }

    #[test]
    fn looked_up_values_are_validated() {
        assert!(!flag_or("ENABLE_X", Some("no".into()), true).unwrap());
        let err = flag_or("ENABLE_X", Some("maybe".into()), true).unwrap_err();
        assert_eq!(err.to_string(), "Invalid boolean for ENABLE_X: \"maybe\"");
        assert_eq!(parse_or("WORKERS", Some(" 8 ".into()), 4usize).unwrap(), 8);
        assert!(parse_or("WORKERS", Some("eight".into()), 4usize).is_err());
    }

    #[test]
    fn unset_flag_uses_default() {
        assert!(get_env_flag("SHARED_UTILS_SURELY_UNSET_FLAG", true).unwrap());
        assert_eq!(get_env_parse("SHARED_UTILS_SURELY_UNSET_NUM", 7u64).unwrap(), 7);
    }
}
