//! `${VAR}` substitution for values that carry secrets.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ConfigError;

static ENV_VAR_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Replace every `${NAME}` with the value of environment variable `NAME`.
///
/// # Errors
/// `ConfigError::ValidationError` listing every undefined variable.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let resolved = ENV_VAR_REF.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(resolved.into_owned())
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if missing.len() > 1 { "s" } else { "" },
            missing.join(", ")
        )))
    }
}
