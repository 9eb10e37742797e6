//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// An unset variable without a default is an error naming `field`. Strings
/// without `${` are returned unchanged, so a bare `$` in a command argument
/// survives.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, LookupError> {
        match std::env::var(var) {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(LookupError {
                var_name: var.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Expand every argument of a command line; `field` gets the index appended.
pub(crate) fn expand_command(command: &[String], field: &str) -> Result<Vec<String>, ConfigError> {
    command
        .iter()
        .enumerate()
        .map(|(i, arg)| expand_env(arg, &format!("{field}[{i}]")))
        .collect()
}

struct LookupError {
    var_name: String,
}
