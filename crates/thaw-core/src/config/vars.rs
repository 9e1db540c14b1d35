//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}`: value of `VAR`, an error when it is unset
//! - `${VAR:-fallback}`: `fallback` when `VAR` is unset or empty
//! - `${VAR-fallback}`: `fallback` only when `VAR` is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:(?P<op>:?-)(?P<fallback>[^}]*))?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("interpolation pattern is valid")
});

/// Outcome of [`interpolate`].
#[derive(Debug)]
pub struct InterpolationResult {
    pub text: String,
    /// One message per failed substitution, in order of appearance.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Substitute environment variables into `input`.
///
/// Every failed substitution is collected so a config with several missing
/// variables reports all of them at once. Failed references are left in the
/// text untouched.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();
    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| substitute(caps, &mut errors))
        .into_owned();
    InterpolationResult { text, errors }
}

fn substitute(caps: &Captures, errors: &mut Vec<String>) -> String {
    let original = &caps[0];
    if caps.name("escape").is_some() {
        return "$".to_string();
    }

    let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
        return original.to_string();
    };
    let name = name.as_str();
    let empty_uses_fallback = caps.name("op").is_some_and(|op| op.as_str() == ":-");
    let fallback = caps.name("fallback").map(|m| m.as_str());

    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains(['\n', '\r']) => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            original.to_string()
        }
        (Ok(value), Some(fallback)) if value.is_empty() && empty_uses_fallback => {
            fallback.to_string()
        }
        (Ok(value), _) => value,
        (Err(_), Some(fallback)) => fallback.to_string(),
        (Err(_), None) => {
            errors.push(format!("environment variable '{name}' is not set"));
            original.to_string()
        }
    }
}
