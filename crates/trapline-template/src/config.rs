#![forbid(unsafe_code)]

//! Template compilation settings.
//!
//! Environment overrides:
//! - `TRAPLINE_VALIDATE_TRANSFORMS` (bool)
//! - `TRAPLINE_GROUP_PREFIX` (non-empty string)
//! - `TRAPLINE_TRIM` (bool)

use std::env;
use std::fmt;

const ENV_VALIDATE_TRANSFORMS: &str = "TRAPLINE_VALIDATE_TRANSFORMS";
const ENV_GROUP_PREFIX: &str = "TRAPLINE_GROUP_PREFIX";
const ENV_TRIM: &str = "TRAPLINE_TRIM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateConfig {
    /// Resolve every `func:` name when binding and fail on unknown ones.
    /// When off, a missing transform is logged and values pass through.
    pub validate_transforms: bool,
    /// Prefix of synthetic group names (`group.1`, `group.2`, ...).
    pub group_prefix: String,
    /// Strip surrounding whitespace from template text before compiling.
    pub trim: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            validate_transforms: true,
            group_prefix: "group".to_owned(),
            trim: true,
        }
    }
}

/// Configuration parse diagnostics.
#[derive(Debug, Clone)]
pub struct TemplateConfigParse {
    pub config: TemplateConfig,
    pub errors: Vec<ConfigError>,
}

/// A rejected environment value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: &'static str,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl TemplateConfig {
    #[must_use]
    pub fn with_validate_transforms(mut self, validate: bool) -> Self {
        self.validate_transforms = validate;
        self
    }

    #[must_use]
    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Defaults overridden by the environment. Invalid values are logged
    /// and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let parse = Self::from_env_with_diagnostics();
        for error in &parse.errors {
            tracing::warn!(%error, "ignoring template config override");
        }
        parse.config
    }

    #[must_use]
    pub fn from_env_with_diagnostics() -> TemplateConfigParse {
        from_env_with(|key| env::var(key).ok())
    }
}

fn from_env_with<F>(mut get: F) -> TemplateConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = TemplateConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_VALIDATE_TRANSFORMS) {
        match parse_bool(&value) {
            Some(parsed) => config.validate_transforms = parsed,
            None => errors.push(ConfigError {
                field: "validate_transforms",
                value,
                message: "expected bool (1/0/true/false)",
            }),
        }
    }

    if let Some(value) = get(ENV_GROUP_PREFIX) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            errors.push(ConfigError {
                field: "group_prefix",
                value,
                message: "expected non-empty string",
            });
        } else {
            config.group_prefix = trimmed.to_owned();
        }
    }

    if let Some(value) = get(ENV_TRIM) {
        match parse_bool(&value) {
            Some(parsed) => config.trim = parsed,
            None => errors.push(ConfigError {
                field: "trim",
                value,
                message: "expected bool (1/0/true/false)",
            }),
        }
    }

    TemplateConfigParse { config, errors }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
