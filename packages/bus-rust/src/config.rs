//! Bus and logging configuration.

use std::fmt;
use std::path::Path;

use anyhow::Context as _;
use jsonapi_ops_core::{SchemaConfig, Schemas};
use serde::{Deserialize, Serialize};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `JSONAPI_OPS_LOG` is unset, e.g. `info` or
    /// `jsonapi_ops_bus=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration shared by the command and query buses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Path prefix stripped from `href` values before they are resolved,
    /// e.g. `/api/v1`.
    pub base_path: String,
    /// Locale for authorization messages when the request names none.
    pub default_locale: String,
    pub log: LogConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            default_locale: "en".to_string(),
            log: LogConfig::default(),
        }
    }
}

/// Reads a JSON schema file and builds the schema container.
///
/// # Errors
///
/// Fails if the file cannot be read, is not a valid schema document, or
/// declares an invalid type or id pattern.
pub fn load_schemas(path: &Path) -> anyhow::Result<Schemas> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema file {}", path.display()))?;
    let config: SchemaConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing schema file {}", path.display()))?;
    let schemas = Schemas::from_config(&config)
        .with_context(|| format!("building schemas from {}", path.display()))?;
    tracing::debug!(path = %path.display(), resources = schemas.len(), "schemas loaded");
    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use jsonapi_ops_core::SchemaContainer;
    use serde_json::json;

    use super::*;
    use crate::testing::rt;

    #[test]
    fn defaults() {
        let config = BusConfig::default();
        assert_eq!(config.default_locale, "en");
        assert!(config.base_path.is_empty());
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: BusConfig =
            serde_json::from_value(json!({"base_path": "/api/v1", "log": {"format": "json"}})).unwrap();
        assert_eq!(config.base_path, "/api/v1");
        assert_eq!(config.default_locale, "en");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn loads_schema_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!({
                "resources": [
                    {"type": "posts", "relationships": [
                        {"name": "author", "inverse": ["users"]}
                    ]},
                    {"type": "users"}
                ]
            })
        )
        .unwrap();

        let schemas = load_schemas(file.path()).unwrap();
        assert_eq!(schemas.len(), 2);
        assert!(schemas.relationship(&rt("posts"), "author").is_some());
    }

    #[test]
    fn missing_schema_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_schemas(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("reading schema file"));
    }
}
