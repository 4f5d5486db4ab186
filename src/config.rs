use crate::constants::{
    self, CBS_API_URL, CBS_FEED_URL, CBS_SOURCE, DEFAULT_DATA_ROOT, DEFAULT_LOG_RETENTION_DAYS,
    DEFAULT_LOG_ROOT, DEFAULT_MAX_WORKERS, DEFAULT_META_ROOT,
};
use crate::error::{IngestError, Result};
use crate::types::FailurePolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Process configuration, read once at startup from `config.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_root: PathBuf,
    pub meta_root: PathBuf,
    pub log_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            meta_root: PathBuf::from(DEFAULT_META_ROOT),
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Defaults to `{meta_root}/bronze/cbs/bronze_cbs_tables.json`
    pub manifest: Option<PathBuf>,
    /// Kept as text so an unknown value surfaces per table at processing time
    pub format: String,
    pub max_workers: usize,
    pub on_table_failure: FailurePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            manifest: None,
            format: "parquet".to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            on_table_failure: FailurePolicy::Continue,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub name: String,
    pub api_url: String,
    pub feed_url: String,
    pub timeout_seconds: Option<u64>,
    /// Read `TypedDataSet` (native numbers) instead of `UntypedDataSet` (text cells)
    pub typed: bool,
    pub resolve_dimensions: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: CBS_SOURCE.to_string(),
            api_url: CBS_API_URL.to_string(),
            feed_url: CBS_FEED_URL.to_string(),
            timeout_seconds: None,
            typed: false,
            resolve_dimensions: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub pushgateway_url: Option<String>,
}

impl Config {
    /// Load from `path`. A missing file falls back to defaults unless `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Config>(&content)?,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(IngestError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_workers == 0 {
            return Err(IngestError::Config("ingest.max_workers must be at least 1".into()));
        }
        if self.source.name.trim().is_empty() {
            return Err(IngestError::Config("source.name must not be empty".into()));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.ingest
            .manifest
            .clone()
            .unwrap_or_else(|| constants::default_manifest_path(&self.paths.meta_root))
    }

    /// Pushgateway URL, with the environment taking precedence over the file
    pub fn pushgateway_url(&self) -> Option<String> {
        std::env::var(constants::PUSHGATEWAY_ENV)
            .ok()
            .or_else(|| self.metrics.pushgateway_url.clone())
            .filter(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let tmp = tempdir().unwrap();
        let config = Config::load(&tmp.path().join("config.toml"), false).unwrap();
        assert_eq!(config.ingest.format, "parquet");
        assert_eq!(config.ingest.max_workers, 8);
        assert_eq!(config.logging.retention_days, 7);
        assert_eq!(config.source.name, "cbs");
        assert!(!config.source.typed);
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("meta/bronze/cbs/bronze_cbs_tables.json")
        );
    }

    #[test]
    fn test_missing_required_file_is_error() {
        let tmp = tempdir().unwrap();
        let err = Config::load(&tmp.path().join("nope.toml"), true).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[paths]
data_root = "/srv/data"

[ingest]
format = "csv"
max_workers = 2
on_table_failure = "abort"

[source]
timeout_seconds = 30
"#,
        )
        .unwrap();

        let config = Config::load(&path, true).unwrap();
        assert_eq!(config.paths.data_root, PathBuf::from("/srv/data"));
        assert_eq!(config.paths.log_root, PathBuf::from("logs"));
        assert_eq!(config.ingest.format, "csv");
        assert_eq!(config.ingest.max_workers, 2);
        assert_eq!(config.ingest.on_table_failure, FailurePolicy::Abort);
        assert_eq!(config.source.timeout_seconds, Some(30));
        assert!(config.source.resolve_dimensions);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[ingest]\nmax_workers = 0\n").unwrap();
        assert!(matches!(Config::load(&path, true), Err(IngestError::Config(_))));
    }
}
