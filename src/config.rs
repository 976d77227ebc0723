//! Service configuration.
//!
//! Loaded from `chaptersplit.toml` (or the file named by `CHAPTERSPLIT_CONFIG`).
//! Environment variables override the `[server]` section; every field has a default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};

/// Default configuration file name, looked up in the working directory.
const CONFIG_FILE_NAME: &str = "chaptersplit.toml";

/// Env var naming an explicit config file.
const CONFIG_PATH_ENV: &str = "CHAPTERSPLIT_CONFIG";

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub tasks: TaskConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

/// `[detection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// A detection method is accepted only if one of its chapters has at least this many pages.
    #[serde(default = "default_min_pages")]
    pub min_pages_per_chapter: u32,

    /// Target chapter size for the even-split fallback.
    #[serde(default = "default_target_chapter_pages")]
    pub target_chapter_pages: u32,

    /// Heading patterns, tried in order against each line of page text.
    #[serde(default = "default_chapter_patterns")]
    pub chapter_patterns: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_pages_per_chapter: default_min_pages(),
            target_chapter_pages: default_target_chapter_pages(),
            chapter_patterns: default_chapter_patterns(),
        }
    }
}

fn default_min_pages() -> u32 {
    1
}
fn default_target_chapter_pages() -> u32 {
    20
}

/// Chapter heading forms, western and CJK.
pub fn default_chapter_patterns() -> Vec<String> {
    [
        r"^\s*第\s*[0-9一二三四五六七八九十百千零〇两]+\s*[章回]",
        r"(?i)^\s*chapter\s+(\d+|[ivxlcdm]+|[a-z]+)\b",
        r"(?i)^\s*chap\.\s*\d+\b",
        r"^\s*[IVXLC]+\.\s+\S",
        r"(?i)^\s*part\s+(\d+|[ivxlcdm]+)\b",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// `[tasks]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Root under which `<file_id>/chapters/` output directories are created.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Executions allowed in `Processing` at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_max_concurrent_tasks() -> usize {
    5
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SplitError::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SplitError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Load from `CHAPTERSPLIT_CONFIG` or `./chaptersplit.toml`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Path::new(&path))?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                Self::load_from(Path::new(CONFIG_FILE_NAME))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CHAPTERSPLIT_HOST`, `CHAPTERSPLIT_PORT`,
    /// `CHAPTERSPLIT_OUTPUT_DIR`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("CHAPTERSPLIT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CHAPTERSPLIT_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| SplitError::config(format!("CHAPTERSPLIT_PORT is not a port: {port}")))?;
        }
        if let Some(dir) = lookup("CHAPTERSPLIT_OUTPUT_DIR") {
            self.tasks.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection.target_chapter_pages == 0 {
            return Err(SplitError::config("detection.target_chapter_pages must be positive"));
        }
        if self.detection.min_pages_per_chapter == 0 {
            return Err(SplitError::config("detection.min_pages_per_chapter must be positive"));
        }
        if self.tasks.max_concurrent_tasks == 0 {
            return Err(SplitError::config("tasks.max_concurrent_tasks must be positive"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.detection.target_chapter_pages, 20);
        assert_eq!(config.detection.min_pages_per_chapter, 1);
        assert_eq!(config.tasks.max_concurrent_tasks, 5);
        assert!(!config.detection.chapter_patterns.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [detection]
            target_chapter_pages = 5

            [tasks]
            output_dir = "/tmp/out"
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.target_chapter_pages, 5);
        assert_eq!(config.detection.min_pages_per_chapter, 1);
        assert_eq!(config.tasks.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.tasks.max_concurrent_tasks, 5);
    }

    #[test]
    fn zero_target_size_is_rejected() {
        let err = AppConfig::from_toml_str("[detection]\ntarget_chapter_pages = 0").unwrap_err();
        assert!(err.to_string().contains("target_chapter_pages"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|key| match key {
                "CHAPTERSPLIT_PORT" => Some("9000".into()),
                "CHAPTERSPLIT_HOST" => Some("127.0.0.1".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn bad_port_override_fails() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == "CHAPTERSPLIT_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, SplitError::Config { .. }));
    }

    #[test]
    fn default_patterns_compile() {
        for pattern in default_chapter_patterns() {
            assert!(regex::Regex::new(&pattern).is_ok(), "{pattern}");
        }
    }
}
