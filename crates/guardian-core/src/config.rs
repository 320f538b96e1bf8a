//! Privacy Guardian configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default number of characters of a source file sent to the oracle.
/// Privacy issues tend to sit near the top of a file, so the prefix is kept.
pub const DEFAULT_MAX_FILE_CHARS: usize = 4000;

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Cloud project owning the analytics dataset
    pub project: Option<String>,

    /// Directory receiving analytics batches (none = analytics disabled)
    pub analytics_dir: Option<PathBuf>,

    /// Directory holding one file per secret id
    pub secrets_dir: Option<PathBuf>,

    /// Oracle client settings
    pub oracle: OracleConfig,

    /// Enhancement engine settings
    pub enhancement: EnhancementConfig,

    /// Orchestrator settings
    pub pipeline: PipelineConfig,
}

impl GuardianConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML or JSON file (chosen by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let config: Self = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: display,
                reason: e.to_string(),
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: display,
                reason: e.to_string(),
            })?
        };

        Ok(config)
    }

    /// Save configuration as TOML
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overlay environment variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup("GOOGLE_CLOUD_PROJECT") {
            self.project = Some(project).filter(|p| !p.trim().is_empty());
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.oracle.model = model;
        }
        if let Some(chars) = lookup("GUARDIAN_MAX_FILE_CHARS") {
            self.enhancement.max_file_chars =
                chars.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "GUARDIAN_MAX_FILE_CHARS",
                    reason: format!("not a number: {}", chars),
                })?;
        }
        if let Some(secs) = lookup("GUARDIAN_STAGE_TIMEOUT_SECS") {
            self.pipeline.stage_timeout_secs =
                secs.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "GUARDIAN_STAGE_TIMEOUT_SECS",
                    reason: format!("not a number: {}", secs),
                })?;
        }
        if let Some(dir) = lookup("GUARDIAN_ANALYTICS_DIR") {
            self.analytics_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Reject configurations no unit can be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "oracle.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.enhancement.max_file_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "enhancement.max_file_chars",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.enhancement.max_concurrent_files == 0 {
            return Err(ConfigError::Invalid {
                field: "enhancement.max_concurrent_files",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.stage_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pipeline.scanner_command.is_empty() {
            return Err(ConfigError::Invalid {
                field: "pipeline.scanner_command",
                reason: "must name a program".to_string(),
            });
        }
        Ok(())
    }

    /// Analytics table qualified with the project, `project.dataset.table`
    pub fn analytics_table(&self) -> String {
        match &self.project {
            Some(project) => format!("{}.{}", project, self.enhancement.analytics_table),
            None => self.enhancement.analytics_table.clone(),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_analytics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.analytics_dir = Some(dir.into());
        self
    }

    pub fn with_max_file_chars(mut self, chars: usize) -> Self {
        self.enhancement.max_file_chars = chars;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline.stage_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_scanner_command(mut self, command: Vec<String>) -> Self {
        self.pipeline.scanner_command = command;
        self
    }
}

/// Oracle client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Secret-store id holding the API key; checked before `api_key_env`
    pub api_key_secret: Option<String>,

    pub temperature: f64,

    pub max_output_tokens: u32,

    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key_secret: None,
            temperature: 0.1,
            max_output_tokens: 2000,
            request_timeout_secs: 60,
        }
    }
}

/// Enhancement engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// File content prefix length, in characters, included in prompts
    pub max_file_chars: usize,

    /// File groups analysed at once; 1 keeps the reference sequential order
    pub max_concurrent_files: usize,

    /// Base directory for relative finding paths
    pub source_root: Option<PathBuf>,

    /// Analytics table receiving the enhanced finding set
    pub analytics_table: String,

    /// Gauge exported after a successful enhancement
    pub metric_name: String,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            max_file_chars: DEFAULT_MAX_FILE_CHARS,
            max_concurrent_files: 1,
            source_root: None,
            analytics_table: "privacy.enhanced_results".to_string(),
            metric_name: "agent/ai_enhanced_violations".to_string(),
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on one stage invocation
    pub stage_timeout_secs: u64,

    /// Rule-engine command; the project path is appended as last argument
    pub scanner_command: Vec<String>,
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 300,
            scanner_command: vec!["node".to_string(), "rule_engine_cli.js".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = GuardianConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enhancement.max_file_chars, DEFAULT_MAX_FILE_CHARS);
        assert_eq!(config.oracle.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = GuardianConfig::default().with_max_file_chars(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "enhancement.max_file_chars", .. })
        ));

        let mut config = GuardianConfig::default();
        config.pipeline.scanner_command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_CLOUD_PROJECT", "acme"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("GUARDIAN_MAX_FILE_CHARS", "128"),
        ]
        .into_iter()
        .collect();

        let mut config = GuardianConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.project.as_deref(), Some("acme"));
        assert_eq!(config.oracle.model, "gemini-1.5-pro");
        assert_eq!(config.enhancement.max_file_chars, 128);
    }

    #[test]
    fn test_analytics_table_is_project_qualified() {
        let config = GuardianConfig::default();
        assert_eq!(config.analytics_table(), "privacy.enhanced_results");

        let config = config.with_project("acme");
        assert_eq!(config.analytics_table(), "acme.privacy.enhanced_results");

        let mut config = GuardianConfig::default();
        config
            .apply_env(|k| (k == "GOOGLE_CLOUD_PROJECT").then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(config.analytics_table(), "privacy.enhanced_results");
    }

    #[test]
    fn test_env_overlay_rejects_garbage_numbers() {
        let mut config = GuardianConfig::default();
        let result = config.apply_env(|k| {
            (k == "GUARDIAN_STAGE_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.toml");
        std::fs::write(
            &path,
            "[enhancement]\nmax_file_chars = 10\n\n[pipeline]\nstage_timeout_secs = 5\n",
        )
        .unwrap();

        let config = GuardianConfig::from_file(&path).unwrap();
        assert_eq!(config.enhancement.max_file_chars, 10);
        assert_eq!(config.pipeline.stage_timeout(), Duration::from_secs(5));
        assert_eq!(config.oracle.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let config = GuardianConfig::default().with_analytics_dir("/tmp/analytics");
        config.to_file(&path).unwrap();
        assert_eq!(GuardianConfig::from_file(&path).unwrap(), config);
    }
}
