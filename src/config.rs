//! Configuration loading and management
//!
//! Handles parsing of `planr.toml` in the data home.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// File name of the configuration inside the data home
pub const CONFIG_FILE: &str = "planr.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Materialization and planning settings
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Plan generation providers
    #[serde(default)]
    pub ai: AiConfig,

    /// Change watching for `planr watch`
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Project identifier; namespaces live under `<home>/<project>/users/`
    #[serde(default = "default_project")]
    pub project: String,

    /// How long a writer waits for the namespace lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_project() -> String {
    "default".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Days of routine instances kept generated, starting today
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    /// Run a materialization pass before views and after routine changes
    #[serde(default = "default_true")]
    pub auto_materialize: bool,

    /// Prefix for tasks created from a generated plan
    #[serde(default = "default_ai_title_prefix")]
    pub ai_title_prefix: String,
}

fn default_horizon_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_ai_title_prefix() -> String {
    "[AI] ".to_string()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            auto_materialize: true,
            ai_title_prefix: default_ai_title_prefix(),
        }
    }
}

/// Plan generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider used when `--provider` is not given
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Base URL of the Gemini API
    #[serde(default = "default_gemini_endpoint")]
    pub gemini_endpoint: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            gemini_model: default_gemini_model(),
            gemini_endpoint: default_gemini_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period before filesystem events are coalesced into a reload
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How often the engine checks for a local date change
    #[serde(default = "default_rollover_check_secs")]
    pub rollover_check_secs: u64,
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_rollover_check_secs() -> u64 {
    60
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            rollover_check_secs: default_rollover_check_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a `planr.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data home, or defaults when absent.
    ///
    /// Unlike [`Config::load`], a missing file is not an error, but a present
    /// and invalid one is.
    pub fn load_from_home(home: &Path) -> Result<Self> {
        let config_path = home.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let project = self.store.project.trim();
        if project.is_empty() {
            return Err(Error::InvalidConfig(
                "store.project cannot be empty".to_string(),
            ));
        }
        if !is_path_segment(project) {
            return Err(Error::InvalidConfig(format!(
                "store.project '{project}' must be alphanumeric, '-' or '_'"
            )));
        }
        if self.store.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "store.lock_timeout_ms must be > 0".to_string(),
            ));
        }

        if !(1..=366).contains(&self.planner.horizon_days) {
            return Err(Error::InvalidConfig(format!(
                "planner.horizon_days must be within 1..=366 (got {})",
                self.planner.horizon_days
            )));
        }

        if self.ai.default_provider.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "ai.default_provider cannot be empty".to_string(),
            ));
        }
        if self.ai.gemini_model.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "ai.gemini_model cannot be empty".to_string(),
            ));
        }
        if !(self.ai.gemini_endpoint.starts_with("http://")
            || self.ai.gemini_endpoint.starts_with("https://"))
        {
            return Err(Error::InvalidConfig(format!(
                "ai.gemini_endpoint must be an http(s) URL (got '{}')",
                self.ai.gemini_endpoint
            )));
        }
        if self.ai.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "ai.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.watch.rollover_check_secs == 0 {
            return Err(Error::InvalidConfig(
                "watch.rollover_check_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// True for identifiers safe to use as a single directory name.
pub(crate) fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.store.project, "default");
        assert_eq!(cfg.store.lock_timeout_ms, 5000);
        assert_eq!(cfg.planner.horizon_days, 30);
        assert!(cfg.planner.auto_materialize);
        assert_eq!(cfg.planner.ai_title_prefix, "[AI] ");
        assert_eq!(cfg.ai.default_provider, "mock");
        assert_eq!(cfg.watch.debounce_ms, 200);
        assert_eq!(cfg.watch.rollover_check_secs, 60);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::write(
            temp.path().join(CONFIG_FILE),
            "[planner]\nhorizon_days = 14\n",
        )
        .expect("write config");

        let cfg = Config::load_from_home(temp.path()).expect("load");
        assert_eq!(cfg.planner.horizon_days, 14);
        assert!(cfg.planner.auto_materialize);
        assert_eq!(cfg.store.project, "default");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let cfg = Config::load_from_home(temp.path()).expect("load");
        assert_eq!(cfg.planner.horizon_days, 30);
    }

    #[test]
    fn rejects_out_of_range_horizon() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::write(temp.path().join(CONFIG_FILE), "[planner]\nhorizon_days = 0\n")
            .expect("write config");

        let err = Config::load_from_home(temp.path()).expect_err("should reject");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_project_with_separator() {
        let mut cfg = Config::default();
        cfg.store.project = "../escape".to_string();
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);

        let mut cfg = Config::default();
        cfg.ai.default_provider = "gemini".to_string();
        cfg.watch.debounce_ms = 50;
        cfg.save(&path).expect("save");

        let loaded = Config::load(&path).expect("load");
        assert_eq!(loaded.ai.default_provider, "gemini");
        assert_eq!(loaded.watch.debounce_ms, 50);
    }
}
