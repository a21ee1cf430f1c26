//! Layered configuration: TOML file → environment → CLI, matching the
//! donor's three-source resolution discipline but scoped to the settings
//! this orchestrator actually needs.
//!
//! # Configuration file format
//!
//! ```toml
//! mission_file = ".mission.md"
//!
//! [defaults]
//! concurrency = 4
//! stagger_delay_secs = 10
//! replacement_delay_secs = 3
//! model_token_limit = 128000
//! convergence_ratio = 0.60
//! expansion_ratio = 0.50
//! token_warning = 6000
//! token_error = 12000
//! stuck_phase_secs = 30
//! stuck_cycle_secs = 300
//! editor_cmd = "aider"
//! editor_package_dir = "editor-bin"
//! model = "sonnet"
//!
//! [teams.core]
//! agents = ["specification", "production", "evaluation"]
//!
//! [teams.core.weights.EXPANSION]
//! production = 2.0
//! specification = 1.0
//! evaluation = 0.5
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::phase::{PhaseThresholds, ProjectPhase};
use crate::tokens::TokenThresholds;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_stagger_delay_secs")]
    pub stagger_delay_secs: u64,
    #[serde(default = "default_replacement_delay_secs")]
    pub replacement_delay_secs: u64,
    #[serde(default = "default_model_token_limit")]
    pub model_token_limit: u64,
    #[serde(default = "default_convergence_ratio")]
    pub convergence_ratio: f64,
    #[serde(default = "default_expansion_ratio")]
    pub expansion_ratio: f64,
    #[serde(default = "default_token_warning")]
    pub token_warning: u64,
    #[serde(default = "default_token_error")]
    pub token_error: u64,
    #[serde(default = "default_stuck_phase_secs")]
    pub stuck_phase_secs: u64,
    #[serde(default = "default_stuck_cycle_secs")]
    pub stuck_cycle_secs: u64,
    #[serde(default = "default_editor_cmd")]
    pub editor_cmd: String,
    #[serde(default = "default_editor_package_dir")]
    pub editor_package_dir: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_history_tail_chars")]
    pub history_tail_chars: usize,
}

fn default_concurrency() -> usize {
    4
}
fn default_stagger_delay_secs() -> u64 {
    10
}
fn default_replacement_delay_secs() -> u64 {
    3
}
fn default_model_token_limit() -> u64 {
    128_000
}
fn default_convergence_ratio() -> f64 {
    0.60
}
fn default_expansion_ratio() -> f64 {
    0.50
}
fn default_token_warning() -> u64 {
    6_000
}
fn default_token_error() -> u64 {
    12_000
}
fn default_stuck_phase_secs() -> u64 {
    30
}
fn default_stuck_cycle_secs() -> u64 {
    300
}
fn default_editor_cmd() -> String {
    "aider".to_string()
}
fn default_editor_package_dir() -> String {
    "editor-bin".to_string()
}
fn default_model() -> String {
    "sonnet".to_string()
}
fn default_history_tail_chars() -> usize {
    25_000
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            stagger_delay_secs: default_stagger_delay_secs(),
            replacement_delay_secs: default_replacement_delay_secs(),
            model_token_limit: default_model_token_limit(),
            convergence_ratio: default_convergence_ratio(),
            expansion_ratio: default_expansion_ratio(),
            token_warning: default_token_warning(),
            token_error: default_token_error(),
            stuck_phase_secs: default_stuck_phase_secs(),
            stuck_cycle_secs: default_stuck_cycle_secs(),
            editor_cmd: default_editor_cmd(),
            editor_package_dir: default_editor_package_dir(),
            model: default_model(),
            history_tail_chars: default_history_tail_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    pub agents: Vec<String>,
    #[serde(default)]
    pub weights: HashMap<String, HashMap<String, f64>>,
}

impl TeamConfig {
    /// Configured weight for `agent` under `phase`, falling back to 0.5 if
    /// unspecified.
    pub fn weight(&self, phase: ProjectPhase, agent: &str) -> f64 {
        self.weights
            .get(phase.as_str())
            .and_then(|w| w.get(agent))
            .copied()
            .unwrap_or(0.5)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorToml {
    #[serde(default = "default_mission_file")]
    pub mission_file: String,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub teams: HashMap<String, TeamConfig>,
}

fn default_mission_file() -> String {
    ".mission.md".to_string()
}

impl OrchestratorToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default(config_path: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Overrides passed on the command line for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub mission_path: Option<PathBuf>,
    pub model: Option<String>,
    pub concurrency: Option<usize>,
    pub generate: bool,
    pub config_path: Option<PathBuf>,
}

/// Fully resolved configuration for one run, file → environment → CLI.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub mission_path: PathBuf,
    pub model: String,
    pub concurrency: usize,
    pub generate: bool,
    pub llm_api_key: String,
    pub defaults: DefaultsConfig,
    pub teams: HashMap<String, TeamConfig>,
}

const LLM_API_KEY_VAR: &str = "ORCHESTRATOR_LLM_API_KEY";

impl Config {
    pub fn load(project_dir: &Path, overrides: CliOverrides) -> Result<Self, ConfigError> {
        let project_dir = project_dir
            .canonicalize()
            .map_err(|source| ConfigError::ReadFailed {
                path: project_dir.to_path_buf(),
                source,
            })?;

        let config_path = overrides
            .config_path
            .clone()
            .unwrap_or_else(|| project_dir.join(".orchestrator").join("config.toml"));
        let toml = OrchestratorToml::load_or_default(&config_path)?;

        let mission_path = overrides
            .mission_path
            .clone()
            .unwrap_or_else(|| project_dir.join(&toml.mission_file));
        if !mission_path.exists() {
            return Err(ConfigError::MissionNotFound { path: mission_path });
        }

        let llm_api_key = std::env::var(LLM_API_KEY_VAR)
            .map_err(|_| ConfigError::MissingCredential(LLM_API_KEY_VAR.to_string()))?;

        Ok(Self {
            model: overrides.model.clone().unwrap_or_else(|| toml.defaults.model.clone()),
            concurrency: overrides.concurrency.unwrap_or(toml.defaults.concurrency),
            generate: overrides.generate,
            mission_path,
            llm_api_key,
            defaults: toml.defaults,
            teams: toml.teams,
            project_dir,
        })
    }

    pub fn team(&self, name: &str) -> Result<&TeamConfig, ConfigError> {
        self.teams
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTeam(name.to_string()))
    }

    pub fn phase_thresholds(&self) -> PhaseThresholds {
        PhaseThresholds {
            model_token_limit: self.defaults.model_token_limit,
            convergence_ratio: self.defaults.convergence_ratio,
            expansion_ratio: self.defaults.expansion_ratio,
        }
    }

    pub fn token_thresholds(&self) -> TokenThresholds {
        TokenThresholds {
            warning: self.defaults.token_warning,
            error: self.defaults.token_error,
        }
    }

    /// Absolute path to the bundled editor package directory, prepended to
    /// the editor subprocess's search path.
    pub fn editor_package_dir(&self) -> PathBuf {
        self.project_dir.join(".orchestrator").join(&self.defaults.editor_package_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_mission(dir: &Path) -> PathBuf {
        let mission = dir.join(".mission.md");
        std::fs::write(&mission, "# Mission").unwrap();
        mission
    }

    #[test]
    fn load_fails_without_api_key_env_var() {
        let dir = tempdir().unwrap();
        setup_mission(dir.path());
        unsafe {
            std::env::remove_var(LLM_API_KEY_VAR);
        }
        let result = Config::load(dir.path(), CliOverrides::default());
        assert!(matches!(result, Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn load_fails_without_mission_file() {
        let dir = tempdir().unwrap();
        unsafe {
            std::env::set_var(LLM_API_KEY_VAR, "test-key");
        }
        let result = Config::load(dir.path(), CliOverrides::default());
        assert!(matches!(result, Err(ConfigError::MissionNotFound { .. })));
    }

    #[test]
    fn load_applies_defaults_when_no_toml_present() {
        let dir = tempdir().unwrap();
        setup_mission(dir.path());
        unsafe {
            std::env::set_var(LLM_API_KEY_VAR, "test-key");
        }
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.defaults.model_token_limit, 128_000);
    }

    #[test]
    fn cli_overrides_take_precedence_over_file_and_defaults() {
        let dir = tempdir().unwrap();
        setup_mission(dir.path());
        unsafe {
            std::env::set_var(LLM_API_KEY_VAR, "test-key");
        }
        let overrides = CliOverrides {
            model: Some("opus".to_string()),
            concurrency: Some(8),
            ..Default::default()
        };
        let config = Config::load(dir.path(), overrides).unwrap();
        assert_eq!(config.model, "opus");
        assert_eq!(config.concurrency, 8);
    }

    #[test]
    fn unknown_team_is_an_error() {
        let dir = tempdir().unwrap();
        setup_mission(dir.path());
        unsafe {
            std::env::set_var(LLM_API_KEY_VAR, "test-key");
        }
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        assert!(matches!(config.team("ghost"), Err(ConfigError::UnknownTeam(_))));
    }

    #[test]
    fn team_weight_falls_back_to_half_when_unspecified() {
        let team = TeamConfig {
            agents: vec!["production".to_string()],
            weights: HashMap::new(),
        };
        assert_eq!(team.weight(ProjectPhase::Expansion, "production"), 0.5);
    }
}
