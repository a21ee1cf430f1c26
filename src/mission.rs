//! The mission: the working directory a process operates on for its entire
//! lifetime, plus the mission-description artifact that seeds the Planner.

use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

pub struct Mission {
    pub root: PathBuf,
    pub description_path: PathBuf,
}

impl Mission {
    /// Bind a mission at process start. Fails fast if the description file
    /// is absent — startup must not proceed without it.
    pub fn bind(root: &Path, description_path: &Path) -> Result<Self, ConfigError> {
        if !description_path.exists() {
            return Err(ConfigError::MissionNotFound {
                path: description_path.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            description_path: description_path.to_path_buf(),
        })
    }

    pub fn description(&self) -> std::io::Result<String> {
        let bytes = std::fs::read(&self.description_path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn role_prompt_path(&self, agent: &str) -> PathBuf {
        self.root.join(format!(".agent.{agent}.md"))
    }

    pub fn objective_path(&self, agent: &str) -> PathBuf {
        self.root.join(format!(".objective.{agent}.md"))
    }

    pub fn context_map_path(&self, agent: &str) -> PathBuf {
        self.root.join(format!(".map.{agent}.md"))
    }

    pub fn history_path(&self, agent: &str) -> PathBuf {
        self.root.join(format!(".history.{agent}.md"))
    }

    pub fn input_history_path(&self, agent: &str) -> PathBuf {
        self.root.join(format!(".input-history.{agent}.md"))
    }

    pub fn project_map_path(&self) -> PathBuf {
        self.root.join("map.md")
    }

    pub fn todolist_path(&self) -> PathBuf {
        self.root.join("todolist.md")
    }
}
