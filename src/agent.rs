//! `AgentRole`: a named specialization drawn from a fixed closed set, plus
//! the bootstrap routine that generates role-prompt files when none exist.

use crate::llm::{LanguageModel, Message};
use crate::mission::Mission;

/// The fixed set of role names the system recognizes. Teams select a subset
/// of these; the set itself is closed.
pub const ROLE_NAMES: &[&str] = &[
    "specification",
    "management",
    "redaction",
    "evaluation",
    "deduplication",
    "chroniqueur",
    "redondance",
    "production",
    "chercheur",
    "integration",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRole {
    pub name: String,
}

impl AgentRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn emoji(&self) -> &'static str {
        crate::ui::agent_emoji(&self.name)
    }
}

/// Which of the fixed role names have a role-prompt file on disk.
pub fn discovered_roles(mission: &Mission) -> Vec<AgentRole> {
    ROLE_NAMES
        .iter()
        .filter(|name| mission.role_prompt_path(name).exists())
        .map(|name| AgentRole::new(*name))
        .collect()
}

pub fn missing_roles(mission: &Mission, force_regenerate: bool) -> Vec<&'static str> {
    if force_regenerate {
        return ROLE_NAMES.to_vec();
    }
    ROLE_NAMES
        .iter()
        .copied()
        .filter(|name| !mission.role_prompt_path(name).exists())
        .collect()
}

const BOOTSTRAP_SYSTEM_PROMPT: &str = "You write a role-prompt document for one specialized \
agent within a multi-agent coding team. The document describes the agent's responsibilities, \
capabilities, and boundaries in clear, actionable terms for a future coding session that will \
read it as its own brief.";

/// Generate role-prompt files for every role in `roles`, against the
/// mission description, writing one file per role. Used at startup when no
/// role-prompt files exist or `--generate` was requested.
pub async fn bootstrap_roles(
    mission: &Mission,
    model: &dyn LanguageModel,
    roles: &[&str],
) -> anyhow::Result<()> {
    let mission_content = mission.description()?;

    for role in roles {
        let prompt = format!(
            "Mission description:\n{mission_content}\n\n\
             Write the role-prompt document for the `{role}` agent."
        );
        let content = model
            .complete(&[Message::user(prompt)], Some(BOOTSTRAP_SYSTEM_PROMPT))
            .await?;
        std::fs::write(mission.role_prompt_path(role), content)?;
        tracing::info!(role, "generated role-prompt file");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FakeModel;

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn complete(&self, _messages: &[Message], _system: Option<&str>) -> anyhow::Result<String> {
            Ok("role prompt body".to_string())
        }

        fn count_tokens(&self, _text: &str) -> u64 {
            0
        }
    }

    fn mission(dir: &std::path::Path) -> Mission {
        let description = dir.join(".mission.md");
        std::fs::write(&description, "build a thing").unwrap();
        Mission::bind(dir, &description).unwrap()
    }

    #[test]
    fn missing_roles_lists_all_when_none_exist() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        assert_eq!(missing_roles(&mission, false).len(), ROLE_NAMES.len());
    }

    #[test]
    fn missing_roles_excludes_existing_role_prompts() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        std::fs::write(mission.role_prompt_path("production"), "x").unwrap();

        let missing = missing_roles(&mission, false);
        assert!(!missing.contains(&"production"));
        assert_eq!(missing.len(), ROLE_NAMES.len() - 1);
    }

    #[test]
    fn force_regenerate_returns_full_set_even_if_present() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        std::fs::write(mission.role_prompt_path("production"), "x").unwrap();
        assert_eq!(missing_roles(&mission, true).len(), ROLE_NAMES.len());
    }

    #[test]
    fn discovered_roles_reflects_files_on_disk() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        std::fs::write(mission.role_prompt_path("production"), "x").unwrap();
        std::fs::write(mission.role_prompt_path("evaluation"), "x").unwrap();

        let roles = discovered_roles(&mission);
        assert_eq!(roles.len(), 2);
        assert!(roles.contains(&AgentRole::new("production")));
    }

    #[tokio::test]
    async fn bootstrap_roles_writes_one_file_per_role() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        let model = FakeModel;

        bootstrap_roles(&mission, &model, &["production", "evaluation"])
            .await
            .unwrap();

        assert!(mission.role_prompt_path("production").exists());
        assert!(mission.role_prompt_path("evaluation").exists());
    }
}
