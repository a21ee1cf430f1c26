//! Per-agent objective and context-map generation, both delegating to the
//! language-model capability. Not deterministic (LLM-driven) but idempotent
//! in its effect on the filesystem: re-running overwrites only the owning
//! agent's artifacts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CycleError;
use crate::llm::{LanguageModel, Message};
use crate::mission::Mission;
use crate::phase::PhaseStatus;
use crate::walker;

const OBJECTIVE_SYSTEM_PROMPT: &str = "\
You are an objective generation agent within an autonomous multi-agent coding system. Your \
role is to analyze mission context and agent capabilities to generate a clear, actionable next \
objective.

Key principles:
- Create a specific, measurable objective
- Ensure alignment with agent capabilities
- Maintain clear scope boundaries
- Define explicit success criteria";

const CONTEXT_MAP_SYSTEM_PROMPT: &str = "\
You partition a project's file tree into files one agent may edit this cycle and files it may \
only read for context. Respond with a JSON object: {\"editable\": [...], \"read_only\": [...]}.";

#[derive(Debug, Clone)]
pub struct Objective {
    pub agent: String,
    pub body: String,
    pub summary: String,
    pub cycle: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextMap {
    pub editable: Vec<PathBuf>,
    pub read_only: Vec<PathBuf>,
}

pub struct Planner<'a> {
    model: &'a dyn LanguageModel,
    history_tail_chars: usize,
}

impl<'a> Planner<'a> {
    pub fn new(model: &'a dyn LanguageModel, history_tail_chars: usize) -> Self {
        Self {
            model,
            history_tail_chars,
        }
    }

    /// Generate and persist an Objective for `agent`. Fails with
    /// `CycleError::PlanFailed` if the mission description is unreadable or
    /// the language model call fails.
    pub async fn generate_objective(
        &self,
        mission: &Mission,
        agent: &str,
        role_prompt: &str,
        cycle: u64,
        now: DateTime<Utc>,
    ) -> Result<Objective, CycleError> {
        let mission_content = mission
            .description()
            .map_err(|e| CycleError::MissionUnreadable(e.to_string()))?;

        let history = self.read_history_tail(mission, agent);
        let prompt = self.objective_prompt(&mission_content, role_prompt, agent, &history);

        let body = self
            .model
            .complete(&[Message::user(prompt)], Some(OBJECTIVE_SYSTEM_PROMPT))
            .await
            .map_err(|e| CycleError::PlanFailed {
                agent: agent.to_string(),
                message: e.to_string(),
            })?;

        let summary = self.generate_summary(&body, agent).await;

        std::fs::write(mission.objective_path(agent), &body).map_err(|source| {
            CycleError::Filesystem {
                path: mission.objective_path(agent),
                source,
            }
        })?;

        Ok(Objective {
            agent: agent.to_string(),
            body,
            summary,
            cycle,
            created_at: now,
        })
    }

    fn read_history_tail(&self, mission: &Mission, agent: &str) -> String {
        let path = mission.history_path(agent);
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.len() > self.history_tail_chars {
            let start = content.len() - self.history_tail_chars;
            content[start..].to_string()
        } else {
            content
        }
    }

    fn objective_prompt(
        &self,
        mission_content: &str,
        role_prompt: &str,
        agent: &str,
        chat_history: &str,
    ) -> String {
        format!(
            "Based on the following contexts, generate a clear objective for the {agent} agent \
             that will guide its next cycle.\n\n\
             # Mission\n{mission_content}\n\n\
             # Role\n{role_prompt}\n\n\
             # Recent history\n{chat_history}\n\n\
             # Breadth-first pattern\n\
             - Review previous objectives from the history above\n\
             - Generate an objective that explores a NEW aspect of the mission\n\
             - Avoid repeating or deepening very recent work\n\n\
             # Required output\n\
             Specify: an action statement, source files to consider, target files to modify, \
             validation points, operation bounds, and an optional external-search note.\n\
             The objective must be limited to one clear operation, self-contained, and \
             different from previous objectives."
        )
    }

    /// A short one-line summary of the objective, via a separate LLM call.
    /// Falls back to a deterministic local summary on failure — this call
    /// never fails the cycle.
    async fn generate_summary(&self, objective: &str, agent: &str) -> String {
        let prompt = format!(
            "Summarize in one sentence what the agent is about to do:\n\n{objective}"
        );
        match self
            .model
            .complete(&[Message::user(prompt)], None)
            .await
        {
            Ok(summary) => summary.trim().to_string(),
            Err(err) => {
                tracing::warn!(agent, error = %err, "objective summary generation failed, using fallback");
                format!("agent `{agent}` will run a new cycle")
            }
        }
    }

    /// Generate and persist a ContextMap for `agent`. Non-existent entries
    /// are created as empty files so the editor subprocess can address them.
    pub async fn generate_context_map(
        &self,
        mission: &Mission,
        agent: &str,
        role_prompt: &str,
        objective: &Objective,
        _phase: &PhaseStatus,
    ) -> Result<ContextMap, CycleError> {
        let mission_content = mission
            .description()
            .map_err(|e| CycleError::MissionUnreadable(e.to_string()))?;

        let tree = walker::walk_files(&mission.root, &[]).map_err(|e| CycleError::Filesystem {
            path: mission.root.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;
        let tree_listing = tree
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "# Mission\n{mission_content}\n\n\
             # Role\n{role_prompt}\n\n\
             # Objective\n{}\n\n\
             # Project tree\n{tree_listing}\n\n\
             Respond with the editable/read-only file partition as JSON.",
            objective.body
        );

        let response = self
            .model
            .complete(&[Message::user(prompt)], Some(CONTEXT_MAP_SYSTEM_PROMPT))
            .await
            .map_err(|e| CycleError::PlanFailed {
                agent: agent.to_string(),
                message: e.to_string(),
            })?;

        let json = crate::util::extract_json_object(&response).unwrap_or_else(|| response.clone());
        let context_map: ContextMap = serde_json::from_str(&json).unwrap_or_default();

        for path in context_map.editable.iter().chain(context_map.read_only.iter()) {
            let full = mission.root.join(path);
            if !full.exists() {
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                std::fs::write(&full, "").map_err(|source| CycleError::Filesystem {
                    path: full.clone(),
                    source,
                })?;
            }
        }

        let rendered = format!(
            "# Editable\n{}\n\n# Read-only\n{}",
            context_map
                .editable
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            context_map
                .read_only
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        std::fs::write(mission.context_map_path(agent), rendered).map_err(|source| {
            CycleError::Filesystem {
                path: mission.context_map_path(agent),
                source,
            }
        })?;

        Ok(context_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{PhaseController, PhaseThresholds};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeModel {
        replies: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().map(String::from).collect()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn complete(&self, _messages: &[Message], _system: Option<&str>) -> anyhow::Result<String> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no more fake replies"))
        }

        fn count_tokens(&self, _text: &str) -> u64 {
            0
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _messages: &[Message], _system: Option<&str>) -> anyhow::Result<String> {
            anyhow::bail!("provider unavailable")
        }

        fn count_tokens(&self, _text: &str) -> u64 {
            0
        }
    }

    /// Succeeds on the first call (the objective) and fails every call after
    /// (the summary), to exercise the summary's fallback in isolation.
    struct FailsAfterFirstCallModel {
        calls: Mutex<u32>,
    }

    impl FailsAfterFirstCallModel {
        fn new() -> Self {
            Self { calls: Mutex::new(0) }
        }
    }

    #[async_trait]
    impl LanguageModel for FailsAfterFirstCallModel {
        async fn complete(&self, _messages: &[Message], _system: Option<&str>) -> anyhow::Result<String> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok("objective body".to_string())
            } else {
                anyhow::bail!("provider unavailable")
            }
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

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn generate_objective_persists_body_and_summary() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        let model = FakeModel::new(vec!["objective body", "one line summary"]);
        let planner = Planner::new(&model, 25_000);

        let objective = planner
            .generate_objective(&mission, "production", "role text", 1, now())
            .await
            .unwrap();

        assert_eq!(objective.body, "objective body");
        assert_eq!(objective.summary, "one line summary");
        assert_eq!(
            std::fs::read_to_string(mission.objective_path("production")).unwrap(),
            "objective body"
        );
    }

    #[tokio::test]
    async fn generate_objective_fails_when_mission_unreadable() {
        let dir = tempdir().unwrap();
        let description = dir.path().join(".mission.md");
        std::fs::write(&description, "x").unwrap();
        let mission = Mission::bind(dir.path(), &description).unwrap();
        std::fs::remove_file(&description).unwrap();

        let model = FakeModel::new(vec![]);
        let planner = Planner::new(&model, 25_000);
        let result = planner
            .generate_objective(&mission, "production", "role", 1, now())
            .await;
        assert!(matches!(result, Err(CycleError::MissionUnreadable(_))));
    }

    #[tokio::test]
    async fn generate_objective_fails_when_llm_fails() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        let model = FailingModel;
        let planner = Planner::new(&model, 25_000);

        let result = planner
            .generate_objective(&mission, "production", "role", 1, now())
            .await;
        assert!(matches!(result, Err(CycleError::PlanFailed { .. })));
    }

    #[tokio::test]
    async fn summary_falls_back_deterministically_when_llm_fails() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        let model = FailsAfterFirstCallModel::new();
        let planner = Planner::new(&model, 25_000);

        let objective = planner
            .generate_objective(&mission, "production", "role", 1, now())
            .await
            .unwrap();

        assert_eq!(objective.body, "objective body");
        assert_eq!(objective.summary, "agent `production` will run a new cycle");
    }

    #[tokio::test]
    async fn context_map_creates_missing_files() {
        let dir = tempdir().unwrap();
        let mission = mission(dir.path());
        let model = FakeModel::new(vec![r#"{"editable": ["new_file.md"], "read_only": []}"#]);
        let planner = Planner::new(&model, 25_000);

        let controller = PhaseController::new(PhaseThresholds::default(), now());
        let status = controller.status();

        let objective = Objective {
            agent: "production".to_string(),
            body: "do a thing".to_string(),
            summary: "summary".to_string(),
            cycle: 1,
            created_at: now(),
        };

        let map = planner
            .generate_context_map(&mission, "production", "role", &objective, &status)
            .await
            .unwrap();

        assert_eq!(map.editable, vec![PathBuf::from("new_file.md")]);
        assert!(mission.root.join("new_file.md").exists());
    }
}
