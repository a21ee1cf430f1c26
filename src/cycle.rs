//! Executes one complete agent cycle: plan, then three ordered editor
//! phases, each bracketed by read-only version-control hash snapshots,
//! followed by post-cycle operations if anything was modified.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::editor::{self, EditorInvocation};
use crate::errors::CycleError;
use crate::llm::LanguageModel;
use crate::map::MapMaintainer;
use crate::mission::Mission;
use crate::phase::PhaseController;
use crate::planner::Planner;
use crate::tokens::TokenAccountant;
use crate::vcs::{self, GitTracker};

/// The three ordered phases of a cycle, each a fresh editor invocation with
/// a phase-specific trailing instruction appended to the objective.
const PHASES: &[(&str, &str)] = &[
    ("production", "focus on the production objective."),
    ("role-specific", "focus on the role-specific objective."),
    (
        "final-check",
        "any additional changes required? then update the task list to reflect the changes.",
    ),
];

#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub phase: &'static str,
    pub modified: Vec<PathBuf>,
    pub exit_code: i32,
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub agent: String,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<PhaseOutcome>,
    pub duration: Duration,
    pub partially_failed: bool,
}

impl CycleRecord {
    pub fn all_modified(&self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self
            .phases
            .iter()
            .flat_map(|p| p.modified.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

pub struct CycleExecutor<'a> {
    mission: &'a Mission,
    planner: Planner<'a>,
    phase_controller: &'a PhaseController,
    accountant: &'a TokenAccountant,
    vcs: &'a GitTracker,
    editor_cmd: String,
    editor_package_dir: PathBuf,
    model: String,
}

impl<'a> CycleExecutor<'a> {
    pub fn new(
        mission: &'a Mission,
        model: &'a dyn LanguageModel,
        history_tail_chars: usize,
        phase_controller: &'a PhaseController,
        accountant: &'a TokenAccountant,
        vcs: &'a GitTracker,
        editor_cmd: impl Into<String>,
        editor_package_dir: impl Into<PathBuf>,
        editor_model: impl Into<String>,
    ) -> Self {
        Self {
            mission,
            planner: Planner::new(model, history_tail_chars),
            phase_controller,
            accountant,
            vcs,
            editor_cmd: editor_cmd.into(),
            editor_package_dir: editor_package_dir.into(),
            model: editor_model.into(),
        }
    }

    /// Run one complete cycle for `agent`. A Planner failure aborts before
    /// the editor is ever invoked. An editor-phase failure does not abort
    /// remaining phases; it is recorded as partially-failed.
    pub async fn run(
        &self,
        agent: &str,
        role_prompt: &str,
        cycle_number: u64,
        now: DateTime<Utc>,
    ) -> Result<CycleRecord, CycleError> {
        let start = Instant::now();
        let objective = self
            .planner
            .generate_objective(self.mission, agent, role_prompt, cycle_number, now)
            .await?;

        let total_tokens = self
            .accountant
            .total_tokens(&self.mission.root, &[])
            .unwrap_or(0);
        let status = self.phase_controller.evaluate(total_tokens, now);
        let phase_status = self.phase_controller.status();
        let _ = status;

        let context_map = self
            .planner
            .generate_context_map(self.mission, agent, role_prompt, &objective, &phase_status)
            .await?;

        let mut outcomes = Vec::with_capacity(PHASES.len());
        let mut partially_failed = false;

        for (phase_name, instruction) in PHASES {
            let message = format!("{}\n\n{instruction}", objective.body);

            let before = self.snapshot()?;

            let invocation = EditorInvocation {
                editor_cmd: &self.editor_cmd,
                model: &self.model,
                project_dir: &self.mission.root,
                package_dir: &self.editor_package_dir,
                editable_files: &context_map.editable,
                read_only_files: &context_map.read_only,
                todolist_path: &self.mission.todolist_path(),
                role_prompt_path: &self.mission.role_prompt_path(agent),
                history_file: &self.mission.history_path(agent),
                input_history_file: &self.mission.input_history_path(agent),
                message: &message,
            };

            let result = editor::run_phase(&invocation).await;

            let after = self.snapshot()?;
            let modified = vcs::modified_paths(&before, &after);

            match result {
                Ok(outcome) if outcome.exit_code == 0 => {
                    outcomes.push(PhaseOutcome {
                        phase: phase_name,
                        modified,
                        exit_code: 0,
                        failed: false,
                    });
                }
                Ok(outcome) => {
                    let err = CycleError::EditorPhaseFailed {
                        phase: phase_name.to_string(),
                        exit_code: outcome.exit_code,
                    };
                    tracing::warn!(phase = phase_name, error = %err, "editor phase exited non-zero");
                    partially_failed = true;
                    outcomes.push(PhaseOutcome {
                        phase: phase_name,
                        modified,
                        exit_code: outcome.exit_code,
                        failed: true,
                    });
                }
                Err(err) => {
                    tracing::error!(phase = phase_name, error = %err, "editor phase failed to run");
                    partially_failed = true;
                    outcomes.push(PhaseOutcome {
                        phase: phase_name,
                        modified,
                        exit_code: -1,
                        failed: true,
                    });
                }
            }
        }

        let record = CycleRecord {
            agent: agent.to_string(),
            started_at: now,
            phases: outcomes,
            duration: start.elapsed(),
            partially_failed,
        };

        if !record.all_modified().is_empty() {
            self.post_cycle_hooks(now);
        }

        Ok(record)
    }

    fn snapshot(&self) -> Result<vcs::TrackedFiles, CycleError> {
        self.vcs
            .list_tracked_files()
            .map_err(|e| CycleError::VcsSnapshotFailed(e.to_string()))
    }

    fn post_cycle_hooks(&self, now: DateTime<Utc>) {
        match self.vcs.latest_commit_summary() {
            Ok((hash, message)) => {
                tracing::info!(commit = %hash, %message, "latest commit after cycle");
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not read latest commit summary");
            }
        }

        if let Err(err) = self.vcs.push() {
            let err = CycleError::VcsPushFailed(err.to_string());
            tracing::info!(error = %err, "push skipped (non-fatal)");
        }

        let maintainer = MapMaintainer::new(self.accountant, self.phase_controller, &self.mission.root);
        maintainer.update(&self.mission.root, now);
    }
}
