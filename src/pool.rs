//! Runner Pool: K-bounded concurrent agent cycles. An agent-exclusion set
//! prevents two cycles from claiming the same agent; a phase-weighted random
//! draw picks the next agent to run; completed slots are replaced after a
//! short delay so the pool stays saturated at `concurrency` as long as
//! agents remain available.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent;
use crate::config::{Config, TeamConfig};
use crate::cycle::{CycleExecutor, CycleRecord};
use crate::errors::{CycleError, PoolError};
use crate::llm::LanguageModel;
use crate::mission::Mission;
use crate::phase::{PhaseController, ProjectPhase};
use crate::tokens::TokenAccountant;
use crate::vcs::GitTracker;

pub struct PoolSettings {
    pub concurrency: usize,
    pub stagger_delay: Duration,
    pub replacement_delay: Duration,
    pub stuck_cycle: Duration,
    pub editor_cmd: String,
    pub editor_package_dir: PathBuf,
    pub model: String,
    pub history_tail_chars: usize,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            stagger_delay: Duration::from_secs(config.defaults.stagger_delay_secs),
            replacement_delay: Duration::from_secs(config.defaults.replacement_delay_secs),
            stuck_cycle: Duration::from_secs(config.defaults.stuck_cycle_secs),
            editor_cmd: config.defaults.editor_cmd.clone(),
            editor_package_dir: config.editor_package_dir(),
            model: config.model.clone(),
            history_tail_chars: config.defaults.history_tail_chars,
        }
    }
}

/// Agents currently running a cycle. Claim/release are the only mutators;
/// `try_claim` doubles as the thread-safe membership test + insert.
struct ActiveAgents(StdMutex<HashSet<String>>);

impl ActiveAgents {
    fn new() -> Self {
        Self(StdMutex::new(HashSet::new()))
    }

    fn try_claim(&self, agent: &str) -> bool {
        self.0
            .lock()
            .expect("active agents mutex poisoned")
            .insert(agent.to_string())
    }

    fn release(&self, agent: &str) {
        self.0.lock().expect("active agents mutex poisoned").remove(agent);
    }

    fn snapshot(&self) -> HashSet<String> {
        self.0.lock().expect("active agents mutex poisoned").clone()
    }
}

/// Pick one agent from `available`, weighted by the team's per-phase
/// weights. Falls back to a uniform draw if every candidate weighs zero.
fn draw_agent(team: &TeamConfig, available: &[String], phase: ProjectPhase) -> Option<String> {
    if available.is_empty() {
        return None;
    }
    let weights: Vec<f64> = available.iter().map(|a| team.weight(phase, a)).collect();
    let total: f64 = weights.iter().sum();
    let mut rng = rand::thread_rng();

    if total <= 0.0 {
        let idx = rng.gen_range(0..available.len());
        return Some(available[idx].clone());
    }

    let dist = WeightedIndex::new(&weights).ok()?;
    Some(available[dist.sample(&mut rng)].clone())
}

pub struct RunnerPool {
    mission: Arc<Mission>,
    model: Arc<dyn LanguageModel>,
    phase_controller: Arc<PhaseController>,
    accountant: Arc<TokenAccountant>,
    team: TeamConfig,
    settings: Arc<PoolSettings>,
    active: Arc<ActiveAgents>,
    cancelled: Arc<AtomicBool>,
}

impl RunnerPool {
    pub fn new(
        mission: Arc<Mission>,
        model: Arc<dyn LanguageModel>,
        phase_controller: Arc<PhaseController>,
        accountant: Arc<TokenAccountant>,
        team: TeamConfig,
        settings: PoolSettings,
    ) -> Self {
        Self {
            mission,
            model,
            phase_controller,
            accountant,
            team,
            settings: Arc::new(settings),
            active: Arc::new(ActiveAgents::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Generate role-prompt files for any team agent missing one, or for
    /// every agent if `force_regenerate` is set. Called once before `run`.
    pub async fn bootstrap(
        mission: &Mission,
        model: &dyn LanguageModel,
        team: &TeamConfig,
        force_regenerate: bool,
    ) -> anyhow::Result<()> {
        let missing: Vec<&str> = agent::missing_roles(mission, force_regenerate)
            .into_iter()
            .filter(|role| team.agents.iter().any(|a| a == role))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        agent::bootstrap_roles(mission, model, &missing).await
    }

    /// Signal every in-flight cycle to stop claiming replacements. Phases
    /// already running are allowed to finish; no new ones are spawned.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn try_draw(&self) -> Option<String> {
        let phase = self.phase_controller.status().phase;
        let active = self.active.snapshot();
        let available: Vec<String> = self
            .team
            .agents
            .iter()
            .filter(|a| !active.contains(*a))
            .filter(|a| self.mission.role_prompt_path(a).exists())
            .cloned()
            .collect();

        let agent = draw_agent(&self.team, &available, phase)?;
        self.active.try_claim(&agent).then_some(agent)
    }

    fn spawn_cycle(
        &self,
        agent: String,
        cycle_number: u64,
        tx: mpsc::Sender<(String, Result<CycleRecord, CycleError>)>,
        handles: &mut HashMap<String, JoinHandle<()>>,
    ) {
        let mission = Arc::clone(&self.mission);
        let model = Arc::clone(&self.model);
        let phase_controller = Arc::clone(&self.phase_controller);
        let accountant = Arc::clone(&self.accountant);
        let settings = Arc::clone(&self.settings);
        let agent_for_task = agent.clone();

        let handle = tokio::spawn(async move {
            let role_prompt =
                std::fs::read_to_string(mission.role_prompt_path(&agent_for_task)).unwrap_or_default();

            let result = match GitTracker::new(&mission.root) {
                Ok(vcs) => {
                    let executor = CycleExecutor::new(
                        &mission,
                        model.as_ref(),
                        settings.history_tail_chars,
                        &phase_controller,
                        &accountant,
                        &vcs,
                        settings.editor_cmd.clone(),
                        settings.editor_package_dir.clone(),
                        settings.model.clone(),
                    );

                    tokio::time::timeout(
                        settings.stuck_cycle,
                        executor.run(&agent_for_task, &role_prompt, cycle_number, Utc::now()),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        Err(CycleError::Stuck {
                            agent: agent_for_task.clone(),
                            threshold_secs: settings.stuck_cycle.as_secs(),
                        })
                    })
                }
                Err(err) => Err(CycleError::VcsSnapshotFailed(err.to_string())),
            };

            let _ = tx.send((agent_for_task, result)).await;
        });

        handles.insert(agent, handle);
    }

    /// Run the pool until cancelled and drained, or until no agent remains
    /// available to draw. Returns every completed cycle's record.
    pub async fn run(&self, mut cycle_number: u64) -> Result<Vec<CycleRecord>, PoolError> {
        let (tx, mut rx) = mpsc::channel(self.settings.concurrency.max(1) * 2);
        let mut handles: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut records = Vec::new();

        let initial = self.settings.concurrency.min(self.team.agents.len().max(1));
        for _ in 0..initial {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            match self.try_draw() {
                Some(agent) => {
                    self.spawn_cycle(agent, cycle_number, tx.clone(), &mut handles);
                    cycle_number += 1;
                    tokio::time::sleep(self.settings.stagger_delay).await;
                }
                None => break,
            }
        }

        if handles.is_empty() {
            return Err(PoolError::NoAgentsAvailable);
        }

        loop {
            let (agent, result) = match rx.recv().await {
                Some(msg) => msg,
                None => break,
            };
            handles.remove(&agent);
            self.active.release(&agent);

            match result {
                Ok(record) => {
                    if record.partially_failed {
                        tracing::warn!(agent = %agent, "cycle partially failed");
                    }
                    records.push(record);
                }
                Err(err) => tracing::error!(agent = %agent, error = %err, "cycle failed"),
            }

            if self.cancelled.load(Ordering::SeqCst) {
                if handles.is_empty() {
                    break;
                }
                continue;
            }

            tokio::time::sleep(self.settings.replacement_delay).await;
            match self.try_draw() {
                Some(next_agent) => {
                    self.spawn_cycle(next_agent, cycle_number, tx.clone(), &mut handles);
                    cycle_number += 1;
                }
                None if handles.is_empty() => break,
                None => {}
            }
        }

        Ok(records)
    }
}
