//! Project-phase state machine: EXPANSION (create content) versus
//! CONVERGENCE (consolidate/optimize), driven by aggregate token usage with
//! hysteresis between the expansion and convergence ratios.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectPhase {
    Expansion,
    Convergence,
}

impl ProjectPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectPhase::Expansion => "EXPANSION",
            ProjectPhase::Convergence => "CONVERGENCE",
        }
    }
}

/// Thresholds governing phase transitions. `expansion_ratio` must be less
/// than `convergence_ratio` to provide hysteresis.
#[derive(Debug, Clone, Copy)]
pub struct PhaseThresholds {
    pub model_token_limit: u64,
    pub convergence_ratio: f64,
    pub expansion_ratio: f64,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            model_token_limit: 128_000,
            convergence_ratio: 0.60,
            expansion_ratio: 0.50,
        }
    }
}

impl PhaseThresholds {
    fn convergence_tokens(&self) -> u64 {
        (self.model_token_limit as f64 * self.convergence_ratio) as u64
    }

    fn expansion_tokens(&self) -> u64 {
        (self.model_token_limit as f64 * self.expansion_ratio) as u64
    }
}

#[derive(Debug, Clone)]
pub struct PhaseStatus {
    pub phase: ProjectPhase,
    pub total_tokens: u64,
    pub usage_percent: f64,
    pub headroom_tokens: i64,
    pub last_transition: DateTime<Utc>,
    pub status_icon: &'static str,
    pub status_message: &'static str,
}

struct PhaseState {
    phase: ProjectPhase,
    total_tokens: u64,
    last_transition: DateTime<Utc>,
}

/// Process-wide phase state, guarded by a single mutex. `Evaluate` is the
/// sole mutator.
pub struct PhaseController {
    thresholds: PhaseThresholds,
    state: Mutex<PhaseState>,
}

impl PhaseController {
    pub fn new(thresholds: PhaseThresholds, now: DateTime<Utc>) -> Self {
        Self {
            thresholds,
            state: Mutex::new(PhaseState {
                phase: ProjectPhase::Expansion,
                total_tokens: 0,
                last_transition: now,
            }),
        }
    }

    /// Evaluate the new total token count against the current phase, logging
    /// a transition at info level if one occurs. Pure with respect to its
    /// input and the previous state.
    pub fn evaluate(&self, total_tokens: u64, now: DateTime<Utc>) -> (ProjectPhase, String) {
        let mut state = self.state.lock().expect("phase state mutex poisoned");
        state.total_tokens = total_tokens;
        let old_phase = state.phase;
        let usage_percent = self.usage_percent(total_tokens);

        let (new_phase, message) = if total_tokens > self.thresholds.convergence_tokens() {
            (
                ProjectPhase::Convergence,
                format!("Convergence needed - Token usage at {usage_percent:.1}%"),
            )
        } else if total_tokens < self.thresholds.expansion_tokens() {
            (
                ProjectPhase::Expansion,
                format!("Expansion phase - Token usage at {usage_percent:.1}%"),
            )
        } else {
            (
                old_phase,
                format!("Maintaining current phase - Token usage at {usage_percent:.1}%"),
            )
        };

        if new_phase != old_phase {
            state.phase = new_phase;
            state.last_transition = now;
            tracing::info!(
                from = old_phase.as_str(),
                to = new_phase.as_str(),
                total_tokens,
                usage_percent,
                reason = %message,
                "phase transition"
            );
        }

        (new_phase, message)
    }

    fn usage_percent(&self, total_tokens: u64) -> f64 {
        (total_tokens as f64 / self.thresholds.model_token_limit as f64) * 100.0
    }

    pub fn status(&self) -> PhaseStatus {
        let state = self.state.lock().expect("phase state mutex poisoned");
        let usage_percent = self.usage_percent(state.total_tokens);

        let status_icon = ui::usage_status_icon(usage_percent);
        let status_message = match status_icon {
            "✓" => "Below convergence threshold",
            "⚠️" => "Approaching convergence threshold",
            _ => "Convergence needed",
        };

        let headroom_tokens = match state.phase {
            ProjectPhase::Expansion => {
                self.thresholds.convergence_tokens() as i64 - state.total_tokens as i64
            }
            ProjectPhase::Convergence => {
                self.thresholds.expansion_tokens() as i64 - state.total_tokens as i64
            }
        };

        PhaseStatus {
            phase: state.phase,
            total_tokens: state.total_tokens,
            usage_percent,
            headroom_tokens,
            last_transition: state.last_transition,
            status_icon,
            status_message,
        }
    }

    /// Bypass the thresholds and set the phase directly. Logged at warning
    /// level; intended for debugging only.
    pub fn force_phase(&self, phase: ProjectPhase, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("phase state mutex poisoned");
        if state.phase != phase {
            state.phase = phase;
            state.last_transition = now;
            tracing::warn!(phase = phase.as_str(), "phase manually forced");
        }
    }

    pub fn thresholds(&self) -> PhaseThresholds {
        self.thresholds
    }

    /// Short narrative paragraph for `map.md`, per phase.
    pub fn narrative(&self, phase: ProjectPhase) -> String {
        let t = self.thresholds;
        match phase {
            ProjectPhase::Expansion => format!(
                "🌱 EXPANSION PHASE\n\
                 In this phase, agents focus on content creation and development:\n\
                 - Free to create new content and sections\n\
                 - Normal operation of all agents\n\
                 - Regular token monitoring\n\
                 - Will transition to CONVERGENCE at {:.1}k tokens",
                t.convergence_tokens() as f64 / 1000.0
            ),
            ProjectPhase::Convergence => format!(
                "🔄 CONVERGENCE PHASE\n\
                 In this phase, agents focus on optimization and consolidation:\n\
                 - Limited new content creation\n\
                 - Focus on reducing token usage\n\
                 - Emphasis on content optimization\n\
                 - Can return to EXPANSION below {:.1}k tokens",
                t.expansion_tokens() as f64 / 1000.0
            ),
        }
    }
}
