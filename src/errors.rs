//! Typed error hierarchy for the orchestrator.
//!
//! Three top-level enums cover the three recovery boundaries named in the error
//! taxonomy: `ConfigError` is fatal at startup, `CycleError` is scoped to one
//! cycle, `PoolError` covers failures of the pool machinery itself.

use thiserror::Error;

/// Configuration-taxonomy failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mission description file not found at {path}")]
    MissionNotFound { path: std::path::PathBuf },

    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown team '{0}'")]
    UnknownTeam(String),

    #[error("missing required environment variable '{0}'")]
    MissingCredential(String),

    #[error("no role-prompt files found for team '{team}' and --generate was not requested")]
    NoRolePrompts { team: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures scoped to a single agent cycle. Never escapes the owning cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("planner failed for agent {agent}: {message}")]
    PlanFailed { agent: String, message: String },

    #[error("mission description unreadable: {0}")]
    MissionUnreadable(String),

    #[error("editor subprocess failed to spawn: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("editor subprocess exited non-zero ({exit_code}) in phase '{phase}'")]
    EditorPhaseFailed { phase: String, exit_code: i32 },

    #[error("version-control snapshot failed: {0}")]
    VcsSnapshotFailed(String),

    #[error("version-control push failed (non-fatal): {0}")]
    VcsPushFailed(String),

    #[error("filesystem error on {path}: {source}")]
    Filesystem {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cycle for agent {agent} exceeded stuck-cycle threshold of {threshold_secs}s")]
    Stuck { agent: String, threshold_secs: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of the runner pool machinery itself (not of an individual cycle).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no agents available to draw from")]
    NoAgentsAvailable,

    #[error("cancellation requested while waiting for a worker slot")]
    CancelledWhileWaiting,

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
