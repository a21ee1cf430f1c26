//! CLI entry point. The only user-facing surface: `run <team>` starts the
//! Runner Pool, `commits generate` prints a commit digest. Exit codes: 0
//! clean shutdown, 1 startup failure, 2 unexpected panic escaping the pool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conductor::agent;
use conductor::config::{CliOverrides, Config};
use conductor::errors::ConfigError;
use conductor::llm::{HttpLanguageModel, LanguageModel};
use conductor::mission::Mission;
use conductor::phase::PhaseController;
use conductor::pool::{PoolSettings, RunnerPool};
use conductor::tokens::TokenAccountant;
use conductor::ui;
use conductor::vcs::GitTracker;

const DEFAULT_LLM_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Autonomous multi-agent orchestrator for long-running coding assistants")]
struct Cli {
    /// Raise log verbosity.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the default configuration file location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Runner Pool for a named team.
    Run {
        team: String,
        /// Force regeneration of all role-prompt files before starting.
        #[arg(long)]
        generate: bool,
        /// Override the default mission-description path.
        #[arg(long)]
        mission: Option<PathBuf>,
        /// Override the default model name passed to the editor subprocess.
        #[arg(long)]
        model: Option<String>,
        /// Override the configured concurrency bound for this invocation.
        #[arg(long)]
        agents: Option<usize>,
    },
    /// Utility commands around version-control history.
    Commits {
        #[command(subcommand)]
        command: CommitsCommands,
    },
}

#[derive(Subcommand)]
enum CommitsCommands {
    /// Print a commit-message digest from recent version-control history.
    Generate,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unexpected panic in runner pool")]
    Panic,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "conductor=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{}failed to read current directory: {err}", ui::CROSS);
            return ExitCode::from(1);
        }
    };

    let result = match &cli.command {
        Commands::Run {
            team,
            generate,
            mission,
            model,
            agents,
        } => run_team(&project_dir, &cli, team, *generate, mission.clone(), model.clone(), *agents).await,
        Commands::Commits { command } => match command {
            CommitsCommands::Generate => commits_generate(&project_dir),
        },
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(StartupError::Panic) => {
            eprintln!("{}unexpected panic escaped the runner pool", ui::CROSS);
            tracing::error!("unexpected panic escaped the runner pool");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("{}{err}", ui::CROSS);
            tracing::error!(error = %err, "startup failed");
            ExitCode::from(1)
        }
    }
}

async fn run_team(
    project_dir: &Path,
    cli: &Cli,
    team_name: &str,
    generate: bool,
    mission_override: Option<PathBuf>,
    model_override: Option<String>,
    agents_override: Option<usize>,
) -> Result<(), StartupError> {
    let overrides = CliOverrides {
        mission_path: mission_override,
        model: model_override,
        concurrency: agents_override,
        generate,
        config_path: cli.config.clone(),
    };

    let config = Config::load(project_dir, overrides)?;
    let team = config.team(team_name)?.clone();
    let mission = Mission::bind(&config.project_dir, &config.mission_path)?;

    let missing = agent::missing_roles(&mission, config.generate);
    if !missing.is_empty() && !config.generate {
        return Err(ConfigError::NoRolePrompts {
            team: team_name.to_string(),
        }
        .into());
    }

    let vcs = GitTracker::new(&config.project_dir).map_err(StartupError::Other)?;
    vcs.configure_encoding().ok();

    if !missing.is_empty() {
        tracing::info!(team = team_name, count = missing.len(), "generating role-prompt files");
        let bootstrap_accountant =
            TokenAccountant::new(config.token_thresholds()).map_err(StartupError::Other)?;
        let bootstrap_model = HttpLanguageModel::new(
            DEFAULT_LLM_ENDPOINT,
            config.llm_api_key.clone(),
            config.model.clone(),
            bootstrap_accountant,
        );
        RunnerPool::bootstrap(&mission, &bootstrap_model, &team, config.generate)
            .await
            .map_err(StartupError::Other)?;
    }

    let accountant = TokenAccountant::new(config.token_thresholds()).map_err(StartupError::Other)?;
    let model: Arc<dyn LanguageModel> = Arc::new(HttpLanguageModel::new(
        DEFAULT_LLM_ENDPOINT,
        config.llm_api_key.clone(),
        config.model.clone(),
        TokenAccountant::new(config.token_thresholds()).map_err(StartupError::Other)?,
    ));
    let phase_controller = Arc::new(PhaseController::new(config.phase_thresholds(), chrono::Utc::now()));
    let mission = Arc::new(mission);
    let settings = PoolSettings::from_config(&config);

    let pool = Arc::new(RunnerPool::new(
        mission,
        model,
        phase_controller,
        Arc::new(accountant),
        team,
        settings,
    ));

    let pool_for_signal = Arc::clone(&pool);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancellation requested, draining in-flight cycles");
            pool_for_signal.cancel();
        }
    });

    let pool_for_run = Arc::clone(&pool);
    let handle = tokio::spawn(async move { pool_for_run.run(1).await });

    match handle.await {
        Ok(Ok(records)) => {
            println!("{}pool drained cleanly ({} cycles)", ui::CHECK, records.len());
            tracing::info!(cycles = records.len(), "pool drained cleanly");
            Ok(())
        }
        Ok(Err(err)) => Err(StartupError::Other(err.into())),
        Err(join_err) if join_err.is_panic() => Err(StartupError::Panic),
        Err(join_err) => Err(StartupError::Other(anyhow::anyhow!(join_err.to_string()))),
    }
}

fn commits_generate(project_dir: &Path) -> Result<(), StartupError> {
    let vcs = GitTracker::new(project_dir).map_err(StartupError::Other)?;
    let (hash, message) = vcs.latest_commit_summary().map_err(StartupError::Other)?;
    let emoji = conductor::ui::commit_type_emoji(&message);
    println!("{emoji} {:.7} {message}", hash);
    Ok(())
}
