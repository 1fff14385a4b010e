mod model;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use atelier_config::{find_config_path, load_config, resolve_path, save_config, Config};
use atelier_core::agent::AgentProfile;
use atelier_core::runs::{self, RunOptions, RunStatus};
use atelier_core::storage::{
    Database, PoolOptions, Role, SessionFilter, SessionStatus, SessionStore,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::model::{create_model_for, tool_definitions, RigModel};

#[derive(Parser)]
#[command(name = "atelier", about = "Agent runs with persistent sessions", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config (if missing) and initialize the database schema
    Init,
    /// Submit a request to an agent and wait for the run to finish
    Run {
        /// Agent profile to run (builder, database)
        #[arg(short, long, default_value = "builder")]
        agent: String,
        /// User identifier recorded on the session
        #[arg(short, long)]
        user: Option<String>,
        /// The request to submit
        message: String,
    },
    /// Inspect stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionCommands,
    },
    /// List artifacts saved for a session
    Artifacts {
        /// Session ID
        session_id: String,
        /// Print full artifact contents instead of a summary
        #[arg(long)]
        dump: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List sessions, newest first
    List {
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long)]
        agent: Option<String>,
        /// Filter by status (active, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one session with its message history
    Show {
        /// Session ID
        session_id: String,
    },
    /// Delete a session and everything it owns
    Delete {
        /// Session ID
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let base_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = format!("{base_filter},atelier_core=debug");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(find_config_path);
    let config = load_config(&config_path)?;

    if let Commands::Init = cli.command {
        if !config_path.exists() {
            save_config(&config_path, &config)?;
            println!("Wrote default config to {}", config_path.display());
        }
    }

    let db = Arc::new(open_database(&config)?);
    db.initialize().context("schema initialization failed")?;
    let store = SessionStore::new(db.clone());

    let result = dispatch(cli.command, &config, &store).await;
    db.shutdown();
    result
}

fn open_database(config: &Config) -> Result<Database> {
    let path = resolve_path(&config.storage.path);
    let options = PoolOptions {
        min_idle: config.storage.pool_min_idle,
        max_size: config.storage.pool_max_size,
        acquire_timeout: Duration::from_secs(config.storage.acquire_timeout_secs),
    };
    Ok(Database::open(&path, options)?)
}

async fn dispatch(command: Commands, config: &Config, store: &SessionStore) -> Result<()> {
    match command {
        Commands::Init => {
            println!("Database ready.");
            Ok(())
        }
        Commands::Run {
            agent,
            user,
            message,
        } => run_agent(config, store, &agent, user.as_deref(), &message).await,
        Commands::Sessions { action } => match action {
            SessionCommands::List {
                user,
                agent,
                status,
                limit,
            } => list_sessions(store, user, agent, status, limit),
            SessionCommands::Show { session_id } => show_session(store, &session_id),
            SessionCommands::Delete { session_id } => {
                if store.delete_session(&session_id)? {
                    println!("Deleted session {session_id}");
                } else {
                    println!("No session with id {session_id}");
                }
                Ok(())
            }
        },
        Commands::Artifacts { session_id, dump } => list_artifacts(store, &session_id, dump),
    }
}

async fn run_agent(
    config: &Config,
    store: &SessionStore,
    agent: &str,
    user: Option<&str>,
    message: &str,
) -> Result<()> {
    let profile = AgentProfile::by_name(agent).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown agent '{agent}'; available: {}",
            AgentProfile::available().join(", ")
        )
    })?;

    let tier = config.agents.models.get("default").ok_or_else(|| {
        anyhow::anyhow!(
            "no default model configured; set agents.models.default \
             (provider + model) in config.json"
        )
    })?;

    let defaults = &config.agents.defaults;
    tracing::info!(
        "running '{agent}' with {} ({})",
        tier.model,
        tier.provider
    );
    let handle = create_model_for(&tier.provider, &tier.model, config)?;
    let model = Arc::new(RigModel::new(
        handle,
        tool_definitions(&profile.tools),
        defaults.temperature as f64,
        defaults.max_tokens as u64,
    ));

    // Ctrl-C cancels between steps; the session is marked failed and no
    // partial message is left behind.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let options = RunOptions {
        max_iterations: defaults.max_iterations,
        step_timeout: Duration::from_secs(defaults.step_timeout_secs),
        cancel,
        ..Default::default()
    };

    let report = runs::submit(store, model, &profile, user, message, options).await?;

    match report.status {
        RunStatus::Success => {
            println!("{}", report.output.unwrap_or_default());
            let saved = harvest_artifacts(store, &report.session_id)?;
            if saved > 0 {
                println!("\n({saved} artifact(s) saved, see `atelier artifacts {}`)", report.session_id);
            }
            println!("session: {}", report.session_id);
            Ok(())
        }
        _ => anyhow::bail!(
            "run {} failed: {}",
            report.session_id,
            report.error.unwrap_or_else(|| "unknown error".into())
        ),
    }
}

/// Persist deliverable tool outputs as artifacts of the finished session.
fn harvest_artifacts(store: &SessionStore, session_id: &str) -> Result<usize> {
    let mut saved = 0;
    for msg in store.get_session_messages(session_id)? {
        if msg.role != Role::Tool {
            continue;
        }
        let tool = msg
            .metadata
            .as_ref()
            .and_then(|m| m.get("tool"))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        match tool.as_str() {
            "generate_component_code" => {
                let payload: serde_json::Value =
                    serde_json::from_str(&msg.content).unwrap_or_default();
                let name = payload
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("component.tsx");
                let code = payload.get("code").and_then(|c| c.as_str()).unwrap_or("");
                if !code.is_empty() {
                    store.save_artifact(session_id, "code", name, code, None)?;
                    saved += 1;
                }
            }
            "design_database_schema" => {
                store.save_artifact(session_id, "schema", "schema.json", &msg.content, None)?;
                saved += 1;
            }
            _ => {}
        }
    }
    Ok(saved)
}

fn list_sessions(
    store: &SessionStore,
    user: Option<String>,
    agent: Option<String>,
    status: Option<String>,
    limit: usize,
) -> Result<()> {
    let status = match status.as_deref() {
        Some(s) => Some(
            SessionStatus::from_str(s)
                .ok_or_else(|| anyhow::anyhow!("unknown status '{s}' (active, completed, failed)"))?,
        ),
        None => None,
    };

    let sessions = store.list_sessions(SessionFilter {
        user_id: user,
        agent_type: agent,
        status,
        limit,
    })?;

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    for s in sessions {
        println!(
            "{}  {:<9}  {:<10}  {}  {}",
            s.id,
            s.status.as_str(),
            s.agent_type,
            s.user_id.as_deref().unwrap_or("-"),
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

fn show_session(store: &SessionStore, session_id: &str) -> Result<()> {
    let Some(session) = store.get_session(session_id)? else {
        anyhow::bail!("no session with id {session_id}");
    };

    println!("session:  {}", session.id);
    println!("agent:    {}", session.agent_type);
    println!("status:   {}", session.status.as_str());
    if let Some(user) = &session.user_id {
        println!("user:     {user}");
    }
    println!("created:  {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(output) = &session.output {
        println!("output:   {output}");
    }
    if let Some(metadata) = &session.metadata {
        println!("metadata: {metadata}");
    }

    let messages = store.get_session_messages(session_id)?;
    println!("\n{} message(s):", messages.len());
    for msg in messages {
        let preview: String = msg.content.chars().take(120).collect();
        let calls = match &msg.tool_calls {
            Some(calls) => format!(
                "  [calls: {}]",
                calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
            ),
            None => String::new(),
        };
        println!("  [{:<9}] {preview}{calls}", msg.role.as_str());
    }
    Ok(())
}

fn list_artifacts(store: &SessionStore, session_id: &str, dump: bool) -> Result<()> {
    let artifacts = store.get_session_artifacts(session_id)?;
    if artifacts.is_empty() {
        println!("No artifacts for session {session_id}.");
        return Ok(());
    }

    for artifact in artifacts {
        println!(
            "{}  {:<8}  {}  ({} bytes)",
            artifact.id,
            artifact.kind,
            artifact.name,
            artifact.content.len()
        );
        if dump {
            println!("{}\n", artifact.content);
        }
    }
    Ok(())
}
