//! Switchboard - replay and inspect realtime agent orchestration sessions
//!
//! Drives the orchestration engine from a JSONL file of channel envelopes,
//! printing outbound commands as they are issued and the final transcript.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use switchboard_core::backend::{ResponsesClassifier, ResponsesClient, ResponsesSupervisor};
use switchboard_core::channel::EnvCredentials;
use switchboard_core::escalation::EscalationCoordinator;
use switchboard_core::session::{DispatchOutcome, Effect, SessionSnapshot};
use switchboard_core::{
    Config, EventDispatcher, GuardrailPipeline, ItemKind, OutboundCommand, Scenario, SessionBuilder,
    TranscriptItem,
};

/// Switchboard - realtime agent orchestration
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Replay and inspect realtime agent orchestration sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List built-in scenarios and their handoff graphs
    Scenarios,

    /// Replay a JSONL file of channel envelopes through a session
    Replay {
        /// Envelope file, one JSON object per line
        #[arg(short, long)]
        events: PathBuf,

        /// Scenario to run (overrides the config file)
        #[arg(short, long)]
        scenario: Option<String>,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Scenarios => list_scenarios(),
        Commands::Replay {
            events,
            scenario,
            json,
        } => {
            let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
            if let Some(scenario) = scenario {
                config.scenario = scenario;
            }
            let lines = read_events(&events)?;
            let replay = replay(&config, lines).await?;
            let dropped = replay
                .outcomes
                .iter()
                .filter(|o| matches!(o.effect, Effect::Dropped(_)))
                .count();
            println!(
                "{} envelopes ({} dropped), {} outbound commands",
                replay.outcomes.len(),
                dropped,
                replay.commands.len()
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&replay.snapshot)?);
            } else {
                print_transcript(&replay.snapshot);
            }
            Ok(())
        }
    }
}

fn list_scenarios() -> Result<()> {
    for scenario in Scenario::ALL {
        let registry = scenario
            .registry()
            .with_context(|| format!("Scenario {} is misconfigured", scenario))?;
        let root = registry.default_agent();
        println!("{} - {}", scenario, scenario.description());
        for agent in registry.agents() {
            let marker = if agent.name == root.name { "*" } else { " " };
            let escalated = if agent.is_escalated() { " (escalated)" } else { "" };
            let targets: Vec<&str> = agent.handoffs.iter().map(String::as_str).collect();
            if targets.is_empty() {
                println!("  {} {}{}", marker, agent.name, escalated);
            } else {
                println!("  {} {}{} -> {}", marker, agent.name, escalated, targets.join(", "));
            }
        }
        println!();
    }
    Ok(())
}

/// Envelope lines, skipping blanks and `#` comments
fn read_events(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events from {}", path.display()))?;
    Ok(parse_event_lines(&contents))
}

fn parse_event_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Session builder for `config`, wiring HTTP collaborators when an API key
/// is available
fn session_builder(config: &Config) -> Result<SessionBuilder> {
    let scenario = config.scenario()?;
    let registry = Arc::new(
        scenario
            .build_registry(config.default_agent.as_deref())
            .with_context(|| format!("Failed to build agents for {}", scenario))?,
    );

    let mut builder = SessionBuilder::new(Arc::clone(&registry))
        .with_tools(scenario.tools())
        .with_tool_timeout(config.timeouts.tool());

    let Some(client) = ResponsesClient::from_config(&config.backend).map(Arc::new) else {
        tracing::warn!(
            key_env = %config.backend.api_key_env,
            "No API key; running without guardrail or supervisor"
        );
        return Ok(builder);
    };

    let classifier = ResponsesClassifier::new(Arc::clone(&client), &config.backend.classifier_model)
        .with_company_name(&config.guardrail.company_name);
    builder = builder.with_guardrail(
        GuardrailPipeline::new(Arc::new(classifier))
            .with_timeout(config.timeouts.classification())
            .with_context_window(config.guardrail.context_window),
    );

    if scenario.needs_supervisor() {
        let supervisor = ResponsesSupervisor::new(client, &config.backend.supervisor_model);
        builder = builder.with_escalation(
            EscalationCoordinator::new(Arc::new(supervisor), registry)
                .with_deadline(config.timeouts.escalation())
                .with_max_rounds(config.escalation.max_rounds)
                .with_apology(&config.escalation.apology),
        );
    }
    Ok(builder)
}

struct Replay {
    outcomes: Vec<DispatchOutcome>,
    commands: Vec<OutboundCommand>,
    snapshot: SessionSnapshot,
}

async fn replay(config: &Config, lines: Vec<String>) -> Result<Replay> {
    let builder = session_builder(config)?;
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let session = builder.with_id("replay").build(outbound_tx);

    if std::env::var_os(&config.credentials.token_env).is_some() {
        session
            .connect(&EnvCredentials::new(&config.credentials.token_env))
            .await
            .context("Session credentials rejected")?;
    }

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
    let dispatcher = EventDispatcher::new(Arc::clone(&session)).with_observer(observer_tx);
    let driver = tokio::spawn(dispatcher.run(inbound_rx));

    let mut replay = Replay {
        outcomes: Vec::with_capacity(lines.len()),
        commands: Vec::new(),
        snapshot: session.snapshot().await,
    };

    for line in lines {
        inbound_tx
            .send(line)
            .context("Dispatcher stopped before the replay finished")?;
        let outcome = observer_rx
            .recv()
            .await
            .context("Dispatcher stopped before the replay finished")?;
        println!("[{:>4}] {:?}", outcome.seq, outcome.effect);
        replay.outcomes.push(outcome);
        drain_commands(&mut outbound_rx, &mut replay.commands);
    }

    // Let spawned tools and classifications settle before the stream closes
    session.wait_idle().await;
    drain_commands(&mut outbound_rx, &mut replay.commands);
    replay.snapshot = session.snapshot().await;

    drop(inbound_tx);
    driver.await.context("Dispatcher task failed")?;
    Ok(replay)
}

fn drain_commands(rx: &mut mpsc::UnboundedReceiver<OutboundCommand>, into: &mut Vec<OutboundCommand>) {
    while let Ok(command) = rx.try_recv() {
        println!("  -> {}", command.to_json());
        into.push(command);
    }
}

fn print_transcript(snapshot: &SessionSnapshot) {
    println!();
    println!(
        "Session {} ({}), active agent: {}",
        snapshot.id,
        snapshot.status,
        snapshot.active_agent.as_deref().unwrap_or("none")
    );
    for item in &snapshot.items {
        println!("{}", render_item(item));
    }
}

fn render_item(item: &TranscriptItem) -> String {
    let done = if item.is_done() { " " } else { "…" };
    match item.kind {
        ItemKind::Breadcrumb => format!(
            "#{:<4}{} [{}]",
            item.created_seq,
            done,
            item.title().unwrap_or_default()
        ),
        kind => {
            let role = kind.role().unwrap_or("?");
            let verdict = match &item.guardrail {
                Some(g) => match g.category {
                    Some(category) => format!(" ({:?}: {})", g.status, category),
                    None => format!(" ({:?})", g.status),
                },
                None => String::new(),
            };
            format!(
                "#{:<4}{} {}: {}{}",
                item.created_seq,
                done,
                role,
                item.text().unwrap_or_default(),
                verdict
            )
        }
    }
}
