//! # Cadence
//!
//! Command-line front end: single-shot queries or an interactive session.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use cadence_agents::{default_roster, ChatClient, ChatConfig, LlmPlanner, MIDI_PATH};
use cadence_engine::{EngineConfig, Orchestrator, RunRequest};
use cadence_planner::{Planner, StaticPlanner};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{build_trace_path, parse_inline, InlineCommand};

#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Plan-driven music assistant")]
struct Args {
    /// Run a single request and print the answer
    #[arg(short, long)]
    query: Option<String>,

    /// Start an interactive session
    #[arg(short, long)]
    interactive: bool,

    /// Write the run trace here (per turn in interactive mode)
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve a fixed JSON plan instead of asking the model
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.query.is_none() && !args.interactive {
        bail!("Provide --query or --interactive");
    }

    let mut orchestrator = build_orchestrator(&args)?;

    if let Some(query) = &args.query {
        let mut request = RunRequest::new(query.clone());
        if let Some(path) = &args.trace_file {
            request = request.trace_path(path.clone());
        }
        let outcome = orchestrator.handle_request(request).await?;
        match outcome.result.error() {
            None => println!("{}", outcome.result.content()),
            Some(error) => {
                eprintln!("Agent error: {error}");
                if !args.interactive {
                    std::process::exit(1);
                }
            }
        }
    }

    if args.interactive {
        interactive(&mut orchestrator, args.trace_file.as_deref()).await?;
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_orchestrator(args: &Args) -> anyhow::Result<Orchestrator> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let fallback = config.fallback_handler.clone();

    let chat_config = ChatConfig::from_env()?;
    info!(model = %chat_config.model, "using chat model");
    let model = Arc::new(ChatClient::new(chat_config));
    let roster = default_roster(model.clone());

    let planner: Arc<dyn Planner> = match &args.plan {
        Some(path) => Arc::new(load_plan(path)?),
        None => Arc::new(LlmPlanner::new(model, fallback).with_handlers(&roster)),
    };

    Ok(Orchestrator::new(config)
        .with_handlers(roster)
        .with_planner(planner))
}

fn load_plan(path: &Path) -> anyhow::Result<StaticPlanner> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read plan {}", path.display()))?;
    Ok(StaticPlanner::from_json_str(&source)?.with_name("plan-file"))
}

async fn interactive(orchestrator: &mut Orchestrator, trace_base: Option<&Path>) -> anyhow::Result<()> {
    println!("Interactive mode. Type 'exit' or 'quit' to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turn = 0;

    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        if line.starts_with(':') {
            apply_inline(orchestrator, line);
            continue;
        }

        turn += 1;
        let mut request = RunRequest::new(line);
        if let Some(base) = trace_base {
            request = request.trace_path(build_trace_path(base, turn));
        }
        let outcome = orchestrator.handle_request(request).await?;
        let finished = orchestrator.take_ledger();
        debug!(root = %outcome.root_id, units = finished.len(), "turn finished");
        match outcome.result.error() {
            None => println!("cadence> {}", outcome.result.content()),
            Some(error) => println!("Agent error: {error}"),
        }
    }
    Ok(())
}

fn apply_inline(orchestrator: &mut Orchestrator, line: &str) {
    match parse_inline(line) {
        InlineCommand::Attach { key, value } => {
            if key == MIDI_PATH && !Path::new(&value).exists() {
                println!("File not found: {value}");
                return;
            }
            orchestrator
                .context_mut()
                .set_attachment(key, serde_json::Value::String(value.clone()));
            println!("Attached {key} = {value}");
        }
        InlineCommand::Unknown => println!("Unknown command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_plan_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"[{"id": "step-1", "handler": "writer", "goal": "draft"}]"#).unwrap();

        let planner = load_plan(&path).unwrap();
        assert_eq!(planner.name(), "plan-file");
        assert!(load_plan(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["cadence", "--query", "hi", "--trace-file", "t.json", "-v"]);
        assert_eq!(args.query.as_deref(), Some("hi"));
        assert_eq!(args.trace_file, Some(PathBuf::from("t.json")));
        assert!(args.verbose);
        assert!(!args.interactive);
    }
}
