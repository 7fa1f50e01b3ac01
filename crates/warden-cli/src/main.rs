//! Warden CLI - autonomous agent controller.
//!
//! Single binary that provides:
//! - `warden run` - drive the controller against a scripted scenario
//! - `warden rules` - print the decision rule catalog
//! - `warden check-config` - validate `.warden/config.yaml`
//! - `warden init` - write a default config

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_core::{AgentMode, DecisionEngine};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use warden_core::{Controller, Scenario, ScriptedWorld, WardenConfig};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Autonomous agent controller", version)]
struct Cli {
    /// Project root directory
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against a scenario file
    Run {
        /// Scenario YAML describing the scripted world
        #[arg(long)]
        scenario: PathBuf,

        /// Stop after this many ticks; runs until Ctrl-C otherwise
        #[arg(long)]
        ticks: Option<u64>,

        /// Starting mode (basic, advanced, afk)
        #[arg(long)]
        mode: Option<String>,

        /// Decision RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override both tick periods
        #[arg(long)]
        period_ms: Option<u64>,

        /// Print one JSON line per tick
        #[arg(long)]
        json: bool,
    },

    /// List decision rules in evaluation order
    Rules,

    /// Validate the project config
    CheckConfig,

    /// Write a default config into the project
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let project_root = match cli.project {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            mode,
            seed,
            period_ms,
            json,
        } => {
            let options = RunOptions {
                scenario,
                ticks,
                mode,
                seed,
                period_ms,
                json,
            };
            run_agent(&project_root, options).await
        }
        Commands::Rules => list_rules(&project_root),
        Commands::CheckConfig => check_config(&project_root),
        Commands::Init => init_project(&project_root),
    }
}

struct RunOptions {
    scenario: PathBuf,
    ticks: Option<u64>,
    mode: Option<String>,
    seed: Option<u64>,
    period_ms: Option<u64>,
    json: bool,
}

async fn run_agent(project_root: &Path, options: RunOptions) -> Result<()> {
    let mut config = WardenConfig::load_from_project(project_root)?;
    if let Some(seed) = options.seed {
        config.decision.seed = seed;
    }
    if let Some(period) = options.period_ms {
        config.ticks.normal_period_ms = period;
        config.ticks.alert_period_ms = period;
    }
    config.validate()?;

    let scenario = Scenario::load(&options.scenario)?;
    let mode = match options.mode.as_deref() {
        Some(raw) => Some(raw.parse::<AgentMode>().map_err(|e| anyhow!(e))?),
        None => scenario.mode,
    };

    tracing::info!(scenario = %scenario.name, seed = config.decision.seed, "Starting agent");

    let world = Arc::new(ScriptedWorld::from_scenario(&scenario));
    let mut controller = Controller::new(config, world.clone());
    let handle = controller.handle();

    if let Some(mode) = mode {
        handle.set_mode(mode);
    }
    if let Some(goal) = scenario.goal.clone() {
        handle.set_goal(goal);
    }
    for task in &scenario.tasks {
        let id = handle.submit(task.kind, task.params.clone(), task.priority)?;
        tracing::info!(task_id = %id, kind = %task.kind, "Scenario task submitted");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        }
    });

    match options.ticks {
        Some(ticks) => {
            for _ in 0..ticks {
                let report = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    report = controller.tick() => report,
                };
                if options.json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    println!(
                        "tick {:>4}  {:<14} {:<10} threats={} hazards={}",
                        report.decision.tick,
                        report.decision.action.name(),
                        report.decision.rule.as_deref().unwrap_or("-"),
                        report.threats,
                        report.hazards,
                    );
                }

                let period = controller.period();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
            controller.shutdown().await;
        }
        None => controller.run(shutdown).await,
    }

    println!("{}", serde_json::to_string_pretty(&handle.status())?);
    println!("world calls: {}", world.calls().len());
    Ok(())
}

fn list_rules(project_root: &Path) -> Result<()> {
    let config = WardenConfig::load_from_project(project_root)?;
    let engine = DecisionEngine::new(config.decision);

    println!("{:>4}  {:<9} {:<16} ACTION", "PRIO", "GROUP", "RULE");
    for rule in engine.rules() {
        println!(
            "{:>4}  {:<9} {:<16} {}",
            rule.priority,
            format!("{:?}", rule.group),
            rule.name,
            rule.action
        );
    }
    Ok(())
}

fn check_config(project_root: &Path) -> Result<()> {
    let config = WardenConfig::load_from_project(project_root)?;
    println!("Config OK");
    println!(
        "  ticks: {} ms normal, {} ms alert",
        config.ticks.normal_period_ms, config.ticks.alert_period_ms
    );
    println!(
        "  scheduler: max queue {}, history {}",
        config.scheduler.max_queue, config.scheduler.history_capacity
    );
    println!(
        "  overrides: preempt {}, grace {} ms",
        config.overrides.preempt_running_task, config.overrides.preempt_grace_ms
    );
    Ok(())
}

fn init_project(project_root: &Path) -> Result<()> {
    let warden_dir = project_root.join(".warden");
    std::fs::create_dir_all(&warden_dir)?;

    let config_path = warden_dir.join("config.yaml");
    if config_path.exists() {
        println!("{} already exists", config_path.display());
        return Ok(());
    }
    let rendered = serde_yaml::to_string(&WardenConfig::default())?;
    std::fs::write(&config_path, format!("# Warden agent configuration\n\n{rendered}"))?;

    println!("Initialized warden project at {}", project_root.display());
    println!();
    println!("Created:");
    println!("  .warden/config.yaml - controller configuration");
    println!();
    println!("Next steps:");
    println!("  1. Write a scenario file");
    println!("  2. Run: warden run --scenario scenario.yaml --ticks 20");

    Ok(())
}
