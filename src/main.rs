mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sleuth_agent::{
    fallback_plan, registry_from_config, write_artifacts, Plan, ResearchIntent, RunLogger,
    Scheduler,
};
use sleuth_core::config::AppConfig;
use sleuth_core::event::EventBus;

#[derive(Parser)]
#[command(name = "sleuth", version, about = "Dependency-ordered research execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sleuth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a research plan
    Run {
        /// Plan JSON file (planner output; fences and prose are tolerated)
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Research goal. Without --plan, a fallback plan is derived from it
        #[arg(long)]
        goal: Option<String>,
        /// Comma-separated tech keywords for the fallback plan
        #[arg(long, default_value = "")]
        keywords: String,
        /// Print the final execution state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the fallback plan for a goal
    Plan {
        #[arg(long)]
        goal: String,
        /// Comma-separated tech keywords
        #[arg(long, default_value = "")]
        keywords: String,
    },
    /// Check a plan file without running it
    Validate {
        #[arg(long)]
        plan: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Run configuration health checks
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sleuth=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle commands that need no config
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "sleuth", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Plan { goal, keywords } => {
            let intent = ResearchIntent::from_goal(goal, &sleuth_agent::plan::split_keywords(keywords));
            println!("{}", serde_json::to_string_pretty(&fallback_plan(&intent))?);
            return Ok(());
        }
        Commands::Validate { plan } => {
            return validate(plan);
        }
        _ => {}
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {
            println!("Sleuth Doctor");
            println!("=============");
            doctor::run_doctor(&config);
        }
        Commands::Run {
            plan,
            goal,
            keywords,
            json,
        } => {
            let plan = match (&plan, &goal) {
                (Some(path), _) => read_plan(path)?,
                (None, Some(goal)) => {
                    let keywords = sleuth_agent::plan::split_keywords(&keywords);
                    fallback_plan(&ResearchIntent::from_goal(goal, &keywords))
                }
                (None, None) => bail!("run needs --plan <file> or --goal <text>"),
            };
            let goal = goal.unwrap_or_else(|| plan.research_goal.clone());
            run_plan(&config, plan, &goal, json).await?;
        }
        Commands::Plan { .. } | Commands::Validate { .. } | Commands::Completions { .. } => {
            unreachable!("handled before config load")
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let config = AppConfig::from_env();
    if config.model.is_none() {
        eprintln!("Warning: No config file and no GEMINI_API_KEY / OPENAI_API_KEY set.");
        eprintln!("Collectors and the synthesizer will run in fallback mode.");
    }
    Ok(config)
}

fn read_plan(path: &Path) -> anyhow::Result<Plan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    Ok(Plan::parse_lenient(&text)?)
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let plan = read_plan(path)?;
    let graph = plan.graph()?;
    println!("{} tasks", graph.len());

    let dangling = graph.dangling_dependencies();
    if dangling.is_empty() {
        println!("All dependencies resolve");
    } else {
        for (task, missing) in &dangling {
            println!("  task {} depends on unknown task {} (never runnable)", task, missing);
        }
    }

    println!("{} runnable at start", graph.runnable(&Default::default()).len());
    Ok(())
}

async fn run_plan(config: &AppConfig, plan: Plan, goal: &str, json: bool) -> anyhow::Result<()> {
    let graph = plan.graph()?;
    let llm = sleuth_llm::client_from_config(config);
    if llm.is_none() {
        warn!("No model configured, running in fallback mode");
    }

    let event_bus = Arc::new(EventBus::default());
    let registry = registry_from_config(config, llm);
    let scheduler = Scheduler::new(graph, registry)
        .with_max_steps(config.engine.max_steps)
        .with_event_bus(event_bus.clone());

    let cancel = CancellationToken::new();
    let logger = config.log_dir().map(|dir| {
        RunLogger::new(dir).spawn(&event_bus, scheduler.run_id().clone(), cancel.clone())
    });

    info!(run_id = %scheduler.run_id(), tasks = scheduler.graph().len(), "Starting run");
    let result = scheduler.run(goal).await;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            cancel.cancel();
            return Err(e.into());
        }
    };

    if let Some(handle) = logger {
        match handle.await {
            Ok(Some(path)) => info!(path = %path.display(), "Run log written"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "RunLogger task failed"),
        }
    }

    let paths = write_artifacts(&config.output_dir(), &result).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.state)?);
    } else {
        println!("{}", result.report.headline());
        for record in &result.report.records {
            let status = if record.succeeded { "ok" } else { "failed" };
            println!(
                "  [{}] task {} -> {} ({}, {}ms)",
                record.step, record.task_id, record.capability, status, record.elapsed_ms
            );
        }
        if !result.report.unreached.is_empty() {
            let ids: Vec<String> = result.report.unreached.iter().map(|id| id.to_string()).collect();
            println!("  unreached: {}", ids.join(", "));
        }
        println!("Artifacts: {}", paths.dir.display());
    }
    Ok(())
}
