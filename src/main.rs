use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scenario_pilot::browser::{BrowserPool, McpBrowser};
use scenario_pilot::config;
use scenario_pilot::diagram;
use scenario_pilot::loader::scenario_name;
use scenario_pilot::oracle::{OpenAiOracle, OracleConfig, check_health};
use scenario_pilot::{
    BrowserId, ExecutionMode, MemoryStore, PlanStore, RunSummary, Runner, RunnerConfig, Session,
    cleanup_old_sessions, load_scenario,
};

/// Scenario Pilot - natural-language end-to-end browser tests
#[derive(Parser, Debug)]
#[command(
    name = "scenario-pilot",
    about = "Run natural-language browser scenarios, learning replayable plans as they pass",
    after_help = "ENVIRONMENT VARIABLES:\n\
        SCENARIO_PILOT_LLM_ENDPOINT   Chat completions endpoint URL\n\
        SCENARIO_PILOT_LLM_MODEL      Model name\n\
        SCENARIO_PILOT_LLM_API_KEY    Bearer credential (or OPENAI_API_KEY)\n\
        SCENARIO_PILOT_PLAN_DIR       Directory holding learned plans\n\
        SCENARIO_PILOT_MEMORY_FILE    Durable memory document\n\
        SCENARIO_PILOT_SESSION_DIR    Base directory for run reports\n\
        SCENARIO_PILOT_DEFAULT_URL    Starting URL\n\
        SCENARIO_PILOT_MCP_COMMAND    Command launching the browser automation server"
)]
struct Args {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario file
    Run {
        /// Scenario file to run
        scenario: PathBuf,

        /// Starting URL opened in every browser before the first step
        #[arg(short, long, env = "SCENARIO_PILOT_DEFAULT_URL")]
        url: Option<String>,

        /// Execution mode
        #[arg(short, long, value_enum, default_value_t = ExecutionMode::Replay)]
        mode: ExecutionMode,

        /// Extra attempts for a failing step
        #[arg(long)]
        max_retries: Option<u32>,

        /// Directory holding learned plans
        #[arg(long, env = "SCENARIO_PILOT_PLAN_DIR")]
        plan_dir: Option<PathBuf>,

        /// Durable memory document
        #[arg(long, env = "SCENARIO_PILOT_MEMORY_FILE")]
        memory_file: Option<PathBuf>,

        /// Connect a second browser even if no step is routed to it
        #[arg(long)]
        second_browser: bool,

        /// Clear persisted memory before the run
        #[arg(long)]
        fresh_session: bool,

        /// Print the step state machine and the parsed steps, then exit
        #[arg(long)]
        diagram: bool,

        /// Output the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Directory for the run report (default: auto-generated in session dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the run report after completion
        #[arg(long, short = 'k')]
        keep: bool,
    },

    /// Inspect or remove learned plans
    Plan {
        #[command(subcommand)]
        action: PlanCommand,

        #[arg(long, env = "SCENARIO_PILOT_PLAN_DIR", global = true)]
        plan_dir: Option<PathBuf>,
    },

    /// Inspect or clear the durable memory
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,

        #[arg(long, env = "SCENARIO_PILOT_MEMORY_FILE", global = true)]
        memory_file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    /// Print the learned plan of a scenario
    Show { scenario: String },
    /// Delete the learned plan of a scenario
    Delete { scenario: String },
    /// List scenarios with a learned plan
    List,
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Print every stored entry
    Show,
    /// Remove every stored entry
    Reset,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match dispatch(args.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            scenario,
            url,
            mode,
            max_retries,
            plan_dir,
            memory_file,
            second_browser,
            fresh_session,
            diagram,
            json,
            output,
            keep,
        } => {
            let name = scenario_name(&scenario);
            let steps = load_scenario(&scenario)?;

            if diagram {
                print!("{}", diagram::render(&name, &steps));
                return Ok(true);
            }

            let mut runner_config = RunnerConfig::default().mode(mode);
            if let Some(max_retries) = max_retries {
                runner_config = runner_config.max_retries(max_retries);
            }

            let oracle_config = OracleConfig::default();
            if !check_health(&oracle_config.endpoint, 5).await {
                tracing::warn!(endpoint = %oracle_config.endpoint, "oracle endpoint not responding");
            }
            let oracle = Arc::new(OpenAiOracle::new(oracle_config)?);

            let wants_secondary =
                second_browser || steps.iter().any(|step| step.browser == BrowserId::Secondary);
            let browsers = connect_browsers(wants_secondary).await?;

            let memory = MemoryStore::open(memory_file.unwrap_or_else(|| config::memory_file().into()));
            let plans = PlanStore::new(plan_dir.unwrap_or_else(|| config::plan_dir().into()));
            let mut runner = Runner::new(oracle, browsers, memory, runner_config).with_plan_store(plans);
            if fresh_session {
                runner.reset_memory()?;
            }

            let start_url = url.unwrap_or_else(|| config::get().runner.start_url.clone());
            let outcome = match runner.open(&start_url).await {
                Ok(()) => runner.run_scenario(&name, &steps).await,
                Err(e) => Err(e),
            };
            runner.close().await;
            let summary = outcome?;

            if output.is_none() {
                let max_age = Duration::from_secs(config::DEFAULT_SESSION_MAX_AGE_SECS);
                match cleanup_old_sessions(Path::new(&config::session_base_dir()), max_age) {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "removed old run sessions"),
                    Err(e) => tracing::warn!(error = %e, "could not clean up old run sessions"),
                }
            }

            let session = match &output {
                Some(dir) => Session::in_dir(dir),
                None => Session::for_scenario(&name).keep(keep),
            };
            session.init(&name)?;
            let report = session.write_report(&summary)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
                if session.keep {
                    println!("\nReport: {}", report.display());
                }
            }
            Ok(summary.success())
        }

        Commands::Plan { action, plan_dir } => {
            let store = PlanStore::new(plan_dir.unwrap_or_else(|| config::plan_dir().into()));
            match action {
                PlanCommand::Show { scenario } => {
                    let plan = store
                        .load(&scenario)?
                        .ok_or_else(|| anyhow!("no plan learned for '{}'", scenario))?;
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                }
                PlanCommand::Delete { scenario } => {
                    if store.delete(&scenario)? {
                        println!("Deleted plan for {}", scenario);
                    } else {
                        println!("No plan for {}", scenario);
                    }
                }
                PlanCommand::List => {
                    for scenario in store.list()? {
                        println!("{}", scenario);
                    }
                }
            }
            Ok(true)
        }

        Commands::Memory { action, memory_file } => {
            let path = memory_file.unwrap_or_else(|| config::memory_file().into());
            let mut memory = MemoryStore::open(&path);
            match action {
                MemoryCommand::Show => {
                    println!("{}", serde_json::to_string_pretty(memory.entries())?);
                }
                MemoryCommand::Reset => {
                    memory.reset()?;
                    println!("Cleared memory at {}", path.display());
                }
            }
            Ok(true)
        }
    }
}

async fn connect_browsers(secondary: bool) -> Result<BrowserPool> {
    let (program, args) = config::get()
        .browser
        .command_parts()
        .context("browser automation command is empty")?;

    let primary = McpBrowser::connect(BrowserId::Primary, &program, &args).await?;
    let mut pool = BrowserPool::new(Arc::new(primary));
    if secondary {
        let second = McpBrowser::connect(BrowserId::Secondary, &program, &args).await?;
        pool = pool.with_secondary(Arc::new(second));
    }
    Ok(pool)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Scenario {} ({:?}): {} passed, {} failed, {} steps",
        summary.scenario, summary.mode, summary.passed, summary.failed, summary.total
    );
    for result in &summary.results {
        let status = if result.success { "PASS" } else { "FAIL" };
        let replayed = if result.replayed { " (replayed)" } else { "" };
        println!("  [{}] {}. {}{}", status, result.step_index + 1, result.instruction, replayed);
        if let Some(expected) = &result.expected {
            println!("    Expected: {}", expected);
        }
        println!("    Actual:   {}", result.actual);
        for action in &result.actions {
            println!("      - {}", action);
        }
    }
    let skipped = summary.total.saturating_sub(summary.results.len());
    if skipped > 0 {
        println!("  {} steps not attempted after a failure", skipped);
    }
}
