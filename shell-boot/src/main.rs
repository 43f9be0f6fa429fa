//! shell-boot - Run bootstrap scenarios
//!
//! Unix-style tool for replaying a simulated application bootstrap and
//! printing its lifecycle events.

mod scenario;

use clap::{Parser, Subcommand};
use libshellboot::events::BootstrapEvent;
use libshellboot::{BootstrapSession, Config, RegistrationError, Result, ShellbootError};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::Instant;
use tracing::warn;

use scenario::{ActiveRoute, Scenario, ScenarioPlan};

#[derive(Parser, Debug)]
#[command(name = "shell-boot")]
#[command(version)]
#[command(about = "Run bootstrap scenarios")]
#[command(long_about = "\
shell-boot - Run bootstrap scenarios

DESCRIPTION:
    shell-boot replays the bootstrap of a simulated application shell. A scenario
    file describes local and remote modules, their latencies and failures, the mock
    network layer and the public/protected data. shell-boot runs the scenario through
    the Shellboot readiness state machine and prints every lifecycle event until the
    application is bootstrapped or the user turns out to be unauthorized.

COMMANDS:
    run         Run a scenario and print its lifecycle events
    check       Validate a scenario without running it

USAGE EXAMPLES:
    # Run a scenario
    shell-boot run scenarios/protected.toml

    # Print one JSON object per event
    shell-boot run scenarios/protected.toml --format json

    # Reproduce a jittered run
    shell-boot run scenarios/msw.toml --seed 42

    # Fail if any module failed to register
    shell-boot run scenarios/failing-remote.toml --fail-on-error

    # Validate a scenario
    shell-boot check scenarios/minimal.toml

CONFIGURATION:
    Configuration file: ~/.config/shellboot/config.toml
    Scenario [bootstrap] flags override the configuration file.

    Override with environment variables:
        SHELLBOOT_CONFIG       - Path to config file
        SHELLBOOT_LOG_FORMAT   - Log format on stderr: text, json or pretty
        SHELLBOOT_LOG_LEVEL    - Log level on stderr (default: error)

EXIT CODES:
    0 - Application bootstrapped
    1 - Unauthorized, timed out, registration failures with --fail-on-error,
        or configuration error
    2 - Session misuse
    3 - Invalid input (bad scenario, duration or format)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario file (TOML)
        scenario: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Seed for module latency jitter
        #[arg(long)]
        seed: Option<u64>,

        /// Give up after this long (e.g., "30s", "500ms")
        #[arg(long, default_value = "30s")]
        timeout: String,

        /// Exit with 1 when any module failed to register
        #[arg(long)]
        fail_on_error: bool,
    },

    /// Validate a scenario
    Check {
        /// Scenario file (TOML)
        scenario: String,
    },
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Bootstrapped,
    Unauthorized,
    TimedOut,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Bootstrapped => "application bootstrapped",
            Outcome::Unauthorized => "unauthorized",
            Outcome::TimedOut => "timed out",
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    elapsed_ms: u64,
    name: String,
    #[serde(flatten)]
    event: &'a BootstrapEvent,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    outcome: Outcome,
    elapsed_ms: u64,
    errors: &'a [RegistrationError],
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let mut logging = libshellboot::logging::config_from_env("error");
    logging.verbose = cli.verbose;
    logging.init();

    // Run the main logic and handle errors
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    // Load configuration
    let config = Config::load()?;

    match cli.command {
        Commands::Run {
            scenario,
            format,
            seed,
            timeout,
            fail_on_error,
        } => {
            let format = validate_format(&format)?;
            let timeout = humantime::parse_duration(&timeout).map_err(|e| {
                ShellbootError::InvalidInput(format!("Invalid timeout '{}': {}", timeout, e))
            })?;

            let (outcome, errors) =
                cmd_run(&config, Path::new(&scenario), format, seed, timeout).await?;

            Ok(match outcome {
                Outcome::Bootstrapped if fail_on_error && !errors.is_empty() => 1,
                Outcome::Bootstrapped => 0,
                Outcome::Unauthorized | Outcome::TimedOut => 1,
            })
        }
        Commands::Check { scenario } => {
            cmd_check(&config, Path::new(&scenario))?;
            Ok(0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn validate_format(format: &str) -> Result<OutputFormat> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(ShellbootError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        ))),
    }
}

/// Run a scenario, printing events as they happen
async fn cmd_run(
    config: &Config,
    path: &Path,
    format: OutputFormat,
    seed: Option<u64>,
    timeout: Duration,
) -> Result<(Outcome, Vec<RegistrationError>)> {
    let plan = Scenario::load(path)?.validate()?;

    let errors: Arc<Mutex<Vec<RegistrationError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let session = BootstrapSession::<()>::builder(
        plan.bootstrap_config(config),
        Arc::new(plan.data.clone()),
    )
    .mock_server(Arc::new(plan.msw.clone()))
    .on_error(move |batch: &[RegistrationError]| sink.lock().extend_from_slice(batch))
    .build();

    if plan.active_route == ActiveRoute::Protected {
        session.set_active_route_protected(true);
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let local = plan.local_modules(&mut rng);
    let remote = plan.remote_modules(&mut rng);

    let mut events = session.events();
    let started = Instant::now();

    let bootstrap = tokio::time::timeout(timeout, async {
        session.start(local, remote, None).await?;
        Ok::<_, ShellbootError>(session.wait_until_ready().await)
    });
    tokio::pin!(bootstrap);

    let settled = loop {
        tokio::select! {
            result = &mut bootstrap => break result,
            received = events.recv() => match received {
                Ok(event) => print_event(&event, started, format),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
                Err(RecvError::Closed) => break (&mut bootstrap).await,
            },
        }
    };
    let settled = match settled {
        Ok(state) => Some(state?),
        Err(_) => None,
    };

    // Events emitted while the last state was being published
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event, started, format),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    let outcome = match settled {
        None => Outcome::TimedOut,
        Some(state) if state.is_unauthorized => Outcome::Unauthorized,
        Some(_) => Outcome::Bootstrapped,
    };
    let errors = errors.lock().clone();
    print_summary(outcome, started, &errors, format);

    Ok((outcome, errors))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn print_event(event: &BootstrapEvent, started: Instant, format: OutputFormat) {
    let elapsed_ms = elapsed_ms(started);
    match format {
        OutputFormat::Text => println!("{:>6}ms  {}", elapsed_ms, event.name()),
        OutputFormat::Json => {
            let line = EventLine {
                elapsed_ms,
                name: event.name(),
                event,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
    }
}

fn print_summary(
    outcome: Outcome,
    started: Instant,
    errors: &[RegistrationError],
    format: OutputFormat,
) {
    let elapsed_ms = elapsed_ms(started);
    match format {
        OutputFormat::Text => {
            for error in errors {
                eprintln!("Warning: {}", error);
            }
            if errors.is_empty() {
                println!("{} in {}ms", outcome.label(), elapsed_ms);
            } else {
                println!(
                    "{} in {}ms ({} registration errors)",
                    outcome.label(),
                    elapsed_ms,
                    errors.len()
                );
            }
        }
        OutputFormat::Json => {
            let line = SummaryLine {
                outcome,
                elapsed_ms,
                errors,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(error = %e, "Failed to serialize summary"),
            }
        }
    }
}

/// Validate a scenario and describe what it would run
fn cmd_check(config: &Config, path: &Path) -> Result<()> {
    let plan = Scenario::load(path)?.validate()?;
    print_plan(path, &plan, config);
    Ok(())
}

fn print_plan(path: &Path, plan: &ScenarioPlan, config: &Config) {
    let bootstrap = plan.bootstrap_config(config);
    println!("{}: ok", path.display());
    println!("  wait_for_msw: {}", bootstrap.wait_for_msw);
    println!("  wait_for_public_data: {}", bootstrap.wait_for_public_data);
    println!(
        "  wait_for_protected_data: {}",
        bootstrap.wait_for_protected_data
    );
    println!(
        "  active_route: {}",
        match plan.active_route {
            ActiveRoute::Public => "public",
            ActiveRoute::Protected => "protected",
        }
    );
    println!(
        "  local modules: {} ({} deferred)",
        plan.local.len(),
        deferred_count(&plan.local)
    );
    println!(
        "  remote modules: {} ({} deferred)",
        plan.remote.len(),
        deferred_count(&plan.remote)
    );
}

fn deferred_count(modules: &[scenario::ModulePlan]) -> usize {
    modules.iter().filter(|module| module.deferred).count()
}
