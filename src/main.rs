//! junban - Dependency-ordered service startup with readiness gating
//!
//! Entry point for the junban application.

use clap::Parser;
use junban::cli::{Cli, Commands, ConfigCommands, PlanArgs, RunArgs};
use junban::config::Config;
use junban::error::exit_code;
use junban::orchestrator::Orchestrator;
use junban::probe::{ProbeTimeouts, SystemProber};
use junban::service::{create_backend, CommandRunner, ProcessRunner};
use junban::JunbanError;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Execute the command
    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Main application logic. Returns the process exit code.
fn run(cli: Cli) -> junban::Result<i32> {
    match &cli.command {
        Commands::Run(args) => cmd_run(&cli, args),
        Commands::Plan(args) => cmd_plan(&cli, args),
        Commands::Config(subcmd) => cmd_config(&cli, subcmd),
    }
}

/// Initialize the tracing subscriber from configuration and CLI flags.
fn init_logging(cli: &Cli, config: &Config) -> junban::Result<()> {
    config.logging.init(cli.log_level())
}

/// Handle the `run` command.
fn cmd_run(cli: &Cli, args: &RunArgs) -> junban::Result<i32> {
    let config = load_config(cli.config_path(args.file.as_deref()))?;
    init_logging(cli, &config)?;

    let environment = config.resolve_environment(args.variant.as_deref())?;
    let graph = config.build_graph()?;

    tracing::info!(
        services = graph.len(),
        backend = ?config.backend.kind,
        variant = environment.variant().unwrap_or("-"),
        "Starting junban run"
    );

    // Create tokio runtime and run the orchestrator
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
        let prober = SystemProber::new(ProbeTimeouts::from(&config.probe), Arc::clone(&runner))?;
        let backend = create_backend(&config, environment, runner)?;
        let orchestrator =
            Orchestrator::with_config(backend, Arc::new(prober), config.orchestrator.clone());

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                interrupt.cancel();
            }
        });

        let report = orchestrator.run_with_cancellation(&graph, cancel).await?;

        if args.json {
            println!("{}", report.to_json()?);
        } else {
            for line in report.status_lines() {
                println!("{}", line);
            }
        }

        Ok(report.exit_code())
    })
}

/// Handle the `plan` command.
fn cmd_plan(cli: &Cli, args: &PlanArgs) -> junban::Result<i32> {
    let config = load_config(cli.config_path(args.file.as_deref()))?;
    init_logging(cli, &config)?;

    let graph = config.build_graph()?;
    graph.validate()?;

    for (index, layer) in graph.layers().enumerate() {
        println!("Layer {}:", index + 1);
        for name in &layer {
            let Some(service) = graph.get(name) else {
                continue;
            };
            let after = if service.dependencies().is_empty() {
                String::new()
            } else {
                format!(" (after {})", service.dependencies().join(", "))
            };
            println!(
                "  {}{}: {}, up to {} attempt(s) every {}s",
                name,
                after,
                service.readiness(),
                service.max_attempts(),
                service.retry_interval().as_secs()
            );
        }
    }

    Ok(exit_code::SUCCESS)
}

/// Handle the `config` subcommand.
fn cmd_config(cli: &Cli, subcmd: &ConfigCommands) -> junban::Result<i32> {
    match subcmd {
        ConfigCommands::Validate => {
            let checked = load_config(cli.config_path(None)).and_then(|config| {
                config.build_graph()?.validate()?;
                Ok(config)
            });
            match checked {
                Ok(config) => {
                    println!("✓ Configuration is valid ({} services)", config.services.len());
                    Ok(exit_code::SUCCESS)
                }
                Err(e) => {
                    println!("✗ Configuration is invalid: {}", e);
                    Err(e)
                }
            }
        }
        ConfigCommands::Show => {
            let config = load_config(cli.config_path(None))?;
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(exit_code::SUCCESS)
        }
    }
}

/// Load configuration with error handling.
fn load_config(path: Option<&Path>) -> junban::Result<Config> {
    let path = path.ok_or_else(|| {
        JunbanError::config("No configuration file given (pass CONFIG, --config or JUNBAN_CONFIG)")
    })?;
    Config::load_from_path(path)
}
