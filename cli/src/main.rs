//! CLI entrypoint for conclave
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use conclave_application::{
    AiCaller, CancellationRegistry, NoProgress, NoRunLogger, ProgressSink,
    RepairBindingsUseCase, RunLogger, RunSelectiveInput, SelectiveEngine, SelectiveOutcome,
};
use conclave_domain::OutputFormat;
use conclave_infrastructure::{ConfigLoader, FileConfigStore, JsonWorldbookStore, JsonlRunLogger};
use conclave_presentation::{Cli, ConsoleFormatter, ConsoleProgress, SimpleProgress};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(());
    }

    info!("Starting conclave");

    let config = ConfigLoader::load(cli.config.as_deref())
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
    if !config.output.color {
        colored::control::set_override(false);
    }

    let store = Arc::new(FileConfigStore::layered(cli.config.clone()));

    if cli.repair_bindings {
        let report = RepairBindingsUseCase::new(store.clone()).execute().await?;
        eprint!("{}", ConsoleFormatter::format_issues(&report.issues));
        if report.changed {
            println!("Repaired bindings written to {}", store.path().display());
        } else {
            println!("No binding changes");
        }
        return Ok(());
    }

    for issue in config.engine.validate() {
        warn!("Config: {}", issue.message);
    }

    let user_input = match cli.input {
        Some(input) => input,
        None => read_stdin().await?,
    };
    if user_input.trim().is_empty() {
        bail!("No input. Pass the user turn as an argument or on stdin.");
    }
    let mut input = RunSelectiveInput::new(user_input);
    if let Some(context) = cli.context {
        input = input.with_context(context);
    }

    // === Dependency Injection ===
    let mut params = config.engine.to_params();
    if let Some(max) = cli.concurrency {
        params = params.with_max_concurrency(max);
    }

    let worldbook_dir = cli
        .worldbooks
        .clone()
        .unwrap_or_else(|| config.worldbooks.dir.clone());
    let worldbooks = Arc::new(JsonWorldbookStore::new(worldbook_dir));

    let console = (!cli.quiet && config.output.progress && std::io::stderr().is_terminal())
        .then(|| Arc::new(ConsoleProgress::new()));
    let progress: Arc<dyn ProgressSink> = match (&console, cli.quiet || !config.output.progress) {
        (Some(console), _) => console.clone(),
        (None, true) => Arc::new(NoProgress),
        (None, false) => Arc::new(SimpleProgress::new()),
    };

    let run_log = cli.run_log.clone().or_else(|| config.output.run_log.clone());
    let run_logger = run_log.as_deref().and_then(|path| JsonlRunLogger::new(path));
    let logger: Arc<dyn RunLogger> = match run_logger {
        Some(logger) => {
            info!("Writing run log to {}", logger.path().display());
            Arc::new(logger)
        }
        None => Arc::new(NoRunLogger),
    };

    let engine = SelectiveEngine::new(caller()?, worldbooks, params)
        .with_progress(progress)
        .with_logger(logger);

    let registry = Arc::new(CancellationRegistry::new());
    let on_interrupt = Arc::clone(&registry);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling all tasks");
            on_interrupt.cancel_all();
        }
    });

    let outcome = engine
        .execute(Arc::new(config.snapshot()), input, &registry)
        .await;
    if let Some(console) = &console {
        console.clear();
    }

    match outcome? {
        SelectiveOutcome::Completed(result) => {
            if !cli.quiet {
                eprint!("{}", ConsoleFormatter::format_summary(&result));
                eprintln!();
            }
            let format: OutputFormat = cli
                .output
                .map(Into::into)
                .or(config.output.format)
                .unwrap_or_default();
            println!("{}", ConsoleFormatter::format(&result, format));
        }
        SelectiveOutcome::Cancelled => {
            eprintln!("Cancelled");
        }
        SelectiveOutcome::NoOp => {
            eprintln!("Nothing to run: no bound endpoint/prompt pair and no auxiliary module");
        }
    }

    Ok(())
}

/// Install the tracing subscriber. The guard must outlive the run so the
/// file writer flushes.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Could not create log directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

async fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("Failed to read input from stdin")?;
    Ok(buf)
}

#[cfg(feature = "http")]
fn caller() -> Result<Arc<dyn AiCaller>> {
    Ok(Arc::new(conclave_infrastructure::OpenAiCompatibleCaller::new()))
}

#[cfg(not(feature = "http"))]
fn caller() -> Result<Arc<dyn AiCaller>> {
    bail!("conclave was built without the `http` feature; no AI caller is available")
}
