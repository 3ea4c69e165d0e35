//! Draft and iteratively refine a structured document from a problem statement.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Defaults: problem_statement.txt -> output/final_document.md
//! redraft
//!
//! # Custom input, output and cycle budget
//! redraft task.txt -o out/paper.md -r 5
//!
//! # Settings file, custom prompts, Spanish output
//! redraft task.txt --config redraft.toml --prompts prompts/ --language Spanish
//! ```
//!
//! Rerunning with the same output path resumes from the last checkpoint.

use clap::Parser;
use redraft_rs::agent::{
    CheckpointManager, EngineEvent, EventHandler, LoggingHandler, PromptContext, PromptSet,
    RefinementEngine,
};
use redraft_rs::api::OpenRouterClient;
use redraft_rs::config::Settings;
use redraft_rs::document::Document;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Draft and iteratively refine a structured document.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "redraft")]
struct Cli {
    /// File containing the problem statement
    #[arg(default_value = "problem_statement.txt")]
    problem_file: PathBuf,

    /// Where to write the final markdown document
    #[arg(short, long, default_value = "output/final_document.md")]
    output: PathBuf,

    /// Maximum refinement cycles (overrides the settings file)
    #[arg(short = 'r', long)]
    max_refinements: Option<u32>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with prompt templates; missing files use built-ins
    #[arg(long, default_value = "prompts")]
    prompts: PathBuf,

    /// Output language (overrides the settings file)
    #[arg(long)]
    language: Option<String>,

    /// Model ID (overrides the settings file)
    #[arg(long)]
    model: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Prints cycle progress to stderr alongside the tracing output.
struct CliEventHandler;

impl EventHandler for CliEventHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        LoggingHandler.on_event(event);
        if let EngineEvent::CycleStart {
            cycle,
            max_refinements,
        } = event
        {
            eprintln!("  [cycle {cycle}/{max_refinements}]");
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_problem(path: &Path) -> Result<String, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read problem statement {}: {e}", path.display()))?;
    if text.trim().is_empty() {
        return Err(format!("Problem statement {} is empty", path.display()));
    }
    Ok(text)
}

fn write_markdown(path: &Path, document: &Document) -> Result<(), String> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create output dir {}: {e}", dir.display()))?;
    }
    std::fs::write(path, document.to_markdown())
        .map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut settings =
        Settings::load_or_default(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(n) = cli.max_refinements {
        settings.synthesis.max_refinements = n;
    }
    if let Some(language) = cli.language {
        settings.synthesis.language = language;
    }
    if let Some(model) = cli.model {
        settings.model.model = model;
    }
    settings.validate().map_err(|e| e.to_string())?;

    let problem = read_problem(&cli.problem_file)?;

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key, settings.client_config())?;

    let prompts = PromptSet::load_dir(&cli.prompts)?;
    let context = PromptContext::new(problem).with_language(settings.synthesis.language.clone());
    let checkpoint = CheckpointManager::for_output(&cli.output);

    eprintln!(
        "  Model: {} | max refinements: {} | confidence threshold: {}",
        settings.model.model,
        settings.synthesis.max_refinements,
        settings.synthesis.confidence_threshold
    );

    let handler = CliEventHandler;
    let mut engine = RefinementEngine::new(
        &client,
        settings.engine_config(),
        prompts,
        context,
        checkpoint,
        &handler,
    )
    .map_err(|e| e.to_string())?;

    let output = cli.output.clone();
    let sink = move |doc: &Document| write_markdown(&output, doc);
    let outcome = engine.run(&sink).await.map_err(|e| e.to_string())?;

    eprintln!(
        "  Done: {} after {} cycle(s){}. Wrote {}",
        outcome.termination,
        outcome.cycle_index,
        if outcome.resumed { " (resumed)" } else { "" },
        cli.output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
