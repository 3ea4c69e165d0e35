//! Minimal refinement run: draft a short document and polish it.
//!
//! Uses a four-section layout, a small cycle budget, and a closure that
//! prints each cycle's verdict. The checkpoint lives next to the output, so
//! interrupting and rerunning picks up where it stopped.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_refine
//! ```

use redraft_rs::prelude::*;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), String> {
    // 1. Create the OpenRouter client.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = OpenRouterClient::new(api_key, ClientConfig::default().with_max_tokens(8192))?;

    // 2. Describe the document layout and loop bounds.
    let config = EngineConfig::default()
        .with_titles(["Title", "Summary", "Analysis", "Recommendations"])
        .with_max_refinements(4)
        .with_confidence_threshold(2);

    // 3. Log through tracing and echo verdicts to stdout.
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event| {
            if let EngineEvent::PlanReceived { cycle, verdict, .. } = event {
                println!("cycle {cycle}: {verdict}");
            }
        }));

    // 4. Run the engine.
    let output = Path::new("target/basic_refine.md");
    let mut engine = RefinementEngine::new(
        &client,
        config,
        PromptSet::default(),
        PromptContext::new("Compare write-ahead logging and shadow paging for an embedded database."),
        CheckpointManager::for_output(output),
        &handler,
    )
    .map_err(|e| e.to_string())?;

    let sink = |doc: &Document| std::fs::write(output, doc.to_markdown()).map_err(|e| e.to_string());
    let outcome = engine.run(&sink).await.map_err(|e| e.to_string())?;

    // 5. Print results.
    println!(
        "\n--- {} | {} cycle(s) | {} ---",
        outcome.termination,
        outcome.cycle_index,
        output.display()
    );
    Ok(())
}
