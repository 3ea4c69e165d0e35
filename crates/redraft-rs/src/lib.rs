//! Iterative document refinement over the OpenRouter chat completions API.
//!
//! `redraft-rs` writes a long-form structured document in two stages. A
//! single free-form request produces a first draft, split into a fixed list
//! of canonical sections. Then the [`RefinementEngine`](agent::RefinementEngine)
//! repeatedly asks a reviewer model for a structured critique-and-rewrite
//! plan, validates it, and merges the rewritten sections back in place until
//! the reviewer is satisfied or the cycle budget runs out.
//!
//! State is checkpointed after every cycle that changes the document, so an
//! interrupted run picks up where it left off.
//!
//! # Getting started
//!
//! ```ignore
//! use redraft_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").map_err(|e| e.to_string())?;
//!     let client = OpenRouterClient::new(api_key, ClientConfig::default())?;
//!
//!     let config = EngineConfig::default().with_max_refinements(5);
//!     let context = PromptContext::new("Survey consensus algorithms.");
//!     let checkpoint = CheckpointManager::for_output("out/survey.md".as_ref());
//!
//!     let mut engine = RefinementEngine::new(
//!         &client,
//!         config,
//!         PromptSet::default(),
//!         context,
//!         checkpoint,
//!         &LoggingHandler,
//!     )
//!     .map_err(|e| e.to_string())?;
//!
//!     let sink = |doc: &Document| {
//!         std::fs::write("out/survey.md", doc.to_markdown()).map_err(|e| e.to_string())
//!     };
//!     let outcome = engine.run(&sink).await.map_err(|e| e.to_string())?;
//!     println!("{} after {} cycle(s)", outcome.termination, outcome.cycle_index);
//!     Ok(())
//! }
//! ```
//!
//! # Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | [`RefinementEngine`](agent::RefinementEngine), checkpoints, events, prompts |
//! | [`api`] | [`CompletionClient`](api::CompletionClient) boundary, OpenRouter client, retry |
//! | [`plan`] | [`RefinementPlan`](plan::RefinementPlan) types and the validator |
//! | [`document`] | Canonical ordered sections and merge-by-title |
//! | [`config`] | TOML [`Settings`](config::Settings) for the binary |

pub mod agent;
pub mod api;
pub mod config;
pub mod document;
pub mod plan;
pub mod prelude;

use schemars::JsonSchema;

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used for the structured-output response format
/// and for validating checkpoints on load.
///
/// # Example
///
/// ```
/// use redraft_rs::json_schema_for;
/// use redraft_rs::plan::RefinementPlan;
///
/// let schema = json_schema_for::<RefinementPlan>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"final_verdict".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}
