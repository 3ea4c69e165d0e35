//! Convenience re-exports for common `redraft-rs` types.
//!
//! ```ignore
//! use redraft_rs::prelude::*;
//! ```
//!
//! Covers what a typical caller needs to run the engine end to end: the
//! client, engine and its configuration, prompts, checkpoints, event
//! handlers, and the document and plan types. Wire types and the retry
//! internals stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::document::{ApplyResult, Document, Section};
pub use crate::json_schema_for;
pub use crate::plan::{Classification, Finding, RefinedSection, RefinementPlan, Verdict};

// ── Completion ──────────────────────────────────────────────────────
pub use crate::api::{
    ClientConfig, CompletionClient, CompletionFailure, CompletionRequest, OpenRouterClient,
    ResponseMode, RetryConfig,
};

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::agent::{
    CheckpointManager, CompositeEventHandler, CycleOutcome, DocumentSink, EngineConfig,
    EngineError, EngineEvent, EngineState, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler, PromptContext, PromptSet, RefinementEngine, RefinementOutcome, Termination,
};

// ── Settings ────────────────────────────────────────────────────────
pub use crate::config::Settings;
