//! Refinement runtime: the [`RefinementEngine`] loop and its supporting modules.
//!
//! - [`engine::RefinementEngine`]: drafting, the refinement cycle, the
//!   termination policy, and the checkpoint lifecycle. Start here.
//! - [`config::EngineConfig`]: canonical titles and loop bounds.
//! - [`events`]: [`EventHandler`] trait and [`EngineEvent`] enum for
//!   observing the loop. Includes [`LoggingHandler`], [`CompositeEventHandler`]
//!   and [`FnEventHandler`].
//! - [`checkpoint`]: atomic save and validated load of [`EngineState`].
//! - [`prompt`]: [`PromptSet`] templates and placeholder rendering.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod events;
pub mod prompt;

// Re-export commonly used items at the module level.
pub use checkpoint::{CheckpointManager, EngineState};
pub use config::{DEFAULT_SECTION_TITLES, EngineConfig};
pub use engine::{
    CycleOutcome, DocumentSink, EngineError, Phase, RefinementEngine, RefinementOutcome,
};
pub use events::{
    CompositeEventHandler, EngineEvent, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler, SkipReason, Termination,
};
pub use prompt::{PromptContext, PromptSet};
