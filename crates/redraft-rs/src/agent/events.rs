//! Events emitted by the [`RefinementEngine`](super::engine::RefinementEngine).
//!
//! The engine reports progress through [`EngineEvent`] variants covering the
//! whole run, from resume through drafting and each refinement cycle to
//! termination. Callers implement [`EventHandler`] to observe them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::plan::{Finding, Verdict};
use std::path::Path;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Why a refinement cycle made no change to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The response had no usable JSON object or failed validation.
    MalformedPlan(String),
    /// The model returned nothing usable.
    EmptyResponse(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MalformedPlan(d) => write!(f, "malformed plan: {d}"),
            SkipReason::EmptyResponse(d) => write!(f, "empty response: {d}"),
        }
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The reviewer was satisfied for enough consecutive cycles.
    Confident,
    /// `max_refinements` cycles ran.
    BudgetExhausted,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Confident => f.write_str("confidence threshold reached"),
            Termination::BudgetExhausted => f.write_str("refinement budget exhausted"),
        }
    }
}

#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// A valid checkpoint was found and will be continued.
    Resumed { cycle_index: u32, path: &'a Path },
    /// A checkpoint existed but could not be used; drafting starts over.
    CheckpointRejected { path: &'a Path, reason: &'a str },
    DraftStarted,
    /// The initial draft was parsed into the canonical sections.
    DraftReady {
        filled: usize,
        total: usize,
        ignored_headings: &'a [String],
    },
    CycleStart { cycle: u32, max_refinements: u32 },
    PlanReceived {
        cycle: u32,
        verdict: Verdict,
        findings: &'a [Finding],
    },
    SectionUpdated { cycle: u32, title: &'a str },
    /// The plan named a section that is not canonical. Ignored.
    UnknownSection { cycle: u32, title: &'a str },
    /// The plan named the same section more than once; the last entry won.
    SupersededSection { cycle: u32, title: &'a str },
    CycleSkipped { cycle: u32, reason: &'a SkipReason },
    ConfidenceProgress { count: u32, threshold: u32 },
    CheckpointSaved { cycle_index: u32 },
    /// Saving failed. The run continues without a fresh checkpoint.
    CheckpointFailed { cycle_index: u32, error: &'a str },
    Terminated {
        reason: Termination,
        cycles_run: u32,
    },
}

// ── Handlers ───────────────────────────────────────────────────────

/// Observer for [`EngineEvent`]s. Handlers cannot influence the loop.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &EngineEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let EngineEvent::CycleStart { cycle, .. } = event {
///         println!("cycle {cycle}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&EngineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&EngineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&EngineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent<'_>) {
        (self.0)(event)
    }
}

/// Runs several handlers in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(show_progress, progress_bar);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        match event {
            EngineEvent::Resumed { cycle_index, path } => {
                info!(
                    "Resuming from checkpoint {} after cycle {cycle_index}",
                    path.display()
                );
            }
            EngineEvent::CheckpointRejected { path, reason } => {
                warn!(
                    "Discarding checkpoint {}: {reason}. Starting a new draft.",
                    path.display()
                );
            }
            EngineEvent::DraftStarted => info!("Drafting initial document"),
            EngineEvent::DraftReady {
                filled,
                total,
                ignored_headings,
            } => {
                info!("Initial draft ready: {filled}/{total} sections filled");
                for heading in ignored_headings.iter() {
                    warn!("Draft heading '{heading}' is not a canonical section; dropped");
                }
            }
            EngineEvent::CycleStart {
                cycle,
                max_refinements,
            } => {
                info!("[cycle {cycle}/{max_refinements}] requesting review");
            }
            EngineEvent::PlanReceived {
                cycle,
                verdict,
                findings,
            } => {
                info!("[cycle {cycle}] verdict {verdict}, {} finding(s)", findings.len());
                for f in findings.iter() {
                    info!("  - [{}] {}: {}", f.classification, f.location, f.issue);
                }
            }
            EngineEvent::SectionUpdated { cycle, title } => {
                debug!("[cycle {cycle}] rewrote section '{title}'");
            }
            EngineEvent::UnknownSection { cycle, title } => {
                warn!("[cycle {cycle}] ignoring unknown section '{title}'");
            }
            EngineEvent::SupersededSection { cycle, title } => {
                warn!("[cycle {cycle}] section '{title}' appeared more than once; using the last");
            }
            EngineEvent::CycleSkipped { cycle, reason } => {
                warn!("[cycle {cycle}] no changes applied ({reason})");
            }
            EngineEvent::ConfidenceProgress { count, threshold } => {
                info!("Confidence {count}/{threshold}");
            }
            EngineEvent::CheckpointSaved { cycle_index } => {
                debug!("Checkpoint saved after cycle {cycle_index}");
            }
            EngineEvent::CheckpointFailed { cycle_index, error } => {
                warn!("Could not save checkpoint after cycle {cycle_index}: {error}");
            }
            EngineEvent::Terminated { reason, cycles_run } => {
                info!("Refinement finished after {cycles_run} cycle(s): {reason}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn composite_calls_every_handler() {
        let count = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&count);
        let b = Arc::clone(&count);
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with_if(false, NoopHandler)
            .with(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            }));
        handler.on_event(&EngineEvent::DraftStarted);
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn logging_handler_accepts_every_variant() {
        let reason = SkipReason::EmptyResponse("no content".into());
        let ignored = vec!["Appendix".to_string()];
        let path = Path::new(".paper.checkpoint.json");
        let events = [
            EngineEvent::Resumed { cycle_index: 2, path },
            EngineEvent::CheckpointRejected { path, reason: "bad" },
            EngineEvent::DraftStarted,
            EngineEvent::DraftReady {
                filled: 3,
                total: 8,
                ignored_headings: &ignored,
            },
            EngineEvent::CycleSkipped { cycle: 1, reason: &reason },
            EngineEvent::Terminated {
                reason: Termination::Confident,
                cycles_run: 4,
            },
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }
}
