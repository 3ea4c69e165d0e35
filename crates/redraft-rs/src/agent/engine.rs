//! The refinement loop.
//!
//! [`RefinementEngine`] drives a document through
//! `Init -> Drafting -> Refining -> Terminated`:
//!
//! 1. **Init**: load the checkpoint for this output. A valid one whose titles
//!    match the canonical list skips straight to refining.
//! 2. **Drafting**: one free-form request; the markdown reply is split into
//!    the canonical sections and checkpointed.
//! 3. **Refining**: each cycle requests a structured plan, validates it,
//!    merges rewritten sections, updates the confidence counter and
//!    checkpoints if anything changed. Malformed or empty replies skip the
//!    cycle but still use up budget.
//! 4. **Terminated**: the document goes to a [`DocumentSink`]; the
//!    checkpoint is deleted only after the sink succeeds.
//!
//! Blocked requests and exhausted retries abort the run with the last
//! checkpoint intact, so rerunning resumes at the same cycle boundary.

use super::checkpoint::{CheckpointManager, EngineState};
use super::config::EngineConfig;
use super::events::{EngineEvent, EventHandler, SkipReason, Termination};
use super::prompt::{PromptContext, PromptSet};
use crate::api::{CompletionClient, CompletionFailure};
use crate::document::{Document, DocumentError};
use crate::plan::{Verdict, extract_and_validate};
use thiserror::Error;
use tracing::{debug, trace, warn};

// ── Outcomes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Drafting,
    Refining,
    Terminated(Termination),
}

/// Result of a single refinement cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A valid plan was merged. `updated` may be empty.
    Applied {
        verdict: Verdict,
        updated: Vec<String>,
    },
    /// Nothing was merged; the cycle still counts toward the budget.
    Skipped(SkipReason),
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub document: Document,
    pub termination: Termination,
    /// Total cycles completed, including ones from before a resume.
    pub cycle_index: u32,
    /// Cycles run by this process.
    pub cycles_run: u32,
    pub resumed: bool,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionFailure),
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("failed to write final document: {0}")]
    Output(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("operation not valid in phase {0:?}")]
    Phase(Phase),
}

/// Receives the final document.
pub trait DocumentSink {
    fn write(&self, document: &Document) -> Result<(), String>;
}

impl<F> DocumentSink for F
where
    F: Fn(&Document) -> Result<(), String>,
{
    fn write(&self, document: &Document) -> Result<(), String> {
        self(document)
    }
}

// ── Engine ─────────────────────────────────────────────────────────

pub struct RefinementEngine<'a> {
    client: &'a dyn CompletionClient,
    config: EngineConfig,
    prompts: PromptSet,
    context: PromptContext,
    checkpoint: CheckpointManager,
    handler: &'a dyn EventHandler,
    phase: Phase,
    state: Option<EngineState>,
    cycles_run: u32,
    resumed: bool,
}

impl<'a> RefinementEngine<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        config: EngineConfig,
        prompts: PromptSet,
        context: PromptContext,
        checkpoint: CheckpointManager,
        handler: &'a dyn EventHandler,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        Ok(Self {
            client,
            config,
            prompts,
            context,
            checkpoint,
            handler,
            phase: Phase::Init,
            state: None,
            cycles_run: 0,
            resumed: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current state. `None` before drafting or resume.
    pub fn state(&self) -> Option<&EngineState> {
        self.state.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run to completion and hand the document to `sink`.
    pub async fn run(&mut self, sink: &dyn DocumentSink) -> Result<RefinementOutcome, EngineError> {
        if self.phase == Phase::Init {
            self.start().await?;
        }
        while self.phase == Phase::Refining {
            self.refine_once().await?;
        }
        self.finish(sink)
    }

    /// Leave `Init`: resume from the checkpoint or draft a new document.
    pub async fn start(&mut self) -> Result<Phase, EngineError> {
        if self.phase != Phase::Init {
            return Err(EngineError::Phase(self.phase));
        }

        if let Some(state) = self.restore() {
            self.handler.on_event(&EngineEvent::Resumed {
                cycle_index: state.cycle_index,
                path: self.checkpoint.path(),
            });
            self.state = Some(state);
            self.resumed = true;
        } else {
            self.phase = Phase::Drafting;
            self.draft().await?;
        }

        self.phase = Phase::Refining;
        self.settle();
        Ok(self.phase)
    }

    /// Load the checkpoint and check it against the canonical titles.
    fn restore(&self) -> Option<EngineState> {
        let path = self.checkpoint.path();
        let state = match self.checkpoint.try_load() {
            Ok(state) => state?,
            Err(e) => {
                let reason = e.to_string();
                self.handler
                    .on_event(&EngineEvent::CheckpointRejected { path, reason: &reason });
                return None;
            }
        };

        let sections = state.document.sections().to_vec();
        match Document::from_sections(&self.config.canonical_titles, sections) {
            Ok(_) => Some(state),
            Err(e) => {
                let reason = e.to_string();
                self.handler
                    .on_event(&EngineEvent::CheckpointRejected { path, reason: &reason });
                None
            }
        }
    }

    async fn draft(&mut self) -> Result<(), EngineError> {
        self.handler.on_event(&EngineEvent::DraftStarted);
        let request = self
            .prompts
            .drafting_request(&self.context, &self.config.canonical_titles);
        let raw = self.client.send(&request).await?;
        trace!("Draft response:\n{raw}");

        let (document, ignored) = Document::from_markdown(&self.config.canonical_titles, &raw)?;
        let filled = document
            .sections()
            .iter()
            .filter(|s| !s.content.trim().is_empty())
            .count();
        self.handler.on_event(&EngineEvent::DraftReady {
            filled,
            total: document.len(),
            ignored_headings: &ignored,
        });

        let state = EngineState::drafted(document);
        self.save_checkpoint(&state);
        self.state = Some(state);
        Ok(())
    }

    /// Run one refinement cycle.
    ///
    /// Fails only on a blocked request or exhausted retries, in which case
    /// the state is left exactly as it was before the call.
    pub async fn refine_once(&mut self) -> Result<CycleOutcome, EngineError> {
        if self.phase != Phase::Refining {
            return Err(EngineError::Phase(self.phase));
        }
        let Some(state) = self.state.as_ref() else {
            return Err(EngineError::Phase(self.phase));
        };

        let cycle = state.cycle_index + 1;
        self.handler.on_event(&EngineEvent::CycleStart {
            cycle,
            max_refinements: self.config.max_refinements,
        });

        let request = self.prompts.refinement_request(
            &self.context,
            &self.config.canonical_titles,
            &state.document.to_markdown(),
        );
        let reply = self.client.send(&request).await;

        let outcome = match reply {
            Ok(raw) => {
                trace!("Refinement response (cycle {cycle}):\n{raw}");
                match extract_and_validate(&raw) {
                    Ok(plan) => {
                        let Some(state) = self.state.as_mut() else {
                            return Err(EngineError::Phase(self.phase));
                        };
                        self.handler.on_event(&EngineEvent::PlanReceived {
                            cycle,
                            verdict: plan.verdict,
                            findings: &plan.findings,
                        });

                        let applied = state.document.apply(&plan.refined_sections);
                        for title in &applied.updated {
                            self.handler
                                .on_event(&EngineEvent::SectionUpdated { cycle, title });
                        }
                        for title in &applied.unknown_titles {
                            self.handler
                                .on_event(&EngineEvent::UnknownSection { cycle, title });
                        }
                        for title in &applied.superseded {
                            self.handler
                                .on_event(&EngineEvent::SupersededSection { cycle, title });
                        }

                        if plan.verdict.is_final() {
                            state.consecutive_no_improvement_count += 1;
                        } else {
                            state.consecutive_no_improvement_count = 0;
                        }
                        state.cycle_index = cycle;
                        self.handler.on_event(&EngineEvent::ConfidenceProgress {
                            count: state.consecutive_no_improvement_count,
                            threshold: self.config.confidence_threshold,
                        });

                        if applied.changed() {
                            let snapshot = state.clone();
                            self.save_checkpoint(&snapshot);
                        } else {
                            debug!("Cycle {cycle} changed nothing; checkpoint not rewritten");
                        }

                        CycleOutcome::Applied {
                            verdict: plan.verdict,
                            updated: applied.updated,
                        }
                    }
                    Err(e) => self.skip(cycle, SkipReason::MalformedPlan(e.to_string())),
                }
            }
            Err(CompletionFailure::Empty { detail }) => {
                self.skip(cycle, SkipReason::EmptyResponse(detail))
            }
            Err(failure) => {
                warn!("Cycle {cycle} aborted: {failure}");
                return Err(failure.into());
            }
        };

        self.cycles_run += 1;
        self.settle();
        Ok(outcome)
    }

    fn skip(&mut self, cycle: u32, reason: SkipReason) -> CycleOutcome {
        if let Some(state) = self.state.as_mut() {
            state.cycle_index = cycle;
        }
        self.handler
            .on_event(&EngineEvent::CycleSkipped { cycle, reason: &reason });
        CycleOutcome::Skipped(reason)
    }

    /// Move to `Terminated` if a stop condition holds.
    fn settle(&mut self) {
        if self.phase != Phase::Refining {
            return;
        }
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let reason = if state.consecutive_no_improvement_count >= self.config.confidence_threshold
        {
            Termination::Confident
        } else if state.cycle_index >= self.config.max_refinements {
            Termination::BudgetExhausted
        } else {
            return;
        };
        self.phase = Phase::Terminated(reason);
        self.handler.on_event(&EngineEvent::Terminated {
            reason,
            cycles_run: self.cycles_run,
        });
    }

    fn save_checkpoint(&self, state: &EngineState) {
        match self.checkpoint.save(state) {
            Ok(()) => self.handler.on_event(&EngineEvent::CheckpointSaved {
                cycle_index: state.cycle_index,
            }),
            Err(error) => self.handler.on_event(&EngineEvent::CheckpointFailed {
                cycle_index: state.cycle_index,
                error: &error,
            }),
        }
    }

    /// Emit the final document and discard the checkpoint.
    fn finish(&self, sink: &dyn DocumentSink) -> Result<RefinementOutcome, EngineError> {
        let Phase::Terminated(termination) = self.phase else {
            return Err(EngineError::Phase(self.phase));
        };
        let Some(state) = self.state.as_ref() else {
            return Err(EngineError::Phase(self.phase));
        };

        sink.write(&state.document).map_err(EngineError::Output)?;
        if let Err(e) = self.checkpoint.delete() {
            warn!("{e}");
        }

        Ok(RefinementOutcome {
            document: state.document.clone(),
            termination,
            cycle_index: state.cycle_index,
            cycles_run: self.cycles_run,
            resumed: self.resumed,
        })
    }
}
