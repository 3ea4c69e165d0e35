//! End-to-end runs through the public API: interrupt, resume, emit.

use redraft_rs::prelude::*;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, CompletionFailure>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String, CompletionFailure>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn send<'a>(&'a self, request: &'a CompletionRequest) -> redraft_rs::api::CompletionFuture<'a> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionFailure::blocked("script exhausted")))
        })
    }
}

const DRAFT: &str = "\
Here is the draft you asked for.

## Title
Thermal Limits of Widgets

## Abstract
We measure widgets.

## Introduction

## Conclusion
Widgets have limits.
";

fn titles() -> [&'static str; 4] {
    ["Title", "Abstract", "Introduction", "Conclusion"]
}

fn plan(verdict: Verdict, sections: &[(&str, &str)]) -> Result<String, CompletionFailure> {
    let mut plan = RefinementPlan::new(verdict);
    for (title, content) in sections {
        plan = plan.with_section(*title, *content);
    }
    // Reviewers usually wrap their JSON in prose and a fence.
    Ok(format!(
        "Review complete.\n```json\n{}\n```\nLet me know if anything else is needed.",
        serde_json::to_string_pretty(&plan).unwrap()
    ))
}

async fn run_once(
    client: &ScriptedClient,
    output: &Path,
) -> Result<RefinementOutcome, EngineError> {
    let config = EngineConfig::default()
        .with_titles(titles())
        .with_max_refinements(6)
        .with_confidence_threshold(2);
    let mut engine = RefinementEngine::new(
        client,
        config,
        PromptSet::default(),
        PromptContext::new("Characterise widget thermal limits.").with_language("English"),
        CheckpointManager::for_output(output),
        &NoopHandler,
    )?;
    let out = output.to_path_buf();
    let sink = move |doc: &Document| {
        std::fs::write(&out, doc.to_markdown()).map_err(|e| e.to_string())
    };
    engine.run(&sink).await
}

#[tokio::test]
async fn interrupted_run_resumes_at_last_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("widgets.md");
    let checkpoint = CheckpointManager::for_output(&output);

    // First run: draft, one applied cycle, then the service gives up.
    let first = ScriptedClient::new(vec![
        Ok(DRAFT.to_string()),
        plan(
            Verdict::SignificantImprovementsRequired,
            &[("Introduction", "Widgets heat up under load.")],
        ),
        Err(CompletionFailure::transient("HTTP 503 after retries")),
    ]);
    let err = run_once(&first, &output).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Completion(CompletionFailure::Transient { .. })
    ));
    assert!(!output.exists());

    let saved = checkpoint.load().expect("checkpoint kept after abort");
    assert_eq!(saved.cycle_index, 1);
    assert_eq!(
        saved.document.get("Introduction"),
        Some("Widgets heat up under load.")
    );

    // Second run: no drafting, picks up the rewritten introduction.
    let second = ScriptedClient::new(vec![
        plan(Verdict::NoFurtherImprovementsNeeded, &[]),
        plan(Verdict::NoFurtherImprovementsNeeded, &[]),
    ]);
    let outcome = run_once(&second, &output).await.unwrap();

    assert!(outcome.resumed);
    assert_eq!(outcome.termination, Termination::Confident);
    assert_eq!(outcome.cycle_index, 3);
    assert_eq!(outcome.cycles_run, 2);

    let requests = second.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests
            .iter()
            .all(|r| r.mode == ResponseMode::StructuredOnly)
    );
    assert!(requests[0].prompt.contains("Widgets heat up under load."));

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("## Title\nThermal Limits of Widgets\n"));
    assert!(written.contains("## Introduction\nWidgets heat up under load.\n"));
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn unknown_and_duplicate_sections_do_not_disturb_layout() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("widgets.md");

    let client = ScriptedClient::new(vec![
        Ok(DRAFT.to_string()),
        plan(
            Verdict::MinorImprovementsSuggested,
            &[
                ("Appendix A", "raw data"),
                ("Conclusion", "first try"),
                ("Conclusion", "Widgets have well-defined limits."),
            ],
        ),
        plan(Verdict::NoFurtherImprovementsNeeded, &[]),
        plan(Verdict::NoFurtherImprovementsNeeded, &[]),
    ]);
    let outcome = run_once(&client, &output).await.unwrap();

    let order: Vec<&str> = outcome.document.titles().collect();
    assert_eq!(order, titles());
    assert_eq!(
        outcome.document.get("Conclusion"),
        Some("Widgets have well-defined limits.")
    );
    assert!(!std::fs::read_to_string(&output).unwrap().contains("Appendix A"));
}
