//! The boundary between the refinement engine and the text-generation service.
//!
//! The engine only ever talks to a [`CompletionClient`]: it hands over a
//! [`CompletionRequest`] and gets back either the generated text or a
//! classified [`CompletionFailure`]. Retries happen behind this trait, so by
//! the time a failure reaches the engine it is final.

use futures::future::BoxFuture;
use thiserror::Error;

/// How the service should shape its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Unconstrained text (drafting).
    FreeForm,
    /// Structured output only, constrained to the refinement plan schema.
    StructuredOnly,
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System instruction sent ahead of the prompt.
    pub system: String,
    /// The prompt text.
    pub prompt: String,
    pub mode: ResponseMode,
}

impl CompletionRequest {
    pub fn free_form(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            mode: ResponseMode::FreeForm,
        }
    }

    pub fn structured(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            mode: ResponseMode::StructuredOnly,
        }
    }
}

/// Coarse failure classes, as seen across the completion boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Blocked,
    Empty,
}

/// A classified completion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionFailure {
    /// Network fault, timeout, rate limit, or 5xx. Retried with backoff; once
    /// this reaches the caller, every attempt has been used.
    #[error("transient failure after {attempts} attempt(s): {detail}")]
    Transient { detail: String, attempts: u32 },
    /// Content-policy rejection or malformed request. Never retried.
    #[error("request blocked: {reason}")]
    Blocked { reason: String },
    /// The service answered but produced no text.
    #[error("empty response: {detail}")]
    Empty { detail: String },
}

impl CompletionFailure {
    /// A single-attempt transient failure.
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient {
            detail: detail.into(),
            attempts: 1,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked {
            reason: reason.into(),
        }
    }

    pub fn empty(detail: impl Into<String>) -> Self {
        Self::Empty {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient { .. } => FailureKind::Transient,
            Self::Blocked { .. } => FailureKind::Blocked,
            Self::Empty { .. } => FailureKind::Empty,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// Boxed future returned by [`CompletionClient::send`].
pub type CompletionFuture<'a> = BoxFuture<'a, Result<String, CompletionFailure>>;

/// Sends prompts to a text-generation service.
///
/// Implementations own their retry policy. A returned
/// [`CompletionFailure::Transient`] means retries are exhausted.
pub trait CompletionClient: Send + Sync {
    fn send<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_mode() {
        assert_eq!(
            CompletionRequest::free_form("sys", "draft").mode,
            ResponseMode::FreeForm
        );
        assert_eq!(
            CompletionRequest::structured("sys", "review").mode,
            ResponseMode::StructuredOnly
        );
    }

    #[test]
    fn failure_kinds() {
        assert_eq!(
            CompletionFailure::transient("timed out").kind(),
            FailureKind::Transient
        );
        assert_eq!(
            CompletionFailure::blocked("SAFETY").kind(),
            FailureKind::Blocked
        );
        assert_eq!(CompletionFailure::empty("no parts").kind(), FailureKind::Empty);
        assert!(!CompletionFailure::blocked("x").is_transient());
    }

    #[test]
    fn failure_display_includes_detail() {
        let err = CompletionFailure::Transient {
            detail: "HTTP 503".into(),
            attempts: 4,
        };
        assert_eq!(
            err.to_string(),
            "transient failure after 4 attempt(s): HTTP 503"
        );
        assert_eq!(
            CompletionFailure::blocked("content_filter").to_string(),
            "request blocked: content_filter"
        );
    }
}
