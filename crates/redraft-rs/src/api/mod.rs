//! API interaction layer: the completion boundary, the OpenRouter client, and retry.
//!
//! - [`completion`]: the [`CompletionClient`] trait the engine talks to, plus
//!   [`CompletionRequest`], [`ResponseMode`], and the classified
//!   [`CompletionFailure`].
//! - [`openrouter`]: HTTP implementation over the OpenRouter chat completions
//!   API, with multi-part response assembly and policy-rejection detection.
//! - [`retry`]: bounded exponential backoff with jitter and an injectable
//!   [`Sleeper`](retry::Sleeper). Never retries blocked or empty responses.

pub mod completion;
pub mod openrouter;
pub mod retry;

// Re-export commonly used items at the module level.
pub use completion::{
    CompletionClient, CompletionFailure, CompletionFuture, CompletionRequest, FailureKind,
    ResponseMode,
};
pub use openrouter::{ClientConfig, OpenRouterClient};
pub use retry::{RetryConfig, Sleeper, TokioSleeper};
