//! Configuration for the [`RefinementEngine`](super::engine::RefinementEngine).
//!
//! ```ignore
//! let config = EngineConfig::default()
//!     .with_max_refinements(5)
//!     .with_confidence_threshold(3);
//! ```

use crate::document::{DocumentError, validate_titles};

/// Section titles used when none are configured.
pub const DEFAULT_SECTION_TITLES: [&str; 8] = [
    "Title",
    "Abstract",
    "Introduction",
    "Methodology",
    "Results",
    "Discussion",
    "Conclusion",
    "Bibliography",
];

/// Loop bounds and the canonical document layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Ordered, unique section titles. Fixed for the whole run.
    pub canonical_titles: Vec<String>,
    /// Hard cap on refinement cycles. `0` emits the initial draft as-is.
    pub max_refinements: u32,
    /// Consecutive "no further improvements" cycles needed to stop early.
    pub confidence_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canonical_titles: DEFAULT_SECTION_TITLES.iter().map(|s| s.to_string()).collect(),
            max_refinements: 10,
            confidence_threshold: 2,
        }
    }
}

impl EngineConfig {
    pub fn with_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.canonical_titles = titles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_refinements(mut self, n: u32) -> Self {
        self.max_refinements = n;
        self
    }

    pub fn with_confidence_threshold(mut self, n: u32) -> Self {
        self.confidence_threshold = n;
        self
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), String> {
        validate_titles(&self.canonical_titles).map_err(|e: DocumentError| e.to_string())?;
        if self.confidence_threshold == 0 {
            return Err("confidence_threshold must be at least 1".into());
        }
        Ok(())
    }
}
