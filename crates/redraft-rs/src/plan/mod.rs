//! Refinement plans: the structured critique-and-rewrite a reviewer returns.
//!
//! A [`RefinementPlan`] is never deserialized straight from model output.
//! [`validator::extract_and_validate`] locates the JSON object, checks it
//! field by field, and only then builds the typed plan. The serde derives
//! here describe the wire shape and feed the schema sent with
//! structured-only requests.

pub mod validator;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use validator::{ValidationError, Violation, extract_and_validate};

/// The reviewer's overall judgement of the current draft.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    SignificantImprovementsRequired,
    MinorImprovementsSuggested,
    NoFurtherImprovementsNeeded,
}

impl Verdict {
    pub const ALL: [Verdict; 3] = [
        Verdict::SignificantImprovementsRequired,
        Verdict::MinorImprovementsSuggested,
        Verdict::NoFurtherImprovementsNeeded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::SignificantImprovementsRequired => "SIGNIFICANT_IMPROVEMENTS_REQUIRED",
            Verdict::MinorImprovementsSuggested => "MINOR_IMPROVEMENTS_SUGGESTED",
            Verdict::NoFurtherImprovementsNeeded => "NO_FURTHER_IMPROVEMENTS_NEEDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }

    /// Whether this verdict counts toward the confidence threshold.
    pub fn is_final(self) -> bool {
        self == Verdict::NoFurtherImprovementsNeeded
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity class of a single finding.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    #[serde(rename = "Critical Flaw")]
    CriticalFlaw,
    #[serde(rename = "Justification Gap")]
    JustificationGap,
}

impl Classification {
    pub const ALL: [Classification; 2] =
        [Classification::CriticalFlaw, Classification::JustificationGap];

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::CriticalFlaw => "Critical Flaw",
            Classification::JustificationGap => "Justification Gap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue the reviewer found. Surfaced to the operator, never applied.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    /// Section title where the issue occurs.
    pub location: String,
    /// Short description of the problem.
    pub issue: String,
    #[serde(alias = "Issue Classification")]
    pub classification: Classification,
}

/// Replacement body for one section.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct RefinedSection {
    /// Canonical title of the section to overwrite.
    pub section_title: String,
    /// Full rewritten body.
    pub content: String,
}

impl RefinedSection {
    pub fn new(section_title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            section_title: section_title.into(),
            content: content.into(),
        }
    }
}

/// Structured output of one refinement request.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct RefinementPlan {
    #[serde(rename = "final_verdict", alias = "Final Verdict")]
    pub verdict: Verdict,
    #[serde(rename = "summary_of_findings", alias = "Summary of Findings")]
    pub findings: Vec<Finding>,
    #[serde(default, alias = "Refined Document Sections")]
    pub refined_sections: Vec<RefinedSection>,
}

impl RefinementPlan {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            findings: Vec::new(),
            refined_sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.refined_sections.push(RefinedSection::new(title, content));
        self
    }

    pub fn with_finding(
        mut self,
        location: impl Into<String>,
        issue: impl Into<String>,
        classification: Classification,
    ) -> Self {
        self.findings.push(Finding {
            location: location.into(),
            issue: issue.into(),
            classification,
        });
        self
    }
}
