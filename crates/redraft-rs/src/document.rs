//! The working document: canonical sections in a fixed order.
//!
//! A [`Document`] is created once from the canonical title list and never
//! gains, loses, or reorders sections afterwards. Refinement plans only ever
//! overwrite bodies through [`Document::apply`].

use crate::plan::RefinedSection;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// One named section. The body is opaque text.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub content: String,
}

impl Section {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Problems with a title list or a section snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("canonical title list is empty")]
    NoTitles,
    #[error("canonical title list contains an empty title")]
    EmptyTitle,
    #[error("duplicate canonical title: {0}")]
    DuplicateTitle(String),
    #[error("section titles {found:?} do not match canonical titles {expected:?}")]
    TitleMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Check that a canonical title list is usable.
pub fn validate_titles(titles: &[String]) -> Result<(), DocumentError> {
    if titles.is_empty() {
        return Err(DocumentError::NoTitles);
    }
    let mut seen = HashSet::new();
    for title in titles {
        if title.trim().is_empty() {
            return Err(DocumentError::EmptyTitle);
        }
        if !seen.insert(title.as_str()) {
            return Err(DocumentError::DuplicateTitle(title.clone()));
        }
    }
    Ok(())
}

/// What one [`Document::apply`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    /// Titles whose body changed, in canonical order.
    pub updated: Vec<String>,
    /// Titles in the plan that are not canonical. Ignored.
    pub unknown_titles: Vec<String>,
    /// Titles that appeared again later in the plan; the earlier entries lost.
    pub superseded: Vec<String>,
}

impl ApplyResult {
    /// Whether any section body changed byte-for-byte.
    pub fn changed(&self) -> bool {
        !self.updated.is_empty()
    }
}

/// Ordered canonical sections.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Document {
    sections: Vec<Section>,
}

impl Document {
    /// A document with every canonical title and empty bodies.
    pub fn new(canonical_titles: &[String]) -> Result<Self, DocumentError> {
        validate_titles(canonical_titles)?;
        Ok(Self {
            sections: canonical_titles
                .iter()
                .map(|t| Section::new(t.clone(), String::new()))
                .collect(),
        })
    }

    /// Rebuild a document from a snapshot, which must carry exactly the
    /// canonical titles in canonical order.
    pub fn from_sections(
        canonical_titles: &[String],
        sections: Vec<Section>,
    ) -> Result<Self, DocumentError> {
        validate_titles(canonical_titles)?;
        let matches = sections.len() == canonical_titles.len()
            && sections
                .iter()
                .zip(canonical_titles)
                .all(|(s, t)| &s.title == t);
        if !matches {
            return Err(DocumentError::TitleMismatch {
                expected: canonical_titles.to_vec(),
                found: sections.into_iter().map(|s| s.title).collect(),
            });
        }
        Ok(Self { sections })
    }

    /// Build a document from a markdown draft split on `## ` headings.
    ///
    /// Returns the document and the non-canonical headings that were dropped.
    /// Missing canonical sections stay empty; a repeated heading keeps its
    /// last body.
    pub fn from_markdown(
        canonical_titles: &[String],
        text: &str,
    ) -> Result<(Self, Vec<String>), DocumentError> {
        let mut doc = Self::new(canonical_titles)?;
        let mut entries: Vec<RefinedSection> = Vec::new();
        let mut current: Option<(String, Vec<&str>)> = None;
        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                if let Some((title, body)) = current.take() {
                    entries.push(RefinedSection::new(title, body.join("\n").trim()));
                }
                current = Some((heading.trim().to_string(), Vec::new()));
            } else if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some((title, body)) = current {
            entries.push(RefinedSection::new(title, body.join("\n").trim()));
        }

        let result = doc.apply(&entries);
        Ok((doc, result.unknown_titles))
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.title.as_str())
    }

    /// Body of the section with this title.
    pub fn get(&self, title: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Merge rewritten sections by title.
    ///
    /// Canonical titles are overwritten in place; unknown titles are skipped
    /// and reported; for repeated titles the last entry wins.
    pub fn apply(&mut self, refined: &[RefinedSection]) -> ApplyResult {
        let mut result = ApplyResult::default();
        let index: HashMap<&str, usize> = self
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.title.as_str(), i))
            .collect();

        // Last entry per section index wins.
        let mut winners: HashMap<usize, &str> = HashMap::new();
        for entry in refined {
            let title = entry.section_title.trim();
            match index.get(title) {
                Some(&i) => {
                    if winners.insert(i, entry.content.as_str()).is_some() {
                        result.superseded.push(title.to_string());
                    }
                }
                None => result.unknown_titles.push(entry.section_title.clone()),
            }
        }

        for (i, section) in self.sections.iter_mut().enumerate() {
            if let Some(content) = winners.get(&i)
                && section.content != *content
            {
                section.content = (*content).to_string();
                result.updated.push(section.title.clone());
            }
        }
        result
    }

    /// Render as markdown with one `## ` heading per section.
    pub fn to_markdown(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("## {}\n{}\n", s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
