//! Extraction and field-by-field validation of refinement plans.
//!
//! Models wrap their JSON in prose or markdown fences no matter how they are
//! instructed, so extraction scans for the first balanced `{...}` span that
//! parses as a JSON object. Validation then walks a statically declared
//! schema and collects every violation with its field path. A plan is either
//! accepted whole or rejected; nothing here touches the document.

use super::{Classification, Finding, RefinedSection, RefinementPlan, Verdict};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// Wire names first, titled aliases second.
const VERDICT_KEYS: &[&str] = &["final_verdict", "Final Verdict"];
const FINDINGS_KEYS: &[&str] = &["summary_of_findings", "Summary of Findings"];
const SECTIONS_KEYS: &[&str] = &["refined_sections", "Refined Document Sections"];
const CLASSIFICATION_KEYS: &[&str] = &["classification", "Issue Classification"];

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Field path, e.g. `refined_sections[2].section_title`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Why a raw response could not be turned into a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no structured block found in response")]
    NoStructuredBlock,
    /// `path` is the first offending field; `violations` lists all of them.
    #[error("schema violation at `{path}` ({count} issue(s))", count = .violations.len())]
    SchemaViolation {
        path: String,
        violations: Vec<Violation>,
    },
}

/// Locate the plan in `raw` and validate it.
pub fn extract_and_validate(raw: &str) -> Result<RefinementPlan, ValidationError> {
    let value = find_structured_block(raw).ok_or(ValidationError::NoStructuredBlock)?;
    validate_plan(&value)
}

/// First balanced `{...}` span in `raw` that parses as a JSON object.
pub fn find_structured_block(raw: &str) -> Option<Value> {
    let bytes = raw.as_bytes();
    let mut start = 0;
    while let Some(offset) = raw.get(start..).and_then(|rest| rest.find('{')) {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open)
            && let Some(candidate) = raw.get(open..=close)
            && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate)
        {
            return Some(value);
        }
        start = open + 1;
    }
    None
}

/// Index of the `}` closing the `{` at `open`, skipping string literals.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Validate an already-parsed JSON value against the plan schema.
pub fn validate_plan(value: &Value) -> Result<RefinementPlan, ValidationError> {
    let mut check = Checker::default();
    let Some(root) = check.object(value, "$") else {
        return Err(check.into_error());
    };

    let verdict = check
        .required(root, VERDICT_KEYS, "final_verdict")
        .and_then(|v| check.string(v, "final_verdict"))
        .and_then(|s| {
            let parsed = Verdict::parse(s);
            if parsed.is_none() {
                let expected = list(Verdict::ALL.map(Verdict::as_str));
                check.fail("final_verdict", format!("expected one of {expected}, got {s:?}"));
            }
            parsed
        });

    let mut findings = Vec::new();
    if let Some(items) = check
        .required(root, FINDINGS_KEYS, "summary_of_findings")
        .and_then(|v| check.array(v, "summary_of_findings"))
    {
        for (i, item) in items.iter().enumerate() {
            let path = format!("summary_of_findings[{i}]");
            if let Some(finding) = check_finding(&mut check, item, &path) {
                findings.push(finding);
            }
        }
    }

    let mut refined_sections = Vec::new();
    match root_lookup(root, SECTIONS_KEYS) {
        None | Some(Value::Null) => {}
        Some(v) => {
            if let Some(items) = check.array(v, "refined_sections") {
                for (i, item) in items.iter().enumerate() {
                    if let Some(section) =
                        check_section(&mut check, item, &format!("refined_sections[{i}]"))
                    {
                        refined_sections.push(section);
                    }
                }
            }
        }
    }

    if !check.violations.is_empty() {
        return Err(check.into_error());
    }
    let verdict = verdict.ok_or_else(|| check.missing("final_verdict"))?;

    Ok(RefinementPlan {
        verdict,
        findings,
        refined_sections,
    })
}

fn check_finding(check: &mut Checker, item: &Value, path: &str) -> Option<Finding> {
    let obj = check.object(item, path)?;
    let location = check.required_string(obj, &["location"], &format!("{path}.location"));
    let issue = check.required_string(obj, &["issue"], &format!("{path}.issue"));

    let class_path = format!("{path}.classification");
    let classification = check
        .required_string(obj, CLASSIFICATION_KEYS, &class_path)
        .and_then(|s| {
            let parsed = Classification::parse(s);
            if parsed.is_none() {
                check.fail(
                    &class_path,
                    format!(
                        "expected one of {}, got {s:?}",
                        list(Classification::ALL.map(Classification::as_str))
                    ),
                );
            }
            parsed
        });

    Some(Finding {
        location: location?.to_string(),
        issue: issue?.to_string(),
        classification: classification?,
    })
}

fn check_section(check: &mut Checker, item: &Value, path: &str) -> Option<RefinedSection> {
    let obj = check.object(item, path)?;
    let title_path = format!("{path}.section_title");
    let title = check
        .required_string(obj, &["section_title"], &title_path)
        .and_then(|t| {
            if t.trim().is_empty() {
                check.fail(&title_path, "section title must not be empty");
                None
            } else {
                Some(t)
            }
        });
    let content = check.required_string(obj, &["content"], &format!("{path}.content"));

    Some(RefinedSection {
        section_title: title?.to_string(),
        content: content?.to_string(),
    })
}

fn root_lookup<'v>(obj: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn list<const N: usize>(names: [&str; N]) -> String {
    names.join(", ")
}

/// Accumulates violations while walking a value.
#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn fail(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    fn missing(&self, path: &str) -> ValidationError {
        ValidationError::SchemaViolation {
            path: path.to_string(),
            violations: vec![Violation {
                path: path.to_string(),
                message: "missing required field".into(),
            }],
        }
    }

    fn into_error(self) -> ValidationError {
        let path = self
            .violations
            .first()
            .map(|v| v.path.clone())
            .unwrap_or_else(|| "$".into());
        ValidationError::SchemaViolation {
            path,
            violations: self.violations,
        }
    }

    fn required<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        keys: &[&str],
        path: &str,
    ) -> Option<&'v Value> {
        match root_lookup(obj, keys) {
            None | Some(Value::Null) => {
                self.fail(path, "missing required field");
                None
            }
            Some(v) => Some(v),
        }
    }

    fn required_string<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        keys: &[&str],
        path: &str,
    ) -> Option<&'v str> {
        let value = self.required(obj, keys, path)?;
        self.string(value, path)
    }

    fn string<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v str> {
        let s = value.as_str();
        if s.is_none() {
            self.fail(path, format!("expected string, got {}", type_name(value)));
        }
        s
    }

    fn array<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v Vec<Value>> {
        let a = value.as_array();
        if a.is_none() {
            self.fail(path, format!("expected array, got {}", type_name(value)));
        }
        a
    }

    fn object<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v Map<String, Value>> {
        let o = value.as_object();
        if o.is_none() {
            self.fail(path, format!("expected object, got {}", type_name(value)));
        }
        o
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
