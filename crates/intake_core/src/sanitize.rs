use std::collections::BTreeSet;

use regex::RegexSet;
use shared::domain::{FieldValue, FormRecord};

use crate::rules::{DefinitionError, RuleTable};

/// Markup is already escaped when the screen runs, so only URL schemes that
/// survive escaping are worth looking for.
const SUSPICIOUS_PATTERNS: [&str; 2] = [r"(?i)javascript:", r"(?i)data:text/html"];

/// Password fields are passed through untouched.
pub fn is_secret_field(field: &str) -> bool {
    field.contains("password")
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn sanitize_text(input: &str) -> String {
    escape_html(input.trim())
}

/// Trims and HTML-escapes every string value except password fields.
pub fn sanitize_record(record: &FormRecord) -> FormRecord {
    record
        .iter()
        .map(|(field, value)| {
            let cleaned = if is_secret_field(field) {
                value.clone()
            } else {
                match value {
                    FieldValue::Text(text) => FieldValue::Text(sanitize_text(text)),
                    FieldValue::List(items) => {
                        FieldValue::List(items.iter().map(|item| sanitize_text(item)).collect())
                    }
                    other => other.clone(),
                }
            };
            (field.clone(), cleaned)
        })
        .collect()
}

/// Last-line screen for script-like content in an already sanitised record.
///
/// Only free-text fields are screened. Fields whose rules include a pattern
/// have already been held to that format, and password fields are never
/// inspected.
#[derive(Debug, Clone)]
pub struct SubmissionScreen {
    patterns: RegexSet,
    exempt: BTreeSet<String>,
}

impl SubmissionScreen {
    pub fn new(rules: &RuleTable) -> Result<Self, DefinitionError> {
        Ok(Self {
            patterns: RegexSet::new(SUSPICIOUS_PATTERNS)?,
            exempt: rules
                .iter()
                .filter(|rule| rule.has_pattern())
                .map(|rule| rule.field().to_string())
                .collect(),
        })
    }

    pub fn is_screened(&self, field: &str) -> bool {
        !is_secret_field(field) && !self.exempt.contains(field)
    }

    /// First screened field (in name order) whose text trips a pattern.
    pub fn find_suspicious(&self, record: &FormRecord) -> Option<String> {
        record.iter().find_map(|(field, value)| {
            if !self.is_screened(field) {
                return None;
            }
            let hit = match value {
                FieldValue::Text(text) => self.patterns.is_match(text),
                FieldValue::List(items) => items.iter().any(|item| self.patterns.is_match(item)),
                _ => false,
            };
            hit.then(|| field.clone())
        })
    }
}
