//! Snapshot validation.
//!
//! Field rules mirror what the wizard enforces before it lets a user move
//! on: a name, well-formed contact details, and at least one skill. Optional
//! fields are only checked when present.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::Snapshot;

// ── Patterns ─────────────────────────────────────────────────

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex compile"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+]?[1-9][\d\s()-]{8,}$").expect("static regex compile"));

/// Minimum length of the full name after trimming.
pub const MIN_NAME_LENGTH: usize = 2;

// ── Rules ────────────────────────────────────────────────────

/// Rules a field can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    Required,
    MinLength,
    Email,
    Phone,
}

impl Rule {
    /// Message shown to the user.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Required => "This field is required".to_string(),
            Self::MinLength => format!("Minimum {MIN_NAME_LENGTH} characters required"),
            Self::Email => "Please enter a valid email address".to_string(),
            Self::Phone => "Please enter a valid phone number (e.g., +1 234 567 8900)".to_string(),
        }
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub rule: Rule,
    pub message: String,
}

/// Outcome of [`validate_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    fn push(&mut self, field: &'static str, rule: Rule) {
        self.errors.push(FieldError {
            field,
            rule,
            message: rule.message(),
        });
    }

    /// Errors for one field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.field == field)
    }
}

/// Check an email address. Empty is accepted.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    value.is_empty() || EMAIL.is_match(value)
}

/// Check a phone number after removing spaces, dashes and parentheses.
/// Empty is accepted.
#[must_use]
pub fn is_valid_phone(value: &str) -> bool {
    if value.trim().is_empty() {
        return true;
    }
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();
    PHONE.is_match(&cleaned)
}

/// Validate a snapshot against the wizard's rules.
#[must_use]
pub fn validate_snapshot(snapshot: &Snapshot) -> ValidationReport {
    let mut report = ValidationReport::default();
    let personal = &snapshot.personal;

    let name = personal.full_name.trim();
    if name.is_empty() {
        report.push("fullName", Rule::Required);
    } else if name.chars().count() < MIN_NAME_LENGTH {
        report.push("fullName", Rule::MinLength);
    }

    if !is_valid_email(&personal.email) {
        report.push("email", Rule::Email);
    }
    if !is_valid_phone(&personal.phone) {
        report.push("phone", Rule::Phone);
    }

    if !snapshot.skills.iter().any(|s| !s.trim().is_empty()) {
        report.push("skills", Rule::Required);
    }

    report.is_valid = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.personal.full_name = "Ada Lovelace".into();
        snapshot.personal.email = "ada@example.com".into();
        snapshot.personal.phone = "+44 (20) 7946-0018".into();
        snapshot.skills = vec!["maths".into()];
        snapshot
    }

    #[test]
    fn test_valid_snapshot() {
        let report = validate_snapshot(&valid());
        assert!(report.is_valid, "{report:?}");
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email(""));
        assert!(!is_valid_email(" ada@example.com "));
        assert!(!is_valid_email("ada@example.com "));
        assert!(!is_valid_email(" "));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada lovelace@example.com"));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone(""));
        assert!(is_valid_phone("+1 234 567 8900"));
        // Local numbers with a trunk zero do not pass.
        assert!(!is_valid_phone("(020) 7946-0018"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("+0 234 567 8900"));
    }

    #[test]
    fn test_name_rules() {
        let mut snapshot = valid();
        snapshot.personal.full_name = "  ".into();
        let report = validate_snapshot(&snapshot);
        assert_eq!(report.for_field("fullName").next().unwrap().rule, Rule::Required);

        snapshot.personal.full_name = " A ".into();
        let report = validate_snapshot(&snapshot);
        assert_eq!(report.for_field("fullName").next().unwrap().rule, Rule::MinLength);
    }

    #[test]
    fn test_skills_required() {
        let mut snapshot = valid();
        snapshot.skills = vec![" ".into()];
        let report = validate_snapshot(&snapshot);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "skills");
    }

    #[test]
    fn test_multiple_errors_reported() {
        let mut snapshot = valid();
        snapshot.personal.email = "nope".into();
        snapshot.personal.phone = "123".into();
        let report = validate_snapshot(&snapshot);
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["email", "phone"]);
    }
}
