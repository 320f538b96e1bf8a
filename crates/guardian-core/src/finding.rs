//! Findings - the unit of work flowing through the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Severity of a privacy violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Lenient parse used for oracle and scanner text: case and surrounding
    /// whitespace are ignored, anything else is rejected.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::parse(s).ok_or_else(|| format!("unknown severity: {}", s))
    }
}

/// One detected privacy/compliance violation at a file and line.
///
/// Identity for merge purposes is `(file_path, line_number)`; two violations
/// on the same line of the same file cannot be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file_path: String,
    pub line_number: u32,
    pub violation_type: String,
    pub description: String,
    pub severity: Severity,
    pub fix_suggestion: String,
    pub regulation_reference: String,
    /// Id of the unit that produced this finding
    #[serde(alias = "agent_id")]
    pub originating_unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    /// Create a finding stamped with the current time
    pub fn new(
        file_path: impl Into<String>,
        line_number: u32,
        violation_type: impl Into<String>,
        severity: Severity,
        originating_unit: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            violation_type: violation_type.into(),
            description: String::new(),
            severity,
            fix_suggestion: String::new(),
            regulation_reference: String::new(),
            originating_unit: originating_unit.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_fix_suggestion(mut self, fix: impl Into<String>) -> Self {
        self.fix_suggestion = fix.into();
        self
    }

    pub fn with_regulation(mut self, regulation: impl Into<String>) -> Self {
        self.regulation_reference = regulation.into();
        self
    }

    /// Merge identity
    pub fn location(&self) -> (&str, u32) {
        (&self.file_path, self.line_number)
    }

    /// Convert an externally-serialised record (a plain JSON mapping) into a
    /// finding. Missing or malformed fields fall back to defaults; a missing
    /// originating unit is attributed to `default_unit`.
    pub fn from_record(record: &Value, default_unit: &str) -> Self {
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let originating_unit = record
            .get("originating_unit")
            .or_else(|| record.get("agent_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_unit)
            .to_string();

        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            file_path: text("file_path"),
            line_number: record.get("line_number").map(line_number).unwrap_or(0),
            violation_type: text("violation_type"),
            description: text("description"),
            severity: record
                .get("severity")
                .and_then(Value::as_str)
                .and_then(Severity::parse)
                .unwrap_or_default(),
            fix_suggestion: text("fix_suggestion"),
            regulation_reference: text("regulation_reference"),
            originating_unit,
            timestamp,
        }
    }

    /// Flat record form used in event payloads and analytics rows
    pub fn to_record(&self) -> Value {
        serde_json::json!({
            "file_path": self.file_path,
            "line_number": self.line_number,
            "violation_type": self.violation_type,
            "description": self.description,
            "severity": self.severity.as_str(),
            "fix_suggestion": self.fix_suggestion,
            "regulation_reference": self.regulation_reference,
            "agent_id": self.originating_unit,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

/// Read a line number from a JSON value. Accepts non-negative integers and
/// numeric strings, everything else reads as line 0.
pub fn line_number(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_parse_is_lenient() {
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse(" Medium "), Some(Severity::Medium));
        assert_eq!(Severity::parse("LOW"), Some(Severity::Low));
        assert_eq!(Severity::parse("IMMEDIATE"), None);
        assert_eq!("low".parse::<Severity>(), Ok(Severity::Low));
    }

    #[test]
    fn test_from_record_full() {
        let record = json!({
            "file_path": "src/a.js",
            "line_number": 5,
            "violation_type": "HardcodedEmail",
            "description": "Email literal",
            "severity": "HIGH",
            "fix_suggestion": "Move to config",
            "regulation_reference": "GDPR Art. 5",
            "agent_id": "privacy_scan_agent",
            "timestamp": "2025-01-02T03:04:05+00:00"
        });

        let finding = Finding::from_record(&record, "fallback");
        assert_eq!(finding.location(), ("src/a.js", 5));
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.originating_unit, "privacy_scan_agent");
        assert_eq!(finding.timestamp.to_rfc3339(), "2025-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_from_record_defaults() {
        let finding = Finding::from_record(&json!({"file_path": "b.py"}), "scan");
        assert_eq!(finding.line_number, 0);
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.originating_unit, "scan");
        assert!(finding.description.is_empty());
    }

    #[test]
    fn test_line_number_tolerates_strings_and_negatives() {
        assert_eq!(line_number(&json!("42")), 42);
        assert_eq!(line_number(&json!(-3)), 0);
        assert_eq!(line_number(&json!(null)), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_line_number_reads_numeric_strings(n in 0u32..1_000_000) {
            proptest::prop_assert_eq!(line_number(&json!(n.to_string())), n);
            proptest::prop_assert_eq!(line_number(&json!(n)), n);
        }

        #[test]
        fn prop_severity_parse_ignores_case(upper in proptest::bool::ANY) {
            for severity in [Severity::High, Severity::Medium, Severity::Low] {
                let text = if upper {
                    severity.as_str().to_string()
                } else {
                    severity.as_str().to_lowercase()
                };
                proptest::prop_assert_eq!(Severity::parse(&text), Some(severity));
            }
        }
    }

    #[test]
    fn test_record_conversion_preserves_fields() {
        let original = Finding::new("src/a.js", 5, "HardcodedEmail", Severity::Low, "scan")
            .with_description("Email literal")
            .with_regulation("CCPA");
        let back = Finding::from_record(&original.to_record(), "other");
        assert_eq!(back.location(), original.location());
        assert_eq!(back.severity, original.severity);
        assert_eq!(back.regulation_reference, "CCPA");
        assert_eq!(back.originating_unit, "scan");
    }
}
