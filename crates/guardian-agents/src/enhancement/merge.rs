//! Oracle envelope decoding and merge onto existing findings
//!
//! Records are decoded one by one from the extracted JSON object, so a single
//! malformed entry costs only that entry. Enhancements are matched to findings
//! by line number alone: the first record for a line wins, and several
//! findings on the same line all receive that one record.

use chrono::Utc;
use guardian_core::finding::line_number;
use guardian_core::{Finding, Severity};
use serde_json::{Map, Value};

/// Violation type given to discoveries that do not name one
pub const DISCOVERED_VIOLATION_TYPE: &str = "AIDiscoveredViolation";

/// Regulation given to discoveries that do not name one
pub const DEFAULT_REGULATION: &str = "GDPR/CCPA";

/// Oracle refinement of one existing finding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnhancementRecord {
    pub line_number: u32,
    pub enhanced_description: String,
    pub risk_assessment: Option<Severity>,
    pub business_impact: String,
    pub enhanced_fix: String,
    pub regulatory_articles: Vec<String>,
    pub related_concerns: Vec<String>,
    pub compliance_priority: Option<String>,
}

impl EnhancementRecord {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            line_number: obj.get("line_number").map(line_number).unwrap_or(0),
            enhanced_description: text_field(obj, "enhanced_description"),
            risk_assessment: obj
                .get("risk_assessment")
                .and_then(Value::as_str)
                .and_then(Severity::parse),
            business_impact: text_field(obj, "business_impact"),
            enhanced_fix: text_field(obj, "enhanced_fix"),
            regulatory_articles: string_list(obj.get("regulatory_articles")),
            related_concerns: string_list(obj.get("related_concerns")),
            compliance_priority: obj
                .get("compliance_priority")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Rewrite `finding` in place. Description and fix are replaced only by
    /// non-empty text; impact and concerns are appended, never substituted.
    pub fn apply_to(&self, finding: &mut Finding) {
        if !self.enhanced_description.is_empty() {
            finding.description = self.enhanced_description.clone();
        }
        if !self.enhanced_fix.is_empty() {
            finding.fix_suggestion = self.enhanced_fix.clone();
        }
        if !self.regulatory_articles.is_empty() {
            finding.regulation_reference = self.regulatory_articles.join(", ");
        }
        if let Some(severity) = self.risk_assessment {
            finding.severity = severity;
        }

        let mut notes = Vec::new();
        if !self.business_impact.is_empty() {
            notes.push(format!("Business Impact: {}", self.business_impact));
        }
        if !self.related_concerns.is_empty() {
            notes.push(format!("Related Concerns: {}", self.related_concerns.join(", ")));
        }
        if !notes.is_empty() {
            finding.description.push_str(" | ");
            finding.description.push_str(&notes.join(" | "));
        }
    }
}

/// Oracle-reported issue absent from the scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFindingRecord {
    pub line_number: u32,
    pub violation_type: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub fix_suggestion: Option<String>,
    pub regulation_reference: Option<String>,
}

impl NewFindingRecord {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let opt_text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            line_number: obj.get("line_number").map(line_number).unwrap_or(0),
            violation_type: opt_text("violation_type"),
            description: opt_text("description"),
            severity: obj
                .get("severity")
                .and_then(Value::as_str)
                .and_then(Severity::parse),
            fix_suggestion: opt_text("fix_suggestion"),
            regulation_reference: opt_text("regulation_reference"),
        })
    }

    /// Materialise as a finding owned by `unit_id`, filling gaps with defaults
    pub fn into_finding(self, file_path: &str, unit_id: &str) -> Finding {
        Finding {
            file_path: file_path.to_string(),
            line_number: self.line_number,
            violation_type: self
                .violation_type
                .unwrap_or_else(|| DISCOVERED_VIOLATION_TYPE.to_string()),
            description: self
                .description
                .unwrap_or_else(|| "AI-detected privacy violation".to_string()),
            severity: self.severity.unwrap_or(Severity::Medium),
            fix_suggestion: self
                .fix_suggestion
                .unwrap_or_else(|| "Review and fix privacy violation".to_string()),
            regulation_reference: self
                .regulation_reference
                .unwrap_or_else(|| DEFAULT_REGULATION.to_string()),
            originating_unit: unit_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Decoded oracle reply for one file. Lives only for one merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnhancementEnvelope {
    pub enhanced_violations: Vec<EnhancementRecord>,
    pub additional_violations: Vec<NewFindingRecord>,
    pub context_analysis: Map<String, Value>,
}

impl EnhancementEnvelope {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let records = |key: &str| -> Vec<Value> {
            map.get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        Self {
            enhanced_violations: records("enhanced_violations")
                .iter()
                .filter_map(EnhancementRecord::from_value)
                .collect(),
            additional_violations: records("additional_violations")
                .iter()
                .filter_map(NewFindingRecord::from_value)
                .collect(),
            context_analysis: map
                .get("context_analysis")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// First enhancement for `line`
    pub fn enhancement_for(&self, line: u32) -> Option<&EnhancementRecord> {
        self.enhanced_violations
            .iter()
            .find(|r| r.line_number == line)
    }

    /// Enhance the group's findings in order, then append discoveries
    pub fn merge(self, mut findings: Vec<Finding>, file_path: &str, unit_id: &str) -> Vec<Finding> {
        for finding in findings.iter_mut() {
            if let Some(record) = self.enhancement_for(finding.line_number) {
                record.apply_to(finding);
            }
        }

        findings.extend(
            self.additional_violations
                .into_iter()
                .map(|record| record.into_finding(file_path, unit_id)),
        );
        findings
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Accept a list of strings or a single string
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
