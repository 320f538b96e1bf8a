//! Report stage
//!
//! The report learns the compliance summary and the AI insights by consuming
//! the events earlier stages published in the same run, not through its
//! input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guardian_core::event::payload;
use guardian_core::{Agent, AgentCore, CorrelationId, Event, Finding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::compliance::{ComplianceSummary, SeverityCounts};

pub const REPORT_AGENT_ID: &str = "report_agent";
pub const REPORT_AGENT_NAME: &str = "ReportAgent";

/// Final output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyReport {
    pub correlation_id: CorrelationId,
    pub generated_at: DateTime<Utc>,
    pub total_findings: usize,
    pub by_severity: SeverityCounts,
    pub by_type: BTreeMap<String, usize>,
    pub by_file: BTreeMap<String, usize>,
    pub compliance: Option<ComplianceSummary>,
    pub ai_insights: Option<Value>,
    pub findings: Vec<Finding>,
}

impl PrivacyReport {
    pub fn build(
        correlation_id: &CorrelationId,
        findings: Vec<Finding>,
        compliance: Option<ComplianceSummary>,
        ai_insights: Option<Value>,
    ) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_file = BTreeMap::new();
        for finding in &findings {
            *by_type.entry(finding.violation_type.clone()).or_insert(0) += 1;
            *by_file.entry(finding.file_path.clone()).or_insert(0) += 1;
        }

        Self {
            correlation_id: correlation_id.clone(),
            generated_at: Utc::now(),
            total_findings: findings.len(),
            by_severity: SeverityCounts::of(&findings),
            by_type,
            by_file,
            compliance,
            ai_insights,
            findings,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Privacy Guardian Report\n");
        let _ = writeln!(out, "- Run: `{}`", self.correlation_id);
        let _ = writeln!(out, "- Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "- Findings: {}", self.total_findings);
        let _ = writeln!(
            out,
            "- Severity: {} high, {} medium, {} low",
            self.by_severity.high, self.by_severity.medium, self.by_severity.low
        );

        if let Some(compliance) = &self.compliance {
            let _ = writeln!(out, "\n## Compliance\n");
            let _ = writeln!(out, "Status **{}**, score {}/100", compliance.status, compliance.score);
            for (regulation, count) in &compliance.by_regulation {
                let _ = writeln!(out, "- {}: {}", regulation, count);
            }
        }

        if let Some(insights) = &self.ai_insights {
            let _ = writeln!(out, "\n## AI insights\n");
            match insights.get("error").and_then(Value::as_str) {
                Some(error) => {
                    let _ = writeln!(out, "_Unavailable: {}_", error);
                }
                None => {
                    let pretty = serde_json::to_string_pretty(insights)
                        .unwrap_or_else(|_| insights.to_string());
                    let _ = writeln!(out, "```json\n{}\n```", pretty);
                }
            }
        }

        if !self.findings.is_empty() {
            let _ = writeln!(out, "\n## Findings\n");
            let _ = writeln!(out, "| File | Line | Type | Severity | Regulation |");
            let _ = writeln!(out, "|---|---|---|---|---|");
            for f in &self.findings {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    f.file_path, f.line_number, f.violation_type, f.severity, f.regulation_reference
                );
            }

            let _ = writeln!(out, "\n### Details\n");
            for f in &self.findings {
                let _ = writeln!(out, "**{}:{}** {}", f.file_path, f.line_number, f.violation_type);
                let _ = writeln!(out, "- {}", f.description);
                if !f.fix_suggestion.is_empty() {
                    let _ = writeln!(out, "- Fix: {}", f.fix_suggestion);
                }
                let _ = writeln!(out);
            }
        }

        out
    }
}

#[derive(Debug)]
pub struct ReportAgent {
    core: AgentCore,
    compliance: Option<ComplianceSummary>,
    ai_insights: Option<Value>,
}

impl ReportAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(REPORT_AGENT_ID, REPORT_AGENT_NAME),
            compliance: None,
            ai_insights: None,
        }
    }
}

impl Default for ReportAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ReportAgent {
    type Input = Vec<Finding>;
    type Output = PrivacyReport;

    const FAILED_EVENT: &'static str = "ReportFailed";

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, findings: Vec<Finding>, correlation_id: &CorrelationId) -> PrivacyReport {
        let report = PrivacyReport::build(
            correlation_id,
            findings,
            self.compliance.clone(),
            self.ai_insights.clone(),
        );

        self.core.publish(
            "ReportGenerated",
            payload(json!({
                "total_findings": report.total_findings,
                "compliance_status": report.compliance.as_ref().map(|c| c.status),
                "has_ai_insights": report.ai_insights.is_some(),
            })),
            correlation_id,
        );
        report
    }

    fn fallback(&self, findings: Vec<Finding>, correlation_id: &CorrelationId) -> PrivacyReport {
        PrivacyReport::build(correlation_id, findings, self.compliance.clone(), self.ai_insights.clone())
    }

    fn consume(&mut self, event: Event) {
        match event.event_type.as_str() {
            "ComplianceAnalysisCompleted" => {
                self.compliance = event
                    .get("summary")
                    .and_then(|s| serde_json::from_value(s.clone()).ok());
            }
            "AIEnhancedFindings" => {
                self.ai_insights = event.get("ai_insights").cloned();
            }
            _ => {}
        }
        self.core.consume(event);
    }
}
