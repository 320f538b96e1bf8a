//! Compliance stage: scores the finding set, passes findings through

use async_trait::async_trait;
use guardian_core::event::payload;
use guardian_core::{Agent, AgentCore, CorrelationId, Finding, Severity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

pub const COMPLIANCE_AGENT_ID: &str = "compliance_agent";
pub const COMPLIANCE_AGENT_NAME: &str = "ComplianceAgent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::PartiallyCompliant => "PARTIALLY_COMPLIANT",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn of(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub total_findings: usize,
    pub by_severity: SeverityCounts,
    pub by_regulation: BTreeMap<String, usize>,
    /// 0..=100
    pub score: u32,
    pub status: ComplianceStatus,
}

impl ComplianceSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let by_severity = SeverityCounts::of(findings);

        let mut by_regulation = BTreeMap::new();
        for finding in findings {
            for regulation in split_regulations(&finding.regulation_reference) {
                *by_regulation.entry(regulation.to_string()).or_insert(0) += 1;
            }
        }

        let penalty = 10 * by_severity.high + 5 * by_severity.medium + 2 * by_severity.low;
        let score = 100usize.saturating_sub(penalty) as u32;

        let status = if findings.is_empty() {
            ComplianceStatus::Compliant
        } else if by_severity.high > 0 {
            ComplianceStatus::NonCompliant
        } else {
            ComplianceStatus::PartiallyCompliant
        };

        Self {
            total_findings: findings.len(),
            by_severity,
            by_regulation,
            score,
            status,
        }
    }
}

/// "GDPR/CCPA" and "GDPR Art. 5, CCPA" both name two regulations
fn split_regulations(reference: &str) -> impl Iterator<Item = &str> {
    reference
        .split(|c: char| c == ',' || c == '/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[derive(Debug)]
pub struct ComplianceAgent {
    core: AgentCore,
}

impl ComplianceAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(COMPLIANCE_AGENT_ID, COMPLIANCE_AGENT_NAME),
        }
    }
}

impl Default for ComplianceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ComplianceAgent {
    type Input = Vec<Finding>;
    type Output = Vec<Finding>;

    const FAILED_EVENT: &'static str = "ComplianceAnalysisFailed";

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, findings: Vec<Finding>, correlation_id: &CorrelationId) -> Vec<Finding> {
        let summary = ComplianceSummary::from_findings(&findings);
        tracing::info!(
            agent = %self.core.id(),
            score = summary.score,
            "Compliance status: {}",
            summary.status
        );
        self.core.publish(
            "ComplianceAnalysisCompleted",
            payload(json!({"summary": summary})),
            correlation_id,
        );
        findings
    }

    fn fallback(&self, findings: Vec<Finding>, _correlation_id: &CorrelationId) -> Vec<Finding> {
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity, regulation: &str) -> Finding {
        Finding::new("a.js", 1, "HardcodedEmail", severity, "scan").with_regulation(regulation)
    }

    #[test]
    fn test_empty_set_is_compliant() {
        let summary = ComplianceSummary::from_findings(&[]);
        assert_eq!(summary.score, 100);
        assert_eq!(summary.status, ComplianceStatus::Compliant);
    }

    #[test]
    fn test_score_and_status() {
        let findings = vec![
            finding(Severity::High, "GDPR/CCPA"),
            finding(Severity::Medium, "GDPR Article 5, GDPR Article 32"),
            finding(Severity::Low, ""),
        ];
        let summary = ComplianceSummary::from_findings(&findings);
        assert_eq!(summary.score, 83);
        assert_eq!(summary.status, ComplianceStatus::NonCompliant);
        assert_eq!(summary.by_regulation.get("GDPR"), Some(&1));
        assert_eq!(summary.by_regulation.get("CCPA"), Some(&1));
        assert_eq!(summary.by_regulation.get("GDPR Article 32"), Some(&1));
        assert_eq!(summary.by_regulation.len(), 4);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let findings: Vec<_> = (0..12).map(|_| finding(Severity::High, "GDPR")).collect();
        assert_eq!(ComplianceSummary::from_findings(&findings).score, 0);

        let lows = vec![finding(Severity::Low, "CCPA")];
        assert_eq!(
            ComplianceSummary::from_findings(&lows).status,
            ComplianceStatus::PartiallyCompliant
        );
    }

    #[tokio::test]
    async fn test_process_passes_findings_through() {
        let mut agent = ComplianceAgent::new();
        let input = vec![finding(Severity::Medium, "GDPR")];
        let out = agent.process(input.clone(), &CorrelationId::new("run-1")).await;
        assert_eq!(out, input);

        let event = &agent.core().log().published()[0];
        assert_eq!(event.event_type, "ComplianceAnalysisCompleted");
        assert_eq!(event.get("summary").unwrap()["status"], json!("PARTIALLY_COMPLIANT"));
    }
}
