//! Fix-suggestion stage: fills in missing remediation advice

use async_trait::async_trait;
use guardian_core::event::payload;
use guardian_core::{Agent, AgentCore, CorrelationId, Finding};
use serde_json::json;

pub const FIX_SUGGESTION_AGENT_ID: &str = "fix_suggestion_agent";
pub const FIX_SUGGESTION_AGENT_NAME: &str = "FixSuggestionAgent";

const FIX_TEMPLATES: &[(&str, &str)] = &[
    (
        "HardcodedEmail",
        "Move personal email addresses out of source code into configuration or a user store",
    ),
    (
        "HardcodedSecret",
        "Remove the secret from source code, rotate it and load it from a secret manager",
    ),
    (
        "InsecureConnection",
        "Use HTTPS/TLS for every connection that carries personal data",
    ),
    (
        "ConsoleLogPII",
        "Remove personal data from log statements or mask it before logging",
    ),
    (
        "MissingConsent",
        "Collect and record explicit user consent before processing personal data",
    ),
    (
        "DataRetention",
        "Define a retention period and delete personal data once it expires",
    ),
    (
        "AIDiscoveredViolation",
        "Review the flagged code with your privacy officer and apply data minimisation",
    ),
];

const DEFAULT_FIX: &str = "Review this code for privacy compliance and minimise personal data processing";

/// Template for `violation_type`, or the generic advice
pub fn template_for(violation_type: &str) -> &'static str {
    FIX_TEMPLATES
        .iter()
        .find(|(t, _)| *t == violation_type)
        .map(|(_, fix)| *fix)
        .unwrap_or(DEFAULT_FIX)
}

#[derive(Debug)]
pub struct FixSuggestionAgent {
    core: AgentCore,
}

impl FixSuggestionAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(FIX_SUGGESTION_AGENT_ID, FIX_SUGGESTION_AGENT_NAME),
        }
    }
}

impl Default for FixSuggestionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for FixSuggestionAgent {
    type Input = Vec<Finding>;
    type Output = Vec<Finding>;

    const FAILED_EVENT: &'static str = "FixSuggestionsFailed";

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, mut findings: Vec<Finding>, correlation_id: &CorrelationId) -> Vec<Finding> {
        let mut filled = 0usize;
        for finding in findings.iter_mut().filter(|f| f.fix_suggestion.trim().is_empty()) {
            finding.fix_suggestion = template_for(&finding.violation_type).to_string();
            filled += 1;
        }

        self.core.publish(
            "FixSuggestionsReady",
            payload(json!({"filled": filled, "total": findings.len()})),
            correlation_id,
        );
        findings
    }

    fn fallback(&self, findings: Vec<Finding>, _correlation_id: &CorrelationId) -> Vec<Finding> {
        findings
    }
}
