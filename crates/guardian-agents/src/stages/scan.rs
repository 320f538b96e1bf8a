//! Scan stage: runs the rule engine and converts its records into findings

use async_trait::async_trait;
use guardian_core::event::payload;
use guardian_core::{Agent, AgentCore, CorrelationId, Finding};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::scanner::Scanner;

pub const SCAN_AGENT_ID: &str = "privacy_scan_agent";
pub const SCAN_AGENT_NAME: &str = "PrivacyScanAgent";

#[derive(Debug)]
pub struct ScanAgent {
    core: AgentCore,
    scanner: Arc<dyn Scanner>,
}

impl ScanAgent {
    pub fn new(scanner: Arc<dyn Scanner>) -> Self {
        Self {
            core: AgentCore::new(SCAN_AGENT_ID, SCAN_AGENT_NAME),
            scanner,
        }
    }
}

#[async_trait]
impl Agent for ScanAgent {
    type Input = PathBuf;
    type Output = Vec<Finding>;

    const FAILED_EVENT: &'static str = "ScanFailed";

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, project_path: PathBuf, correlation_id: &CorrelationId) -> Vec<Finding> {
        self.core.publish(
            "ScanStarted",
            payload(json!({"project_path": project_path.display().to_string()})),
            correlation_id,
        );

        match self.scanner.scan(&project_path).await {
            Ok(records) => {
                let findings: Vec<Finding> = records
                    .iter()
                    .map(|record| Finding::from_record(record, SCAN_AGENT_ID))
                    .collect();
                let scan_results: Vec<Value> = findings.iter().map(Finding::to_record).collect();

                self.core.publish(
                    "FindingsReady",
                    payload(json!({
                        "total_violations": findings.len(),
                        "scan_results": scan_results,
                    })),
                    correlation_id,
                );
                findings
            }
            Err(e) => {
                tracing::warn!(
                    agent = %self.core.id(),
                    "Scan of {} failed: {}",
                    project_path.display(),
                    e
                );
                self.core.publish(
                    Self::FAILED_EVENT,
                    payload(json!({"error": e.to_string()})),
                    correlation_id,
                );
                Vec::new()
            }
        }
    }

    fn fallback(&self, _project_path: PathBuf, _correlation_id: &CorrelationId) -> Vec<Finding> {
        Vec::new()
    }
}
