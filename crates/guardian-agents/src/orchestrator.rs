//! Pipeline orchestrator
//!
//! Runs Scan → Enhance → Compliance → Fix-Suggestion → Report under one
//! correlation id. Every run builds its own stage instances, so event logs
//! and finding lists never leak between runs and a single [`Pipeline`] can
//! serve concurrent runs.

use guardian_core::event::payload;
use guardian_core::{
    Agent, AgentStatus, ConfigError, CorrelationId, Event, Finding, GuardianConfig, Ports,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::enhancement::EnhancementAgent;
use crate::oracle::{build_oracle, OracleClient};
use crate::scanner::{CommandScanner, Scanner};
use crate::stages::{ComplianceAgent, FixSuggestionAgent, PrivacyReport, ReportAgent, ScanAgent};

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub correlation_id: CorrelationId,
    pub findings: Vec<Finding>,
    pub report: PrivacyReport,
    /// Every event of the run, in publish order
    pub events: Vec<Event>,
    pub statuses: Vec<AgentStatus>,
}

impl PipelineRun {
    pub fn events_of<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }
}

/// Fresh stage instances for one run
#[derive(Debug)]
struct Stages {
    scan: ScanAgent,
    enhancement: EnhancementAgent,
    compliance: ComplianceAgent,
    fix_suggestion: FixSuggestionAgent,
    report: ReportAgent,
}

impl Stages {
    fn statuses(&self) -> Vec<AgentStatus> {
        vec![
            self.scan.status(),
            self.enhancement.status(),
            self.compliance.status(),
            self.fix_suggestion.status(),
            self.report.status(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: GuardianConfig,
    scanner: Arc<dyn Scanner>,
    oracle: Arc<dyn OracleClient>,
    ports: Ports,
}

impl Pipeline {
    /// Fails only on an invalid configuration
    pub fn new(
        config: GuardianConfig,
        scanner: Arc<dyn Scanner>,
        oracle: Arc<dyn OracleClient>,
        ports: Ports,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            scanner,
            oracle,
            ports,
        })
    }

    /// Wire the command scanner and the configured oracle
    pub async fn from_config(config: GuardianConfig, ports: Ports) -> Result<Self, ConfigError> {
        config.validate()?;
        let scanner =
            CommandScanner::from_config(&config.pipeline).ok_or(ConfigError::Invalid {
                field: "pipeline.scanner_command",
                reason: "must name a program".to_string(),
            })?;
        let oracle = build_oracle(&config.oracle, ports.secrets.as_ref()).await;
        Self::new(config, Arc::new(scanner), oracle, ports)
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Arc<dyn OracleClient> {
        &self.oracle
    }

    fn stages(&self) -> Stages {
        Stages {
            scan: ScanAgent::new(self.scanner.clone()),
            enhancement: EnhancementAgent::new(
                self.oracle.clone(),
                self.config.enhancement.clone(),
                self.ports.clone(),
            )
            .with_analytics_table(self.config.analytics_table()),
            compliance: ComplianceAgent::new(),
            fix_suggestion: FixSuggestionAgent::new(),
            report: ReportAgent::new(),
        }
    }

    /// Status of every unit as a freshly built pipeline would report it
    pub fn statuses(&self) -> Vec<AgentStatus> {
        self.stages().statuses()
    }

    pub async fn run(&self, project_path: impl Into<PathBuf>) -> PipelineRun {
        self.run_with_correlation(project_path, CorrelationId::generate())
            .await
    }

    pub async fn run_with_correlation(
        &self,
        project_path: impl Into<PathBuf>,
        correlation_id: CorrelationId,
    ) -> PipelineRun {
        let project_path = project_path.into();
        let timeout = self.config.pipeline.stage_timeout();
        let mut stages = self.stages();
        let mut trail = Vec::new();

        tracing::info!(
            correlation_id = %correlation_id,
            "Starting privacy pipeline for {}",
            project_path.display()
        );

        let scanned =
            run_stage(&mut stages.scan, project_path, &correlation_id, &mut trail, timeout).await;
        let enhanced =
            run_stage(&mut stages.enhancement, scanned, &correlation_id, &mut trail, timeout).await;
        let assessed =
            run_stage(&mut stages.compliance, enhanced, &correlation_id, &mut trail, timeout).await;
        let findings =
            run_stage(&mut stages.fix_suggestion, assessed, &correlation_id, &mut trail, timeout)
                .await;
        let report = run_stage(
            &mut stages.report,
            findings.clone(),
            &correlation_id,
            &mut trail,
            timeout,
        )
        .await;

        tracing::info!(
            correlation_id = %correlation_id,
            findings = findings.len(),
            events = trail.len(),
            "Privacy pipeline finished"
        );

        PipelineRun {
            correlation_id,
            findings,
            report,
            events: trail,
            statuses: stages.statuses(),
        }
    }
}

/// Deliver the run's earlier events to `agent`, invoke it under `timeout`,
/// and append whatever it published to `trail`.
async fn run_stage<A: Agent>(
    agent: &mut A,
    input: A::Input,
    correlation_id: &CorrelationId,
    trail: &mut Vec<Event>,
    timeout: Duration,
) -> A::Output {
    for event in trail.iter() {
        agent.consume(event.clone());
    }
    let seen = agent.core().log().published().len();

    let outcome = tokio::time::timeout(timeout, agent.process(input.clone(), correlation_id)).await;
    let output = match outcome {
        Ok(output) => output,
        Err(_) => {
            let reason = format!("timed out after {}s", timeout.as_secs());
            tracing::warn!(
                agent = %agent.core().id(),
                correlation_id = %correlation_id,
                "Stage {}",
                reason
            );
            agent
                .core_mut()
                .publish(A::FAILED_EVENT, payload(json!({"error": reason})), correlation_id);
            agent.fallback(input, correlation_id)
        }
    };

    trail.extend(agent.core().log().published()[seen..].iter().cloned());
    output
}
