//! AI enhancement engine
//!
//! Groups findings by file, asks the oracle about each file with a bounded
//! prefix of its content, and merges the structured reply back onto the
//! findings. A second oracle call summarises the whole run.
//!
//! Enhancement is additive-or-identity: the input is never modified in place,
//! and any run-level failure returns it untouched.

pub mod merge;
pub mod prompt;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use guardian_core::config::EnhancementConfig;
use guardian_core::event::payload;
use guardian_core::{Agent, AgentCore, CorrelationId, EnhancementError, Finding, Ports};
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::extraction::extract_structured;
use crate::oracle::OracleClient;
use merge::EnhancementEnvelope;

pub const ENHANCEMENT_AGENT_ID: &str = "gemini_analysis_agent";
pub const ENHANCEMENT_AGENT_NAME: &str = "GeminiAnalysisAgent";

/// Enhanced finding set plus the aggregate insight payload
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub findings: Vec<Finding>,
    pub insights: Value,
}

/// Read-only part of the enhancement stage, shareable across file tasks
#[derive(Debug, Clone)]
pub struct EnhancementEngine {
    unit_id: String,
    oracle: Arc<dyn OracleClient>,
    config: EnhancementConfig,
}

impl EnhancementEngine {
    pub fn new(
        unit_id: impl Into<String>,
        oracle: Arc<dyn OracleClient>,
        config: EnhancementConfig,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            oracle,
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.oracle.is_available()
    }

    /// Enhance every file group, then run the insight pass.
    ///
    /// Only a run-fatal oracle error comes back as `Err`;
    /// everything smaller is absorbed by the file group it happened in.
    pub async fn enhance(&self, findings: &[Finding]) -> Result<Enhancement, EnhancementError> {
        let groups = group_by_file(findings);
        let concurrency = self.config.max_concurrent_files.max(1);

        let enhanced: Vec<Vec<Finding>> = stream::iter(groups)
            .map(|(file_path, group)| self.analyze_file(file_path, group))
            .buffered(concurrency)
            .try_collect()
            .await?;
        let enhanced: Vec<Finding> = enhanced.into_iter().flatten().collect();

        let insights = self.generate_insights(findings.len(), &enhanced).await;

        Ok(Enhancement {
            findings: enhanced,
            insights,
        })
    }

    /// Resolve a finding path against `source_root` when it is relative
    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = PathBuf::from(file_path);
        match &self.config.source_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }

    async fn analyze_file(
        &self,
        file_path: String,
        group: Vec<Finding>,
    ) -> Result<Vec<Finding>, EnhancementError> {
        let excerpt = match read_prefix(&self.resolve(&file_path), self.config.max_file_chars).await {
            Ok(excerpt) => excerpt,
            Err(e) => {
                tracing::warn!("Could not read {}: {} - using original violations", file_path, e);
                return Ok(group);
            }
        };
        if excerpt.is_empty() {
            return Ok(group);
        }

        let prompt_text =
            prompt::file_prompt(&file_path, &excerpt, &group, self.config.max_file_chars);
        let context = json!({
            "file_path": file_path,
            "violation_count": group.len(),
            "file_size": excerpt.chars().count(),
        });

        let answer = match self.oracle.analyze(&prompt_text, &context).await {
            Ok(Some(answer)) => answer,
            Ok(None) => return Ok(group),
            Err(e) if e.is_run_fatal() => {
                return Err(EnhancementError::Oracle {
                    file: file_path,
                    source: e,
                })
            }
            Err(e) => {
                tracing::warn!("Error analyzing {}: {} - using original violations", file_path, e);
                return Ok(group);
            }
        };

        match extract_structured(&answer) {
            Ok(map) => {
                let envelope = EnhancementEnvelope::from_map(&map);
                tracing::debug!(
                    file = %file_path,
                    enhanced = envelope.enhanced_violations.len(),
                    discovered = envelope.additional_violations.len(),
                    "Merging oracle analysis"
                );
                Ok(envelope.merge(group, &file_path, &self.unit_id))
            }
            Err(e) => {
                tracing::warn!("Unusable analysis for {}: {} - using original violations", file_path, e);
                Ok(group)
            }
        }
    }

    /// Aggregate pass over the whole run. Never fails; problems become an
    /// `{"error": ...}` marker.
    pub async fn generate_insights(&self, original_count: usize, enhanced: &[Finding]) -> Value {
        let prompt_text = prompt::insight_prompt(original_count, enhanced);
        let types: Vec<String> = prompt::violation_type_counts(enhanced)
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        let context = json!({
            "original_count": original_count,
            "enhanced_count": enhanced.len(),
            "violation_types": types,
        });

        match self.oracle.analyze(&prompt_text, &context).await {
            Ok(Some(answer)) => match extract_structured(&answer) {
                Ok(map) => Value::Object(map),
                Err(_) => json!({"error": "Failed to parse AI insights"}),
            },
            Ok(None) => json!({"error": "Failed to generate AI insights"}),
            Err(e) => {
                tracing::warn!("Error generating comprehensive insights: {}", e);
                json!({"error": format!("Insights generation failed: {}", e)})
            }
        }
    }
}

/// First `max_chars` characters of a UTF-8 file. At most four bytes per
/// character are read, so large files are never loaded whole.
pub async fn read_prefix(path: &Path, max_chars: usize) -> io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut bytes = Vec::new();
    file.take(max_chars.saturating_mul(4) as u64)
        .read_to_end(&mut bytes)
        .await?;

    // A trailing multi-byte character cut off by the byte budget is dropped.
    let valid = match std::str::from_utf8(&bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
    };
    bytes.truncate(valid);
    let text = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(prompt::truncate_chars(&text, max_chars).to_string())
}

/// Partition by `file_path`, keeping first-appearance order of files and the
/// input order within each file.
pub fn group_by_file(findings: &[Finding]) -> Vec<(String, Vec<Finding>)> {
    let mut groups: Vec<(String, Vec<Finding>)> = Vec::new();
    for finding in findings {
        match groups.iter_mut().find(|(path, _)| *path == finding.file_path) {
            Some((_, group)) => group.push(finding.clone()),
            None => groups.push((finding.file_path.clone(), vec![finding.clone()])),
        }
    }
    groups
}

/// Enhancement stage: scan findings in, enriched findings out
#[derive(Debug)]
pub struct EnhancementAgent {
    core: AgentCore,
    engine: EnhancementEngine,
    analytics_table: String,
    metric_name: String,
    ports: Ports,
    last_insights: Option<Value>,
}

impl EnhancementAgent {
    pub fn new(oracle: Arc<dyn OracleClient>, config: EnhancementConfig, ports: Ports) -> Self {
        let core = AgentCore::new(ENHANCEMENT_AGENT_ID, ENHANCEMENT_AGENT_NAME)
            .with_ai(oracle.is_available());
        let analytics_table = config.analytics_table.clone();
        let metric_name = config.metric_name.clone();

        Self {
            core,
            engine: EnhancementEngine::new(ENHANCEMENT_AGENT_ID, oracle, config),
            analytics_table,
            metric_name,
            ports,
            last_insights: None,
        }
    }

    pub fn engine(&self) -> &EnhancementEngine {
        &self.engine
    }

    /// Destination table for the enhanced finding set
    pub fn with_analytics_table(mut self, table: impl Into<String>) -> Self {
        self.analytics_table = table.into();
        self
    }

    /// Insight payload of the last successful run
    pub fn last_insights(&self) -> Option<&Value> {
        self.last_insights.as_ref()
    }

    fn skip(&mut self, reason: &str, correlation_id: &CorrelationId) {
        tracing::warn!("{} - returning original results", reason);
        self.core.publish(
            "AIAnalysisSkipped",
            payload(json!({"reason": reason, "fallback": "original_results"})),
            correlation_id,
        );
    }

    async fn record_side_channels(&self, findings: &[Finding]) {
        let rows: Vec<Value> = findings.iter().map(Finding::to_record).collect();
        if !self
            .ports
            .analytics
            .insert_rows(&self.analytics_table, &rows)
            .await
        {
            tracing::warn!("Enhanced results were not written to {}", self.analytics_table);
        }

        self.ports.metrics.export_gauge(
            &self.metric_name,
            findings.len() as f64,
            &[("agent", self.core.id())],
        );
    }
}

#[async_trait]
impl Agent for EnhancementAgent {
    type Input = Vec<Finding>;
    type Output = Vec<Finding>;

    const FAILED_EVENT: &'static str = "AIAnalysisFailed";

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, input: Vec<Finding>, correlation_id: &CorrelationId) -> Vec<Finding> {
        if input.is_empty() {
            self.skip("no findings to enhance", correlation_id);
            return input;
        }
        if !self.engine.is_available() {
            self.skip("Gemini not available", correlation_id);
            return input;
        }

        self.core.publish(
            "AIAnalysisStarted",
            payload(json!({
                "total_violations": input.len(),
                "agent": ENHANCEMENT_AGENT_NAME,
            })),
            correlation_id,
        );

        match self.engine.enhance(&input).await {
            Ok(Enhancement { findings, insights }) => {
                // Side channels finish before the terminal event, so a stage
                // timeout can never follow a published success.
                self.record_side_channels(&findings).await;

                let records: Vec<Value> = findings.iter().map(Finding::to_record).collect();
                self.core.publish(
                    "AIEnhancedFindings",
                    payload(json!({
                        "original_violations": input.len(),
                        "enhanced_violations": findings.len(),
                        "ai_enhancements": findings.len() as i64 - input.len() as i64,
                        "ai_insights": insights.clone(),
                        "enhanced_results": records,
                        "gemini_enhanced": true,
                    })),
                    correlation_id,
                );
                tracing::info!(
                    agent = %self.core.id(),
                    "AI analysis completed: {} enhanced violations",
                    findings.len()
                );

                self.last_insights = Some(insights);
                findings
            }
            Err(e) => {
                tracing::error!(
                    agent = %self.core.id(),
                    correlation_id = %correlation_id,
                    "AI analysis failed: {} - returning original results",
                    e
                );
                self.core.publish(
                    Self::FAILED_EVENT,
                    payload(json!({"error": e.to_string(), "fallback": "original_results"})),
                    correlation_id,
                );
                input
            }
        }
    }

    fn fallback(&self, input: Vec<Finding>, _correlation_id: &CorrelationId) -> Vec<Finding> {
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::DisabledOracle;
    use guardian_core::{OracleError, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Oracle replaying canned answers in call order
    #[derive(Debug)]
    struct ScriptedOracle {
        answers: Mutex<Vec<Result<Option<String>, OracleError>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(answers: Vec<Result<Option<String>, OracleError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OracleClient for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn analyze(&self, prompt: &str, _context: &Value) -> Result<Option<String>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Ok(None)
            } else {
                answers.remove(0)
            }
        }
    }

    fn source_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn finding(path: &str, line: u32) -> Finding {
        Finding::new(path, line, "HardcodedEmail", Severity::Medium, "privacy_scan_agent")
            .with_description("Email literal")
    }

    fn published_types(agent: &EnhancementAgent) -> Vec<String> {
        agent
            .core()
            .log()
            .published()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let findings = vec![finding("b.js", 1), finding("a.js", 2), finding("b.js", 3)];
        let groups = group_by_file(&findings);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b.js");
        assert_eq!(
            groups[0].1.iter().map(|f| f.line_number).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(groups[1].0, "a.js");
    }

    #[tokio::test]
    async fn test_unavailable_oracle_skips() {
        let mut agent = EnhancementAgent::new(
            Arc::new(DisabledOracle::new("no key")),
            EnhancementConfig::default(),
            Ports::noop(),
        );
        let input = vec![finding("a.js", 5)];
        let out = agent.process(input.clone(), &CorrelationId::new("run-1")).await;

        assert_eq!(out, input);
        assert_eq!(published_types(&agent), vec!["AIAnalysisSkipped"]);
        assert!(!agent.status().ai_available);
    }

    #[tokio::test]
    async fn test_empty_input_skips_without_oracle_call() {
        let oracle = ScriptedOracle::new(vec![]);
        let mut agent = EnhancementAgent::new(oracle.clone(), EnhancementConfig::default(), Ports::noop());
        let out = agent.process(Vec::new(), &CorrelationId::new("run-1")).await;

        assert!(out.is_empty());
        assert_eq!(oracle.call_count(), 0);
        let skipped = &agent.core().log().published()[0];
        assert_eq!(skipped.get("reason"), Some(&json!("no findings to enhance")));
    }

    #[tokio::test]
    async fn test_unreadable_file_keeps_group() {
        let oracle = ScriptedOracle::new(vec![]);
        let mut agent = EnhancementAgent::new(oracle.clone(), EnhancementConfig::default(), Ports::noop());
        let input = vec![finding("/definitely/not/here.js", 5)];
        let out = agent.process(input.clone(), &CorrelationId::new("run-1")).await;

        assert_eq!(out, input);
        // Only the insight pass reaches the oracle.
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(
            published_types(&agent),
            vec!["AIAnalysisStarted", "AIEnhancedFindings"]
        );
        assert_eq!(
            agent.last_insights(),
            Some(&json!({"error": "Failed to generate AI insights"}))
        );
    }

    #[tokio::test]
    async fn test_prompt_carries_truncated_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = source_file(&dir, "big.js", &format!("{}TAIL", "x".repeat(50)));
        let oracle = ScriptedOracle::new(vec![Ok(None)]);
        let config = EnhancementConfig {
            max_file_chars: 50,
            ..EnhancementConfig::default()
        };
        let engine = EnhancementEngine::new(ENHANCEMENT_AGENT_ID, oracle.clone(), config);

        engine.enhance(&[finding(&path, 1)]).await.unwrap();

        let prompts = oracle.prompts.lock().unwrap();
        assert!(prompts[0].contains(&"x".repeat(50)));
        assert!(!prompts[0].contains("TAIL"));
    }

    #[tokio::test]
    async fn test_read_prefix_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let accented = source_file(&dir, "accented.js", &format!("a{}", "é".repeat(50)));
        assert_eq!(read_prefix(Path::new(&accented), 2).await.unwrap(), "aé");
        // 4 bytes of budget end in the middle of the third character
        assert_eq!(read_prefix(Path::new(&accented), 1).await.unwrap(), "a");

        let large = source_file(&dir, "large.js", &"x".repeat(1 << 20));
        assert_eq!(read_prefix(Path::new(&large), 10).await.unwrap(), "x".repeat(10));

        let short = source_file(&dir, "short.js", "ok");
        assert_eq!(read_prefix(Path::new(&short), 4000).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_read_prefix_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.js");
        std::fs::write(&path, b"ab\xffcd").unwrap();
        let err = read_prefix(&path, 100).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_local_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = source_file(&dir, "a.js", "const email = 'a@b.c';\n");
        let b = source_file(&dir, "b.js", "console.log(user);\n");
        let oracle = ScriptedOracle::new(vec![
            Ok(Some("no json here".into())),
            Ok(Some(
                r#"{"enhanced_violations": [{"line_number": 1, "risk_assessment": "HIGH"}]}"#.into(),
            )),
        ]);
        let engine = EnhancementEngine::new(ENHANCEMENT_AGENT_ID, oracle.clone(), EnhancementConfig::default());

        let input = [finding(&a, 1), finding(&b, 1)];
        let result = engine.enhance(&input).await.unwrap();

        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0], input[0]);
        assert_eq!(result.findings[1].file_path, b);
        assert_eq!(result.findings[1].severity, Severity::High);
        // Two file calls plus the insight pass
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn test_transport_error_is_local_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = source_file(&dir, "a.js", "const email = 'a@b.c';\n");
        let b = source_file(&dir, "b.js", "console.log(user);\n");
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Transport("connection reset".into())),
            Ok(Some(
                r#"{"enhanced_violations": [{"line_number": 1, "risk_assessment": "HIGH"}]}"#.into(),
            )),
        ]);
        let engine = EnhancementEngine::new(ENHANCEMENT_AGENT_ID, oracle, EnhancementConfig::default());

        let result = engine.enhance(&[finding(&a, 1), finding(&b, 1)]).await.unwrap();
        assert_eq!(result.findings[0].severity, Severity::Medium);
        assert_eq!(result.findings[1].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_rejected_oracle_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let a = source_file(&dir, "a.js", "const email = 'a@b.c';\n");
        let oracle = ScriptedOracle::new(vec![Err(OracleError::Rejected("quota exhausted".into()))]);
        let mut agent = EnhancementAgent::new(oracle, EnhancementConfig::default(), Ports::noop());

        let input = vec![finding(&a, 1)];
        let out = agent.process(input.clone(), &CorrelationId::new("run-1")).await;

        assert_eq!(out, input);
        assert_eq!(published_types(&agent), vec!["AIAnalysisStarted", "AIAnalysisFailed"]);
        let failed = &agent.core().log().published()[1];
        let reason = failed.get("error").and_then(Value::as_str).unwrap();
        assert!(reason.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_insight_markers() {
        let engine = |answers| {
            EnhancementEngine::new(
                ENHANCEMENT_AGENT_ID,
                ScriptedOracle::new(answers),
                EnhancementConfig::default(),
            )
        };
        let findings = [finding("a.js", 1)];

        let parsed = engine(vec![Ok(Some("Posture: {\"overall_assessment\": {}}".into()))])
            .generate_insights(1, &findings)
            .await;
        assert_eq!(parsed, json!({"overall_assessment": {}}));

        let garbled = engine(vec![Ok(Some("no json here".into()))])
            .generate_insights(1, &findings)
            .await;
        assert_eq!(garbled, json!({"error": "Failed to parse AI insights"}));

        let failed = engine(vec![Err(OracleError::Timeout(60))])
            .generate_insights(1, &findings)
            .await;
        assert!(failed["error"]
            .as_str()
            .unwrap()
            .starts_with("Insights generation failed:"));
    }

    #[tokio::test]
    async fn test_success_writes_analytics() {
        let dir = tempfile::tempdir().unwrap();
        let a = source_file(&dir, "a.js", "const email = 'a@b.c';\n");
        let analytics = tempfile::tempdir().unwrap();
        let ports = Ports::noop().with_analytics(Arc::new(
            guardian_core::ports::JsonlAnalyticsSink::new(analytics.path()),
        ));
        let oracle = ScriptedOracle::new(vec![Ok(Some(
            r#"{"additional_violations": [{"line_number": 2}]}"#.into(),
        ))]);
        let mut agent = EnhancementAgent::new(oracle, EnhancementConfig::default(), ports);

        let out = agent.process(vec![finding(&a, 1)], &CorrelationId::new("run-1")).await;
        assert_eq!(out.len(), 2);

        let rows = std::fs::read_to_string(analytics.path().join("privacy.enhanced_results.jsonl")).unwrap();
        assert_eq!(rows.lines().count(), 2);

        let renamed = EnhancementAgent::new(ScriptedOracle::new(vec![]), EnhancementConfig::default(), Ports::noop())
            .with_analytics_table("acme.privacy.enhanced_results");
        assert_eq!(renamed.analytics_table, "acme.privacy.enhanced_results");

        let done = agent.core().log().published_of("AIEnhancedFindings").next().unwrap();
        assert_eq!(done.get("ai_enhancements"), Some(&json!(1)));
        assert_eq!(done.get("gemini_enhanced"), Some(&json!(true)));
    }
}
