//! Rule-engine scanner collaborator
//!
//! The scanner is a black box: a project path goes in, a list of serialised
//! finding records comes out. Conversion into [`guardian_core::Finding`] is
//! done by the scan stage.

use async_trait::async_trait;
use guardian_core::config::PipelineConfig;
use guardian_core::ScanError;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tokio::process::Command;

/// Banner the rule engine prints in front of its JSON result
pub const RULE_ENGINE_BANNER: &str = "GeminiPrivacyRule:";

#[async_trait]
pub trait Scanner: Send + Sync + fmt::Debug {
    /// Raw violation records for `project_path`
    async fn scan(&self, project_path: &Path) -> Result<Vec<Value>, ScanError>;
}

/// Runs an external rule-engine command with the project path appended
#[derive(Debug, Clone)]
pub struct CommandScanner {
    program: String,
    args: Vec<String>,
}

impl CommandScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// First element of `scanner_command` is the program, the rest are
    /// leading arguments. `None` when the command is empty.
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        let (program, args) = config.scanner_command.split_first()?;
        Some(Self::new(program.clone()).with_args(args.iter().cloned()))
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Scanner for CommandScanner {
    async fn scan(&self, project_path: &Path) -> Result<Vec<Value>, ScanError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(project_path).kill_on_drop(true);

        tracing::debug!("Running rule engine: {} {}", self.command_line(), project_path.display());
        let output = cmd.output().await.map_err(|source| ScanError::Spawn {
            command: self.command_line(),
            source,
        })?;

        if !output.status.success() {
            return Err(ScanError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let violations = parse_rule_engine_output(&stdout)?;
        tracing::debug!("Found {} violations from rule engine", violations.len());
        Ok(violations)
    }
}

/// Locate the result object in rule-engine stdout and return its
/// `violations` array. Text after the object is ignored.
pub fn parse_rule_engine_output(output: &str) -> Result<Vec<Value>, ScanError> {
    let start = match output.find(RULE_ENGINE_BANNER) {
        Some(banner) => output[banner..].find('{').map(|i| banner + i),
        None => output.find('{'),
    }
    .ok_or(ScanError::NoPayload)?;

    let mut stream = serde_json::Deserializer::from_str(&output[start..]).into_iter::<Value>();
    let result = match stream.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(ScanError::Payload(e.to_string())),
        None => return Err(ScanError::NoPayload),
    };

    match result.get("violations") {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(ScanError::Payload(format!(
            "`violations` is not a list: {}",
            other
        ))),
        None => Ok(Vec::new()),
    }
}

/// Returns a fixed record list regardless of path
#[derive(Debug, Clone, Default)]
pub struct StaticScanner {
    records: Vec<Value>,
}

impl StaticScanner {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Scanner for StaticScanner {
    async fn scan(&self, _project_path: &Path) -> Result<Vec<Value>, ScanError> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_banner_payload() {
        let out = "Loading rules...\n☁️ GeminiPrivacyRule: {\"violations\": [{\"line_number\": 3}]}\nDone.";
        let violations = parse_rule_engine_output(out).unwrap();
        assert_eq!(violations, vec![json!({"line_number": 3})]);
    }

    #[test]
    fn test_banner_wins_over_earlier_braces() {
        let out = "config {strict}\n🔑 GeminiPrivacyRule:\n{\"violations\": []}";
        assert!(parse_rule_engine_output(out).unwrap().is_empty());
    }

    #[test]
    fn test_first_brace_without_banner() {
        let out = "{\"violations\": [{\"file_path\": \"a.js\"}, {\"file_path\": \"b.js\"}]}";
        assert_eq!(parse_rule_engine_output(out).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_or_broken_payload() {
        assert!(matches!(
            parse_rule_engine_output("no output"),
            Err(ScanError::NoPayload)
        ));
        assert!(matches!(
            parse_rule_engine_output("result: {broken"),
            Err(ScanError::Payload(_))
        ));
        assert!(matches!(
            parse_rule_engine_output("{\"violations\": 3}"),
            Err(ScanError::Payload(_))
        ));
    }

    #[test]
    fn test_static_scanner_ignores_path() {
        let scanner = StaticScanner::new(vec![json!({"file_path": "a.js"})]);
        let records = tokio_test::block_on(scanner.scan(Path::new("/anywhere"))).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_from_config_splits_program() {
        let config = PipelineConfig::default();
        let scanner = CommandScanner::from_config(&config).unwrap();
        assert_eq!(scanner.command_line(), "node rule_engine_cli.js");

        let empty = PipelineConfig {
            scanner_command: Vec::new(),
            ..PipelineConfig::default()
        };
        assert!(CommandScanner::from_config(&empty).is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let scanner = CommandScanner::new("guardian-no-such-rule-engine");
        let err = scanner.scan(Path::new(".")).await.unwrap_err();
        assert!(matches!(err, ScanError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_parsed() {
        let scanner = CommandScanner::new("sh").with_args([
            "-c",
            "echo 'GeminiPrivacyRule: {\"violations\": [{\"line_number\": 5}]}'",
            "scanner",
        ]);
        let violations = scanner.scan(Path::new("/tmp/project")).await.unwrap();
        assert_eq!(violations, vec![json!({"line_number": 5})]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit() {
        let scanner = CommandScanner::new("sh").with_args(["-c", "echo boom >&2; exit 3", "scanner"]);
        let err = scanner.scan(Path::new("/tmp/project")).await.unwrap_err();
        match err {
            ScanError::ExitStatus { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
