use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Source languages accepted for submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    TypeScript,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::Python, Language::TypeScript];
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::Python => write!(f, "python"),
            Language::TypeScript => write!(f, "typescript"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "python" | "py" | "python3" => Ok(Language::Python),
            "typescript" | "ts" => Ok(Language::TypeScript),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// One request to run code once against one input.
///
/// Executors only ever borrow a config; nothing mutates it after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub code: String,
    pub language: Language,
    pub test_input: Value,
    pub time_limit_ms: u64,
}

impl ExecutionConfig {
    pub fn new(
        code: impl Into<String>,
        language: Language,
        test_input: Value,
        time_limit_ms: u64,
    ) -> Result<Self, String> {
        if time_limit_ms == 0 {
            return Err("time_limit_ms must be greater than zero".to_string());
        }
        Ok(Self {
            code: code.into(),
            language,
            test_input,
            time_limit_ms,
        })
    }
}

/// Raw telemetry of one execution.
///
/// When `timed_out` is set the process was killed and `exit_code` is whatever
/// the backend reported; it is not a failure code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i64,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    /// Backend reported a compile/syntax-check failure rather than a crash
    #[serde(default)]
    pub compile_failed: bool,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected_output: Value,
    /// Only affects what the player sees, never scoring
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    CompileError,
    RuntimeError,
    Timeout,
    OutputMismatch,
    ParseFailure,
    /// Only produced when the caller asks for infrastructure failures to fail
    /// the single test instead of the whole submission
    InfrastructureError,
}

impl ErrorKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ErrorKind::None => "passed",
            ErrorKind::CompileError => "compilation failed",
            ErrorKind::RuntimeError => "runtime error",
            ErrorKind::Timeout => "time limit exceeded",
            ErrorKind::OutputMismatch => "wrong answer",
            ErrorKind::ParseFailure => "no result was printed",
            ErrorKind::InfrastructureError => "judge unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub actual_output: Option<Value>,
    pub error_kind: ErrorKind,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgingResult {
    pub score: f64,
    pub passed_tests: usize,
    pub total_tests: usize,
    pub outcomes: Vec<TestOutcome>,
}

/// Outcome as shown to the submitting player. Hidden tests carry no values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOutcome {
    pub index: usize,
    pub passed: bool,
    pub is_hidden: bool,
    pub error_kind: ErrorKind,
    pub execution_time_ms: u64,
    pub input: Option<Value>,
    pub expected_output: Option<Value>,
    pub actual_output: Option<Value>,
    pub message: Option<String>,
}

impl JudgingResult {
    /// Builds the player-facing view, pairing outcomes with their test cases
    /// by position.
    pub fn player_view(&self, test_cases: &[TestCase]) -> Vec<PlayerOutcome> {
        self.outcomes
            .iter()
            .zip(test_cases)
            .enumerate()
            .map(|(index, (outcome, tc))| {
                if tc.is_hidden {
                    PlayerOutcome {
                        index,
                        passed: outcome.passed,
                        is_hidden: true,
                        error_kind: outcome.error_kind,
                        execution_time_ms: outcome.execution_time_ms,
                        input: None,
                        expected_output: None,
                        actual_output: None,
                        message: Some(outcome.error_kind.describe().to_string()),
                    }
                } else {
                    PlayerOutcome {
                        index,
                        passed: outcome.passed,
                        is_hidden: false,
                        error_kind: outcome.error_kind,
                        execution_time_ms: outcome.execution_time_ms,
                        input: Some(tc.input.clone()),
                        expected_output: Some(tc.expected_output.clone()),
                        actual_output: outcome.actual_output.clone(),
                        message: outcome.message.clone(),
                    }
                }
            })
            .collect()
    }
}

/// A submission queued by the match service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeJob {
    pub id: Uuid,
    pub language: Language,
    pub code: String,
    pub test_cases: Vec<TestCase>,
    /// Overrides the worker's per-test limit when present
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
    Cancelled,
}

/// What the worker hands back to the match service for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub result: Option<JudgingResult>,
    pub error: Option<String>,
    pub judged_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(passed: bool, kind: ErrorKind, actual: Option<Value>) -> TestOutcome {
        TestOutcome {
            passed,
            actual_output: actual,
            error_kind: kind,
            execution_time_ms: 12,
            message: Some("stderr details".to_string()),
        }
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("js".parse::<Language>(), Ok(Language::JavaScript));
        assert_eq!("Python3".parse::<Language>(), Ok(Language::Python));
        assert_eq!(" ts ".parse::<Language>(), Ok(Language::TypeScript));
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Language::TypeScript).unwrap(), "\"typescript\"");
        let lang: Language = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(lang, Language::JavaScript);
    }

    #[test]
    fn test_execution_config_rejects_zero_limit() {
        assert!(ExecutionConfig::new("x", Language::Python, json!(1), 0).is_err());
        assert!(ExecutionConfig::new("x", Language::Python, json!(1), 100).is_ok());
    }

    #[test]
    fn test_test_case_defaults() {
        let tc: TestCase = serde_json::from_value(json!({
            "input": [1, 2],
            "expected_output": 3
        }))
        .unwrap();
        assert!(!tc.is_hidden);
        assert_eq!(tc.weight, 1.0);
    }

    #[test]
    fn test_succeeded_requires_clean_exit_in_time() {
        let clean = ExecutionResult::default();
        assert!(clean.succeeded());
        let crashed = ExecutionResult { exit_code: 1, ..Default::default() };
        assert!(!crashed.succeeded());
        let slow = ExecutionResult { timed_out: true, ..Default::default() };
        assert!(!slow.succeeded());
    }

    #[test]
    fn test_error_kind_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::OutputMismatch).unwrap(),
            "\"output_mismatch\""
        );
    }

    #[test]
    fn test_player_view_redacts_hidden_tests() {
        let tests = vec![
            TestCase { input: json!(1), expected_output: json!(2), is_hidden: false, weight: 1.0 },
            TestCase { input: json!(5), expected_output: json!(10), is_hidden: true, weight: 1.0 },
        ];
        let result = JudgingResult {
            score: 0.0,
            passed_tests: 0,
            total_tests: 2,
            outcomes: vec![
                outcome(false, ErrorKind::OutputMismatch, Some(json!(3))),
                outcome(false, ErrorKind::OutputMismatch, Some(json!(11))),
            ],
        };

        let view = result.player_view(&tests);

        assert_eq!(view[0].input, Some(json!(1)));
        assert_eq!(view[0].actual_output, Some(json!(3)));
        assert_eq!(view[0].message.as_deref(), Some("stderr details"));

        assert!(view[1].is_hidden);
        assert_eq!(view[1].input, None);
        assert_eq!(view[1].expected_output, None);
        assert_eq!(view[1].actual_output, None);
        assert_eq!(view[1].message.as_deref(), Some("wrong answer"));
    }
}
