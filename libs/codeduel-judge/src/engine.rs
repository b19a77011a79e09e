/// Judging Engine - Test Orchestration and Scoring
///
/// **Core Responsibility:**
/// Turn one submission and its test cases into a `JudgingResult`.
///
/// **Classification (per test, in this order):**
/// 1. Timed out → `timeout`, whatever the exit code
/// 2. Non-zero exit → `compile_error` when the backend flagged it, else `runtime_error`
/// 3. No JSON in stdout → `parse_failure`
/// 4. Extracted value differs from expected → `output_mismatch`
///
/// **Scoring Rules:**
/// - score = 10 * (sum of passed weights) / (sum of all weights), 2 decimals
/// - zero total weight scores 0
/// - hidden tests count exactly like visible ones
///
/// Outcomes always come back in test-case order, whatever the fan-out.

use crate::error::{ExecutionError, JudgeError};
use crate::extractor::extract_output;
use crate::harness::RESULT_KEY;
use crate::service::CodeExecutor;
use codeduel_common::config::{InfraFailurePolicy, Settings};
use codeduel_common::types::{
    ErrorKind, ExecutionConfig, ExecutionResult, JudgeJob, JudgingResult, Language, TestCase,
    TestOutcome,
};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MAX_SCORE: f64 = 10.0;

/// Longest stderr excerpt carried in an outcome message
const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgeSettings {
    pub time_limit_ms: u64,
    pub max_concurrency: usize,
    pub infra_policy: InfraFailurePolicy,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            time_limit_ms: 5000,
            max_concurrency: 4,
            infra_policy: InfraFailurePolicy::AbortSubmission,
        }
    }
}

impl From<&Settings> for JudgeSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            time_limit_ms: settings.time_limit_ms,
            max_concurrency: settings.max_concurrency,
            infra_policy: settings.infra_policy,
        }
    }
}

/// JSON equality where numbers compare by value (`4 == 4.0`).
/// Two integers compare exactly; floats are only involved when one side is one.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                matches!((x.as_f64(), y.as_f64()), (Some(p), Some(q)) if p == q)
            } else {
                x == y
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// The value inside a harness `{"result": v}` envelope
fn envelope_value(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(RESULT_KEY),
        _ => None,
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= MESSAGE_LIMIT {
        return trimmed.to_string();
    }
    let mut cut = MESSAGE_LIMIT;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &trimmed[..cut])
}

fn failed(kind: ErrorKind, result: &ExecutionResult, message: String) -> TestOutcome {
    TestOutcome {
        passed: false,
        actual_output: None,
        error_kind: kind,
        execution_time_ms: result.execution_time_ms,
        message: Some(message),
    }
}

/// Classify one execution against its test case. Pure and deterministic.
pub fn evaluate_test(result: &ExecutionResult, test_case: &TestCase) -> TestOutcome {
    if result.timed_out {
        return failed(ErrorKind::Timeout, result, "Time limit exceeded".to_string());
    }

    if !result.succeeded() {
        let kind = if result.compile_failed {
            ErrorKind::CompileError
        } else {
            ErrorKind::RuntimeError
        };
        let stderr = excerpt(&result.stderr);
        let message = if stderr.is_empty() {
            format!("Process exited with code {}", result.exit_code)
        } else {
            stderr
        };
        return failed(kind, result, message);
    }

    let value = match extract_output(&result.stdout) {
        Ok(value) => value,
        Err(e) => {
            let mut message = format!("Could not read a result from the program output: {}", e);
            let stderr = excerpt(&result.stderr);
            if !stderr.is_empty() {
                message.push('\n');
                message.push_str(&stderr);
            }
            return failed(ErrorKind::ParseFailure, result, message);
        }
    };

    let expected = &test_case.expected_output;
    let (passed, actual) = if json_eq(&value, expected) {
        (true, value)
    } else {
        match envelope_value(&value) {
            Some(inner) => (json_eq(inner, expected), inner.clone()),
            None => (false, value),
        }
    };

    TestOutcome {
        passed,
        actual_output: Some(actual),
        error_kind: if passed { ErrorKind::None } else { ErrorKind::OutputMismatch },
        execution_time_ms: result.execution_time_ms,
        message: if passed {
            None
        } else {
            Some("Output did not match the expected result".to_string())
        },
    }
}

/// Weighted partial credit on a 0-10 scale, rounded to 2 decimals
pub fn compute_score(test_cases: &[TestCase], outcomes: &[TestOutcome]) -> f64 {
    // Negative, NaN or infinite weights count as zero
    let raw = |tc: &TestCase| {
        if tc.weight.is_finite() && tc.weight > 0.0 {
            tc.weight
        } else {
            0.0
        }
    };

    // Scale by the largest weight so the sums stay finite (each term <= 1)
    let largest = test_cases.iter().map(raw).fold(0.0, f64::max);
    if largest <= 0.0 {
        return 0.0;
    }
    let weight = |tc: &TestCase| raw(tc) / largest;

    let total: f64 = test_cases.iter().map(weight).sum();
    let earned: f64 = test_cases
        .iter()
        .zip(outcomes)
        .filter(|(_, outcome)| outcome.passed)
        .map(|(tc, _)| weight(tc))
        .sum();

    let score = (MAX_SCORE * earned / total).clamp(0.0, MAX_SCORE);
    (score * 100.0).round() / 100.0
}

pub struct Judge<E> {
    executor: E,
    settings: JudgeSettings,
}

impl<E: CodeExecutor> Judge<E> {
    pub fn new(executor: E, settings: JudgeSettings) -> Self {
        Self { executor, settings }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    async fn run_test(
        &self,
        index: usize,
        config: ExecutionConfig,
        test_case: &TestCase,
        cancel: &CancellationToken,
    ) -> Result<TestOutcome, JudgeError> {
        if cancel.is_cancelled() {
            return Err(JudgeError::Cancelled);
        }

        match self.executor.execute_code(&config, cancel).await {
            Ok(result) => {
                let outcome = evaluate_test(&result, test_case);
                debug!(
                    test_index = index,
                    passed = outcome.passed,
                    error_kind = ?outcome.error_kind,
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    execution_ms = outcome.execution_time_ms,
                    "Test judged"
                );
                Ok(outcome)
            }
            Err(ExecutionError::Cancelled) => Err(JudgeError::Cancelled),
            Err(e) => match self.settings.infra_policy {
                InfraFailurePolicy::AbortSubmission => {
                    warn!(test_index = index, error = %e, "Infrastructure failure, aborting submission");
                    Err(JudgeError::Infrastructure {
                        test_index: index,
                        source: e,
                    })
                }
                InfraFailurePolicy::FailTest => {
                    warn!(test_index = index, error = %e, "Infrastructure failure, failing test");
                    Ok(TestOutcome {
                        passed: false,
                        actual_output: None,
                        error_kind: ErrorKind::InfrastructureError,
                        execution_time_ms: 0,
                        message: Some(e.to_string()),
                    })
                }
            },
        }
    }

    /// Judge `code` against `test_cases` with the configured per-test limit
    pub async fn judge(
        &self,
        code: &str,
        language: Language,
        test_cases: &[TestCase],
        cancel: &CancellationToken,
    ) -> Result<JudgingResult, JudgeError> {
        self.judge_with_limit(code, language, test_cases, self.settings.time_limit_ms, cancel)
            .await
    }

    /// Judge a queued job, honouring its per-test limit override
    pub async fn judge_job(&self, job: &JudgeJob, cancel: &CancellationToken) -> Result<JudgingResult, JudgeError> {
        let limit = job
            .time_limit_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.settings.time_limit_ms);
        self.judge_with_limit(&job.code, job.language, &job.test_cases, limit, cancel)
            .await
    }

    async fn judge_with_limit(
        &self,
        code: &str,
        language: Language,
        test_cases: &[TestCase],
        time_limit_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<JudgingResult, JudgeError> {
        let started = Instant::now();
        let time_limit_ms = time_limit_ms.max(1);

        // `buffered` yields in input order, so outcomes[i] always belongs to
        // test_cases[i]; dropping the stream on error drops in-flight runs
        let outcomes: Vec<TestOutcome> = stream::iter(0..test_cases.len())
            .map(|index| {
                let test_case = &test_cases[index];
                let config = ExecutionConfig {
                    code: code.to_string(),
                    language,
                    test_input: test_case.input.clone(),
                    time_limit_ms,
                };
                self.run_test(index, config, test_case, cancel)
            })
            .buffered(self.settings.max_concurrency.max(1))
            .try_collect()
            .await?;

        let passed_tests = outcomes.iter().filter(|o| o.passed).count();
        let score = compute_score(test_cases, &outcomes);

        info!(
            language = %language,
            score = score,
            passed = passed_tests,
            total = test_cases.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission judged"
        );

        Ok(JudgingResult {
            score,
            passed_tests,
            total_tests: test_cases.len(),
            outcomes,
        })
    }
}
