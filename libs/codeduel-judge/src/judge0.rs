//! Cloud Judge Executor - Judge0 backend
//!
//! Submits the same harness program the sandbox runs to a Judge0 instance,
//! polls until the submission settles and maps Judge0's status catalogue onto
//! `ExecutionResult`. Cancellation interrupts in-flight requests as well as
//! the wait between polls. Transport problems, rate limiting and Judge0's own
//! internal errors surface as `ExecutionError`, never as a failed test.

use crate::error::ExecutionError;
use crate::harness;
use crate::languages::LanguageConfigManager;
use crate::retry::{with_retry, RetryPolicy};
use base64::{engine::general_purpose, Engine as _};
use codeduel_common::config::Judge0Settings;
use codeduel_common::types::{ExecutionConfig, ExecutionResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

const RESULT_FIELDS: &str = "token,stdout,stderr,compile_output,message,status,time,exit_code";

/// Extra wall time allowed for queueing on the Judge0 side
const QUEUE_GRACE: Duration = Duration::from_secs(30);

/// Judge0 status ids
mod status {
    pub const IN_QUEUE: u32 = 1;
    pub const PROCESSING: u32 = 2;
    pub const ACCEPTED: u32 = 3;
    pub const WRONG_ANSWER: u32 = 4;
    pub const TIME_LIMIT_EXCEEDED: u32 = 5;
    pub const COMPILATION_ERROR: u32 = 6;
    pub const INTERNAL_ERROR: u32 = 13;
    pub const EXEC_FORMAT_ERROR: u32 = 14;
}

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    source_code: String,
    language_id: u32,
    stdin: String,
    /// Seconds
    cpu_time_limit: f64,
    /// Seconds
    wall_time_limit: f64,
    /// Kilobytes
    memory_limit: u32,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Judge0Status {
    id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmissionResult {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    #[serde(default)]
    message: Option<String>,
    status: Judge0Status,
    /// Seconds, as a decimal string
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    exit_code: Option<i64>,
}

impl SubmissionResult {
    fn is_settled(&self) -> bool {
        self.status.id != status::IN_QUEUE && self.status.id != status::PROCESSING
    }
}

fn decode(field: &Option<String>) -> String {
    match field {
        None => String::new(),
        Some(encoded) => {
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            match general_purpose::STANDARD.decode(compact.as_bytes()) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                // Judge0 sends plain text when it could not encode the field
                Err(_) => encoded.clone(),
            }
        }
    }
}

fn append_line(target: &mut String, line: &str) {
    if line.is_empty() {
        return;
    }
    if !target.is_empty() && !target.ends_with('\n') {
        target.push('\n');
    }
    target.push_str(line);
}

/// Map a settled Judge0 submission onto the shared result shape
fn map_result(result: &SubmissionResult, fallback_time_ms: u64) -> Result<ExecutionResult, ExecutionError> {
    let stdout = decode(&result.stdout);
    let mut stderr = decode(&result.stderr);
    let message = decode(&result.message);
    let execution_time_ms = result
        .time
        .as_deref()
        .and_then(|t| t.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0).round() as u64)
        .unwrap_or(fallback_time_ms);

    let mut mapped = ExecutionResult {
        exit_code: 0,
        timed_out: false,
        stdout,
        stderr: String::new(),
        execution_time_ms,
        compile_failed: false,
    };

    match result.status.id {
        // Wrong Answer only appears when expected_output is sent, which it never is
        status::ACCEPTED | status::WRONG_ANSWER => {
            mapped.exit_code = result.exit_code.unwrap_or(0);
        }
        status::TIME_LIMIT_EXCEEDED => {
            mapped.timed_out = true;
            mapped.exit_code = result.exit_code.unwrap_or(-1);
            append_line(&mut stderr, "[Execution timed out]");
        }
        status::COMPILATION_ERROR => {
            mapped.compile_failed = true;
            mapped.exit_code = result.exit_code.filter(|c| *c != 0).unwrap_or(1);
            let diagnostics = decode(&result.compile_output);
            let mut compile_stderr = diagnostics;
            append_line(&mut compile_stderr, &stderr);
            stderr = compile_stderr;
        }
        status::INTERNAL_ERROR | status::EXEC_FORMAT_ERROR => {
            return Err(ExecutionError::Provider(format!(
                "{} ({})",
                result.status.description,
                if message.is_empty() { "no details" } else { message.as_str() }
            )));
        }
        // 7..=12: signals, NZEC and other runtime errors
        _ => {
            mapped.exit_code = result.exit_code.filter(|c| *c != 0).unwrap_or(1);
            append_line(&mut stderr, &message);
            if stderr.is_empty() {
                stderr = result.status.description.clone();
            }
        }
    }

    mapped.stderr = stderr;
    Ok(mapped)
}

fn classify_status(status: StatusCode, body: &str) -> ExecutionError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ExecutionError::RateLimited
    } else if status.is_server_error() {
        ExecutionError::Unreachable(format!("HTTP {}: {}", status, body))
    } else {
        ExecutionError::Provider(format!("HTTP {}: {}", status, body))
    }
}

pub struct Judge0Executor {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    languages: LanguageConfigManager,
    retry: RetryPolicy,
}

impl Judge0Executor {
    pub fn new(
        settings: &Judge0Settings,
        api_key: String,
        languages: LanguageConfigManager,
    ) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExecutionError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            languages,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// RapidAPI-hosted instances use RapidAPI headers, self-hosted ones the
    /// Judge0 auth token header
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.base_url.contains("rapidapi.com") {
            let host = self
                .base_url
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string();
            request
                .header("X-RapidAPI-Key", &self.api_key)
                .header("X-RapidAPI-Host", host)
        } else {
            request.header("X-Auth-Token", &self.api_key)
        }
    }

    pub async fn health_check(&self) -> bool {
        let request = self.authorize(self.client.get(format!("{}/about", self.base_url)));
        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Judge0 health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Judge0 unreachable");
                false
            }
        }
    }

    fn build_request(&self, config: &ExecutionConfig) -> Result<SubmissionRequest, ExecutionError> {
        if config.time_limit_ms == 0 {
            return Err(ExecutionError::InvalidConfig("time limit must be positive".into()));
        }
        let language = self
            .languages
            .get_config(&config.language)
            .map_err(|e| ExecutionError::InvalidConfig(e.to_string()))?;
        let input = serde_json::to_string(&config.test_input)
            .map_err(|e| ExecutionError::InvalidConfig(format!("unserializable test input: {}", e)))?;
        let program = harness::render(config.language, &config.code);
        let seconds = config.time_limit_ms as f64 / 1000.0;

        Ok(SubmissionRequest {
            source_code: general_purpose::STANDARD.encode(program),
            language_id: language.judge0_language_id,
            stdin: general_purpose::STANDARD.encode(input),
            cpu_time_limit: seconds,
            wall_time_limit: seconds,
            memory_limit: language.memory_limit_mb * 1024,
        })
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<String, ExecutionError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}/submissions", self.base_url))
                    .query(&[("base64_encoded", "true"), ("wait", "false")])
                    .json(request),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::Provider(format!("malformed submission response: {}", e)))?;
        Ok(token.token)
    }

    async fn fetch(&self, token: &str) -> Result<SubmissionResult, ExecutionError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/submissions/{}", self.base_url, token))
                    .query(&[("base64_encoded", "true"), ("fields", RESULT_FIELDS)]),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ExecutionError::Provider(format!("malformed submission result: {}", e)))
    }

    #[instrument(skip(self, config, cancel), fields(language = %config.language, time_limit_ms = config.time_limit_ms))]
    pub async fn execute(
        &self,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let request = self.build_request(config)?;
        let request = &request;
        let started_at = Instant::now();

        let token = with_retry(&self.retry, cancel, "judge0 submit", || self.submit(request)).await?;
        debug!(token = %token, "Submitted to Judge0");

        let deadline = Duration::from_millis(config.time_limit_ms) + QUEUE_GRACE;
        let token = token.as_str();

        loop {
            let result = with_retry(&self.retry, cancel, "judge0 poll", || self.fetch(token)).await?;
            if result.is_settled() {
                debug!(token = %token, status = result.status.id, "Judge0 submission settled");
                return map_result(&result, started_at.elapsed().as_millis() as u64);
            }

            if started_at.elapsed() >= deadline {
                return Err(ExecutionError::Timeout(deadline.as_millis() as u64));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            }
        }
    }
}
