/// Sandbox Executor - Docker backend
///
/// **Execution Rules:**
/// 1. One fresh container per execution, never reused
/// 2. No network, capped memory/CPU/pids, read-only root with a small /tmp tmpfs
/// 3. Harness program and test input are passed base64-encoded through env
/// 4. The container only idles; staging, the syntax check and the run are
///    separate execs, so a compile failure comes from the check's own exit
/// 5. The check has its own budget; `time_limit_ms` covers the run alone
/// 6. The container is removed before `execute` returns, with a drop
///    backstop for panics and aborted futures
///
/// Provisioning (image, create, start, staging) is retried with backoff.
/// Anything the submitted program does is reported in `ExecutionResult` and
/// never retried.

use crate::error::ExecutionError;
use crate::harness;
use crate::languages::{LanguageConfig, LanguageConfigManager};
use crate::retry::{with_retry, RetryPolicy};
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use codeduel_common::types::{ExecutionConfig, ExecutionResult};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Env-var transport bounds (a single env string is capped at 128 KiB by the
/// kernel, base64 adds a third)
pub const MAX_SOURCE_CODE_BYTES: usize = 64 * 1024;
pub const MAX_TEST_INPUT_BYTES: usize = 64 * 1024;

/// Captured stream size cap, per stream
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Budget for the syntax-check / compile step, separate from the run limit
pub const CHECK_TIME_LIMIT: Duration = Duration::from_secs(15);

/// Budget for writing the program into the container
const STAGE_TIME_LIMIT: Duration = Duration::from_secs(10);

/// Extra idle time the container is kept alive past the stage budgets
const KEEPALIVE_SLACK: Duration = Duration::from_secs(30);

/// Reported exit status for killed processes
const KILLED_EXIT: i64 = 137;

/// An exec's exit code can lag its closed output stream
const EXIT_POLLS: u32 = 50;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

async fn remove_container(docker: &Docker, container_id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    match docker.remove_container(container_id, Some(options)).await {
        Ok(()) => debug!(container_id = %container_id, "Container removed"),
        Err(e) => warn!(container_id = %container_id, error = %e, "Failed to remove container"),
    }
}

/// Container cleanup guard. `release` removes the container and waits for
/// it; dropping an unreleased guard hands the removal to the runtime.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl ContainerGuard {
    fn new(docker: &Docker, container_id: String) -> Self {
        Self {
            docker: docker.clone(),
            container_id,
        }
    }

    /// Force-remove the container before returning
    async fn release(mut self) {
        let container_id = std::mem::take(&mut self.container_id);
        remove_container(&self.docker, &container_id).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let container_id = std::mem::take(&mut self.container_id);
        if container_id.is_empty() {
            return;
        }
        let docker = self.docker.clone();

        // Drop cannot be async; hand the removal to the runtime if one exists
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container_id = %container_id, "No runtime available to remove container");
            return;
        };

        handle.spawn(async move {
            remove_container(&docker, &container_id).await;
        });
    }
}

#[derive(Debug, Default)]
struct Stream {
    text: String,
    truncated: bool,
}

impl Stream {
    fn push(&mut self, bytes: &[u8]) {
        if self.truncated {
            return;
        }
        let text = String::from_utf8_lossy(bytes);
        let room = MAX_OUTPUT_BYTES.saturating_sub(self.text.len());
        if text.len() <= room {
            self.text.push_str(&text);
        } else {
            let mut cut = room;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            self.text.push_str(&text[..cut]);
            self.truncated = true;
        }
    }
}

#[derive(Debug, Default)]
struct Capture {
    stdout: Stream,
    stderr: Stream,
}

impl Capture {
    fn stdout(&mut self, bytes: &[u8]) {
        self.stdout.push(bytes);
    }

    fn stderr(&mut self, bytes: &[u8]) {
        self.stderr.push(bytes);
    }

    /// Final (stdout, stderr); markers bypass the cap so they are never lost
    fn finish(self) -> (String, String) {
        let mut stderr = self.stderr.text;
        if self.stdout.truncated || self.stderr.truncated {
            stderr.push_str("\n[Output truncated]");
        }
        (self.stdout.text, stderr)
    }
}

enum StageOutcome {
    Exited(i64),
    TimedOut,
}

/// Writes the decoded program to its file under /tmp
fn stage_script(language: &LanguageConfig) -> String {
    format!(
        "echo \"$CODEDUEL_PROGRAM\" | base64 -d > /tmp/{}",
        language.file_name
    )
}

/// Syntax check / compile step, if the language has one
fn check_script(language: &LanguageConfig) -> Option<String> {
    // Compilers may print diagnostics on stdout; keep them with stderr
    language.check_command.as_ref().map(|check| format!("{check} 1>&2"))
}

/// Feeds the test input to the program
fn run_script(language: &LanguageConfig) -> String {
    format!(
        "echo \"$CODEDUEL_INPUT\" | base64 -d | {}",
        language.run_command
    )
}

/// Result for a program the check step rejected
fn compile_failure(exit_code: i64, capture: Capture) -> ExecutionResult {
    let (stdout, stderr) = capture.finish();
    ExecutionResult {
        exit_code,
        stdout,
        stderr,
        compile_failed: true,
        ..Default::default()
    }
}

/// Result for a run exec that exited on its own, whatever the status
fn finished_run(exit_code: i64, mut capture: Capture, execution_time_ms: u64) -> ExecutionResult {
    match exit_code {
        0 => debug!(execution_time_ms, "Program exited successfully"),
        137 => capture.stderr(b"\n[Container killed: likely exceeded memory limit]"),
        139 => capture.stderr(b"\n[Container killed: segmentation fault]"),
        code => debug!(exit_code = code, execution_time_ms, "Program exited with failure"),
    }
    let (stdout, stderr) = capture.finish();
    ExecutionResult {
        exit_code,
        stdout,
        stderr,
        execution_time_ms,
        ..Default::default()
    }
}

pub struct SandboxExecutor {
    docker: Docker,
    languages: LanguageConfigManager,
    retry: RetryPolicy,
}

impl SandboxExecutor {
    /// Connect to the local Docker daemon. Connection is lazy, so this only
    /// fails on a malformed local configuration.
    pub fn new(languages: LanguageConfigManager) -> Result<Self, ExecutionError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            languages,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn health_check(&self) -> bool {
        match self.docker.ping().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Docker daemon ping failed");
                false
            }
        }
    }

    fn validate(&self, config: &ExecutionConfig) -> Result<(String, String), ExecutionError> {
        if config.time_limit_ms == 0 {
            return Err(ExecutionError::InvalidConfig("time limit must be positive".into()));
        }
        if config.code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(ExecutionError::InvalidConfig(format!(
                "source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            )));
        }
        let input = serde_json::to_string(&config.test_input)
            .map_err(|e| ExecutionError::InvalidConfig(format!("unserializable test input: {}", e)))?;
        if input.len() > MAX_TEST_INPUT_BYTES {
            return Err(ExecutionError::InvalidConfig(format!(
                "test input exceeds maximum size of {} bytes",
                MAX_TEST_INPUT_BYTES
            )));
        }
        let program = harness::render(config.language, &config.code);
        Ok((program, input))
    }

    /// Ensure the runtime image is present, pulling it on a cache miss
    async fn ensure_image(&self, image: &str) -> Result<(), ExecutionError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = image, "Image cache hit");
            return Ok(());
        }

        warn!(image = image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| ExecutionError::Provisioning(format!("pull of {} failed: {}", image, e)))?;
        }

        info!(image = image, "Image pulled");
        Ok(())
    }

    fn container_config(
        &self,
        language: &LanguageConfig,
        program: &str,
        input: &str,
        keepalive: Duration,
    ) -> Config<String> {
        let env = vec![
            format!("CODEDUEL_PROGRAM={}", general_purpose::STANDARD.encode(program)),
            format!("CODEDUEL_INPUT={}", general_purpose::STANDARD.encode(input)),
        ];
        let memory = i64::from(language.memory_limit_mb) * 1024 * 1024;
        let tmpfs = HashMap::from([(
            "/tmp".to_string(),
            "rw,nosuid,nodev,size=64m,mode=1777".to_string(),
        )]);

        Config {
            image: Some(language.image.clone()),
            entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            // Idles until the execs are done; removal ends it early
            cmd: Some(vec![format!("exec sleep {}", keepalive.as_secs().max(1))]),
            env: Some(env),
            user: Some("65534:65534".to_string()),
            working_dir: Some("/tmp".to_string()),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some((f64::from(language.cpu_limit) * 1_000_000_000.0) as i64),
                pids_limit: Some(language.pids_limit),
                network_mode: Some("none".to_string()),
                readonly_rootfs: Some(true),
                tmpfs: Some(tmpfs),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Create and start one container, then stage the program in it. The
    /// guard exists before `start`, so a failed attempt still removes what
    /// was created.
    async fn provision(
        &self,
        language: &LanguageConfig,
        program: &str,
        input: &str,
        keepalive: Duration,
    ) -> Result<ContainerGuard, ExecutionError> {
        self.ensure_image(&language.image).await?;

        let container_name = format!("codeduel-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(
                Some(create_options),
                self.container_config(language, program, input, keepalive),
            )
            .await
            .map_err(|e| ExecutionError::Provisioning(format!("create failed: {}", e)))?;

        let guard = ContainerGuard::new(&self.docker, container.id);

        self.docker
            .start_container(&guard.container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ExecutionError::Provisioning(format!("start failed: {}", e)))?;

        let mut capture = Capture::default();
        let staged = tokio::time::timeout(
            STAGE_TIME_LIMIT,
            self.exec(&guard.container_id, stage_script(language), &mut capture),
        )
        .await
        .map_err(|_| ExecutionError::Provisioning("staging the program timed out".into()))??;
        if staged != 0 {
            let (_, stderr) = capture.finish();
            return Err(ExecutionError::Provisioning(format!(
                "staging exited with {}: {}",
                staged,
                stderr.trim()
            )));
        }

        Ok(guard)
    }

    /// Run one shell script as an exec in the container, capturing its
    /// output, and return its exit status
    async fn exec(&self, container_id: &str, script: String, capture: &mut Capture) -> Result<i64, ExecutionError> {
        let exec_config = CreateExecOptions {
            cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self.docker.create_exec(container_id, exec_config).await?;

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        match self.docker.start_exec(&exec.id, Some(start_config)).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => capture.stdout(&message),
                        Ok(LogOutput::StdErr { message }) => capture.stderr(&message),
                        Ok(_) => {}
                        Err(e) => {
                            warn!(container_id = container_id, error = %e, "Error reading exec output");
                            break;
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ExecutionError::Provisioning("exec did not attach".into()));
            }
        }

        for _ in 0..EXIT_POLLS {
            if let Some(code) = self.docker.inspect_exec(&exec.id).await?.exit_code {
                return Ok(code);
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        Err(ExecutionError::Provisioning("exec exit status unavailable".into()))
    }

    /// One exec bounded by `limit` and the cancellation token
    async fn run_stage(
        &self,
        container_id: &str,
        script: String,
        capture: &mut Capture,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, ExecutionError> {
        tokio::select! {
            exit = self.exec(container_id, script, capture) => Ok(StageOutcome::Exited(exit?)),
            _ = tokio::time::sleep(limit) => Ok(StageOutcome::TimedOut),
            _ = cancel.cancelled() => {
                info!(container_id = %container_id, "Execution cancelled");
                Err(ExecutionError::Cancelled)
            }
        }
    }

    /// Check then run inside an already staged container
    async fn check_and_run(
        &self,
        container_id: &str,
        language: &LanguageConfig,
        time_limit_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        if let Some(script) = check_script(language) {
            let mut capture = Capture::default();
            match self
                .run_stage(container_id, script, &mut capture, CHECK_TIME_LIMIT, cancel)
                .await?
            {
                StageOutcome::Exited(0) => {}
                StageOutcome::Exited(code) => {
                    debug!(exit_code = code, "Check step rejected the program");
                    return Ok(compile_failure(code, capture));
                }
                StageOutcome::TimedOut => {
                    warn!(container_id = %container_id, "Check step timed out");
                    capture.stderr(
                        format!("\n[Compilation timed out after {}ms]", CHECK_TIME_LIMIT.as_millis()).as_bytes(),
                    );
                    return Ok(compile_failure(KILLED_EXIT, capture));
                }
            }
        }

        let limit = Duration::from_millis(time_limit_ms);
        let mut capture = Capture::default();
        let started_at = Instant::now();
        let outcome = self
            .run_stage(container_id, run_script(language), &mut capture, limit, cancel)
            .await?;
        let execution_time_ms = started_at.elapsed().as_millis() as u64;

        match outcome {
            StageOutcome::Exited(code) => Ok(finished_run(code, capture, execution_time_ms)),
            StageOutcome::TimedOut => {
                warn!(container_id = %container_id, time_limit_ms, "Execution timed out, removing container");
                capture.stderr(format!("\n[Execution timed out after {}ms]", time_limit_ms).as_bytes());
                let (stdout, stderr) = capture.finish();
                Ok(ExecutionResult {
                    exit_code: KILLED_EXIT,
                    stdout,
                    stderr,
                    execution_time_ms,
                    timed_out: true,
                    ..Default::default()
                })
            }
        }
    }

    /// Run one config in a fresh container
    #[instrument(skip(self, config, cancel), fields(language = %config.language, time_limit_ms = config.time_limit_ms))]
    pub async fn execute(
        &self,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let (program, input) = self.validate(config)?;
        let language = self
            .languages
            .get_config(&config.language)
            .map_err(|e| ExecutionError::InvalidConfig(e.to_string()))?;

        let keepalive = STAGE_TIME_LIMIT + CHECK_TIME_LIMIT + Duration::from_millis(config.time_limit_ms) + KEEPALIVE_SLACK;
        let (program, input) = (program.as_str(), input.as_str());
        let guard = with_retry(&self.retry, cancel, "sandbox provisioning", || {
            self.provision(language, program, input, keepalive)
        })
        .await?;

        let outcome = self
            .check_and_run(&guard.container_id, language, config.time_limit_ms, cancel)
            .await;
        guard.release().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeduel_common::types::Language;
    use serde_json::json;

    #[test]
    fn test_stage_scripts_with_check() {
        let manager = LanguageConfigManager::builtin();
        let python = manager.get_config(&Language::Python).unwrap();
        assert_eq!(stage_script(python), "echo \"$CODEDUEL_PROGRAM\" | base64 -d > /tmp/main.py");
        assert_eq!(check_script(python).as_deref(), Some("python3 -m py_compile /tmp/main.py 1>&2"));
        assert_eq!(run_script(python), "echo \"$CODEDUEL_INPUT\" | base64 -d | python3 -u /tmp/main.py");
    }

    #[test]
    fn test_compile_step_is_outside_the_timed_run() {
        let manager = LanguageConfigManager::builtin();
        let typescript = manager.get_config(&Language::TypeScript).unwrap();
        let check = check_script(typescript).unwrap();
        let run = run_script(typescript);
        assert!(check.starts_with("tsc "));
        assert!(!run.contains("tsc"));
        assert!(run.ends_with("node /tmp/out/main.js"));
    }

    #[test]
    fn test_no_check_without_check_command() {
        let mut config = LanguageConfigManager::builtin()
            .get_config(&Language::JavaScript)
            .unwrap()
            .clone();
        config.check_command = None;
        assert_eq!(check_script(&config), None);
    }

    #[test]
    fn test_program_exit_status_never_marks_compile_failure() {
        let mut capture = Capture::default();
        capture.stderr(b"bye");
        let result = finished_run(86, capture, 12);
        assert!(!result.compile_failed);
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, 86);
        assert_eq!(result.execution_time_ms, 12);
    }

    #[test]
    fn test_check_rejection_is_compile_failure() {
        let mut capture = Capture::default();
        capture.stderr(b"SyntaxError: invalid syntax");
        let result = compile_failure(1, capture);
        assert!(result.compile_failed);
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.execution_time_ms, 0);
        assert!(result.stderr.contains("SyntaxError"));
    }

    #[test]
    fn test_killed_run_is_annotated() {
        let result = finished_run(137, Capture::default(), 40);
        assert!(result.stderr.contains("memory limit"));
        assert!(!result.compile_failed);
    }

    #[test]
    fn test_capture_truncates_on_char_boundary() {
        let mut capture = Capture::default();
        capture.stdout(&vec![b'a'; MAX_OUTPUT_BYTES - 1]);
        capture.stdout("é".as_bytes());
        assert!(capture.stdout.truncated);
        assert_eq!(capture.stdout.text.len(), MAX_OUTPUT_BYTES - 1);

        capture.stdout(b"more");
        assert_eq!(capture.stdout.text.len(), MAX_OUTPUT_BYTES - 1);

        capture.stderr(b"boom");
        let (stdout, stderr) = capture.finish();
        assert_eq!(stdout.len(), MAX_OUTPUT_BYTES - 1);
        assert_eq!(stderr, "boom\n[Output truncated]");
    }

    #[tokio::test]
    async fn test_validate_rejects_oversized_code() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig {
            code: "x".repeat(MAX_SOURCE_CODE_BYTES + 1),
            language: Language::Python,
            test_input: json!(1),
            time_limit_ms: 1000,
        };
        let err = executor.validate(&config).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_container_config_is_locked_down() {
        let manager = LanguageConfigManager::builtin();
        let executor = SandboxExecutor::new(manager.clone()).unwrap();
        let language = manager.get_config(&Language::JavaScript).unwrap();
        let config = executor.container_config(language, "solution", "2", Duration::from_secs(50));

        assert_eq!(config.network_disabled, Some(true));
        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        let env = config.env.unwrap();
        assert!(env.iter().any(|e| e == "CODEDUEL_INPUT=Mg=="));
        assert_eq!(config.cmd, Some(vec!["exec sleep 50".to_string()]));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_execution_in_docker() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig::new(
            "def solution(x):\n    print('debug line')\n    return x * 2",
            Language::Python,
            json!(2),
            5000,
        )
        .unwrap();

        let result = executor.execute(&config, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(!result.timed_out);
        assert!(result.stdout.contains("debug line"));
        assert!(result.stdout.trim_end().ends_with("{\"result\": 4}"));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_timeout_kills_container() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig::new(
            "function solution(x) { while (true) {} }",
            Language::JavaScript,
            json!(null),
            1000,
        )
        .unwrap();

        let result = executor.execute(&config, &CancellationToken::new()).await.unwrap();
        assert!(result.timed_out);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_syntax_error_is_compile_failure() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig::new("def solution(x)\n    return x", Language::Python, json!(1), 5000).unwrap();

        let result = executor.execute(&config, &CancellationToken::new()).await.unwrap();
        assert!(result.compile_failed);
        assert_ne!(result.exit_code, 0);
        assert!(result.stderr.contains("SyntaxError"));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_exit_86_is_a_runtime_failure() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig::new(
            "import sys\ndef solution(x):\n    sys.exit(86)",
            Language::Python,
            json!(1),
            5000,
        )
        .unwrap();

        let result = executor.execute(&config, &CancellationToken::new()).await.unwrap();
        assert!(!result.compile_failed);
        assert_eq!(result.exit_code, 86);
    }

    #[tokio::test]
    #[ignore] // Requires Docker and the TypeScript image
    async fn test_typescript_compile_time_not_charged_to_run() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig::new(
            "function solution(x: number): number { return x + 1; }",
            Language::TypeScript,
            json!(1),
            1000,
        )
        .unwrap();

        let result = executor.execute(&config, &CancellationToken::new()).await.unwrap();
        assert!(!result.timed_out, "stderr: {}", result.stderr);
        assert_eq!(result.exit_code, 0);
        assert!(result.execution_time_ms < 1000);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_cancel_interrupts_running_program() {
        let executor = SandboxExecutor::new(LanguageConfigManager::builtin()).unwrap();
        let config = ExecutionConfig::new(
            "function solution(x) { while (true) {} }",
            Language::JavaScript,
            json!(null),
            60_000,
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = executor.execute(&config, &cancel).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_release_removes_container_before_returning() {
        let manager = LanguageConfigManager::builtin();
        let executor = SandboxExecutor::new(manager.clone()).unwrap();
        let language = manager.get_config(&Language::Python).unwrap();

        let guard = executor
            .provision(language, "print(1)", "null", Duration::from_secs(60))
            .await
            .unwrap();
        let container_id = guard.container_id.clone();
        guard.release().await;

        let inspect = executor
            .docker
            .inspect_container(&container_id, None::<bollard::container::InspectContainerOptions>)
            .await;
        assert!(inspect.is_err());
    }
}
