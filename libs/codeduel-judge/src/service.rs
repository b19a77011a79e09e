/// Execution Service Facade
///
/// One uniform contract over the two backends. The backend is chosen once at
/// startup by `ExecutionService::from_settings` and the resulting value is
/// passed explicitly to whoever needs it (judging engine, health probes).

use crate::error::ExecutionError;
use crate::judge0::Judge0Executor;
use crate::languages::LanguageConfigManager;
use crate::sandbox::SandboxExecutor;
use async_trait::async_trait;
use codeduel_common::config::{BackendKind, Settings};
use codeduel_common::types::{ExecutionConfig, ExecutionResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capability shared by every execution backend.
///
/// `execute_code` returns `Ok` for anything the submitted code does (crash,
/// timeout, compile error). `Err` means the mechanism failed.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute_code(
        &self,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError>;

    async fn health_check(&self) -> bool;
}

pub enum ExecutionService {
    Sandbox(SandboxExecutor),
    CloudJudge(Judge0Executor),
}

impl ExecutionService {
    /// Select and construct the backend. A Judge0 selection without an API
    /// key degrades to the local sandbox with a warning.
    pub fn from_settings(
        settings: &Settings,
        languages: LanguageConfigManager,
    ) -> Result<Self, ExecutionError> {
        let selected = match (settings.backend, settings.judge0.api_key.as_ref()) {
            (BackendKind::Judge0, Some(api_key)) => {
                info!(url = %settings.judge0.api_url, "Using Judge0 execution backend");
                ExecutionService::CloudJudge(Judge0Executor::new(
                    &settings.judge0,
                    api_key.clone(),
                    languages,
                )?)
            }
            (BackendKind::Judge0, None) => {
                warn!("EXECUTION_BACKEND=judge0 but JUDGE0_API_KEY is not set, falling back to docker sandbox");
                ExecutionService::Sandbox(SandboxExecutor::new(languages)?)
            }
            (BackendKind::Docker, _) => {
                info!("Using Docker sandbox execution backend");
                ExecutionService::Sandbox(SandboxExecutor::new(languages)?)
            }
        };
        Ok(selected)
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            ExecutionService::Sandbox(_) => BackendKind::Docker,
            ExecutionService::CloudJudge(_) => BackendKind::Judge0,
        }
    }
}

#[async_trait]
impl CodeExecutor for ExecutionService {
    async fn execute_code(
        &self,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        match self {
            ExecutionService::Sandbox(executor) => executor.execute(config, cancel).await,
            ExecutionService::CloudJudge(executor) => executor.execute(config, cancel).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ExecutionService::Sandbox(executor) => executor.health_check().await,
            ExecutionService::CloudJudge(executor) => executor.health_check().await,
        }
    }
}
