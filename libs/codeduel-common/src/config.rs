// Process configuration, read once from the environment at startup

use std::fmt;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_JUDGE0_URL: &str = "https://judge0-ce.p.rapidapi.com";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Docker,
    Judge0,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Docker => write!(f, "docker"),
            BackendKind::Judge0 => write!(f, "judge0"),
        }
    }
}

/// What the judging engine does when the backend itself fails mid-submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraFailurePolicy {
    /// Stop and surface a system error for the whole submission
    AbortSubmission,
    /// Record the affected test as failed and keep going
    FailTest,
}

#[derive(Clone)]
pub struct Judge0Settings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub poll_interval_ms: u64,
}

impl fmt::Debug for Judge0Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Judge0Settings")
            .field("api_url", &self.api_url)
            .field("api_key_set", &self.api_key.is_some())
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

#[derive(Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub judge0: Judge0Settings,
    pub languages_config: PathBuf,
    pub time_limit_ms: u64,
    pub max_concurrency: usize,
    pub infra_policy: InfraFailurePolicy,
    pub redis_url: String,
    pub health_addr: String,
}

// Keeps the API key out of logs
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("backend", &self.backend)
            .field("judge0_url", &self.judge0.api_url)
            .field("judge0_key_set", &self.judge0.api_key.is_some())
            .field("languages_config", &self.languages_config)
            .field("time_limit_ms", &self.time_limit_ms)
            .field("max_concurrency", &self.max_concurrency)
            .field("infra_policy", &self.infra_policy)
            .field("redis_url", &self.redis_url)
            .field("health_addr", &self.health_addr)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Malformed values fall back
    /// to their defaults with a warning; nothing here is fatal.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match get("EXECUTION_BACKEND").map(|v| v.to_lowercase()) {
            None => BackendKind::Docker,
            Some(v) if v == "docker" => BackendKind::Docker,
            Some(v) if v == "judge0" => BackendKind::Judge0,
            Some(other) => {
                warn!(value = %other, "Unknown EXECUTION_BACKEND, using docker");
                BackendKind::Docker
            }
        };

        let infra_policy = match get("JUDGE_INFRA_POLICY").map(|v| v.to_lowercase()) {
            Some(v) if v == "fail_test" => InfraFailurePolicy::FailTest,
            Some(v) if v != "abort" => {
                warn!(value = %v, "Unknown JUDGE_INFRA_POLICY, using abort");
                InfraFailurePolicy::AbortSubmission
            }
            _ => InfraFailurePolicy::AbortSubmission,
        };

        Self {
            backend,
            judge0: Judge0Settings {
                api_url: get("JUDGE0_API_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_JUDGE0_URL.to_string()),
                api_key: get("JUDGE0_API_KEY"),
                poll_interval_ms: parse_or("JUDGE0_POLL_INTERVAL_MS", get("JUDGE0_POLL_INTERVAL_MS"), 500),
            },
            languages_config: get("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/languages.json")),
            time_limit_ms: parse_or("JUDGE_TIME_LIMIT_MS", get("JUDGE_TIME_LIMIT_MS"), 5000),
            max_concurrency: parse_or("JUDGE_MAX_CONCURRENCY", get("JUDGE_MAX_CONCURRENCY"), 4usize).max(1),
            infra_policy,
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            health_addr: get("HEALTH_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + PartialOrd + Default,
{
    match raw {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(v) if v > T::default() => v,
            _ => {
                warn!(key = key, value = %raw, "Invalid numeric setting, using default");
                default
            }
        },
    }
}
