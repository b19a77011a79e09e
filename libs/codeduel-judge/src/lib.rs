pub mod engine;
pub mod error;
pub mod extractor;
pub mod harness;
pub mod judge0;
pub mod languages;
pub mod retry;
pub mod sandbox;
pub mod service;

pub use engine::{Judge, JudgeSettings};
pub use error::{ExecutionError, JudgeError};
pub use extractor::{extract_output, ExtractError};
pub use judge0::Judge0Executor;
pub use languages::{LanguageConfig, LanguageConfigManager};
pub use retry::RetryPolicy;
pub use sandbox::SandboxExecutor;
pub use service::{CodeExecutor, ExecutionService};
