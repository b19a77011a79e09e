// Language runtime configuration for both execution backends
use anyhow::{bail, Context, Result};
use codeduel_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: Language,
    pub version: String,
    /// Docker image with the runtime preinstalled
    pub image: String,
    /// Harness file name inside the sandbox's /tmp
    pub file_name: String,
    /// Syntax/type check run before execution; failure means compile error
    #[serde(default)]
    pub check_command: Option<String>,
    pub run_command: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
    /// Language id in the Judge0 catalogue
    pub judge0_language_id: u32,
}

fn default_pids_limit() -> i64 {
    64
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson =
            serde_json::from_str(content).context("Failed to parse languages.json")?;

        let mut configs = HashMap::new();
        for lang in languages_json.languages {
            if lang.memory_limit_mb == 0 || lang.cpu_limit <= 0.0 {
                bail!("Language '{}' has non-positive resource limits", lang.name);
            }
            configs.insert(lang.name, lang);
        }

        if configs.is_empty() {
            bail!("No languages configured");
        }

        Ok(Self { configs })
    }

    /// Load from `path`, falling back to the built-in runtimes when the file is
    /// missing or unreadable
    pub fn load_or_builtin(path: &Path) -> Self {
        match Self::load(path) {
            Ok(manager) => {
                info!(path = %path.display(), languages = ?manager.list_languages(), "Loaded language configurations");
                manager
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using built-in language configurations");
                Self::builtin()
            }
        }
    }

    pub fn builtin() -> Self {
        let configs = [
            LanguageConfig {
                name: Language::JavaScript,
                version: "20".to_string(),
                image: "node:20-alpine".to_string(),
                file_name: "main.js".to_string(),
                check_command: Some("node --check /tmp/main.js".to_string()),
                run_command: "node /tmp/main.js".to_string(),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                pids_limit: 64,
                judge0_language_id: 63,
            },
            LanguageConfig {
                name: Language::Python,
                version: "3.12".to_string(),
                image: "python:3.12-alpine".to_string(),
                file_name: "main.py".to_string(),
                check_command: Some("python3 -m py_compile /tmp/main.py".to_string()),
                run_command: "python3 -u /tmp/main.py".to_string(),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                pids_limit: 64,
                judge0_language_id: 71,
            },
            LanguageConfig {
                name: Language::TypeScript,
                version: "5".to_string(),
                image: "codeduel-typescript:latest".to_string(),
                file_name: "main.ts".to_string(),
                check_command: Some(
                    "tsc --target es2020 --module commonjs --outDir /tmp/out /tmp/main.ts".to_string(),
                ),
                run_command: "node /tmp/out/main.js".to_string(),
                memory_limit_mb: 384,
                cpu_limit: 0.5,
                pids_limit: 64,
                judge0_language_id: 74,
            },
        ];

        Self {
            configs: configs.into_iter().map(|c| (c.name, c)).collect(),
        }
    }

    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        self.configs
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", language))
    }

    pub fn list_languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.configs.keys().copied().collect();
        langs.sort_by_key(|l| l.to_string());
        langs
    }
}
