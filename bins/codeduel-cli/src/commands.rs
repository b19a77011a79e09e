// CLI commands for running and judging submissions locally
use anyhow::{anyhow, bail, Context, Result};
use codeduel_common::config::Settings;
use codeduel_common::types::{ExecutionConfig, Language, TestCase};
use codeduel_judge::{
    extract_output, CodeExecutor, ExecutionService, Judge, JudgeSettings, LanguageConfigManager,
};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tokio_util::sync::CancellationToken;

fn build_service(settings: &Settings) -> Result<ExecutionService> {
    let languages = LanguageConfigManager::load_or_builtin(&settings.languages_config);
    ExecutionService::from_settings(settings, languages)
        .context("Failed to initialise execution backend")
}

/// Token cancelled on Ctrl+C so containers and remote submissions get released
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Interrupted, cancelling...");
            trigger.cancel();
        }
    });
    token
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_test_cases(content: &str) -> Result<Vec<TestCase>> {
    let tests: Vec<TestCase> =
        serde_json::from_str(content).context("Test file must be a JSON array of test cases")?;
    if tests.is_empty() {
        bail!("Test file contains no test cases");
    }
    Ok(tests)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn judge(
    language: Language,
    code_path: &Path,
    tests_path: &Path,
    time_limit: Option<u64>,
    player_view: bool,
) -> Result<()> {
    let settings = Settings::from_env();
    let code = read_source(code_path)?;
    let test_cases = parse_test_cases(&read_source(tests_path)?)
        .with_context(|| format!("Invalid test file {}", tests_path.display()))?;

    let mut judge_settings = JudgeSettings::from(&settings);
    if let Some(ms) = time_limit.filter(|ms| *ms > 0) {
        judge_settings.time_limit_ms = ms;
    }

    let service = build_service(&settings)?;
    eprintln!(
        "⚖️  Judging {} against {} test(s) on the {} backend...",
        code_path.display(),
        test_cases.len(),
        service.backend()
    );

    let judge = Judge::new(service, judge_settings);
    let result = judge
        .judge(&code, language, &test_cases, &cancel_on_ctrl_c())
        .await
        .context("Judging failed")?;

    if player_view {
        print_json(&json!({
            "score": result.score,
            "passed_tests": result.passed_tests,
            "total_tests": result.total_tests,
            "outcomes": result.player_view(&test_cases),
        }))?;
    } else {
        print_json(&result)?;
    }

    eprintln!(
        "✅ Score {:.2}/10 ({}/{} passed)",
        result.score, result.passed_tests, result.total_tests
    );
    Ok(())
}

pub async fn run(
    language: Language,
    code_path: &Path,
    input: &str,
    time_limit: Option<u64>,
) -> Result<()> {
    let settings = Settings::from_env();
    let code = read_source(code_path)?;
    let input: Value = serde_json::from_str(input)
        .with_context(|| format!("Input is not valid JSON: {}", input))?;

    let config = ExecutionConfig::new(
        code,
        language,
        input,
        time_limit.unwrap_or(settings.time_limit_ms),
    )
    .map_err(|e| anyhow!(e))?;

    let service = build_service(&settings)?;
    eprintln!("🚀 Running {} on the {} backend...", code_path.display(), service.backend());

    let result = service
        .execute_code(&config, &cancel_on_ctrl_c())
        .await
        .context("Execution failed")?;

    let output = extract_output(&result.stdout).ok();
    print_json(&json!({
        "execution": result,
        "output": output,
    }))
}

pub async fn health() -> Result<()> {
    let settings = Settings::from_env();
    let service = build_service(&settings)?;

    if service.health_check().await {
        println!("✅ {} backend is healthy", service.backend());
        Ok(())
    } else {
        bail!("{} backend is not reachable", service.backend());
    }
}

pub fn list_languages() -> Result<()> {
    let settings = Settings::from_env();
    let languages = LanguageConfigManager::load_or_builtin(&settings.languages_config);

    println!("📋 Configured languages:");
    for language in languages.list_languages() {
        let config = languages.get_config(&language)?;
        println!(
            "  {:<11} {:<28} {}MB, {} CPU, judge0 id {}",
            language.to_string(),
            config.image,
            config.memory_limit_mb,
            config.cpu_limit,
            config.judge0_language_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_cases_defaults() {
        let tests = parse_test_cases(r#"[{"input": 2, "expected_output": {"result": 4}}]"#).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].weight, 1.0);
        assert!(!tests[0].is_hidden);
    }

    #[test]
    fn test_parse_test_cases_rejects_empty() {
        assert!(parse_test_cases("[]").is_err());
        assert!(parse_test_cases("{}").is_err());
    }
}
