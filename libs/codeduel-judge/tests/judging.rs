use async_trait::async_trait;
use codeduel_common::config::{BackendKind, Settings};
use codeduel_common::types::{ErrorKind, ExecutionConfig, ExecutionResult, Language, TestCase};
use codeduel_judge::{
    CodeExecutor, ExecutionError, ExecutionService, Judge, JudgeError, JudgeSettings,
    LanguageConfigManager,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Replays canned stdout keyed by the test input
struct Scripted {
    stdout: HashMap<String, String>,
}

impl Scripted {
    fn new(pairs: &[(Value, &str)]) -> Self {
        Self {
            stdout: pairs
                .iter()
                .map(|(input, out)| (input.to_string(), out.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl CodeExecutor for Scripted {
    async fn execute_code(
        &self,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        let stdout = self
            .stdout
            .get(&config.test_input.to_string())
            .cloned()
            .ok_or_else(|| ExecutionError::Provider("no script for input".to_string()))?;
        Ok(ExecutionResult {
            exit_code: 0,
            stdout,
            execution_time_ms: 3,
            ..Default::default()
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn case(input: Value, expected: Value, hidden: bool, weight: f64) -> TestCase {
    TestCase {
        input,
        expected_output: expected,
        is_hidden: hidden,
        weight,
    }
}

#[tokio::test]
async fn partial_credit_with_hidden_tests() {
    let executor = Scripted::new(&[
        (json!([1, 2]), "{\"result\": 3}"),
        (json!([2, 2]), "debug: adding\n{\"result\": 4}"),
        (json!([5, 5]), "{\"result\": 11}"),
    ]);
    let tests = vec![
        case(json!([1, 2]), json!(3), false, 1.0),
        case(json!([2, 2]), json!(4), true, 1.0),
        case(json!([5, 5]), json!(10), true, 2.0),
    ];

    let judge = Judge::new(executor, JudgeSettings::default());
    let result = judge
        .judge("def solution(a, b): ...", Language::Python, &tests, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.score, 5.0);
    assert_eq!(result.passed_tests, 2);
    assert_eq!(result.outcomes[2].error_kind, ErrorKind::OutputMismatch);

    let view = result.player_view(&tests);
    assert_eq!(view.len(), 3);
    assert_eq!(view[0].actual_output, Some(json!(3)));
    assert!(view[2].is_hidden);
    assert_eq!(view[2].actual_output, None);
}

#[tokio::test]
async fn infrastructure_failure_surfaces_test_index() {
    let executor = Scripted::new(&[(json!(1), "{\"result\": 1}")]);
    let tests = vec![case(json!(1), json!(1), false, 1.0), case(json!(2), json!(2), false, 1.0)];

    let err = Judge::new(executor, JudgeSettings::default())
        .judge("x", Language::JavaScript, &tests, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        JudgeError::Infrastructure { test_index, source } => {
            assert_eq!(test_index, 1);
            assert!(matches!(source, ExecutionError::Provider(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn service_falls_back_without_judge0_key() {
    let settings = Settings::from_lookup(|key| match key {
        "EXECUTION_BACKEND" => Some("JUDGE0".to_string()),
        _ => None,
    });
    let service = ExecutionService::from_settings(&settings, LanguageConfigManager::builtin()).unwrap();
    assert_eq!(service.backend(), BackendKind::Docker);
}

#[tokio::test]
#[ignore] // Requires Docker daemon and node:20-alpine
async fn sandbox_end_to_end_javascript() {
    let service = ExecutionService::from_settings(&Settings::default(), LanguageConfigManager::builtin()).unwrap();
    let judge = Judge::new(service, JudgeSettings::default());
    let tests = vec![
        case(json!(2), json!({"result": 4}), false, 1.0),
        case(json!(3), json!(6), true, 1.0),
    ];

    let result = judge
        .judge(
            "function solution(x) { console.log('noise'); return x * 2; }",
            Language::JavaScript,
            &tests,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.score, 10.0);
}
