/// Output Extractor
///
/// The harness prints its result line last, but the candidate's own code may
/// print anything before it. The rightmost fragment of stdout that parses as
/// JSON is taken as the program's answer.
///
/// Known ambiguity: a JSON-looking debug print emitted *after* the harness
/// line would be selected instead. The harness prints its line at the very end
/// of the run, so this only happens with output from background tasks.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("stdout was empty")]
    Empty,
    #[error("no JSON value found in stdout")]
    NoJson,
}

/// Extract the candidate result from raw stdout
pub fn extract_output(stdout: &str) -> Result<Value, ExtractError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }

    // A single (possibly pretty-printed) document
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    for line in trimmed.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(line) {
            return Ok(value);
        }
        if let Some(value) = rightmost_embedded(line) {
            return Ok(value);
        }
    }

    Err(ExtractError::NoJson)
}

/// Rightmost top-level object or array embedded in a line of text.
///
/// Candidates are scanned left to right; after a successful parse the scan
/// resumes past the parsed value so nested brackets are never picked on their
/// own.
fn rightmost_embedded(line: &str) -> Option<Value> {
    let mut found = None;
    let mut pos = 0;

    while pos < line.len() {
        let Some(offset) = line[pos..].find(['{', '[']) else {
            break;
        };
        let start = pos + offset;

        let mut stream = serde_json::Deserializer::from_str(&line[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                found = Some(value);
                pos = start + stream.byte_offset();
            }
            _ => pos = start + 1,
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_result_line() {
        assert_eq!(extract_output("{\"result\":4}\n"), Ok(json!({"result": 4})));
    }

    #[test]
    fn test_noise_before_result() {
        let stdout = "starting\ndebug: x = 2\nloop done\n{\"result\":4}\n";
        assert_eq!(extract_output(stdout), Ok(json!({"result": 4})));
    }

    #[test]
    fn test_rightmost_json_line_wins() {
        let stdout = "{\"result\":1}\n[1,2,3]\n{\"result\":2}\n";
        assert_eq!(extract_output(stdout), Ok(json!({"result": 2})));
    }

    #[test]
    fn test_trailing_non_json_lines_are_skipped() {
        let stdout = "{\"result\":[1,2]}\nbye\n";
        assert_eq!(extract_output(stdout), Ok(json!({"result": [1, 2]})));
    }

    #[test]
    fn test_scalar_line() {
        assert_eq!(extract_output("computing...\n42\n"), Ok(json!(42)));
        assert_eq!(extract_output("\"done\""), Ok(json!("done")));
    }

    #[test]
    fn test_embedded_json_in_text() {
        let stdout = "answer: {\"a\": {\"b\": 1}} (final)";
        assert_eq!(extract_output(stdout), Ok(json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_embedded_rightmost_of_several() {
        let stdout = "first {\"x\":1} then [2, 3] end";
        assert_eq!(extract_output(stdout), Ok(json!([2, 3])));
    }

    #[test]
    fn test_pretty_printed_document() {
        let stdout = "{\n  \"result\": {\n    \"ok\": true\n  }\n}\n";
        assert_eq!(extract_output(stdout), Ok(json!({"result": {"ok": true}})));
    }

    #[test]
    fn test_empty_and_unparseable() {
        assert_eq!(extract_output(""), Err(ExtractError::Empty));
        assert_eq!(extract_output("  \n\t"), Err(ExtractError::Empty));
        assert_eq!(extract_output("hello world\n{broken"), Err(ExtractError::NoJson));
    }

    #[test]
    fn test_stray_debug_json_after_result_is_selected() {
        // Accepted ambiguity of the rightmost heuristic
        let stdout = "{\"result\":4}\n{\"debug\":true}\n";
        assert_eq!(extract_output(stdout), Ok(json!({"debug": true})));
    }
}
