/// Harness generation
///
/// Wraps a candidate's source so that running it reads one JSON value from
/// stdin, calls the candidate's entry point with it and prints a single
/// `{"result": ...}` line as the very last thing on stdout. Both backends run
/// the exact same program text; only the transport of the input differs.

use codeduel_common::types::Language;

/// Entry points looked up in order
pub const ENTRY_POINTS: [&str; 2] = ["solution", "solve"];

/// Key of the envelope printed by every harness
pub const RESULT_KEY: &str = "result";

pub fn render(language: Language, code: &str) -> String {
    match language {
        Language::JavaScript => javascript(code),
        Language::TypeScript => typescript(code),
        Language::Python => python(code),
    }
}

fn js_lookup_expr() -> String {
    let mut expr = String::from("undefined");
    for name in ENTRY_POINTS.iter().rev() {
        expr = format!("(typeof {name} === 'function' ? {name} : {expr})");
    }
    expr
}

const JS_RUNNER: &str = r#"
(async () => {
  try {
    const __raw = require('fs').readFileSync(0, 'utf8');
    const __input = __raw.trim().length > 0 ? JSON.parse(__raw) : null;
    const __fn = __LOOKUP__ || (typeof module.exports === 'function' ? module.exports : undefined);
    if (typeof __fn !== 'function') {
      process.stderr.write('No entry point found: define a function named __NAMES__\n');
      process.exitCode = 1;
      return;
    }
    const __value = await __fn(__input);
    process.stdout.write('\n' + JSON.stringify({ __KEY__: __value === undefined ? null : __value }) + '\n');
  } catch (err) {
    process.stderr.write(String(err && err.stack ? err.stack : err) + '\n');
    process.exitCode = 1;
  }
})();
"#;

fn js_runner(lookup: &str) -> String {
    JS_RUNNER
        .replace("__LOOKUP__", lookup)
        .replace("__NAMES__", &ENTRY_POINTS.join(" or "))
        .replace("__KEY__", RESULT_KEY)
}

fn javascript(code: &str) -> String {
    format!("{code}\n;{}", js_runner(&js_lookup_expr()))
}

// Declarations keep tsc happy without @types/node in the image. The lookup goes
// through a direct eval so missing names are not type errors.
fn typescript(code: &str) -> String {
    let lookup = format!("eval({:?})", js_lookup_expr());
    format!(
        "declare const require: any;\ndeclare const process: any;\ndeclare const module: any;\n{code}\n;{}",
        js_runner(&lookup)
    )
}

const PY_RUNNER: &str = r#"

def __codeduel_main():
    import inspect as __inspect
    import json as __json
    import sys as __sys

    __raw = __sys.stdin.read()
    __input = __json.loads(__raw) if __raw.strip() else None
    __fn = None
    for __name in (__NAMES__):
        __candidate = globals().get(__name)
        if callable(__candidate):
            __fn = __candidate
            break
    if __fn is None:
        __sys.stderr.write("No entry point found: define a function named __HUMAN__\n")
        __sys.exit(1)
    __value = __fn(__input)
    if __inspect.iscoroutine(__value):
        import asyncio as __asyncio
        __value = __asyncio.run(__value)
    __sys.stdout.write("\n" + __json.dumps({"__KEY__": __value}, default=str) + "\n")
    __sys.stdout.flush()


__codeduel_main()
"#;

fn python(code: &str) -> String {
    let names = ENTRY_POINTS
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let runner = PY_RUNNER
        .replace("__NAMES__", &format!("{names},"))
        .replace("__HUMAN__", &ENTRY_POINTS.join(" or "))
        .replace("__KEY__", RESULT_KEY);
    format!("{code}\n{runner}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_javascript_harness_keeps_code_first() {
        let code = "function solution(x) { return x * 2; }";
        let program = render(Language::JavaScript, code);
        assert!(program.starts_with(code));
        assert!(program.contains("typeof solution === 'function'"));
        assert!(program.contains("typeof solve === 'function'"));
        assert!(program.contains("JSON.stringify({ result:"));
        assert!(!program.contains("__LOOKUP__"));
    }

    #[test]
    fn test_typescript_harness_declares_node_globals() {
        let program = render(Language::TypeScript, "const solution = (n: number): number => n + 1;");
        assert!(program.starts_with("declare const require: any;"));
        assert!(program.contains("eval(\"(typeof solution"));
        assert!(program.contains("const solution = (n: number)"));
    }

    #[test]
    fn test_python_harness() {
        let code = "def solution(x):\n    return x * 2";
        let program = render(Language::Python, code);
        assert!(program.starts_with(code));
        assert!(program.contains("for __name in (\"solution\", \"solve\",):"));
        assert!(program.contains("__json.dumps({\"result\": __value}"));
        assert!(program.trim_end().ends_with("__codeduel_main()"));
    }

    #[test]
    fn test_lookup_expression_order() {
        assert_eq!(
            js_lookup_expr(),
            "(typeof solution === 'function' ? solution : (typeof solve === 'function' ? solve : undefined))"
        );
    }
}
