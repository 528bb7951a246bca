//! Tests for static evaluation of declaration literals

use inwasm_syntax::{evaluate, LiteralValue, SyntaxTree};

fn first_argument(source: &str) -> LiteralValue {
    let tree = SyntaxTree::parse(source).unwrap();
    let arg = tree.calls()[0].single_object_argument().unwrap();
    evaluate(&arg.tokens, source)
}

#[test]
fn test_declaration_literal() {
    let source = r#"InWasm({
  name: 'sum',
  type: OutputType.MODULE,
  mode: OutputMode.ASYNC,
  srctype: 'Clang-C',
  compile: { defines: { N: 16, DEBUG: true }, switches: ['-O3'] },
  trackChanges: ['data/*.bin'],
  trackMode: 'content',
  noCache: false,
  imports: { env: { memory: new WebAssembly.Memory({ initial: 1, shared: true }) } },
  exports: { sum: (p, n) => 0 },
  code: `
    int sum(int *p, int n) { int s = 0; for (int i = 0; i < n; i++) s += p[i]; return s; }
  `,
})"#;
    let value = first_argument(source);

    assert_eq!(value.get("name").and_then(|v| v.as_str()), Some("sum"));
    assert_eq!(
        value.get("type").and_then(|v| v.path()),
        Some("OutputType.MODULE".to_string())
    );
    assert_eq!(value.get("noCache").and_then(|v| v.as_bool()), Some(false));

    let compile = value.get("compile").unwrap();
    let defines = compile.get("defines").unwrap();
    assert_eq!(defines.get("N").and_then(|v| v.as_f64()), Some(16.0));
    assert_eq!(defines.get("DEBUG").and_then(|v| v.as_bool()), Some(true));

    let memory = value
        .get("imports")
        .and_then(|v| v.get("env"))
        .and_then(|v| v.get("memory"))
        .unwrap();
    assert!(matches!(memory, LiteralValue::New { path, .. } if path.join(".") == "WebAssembly.Memory"));

    assert_eq!(
        value.get("exports").and_then(|v| v.get("sum")),
        Some(&LiteralValue::Function)
    );
    assert!(value
        .get("code")
        .and_then(|v| v.as_str())
        .unwrap()
        .contains("int sum(int *p, int n)"));
}

#[test]
fn test_resolved_record_literal() {
    let value = first_argument("InWasm({s:1,t:0,d:'AAECAw=='})");
    assert_eq!(value.get("s"), Some(&LiteralValue::Number(1.0)));
    assert_eq!(value.get("t"), Some(&LiteralValue::Number(0.0)));
    assert_eq!(value.get("d").and_then(|v| v.as_str()), Some("AAECAw=="));
}

#[test]
fn test_missing_and_nullish_fields() {
    let value = first_argument("InWasm({ name: undefined, imports: null })");
    assert!(value.get("name").unwrap().is_nullish());
    assert!(value.get("imports").unwrap().is_nullish());
    assert!(value.get("code").is_none());
}
