//! Tests for call-expression discovery and positions

use inwasm_syntax::{ArgumentKind, Position, SyntaxTree};

const MODULE: &str = r#"#!/usr/bin/env node
const { InWasm, OutputType } = require('inwasm');

// InWasm({ name: 'commented' })
const a = InWasm({
  name: 'a',
  type: OutputType.BYTES,
  code: `(module)`
});
const b = lib.InWasm({ name: 'b', code: '/* } */' }); log(b);
"#;

#[test]
fn test_finds_declaration_calls() {
    let tree = SyntaxTree::parse(MODULE).unwrap();
    let names: Vec<_> = tree.calls().iter().filter_map(|c| c.callee_name()).collect();
    assert_eq!(names, vec!["require", "InWasm", "InWasm", "log"]);
}

#[test]
fn test_call_positions() {
    let tree = SyntaxTree::parse(MODULE).unwrap();
    let a = &tree.calls()[1];
    assert_eq!(a.span.start_loc, Position { line: 5, column: 10 });
    assert_eq!(a.span.end_loc, Position { line: 9, column: 2 });
    assert!(a.span.slice(MODULE).starts_with("InWasm({"));
    assert!(a.span.slice(MODULE).ends_with("})"));
    assert!(a.span.covers_line(7));
    assert!(!a.span.covers_line(10));
}

#[test]
fn test_member_callee_identifier_position() {
    let tree = SyntaxTree::parse(MODULE).unwrap();
    let b = &tree.calls()[2];
    let ident = b.callee_ident.as_ref().unwrap();
    assert_eq!(b.span.start_loc, Position { line: 10, column: 10 });
    assert_eq!(ident.span.start_loc, Position { line: 10, column: 14 });
}

#[test]
fn test_single_object_argument_span() {
    let tree = SyntaxTree::parse(MODULE).unwrap();
    let b = &tree.calls()[2];
    let arg = b.single_object_argument().unwrap();
    assert_eq!(arg.kind, ArgumentKind::ObjectLiteral);
    assert_eq!(arg.span.slice(MODULE), "{ name: 'b', code: '/* } */' }");
}

#[test]
fn test_regex_with_parens_does_not_unbalance() {
    let source = "const re = /\\(+/; f(re.test('('));";
    let tree = SyntaxTree::parse(source).unwrap();
    let callees: Vec<_> = tree.calls().iter().filter_map(|c| c.callee_name()).collect();
    assert_eq!(callees, vec!["f", "test"]);
}

#[test]
fn test_object_argument_requires_exact_group() {
    let tree = SyntaxTree::parse("f({a: 1}.a); g({}, {});").unwrap();
    assert!(tree.calls()[0].single_object_argument().is_none());
    assert_eq!(tree.calls()[1].arguments.len(), 2);
    assert!(tree.calls()[1].single_object_argument().is_none());
}

#[test]
fn test_iife_and_chained_calls() {
    let source = "(function () { run(); })(); a.b().c();";
    let tree = SyntaxTree::parse(source).unwrap();
    let texts: Vec<_> = tree.calls().iter().map(|c| c.span.slice(source)).collect();
    assert_eq!(
        texts,
        vec!["(function () { run(); })()", "run()", "a.b().c()", "a.b()"]
    );
}
