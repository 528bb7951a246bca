//! Call-expression tree with position information.

use crate::scope::Binding;
use crate::token::{Span, Token};

/// A position in the source: one-based line, zero-based column (in chars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Byte range plus start/end positions of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeSpan {
    pub start: usize,
    pub end: usize,
    pub start_loc: Position,
    pub end_loc: Position,
}

impl NodeSpan {
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Whether the node's line range contains `line`.
    pub fn covers_line(&self, line: u32) -> bool {
        self.start_loc.line <= line && self.end_loc.line >= line
    }
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    pub fn position(&self, source: &str, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = source[line_start..offset].chars().count();
        Position {
            line: line as u32 + 1,
            column: column as u32,
        }
    }

    pub fn node_span(&self, source: &str, start: usize, end: usize) -> NodeSpan {
        NodeSpan {
            start,
            end,
            start_loc: self.position(source, start),
            end_loc: self.position(source, end),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Shape of a call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// A single `{...}` object literal.
    ObjectLiteral,
    Other,
}

/// One argument of a call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub span: NodeSpan,
    pub kind: ArgumentKind,
    /// The argument's tokens, spans absolute.
    pub tokens: Vec<(Token, Span)>,
}

/// Trailing identifier of a callee (`InWasm` in `lib.InWasm(...)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: NodeSpan,
}

/// A call expression, callee included in its span.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub span: NodeSpan,
    pub callee: NodeSpan,
    pub callee_ident: Option<Ident>,
    pub optional: bool,
    pub arguments: Vec<Argument>,
}

impl CallExpr {
    /// The callee's trailing identifier name, if it ends in one.
    pub fn callee_name(&self) -> Option<&str> {
        self.callee_ident.as_ref().map(|ident| ident.name.as_str())
    }

    /// The sole object-literal argument, if the call has exactly one argument
    /// and it is an object literal.
    pub fn single_object_argument(&self) -> Option<&Argument> {
        match self.arguments.as_slice() {
            [arg] if arg.kind == ArgumentKind::ObjectLiteral => Some(arg),
            _ => None,
        }
    }
}

/// Parsed module: every call expression with positions, ordered by start offset.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub(crate) calls: Vec<CallExpr>,
    pub(crate) line_index: LineIndex,
    pub(crate) bindings: Vec<Binding>,
}

impl SyntaxTree {
    pub fn calls(&self) -> &[CallExpr] {
        &self.calls
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }
}
