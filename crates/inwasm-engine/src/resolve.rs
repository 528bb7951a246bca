//! Stack-to-source resolution
//!
//! Maps the call-site frame of a captured trace to the single object-literal
//! argument of the declaration call at that position.

use crate::stack::StackFrame;
use inwasm_syntax::{CallExpr, SyntaxTree};
use thiserror::Error;

/// Errors that can occur while resolving a call site
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A trace line matched neither frame shape
    #[error("error parsing stack positions: '{line}'")]
    StackParse { line: String },

    /// No frame in the file follows the declaration wrapper
    #[error("cannot find a distinct InWasm call in the call stack")]
    NoFrame,

    /// No call expression covers the frame position
    #[error("malformed source: no InWasm call expression at {line}:{column}")]
    NoCall { line: u32, column: u32 },

    /// Nested or overlapping calls at the frame position
    #[error("malformed source: cannot determine the InWasm call at {line}:{column}")]
    Ambiguous { line: u32, column: u32 },

    /// The call's arguments are not a single object literal
    #[error("malformed source: expected one object-literal argument at {line}:{column}")]
    ExpectedObjectLiteral { line: u32, column: u32 },

    /// The file does not parse
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Byte span of a declaration's object-literal argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSiteBlock {
    pub start: usize,
    pub end: usize,
}

/// Resolve the declaration argument at `frame` in `source`.
pub fn resolve_call_site(frame: &StackFrame, source: &str) -> Result<CallSiteBlock, ResolveError> {
    let tree = SyntaxTree::parse(source).map_err(|e| ResolveError::Syntax(e.to_string()))?;
    resolve_in_tree(frame, &tree)
}

/// Resolve against an already parsed tree.
pub fn resolve_in_tree(frame: &StackFrame, tree: &SyntaxTree) -> Result<CallSiteBlock, ResolveError> {
    let (line, column) = (frame.line, frame.column);

    // node columns are zero-based, frame columns one-based
    let candidates: Vec<&CallExpr> = tree
        .calls()
        .iter()
        .filter(|call| call.span.covers_line(line))
        .filter(|call| {
            let (start, end) = (call.span.start_loc, call.span.end_loc);
            if start.line == line && end.line == line {
                if start.column < column && end.column < column {
                    return false;
                }
                if start.column > column {
                    return false;
                }
            }
            true
        })
        .collect();

    let innermost = candidates
        .iter()
        .copied()
        .reduce(|best, call| {
            // `InWasm({...})(imports)`: both calls start at `InWasm`
            let inner = call.span.start > best.span.start
                || (call.span.start == best.span.start && call.span.end < best.span.end);
            if inner {
                call
            } else {
                best
            }
        })
        .ok_or(ResolveError::NoCall { line, column })?;

    if candidates.len() > 1 {
        let min_end = candidates.iter().map(|call| call.span.end).min().unwrap_or(usize::MAX);
        if innermost.span.end > min_end {
            return Err(ResolveError::Ambiguous { line, column });
        }
    }

    let argument = innermost
        .single_object_argument()
        .ok_or(ResolveError::ExpectedObjectLiteral { line, column })?;

    Ok(CallSiteBlock {
        start: argument.span.start,
        end: argument.span.end,
    })
}
