//! Call-expression discovery.
//!
//! The parser does not build a full expression tree. It balances brackets and
//! then decides, for every `(` group, whether it is the argument list of a call
//! expression. For calls it walks the callee chain backwards to find where the
//! call expression starts, so node spans match what a full parser would report
//! for `CallExpression` nodes.

use crate::lexer::{LexError, Lexer};
use crate::scope::collect_bindings;
use crate::token::{Span, TemplatePart, Token};
use crate::tree::{Argument, ArgumentKind, CallExpr, Ident, LineIndex, SyntaxTree};
use thiserror::Error;

/// Errors that can occur while parsing a module
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The lexer rejected the input
    #[error("{}", first_lex_error(.0))]
    Lex(Vec<LexError>),

    /// A closing bracket without a matching opener
    #[error("Unexpected '{found}' at {}:{}", .span.line, .span.column)]
    UnexpectedClose {
        /// Offending bracket
        found: char,
        /// Location of the bracket
        span: Span,
    },

    /// A closing bracket that does not match the innermost opener
    #[error("Expected '{expected}' but found '{found}' at {}:{}", .span.line, .span.column)]
    Mismatched {
        /// Closing bracket the open group needs
        expected: char,
        /// Bracket actually found
        found: char,
        /// Location of the found bracket
        span: Span,
    },

    /// End of input with open groups left
    #[error("Unclosed '{open}' opened at {}:{}", .span.line, .span.column)]
    Unclosed {
        /// Opening bracket
        open: char,
        /// Location of the opener
        span: Span,
    },
}

fn first_lex_error(errors: &[LexError]) -> String {
    errors.first().map(|e| e.to_string()).unwrap_or_default()
}

impl ParseError {
    /// Format the error with source context
    pub fn format_with_source(&self, source: &str) -> String {
        match self {
            ParseError::Lex(errors) => Lexer::format_errors(errors, source),
            other => other.to_string(),
        }
    }
}

impl SyntaxTree {
    /// Parse `source` and collect every call expression.
    pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
        let mut tokens = Lexer::new(source).tokenize().map_err(ParseError::Lex)?;
        tokens.pop(); // EOF

        let line_index = LineIndex::new(source);
        let mut calls = Vec::new();
        collect_calls(source, &line_index, &tokens, &mut calls)?;
        calls.sort_by_key(|call| (call.span.start, std::cmp::Reverse(call.span.end)));

        let partner = match_brackets(&tokens)?;
        let bindings = collect_bindings(&tokens, &partner);

        Ok(SyntaxTree {
            calls,
            line_index,
            bindings,
        })
    }
}

fn closing_of(token: &Token) -> Option<(Token, char)> {
    match token {
        Token::LeftParen => Some((Token::RightParen, ')')),
        Token::LeftBracket => Some((Token::RightBracket, ']')),
        Token::LeftBrace => Some((Token::RightBrace, '}')),
        _ => None,
    }
}

fn bracket_char(token: &Token) -> Option<char> {
    match token {
        Token::RightParen => Some(')'),
        Token::RightBracket => Some(']'),
        Token::RightBrace => Some('}'),
        Token::LeftParen => Some('('),
        Token::LeftBracket => Some('['),
        Token::LeftBrace => Some('{'),
        _ => None,
    }
}

/// Matching partner index for every bracket token, `usize::MAX` elsewhere.
pub(crate) fn match_brackets(tokens: &[(Token, Span)]) -> Result<Vec<usize>, ParseError> {
    let mut partner = vec![usize::MAX; tokens.len()];
    let mut stack: Vec<usize> = Vec::new();

    for (i, (token, span)) in tokens.iter().enumerate() {
        match token {
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => stack.push(i),
            Token::RightParen | Token::RightBracket | Token::RightBrace => {
                let found = bracket_char(token).unwrap_or('?');
                let Some(open) = stack.pop() else {
                    return Err(ParseError::UnexpectedClose { found, span: *span });
                };
                if let Some((close, expected)) = closing_of(&tokens[open].0) {
                    if &close != token {
                        return Err(ParseError::Mismatched {
                            expected,
                            found,
                            span: *span,
                        });
                    }
                }
                partner[open] = i;
                partner[i] = open;
            }
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        let (token, span) = &tokens[open];
        return Err(ParseError::Unclosed {
            open: bracket_char(token).unwrap_or('?'),
            span: *span,
        });
    }

    Ok(partner)
}

fn collect_calls(
    source: &str,
    index: &LineIndex,
    tokens: &[(Token, Span)],
    calls: &mut Vec<CallExpr>,
) -> Result<(), ParseError> {
    let partner = match_brackets(tokens)?;

    for (i, (token, _)) in tokens.iter().enumerate() {
        match token {
            Token::LeftParen => {
                if let Some(call) = call_at(source, index, tokens, &partner, i) {
                    calls.push(call);
                }
            }
            Token::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Expression(inner) = part {
                        collect_calls(source, index, inner, calls)?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Build the call expression whose argument list opens at `open`, if the
/// group is an argument list at all.
fn call_at(
    source: &str,
    index: &LineIndex,
    tokens: &[(Token, Span)],
    partner: &[usize],
    open: usize,
) -> Option<CallExpr> {
    let close = partner[open];
    let before = open.checked_sub(1)?;

    // Arrow parameters: `async (a) => ...`, `(a) => ...`
    if matches!(tokens.get(close + 1), Some((Token::Arrow, _))) {
        return None;
    }

    let (optional, callee_end) = match &tokens[before].0 {
        Token::QuestionDot => (true, before.checked_sub(1)?),
        token if token.ends_operand() => (false, before),
        _ => return None,
    };

    // `function name(` and `function* name(`
    if let Token::Identifier(_) = tokens[callee_end].0 {
        let head = callee_end.checked_sub(1).map(|k| &tokens[k].0);
        let star_head = callee_end.checked_sub(2).map(|k| &tokens[k].0);
        if matches!(head, Some(Token::Function))
            || (matches!(head, Some(Token::Star)) && matches!(star_head, Some(Token::Function)))
        {
            return None;
        }
    }

    // Method definitions: `name(...) {`
    if !optional && matches!(tokens.get(close + 1), Some((Token::LeftBrace, _))) {
        return None;
    }

    let (mut start, through_call) = callee_start(tokens, partner, callee_end)?;

    // `new X(...)` is a NewExpression; `new X().y(...)` is a call on its result
    if start > 0 && tokens[start - 1].0 == Token::New {
        if !through_call {
            return None;
        }
        start -= 1;
    }

    // `(0, lib.InWasm)(...)` names its callee inside the parentheses
    let ident_at = if tokens[callee_end].0 == Token::RightParen && partner[callee_end] == start {
        callee_end - 1
    } else {
        callee_end
    };
    let callee_ident = match &tokens[ident_at] {
        (Token::Identifier(name), span) => Some(Ident {
            name: name.clone(),
            span: index.node_span(source, span.start, span.end),
        }),
        _ => None,
    };

    Some(CallExpr {
        span: index.node_span(source, tokens[start].1.start, tokens[close].1.end),
        callee: index.node_span(source, tokens[start].1.start, tokens[callee_end].1.end),
        callee_ident,
        optional,
        arguments: split_arguments(source, index, tokens, partner, open, close),
    })
}

/// Walk a member/call chain backwards from `end`.
///
/// Returns the index of the chain's first token and whether the walk crossed
/// the argument list of an earlier call.
fn callee_start(tokens: &[(Token, Span)], partner: &[usize], end: usize) -> Option<(usize, bool)> {
    let mut j = end;
    let mut through_call = false;

    loop {
        match &tokens[j].0 {
            Token::RightParen | Token::RightBracket => {
                let group_open = partner[j];
                let prev = group_open.checked_sub(1).map(|k| &tokens[k].0);
                match prev {
                    Some(Token::QuestionDot) => {
                        through_call |= tokens[j].0 == Token::RightParen;
                        j = group_open.checked_sub(2)?;
                    }
                    Some(token) if token.ends_operand() => {
                        through_call |= tokens[j].0 == Token::RightParen;
                        j = group_open - 1;
                    }
                    // parenthesized expression or array literal
                    _ => return Some((group_open, through_call)),
                }
            }
            Token::Template(_) => match j.checked_sub(1).map(|k| &tokens[k].0) {
                // tagged template
                Some(token) if token.ends_operand() => j -= 1,
                _ => return Some((j, through_call)),
            },
            token if token.ends_operand() => match j.checked_sub(1).map(|k| &tokens[k].0) {
                Some(Token::Dot) | Some(Token::QuestionDot) => j = j.checked_sub(2)?,
                _ => return Some((j, through_call)),
            },
            _ => return None,
        }
    }
}

fn split_arguments(
    source: &str,
    index: &LineIndex,
    tokens: &[(Token, Span)],
    partner: &[usize],
    open: usize,
    close: usize,
) -> Vec<Argument> {
    let mut arguments = Vec::new();
    let mut arg_start = open + 1;
    let mut k = open + 1;

    while k <= close {
        match &tokens[k].0 {
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => k = partner[k] + 1,
            Token::Comma | Token::RightParen => {
                if k > arg_start {
                    arguments.push(make_argument(source, index, tokens, partner, arg_start, k));
                }
                arg_start = k + 1;
                k += 1;
            }
            _ => k += 1,
        }
    }

    arguments
}

fn make_argument(
    source: &str,
    index: &LineIndex,
    tokens: &[(Token, Span)],
    partner: &[usize],
    first: usize,
    end: usize,
) -> Argument {
    let last = end - 1;
    let kind = if tokens[first].0 == Token::LeftBrace && partner[first] == last {
        ArgumentKind::ObjectLiteral
    } else {
        ArgumentKind::Other
    };

    Argument {
        span: index.node_span(source, tokens[first].1.start, tokens[last].1.end),
        kind,
        tokens: tokens[first..end].to_vec(),
    }
}
