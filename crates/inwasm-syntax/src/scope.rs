//! Variable bindings.
//!
//! Records `const`/`let`/`var` declarations of a plain identifier together
//! with their initializer, so identifiers inside a declaration literal can be
//! replaced by the value they were declared with.

use crate::literal::{evaluate, LiteralValue};
use crate::token::{Span, Token};
use crate::tree::SyntaxTree;
use std::ops::Range;

/// `const NAME = <init>` and friends
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    /// Byte offset of the bound identifier
    pub declared_at: usize,
    /// Byte range of the enclosing block, the whole module at top level
    pub scope: Range<usize>,
    pub(crate) init: Vec<(Token, Span)>,
}

impl Binding {
    fn visible_at(&self, offset: usize) -> bool {
        self.declared_at < offset && self.scope.contains(&offset)
    }
}

/// Collect the single-identifier declarators of `tokens`.
pub(crate) fn collect_bindings(tokens: &[(Token, Span)], partner: &[usize]) -> Vec<Binding> {
    let mut bindings = Vec::new();
    let mut blocks: Vec<usize> = Vec::new();

    for (i, (token, _)) in tokens.iter().enumerate() {
        match token {
            Token::LeftBrace => blocks.push(i),
            Token::RightBrace => {
                blocks.pop();
            }
            Token::Const | Token::Let | Token::Var => {
                let scope = match blocks.last() {
                    Some(&open) => tokens[open].1.start..tokens[partner[open]].1.end,
                    None => 0..usize::MAX,
                };
                declarators(tokens, partner, i + 1, &scope, &mut bindings);
            }
            _ => {}
        }
    }

    bindings
}

fn declarators(
    tokens: &[(Token, Span)],
    partner: &[usize],
    mut at: usize,
    scope: &Range<usize>,
    bindings: &mut Vec<Binding>,
) {
    loop {
        let (Some((Token::Identifier(name), span)), Some((Token::Equal, _))) =
            (tokens.get(at), tokens.get(at + 1))
        else {
            return;
        };

        let start = at + 2;
        let end = initializer_end(tokens, partner, start);
        bindings.push(Binding {
            name: name.clone(),
            declared_at: span.start,
            scope: scope.clone(),
            init: tokens[start..end].to_vec(),
        });

        match tokens.get(end) {
            Some((Token::Comma, _)) => at = end + 1,
            _ => return,
        }
    }
}

/// Index one past the initializer starting at `start`.
fn initializer_end(tokens: &[(Token, Span)], partner: &[usize], start: usize) -> usize {
    let mut k = start;
    while k < tokens.len() {
        let (token, span) = &tokens[k];
        match token {
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => {
                k = partner[k] + 1;
                continue;
            }
            Token::Semicolon
            | Token::Comma
            | Token::RightParen
            | Token::RightBracket
            | Token::RightBrace
            | Token::Eof => break,
            _ => {}
        }
        // automatic semicolon at a line break between two operands
        if k > start {
            let previous = &tokens[k - 1];
            if span.line > previous.1.line && previous.0.ends_operand() && !continues_expression(token) {
                break;
            }
        }
        k += 1;
    }
    k
}

fn continues_expression(token: &Token) -> bool {
    matches!(
        token,
        Token::Dot
            | Token::QuestionDot
            | Token::Plus
            | Token::Minus
            | Token::Star
            | Token::Slash
            | Token::Percent
            | Token::StarStar
            | Token::Question
            | Token::QuestionQuestion
            | Token::Colon
            | Token::AmpAmp
            | Token::PipePipe
            | Token::Amp
            | Token::Pipe
            | Token::Caret
            | Token::EqualEqual
            | Token::BangEqual
            | Token::EqualEqualEqual
            | Token::BangEqualEqual
            | Token::Less
            | Token::LessEqual
            | Token::Greater
            | Token::GreaterEqual
            | Token::Arrow
    )
}

impl SyntaxTree {
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// The binding `name` refers to at byte `offset`: the innermost visible
    /// scope wins, then the latest declaration.
    pub fn lookup(&self, name: &str, offset: usize) -> Option<&Binding> {
        self.bindings
            .iter()
            .filter(|binding| binding.name == name && binding.visible_at(offset))
            .max_by_key(|binding| (binding.scope.start, binding.declared_at))
    }

    /// Replace identifier references in `value` by the values they were
    /// declared with, as seen from byte `offset`.
    ///
    /// References that do not resolve to a static value stay as they are.
    /// An initializer only sees bindings declared before it, so lookups
    /// always terminate.
    pub fn resolve_references(&self, value: LiteralValue, offset: usize, source: &str) -> LiteralValue {
        match value {
            LiteralValue::Object(entries) => LiteralValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, self.resolve_references(value, offset, source)))
                    .collect(),
            ),
            LiteralValue::Array(items) => LiteralValue::Array(
                items
                    .into_iter()
                    .map(|item| self.resolve_references(item, offset, source))
                    .collect(),
            ),
            LiteralValue::New { path, arguments } => LiteralValue::New {
                path,
                arguments: arguments
                    .into_iter()
                    .map(|argument| self.resolve_references(argument, offset, source))
                    .collect(),
            },
            LiteralValue::Path(parts) => match self.dereference(&parts, offset, source) {
                Some(value) => value,
                None => LiteralValue::Path(parts),
            },
            other => other,
        }
    }

    fn dereference(&self, parts: &[String], offset: usize, source: &str) -> Option<LiteralValue> {
        let (root, members) = parts.split_first()?;
        let binding = self.lookup(root, offset)?;
        let mut value = self.resolve_references(evaluate(&binding.init, source), binding.declared_at, source);
        for member in members {
            value = value.get(member)?.clone();
        }
        match value {
            LiteralValue::Opaque(_) => None,
            value => Some(value),
        }
    }
}
