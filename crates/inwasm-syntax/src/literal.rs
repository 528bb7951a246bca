//! Static evaluation of literal expressions.
//!
//! Declarations are plain object literals, so evaluating the handful of
//! expression forms that appear in them is enough to read one without running
//! any code. Anything else evaluates to [`LiteralValue::Opaque`].

use crate::parser::match_brackets;
use crate::token::{Span, TemplatePart, Token};
use std::ops::Range;

/// Value of a literal expression.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Object literal entries in source order. Spread entries are dropped.
    Object(Vec<(String, LiteralValue)>),
    Array(Vec<LiteralValue>),
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    Undefined,
    /// Identifier or member path, `OutputType.Instance`.
    Path(Vec<String>),
    /// `new Path(args)`
    New {
        path: Vec<String>,
        arguments: Vec<LiteralValue>,
    },
    /// Function or arrow expression, body not evaluated.
    Function,
    /// Any other expression, as source text.
    Opaque(String),
}

impl LiteralValue {
    pub fn get(&self, key: &str) -> Option<&LiteralValue> {
        match self {
            LiteralValue::Object(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LiteralValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LiteralValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Member path joined with dots.
    pub fn path(&self) -> Option<String> {
        match self {
            LiteralValue::Path(parts) => Some(parts.join(".")),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, LiteralValue::Null | LiteralValue::Undefined)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LiteralValue::Object(_) => "object",
            LiteralValue::Array(_) => "array",
            LiteralValue::String(_) => "string",
            LiteralValue::Number(_) => "number",
            LiteralValue::Bool(_) => "boolean",
            LiteralValue::Null => "null",
            LiteralValue::Undefined => "undefined",
            LiteralValue::Path(_) => "reference",
            LiteralValue::New { .. } => "new expression",
            LiteralValue::Function => "function",
            LiteralValue::Opaque(_) => "expression",
        }
    }
}

/// Evaluate an expression given as its tokens.
///
/// `source` is the text the token spans point into; it is only used to
/// capture the text of opaque expressions.
pub fn evaluate(tokens: &[(Token, Span)], source: &str) -> LiteralValue {
    let tokens = match tokens.last() {
        Some((Token::Eof, _)) => &tokens[..tokens.len() - 1],
        _ => tokens,
    };
    let Ok(partner) = match_brackets(tokens) else {
        return opaque(tokens, source);
    };
    Evaluator {
        tokens,
        partner: &partner,
        source,
    }
    .value(0..tokens.len())
}

fn opaque(tokens: &[(Token, Span)], source: &str) -> LiteralValue {
    match (tokens.first(), tokens.last()) {
        (Some((_, first)), Some((_, last))) => {
            LiteralValue::Opaque(source[first.start..last.end].to_string())
        }
        _ => LiteralValue::Undefined,
    }
}

struct Evaluator<'a> {
    tokens: &'a [(Token, Span)],
    partner: &'a [usize],
    source: &'a str,
}

impl<'a> Evaluator<'a> {
    fn token(&self, i: usize) -> &'a Token {
        &self.tokens[i].0
    }

    /// Whether `range` is exactly one bracket group opened by `open`.
    fn is_group(&self, range: &Range<usize>, open: Token) -> bool {
        !range.is_empty()
            && *self.token(range.start) == open
            && self.partner[range.start] == range.end - 1
    }

    /// Split `range` at top-level occurrences of `sep`.
    fn split(&self, range: Range<usize>, sep: &Token) -> Vec<Range<usize>> {
        let mut parts = Vec::new();
        let mut start = range.start;
        let mut k = range.start;
        while k < range.end {
            match self.token(k) {
                Token::LeftParen | Token::LeftBracket | Token::LeftBrace => {
                    k = self.partner[k] + 1;
                    continue;
                }
                token if token == sep => {
                    parts.push(start..k);
                    start = k + 1;
                }
                _ => {}
            }
            k += 1;
        }
        parts.push(start..range.end);
        parts
    }

    fn contains_top_level(&self, range: Range<usize>, needle: &Token) -> bool {
        self.split(range, needle).len() > 1
    }

    fn value(&self, range: Range<usize>) -> LiteralValue {
        if range.is_empty() {
            return LiteralValue::Undefined;
        }

        if self.is_function(range.clone()) {
            return LiteralValue::Function;
        }

        if self.is_group(&range, Token::LeftBrace) {
            return self.object(range.start + 1..range.end - 1);
        }
        if self.is_group(&range, Token::LeftBracket) {
            return LiteralValue::Array(
                self.list(range.start + 1..range.end - 1)
                    .into_iter()
                    .map(|item| self.value(item))
                    .collect(),
            );
        }
        if self.is_group(&range, Token::LeftParen) {
            return self.value(range.start + 1..range.end - 1);
        }

        if range.len() == 1 {
            if let Some(value) = self.single(range.start) {
                return value;
            }
        }

        if range.len() == 2 && *self.token(range.start) == Token::Minus {
            if let Token::Number(n) = self.token(range.start + 1) {
                return LiteralValue::Number(-n);
            }
        }

        if let Some(path) = self.path(range.clone()) {
            return LiteralValue::Path(path);
        }

        if *self.token(range.start) == Token::New {
            if let Some(value) = self.new_expression(range.start + 1..range.end) {
                return value;
            }
        }

        if let Some(text) = self.concatenation(range.clone()) {
            return LiteralValue::String(text);
        }

        opaque(&self.tokens[range], self.source)
    }

    fn single(&self, i: usize) -> Option<LiteralValue> {
        let value = match self.token(i) {
            Token::String(s) => LiteralValue::String(s.clone()),
            Token::Number(n) => LiteralValue::Number(*n),
            Token::True => LiteralValue::Bool(true),
            Token::False => LiteralValue::Bool(false),
            Token::Null => LiteralValue::Null,
            Token::Identifier(name) if name == "undefined" => LiteralValue::Undefined,
            Token::Template(parts) => LiteralValue::String(template_text(parts)?),
            _ => return None,
        };
        Some(value)
    }

    fn is_function(&self, range: Range<usize>) -> bool {
        let first = self.token(range.start);
        let second = range.clone().nth(1).map(|k| self.token(k));
        match first {
            Token::Function | Token::Class => true,
            Token::Identifier(name) if name == "async" && matches!(second, Some(Token::Function)) => {
                true
            }
            _ => self.contains_top_level(range, &Token::Arrow),
        }
    }

    /// `a`, `a.b.c`
    fn path(&self, range: Range<usize>) -> Option<Vec<String>> {
        if range.len() % 2 == 0 {
            return None;
        }
        let mut parts = Vec::new();
        for (n, k) in range.enumerate() {
            match (n % 2, self.token(k)) {
                (0, Token::Identifier(name)) => parts.push(name.clone()),
                (0, Token::This) => parts.push("this".to_string()),
                (1, Token::Dot) => {}
                _ => return None,
            }
        }
        Some(parts)
    }

    fn new_expression(&self, range: Range<usize>) -> Option<LiteralValue> {
        let args_open = (range.start..range.end).find(|&k| *self.token(k) == Token::LeftParen)?;
        if self.partner[args_open] != range.end - 1 {
            return None;
        }
        let path = self.path(range.start..args_open)?;
        let arguments = self
            .list(args_open + 1..range.end - 1)
            .into_iter()
            .map(|arg| self.value(arg))
            .collect();
        Some(LiteralValue::New { path, arguments })
    }

    /// `'a' + "b" + `c``
    fn concatenation(&self, range: Range<usize>) -> Option<String> {
        let pieces = self.split(range, &Token::Plus);
        if pieces.len() < 2 {
            return None;
        }
        let mut text = String::new();
        for piece in pieces {
            match self.value(piece) {
                LiteralValue::String(s) => text.push_str(&s),
                _ => return None,
            }
        }
        Some(text)
    }

    /// Comma-separated items, trailing comma allowed.
    fn list(&self, range: Range<usize>) -> Vec<Range<usize>> {
        let mut items = self.split(range, &Token::Comma);
        if items.last().is_some_and(|last| last.is_empty()) {
            items.pop();
        }
        items
    }

    fn object(&self, range: Range<usize>) -> LiteralValue {
        let mut entries = Vec::new();

        for entry in self.list(range) {
            if entry.is_empty() || *self.token(entry.start) == Token::DotDotDot {
                continue;
            }

            let key = self.property_key(entry.start);
            let colon = self.split(entry.clone(), &Token::Colon);

            let value = if colon.len() > 1 {
                let value_start = colon[0].end + 1;
                self.value(value_start..entry.end)
            } else if entry.len() == 1 {
                // shorthand `{ memory }`
                match self.token(entry.start) {
                    Token::Identifier(name) => LiteralValue::Path(vec![name.clone()]),
                    _ => opaque(&self.tokens[entry.clone()], self.source),
                }
            } else {
                // method, getter or setter
                LiteralValue::Function
            };

            if let Some(key) = key {
                entries.push((key, value));
            }
        }

        LiteralValue::Object(entries)
    }

    fn property_key(&self, i: usize) -> Option<String> {
        match self.token(i) {
            Token::Identifier(name) => Some(name.clone()),
            Token::String(s) => Some(s.clone()),
            Token::Number(n) => Some(n.to_string()),
            Token::LeftBracket => {
                // computed key, only constant strings are supported
                let close = self.partner[i];
                match self.value(i + 1..close) {
                    LiteralValue::String(s) => Some(s),
                    _ => None,
                }
            }
            token if token.is_keyword() || matches!(token, Token::True | Token::False | Token::Null) => {
                Some(token.to_string())
            }
            _ => None,
        }
    }
}

fn template_text(parts: &[TemplatePart]) -> Option<String> {
    let mut text = String::new();
    for part in parts {
        match part {
            TemplatePart::String(s) => text.push_str(s),
            TemplatePart::Expression(_) => return None,
        }
    }
    Some(text)
}
