//! Lexer for JavaScript modules.
//!
//! Regular tokens are produced by logos. Whitespace, comments, template
//! literals and regex literals are handled by the driver loop, since they need
//! either line tracking or knowledge of the previous token.

use crate::token::{Span, TemplatePart, Token};
use logos::Logos;

/// Logos-based token enum for lexing.
///
/// Converted to [`Token`] after lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
enum LogosToken {
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("catch")]
    Catch,
    #[token("class")]
    Class,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("debugger")]
    Debugger,
    #[token("default")]
    Default,
    #[token("delete")]
    Delete,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("export")]
    Export,
    #[token("extends")]
    Extends,
    #[token("finally")]
    Finally,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("instanceof")]
    Instanceof,
    #[token("let")]
    Let,
    #[token("new")]
    New,
    #[token("return")]
    Return,
    #[token("super")]
    Super,
    #[token("switch")]
    Switch,
    #[token("this")]
    This,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("typeof")]
    Typeof,
    #[token("var")]
    Var,
    #[token("void")]
    Void,
    #[token("while")]
    While,
    #[token("with")]
    With,
    #[token("yield")]
    Yield,
    #[token("await")]
    Await,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Identifiers (must come after keywords)
    #[regex(r"[a-zA-Z_$\x{80}-\x{10FFFF}][a-zA-Z0-9_$\x{80}-\x{10FFFF}]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"#[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice()[1..].to_string())]
    PrivateName(String),

    #[regex(r"0[xX][0-9a-fA-F][0-9a-fA-F_]*n?", |lex| parse_radix(lex.slice(), 16))]
    #[regex(r"0[bB][01][01_]*n?", |lex| parse_radix(lex.slice(), 2))]
    #[regex(r"0[oO][0-7][0-7_]*n?", |lex| parse_radix(lex.slice(), 8))]
    #[regex(r"[0-9][0-9_]*n", parse_decimal)]
    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9][0-9_]*)?", parse_decimal)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9][0-9_]*)?", parse_decimal)]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\[\s\S])*""#, parse_string)]
    #[regex(r"'([^'\\\n]|\\[\s\S])*'", parse_string)]
    String(String),

    #[token(">>>=")]
    #[token(">>=")]
    #[token("<<=")]
    #[token("**=")]
    #[token("&&=")]
    #[token("||=")]
    #[token("??=")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    CompoundAssign,

    #[token("===")]
    EqualEqualEqual,
    #[token("!==")]
    BangEqualEqual,
    #[token(">>>")]
    GreaterGreaterGreater,
    #[token("**")]
    StarStar,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    LessLess,
    #[token(">>")]
    GreaterGreater,
    #[token("?.")]
    QuestionDot,
    #[token("??")]
    QuestionQuestion,
    #[token("=>")]
    Arrow,
    #[token("...")]
    DotDotDot,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("=")]
    Equal,
    #[token("?")]
    Question,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("@")]
    At,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
}

fn parse_radix(text: &str, radix: u32) -> Option<f64> {
    let digits = text[2..].trim_end_matches('n').replace('_', "");
    u64::from_str_radix(&digits, radix).ok().map(|n| n as f64)
}

fn parse_decimal(lex: &mut logos::Lexer<LogosToken>) -> Option<f64> {
    let text = lex.slice().trim_end_matches('n').replace('_', "");
    // "1." is a valid JS number literal
    text.trim_end_matches('.').parse().ok().or_else(|| text.parse().ok())
}

fn parse_string(lex: &mut logos::Lexer<LogosToken>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1];
    Some(unescape_string(inner))
}

/// Cook a string or template chunk.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('v') => result.push('\u{b}'),
            Some('0') => result.push('\0'),
            // line continuation
            Some('\n') => {}
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('u') => {
                let mut hex = String::new();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    while let Some(&ch) = chars.peek() {
                        chars.next();
                        if ch == '}' {
                            break;
                        }
                        hex.push(ch);
                    }
                } else {
                    for _ in 0..4 {
                        match chars.peek() {
                            Some(ch) if ch.is_ascii_hexdigit() => {
                                hex.push(*ch);
                                chars.next();
                            }
                            _ => break,
                        }
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => result.push(ch),
                    None => {
                        result.push_str("\\u");
                        result.push_str(&hex);
                    }
                }
            }
            Some('x') => {
                let mut hex = String::new();
                for _ in 0..2 {
                    match chars.peek() {
                        Some(ch) if ch.is_ascii_hexdigit() => {
                            hex.push(*ch);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u8::from_str_radix(&hex, 16) {
                    Ok(code) if hex.len() == 2 => result.push(code as char),
                    _ => {
                        result.push_str("\\x");
                        result.push_str(&hex);
                    }
                }
            }
            Some(other) => result.push(other),
            None => break,
        }
    }

    result
}

/// Advance a (line, column) pair over `text`.
fn advance(text: &str, line: &mut u32, column: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

/// Main lexer structure.
///
/// Lexes `source[start..end]`; spans are always absolute offsets into
/// `source` so nested template substitutions line up with the module text.
pub struct Lexer<'a> {
    source: &'a str,
    start: usize,
    end: usize,
    line: u32,
    column: u32,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { char: char, span: Span },
    UnterminatedComment { span: Span },
    UnterminatedTemplate { span: Span },
    UnterminatedRegex { span: Span },
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::for_range(source, 0, source.len(), 1, 1)
    }

    fn for_range(source: &'a str, start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            source,
            start,
            end,
            line,
            column,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Format all errors with source context
    pub fn format_errors(errors: &[LexError], source: &str) -> String {
        errors
            .iter()
            .map(|e| e.format_with_source(source))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tokenize(mut self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let mut pos = self.start;
        let mut line = self.line;
        let mut column = self.column;
        let bytes = self.source.as_bytes();

        if pos == 0 {
            if self.source.starts_with('\u{feff}') {
                pos = '\u{feff}'.len_utf8();
            }
            if self.source[pos..].starts_with("#!") {
                while pos < self.end && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
        }

        while pos < self.end {
            // Skip whitespace and comments manually so line tracking stays exact
            while pos < self.end {
                match bytes[pos] {
                    b' ' | b'\t' | b'\r' => {
                        column += 1;
                        pos += 1;
                    }
                    b'\n' => {
                        line += 1;
                        column = 1;
                        pos += 1;
                    }
                    b'/' if pos + 1 < self.end && bytes[pos + 1] == b'/' => {
                        while pos < self.end && bytes[pos] != b'\n' {
                            pos += 1;
                            column += 1;
                        }
                    }
                    b'/' if pos + 1 < self.end && bytes[pos + 1] == b'*' => {
                        let span = Span::new(pos, pos + 2, line, column);
                        match self.source[pos + 2..self.end].find("*/") {
                            Some(offset) => {
                                let close = pos + 2 + offset + 2;
                                advance(&self.source[pos..close], &mut line, &mut column);
                                pos = close;
                            }
                            None => {
                                self.errors.push(LexError::UnterminatedComment { span });
                                pos = self.end;
                            }
                        }
                    }
                    b if b >= 0x80 => {
                        // non-ASCII whitespace (NBSP, BOM, line separators)
                        let ch = self.source[pos..].chars().next().unwrap_or('\0');
                        if ch.is_whitespace() || ch == '\u{feff}' {
                            pos += ch.len_utf8();
                            column += 1;
                        } else {
                            break;
                        }
                    }
                    _ => break,
                }
            }

            if pos >= self.end {
                break;
            }

            // Template literal
            if bytes[pos] == b'`' {
                let span_line = line;
                let span_column = column;
                match self.lex_template(pos, line, column) {
                    Ok((parts, end_pos)) => {
                        let span = Span::new(pos, end_pos, span_line, span_column);
                        advance(&self.source[pos..end_pos], &mut line, &mut column);
                        self.tokens.push((Token::Template(parts), span));
                        pos = end_pos;
                    }
                    Err(err) => {
                        self.errors.push(err);
                        pos = self.end;
                    }
                }
                continue;
            }

            // Regex literal, only where an operand is expected
            if bytes[pos] == b'/' && self.regex_allowed() {
                let span_start = Span::new(pos, pos + 1, line, column);
                match self.scan_regex(pos) {
                    Some(end_pos) => {
                        let body = self.source[pos..end_pos].to_string();
                        let span = Span::new(pos, end_pos, line, column);
                        advance(&self.source[pos..end_pos], &mut line, &mut column);
                        self.tokens.push((Token::Regex(body), span));
                        pos = end_pos;
                    }
                    None => {
                        self.errors
                            .push(LexError::UnterminatedRegex { span: span_start });
                        pos = self.end;
                    }
                }
                continue;
            }

            // Use logos for regular tokens
            let mut logos_lexer = LogosToken::lexer(&self.source[pos..self.end]);

            let Some(token_result) = logos_lexer.next() else {
                break;
            };
            let range = logos_lexer.span();
            let abs_start = pos + range.start;
            let abs_end = pos + range.end;
            let span = Span::new(abs_start, abs_end, line, column);

            match token_result {
                Ok(logos_token) => self.tokens.push((convert_token(logos_token), span)),
                Err(_) => {
                    let char = self.source[abs_start..].chars().next().unwrap_or('\0');
                    self.errors.push(LexError::UnexpectedCharacter { char, span });
                }
            }

            advance(&self.source[abs_start..abs_end], &mut line, &mut column);
            pos = abs_end;
        }

        let eof_span = Span::new(self.end, self.end, line, column);
        self.tokens.push((Token::Eof, eof_span));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn regex_allowed(&self) -> bool {
        self.tokens
            .last()
            .map_or(true, |(token, _)| token.allows_regex_after())
    }

    /// Find the end of a regex literal starting at `start` (the opening `/`),
    /// flags included.
    fn scan_regex(&self, start: usize) -> Option<usize> {
        let bytes = self.source.as_bytes();
        let mut pos = start + 1;
        let mut in_class = false;
        while pos < self.end {
            match bytes[pos] {
                b'\\' => pos += 2,
                b'\n' => return None,
                b'[' => {
                    in_class = true;
                    pos += 1;
                }
                b']' => {
                    in_class = false;
                    pos += 1;
                }
                b'/' if !in_class => {
                    pos += 1;
                    while pos < self.end && bytes[pos].is_ascii_alphabetic() {
                        pos += 1;
                    }
                    return Some(pos);
                }
                _ => pos += 1,
            }
        }
        None
    }

    /// Lex a template literal whose backtick sits at `start`.
    ///
    /// Returns the parts and the offset just past the closing backtick.
    fn lex_template(
        &self,
        start: usize,
        line: u32,
        column: u32,
    ) -> Result<(Vec<TemplatePart>, usize), LexError> {
        let bytes = self.source.as_bytes();
        let mut parts = Vec::new();
        let mut chunk_start = start + 1;
        let mut pos = start + 1;

        while pos < self.end {
            match bytes[pos] {
                b'`' => {
                    if pos > chunk_start {
                        parts.push(TemplatePart::String(unescape_string(
                            &self.source[chunk_start..pos],
                        )));
                    }
                    return Ok((parts, pos + 1));
                }
                b'\\' => pos += 2,
                b'$' if pos + 1 < self.end && bytes[pos + 1] == b'{' => {
                    if pos > chunk_start {
                        parts.push(TemplatePart::String(unescape_string(
                            &self.source[chunk_start..pos],
                        )));
                    }
                    let expr_start = pos + 2;
                    let expr_end = self.find_substitution_end(expr_start).ok_or(
                        LexError::UnterminatedTemplate {
                            span: Span::new(pos, self.end, line, column),
                        },
                    )?;

                    let (mut expr_line, mut expr_column) = (line, column);
                    advance(
                        &self.source[start..expr_start],
                        &mut expr_line,
                        &mut expr_column,
                    );
                    let sub = Lexer::for_range(
                        self.source,
                        expr_start,
                        expr_end,
                        expr_line,
                        expr_column,
                    );
                    let mut tokens = sub.tokenize().map_err(|mut errors| errors.remove(0))?;
                    tokens.pop(); // EOF
                    parts.push(TemplatePart::Expression(tokens));

                    pos = expr_end + 1;
                    chunk_start = pos;
                }
                _ => pos += 1,
            }
        }

        Err(LexError::UnterminatedTemplate {
            span: Span::new(start, self.end, line, column),
        })
    }

    /// Offset of the `}` closing a `${` substitution whose body starts at
    /// `start`. Skips braces inside strings, comments and nested templates.
    fn find_substitution_end(&self, start: usize) -> Option<usize> {
        let bytes = self.source.as_bytes();
        let mut depth = 1usize;
        let mut pos = start;
        while pos < self.end {
            match bytes[pos] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(pos);
                    }
                }
                quote @ (b'"' | b'\'') => {
                    pos += 1;
                    while pos < self.end && bytes[pos] != quote {
                        if bytes[pos] == b'\\' {
                            pos += 1;
                        }
                        pos += 1;
                    }
                }
                b'`' => {
                    let (_, end) = self.lex_template(pos, 0, 0).ok()?;
                    pos = end;
                    continue;
                }
                b'/' if pos + 1 < self.end && bytes[pos + 1] == b'/' => {
                    while pos < self.end && bytes[pos] != b'\n' {
                        pos += 1;
                    }
                }
                b'/' if pos + 1 < self.end && bytes[pos + 1] == b'*' => {
                    let close = self.source[pos + 2..self.end].find("*/")?;
                    pos += 2 + close + 1;
                }
                _ => {}
            }
            pos += 1;
        }
        None
    }
}

fn convert_token(logos_token: LogosToken) -> Token {
    match logos_token {
        LogosToken::Break => Token::Break,
        LogosToken::Case => Token::Case,
        LogosToken::Catch => Token::Catch,
        LogosToken::Class => Token::Class,
        LogosToken::Const => Token::Const,
        LogosToken::Continue => Token::Continue,
        LogosToken::Debugger => Token::Debugger,
        LogosToken::Default => Token::Default,
        LogosToken::Delete => Token::Delete,
        LogosToken::Do => Token::Do,
        LogosToken::Else => Token::Else,
        LogosToken::Export => Token::Export,
        LogosToken::Extends => Token::Extends,
        LogosToken::Finally => Token::Finally,
        LogosToken::For => Token::For,
        LogosToken::Function => Token::Function,
        LogosToken::If => Token::If,
        LogosToken::Import => Token::Import,
        LogosToken::In => Token::In,
        LogosToken::Instanceof => Token::Instanceof,
        LogosToken::Let => Token::Let,
        LogosToken::New => Token::New,
        LogosToken::Return => Token::Return,
        LogosToken::Super => Token::Super,
        LogosToken::Switch => Token::Switch,
        LogosToken::This => Token::This,
        LogosToken::Throw => Token::Throw,
        LogosToken::Try => Token::Try,
        LogosToken::Typeof => Token::Typeof,
        LogosToken::Var => Token::Var,
        LogosToken::Void => Token::Void,
        LogosToken::While => Token::While,
        LogosToken::With => Token::With,
        LogosToken::Yield => Token::Yield,
        LogosToken::Await => Token::Await,
        LogosToken::True => Token::True,
        LogosToken::False => Token::False,
        LogosToken::Null => Token::Null,
        LogosToken::Identifier(name) => Token::Identifier(name),
        LogosToken::PrivateName(name) => Token::PrivateName(name),
        LogosToken::Number(n) => Token::Number(n),
        LogosToken::String(s) => Token::String(s),
        LogosToken::CompoundAssign => Token::CompoundAssign,
        LogosToken::EqualEqualEqual => Token::EqualEqualEqual,
        LogosToken::BangEqualEqual => Token::BangEqualEqual,
        LogosToken::GreaterGreaterGreater => Token::GreaterGreaterGreater,
        LogosToken::StarStar => Token::StarStar,
        LogosToken::EqualEqual => Token::EqualEqual,
        LogosToken::BangEqual => Token::BangEqual,
        LogosToken::LessEqual => Token::LessEqual,
        LogosToken::GreaterEqual => Token::GreaterEqual,
        LogosToken::AmpAmp => Token::AmpAmp,
        LogosToken::PipePipe => Token::PipePipe,
        LogosToken::PlusPlus => Token::PlusPlus,
        LogosToken::MinusMinus => Token::MinusMinus,
        LogosToken::LessLess => Token::LessLess,
        LogosToken::GreaterGreater => Token::GreaterGreater,
        LogosToken::QuestionDot => Token::QuestionDot,
        LogosToken::QuestionQuestion => Token::QuestionQuestion,
        LogosToken::Arrow => Token::Arrow,
        LogosToken::DotDotDot => Token::DotDotDot,
        LogosToken::Plus => Token::Plus,
        LogosToken::Minus => Token::Minus,
        LogosToken::Star => Token::Star,
        LogosToken::Slash => Token::Slash,
        LogosToken::Percent => Token::Percent,
        LogosToken::Bang => Token::Bang,
        LogosToken::Tilde => Token::Tilde,
        LogosToken::Less => Token::Less,
        LogosToken::Greater => Token::Greater,
        LogosToken::Amp => Token::Amp,
        LogosToken::Pipe => Token::Pipe,
        LogosToken::Caret => Token::Caret,
        LogosToken::Equal => Token::Equal,
        LogosToken::Question => Token::Question,
        LogosToken::Dot => Token::Dot,
        LogosToken::Colon => Token::Colon,
        LogosToken::At => Token::At,
        LogosToken::LeftParen => Token::LeftParen,
        LogosToken::RightParen => Token::RightParen,
        LogosToken::LeftBrace => Token::LeftBrace,
        LogosToken::RightBrace => Token::RightBrace,
        LogosToken::LeftBracket => Token::LeftBracket,
        LogosToken::RightBracket => Token::RightBracket,
        LogosToken::Semicolon => Token::Semicolon,
        LogosToken::Comma => Token::Comma,
    }
}

impl LexError {
    /// Get the span of this error
    pub fn span(&self) -> &Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedComment { span }
            | LexError::UnterminatedTemplate { span }
            | LexError::UnterminatedRegex { span } => span,
        }
    }

    /// Get a description of this error
    pub fn description(&self) -> String {
        match self {
            LexError::UnexpectedCharacter { char, .. } => {
                format!("Unexpected character '{}'", char)
            }
            LexError::UnterminatedComment { .. } => "Unterminated block comment".to_string(),
            LexError::UnterminatedTemplate { .. } => "Unterminated template literal".to_string(),
            LexError::UnterminatedRegex { .. } => "Unterminated regex literal".to_string(),
        }
    }

    /// Format the error with source context
    pub fn format_with_source(&self, source: &str) -> String {
        let span = self.span();
        let mut result = format!(
            "Error at {}:{}: {}\n",
            span.line,
            span.column,
            self.description()
        );

        if let Some(error_line) = source.lines().nth(span.line.saturating_sub(1) as usize) {
            result.push_str("  |\n");
            result.push_str(&format!("{:3} | {}\n", span.line, error_line));
            result.push_str(&format!(
                "  | {}^\n",
                " ".repeat(span.column.saturating_sub(1) as usize)
            ));
        }

        result
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.description(),
            self.span().line,
            self.span().column
        )
    }
}

impl std::error::Error for LexError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .expect("should lex")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = kinds("// line\nfoo /* block\n */ bar");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("foo".into()),
                Token::Identifier("bar".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_span_positions() {
        let tokens = Lexer::new("a\n  InWasm({})").tokenize().unwrap();
        let (token, span) = &tokens[1];
        assert_eq!(token, &Token::Identifier("InWasm".into()));
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 3);
        assert_eq!(span.start, 4);
    }

    #[test]
    fn test_regex_vs_division() {
        let tokens = kinds("x = a / b; y = /[/]+/g.test(s)");
        assert!(tokens.contains(&Token::Slash));
        assert!(tokens.contains(&Token::Regex("/[/]+/g".into())));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = kinds(r#"'a\'b' "c\nd""#);
        assert_eq!(tokens[0], Token::String("a'b".into()));
        assert_eq!(tokens[1], Token::String("c\nd".into()));
    }

    #[test]
    fn test_template_substitution_spans_are_absolute() {
        let source = "`x${ f(1) }y`";
        let tokens = Lexer::new(source).tokenize().unwrap();
        let Token::Template(parts) = &tokens[0].0 else {
            panic!("expected template, got {:?}", tokens[0].0);
        };
        assert_eq!(parts.len(), 3);
        let TemplatePart::Expression(inner) = &parts[1] else {
            panic!("expected substitution");
        };
        assert_eq!(inner[0].0, Token::Identifier("f".into()));
        assert_eq!(inner[0].1.slice(source), "f");
    }

    #[test]
    fn test_hashbang_skipped() {
        let tokens = kinds("#!/usr/bin/env node\nrun()");
        assert_eq!(tokens[0], Token::Identifier("run".into()));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("0x10 1_000 2.5 .5 10n 0b11");
        assert_eq!(
            tokens[..6],
            [
                Token::Number(16.0),
                Token::Number(1000.0),
                Token::Number(2.5),
                Token::Number(0.5),
                Token::Number(10.0),
                Token::Number(3.0)
            ]
        );
    }

    #[test]
    fn test_unterminated_template_is_error() {
        let result = Lexer::new("`abc").tokenize();
        assert!(matches!(
            result,
            Err(ref errors) if matches!(errors[0], LexError::UnterminatedTemplate { .. })
        ));
    }
}
