//! Token definitions for JavaScript source.
//!
//! The set covers everything needed to bracket-match a module and to tell call
//! expressions apart from keyword-led parentheses. Operators that never matter
//! for that purpose are still lexed individually so spans stay exact.

use std::fmt;

/// A JavaScript token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Export,
    Extends,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    Let,
    New,
    Return,
    Super,
    Switch,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
    Yield,
    Await,

    // Literals
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
    Regex(String),
    True,
    False,
    Null,

    // Identifiers
    Identifier(String),
    PrivateName(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    PlusPlus,
    MinusMinus,
    Bang,
    Tilde,
    EqualEqual,
    BangEqual,
    EqualEqualEqual,
    BangEqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AmpAmp,
    PipePipe,
    Amp,
    Pipe,
    Caret,
    LessLess,
    GreaterGreater,
    GreaterGreaterGreater,
    Equal,
    /// Any compound assignment (`+=`, `>>>=`, `??=`, ...).
    CompoundAssign,
    Question,
    QuestionQuestion,
    QuestionDot,
    DotDotDot,
    Dot,
    Colon,
    Arrow,
    At,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Semicolon,
    Comma,

    Eof,
}

/// A part of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Cooked string chunk.
    String(String),
    /// Tokens of a `${...}` substitution, with absolute spans.
    Expression(Vec<(Token, Span)>),
}

/// Source location information for a token.
///
/// `start`/`end` are byte offsets, `line` and `column` are one-based and refer
/// to the first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn merge(&self, other: &Span) -> Span {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }
}

impl Token {
    /// Reserved words. Contextual words (`async`, `of`, `get`, `set`, `static`)
    /// lex as identifiers.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Break
                | Token::Case
                | Token::Catch
                | Token::Class
                | Token::Const
                | Token::Continue
                | Token::Debugger
                | Token::Default
                | Token::Delete
                | Token::Do
                | Token::Else
                | Token::Export
                | Token::Extends
                | Token::Finally
                | Token::For
                | Token::Function
                | Token::If
                | Token::Import
                | Token::In
                | Token::Instanceof
                | Token::Let
                | Token::New
                | Token::Return
                | Token::Super
                | Token::Switch
                | Token::This
                | Token::Throw
                | Token::Try
                | Token::Typeof
                | Token::Var
                | Token::Void
                | Token::While
                | Token::With
                | Token::Yield
                | Token::Await
        )
    }

    /// Whether a `/` following this token starts a regex literal rather than
    /// a division.
    pub fn allows_regex_after(&self) -> bool {
        match self {
            Token::Identifier(_)
            | Token::PrivateName(_)
            | Token::Number(_)
            | Token::String(_)
            | Token::Template(_)
            | Token::Regex(_)
            | Token::True
            | Token::False
            | Token::Null
            | Token::This
            | Token::Super
            | Token::RightParen
            | Token::RightBracket
            | Token::RightBrace
            | Token::PlusPlus
            | Token::MinusMinus => false,
            _ => true,
        }
    }

    /// Tokens that can end an operand, i.e. something a member access or call
    /// may directly follow.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Identifier(_)
                | Token::PrivateName(_)
                | Token::Number(_)
                | Token::String(_)
                | Token::Template(_)
                | Token::Regex(_)
                | Token::True
                | Token::False
                | Token::Null
                | Token::This
                | Token::Super
                | Token::RightParen
                | Token::RightBracket
        )
    }

    /// Identifier name, if any.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Token::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Break => "break",
            Token::Case => "case",
            Token::Catch => "catch",
            Token::Class => "class",
            Token::Const => "const",
            Token::Continue => "continue",
            Token::Debugger => "debugger",
            Token::Default => "default",
            Token::Delete => "delete",
            Token::Do => "do",
            Token::Else => "else",
            Token::Export => "export",
            Token::Extends => "extends",
            Token::Finally => "finally",
            Token::For => "for",
            Token::Function => "function",
            Token::If => "if",
            Token::Import => "import",
            Token::In => "in",
            Token::Instanceof => "instanceof",
            Token::Let => "let",
            Token::New => "new",
            Token::Return => "return",
            Token::Super => "super",
            Token::Switch => "switch",
            Token::This => "this",
            Token::Throw => "throw",
            Token::Try => "try",
            Token::Typeof => "typeof",
            Token::Var => "var",
            Token::Void => "void",
            Token::While => "while",
            Token::With => "with",
            Token::Yield => "yield",
            Token::Await => "await",
            Token::Number(n) => return write!(f, "{}", n),
            Token::String(_) => "\"<string>\"",
            Token::Template(_) => "`...`",
            Token::Regex(_) => "/.../",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Identifier(name) => return write!(f, "{}", name),
            Token::PrivateName(name) => return write!(f, "#{}", name),
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::StarStar => "**",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Bang => "!",
            Token::Tilde => "~",
            Token::EqualEqual => "==",
            Token::BangEqual => "!=",
            Token::EqualEqualEqual => "===",
            Token::BangEqualEqual => "!==",
            Token::Less => "<",
            Token::LessEqual => "<=",
            Token::Greater => ">",
            Token::GreaterEqual => ">=",
            Token::AmpAmp => "&&",
            Token::PipePipe => "||",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::LessLess => "<<",
            Token::GreaterGreater => ">>",
            Token::GreaterGreaterGreater => ">>>",
            Token::Equal => "=",
            Token::CompoundAssign => "op=",
            Token::Question => "?",
            Token::QuestionQuestion => "??",
            Token::QuestionDot => "?.",
            Token::DotDotDot => "...",
            Token::Dot => ".",
            Token::Colon => ":",
            Token::Arrow => "=>",
            Token::At => "@",
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Eof => "EOF",
        };
        f.write_str(text)
    }
}
