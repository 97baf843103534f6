//! Token definitions for the Nucleus lexer.

use std::fmt;

use crate::span::Span;

/// All token types in Nucleus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Semicolon,
    Colon,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Caret,
    Tilde,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    ShiftLeft,
    ShiftRight,

    // Literals
    Identifier,
    String,
    Number,
    HexNumber,
    BinNumber,
    OctNumber,
    /// A `std.`/`math.` accessor chain, e.g. `std.time.now`.
    Library,

    // Keywords
    For,
    Do,
    Repif,
    If,
    Else,
    Return,
    Try,
    Catch,
    False,
    True,
    Null,
    New,
    This,
    Super,
    Let,
    Const,
    Model,
    Derives,
    Reaction,

    // Directives
    Mutate,

    /// Malformed input; the lexeme holds the message.
    Error,
    Eof,
}

impl TokenKind {
    /// Look up a keyword. Library accessors are handled by the scanner.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "for" => Some(TokenKind::For),
            "do" => Some(TokenKind::Do),
            "repif" => Some(TokenKind::Repif),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "return" => Some(TokenKind::Return),
            "try" => Some(TokenKind::Try),
            "catch" => Some(TokenKind::Catch),
            "false" => Some(TokenKind::False),
            "true" => Some(TokenKind::True),
            "null" => Some(TokenKind::Null),
            "new" => Some(TokenKind::New),
            "this" => Some(TokenKind::This),
            "super" => Some(TokenKind::Super),
            "let" => Some(TokenKind::Let),
            "const" => Some(TokenKind::Const),
            "model" => Some(TokenKind::Model),
            "derives" => Some(TokenKind::Derives),
            "reaction" | "rn" => Some(TokenKind::Reaction),
            _ => None,
        }
    }

    /// Operators allowed inside a `for` loop `{op}` override.
    pub fn is_loop_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::StarStar
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Caret
                | TokenKind::Amp
                | TokenKind::Pipe
                | TokenKind::ShiftLeft
                | TokenKind::ShiftRight
                | TokenKind::EqualEqual
                | TokenKind::BangEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Less
                | TokenKind::LessEqual
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Amp => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::Pipe => "|",
            TokenKind::PipePipe => "||",
            TokenKind::Bang => "!",
            TokenKind::BangEqual => "!=",
            TokenKind::Equal => "=",
            TokenKind::EqualEqual => "==",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            TokenKind::Identifier => "identifier",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::HexNumber => "hex number",
            TokenKind::BinNumber => "binary number",
            TokenKind::OctNumber => "octal number",
            TokenKind::Library => "library accessor",
            TokenKind::For => "for",
            TokenKind::Do => "do",
            TokenKind::Repif => "repif",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Return => "return",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::False => "false",
            TokenKind::True => "true",
            TokenKind::Null => "null",
            TokenKind::New => "new",
            TokenKind::This => "this",
            TokenKind::Super => "super",
            TokenKind::Let => "let",
            TokenKind::Const => "const",
            TokenKind::Model => "model",
            TokenKind::Derives => "derives",
            TokenKind::Reaction => "reaction",
            TokenKind::Mutate => "@mutate",
            TokenKind::Error => "error",
            TokenKind::Eof => "end of file",
        };
        f.write_str(s)
    }
}

/// A token with its source text and location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// The source slice, or the message for `TokenKind::Error`.
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    pub fn eof(position: usize, line: usize, column: usize) -> Self {
        Self {
            kind: TokenKind::Eof,
            lexeme: "",
            span: Span::new(position, position, line, column),
        }
    }

    /// A token the compiler fabricates for implicit names such as `this` and `super`.
    pub fn synthetic(kind: TokenKind, lexeme: &'static str) -> Self {
        Self {
            kind,
            lexeme,
            span: Span::default(),
        }
    }

    pub fn line(&self) -> usize {
        self.span.line
    }
}
