//! Lexer/Scanner for Nucleus source code.
//!
//! The scanner is lazy: the compiler pulls one token at a time with
//! [`Scanner::next_token`]. Malformed input never aborts scanning; it produces a
//! `TokenKind::Error` token whose lexeme is the message.

use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source code into a stream of tokens.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Scan every remaining token, including the trailing `Eof`.
    pub fn scan_tokens(&mut self) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Token::eof(self.current_pos, self.line, self.column);
        };

        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            '.' => self.make_token(TokenKind::Dot),
            ';' => self.make_token(TokenKind::Semicolon),
            ':' => self.make_token(TokenKind::Colon),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '/' => self.make_token(TokenKind::Slash),
            '%' => self.make_token(TokenKind::Percent),
            '^' => self.make_token(TokenKind::Caret),
            '~' => self.make_token(TokenKind::Tilde),

            '*' => {
                if self.match_char('*') {
                    self.make_token(TokenKind::StarStar)
                } else {
                    self.make_token(TokenKind::Star)
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(TokenKind::AmpAmp)
                } else {
                    self.make_token(TokenKind::Amp)
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(TokenKind::PipePipe)
                } else {
                    self.make_token(TokenKind::Pipe)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else if self.match_char('>') {
                    self.make_token(TokenKind::ShiftRight)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual)
                } else if self.match_char('<') {
                    self.make_token(TokenKind::ShiftLeft)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }

            '"' => self.scan_string(),
            '@' => self.scan_directive(),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(),

            _ => self.error_token("Unexpected character."),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.new_line();
                }
                Some('#') => {
                    if self.peek_next() == Some('!') {
                        // Block comment, runs to the closing `!#` or end of input
                        self.advance();
                        self.advance();
                        loop {
                            match self.peek() {
                                None => break,
                                Some('!') if self.peek_next() == Some('#') => {
                                    self.advance();
                                    self.advance();
                                    break;
                                }
                                Some('\n') => {
                                    self.advance();
                                    self.new_line();
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        while self.peek().is_some() && self.peek() != Some('\n') {
                            self.advance();
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> Token<'a> {
        loop {
            match self.peek() {
                None => return self.error_token("Unterminated string literal."),
                Some('"') => break,
                Some('\\') => {
                    // Keep the escape raw; the compiler decodes it
                    self.advance();
                    if self.peek() == Some('\n') {
                        self.advance();
                        self.new_line();
                    } else {
                        self.advance();
                    }
                }
                Some('\n') => {
                    self.advance();
                    self.new_line();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }

        self.advance(); // closing quote
        self.make_token(TokenKind::String)
    }

    fn scan_number(&mut self, first: char) -> Token<'a> {
        if first == '0' {
            let prefixed = match self.peek() {
                Some('x' | 'X') => Some((TokenKind::HexNumber, 16)),
                Some('b' | 'B') => Some((TokenKind::BinNumber, 2)),
                Some('o' | 'O') => Some((TokenKind::OctNumber, 8)),
                _ => None,
            };
            if let Some((kind, radix)) = prefixed {
                self.advance();
                let mut digits = 0;
                while let Some(c) = self.peek() {
                    if c.is_digit(radix) || c == '_' {
                        self.advance();
                        digits += 1;
                    } else {
                        break;
                    }
                }
                if digits == 0 {
                    return self.error_token("Expected digits after numeric prefix.");
                }
                return self.make_token(kind);
            }
        }

        self.consume_digits();
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.consume_digits();
        }

        self.make_token(TokenKind::Number)
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_identifier(&mut self) -> Token<'a> {
        self.consume_word();

        let text = &self.source[self.start_pos..self.current_pos];
        match text {
            "std" | "math" => self.scan_library(text),
            _ => {
                let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
                self.make_token(kind)
            }
        }
    }

    /// Library accessors swallow their whole `.name` chain into one token.
    fn scan_library(&mut self, root: &str) -> Token<'a> {
        if self.peek() != Some('.') {
            return self.error_token(match root {
                "std" => "Expected a period after reserved keyword \"std\".",
                _ => "Expected a period after reserved keyword \"math\".",
            });
        }

        while self.peek() == Some('.') {
            self.advance();
            match self.peek() {
                Some(c) if c.is_alphabetic() || c == '_' => self.consume_word(),
                _ => {
                    return self
                        .error_token("Expected a property/method after standard library declaration.")
                }
            }
        }

        self.make_token(TokenKind::Library)
    }

    fn scan_directive(&mut self) -> Token<'a> {
        self.consume_word();
        match &self.source[self.start_pos..self.current_pos] {
            "@mutate" => self.make_token(TokenKind::Mutate),
            "@construct" => self.make_token(TokenKind::Identifier),
            _ => self.error_token("Unknown directive declared."),
        }
    }

    fn consume_word(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token::new(
            kind,
            &self.source[self.start_pos..self.current_pos],
            self.current_span(),
        )
    }

    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token::new(TokenKind::Error, message, self.current_span())
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    /// Yields tokens up to, but not including, `Eof`.
    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.next_token();
        (token.kind != TokenKind::Eof).then_some(token)
    }
}
