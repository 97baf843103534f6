//! Expression parsing: Pratt prefix/infix dispatch and expression bytecode.

use std::borrow::Cow;

use crate::bytecode::OpCode;
use crate::lexer::TokenKind;
use crate::particle::{Particle, ReactionKind};

use super::fuser::{Fuser, VariableAccess, MAX_SLOTS};
use super::precedence::{get_precedence, Precedence};

impl<'src, 'ctx> Fuser<'src, 'ctx> {
    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Parse anything binding at least as tightly as `precedence`.
    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;

        if !self.prefix_rule(self.previous.kind, can_assign) {
            self.error("Expected an expression.");
            return;
        }

        while precedence <= get_precedence(self.current.kind) {
            self.advance();
            self.infix_rule(self.previous.kind, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Returns false when `kind` cannot start an expression.
    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::LeftBracket => self.array_literal(),
            TokenKind::LeftBrace => self.base_model_literal(),
            TokenKind::Minus | TokenKind::Bang | TokenKind::Tilde => self.unary(),
            TokenKind::Number
            | TokenKind::HexNumber
            | TokenKind::BinNumber
            | TokenKind::OctNumber => self.number(),
            TokenKind::String => self.string(),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Null => self.emit_op(OpCode::Null),
            TokenKind::Identifier => {
                let name = self.previous.lexeme;
                self.named_variable(name, can_assign);
            }
            TokenKind::This => self.this(),
            TokenKind::Super => self.super_(),
            TokenKind::Reaction => self.function(ReactionKind::Reaction, "anonymous"),
            TokenKind::Library => {
                let name = self.identifier_constant(self.previous.lexeme);
                self.emit_op_u16(OpCode::GetNative, name);
            }
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::AmpAmp => self.and(),
            TokenKind::PipePipe => self.or(),
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::LeftBracket => self.member(can_assign),
            _ => self.binary(kind),
        }
    }

    // ============ Prefix rules ============

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after grouped expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Tilde => self.emit_op(OpCode::BitNot),
            _ => {}
        }
    }

    fn number(&mut self) {
        let token = self.previous;
        let digits: String = token.lexeme.chars().filter(|c| *c != '_').collect();

        let value = match token.kind {
            TokenKind::HexNumber => parse_radix(&digits[2..], 16),
            TokenKind::BinNumber => parse_radix(&digits[2..], 2),
            TokenKind::OctNumber => parse_radix(&digits[2..], 8),
            _ => match digits.parse::<f64>() {
                Ok(value) => value,
                Err(_) => {
                    self.error("Found an invalid numeric literal.");
                    return;
                }
            },
        };
        self.emit_constant(Particle::Number(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let body = &lexeme[1..lexeme.len() - 1];

        match unescape(body) {
            Some(text) => {
                let string = self.heap.intern(&text);
                self.emit_constant(Particle::Obj(string));
            }
            None => self.error("Found an invalid escape sequence character."),
        }
    }

    fn array_literal(&mut self) {
        let mut count = 0usize;
        if !self.check(TokenKind::RightBracket) {
            loop {
                self.expression();
                if count == MAX_SLOTS {
                    self.error("Cannot have more than 65535 array initialisers.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "Expected ']' to close an array literal.");
        self.emit_op_u16(OpCode::Array, count.min(MAX_SLOTS) as u16);
    }

    /// `{ name: expr; name(params) { ... } }` builds an instance of the base `Model`.
    fn base_model_literal(&mut self) {
        let model = self.identifier_constant("Model");
        self.emit_op_u16(OpCode::GetGlobal, model);
        self.emit_op(OpCode::Call);
        self.emit_byte(0);

        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if !self.match_token(TokenKind::Identifier) {
                self.error_at_current("Expecting a object method/field.");
                self.advance();
                continue;
            }

            let name = self.previous.lexeme;
            let constant = self.identifier_constant(name);
            if self.match_token(TokenKind::Colon) {
                self.expression();
                self.consume(TokenKind::Semicolon, "Expected ';' after field declaration.");
            } else if self.check(TokenKind::LeftParen) {
                self.function(ReactionKind::Reaction, name);
            } else {
                self.error_at_current("Unknown symbol found in model declaration.");
                self.advance();
                continue;
            }
            self.emit_op_u16(OpCode::SetBaseProperty, constant);
        }

        self.consume(TokenKind::RightBrace, "Expected '}' after base object model body.");
    }

    fn this(&mut self) {
        if self.models.is_empty() {
            self.error("Cannot use \"this\" outside of a model.");
            return;
        }
        self.named_variable("this", false);
    }

    fn super_(&mut self) {
        match self.models.last().copied() {
            None => self.error("Cannot use 'super' keyword outside of a model."),
            Some(model) if !model.has_base => {
                self.error("Cannot use 'super' keyword in a model with no base.")
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expected a period after \"super\" keyword.");
        self.consume(TokenKind::Identifier, "Expected parent model method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_op_u16(OpCode::SuperInvoke, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_op_u16(OpCode::GetSuper, name);
        }
    }

    /// Emit a read of `name`, or an assignment when followed by `=`.
    pub(crate) fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (access, immutable) = self.resolve_variable(name);
        let (get, set, operand) = match access {
            VariableAccess::Local(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            VariableAccess::Upvalue(index) => (OpCode::GetUpvalue, OpCode::SetUpvalue, index),
            VariableAccess::Global(name) => (OpCode::GetGlobal, OpCode::SetGlobal, name),
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.check_mutable(immutable);
            self.expression();
            self.emit_op_u16(set, operand);
        } else {
            self.emit_op_u16(get, operand);
        }
    }

    // ============ Infix rules ============

    fn binary(&mut self, operator: TokenKind) {
        let precedence = get_precedence(operator);
        // `**` binds to the right
        if operator == TokenKind::StarStar {
            self.parse_precedence(precedence);
        } else {
            self.parse_precedence(precedence.next());
        }
        self.emit_operator(operator);
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(arg_count);
    }

    /// Compile call arguments up to the closing `)`.
    fn argument_list(&mut self) -> u8 {
        let mut count = 0usize;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == u8::MAX as usize {
                    self.error("Cannot have more than 255 arguments in reaction call.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' to close reaction call.");
        count.min(u8::MAX as usize) as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(
            TokenKind::Identifier,
            "Expected a property or reaction name after period.",
        );
        let name = self.identifier_constant(self.previous.lexeme);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_u16(OpCode::SetProperty, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_op_u16(OpCode::Invoke, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_op_u16(OpCode::GetProperty, name);
        }
    }

    fn member(&mut self, can_assign: bool) {
        self.expression();
        self.consume(
            TokenKind::RightBracket,
            "Expected ']' to close member access operator.",
        );

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::SetMember);
        } else {
            self.emit_op(OpCode::GetMember);
        }
    }
}

/// Accumulate digits of a prefixed literal; the scanner already validated them.
fn parse_radix(digits: &str, radix: u32) -> f64 {
    digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, digit| acc * radix as f64 + digit as f64)
}

/// Decode the escape sequences of a string literal body. `None` on a bad escape.
pub(crate) fn unescape(raw: &str) -> Option<Cow<'_, str>> {
    if !raw.contains('\\') {
        return Some(Cow::Borrowed(raw));
    }

    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        let decoded = match chars.next()? {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '?' => '?',
            'x' => {
                let high = chars.next()?.to_digit(16)?;
                let low = chars.next()?.to_digit(16)?;
                char::from((high * 16 + low) as u8)
            }
            _ => return None,
        };
        text.push(decoded);
    }
    Some(Cow::Owned(text))
}
