//! Declaration compilation: variables, reactions and models.

use crate::bytecode::OpCode;
use crate::lexer::TokenKind;
use crate::particle::{Particle, ReactionKind};

use super::fuser::{Fuser, ModelState};

impl<'src, 'ctx> Fuser<'src, 'ctx> {
    pub(crate) fn declaration(&mut self) {
        if self.match_token(TokenKind::Mutate) {
            self.mutate_permit = Some(self.previous.line());
            if !self.check(TokenKind::Eof) {
                self.declaration();
            }
            return;
        }

        if self.match_token(TokenKind::Model) {
            self.model_declaration();
        } else if self.match_token(TokenKind::Reaction) {
            self.reaction_declaration();
        } else if self.match_token(TokenKind::Let) {
            self.var_declaration(false);
        } else if self.match_token(TokenKind::Const) {
            self.var_declaration(true);
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self, immutable: bool) {
        let global = self.parse_variable("Expected a variable name.", immutable);

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Null);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expected a ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn reaction_declaration(&mut self) {
        let global = self.parse_variable("Expected a reaction name.", true);
        let name = self.previous.lexeme;
        // Initialised before the body so the reaction can call itself
        self.mark_initialized();
        self.function(ReactionKind::Reaction, name);
        self.define_variable(global);
    }

    /// Compile a parameter list and body into a closure left on the stack.
    pub(crate) fn function(&mut self, kind: ReactionKind, name: &str) {
        self.begin_reaction(kind, Some(name));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expected '(' after reaction name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.frame().arity == u8::MAX {
                    self.error_at_current("Cannot have more than 255 parameters for reactions.");
                } else {
                    self.frame_mut().arity += 1;
                }

                self.consume(TokenKind::Identifier, "Expected a parameter name.");
                self.declare_variable(false);
                self.mark_initialized();
                let slot = (self.frame().locals.len() - 1) as u16;

                if self.match_token(TokenKind::Equal) {
                    self.default_parameter(slot);
                    self.frame_mut().defaults += 1;
                } else if self.frame().defaults > 0 {
                    self.error(
                        "Non-defaulted reaction parameter specified after a defaulted reaction parameter.",
                    );
                }

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after reaction parameters.");
        self.consume(TokenKind::LeftBrace, "Expected '{' before reaction body.");
        self.block();

        let (reaction, upvalues) = self.end_reaction();
        let constant = self.make_constant(Particle::Obj(reaction));
        self.emit_op_u16(OpCode::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_u16(upvalue.index);
        }
    }

    /// `p = expr` in a parameter list: assign `expr` when the argument is null.
    fn default_parameter(&mut self, slot: u16) {
        self.emit_op_u16(OpCode::GetLocal, slot);
        self.emit_op(OpCode::Null);
        self.emit_op(OpCode::Equal);
        let skip = self.emit_jump(OpCode::JumpIfFalse);

        self.emit_op(OpCode::Pop);
        self.expression();
        self.emit_op_u16(OpCode::SetLocal, slot);
        self.emit_op(OpCode::Pop);
        let end = self.emit_jump(OpCode::Jump);

        self.patch_jump(skip);
        self.emit_op(OpCode::Pop);
        self.patch_jump(end);
    }

    fn model_declaration(&mut self) {
        let global = self.parse_variable("Expected a model name.", true);
        let name = self.previous.lexeme;
        let name_constant = self.identifier_constant(name);

        self.emit_op_u16(OpCode::Model, name_constant);
        self.define_variable(global);
        self.models.push(ModelState { has_base: false });

        if self.match_token(TokenKind::Derives) {
            self.consume(TokenKind::Identifier, "Expected base model name.");
            let base = self.previous.lexeme;
            self.named_variable(base, false);
            if base == name {
                self.error("A model cannot inherit from itself.");
            }

            self.begin_scope();
            self.add_local("super", true);
            self.mark_initialized();

            self.named_variable(name, false);
            self.emit_op(OpCode::Inherit);
            if let Some(model) = self.models.last_mut() {
                model.has_base = true;
            }
        }

        self.named_variable(name, false);
        self.consume(TokenKind::LeftBrace, "Expected '{' before model body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.model_member();
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after model body.");
        self.match_token(TokenKind::Semicolon);
        self.emit_op(OpCode::Pop);

        if self.models.pop().is_some_and(|model| model.has_base) {
            self.end_scope();
        }
    }

    fn model_member(&mut self) {
        if !self.match_token(TokenKind::Identifier) {
            self.error_at_current("Expecting a method/field name.");
            self.advance();
            return;
        }

        let name = self.previous.lexeme;
        let constant = self.identifier_constant(name);
        if self.match_token(TokenKind::Colon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expected ';' after field declaration.");
            self.emit_op_u16(OpCode::Field, constant);
        } else if self.check(TokenKind::LeftParen) {
            let kind = if name == "@construct" {
                ReactionKind::Initialiser
            } else {
                ReactionKind::Method
            };
            self.function(kind, name);
            self.emit_op_u16(OpCode::Method, constant);
        } else {
            self.error_at_current("Unknown symbol found in model declaration.");
            self.advance();
        }
    }
}
