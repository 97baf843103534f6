//! Statement compilation: blocks, branches, loops, returns and catch regions.

use crate::bytecode::OpCode;
use crate::lexer::TokenKind;
use crate::particle::{Particle, ReactionKind};

use super::fuser::Fuser;

impl<'src, 'ctx> Fuser<'src, 'ctx> {
    pub(crate) fn statement(&mut self) {
        if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Repif) {
            self.repif_statement();
        } else if self.match_token(TokenKind::Do) {
            self.do_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::Try) {
            self.try_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    /// Declarations up to the closing `}`; the caller owns the scope.
    pub(crate) fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after code block.");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expected ';' after an expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'if' keyword.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn repif_statement(&mut self) {
        let loop_start = self.frame().chunk.current_offset();
        self.consume(TokenKind::LeftParen, "Expected '(' after 'repif' keyword.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after 'repif' condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn do_statement(&mut self) {
        let loop_start = self.frame().chunk.current_offset();
        self.statement();

        self.consume(
            TokenKind::Repif,
            "Expected 'repif' keyword after 'do' statement.",
        );
        self.consume(TokenKind::LeftParen, "Expected '(' after 'repif' keyword.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after 'repif' condition.");
        self.consume(TokenKind::Semicolon, "Expected ';' after 'repif' condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    /// `for (let i : init, [{op}] exit [, [{op}] step]) body`
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for' keyword.");
        if !self.match_token(TokenKind::Let) {
            self.error_at_current("Expected a loop variable declaration.");
        }
        self.consume(TokenKind::Identifier, "Expected a loop variable declaration.");
        let variable = self.previous.lexeme;
        self.consume(
            TokenKind::Colon,
            "Expected a 'for' loop inclusivity operator.",
        );

        // The variable only comes into scope after its initial value
        self.expression();
        self.add_local(variable, false);
        self.mark_initialized();
        let slot = (self.frame().locals.len() - 1) as u16;

        self.consume(
            TokenKind::Comma,
            "Expected a ',' to deliminate the loop initialiser and loop exitor.",
        );
        let mut loop_start = self.frame().chunk.current_offset();

        let comparator = self
            .loop_operator("Expected '}' after specifying loop comparator.")
            .unwrap_or(TokenKind::BangEqual);
        self.emit_op_u16(OpCode::GetLocal, slot);
        self.expression();
        self.emit_operator(comparator);

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);

        // The step is emitted here but runs after the body
        let body_jump = self.emit_jump(OpCode::Jump);
        let step_start = self.frame().chunk.current_offset();
        self.emit_op_u16(OpCode::GetLocal, slot);
        if self.match_token(TokenKind::Comma) {
            let operator = self
                .loop_operator("Expected '}' after specifying incrementor operator.")
                .unwrap_or(TokenKind::Plus);
            self.expression();
            self.emit_operator(operator);
        } else {
            self.emit_constant(Particle::Number(1.0));
            self.emit_operator(TokenKind::Plus);
        }
        self.emit_op_u16(OpCode::SetLocal, slot);
        self.emit_op(OpCode::Pop);
        self.consume(TokenKind::RightParen, "Expected ')' after 'for' clauses.");

        self.emit_loop(loop_start);
        loop_start = step_start;
        self.patch_jump(body_jump);

        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
        self.end_scope();
    }

    /// An optional `{op}` override in a `for` clause.
    fn loop_operator(&mut self, close_message: &str) -> Option<TokenKind> {
        if !self.match_token(TokenKind::LeftBrace) {
            return None;
        }

        let operator = self.current.kind;
        if operator.is_loop_operator() {
            self.advance();
        } else {
            self.error_at_current("Expected a binary operator inside a loop operator override.");
        }
        self.consume(TokenKind::RightBrace, close_message);
        Some(operator).filter(|op| op.is_loop_operator())
    }

    fn return_statement(&mut self) {
        if self.frame().kind == ReactionKind::Script {
            self.error("Cannot return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.frame().kind == ReactionKind::Initialiser {
                self.error("Cannot return a value from a model constructor.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expected ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    /// `try s catch (e) { ... }`: the runtime pushes the disruption as `e`.
    fn try_statement(&mut self) {
        let catch_jump = self.emit_jump(OpCode::CatchMode);
        self.statement();
        self.emit_op(OpCode::EndCatchMode);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(catch_jump);
        self.consume(
            TokenKind::Catch,
            "Expected coinciding 'catch' to 'try' block.",
        );
        self.consume(TokenKind::LeftParen, "Expected '(' after 'catch' keyword.");
        self.consume(TokenKind::Identifier, "Expected a disruption variable name.");
        let variable = self.previous.lexeme;
        self.consume(
            TokenKind::RightParen,
            "Expected ')' after 'catch' disruption variable.",
        );

        self.begin_scope();
        self.add_local(variable, true);
        self.mark_initialized();
        self.consume(TokenKind::LeftBrace, "Expected '{' to begin 'catch' block.");
        self.block();
        self.end_scope();

        self.patch_jump(end_jump);
    }
}
