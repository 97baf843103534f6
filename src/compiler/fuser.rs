//! Core Fuser struct: token handling, diagnostics, emission, scopes and
//! variable resolution.

use ahash::AHashSet;

use crate::bytecode::{Chunk, OpCode};
use crate::error::{CompileErrors, SyntaxError};
use crate::lexer::{Scanner, Token, TokenKind};
use crate::particle::{GcRoots, Heap, ObjRef, Object, Particle, Reaction, ReactionKind};

/// Maximum number of locals, upvalues or constants per reaction (u16 operands).
pub(crate) const MAX_SLOTS: usize = u16::MAX as usize;

/// A local variable tracked during compilation.
#[derive(Debug, Clone)]
pub(crate) struct Local<'src> {
    pub(crate) name: &'src str,
    /// `None` while the initialiser is still being compiled.
    pub(crate) depth: Option<usize>,
    pub(crate) immutable: bool,
    pub(crate) captured: bool,
}

/// An upvalue captured by the reaction being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpvalueSlot {
    pub(crate) index: u16,
    pub(crate) is_local: bool,
    pub(crate) immutable: bool,
}

/// Per-reaction compilation state.
#[derive(Debug)]
pub(crate) struct FunctionState<'src> {
    /// Allocated up front so it can be rooted while the body is compiled.
    pub(crate) reaction: ObjRef,
    pub(crate) kind: ReactionKind,
    pub(crate) chunk: Chunk,
    pub(crate) arity: u8,
    pub(crate) defaults: u8,
    pub(crate) locals: Vec<Local<'src>>,
    pub(crate) upvalues: Vec<UpvalueSlot>,
    pub(crate) scope_depth: usize,
}

/// Tracks the model body being compiled, for `this`/`super` checks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModelState {
    pub(crate) has_base: bool,
}

/// Where a resolved name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VariableAccess {
    Local(u16),
    Upvalue(u16),
    Global(u16),
}

/// Marks every reaction and pending constant on the compilation chain.
struct CompilerRoots<'a, 'src>(&'a [FunctionState<'src>]);

impl GcRoots for CompilerRoots<'_, '_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for frame in self.0 {
            heap.mark_object(frame.reaction);
            for constant in &frame.chunk.constants {
                heap.mark_particle(*constant);
            }
        }
    }
}

/// The single-pass compiler: pulls tokens and emits bytecode directly.
pub struct Fuser<'src, 'ctx> {
    pub(crate) scanner: Scanner<'src>,
    pub(crate) source: &'src str,
    pub(crate) current: Token<'src>,
    pub(crate) previous: Token<'src>,
    pub(crate) panic_mode: bool,
    pub(crate) errors: Vec<SyntaxError>,
    pub(crate) heap: &'ctx mut Heap,
    pub(crate) roots: &'ctx dyn GcRoots,
    /// Global names declared `const` (or as models/reactions).
    pub(crate) immutable_globals: &'ctx mut AHashSet<String>,
    /// Innermost reaction last.
    pub(crate) frames: Vec<FunctionState<'src>>,
    pub(crate) models: Vec<ModelState>,
    /// Pending one-shot `@mutate` permission, holding the directive's line.
    pub(crate) mutate_permit: Option<usize>,
}

impl<'src, 'ctx> Fuser<'src, 'ctx> {
    pub fn new(
        source: &'src str,
        heap: &'ctx mut Heap,
        roots: &'ctx dyn GcRoots,
        immutable_globals: &'ctx mut AHashSet<String>,
    ) -> Self {
        let mut fuser = Self {
            scanner: Scanner::new(source),
            source,
            current: Token::eof(0, 1, 1),
            previous: Token::eof(0, 1, 1),
            panic_mode: false,
            errors: Vec::new(),
            heap,
            roots,
            immutable_globals,
            frames: Vec::new(),
            models: Vec::new(),
            mutate_permit: None,
        };
        fuser.begin_reaction(ReactionKind::Script, None);
        fuser
    }

    /// Compile the whole source into the top-level script reaction.
    pub fn compile(mut self) -> Result<ObjRef, CompileErrors> {
        self.advance();
        while !self.match_token(TokenKind::Eof) {
            self.declaration();
        }
        let (script, _) = self.end_reaction();

        if self.errors.is_empty() {
            Ok(script)
        } else {
            Err(CompileErrors(self.errors))
        }
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ===== Diagnostics =====

    pub(crate) fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    pub(crate) fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let lexeme = match token.kind {
            TokenKind::Eof => None,
            // Error tokens carry their message; point at the offending source instead
            TokenKind::Error => Some(
                self.source
                    .get(token.span.start..token.span.end)
                    .unwrap_or("")
                    .to_string(),
            ),
            _ => Some(token.lexeme.to_string()),
        };
        self.errors
            .push(SyntaxError::new(message, lexeme, token.span));
    }

    /// Skip tokens until a statement boundary to leave panic mode.
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Let
                | TokenKind::Const
                | TokenKind::Model
                | TokenKind::Reaction
                | TokenKind::For
                | TokenKind::Do
                | TokenKind::Repif
                | TokenKind::If
                | TokenKind::Try
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ===== Emission =====

    pub(crate) fn frame(&self) -> &FunctionState<'src> {
        &self.frames[self.frames.len() - 1]
    }

    pub(crate) fn frame_mut(&mut self) -> &mut FunctionState<'src> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub(crate) fn chunk(&mut self) -> &mut Chunk {
        &mut self.frame_mut().chunk
    }

    fn line(&self) -> u32 {
        self.previous.span.line as u32
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        let line = self.line();
        self.chunk().write_op(op, line);
    }

    pub(crate) fn emit_ops(&mut self, a: OpCode, b: OpCode) {
        self.emit_op(a);
        self.emit_op(b);
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.line();
        self.chunk().write_byte(byte, line);
    }

    pub(crate) fn emit_u16(&mut self, value: u16) {
        let line = self.line();
        self.chunk().write_u16(value, line);
    }

    pub(crate) fn emit_op_u16(&mut self, op: OpCode, operand: u16) {
        self.emit_op(op);
        self.emit_u16(operand);
    }

    pub(crate) fn emit_return(&mut self) {
        if self.frame().kind == ReactionKind::Initialiser {
            self.emit_op_u16(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Null);
        }
        self.emit_op(OpCode::Return);
    }

    /// Add a constant (reusing an identical one) and collect if the heap is due.
    pub(crate) fn make_constant(&mut self, value: Particle) -> u16 {
        let index = match self.frame().chunk.find_constant(value) {
            Some(index) => index,
            None => self.chunk().add_constant(value),
        };
        self.maybe_collect();

        if index > MAX_SLOTS {
            self.error("Chunk exceeds maximum allowable constants.");
            return 0;
        }
        index as u16
    }

    pub(crate) fn emit_constant(&mut self, value: Particle) {
        let index = self.make_constant(value);
        self.emit_op_u16(OpCode::Constant, index);
    }

    pub(crate) fn identifier_constant(&mut self, name: &str) -> u16 {
        let name = self.heap.intern(name);
        self.make_constant(Particle::Obj(name))
    }

    /// Emit a forward jump with a placeholder operand, returning the operand offset.
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_u16(u16::MAX);
        self.frame().chunk.current_offset() - 2
    }

    pub(crate) fn patch_jump(&mut self, offset: usize) {
        let jump = self.frame().chunk.current_offset() - offset - 2;
        if jump > MAX_SLOTS {
            self.error("Too much code to jump over.");
            return;
        }
        self.chunk().patch_u16(offset, jump as u16);
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.frame().chunk.current_offset() - loop_start + 2;
        if offset > MAX_SLOTS {
            self.error("Loop body is too large.");
        }
        self.emit_u16(offset.min(MAX_SLOTS) as u16);
    }

    /// Emit the instruction(s) for a binary operator token.
    pub(crate) fn emit_operator(&mut self, kind: TokenKind) {
        match kind {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::Percent => self.emit_op(OpCode::Modulo),
            TokenKind::StarStar => self.emit_op(OpCode::Power),
            TokenKind::Caret => self.emit_op(OpCode::BitXor),
            TokenKind::Amp => self.emit_op(OpCode::BitAnd),
            TokenKind::Pipe => self.emit_op(OpCode::BitOr),
            TokenKind::ShiftLeft => self.emit_op(OpCode::ShiftLeft),
            TokenKind::ShiftRight => self.emit_op(OpCode::ShiftRight),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            _ => {}
        }
    }

    // ===== Garbage collection =====

    pub(crate) fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            let compiler = CompilerRoots(&self.frames);
            self.heap.collect(&[self.roots, &compiler]);
        }
    }

    // ===== Reactions =====

    /// Push a new compilation frame. Slot 0 is `this` for methods, unnamed otherwise.
    pub(crate) fn begin_reaction(&mut self, kind: ReactionKind, name: Option<&str>) {
        let name = name.map(|n| self.heap.intern(n));
        let reaction = self.heap.alloc(Object::Reaction(Reaction::new(name, kind)));

        let slot_zero = match kind {
            ReactionKind::Method | ReactionKind::Initialiser => "this",
            _ => "",
        };
        self.frames.push(FunctionState {
            reaction,
            kind,
            chunk: Chunk::new(),
            arity: 0,
            defaults: 0,
            locals: vec![Local {
                name: slot_zero,
                depth: Some(0),
                immutable: false,
                captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        });
    }

    /// Pop the innermost frame, moving its chunk into the reaction object.
    pub(crate) fn end_reaction(&mut self) -> (ObjRef, Vec<UpvalueSlot>) {
        self.emit_return();

        let Some(state) = self.frames.pop() else {
            unreachable!("reaction frame stack is never empty while compiling");
        };
        if let Ok(Object::Reaction(reaction)) = self.heap.get_mut(state.reaction) {
            reaction.arity = state.arity;
            reaction.defaults = state.defaults;
            reaction.upvalue_count = state.upvalues.len() as u16;
            reaction.chunk = state.chunk;
        }
        self.heap.recount(state.reaction);

        (state.reaction, state.upvalues)
    }

    // ===== Scopes =====

    pub(crate) fn begin_scope(&mut self) {
        self.frame_mut().scope_depth += 1;
    }

    /// Leave a scope, popping (or closing) its locals newest first.
    pub(crate) fn end_scope(&mut self) {
        self.frame_mut().scope_depth -= 1;
        let depth = self.frame().scope_depth;

        while let Some(local) = self.frame().locals.last() {
            if local.depth.is_some_and(|d| d <= depth) {
                break;
            }
            if local.captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.frame_mut().locals.pop();
        }
    }

    // ===== Variables =====

    pub(crate) fn add_local(&mut self, name: &'src str, immutable: bool) {
        if self.frame().locals.len() > MAX_SLOTS {
            self.error("Too many local variables in reaction.");
            return;
        }
        self.frame_mut().locals.push(Local {
            name,
            depth: None,
            immutable,
            captured: false,
        });
    }

    /// Declare the previous identifier as a local in the current scope.
    pub(crate) fn declare_variable(&mut self, immutable: bool) {
        if self.frame().scope_depth == 0 {
            return;
        }

        let name = self.previous.lexeme;
        let depth = self.frame().scope_depth;
        let duplicate = self
            .frame()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.map_or(true, |d| d >= depth))
            .any(|local| local.name == name);
        if duplicate {
            self.error("A variable already exists with this name in this scope.");
        }

        self.add_local(name, immutable);
    }

    /// Consume a variable name and declare it. Returns the global name constant
    /// at top level, or 0 for locals.
    pub(crate) fn parse_variable(&mut self, message: &str, immutable: bool) -> u16 {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable(immutable);
        if self.frame().scope_depth > 0 {
            return 0;
        }

        let name = self.previous.lexeme;
        if immutable {
            self.immutable_globals.insert(name.to_string());
        } else {
            self.immutable_globals.remove(name);
        }
        self.identifier_constant(name)
    }

    pub(crate) fn mark_initialized(&mut self) {
        let depth = self.frame().scope_depth;
        if depth == 0 {
            return;
        }
        if let Some(local) = self.frame_mut().locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    pub(crate) fn define_variable(&mut self, global: u16) {
        if self.frame().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_u16(OpCode::DefineGlobal, global);
    }

    /// Find a local in frame `frame`: (slot, immutable).
    pub(crate) fn resolve_local(&mut self, frame: usize, name: &str) -> Option<(u16, bool)> {
        let found = self.frames[frame]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)
            .map(|(slot, local)| (slot, local.depth.is_none(), local.immutable));

        let (slot, uninitialised, immutable) = found?;
        if uninitialised {
            self.error("Cannot read local variable in its own initialiser.");
        }
        Some((slot as u16, immutable))
    }

    /// Find or create an upvalue in frame `frame`: (index, immutable).
    pub(crate) fn resolve_upvalue(&mut self, frame: usize, name: &str) -> Option<(u16, bool)> {
        if frame == 0 {
            return None;
        }
        let enclosing = frame - 1;

        if let Some((slot, immutable)) = self.resolve_local(enclosing, name) {
            self.frames[enclosing].locals[slot as usize].captured = true;
            return Some((self.add_upvalue(frame, slot, true, immutable), immutable));
        }

        if let Some((index, immutable)) = self.resolve_upvalue(enclosing, name) {
            return Some((self.add_upvalue(frame, index, false, immutable), immutable));
        }

        None
    }

    fn add_upvalue(&mut self, frame: usize, index: u16, is_local: bool, immutable: bool) -> u16 {
        let upvalues = &self.frames[frame].upvalues;
        if let Some(existing) = upvalues
            .iter()
            .position(|uv| uv.index == index && uv.is_local == is_local)
        {
            return existing as u16;
        }

        if upvalues.len() >= MAX_SLOTS {
            self.error("Too many closure variables in reaction.");
            return 0;
        }
        self.frames[frame].upvalues.push(UpvalueSlot {
            index,
            is_local,
            immutable,
        });
        (self.frames[frame].upvalues.len() - 1) as u16
    }

    /// Resolve a name: local, then upvalue, then global.
    pub(crate) fn resolve_variable(&mut self, name: &str) -> (VariableAccess, bool) {
        let frame = self.frames.len() - 1;
        if let Some((slot, immutable)) = self.resolve_local(frame, name) {
            (VariableAccess::Local(slot), immutable)
        } else if let Some((index, immutable)) = self.resolve_upvalue(frame, name) {
            (VariableAccess::Upvalue(index), immutable)
        } else {
            let immutable = self.immutable_globals.contains(name);
            (VariableAccess::Global(self.identifier_constant(name)), immutable)
        }
    }

    /// An assignment to an immutable binding needs a pending `@mutate` permit.
    pub(crate) fn check_mutable(&mut self, immutable: bool) {
        if immutable && self.mutate_permit.take().is_none() {
            self.error("Cannot reassign an immutable constant.");
        }
    }
}
