//! The Atomizer: a stack-based bytecode virtual machine.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use ahash::AHashSet;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bytecode::{disassemble_instruction, print_disassembly, OpCode};
use crate::compiler::compile_script;
use crate::error::{CompileErrors, Disruption, ExitCode, NucleusError, RuntimeFault};
use crate::particle::{
    Closure, GcRoots, Heap, Model, Native, ObjRef, Object, Particle, Table,
};
use crate::stdlib::{self, NativeContext};

use super::config::Config;

/// A call frame on the Atomizer call stack.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,
    /// The closure's reaction, cached to save a lookup per instruction.
    pub reaction: ObjRef,
    /// Instruction pointer (index into the chunk's code).
    pub ip: usize,
    /// Stack index of slot 0.
    pub base: usize,
}

impl GcRoots for Vec<CallFrame> {
    fn mark_roots(&self, heap: &mut Heap) {
        for frame in self {
            heap.mark_object(frame.closure);
        }
    }
}

/// A catch region opened by CATCH_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchRegion {
    /// Absolute IP of the catch block.
    pub catch_ip: usize,
    /// Call frame depth when the region was opened.
    pub frame_depth: usize,
    /// Stack height when the region was opened.
    pub stack_height: usize,
}

/// Interned names the runtime compares against by handle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sentinels {
    pub(crate) construct: ObjRef,
    pub(crate) message: ObjRef,
    pub(crate) code: ObjRef,
}

/// Result of compiling and running one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    CompileFault,
    RuntimeFault(ExitCode),
}

impl ExitStatus {
    /// Process exit code for this status.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::CompileFault => ExitCode::Syntax.into(),
            ExitStatus::RuntimeFault(code) => code.into(),
        }
    }
}

/// What the dispatch loop does after an instruction.
pub(crate) enum Flow {
    Continue,
    Halt,
}

/// An in-memory output sink that can be read back after running.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The virtual machine: operand stack, call frames, globals and the heap.
pub struct Atomizer {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Particle>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: Table,
    pub(crate) natives: Table,
    /// Open upvalues, sorted by stack slot (ascending).
    pub(crate) open_upvalues: Vec<ObjRef>,
    pub(crate) catch_regions: Vec<CatchRegion>,
    /// Sentinels and base models; always live.
    pub(crate) pinned: Vec<ObjRef>,
    pub(crate) sentinels: Sentinels,
    pub(crate) base_model: ObjRef,
    pub(crate) disruption_model: ObjRef,
    /// Global names that are `const`, kept across scripts.
    pub(crate) immutable_globals: AHashSet<String>,
    pub(crate) config: Config,
    pub(crate) out: Box<dyn Write>,
    pub(crate) rng: StdRng,
    pub(crate) started: Instant,
    /// Source of the running script, for trace lines.
    pub(crate) source: String,
    last_fault: Option<RuntimeFault>,
    last_errors: Option<CompileErrors>,
}

impl Atomizer {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut heap = Heap::new(config.gc());
        let sentinels = Sentinels {
            construct: heap.intern("@construct"),
            message: heap.intern("message"),
            code: heap.intern("code"),
        };

        let model_name = heap.intern("Model");
        let base_model = heap.alloc(Object::Model(Model::new(model_name)));
        let disruption_name = heap.intern("Disruption");
        let disruption_model = heap.alloc(Object::Model(Model::new(disruption_name)));

        let mut globals = Table::default();
        globals.insert(model_name, Particle::Obj(base_model));
        globals.insert(disruption_name, Particle::Obj(disruption_model));

        let mut immutable_globals = AHashSet::new();
        immutable_globals.insert("Model".to_string());
        immutable_globals.insert("Disruption".to_string());

        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            globals,
            natives: Table::default(),
            open_upvalues: Vec::new(),
            catch_regions: Vec::new(),
            pinned: vec![
                sentinels.construct,
                sentinels.message,
                sentinels.code,
                base_model,
                disruption_model,
            ],
            sentinels,
            base_model,
            disruption_model,
            immutable_globals,
            config,
            out: Box::new(io::stdout()),
            rng: StdRng::from_entropy(),
            started: Instant::now(),
            source: String::new(),
            last_fault: None,
            last_errors: None,
        };
        stdlib::register_all(&mut vm);
        vm
    }

    /// Redirect `std.print` output.
    pub fn set_output(&mut self, out: impl Write + 'static) {
        self.out = Box::new(out);
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The fault reported by the last `compile_and_run`, if it failed at runtime.
    pub fn last_fault(&self) -> Option<&RuntimeFault> {
        self.last_fault.as_ref()
    }

    /// The diagnostics of the last `compile_and_run`, if it failed to compile.
    pub fn last_compile_errors(&self) -> Option<&CompileErrors> {
        self.last_errors.as_ref()
    }

    /// Look up a global by name.
    pub fn global(&self, name: &str) -> Option<Particle> {
        let key = self.heap.lookup_interned(name)?;
        self.globals.get(&key).copied()
    }

    /// Register a host function under a dotted library name such as `std.print`.
    pub fn register_native<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&mut NativeContext<'_>, &[Particle]) -> Result<Particle, Disruption> + 'static,
    {
        let key = self.heap.intern(name);
        let native = self.heap.alloc(Object::Native(Native {
            name: key,
            function: Rc::new(function),
        }));
        self.natives.insert(key, Particle::Obj(native));
    }

    /// Register a constant library value such as `math.pi`.
    pub fn register_native_property(&mut self, name: &str, value: Particle) {
        let key = self.heap.intern(name);
        self.natives.insert(key, value);
    }

    // ============ Entry points ============

    /// Compile and run `source`, reporting any failure to stderr.
    pub fn compile_and_run(&mut self, source: &str) -> ExitStatus {
        self.last_fault = None;
        self.last_errors = None;

        match self.interpret(source) {
            Ok(()) => ExitStatus::Success,
            Err(NucleusError::Compile(errors)) => {
                errors.report(source);
                self.last_errors = Some(errors);
                ExitStatus::CompileFault
            }
            Err(NucleusError::Runtime(fault)) => {
                fault.report();
                let status = ExitStatus::RuntimeFault(fault.code());
                self.last_fault = Some(fault);
                status
            }
            Err(NucleusError::Io(err)) => {
                eprintln!("IO error: {}", err);
                ExitStatus::RuntimeFault(ExitCode::Io)
            }
        }
    }

    /// Compile and run `source`, returning failures instead of reporting them.
    pub fn interpret(&mut self, source: &str) -> Result<(), NucleusError> {
        let script = self.compile(source)?;
        if self.config.print_code {
            print_disassembly(&self.heap, script);
        }

        self.source = source.to_string();
        let closure = self.heap.alloc(Object::Closure(Closure {
            reaction: script,
            upvalues: Vec::new(),
        }));
        self.stack.push(Particle::Obj(closure));
        self.frames.push(CallFrame {
            closure,
            reaction: script,
            ip: 0,
            base: self.stack.len() - 1,
        });

        let result = self.run();
        self.out.flush()?;
        result.map_err(NucleusError::from)
    }

    /// Compile `source` with everything the Atomizer holds as GC roots.
    pub fn compile(&mut self, source: &str) -> Result<ObjRef, CompileErrors> {
        let roots: [&dyn GcRoots; 6] = [
            &self.stack,
            &self.frames,
            &self.open_upvalues,
            &self.globals,
            &self.natives,
            &self.pinned,
        ];
        compile_script(source, &mut self.heap, &roots, &mut self.immutable_globals)
    }

    /// Run a full collection over the Atomizer's roots.
    pub fn collect_garbage(&mut self) -> usize {
        let roots: [&dyn GcRoots; 6] = [
            &self.stack,
            &self.frames,
            &self.open_upvalues,
            &self.globals,
            &self.natives,
            &self.pinned,
        ];
        self.heap.collect(&roots)
    }

    // ============ Dispatch loop ============

    /// Execute until the outermost frame returns or a disruption escapes.
    pub(crate) fn run(&mut self) -> Result<(), RuntimeFault> {
        loop {
            if self.heap.should_collect() {
                self.collect_garbage();
            }
            if self.config.trace_execution {
                self.trace_instruction();
            }

            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => return Ok(()),
                Err(disruption) => {
                    if let Err(disruption) = self.catch_disruption(disruption) {
                        return Err(self.escape(disruption));
                    }
                }
            }
        }
    }

    /// Fetch, decode and execute one instruction.
    fn step(&mut self) -> Result<Flow, Disruption> {
        let byte = self.read_byte()?;
        let Some(op) = OpCode::from_u8(byte) else {
            return Err(Disruption::internal(format!(
                "Encountered an unknown operation {}.",
                byte
            )));
        };

        match op {
            OpCode::Constant => {
                let constant = self.read_constant()?;
                self.push(constant)?;
            }
            OpCode::Null => self.push(Particle::Null)?,
            OpCode::True => self.push(Particle::Bool(true))?,
            OpCode::False => self.push(Particle::Bool(false))?,
            OpCode::Pop => {
                self.pop()?;
            }

            // --- Variables ---
            OpCode::GetLocal => {
                let offset = self.read_u16()? as usize;
                let value = self.slot(self.frame()?.base + offset)?;
                self.push(value)?;
            }
            OpCode::SetLocal => {
                let offset = self.read_u16()? as usize;
                let slot = self.frame()?.base + offset;
                let value = self.peek(0)?;
                self.set_slot(slot, value)?;
            }
            OpCode::GetGlobal => {
                let name = self.read_string()?;
                match self.globals.get(&name).copied() {
                    Some(value) => self.push(value)?,
                    None => return Err(Disruption::undefined_variable(self.heap.name(name))),
                }
            }
            OpCode::DefineGlobal => {
                let name = self.read_string()?;
                let value = self.peek(0)?;
                self.globals.insert(name, value);
                self.pop()?;
            }
            OpCode::SetGlobal => {
                let name = self.read_string()?;
                let value = self.peek(0)?;
                match self.globals.get_mut(&name) {
                    Some(slot) => *slot = value,
                    None => {
                        return Err(Disruption::reference(format!(
                            "Tried to set an undefined variable \"{}\".",
                            self.heap.name(name)
                        )))
                    }
                }
            }
            OpCode::GetUpvalue => {
                let index = self.read_u16()? as usize;
                let value = self.read_upvalue(index)?;
                self.push(value)?;
            }
            OpCode::SetUpvalue => {
                let index = self.read_u16()? as usize;
                let value = self.peek(0)?;
                self.write_upvalue(index, value)?;
            }
            OpCode::CloseUpvalue => {
                let top = self.stack.len().saturating_sub(1);
                self.close_upvalues(top)?;
                self.pop()?;
            }

            // --- Operators ---
            OpCode::Add => self.op_add()?,
            OpCode::Multiply => self.op_multiply()?,
            OpCode::Subtract | OpCode::Divide | OpCode::Modulo | OpCode::Power => {
                self.op_arithmetic(op)?
            }
            OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::ShiftLeft
            | OpCode::ShiftRight => self.op_bitwise(op)?,
            OpCode::Negate => self.op_negate()?,
            OpCode::BitNot => self.op_bit_not()?,
            OpCode::Not => {
                let value = self.pop()?;
                let falsey = self.is_falsey(value);
                self.push(Particle::Bool(falsey))?;
            }
            OpCode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Particle::Bool(a == b))?;
            }
            OpCode::Greater | OpCode::Less => self.op_compare(op)?,

            // --- Control flow ---
            OpCode::Jump => {
                let offset = self.read_u16()? as usize;
                self.frame_mut()?.ip += offset;
            }
            OpCode::JumpIfFalse => {
                let offset = self.read_u16()? as usize;
                if self.is_falsey(self.peek(0)?) {
                    self.frame_mut()?.ip += offset;
                }
            }
            OpCode::Loop => {
                let offset = self.read_u16()? as usize;
                let frame = self.frame_mut()?;
                frame.ip = frame.ip.saturating_sub(offset);
            }
            OpCode::CatchMode => {
                let offset = self.read_u16()? as usize;
                let region = CatchRegion {
                    catch_ip: self.frame()?.ip + offset,
                    frame_depth: self.frames.len(),
                    stack_height: self.stack.len(),
                };
                self.catch_regions.push(region);
            }
            OpCode::EndCatchMode => {
                self.catch_regions.pop();
            }

            // --- Calls ---
            OpCode::Call => {
                let arg_count = self.read_byte()? as usize;
                let callee = self.peek(arg_count)?;
                self.call_value(callee, arg_count)?;
            }
            OpCode::Invoke => {
                let name = self.read_string()?;
                let arg_count = self.read_byte()? as usize;
                self.invoke(name, arg_count)?;
            }
            OpCode::SuperInvoke => {
                let name = self.read_string()?;
                let arg_count = self.read_byte()? as usize;
                let parent = self.pop_model()?;
                self.invoke_from_model(parent, name, arg_count)?;
            }
            OpCode::Closure => self.make_closure()?,
            OpCode::Return => return self.return_from_frame(),

            // --- Models ---
            OpCode::Model => {
                let name = self.read_string()?;
                let model = self.heap.alloc(Object::Model(Model::new(name)));
                self.push(Particle::Obj(model))?;
            }
            OpCode::Inherit => self.inherit()?,
            OpCode::Method => {
                let name = self.read_string()?;
                self.define_method(name)?;
            }
            OpCode::Field => {
                let name = self.read_string()?;
                self.define_field(name)?;
            }
            OpCode::GetProperty => {
                let name = self.read_string()?;
                self.get_property(name)?;
            }
            OpCode::SetProperty => {
                let name = self.read_string()?;
                self.set_property(name, false)?;
            }
            OpCode::SetBaseProperty => {
                let name = self.read_string()?;
                self.set_property(name, true)?;
            }
            OpCode::GetSuper => {
                let name = self.read_string()?;
                let parent = self.pop_model()?;
                self.bind_method(parent, name)?;
            }

            // --- Arrays and members ---
            OpCode::Array => {
                let count = self.read_u16()? as usize;
                self.build_array(count)?;
            }
            OpCode::GetMember => self.get_member()?,
            OpCode::SetMember => self.set_member()?,

            OpCode::GetNative => {
                let name = self.read_string()?;
                match self.natives.get(&name).copied() {
                    Some(value) => self.push(value)?,
                    None => {
                        return Err(Disruption::reference(format!(
                            "Undefined native reference \"{}\".",
                            self.heap.name(name)
                        )))
                    }
                }
            }
        }

        Ok(Flow::Continue)
    }

    /// Pop the current frame, leaving its result in the caller.
    fn return_from_frame(&mut self) -> Result<Flow, Disruption> {
        let result = self.pop()?;
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Disruption::internal("Returned with no active call frame."))?;
        self.close_upvalues(frame.base)?;

        // Regions opened by the finished frame can no longer catch
        let depth = self.frames.len();
        while self
            .catch_regions
            .last()
            .is_some_and(|region| region.frame_depth > depth)
        {
            self.catch_regions.pop();
        }

        self.stack.truncate(frame.base);
        if self.frames.is_empty() {
            return Ok(Flow::Halt);
        }
        self.push(result)?;
        Ok(Flow::Continue)
    }

    // ============ Stack ============

    pub(crate) fn push(&mut self, value: Particle) -> Result<(), Disruption> {
        if self.stack.len() >= self.config.stack_max {
            return Err(Disruption::overflow("Exceeded maximum operand stack size."));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Particle, Disruption> {
        self.stack
            .pop()
            .ok_or_else(|| Disruption::internal("Operand stack underflow."))
    }

    /// The value `distance` slots below the top.
    pub(crate) fn peek(&self, distance: usize) -> Result<Particle, Disruption> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| self.stack[index])
            .ok_or_else(|| Disruption::internal("Operand stack underflow."))
    }

    pub(crate) fn slot(&self, index: usize) -> Result<Particle, Disruption> {
        self.stack
            .get(index)
            .copied()
            .ok_or_else(|| Disruption::internal("Stack slot out of range."))
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Particle) -> Result<(), Disruption> {
        match self.stack.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Disruption::internal("Stack slot out of range.")),
        }
    }

    // ============ Frames and operands ============

    pub(crate) fn frame(&self) -> Result<&CallFrame, Disruption> {
        self.frames
            .last()
            .ok_or_else(|| Disruption::internal("No active call frame."))
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut CallFrame, Disruption> {
        self.frames
            .last_mut()
            .ok_or_else(|| Disruption::internal("No active call frame."))
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, Disruption> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Disruption::internal("No active call frame."))?;
        let chunk = &self.heap.reaction(frame.reaction)?.chunk;
        let byte = chunk.code.get(frame.ip).copied().ok_or_else(|| {
            Disruption::internal("Instruction pointer ran past the end of the chunk.")
        })?;
        frame.ip += 1;
        Ok(byte)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Disruption> {
        let lo = self.read_byte()? as u16;
        let hi = self.read_byte()? as u16;
        Ok(lo | (hi << 8))
    }

    pub(crate) fn read_constant(&mut self) -> Result<Particle, Disruption> {
        let index = self.read_u16()? as usize;
        let reaction = self.frame()?.reaction;
        self.heap
            .reaction(reaction)?
            .chunk
            .constants
            .get(index)
            .copied()
            .ok_or_else(|| Disruption::internal("Constant index out of range."))
    }

    pub(crate) fn read_string(&mut self) -> Result<ObjRef, Disruption> {
        match self.read_constant()? {
            Particle::Obj(r) if self.heap.str(r).is_some() => Ok(r),
            _ => Err(Disruption::internal("Expected a string constant operand.")),
        }
    }

    // ============ Diagnostics ============

    /// Print the stack and the next instruction to stderr.
    fn trace_instruction(&self) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let Ok(reaction) = self.heap.reaction(frame.reaction) else {
            return;
        };

        let mut line = String::from("          ");
        for value in &self.stack {
            line.push_str(&format!("[ {} ]", self.heap.stringify(*value)));
        }
        eprintln!("{}", line);

        let mut text = String::new();
        disassemble_instruction(&self.heap, &reaction.chunk, frame.ip, &mut text);
        eprint!("{}", text);
    }
}

impl Default for Atomizer {
    fn default() -> Self {
        Self::new()
    }
}
