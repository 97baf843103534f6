//! Bytecode instruction definitions for the Atomizer.
//!
//! Multi-byte operands are little-endian. Constant, slot and name operands are
//! all 16 bits wide; argument counts are a single byte.

/// Opcodes for the bytecode virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // ============ Constants & Stack ============
    /// Load a constant from the constant pool: CONSTANT <index:u16>
    Constant = 0,
    /// Push null onto the stack
    Null,
    /// Push true onto the stack
    True,
    /// Push false onto the stack
    False,
    /// Pop the top value from the stack
    Pop,

    // ============ Variables ============
    /// Get a local variable: GET_LOCAL <slot:u16>
    GetLocal,
    /// Set a local variable: SET_LOCAL <slot:u16>
    SetLocal,
    /// Get a global variable: GET_GLOBAL <name_index:u16>
    GetGlobal,
    /// Define a global variable: DEFINE_GLOBAL <name_index:u16>
    DefineGlobal,
    /// Set a global variable: SET_GLOBAL <name_index:u16>
    SetGlobal,
    /// Get an upvalue (captured variable): GET_UPVALUE <index:u16>
    GetUpvalue,
    /// Set an upvalue: SET_UPVALUE <index:u16>
    SetUpvalue,
    /// Close the upvalue on top of the stack and pop it
    CloseUpvalue,

    // ============ Arithmetic ============
    /// Add or concatenate: a + b
    Add,
    /// Subtract: a - b
    Subtract,
    /// Multiply or repeat: a * b
    Multiply,
    /// Divide: a / b
    Divide,
    /// Floating modulo: a % b
    Modulo,
    /// Exponent: a ** b
    Power,
    /// Negate: -a
    Negate,

    // ============ Bitwise ============
    /// a & b
    BitAnd,
    /// a | b
    BitOr,
    /// a ^ b
    BitXor,
    /// ~a
    BitNot,
    /// a << b
    ShiftLeft,
    /// a >> b
    ShiftRight,

    // ============ Logic & Comparison ============
    /// Logical not: !a
    Not,
    /// Equal: a == b
    Equal,
    /// Greater than: a > b
    Greater,
    /// Less than: a < b
    Less,

    // ============ Control Flow ============
    /// Unconditional forward jump: JUMP <offset:u16>
    Jump,
    /// Jump if the top of the stack is falsey (no pop): JUMP_IF_FALSE <offset:u16>
    JumpIfFalse,
    /// Loop back: LOOP <offset:u16>
    Loop,
    /// Open a catch region: CATCH_MODE <catch_offset:u16>
    CatchMode,
    /// Close the innermost catch region
    EndCatchMode,

    // ============ Reactions & Calls ============
    /// Call a value: CALL <arg_count:u8>
    Call,
    /// Invoke a method: INVOKE <name_index:u16> <arg_count:u8>
    Invoke,
    /// Invoke a base model method: SUPER_INVOKE <name_index:u16> <arg_count:u8>
    SuperInvoke,
    /// Create a closure: CLOSURE <reaction_index:u16> [<is_local:u8> <index:u16>]...
    Closure,
    /// Return from the current reaction
    Return,

    // ============ Models & Instances ============
    /// Create a model: MODEL <name_index:u16>
    Model,
    /// Copy the parent's methods and defaults into the child
    Inherit,
    /// Define a method: METHOD <name_index:u16>
    Method,
    /// Define a default field: FIELD <name_index:u16>
    Field,
    /// Get a property: GET_PROPERTY <name_index:u16>
    GetProperty,
    /// Set a property, leaving the value: SET_PROPERTY <name_index:u16>
    SetProperty,
    /// Set a property, leaving the instance: SET_BASE_PROPERTY <name_index:u16>
    SetBaseProperty,
    /// Bind a base model method: GET_SUPER <name_index:u16>
    GetSuper,

    // ============ Collections ============
    /// Build an array from the top values: ARRAY <count:u16>
    Array,
    /// Get a member: container[key]
    GetMember,
    /// Set a member, leaving the value: container[key] = value
    SetMember,

    // ============ Natives ============
    /// Look up a native by dotted name: GET_NATIVE <name_index:u16>
    GetNative,
}

impl OpCode {
    /// Get the number of operand bytes for this opcode.
    ///
    /// `Closure` reports only its fixed operand; the upvalue pairs that follow
    /// depend on the reaction being closed over.
    pub fn operand_size(self) -> usize {
        match self {
            // No operands
            OpCode::Null
            | OpCode::True
            | OpCode::False
            | OpCode::Pop
            | OpCode::CloseUpvalue
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Modulo
            | OpCode::Power
            | OpCode::Negate
            | OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::BitNot
            | OpCode::ShiftLeft
            | OpCode::ShiftRight
            | OpCode::Not
            | OpCode::Equal
            | OpCode::Greater
            | OpCode::Less
            | OpCode::EndCatchMode
            | OpCode::Return
            | OpCode::Inherit
            | OpCode::GetMember
            | OpCode::SetMember => 0,

            // 1 byte operand
            OpCode::Call => 1,

            // 2 byte operand
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::Loop
            | OpCode::CatchMode
            | OpCode::Closure
            | OpCode::Model
            | OpCode::Method
            | OpCode::Field
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::SetBaseProperty
            | OpCode::GetSuper
            | OpCode::Array
            | OpCode::GetNative => 2,

            // 3 byte operand (2 bytes + 1 byte)
            OpCode::Invoke | OpCode::SuperInvoke => 3,
        }
    }

    /// Convert from u8 to OpCode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        if byte <= OpCode::GetNative as u8 {
            // SAFETY: OpCode is repr(u8) with contiguous discriminants starting at 0.
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }

    /// Upper-case mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "CONSTANT",
            OpCode::Null => "NULL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::DefineGlobal => "DEFINE_GLOBAL",
            OpCode::SetGlobal => "SET_GLOBAL",
            OpCode::GetUpvalue => "GET_UPVALUE",
            OpCode::SetUpvalue => "SET_UPVALUE",
            OpCode::CloseUpvalue => "CLOSE_UPVALUE",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Modulo => "MODULO",
            OpCode::Power => "POWER",
            OpCode::Negate => "NEGATE",
            OpCode::BitAnd => "BIT_AND",
            OpCode::BitOr => "BIT_OR",
            OpCode::BitXor => "BIT_XOR",
            OpCode::BitNot => "BIT_NOT",
            OpCode::ShiftLeft => "SHIFT_LEFT",
            OpCode::ShiftRight => "SHIFT_RIGHT",
            OpCode::Not => "NOT",
            OpCode::Equal => "EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::Less => "LESS",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::Loop => "LOOP",
            OpCode::CatchMode => "CATCH_MODE",
            OpCode::EndCatchMode => "END_CATCH_MODE",
            OpCode::Call => "CALL",
            OpCode::Invoke => "INVOKE",
            OpCode::SuperInvoke => "SUPER_INVOKE",
            OpCode::Closure => "CLOSURE",
            OpCode::Return => "RETURN",
            OpCode::Model => "MODEL",
            OpCode::Inherit => "INHERIT",
            OpCode::Method => "METHOD",
            OpCode::Field => "FIELD",
            OpCode::GetProperty => "GET_PROPERTY",
            OpCode::SetProperty => "SET_PROPERTY",
            OpCode::SetBaseProperty => "SET_BASE_PROPERTY",
            OpCode::GetSuper => "GET_SUPER",
            OpCode::Array => "ARRAY",
            OpCode::GetMember => "GET_MEMBER",
            OpCode::SetMember => "SET_MEMBER",
            OpCode::GetNative => "GET_NATIVE",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

/// Information about an upvalue for closure creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueInfo {
    /// True if this upvalue captures a local in the enclosing reaction,
    /// false if it captures an upvalue of the enclosing reaction.
    pub is_local: bool,
    /// The index of the local slot or upvalue being captured.
    pub index: u16,
}

impl UpvalueInfo {
    pub fn new(is_local: bool, index: u16) -> Self {
        Self { is_local, index }
    }
}
