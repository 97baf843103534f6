//! Heap object kinds.

use std::fmt;
use std::mem;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::Chunk;
use crate::error::Disruption;
use crate::particle::Particle;
use crate::stdlib::NativeContext;

/// A handle to a heap object: an index into the arena.
/// O(1) comparison and copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub u32);

impl ObjRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name-keyed table. Keys are interned strings, so identity hashing is content hashing.
pub type Table = IndexMap<ObjRef, Particle, ahash::RandomState>;

/// Host function signature for natives.
pub type NativeFn = Rc<dyn Fn(&mut NativeContext<'_>, &[Particle]) -> Result<Particle, Disruption>>;

/// An interned, immutable string.
#[derive(Debug, Clone)]
pub struct NString {
    pub text: Box<str>,
    pub hash: u64,
}

impl NString {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// What a reaction was compiled as; decides slot 0 and the implicit return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Reaction,
    Method,
    Initialiser,
    Script,
}

/// A function prototype.
#[derive(Debug, Clone)]
pub struct Reaction {
    /// Declared parameter count, defaulted ones included.
    pub arity: u8,
    /// Number of trailing parameters with a default expression.
    pub defaults: u8,
    pub upvalue_count: u16,
    /// `None` for the top-level script.
    pub name: Option<ObjRef>,
    pub chunk: Chunk,
    pub kind: ReactionKind,
}

impl Reaction {
    pub fn new(name: Option<ObjRef>, kind: ReactionKind) -> Self {
        Self {
            arity: 0,
            defaults: 0,
            upvalue_count: 0,
            name,
            chunk: Chunk::new(),
            kind,
        }
    }

    /// Minimum number of arguments a call must supply.
    pub fn required(&self) -> u8 {
        self.arity.saturating_sub(self.defaults)
    }
}

/// A reaction bound to its captured upvalues.
#[derive(Debug, Clone)]
pub struct Closure {
    pub reaction: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// A captured variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    /// Still lives on the operand stack at this slot.
    Open(usize),
    /// Owns its value; never reopened.
    Closed(Particle),
}

/// A class: a named bundle of methods and default field values.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: ObjRef,
    pub methods: Table,
    pub defaults: Table,
}

impl Model {
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            methods: Table::default(),
            defaults: Table::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub model: ObjRef,
    pub fields: Table,
}

impl Instance {
    pub fn new(model: ObjRef) -> Self {
        Self {
            model,
            fields: Table::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    pub receiver: Particle,
    pub method: ObjRef,
}

#[derive(Clone)]
pub struct Native {
    pub name: ObjRef,
    pub function: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native").field("name", &self.name).finish()
    }
}

/// Array flavours. Only basic arrays have behaviour today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Basic,
    Set,
    Stack,
    Queue,
}

#[derive(Debug, Clone)]
pub struct Array {
    pub kind: ArrayKind,
    pub values: Vec<Particle>,
}

impl Array {
    pub fn basic(values: Vec<Particle>) -> Self {
        Self {
            kind: ArrayKind::Basic,
            values,
        }
    }
}

/// Every heap-allocated object kind.
#[derive(Debug, Clone)]
pub enum Object {
    String(NString),
    Reaction(Reaction),
    Closure(Closure),
    Upvalue(Upvalue),
    Model(Model),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Native(Native),
    Array(Array),
}

impl Object {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Reaction(_) => "reaction",
            Object::Closure(_) => "closure",
            Object::Upvalue(_) => "upvalue",
            Object::Model(_) => "model",
            Object::Instance(_) => "instance",
            Object::BoundMethod(_) => "bound method",
            Object::Native(_) => "native",
            Object::Array(_) => "array",
        }
    }

    /// Estimated footprint used for collection pacing.
    pub fn size_hint(&self) -> usize {
        let table = |t: &Table| t.capacity() * mem::size_of::<(ObjRef, Particle, u64)>();
        let payload = match self {
            Object::String(s) => s.text.len(),
            Object::Reaction(r) => {
                r.chunk.code.capacity() * (1 + mem::size_of::<u32>())
                    + r.chunk.constants.capacity() * mem::size_of::<Particle>()
            }
            Object::Closure(c) => c.upvalues.capacity() * mem::size_of::<ObjRef>(),
            Object::Model(m) => table(&m.methods) + table(&m.defaults),
            Object::Instance(i) => table(&i.fields),
            Object::Array(a) => a.values.capacity() * mem::size_of::<Particle>(),
            Object::Upvalue(_) | Object::BoundMethod(_) | Object::Native(_) => 0,
        };
        mem::size_of::<Object>() + payload
    }
}
