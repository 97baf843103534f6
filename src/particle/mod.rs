//! Runtime values and the garbage-collected heap they point into.
//!
//! - `Particle`: the tagged scalar the VM pushes around
//! - `object`: every heap object kind
//! - `heap`: arena storage, string interning and allocation accounting
//! - `gc`: mark-sweep collection over the arena

pub mod gc;
pub mod heap;
pub mod object;

pub use gc::GcRoots;
pub use heap::{GcConfig, Heap};
pub use object::{
    Array, ArrayKind, BoundMethod, Closure, Instance, Model, NString, Native, NativeFn, ObjRef,
    Object, Reaction, ReactionKind, Table, Upvalue,
};

/// A tagged runtime value.
///
/// Numbers compare numerically (so `NaN != NaN`); everything else compares by
/// identity, which for interned strings is the same as by content.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Particle {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Obj(ObjRef),
}

impl Particle {
    pub fn is_null(self) -> bool {
        matches!(self, Particle::Null)
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            Particle::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_obj(self) -> Option<ObjRef> {
        match self {
            Particle::Obj(r) => Some(r),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Particle::Null => "null",
            Particle::Bool(_) => "boolean",
            Particle::Number(_) => "numeric",
            Particle::Obj(_) => "object",
        }
    }
}

impl From<f64> for Particle {
    fn from(n: f64) -> Self {
        Particle::Number(n)
    }
}

impl From<bool> for Particle {
    fn from(b: bool) -> Self {
        Particle::Bool(b)
    }
}

impl From<ObjRef> for Particle {
    fn from(r: ObjRef) -> Self {
        Particle::Obj(r)
    }
}

/// Canonical text form of a number: integral values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        let mut buffer = itoa::Buffer::new();
        return buffer.format(n as i64).to_string();
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format_finite(n).to_string()
}
