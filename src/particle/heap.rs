//! Arena heap with string interning and allocation accounting.
//!
//! Objects live in `slots`; an `ObjRef` is the slot index. Freed slots are
//! recycled through a free list. Strings are deduplicated through a weak intern
//! table bucketed by each string's cached hash.

use std::hash::BuildHasher;

use ahash::AHashMap;

use crate::error::Disruption;
use crate::particle::object::{
    Array, Closure, Instance, Model, NString, ObjRef, Object, Reaction, Upvalue,
};
use crate::particle::{format_number, Particle};

/// Collection pacing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    pub initial_threshold: usize,
    pub growth_factor: usize,
    /// Collect at every safe point that follows an allocation.
    pub stress: bool,
    pub log: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 1024 * 1024,
            growth_factor: 2,
            stress: false,
            log: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct HeapEntry {
    pub(crate) marked: bool,
    pub(crate) size: usize,
    pub(crate) object: Object,
}

/// The garbage-collected object arena.
#[derive(Debug)]
pub struct Heap {
    pub(crate) slots: Vec<Option<HeapEntry>>,
    pub(crate) free: Vec<u32>,
    pub(crate) interned: AHashMap<u64, Vec<ObjRef>>,
    pub(crate) gray: Vec<ObjRef>,
    pub(crate) bytes_allocated: usize,
    pub(crate) next_gc: usize,
    pub(crate) allocated_since_gc: bool,
    pub(crate) collections: usize,
    pub(crate) config: GcConfig,
    hasher: ahash::RandomState,
}

macro_rules! typed_accessors {
    ($(($get:ident, $get_mut:ident, $variant:ident, $ty:ty)),* $(,)?) => {
        $(
            pub fn $get(&self, r: ObjRef) -> Result<&$ty, Disruption> {
                match self.get(r)? {
                    Object::$variant(inner) => Ok(inner),
                    other => Err(Disruption::internal(format!(
                        "Expected a {} object but found a {}.",
                        stringify!($get),
                        other.kind_name()
                    ))),
                }
            }

            pub fn $get_mut(&mut self, r: ObjRef) -> Result<&mut $ty, Disruption> {
                match self.get_mut(r)? {
                    Object::$variant(inner) => Ok(inner),
                    other => Err(Disruption::internal(format!(
                        "Expected a {} object but found a {}.",
                        stringify!($get),
                        other.kind_name()
                    ))),
                }
            }
        )*
    };
}

impl Heap {
    pub fn new(config: GcConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            interned: AHashMap::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.initial_threshold,
            allocated_since_gc: false,
            collections: 0,
            config,
            hasher: ahash::RandomState::new(),
        }
    }

    /// Place an object in the arena. Never collects; callers collect at safe points.
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        let size = object.size_hint();
        self.bytes_allocated += size;
        self.allocated_since_gc = true;

        let entry = HeapEntry {
            marked: false,
            size,
            object,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(entry);
                ObjRef(index)
            }
            None => {
                self.slots.push(Some(entry));
                ObjRef((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Return the unique string object with this content, allocating it if needed.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = self.hasher.hash_one(text);
        if let Some(found) = self.find_interned(text, hash) {
            return found;
        }

        let r = self.alloc(Object::String(NString {
            text: text.into(),
            hash,
        }));
        self.interned.entry(hash).or_default().push(r);
        r
    }

    /// Look up an interned string without allocating.
    pub fn lookup_interned(&self, text: &str) -> Option<ObjRef> {
        self.find_interned(text, self.hasher.hash_one(text))
    }

    fn find_interned(&self, text: &str, hash: u64) -> Option<ObjRef> {
        self.interned.get(&hash)?.iter().copied().find(|r| {
            matches!(self.slots[r.index()].as_ref(), Some(HeapEntry { object: Object::String(s), .. }) if &*s.text == text)
        })
    }

    /// The object behind a handle; a freed or foreign handle is an internal disruption.
    pub fn get(&self, r: ObjRef) -> Result<&Object, Disruption> {
        match self.slots.get(r.index()) {
            Some(Some(entry)) => Ok(&entry.object),
            _ => Err(dangling(r)),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Result<&mut Object, Disruption> {
        match self.slots.get_mut(r.index()) {
            Some(Some(entry)) => Ok(&mut entry.object),
            _ => Err(dangling(r)),
        }
    }

    /// Whether the handle still points at a live object.
    pub fn contains(&self, r: ObjRef) -> bool {
        matches!(self.slots.get(r.index()), Some(Some(_)))
    }

    typed_accessors!(
        (reaction, reaction_mut, Reaction, Reaction),
        (closure, closure_mut, Closure, Closure),
        (upvalue, upvalue_mut, Upvalue, Upvalue),
        (model, model_mut, Model, Model),
        (instance, instance_mut, Instance, Instance),
        (array, array_mut, Array, Array),
    );

    /// The text of a string object, if `r` is one.
    pub fn str(&self, r: ObjRef) -> Option<&str> {
        match self.get(r) {
            Ok(Object::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The text of a particle, if it holds a string.
    pub fn string_of(&self, p: Particle) -> Option<&str> {
        match p {
            Particle::Obj(r) => self.str(r),
            _ => None,
        }
    }

    pub fn is_string(&self, p: Particle) -> bool {
        self.string_of(p).is_some()
    }

    /// Text of a name handle; empty when it is not a string.
    pub fn name(&self, r: ObjRef) -> &str {
        self.str(r).unwrap_or("")
    }

    /// Re-estimate an object's footprint after it grew in place.
    pub fn recount(&mut self, r: ObjRef) {
        if let Some(Some(entry)) = self.slots.get_mut(r.index()) {
            let size = entry.object.size_hint();
            self.bytes_allocated = self.bytes_allocated - entry.size + size;
            if size > entry.size {
                self.allocated_since_gc = true;
            }
            entry.size = size;
        }
    }

    /// True when a collection is due at the next safe point.
    pub fn should_collect(&self) -> bool {
        if self.config.stress {
            self.allocated_since_gc
        } else {
            self.bytes_allocated > self.next_gc
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Number of live objects.
    pub fn live_objects(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn config(&self) -> GcConfig {
        self.config
    }

    pub fn set_stress(&mut self, stress: bool) {
        self.config.stress = stress;
    }

    /// Text form of a particle as printed by `std.print` and used by concatenation.
    pub fn stringify(&self, p: Particle) -> String {
        match p {
            Particle::Null => "null".to_string(),
            Particle::Bool(b) => b.to_string(),
            Particle::Number(n) => format_number(n),
            Particle::Obj(r) => self.stringify_object(r, false, &mut Vec::new()),
        }
    }

    /// `path` holds the arrays currently being printed; meeting one again prints `[...]`.
    fn stringify_object(&self, r: ObjRef, nested: bool, path: &mut Vec<ObjRef>) -> String {
        let Ok(object) = self.get(r) else {
            return "<freed>".to_string();
        };
        match object {
            Object::String(s) if nested => format!("\"{}\"", s.as_str()),
            Object::String(s) => s.as_str().to_string(),
            Object::Reaction(reaction) => self.reaction_label(reaction),
            Object::Closure(closure) => match self.reaction(closure.reaction) {
                Ok(reaction) => self.reaction_label(reaction),
                Err(_) => "<script>".to_string(),
            },
            Object::BoundMethod(bound) => match self.closure(bound.method) {
                Ok(closure) => self.stringify_object(closure.reaction, false, path),
                Err(_) => "<bound method>".to_string(),
            },
            Object::Native(_) => "<native rn>".to_string(),
            Object::Upvalue(_) => "upvalue".to_string(),
            Object::Model(model) => format!("<model {}>", self.name(model.name)),
            Object::Instance(instance) => match self.model(instance.model) {
                Ok(model) => format!("<{} instance>", self.name(model.name)),
                Err(_) => "<instance>".to_string(),
            },
            Object::Array(_) if path.contains(&r) => "[...]".to_string(),
            Object::Array(array) => {
                path.push(r);
                let items: Vec<String> = array
                    .values
                    .iter()
                    .map(|value| match value {
                        Particle::Obj(inner) => self.stringify_object(*inner, true, path),
                        other => self.stringify(*other),
                    })
                    .collect();
                path.pop();
                format!("[{}]", items.join(", "))
            }
        }
    }

    fn reaction_label(&self, reaction: &Reaction) -> String {
        match reaction.name {
            Some(name) => format!("<reaction: {}>", self.name(name)),
            None => "<script>".to_string(),
        }
    }
}

fn dangling(r: ObjRef) -> Disruption {
    Disruption::internal(format!("Dangling object handle {}.", r))
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::object::ReactionKind;

    #[test]
    fn test_intern_identity() {
        let mut heap = Heap::default();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        let c = heap.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.str(a), Some("hello"));
        assert_eq!(heap.live_objects(), 2);
        assert_eq!(heap.lookup_interned("world"), Some(c));
        assert_eq!(heap.lookup_interned("absent"), None);
    }

    #[test]
    fn test_allocation_accounting() {
        let mut heap = Heap::default();
        assert_eq!(heap.bytes_allocated(), 0);
        heap.intern("abc");
        assert!(heap.bytes_allocated() > 0);
        assert!(!heap.should_collect());
    }

    #[test]
    fn test_typed_accessor_mismatch() {
        let mut heap = Heap::default();
        let s = heap.intern("x");
        let err = heap.reaction(s).unwrap_err();
        assert!(err.fatal);
        assert!(err.message.contains("found a string"));
    }

    #[test]
    fn test_stringify() {
        let mut heap = Heap::default();
        let name = heap.intern("area");
        let reaction = heap.alloc(Object::Reaction(Reaction::new(
            Some(name),
            ReactionKind::Reaction,
        )));
        let s = heap.intern("a");
        let array = heap.alloc(Object::Array(Array::basic(vec![
            Particle::Number(1.0),
            Particle::Obj(s),
            Particle::Null,
        ])));

        assert_eq!(heap.stringify(Particle::Obj(reaction)), "<reaction: area>");
        assert_eq!(heap.stringify(Particle::Obj(array)), "[1, \"a\", null]");
        assert_eq!(heap.stringify(Particle::Obj(s)), "a");
        assert_eq!(heap.stringify(Particle::Number(2.5)), "2.5");
    }

    #[test]
    fn test_stringify_cyclic_arrays() {
        let mut heap = Heap::default();
        let inner = heap.alloc(Object::Array(Array::basic(vec![Particle::Number(2.0)])));
        let outer = heap.alloc(Object::Array(Array::basic(vec![
            Particle::Number(1.0),
            Particle::Obj(inner),
            Particle::Obj(inner),
        ])));
        // Shared but acyclic elements print in full
        assert_eq!(heap.stringify(Particle::Obj(outer)), "[1, [2], [2]]");

        heap.array_mut(inner).unwrap().values.push(Particle::Obj(outer));
        heap.array_mut(outer).unwrap().values.push(Particle::Obj(outer));
        assert_eq!(
            heap.stringify(Particle::Obj(outer)),
            "[1, [2, [...]], [2, [...]], [...]]"
        );
    }

    #[test]
    fn test_dangling_handle_is_internal_disruption() {
        let heap = Heap::default();
        let err = heap.get(ObjRef(7)).unwrap_err();
        assert!(err.fatal);
        assert_eq!(err.message, "Dangling object handle #7.");
        assert_eq!(heap.str(ObjRef(7)), None);
        assert_eq!(heap.stringify(Particle::Obj(ObjRef(7))), "<freed>");
    }
}
