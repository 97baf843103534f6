//! Mark-sweep garbage collection.
//!
//! The mark bit plus membership of the gray worklist encode the tri-color
//! invariant: white objects are unmarked, gray ones are marked and queued,
//! black ones are marked and already traced.

use colored::Colorize;

use crate::particle::heap::Heap;
use crate::particle::object::{ObjRef, Object, Table, Upvalue};
use crate::particle::Particle;

/// Anything that holds handles the collector must treat as live.
pub trait GcRoots {
    fn mark_roots(&self, heap: &mut Heap);
}

impl GcRoots for Vec<ObjRef> {
    fn mark_roots(&self, heap: &mut Heap) {
        for &r in self {
            heap.mark_object(r);
        }
    }
}

impl GcRoots for Vec<Particle> {
    fn mark_roots(&self, heap: &mut Heap) {
        for &p in self {
            heap.mark_particle(p);
        }
    }
}

impl GcRoots for Table {
    fn mark_roots(&self, heap: &mut Heap) {
        heap.mark_table(self);
    }
}

/// A fixed group of root sets, passed around as one.
impl<const N: usize> GcRoots for [&dyn GcRoots; N] {
    fn mark_roots(&self, heap: &mut Heap) {
        for roots in self {
            roots.mark_roots(heap);
        }
    }
}

impl Heap {
    /// Gray an object: mark it and queue it for tracing.
    pub fn mark_object(&mut self, r: ObjRef) {
        if let Some(Some(entry)) = self.slots.get_mut(r.index()) {
            if entry.marked {
                return;
            }
            entry.marked = true;
            self.gray.push(r);
        }
    }

    pub fn mark_particle(&mut self, p: Particle) {
        if let Particle::Obj(r) = p {
            self.mark_object(r);
        }
    }

    pub fn mark_table(&mut self, table: &Table) {
        for (&key, &value) in table {
            self.mark_object(key);
            self.mark_particle(value);
        }
    }

    /// Run a full collection. Returns the number of bytes freed.
    pub fn collect(&mut self, roots: &[&dyn GcRoots]) -> usize {
        let before = self.bytes_allocated;

        for root in roots {
            root.mark_roots(self);
        }
        self.trace_references();
        self.remove_white_strings();
        self.sweep();

        self.next_gc = (self.bytes_allocated * self.config.growth_factor)
            .max(self.config.initial_threshold);
        self.allocated_since_gc = false;
        self.collections += 1;

        let freed = before - self.bytes_allocated;
        if self.config.log {
            eprintln!(
                "{} collected {} bytes (from {} to {}), next at {}",
                "[GC]".red().dimmed(),
                freed.to_string().yellow(),
                before,
                self.bytes_allocated,
                self.next_gc
            );
        }
        freed
    }

    fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(r) = self.gray.pop() {
            self.children_of(r, &mut children);
            for child in children.drain(..) {
                self.mark_object(child);
            }
        }
    }

    /// Collect every handle `r` refers to.
    fn children_of(&self, r: ObjRef, out: &mut Vec<ObjRef>) {
        let particle = |p: &Particle, out: &mut Vec<ObjRef>| {
            if let Particle::Obj(inner) = p {
                out.push(*inner);
            }
        };
        let table = |t: &Table, out: &mut Vec<ObjRef>| {
            for (key, value) in t {
                out.push(*key);
                particle(value, out);
            }
        };

        let Some(Some(entry)) = self.slots.get(r.index()) else {
            return;
        };
        match &entry.object {
            Object::String(_) => {}
            Object::Reaction(reaction) => {
                out.extend(reaction.name);
                for constant in &reaction.chunk.constants {
                    particle(constant, out);
                }
            }
            Object::Closure(closure) => {
                out.push(closure.reaction);
                out.extend_from_slice(&closure.upvalues);
            }
            Object::Upvalue(Upvalue::Closed(value)) => particle(value, out),
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Model(model) => {
                out.push(model.name);
                table(&model.methods, out);
                table(&model.defaults, out);
            }
            Object::Instance(instance) => {
                out.push(instance.model);
                table(&instance.fields, out);
            }
            Object::BoundMethod(bound) => {
                particle(&bound.receiver, out);
                out.push(bound.method);
            }
            Object::Native(native) => out.push(native.name),
            Object::Array(array) => {
                for value in &array.values {
                    particle(value, out);
                }
            }
        }
    }

    /// The intern table holds strings weakly.
    fn remove_white_strings(&mut self) {
        let slots = &self.slots;
        self.interned.retain(|_, bucket| {
            bucket.retain(|r| matches!(slots.get(r.index()), Some(Some(entry)) if entry.marked));
            !bucket.is_empty()
        });
    }

    fn sweep(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot else {
                continue;
            };
            if entry.marked {
                entry.marked = false;
                continue;
            }
            self.bytes_allocated -= entry.size;
            *slot = None;
            self.free.push(index as u32);
        }
        // Reuse low slots first
        self.free.sort_unstable_by(|a, b| b.cmp(a));
    }
}
