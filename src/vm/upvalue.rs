//! Upvalue capture and closing, and closure construction.
//!
//! While the enclosing reaction is still running, an upvalue is open and
//! points at its stack slot. When that slot is about to disappear the value
//! is moved into the upvalue itself and it is closed for good.

use crate::error::Disruption;
use crate::particle::{Closure, ObjRef, Object, Particle, Upvalue};

use super::vm::Atomizer;

impl Atomizer {
    /// Stack slot of an open upvalue; `usize::MAX` once closed.
    fn open_slot(&self, upvalue: ObjRef) -> usize {
        match self.heap.upvalue(upvalue) {
            Ok(Upvalue::Open(slot)) => *slot,
            _ => usize::MAX,
        }
    }

    /// Find or create the open upvalue for a stack slot.
    ///
    /// Two closures capturing the same variable share one upvalue.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        for &upvalue in self.open_upvalues.iter().rev() {
            let open = self.open_slot(upvalue);
            if open == slot {
                return upvalue;
            }
            if open < slot {
                break;
            }
        }

        let created = self.heap.alloc(Object::Upvalue(Upvalue::Open(slot)));
        let position = self
            .open_upvalues
            .partition_point(|&upvalue| self.open_slot(upvalue) < slot);
        self.open_upvalues.insert(position, created);
        created
    }

    /// Close every open upvalue at or above `last`.
    pub(crate) fn close_upvalues(&mut self, last: usize) -> Result<(), Disruption> {
        while let Some(&upvalue) = self.open_upvalues.last() {
            let slot = self.open_slot(upvalue);
            if slot < last {
                break;
            }
            let value = self.slot(slot)?;
            *self.heap.upvalue_mut(upvalue)? = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
        Ok(())
    }

    /// The upvalue handle at `index` in the running closure.
    fn upvalue_at(&self, index: usize) -> Result<ObjRef, Disruption> {
        let closure = self.frame()?.closure;
        self.heap
            .closure(closure)?
            .upvalues
            .get(index)
            .copied()
            .ok_or_else(|| Disruption::internal("Upvalue index out of range."))
    }

    pub(crate) fn read_upvalue(&self, index: usize) -> Result<Particle, Disruption> {
        match *self.heap.upvalue(self.upvalue_at(index)?)? {
            Upvalue::Open(slot) => self.slot(slot),
            Upvalue::Closed(value) => Ok(value),
        }
    }

    pub(crate) fn write_upvalue(&mut self, index: usize, value: Particle) -> Result<(), Disruption> {
        let upvalue = self.upvalue_at(index)?;
        match *self.heap.upvalue(upvalue)? {
            Upvalue::Open(slot) => self.set_slot(slot, value),
            Upvalue::Closed(_) => {
                *self.heap.upvalue_mut(upvalue)? = Upvalue::Closed(value);
                Ok(())
            }
        }
    }

    /// CLOSURE: wrap a reaction constant, capturing the upvalues it lists.
    pub(crate) fn make_closure(&mut self) -> Result<(), Disruption> {
        let reaction = match self.read_constant()? {
            Particle::Obj(r) => r,
            _ => return Err(Disruption::internal("CLOSURE operand is not a reaction.")),
        };
        let count = self.heap.reaction(reaction)?.upvalue_count as usize;
        let frame = *self.frame()?;

        let mut upvalues = Vec::with_capacity(count);
        for _ in 0..count {
            let is_local = self.read_byte()? == 1;
            let index = self.read_u16()? as usize;
            if is_local {
                upvalues.push(self.capture_upvalue(frame.base + index));
            } else {
                upvalues.push(self.upvalue_at(index)?);
            }
        }

        let closure = self
            .heap
            .alloc(Object::Closure(Closure { reaction, upvalues }));
        self.push(Particle::Obj(closure))
    }
}
