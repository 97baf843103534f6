//! Call dispatch: closures, natives, models and bound methods.

use crate::error::Disruption;
use crate::particle::{BoundMethod, Instance, ObjRef, Object, Particle};
use crate::stdlib::NativeContext;

use super::vm::{Atomizer, CallFrame};

impl Atomizer {
    /// Call a value with `arg_count` arguments above it on the stack.
    pub(crate) fn call_value(&mut self, callee: Particle, arg_count: usize) -> Result<(), Disruption> {
        let Particle::Obj(r) = callee else {
            return Err(not_callable());
        };

        match self.heap.get(r)? {
            Object::Closure(_) => self.call_closure(r, arg_count),
            Object::Native(_) => self.call_native(r, arg_count),
            Object::Model(_) => self.call_model(r, arg_count),
            Object::BoundMethod(bound) => {
                let BoundMethod { receiver, method } = *bound;
                let slot = self.stack.len() - arg_count - 1;
                self.set_slot(slot, receiver)?;
                self.call_closure(method, arg_count)
            }
            _ => Err(not_callable()),
        }
    }

    /// Push a frame for a closure whose arguments are already on the stack.
    pub(crate) fn call_closure(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), Disruption> {
        let reaction_ref = self.heap.closure(closure)?.reaction;
        let reaction = self.heap.reaction(reaction_ref)?;
        let arity = reaction.arity as usize;
        let required = reaction.required() as usize;

        if arg_count < required {
            return Err(Disruption::argument(format!(
                "Expected at least {} arguments for reaction call but got {}.",
                required, arg_count
            )));
        }
        if arg_count > arity {
            return Err(Disruption::argument(format!(
                "Expected at most {} arguments for reaction call but got {}.",
                arity, arg_count
            )));
        }
        if self.frames.len() >= self.config.frames_max {
            return Err(Disruption::overflow("Exceeded maximum number of call frames."));
        }

        // Missing trailing arguments become null so their defaults apply
        for _ in arg_count..arity {
            self.push(Particle::Null)?;
        }

        self.frames.push(CallFrame {
            closure,
            reaction: reaction_ref,
            ip: 0,
            base: self.stack.len() - arity - 1,
        });
        Ok(())
    }

    /// Run a host function; its result replaces the callee and arguments.
    fn call_native(&mut self, native: ObjRef, arg_count: usize) -> Result<(), Disruption> {
        let function = match self.heap.get(native)? {
            Object::Native(native) => native.function.clone(),
            other => {
                return Err(Disruption::internal(format!(
                    "Expected a native object but found a {}.",
                    other.kind_name()
                )))
            }
        };

        let start = self.stack.len() - arg_count;
        let mut ctx = NativeContext {
            heap: &mut self.heap,
            out: &mut *self.out,
            rng: &mut self.rng,
            started: self.started,
        };
        let result = function(&mut ctx, &self.stack[start..])?;

        self.stack.truncate(start - 1);
        self.push(result)
    }

    /// Instantiate a model, running `@construct` when it has one.
    fn call_model(&mut self, model: ObjRef, arg_count: usize) -> Result<(), Disruption> {
        let instance = self.heap.alloc(Object::Instance(Instance::new(model)));
        let slot = self.stack.len() - arg_count - 1;
        self.set_slot(slot, Particle::Obj(instance))?;

        let constructor = self
            .heap
            .model(model)?
            .methods
            .get(&self.sentinels.construct)
            .copied();
        match constructor {
            Some(Particle::Obj(init)) => self.call_closure(init, arg_count),
            _ if arg_count != 0 => Err(Disruption::argument(
                "Expected no arguments for a model without a constructor.",
            )),
            _ => Ok(()),
        }
    }

    // ============ Methods ============

    /// INVOKE: look up `name` on the receiver and call it in one step.
    pub(crate) fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), Disruption> {
        let receiver = self.peek(arg_count)?;
        let Particle::Obj(r) = receiver else {
            return Err(match receiver {
                Particle::Number(_) => {
                    Disruption::reference("Unknown primitive method for numeric particle.")
                }
                _ => Disruption::type_error("This variable type cannot invoke a method."),
            });
        };

        let instance = match self.heap.get(r)? {
            Object::Instance(instance) => instance,
            Object::String(_) => {
                return Err(Disruption::reference(
                    "Unknown primitive method for string particle.",
                ))
            }
            Object::Model(_) => {
                return Err(Disruption::unimplemented(
                    "Model static methods and fields have not yet been implemented.",
                ))
            }
            _ => return Err(Disruption::type_error("This variable type cannot invoke a method.")),
        };

        // Fields and defaults hold plain values, called in place of the receiver
        let model = instance.model;
        let value = match instance.fields.get(&name) {
            Some(value) => Some(*value),
            None => self.heap.model(model)?.defaults.get(&name).copied(),
        };
        if let Some(value) = value {
            let slot = self.stack.len() - arg_count - 1;
            self.set_slot(slot, value)?;
            return self.call_value(value, arg_count);
        }

        self.invoke_from_model(model, name, arg_count)
    }

    /// Call method `name` of `model` with the receiver already in the callee slot.
    pub(crate) fn invoke_from_model(
        &mut self,
        model: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), Disruption> {
        match self.heap.model(model)?.methods.get(&name).copied() {
            Some(Particle::Obj(method)) => self.call_closure(method, arg_count),
            _ => Err(Disruption::reference(format!(
                "Undefined model property \"{}\".",
                self.heap.name(name)
            ))),
        }
    }

    /// Replace the receiver on top of the stack with a bound method.
    pub(crate) fn bind_method(&mut self, model: ObjRef, name: ObjRef) -> Result<(), Disruption> {
        let method = match self.heap.model(model)?.methods.get(&name).copied() {
            Some(Particle::Obj(method)) => method,
            _ => {
                return Err(Disruption::reference(format!(
                    "Tried accessing undefined model property \"{}\".",
                    self.heap.name(name)
                )))
            }
        };

        let receiver = self.pop()?;
        let bound = self
            .heap
            .alloc(Object::BoundMethod(BoundMethod { receiver, method }));
        self.push(Particle::Obj(bound))
    }
}

fn not_callable() -> Disruption {
    Disruption::type_error("Cannot call given particle. Only reactions can be called.")
}
