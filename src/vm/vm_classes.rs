//! Model construction, property access and array/instance members.

use crate::error::Disruption;
use crate::particle::{Array, ObjRef, Object, Particle};

use super::vm::Atomizer;

impl Atomizer {
    // ============ Model definition ============

    /// INHERIT: flatten the parent's methods and defaults into the child.
    pub(crate) fn inherit(&mut self) -> Result<(), Disruption> {
        let parent = match self.peek(1)? {
            Particle::Obj(r) if matches!(self.heap.get(r), Ok(Object::Model(_))) => r,
            _ => {
                return Err(Disruption::type_error(
                    "Parent is not a model and so cannot be derived from.",
                ))
            }
        };
        let child = self.pop_model()?;

        let (methods, defaults) = {
            let parent = self.heap.model(parent)?;
            (parent.methods.clone(), parent.defaults.clone())
        };
        let model = self.heap.model_mut(child)?;
        model.methods.extend(methods);
        model.defaults.extend(defaults);
        self.heap.recount(child);
        Ok(())
    }

    /// METHOD: bind the closure on top into the model beneath it.
    pub(crate) fn define_method(&mut self, name: ObjRef) -> Result<(), Disruption> {
        let method = self.peek(0)?;
        let model = self.model_at(1)?;
        self.heap.model_mut(model)?.methods.insert(name, method);
        self.heap.recount(model);
        self.pop()?;
        Ok(())
    }

    /// FIELD: record the value on top as a default of the model beneath it.
    pub(crate) fn define_field(&mut self, name: ObjRef) -> Result<(), Disruption> {
        let value = self.peek(0)?;
        let model = self.model_at(1)?;
        self.heap.model_mut(model)?.defaults.insert(name, value);
        self.heap.recount(model);
        self.pop()?;
        Ok(())
    }

    fn model_at(&self, distance: usize) -> Result<ObjRef, Disruption> {
        match self.peek(distance)? {
            Particle::Obj(r) if matches!(self.heap.get(r), Ok(Object::Model(_))) => Ok(r),
            _ => Err(Disruption::internal("Expected a model on the stack.")),
        }
    }

    pub(crate) fn pop_model(&mut self) -> Result<ObjRef, Disruption> {
        let model = self.model_at(0)?;
        self.pop()?;
        Ok(model)
    }

    // ============ Properties ============

    /// GET_PROPERTY: defaults, then fields, then a bound method.
    pub(crate) fn get_property(&mut self, name: ObjRef) -> Result<(), Disruption> {
        let instance = match self.peek(0)? {
            Particle::Obj(r) => match self.heap.get(r)? {
                Object::Instance(instance) => instance,
                _ => return Err(not_an_instance()),
            },
            _ => return Err(not_an_instance()),
        };

        let model = instance.model;
        let value = match self.heap.model(model)?.defaults.get(&name) {
            Some(value) => Some(*value),
            None => instance.fields.get(&name).copied(),
        };
        match value {
            Some(value) => {
                self.pop()?;
                self.push(value)
            }
            None => self.bind_method(model, name),
        }
    }

    /// SET_PROPERTY / SET_BASE_PROPERTY.
    ///
    /// A name the model has a default for updates that default; anything else
    /// becomes an instance field. The base form leaves the instance on the stack.
    pub(crate) fn set_property(&mut self, name: ObjRef, keep_instance: bool) -> Result<(), Disruption> {
        let value = self.peek(0)?;
        let instance = match self.peek(1)? {
            Particle::Obj(r) if matches!(self.heap.get(r), Ok(Object::Instance(_))) => r,
            _ => return Err(Disruption::type_error("Only model instances can have fields.")),
        };

        self.assign_member(instance, name, value)?;

        let value = self.pop()?;
        if !keep_instance {
            self.pop()?;
            self.push(value)?;
        }
        Ok(())
    }

    /// Write `name` on an instance, preferring an existing model default.
    fn assign_member(&mut self, instance: ObjRef, name: ObjRef, value: Particle) -> Result<(), Disruption> {
        let model = self.heap.instance(instance)?.model;
        if let Some(default) = self.heap.model_mut(model)?.defaults.get_mut(&name) {
            *default = value;
            return Ok(());
        }
        self.heap.instance_mut(instance)?.fields.insert(name, value);
        self.heap.recount(instance);
        Ok(())
    }

    // ============ Arrays and members ============

    /// ARRAY: collect the top `count` values into a new array.
    pub(crate) fn build_array(&mut self, count: usize) -> Result<(), Disruption> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| Disruption::internal("Operand stack underflow."))?;
        let values = self.stack.split_off(start);
        let array = self.heap.alloc(Object::Array(Array::basic(values)));
        self.push(Particle::Obj(array))
    }

    /// GET_MEMBER: `container[key]`.
    pub(crate) fn get_member(&mut self) -> Result<(), Disruption> {
        let key = self.pop()?;
        let container = self.pop()?;

        let value = match container {
            Particle::Obj(r) => match self.heap.get(r)? {
                Object::Array(array) => {
                    let index = array_index(key, array.values.len())?;
                    array.values[index]
                }
                Object::Instance(instance) => {
                    let name = self.member_name(key)?;
                    let defaults = &self.heap.model(instance.model)?.defaults;
                    match defaults.get(&name).or_else(|| instance.fields.get(&name)) {
                        Some(value) => *value,
                        None => {
                            return Err(Disruption::reference(
                                "Could not access undefined model member.",
                            ))
                        }
                    }
                }
                _ => return Err(no_members()),
            },
            _ => return Err(no_members()),
        };
        self.push(value)
    }

    /// SET_MEMBER: `container[key] = value`, leaving the value.
    pub(crate) fn set_member(&mut self) -> Result<(), Disruption> {
        let value = self.pop()?;
        let key = self.pop()?;
        let container = self.pop()?;

        let Particle::Obj(r) = container else {
            return Err(no_members());
        };
        match self.heap.get(r)? {
            Object::Array(array) => {
                let index = array_index(key, array.values.len())?;
                self.heap.array_mut(r)?.values[index] = value;
            }
            Object::Instance(_) => {
                let name = self.member_name(key)?;
                self.assign_member(r, name, value)?;
            }
            _ => return Err(no_members()),
        }
        self.push(value)
    }

    fn member_name(&self, key: Particle) -> Result<ObjRef, Disruption> {
        match key {
            Particle::Obj(r) if self.heap.str(r).is_some() => Ok(r),
            _ => Err(Disruption::reference(
                "Only strings can be used to access model members.",
            )),
        }
    }
}

/// Validate an array accessor and re-derive the index from it.
fn array_index(key: Particle, len: usize) -> Result<usize, Disruption> {
    let Particle::Number(n) = key else {
        return Err(Disruption::type_error(
            "Only numerics can be used to access array members.",
        ));
    };
    if n.fract() != 0.0 {
        return Err(Disruption::range(
            "A floating point numeric was used to access an array member.",
        ));
    }
    if n < 0.0 || n >= len as f64 {
        return Err(Disruption::range("Array accessor out of feasible range."));
    }
    Ok(n as usize)
}

fn not_an_instance() -> Disruption {
    Disruption::reference("Only model instances can have properties.")
}

fn no_members() -> Disruption {
    Disruption::type_error("Only arrays and model instances have members.")
}
