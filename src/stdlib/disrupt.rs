//! Raising disruptions from Nucleus code.

use crate::error::{Disruption, ExitCode};
use crate::particle::{Heap, Object, Particle};
use crate::vm::Atomizer;

use super::{expect_args, number_arg, wrong_type};

/// Register `std.disrupt`.
pub fn register_disrupt_builtins(vm: &mut Atomizer) {
    // std.disrupt(message[, code]) - Raise a catchable disruption
    // std.disrupt(e) - Re-raise a caught Disruption instance
    vm.register_native("std.disrupt", |ctx, args| {
        expect_args("disrupt", args, 1)?;
        if let Some(disruption) = rethrown(ctx.heap, args[0]) {
            return Err(disruption);
        }

        let message = ctx
            .heap
            .string_of(args[0])
            .ok_or_else(|| wrong_type("disrupt", "string"))?
            .to_string();
        let code = match args.len() {
            1 => ExitCode::Failure,
            _ => exit_code(number_arg("disrupt", args, 1)?),
        };
        Err(Disruption::new(code, message))
    });
}

/// The disruption described by an instance's `message` and `code` fields.
fn rethrown(heap: &Heap, value: Particle) -> Option<Disruption> {
    let Particle::Obj(r) = value else {
        return None;
    };
    let Ok(Object::Instance(instance)) = heap.get(r) else {
        return None;
    };

    let field = |name: &str| {
        let key = heap.lookup_interned(name)?;
        instance.fields.get(&key).copied()
    };
    let message = field("message").and_then(|m| heap.string_of(m))?;
    let code = field("code")
        .and_then(Particle::as_number)
        .map_or(ExitCode::Failure, exit_code);
    Some(Disruption::new(code, message))
}

/// Map a user-supplied numeric onto the exit code taxonomy.
fn exit_code(n: f64) -> ExitCode {
    if n.fract() != 0.0 || !(0.0..=255.0).contains(&n) {
        return ExitCode::Failure;
    }
    ExitCode::from_u8(n as u8).unwrap_or(ExitCode::Failure)
}
