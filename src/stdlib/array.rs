//! Array natives under `std.array`.

use crate::error::Disruption;
use crate::particle::Particle;
use crate::vm::Atomizer;

use super::{array_arg, expect_args};

/// Register the `std.array` library.
pub fn register_array_builtins(vm: &mut Atomizer) {
    // std.array.push(array, value) - Append a value, returning the new length
    vm.register_native("std.array.push", |ctx, args| {
        expect_args("push", args, 2)?;
        let array = array_arg(ctx.heap, "push", args, 0)?;
        let values = &mut ctx.heap.array_mut(array)?.values;
        values.push(args[1]);
        let len = values.len();
        ctx.heap.recount(array);
        Ok(Particle::Number(len as f64))
    });

    // std.array.pop(array) - Remove and return the last value
    vm.register_native("std.array.pop", |ctx, args| {
        expect_args("pop", args, 1)?;
        let array = array_arg(ctx.heap, "pop", args, 0)?;
        ctx.heap
            .array_mut(array)?
            .values
            .pop()
            .ok_or_else(|| Disruption::range("Cannot pop an array that is empty."))
    });

    // std.array.len(array) - Number of values
    vm.register_native("std.array.len", |ctx, args| {
        expect_args("len", args, 1)?;
        let array = array_arg(ctx.heap, "len", args, 0)?;
        Ok(Particle::Number(ctx.heap.array(array)?.values.len() as f64))
    });
}
