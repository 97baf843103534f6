//! Output natives.

use std::io::Write;

use crate::error::{Disruption, ExitCode};
use crate::particle::Particle;
use crate::vm::Atomizer;

/// Register `std.print`.
pub fn register_print_builtins(vm: &mut Atomizer) {
    // std.print(...values) - Print the values back to back, then a newline
    vm.register_native("std.print", |ctx, args| {
        let mut line = String::new();
        for arg in args {
            line.push_str(&ctx.heap.stringify(*arg));
        }
        writeln!(ctx.out, "{}", line).map_err(|err| {
            Disruption::new(ExitCode::Io, format!("Could not write output: {}.", err))
        })?;
        Ok(Particle::Null)
    });
}
