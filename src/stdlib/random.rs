//! Pseudo-random numbers from the Atomizer's `StdRng`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::particle::Particle;
use crate::vm::Atomizer;

use super::{expect_args, number_arg};

/// Register the `std.random` library.
pub fn register_random_builtins(vm: &mut Atomizer) {
    // std.random.seed(n) - Reseed the generator
    vm.register_native("std.random.seed", |ctx, args| {
        expect_args("seed", args, 1)?;
        let seed = number_arg("seed", args, 0)?;
        *ctx.rng = StdRng::seed_from_u64(seed as i64 as u64);
        Ok(Particle::Null)
    });

    // std.random.float([max[, min]]) - Uniform float in [min, max), default [0, 1)
    vm.register_native("std.random.float", |ctx, args| {
        let scale: f64 = ctx.rng.gen();
        let value = match args.len() {
            0 => scale,
            1 => scale * number_arg("float", args, 0)?,
            _ => {
                let max = number_arg("float", args, 0)?;
                let min = number_arg("float", args, 1)?;
                min + scale * (max - min)
            }
        };
        Ok(Particle::Number(value))
    });

    // std.random.int() - Non-negative 31-bit integer
    vm.register_native("std.random.int", |ctx, _| {
        Ok(Particle::Number(ctx.rng.gen_range(0..=i32::MAX) as f64))
    });
}
