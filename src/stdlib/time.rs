//! Time natives, in microseconds.

use chrono::Utc;

use crate::particle::Particle;
use crate::vm::Atomizer;

/// Register the `std.time` library.
pub fn register_time_builtins(vm: &mut Atomizer) {
    // std.time.now() - Microseconds since the Unix epoch
    vm.register_native("std.time.now", |_, _| {
        Ok(Particle::Number(Utc::now().timestamp_micros() as f64))
    });

    // std.time.clock() - Microseconds since the Atomizer started
    vm.register_native("std.time.clock", |ctx, _| {
        Ok(Particle::Number(ctx.started.elapsed().as_micros() as f64))
    });
}
