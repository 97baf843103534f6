//! Native libraries available to every Nucleus program.
//!
//! Natives are looked up by dotted name (`std.print`, `math.sqrt`) through
//! GET_NATIVE, not through globals.

pub mod array;
pub mod disrupt;
pub mod math;
pub mod print;
pub mod random;
pub mod time;

use std::io::Write;
use std::time::Instant;

use rand::rngs::StdRng;

use crate::error::Disruption;
use crate::particle::{Heap, ObjRef, Object, Particle};
use crate::vm::Atomizer;

/// What a native can reach while it runs.
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    /// Where `std.print` writes.
    pub out: &'a mut dyn Write,
    pub rng: &'a mut StdRng,
    /// When the Atomizer was created.
    pub started: Instant,
}

/// Register every native library on `vm`.
pub fn register_all(vm: &mut Atomizer) {
    print::register_print_builtins(vm);
    disrupt::register_disrupt_builtins(vm);
    math::register_math_builtins(vm);
    time::register_time_builtins(vm);
    random::register_random_builtins(vm);
    array::register_array_builtins(vm);
}

// ============ Argument helpers ============

/// ARGUMENT disruption unless at least `count` arguments were passed.
pub(crate) fn expect_args(name: &str, args: &[Particle], count: usize) -> Result<(), Disruption> {
    if args.len() >= count {
        return Ok(());
    }
    let message = if count == 1 {
        format!("\"{}\" expected at least 1 argument.", name)
    } else {
        format!("\"{}\" expected {} arguments.", name, count)
    };
    Err(Disruption::argument(message))
}

pub(crate) fn wrong_type(name: &str, expected: &str) -> Disruption {
    Disruption::type_error(format!(
        "\"{}\" expected a \"{}\" argument type.",
        name, expected
    ))
}

/// The numeric argument at `index`.
pub(crate) fn number_arg(name: &str, args: &[Particle], index: usize) -> Result<f64, Disruption> {
    match args.get(index) {
        Some(Particle::Number(n)) => Ok(*n),
        _ => Err(wrong_type(name, "numeric")),
    }
}

/// The array handle at `index`.
pub(crate) fn array_arg(
    heap: &Heap,
    name: &str,
    args: &[Particle],
    index: usize,
) -> Result<ObjRef, Disruption> {
    match args.get(index) {
        Some(Particle::Obj(r)) if matches!(heap.get(*r), Ok(Object::Array(_))) => Ok(*r),
        _ => Err(wrong_type(name, "array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_helpers() {
        assert_eq!(
            expect_args("sqrt", &[], 1).unwrap_err().message,
            "\"sqrt\" expected at least 1 argument."
        );
        assert_eq!(
            expect_args("pow", &[Particle::Number(1.0)], 2)
                .unwrap_err()
                .message,
            "\"pow\" expected 2 arguments."
        );
        assert_eq!(
            number_arg("sqrt", &[Particle::Bool(true)], 0).unwrap_err().message,
            "\"sqrt\" expected a \"numeric\" argument type."
        );
        assert_eq!(number_arg("sqrt", &[Particle::Number(4.0)], 0), Ok(4.0));
    }
}
