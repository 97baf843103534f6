//! Math natives and constants under the `math.` prefix.

use std::f64::consts;

use crate::error::Disruption;
use crate::particle::Particle;
use crate::vm::Atomizer;

use super::{expect_args, number_arg};

/// Single-argument functions: `math.<name>(x)`.
const UNARY: &[(&str, fn(f64) -> f64)] = &[
    ("abs", f64::abs),
    ("acos", f64::acos),
    ("acosh", f64::acosh),
    ("asin", f64::asin),
    ("asinh", f64::asinh),
    ("atan", f64::atan),
    ("atanh", f64::atanh),
    ("cbrt", f64::cbrt),
    ("ceil", f64::ceil),
    ("clz32", clz32),
    ("cos", f64::cos),
    ("cosh", f64::cosh),
    ("exp", f64::exp),
    ("expm1", f64::exp_m1),
    ("floor", f64::floor),
    ("log", f64::ln),
    ("log1p", f64::ln_1p),
    ("log10", f64::log10),
    ("log2", f64::log2),
    ("round", f64::round),
    ("signum", signum),
    ("sin", f64::sin),
    ("sinh", f64::sinh),
    ("sqrt", f64::sqrt),
    ("tan", f64::tan),
    ("tanh", f64::tanh),
    ("trunc", f64::trunc),
];

/// Two-argument functions: `math.<name>(a, b)`.
const BINARY: &[(&str, fn(f64, f64) -> f64)] = &[
    ("atan2", f64::atan2),
    ("pow", f64::powf),
    ("imul", imul),
];

/// Register the `math` library.
pub fn register_math_builtins(vm: &mut Atomizer) {
    for &(name, function) in UNARY {
        vm.register_native(&format!("math.{}", name), move |_, args| {
            expect_args(name, args, 1)?;
            Ok(Particle::Number(function(number_arg(name, args, 0)?)))
        });
    }

    for &(name, function) in BINARY {
        vm.register_native(&format!("math.{}", name), move |_, args| {
            expect_args(name, args, 2)?;
            let a = number_arg(name, args, 0)?;
            let b = number_arg(name, args, 1)?;
            Ok(Particle::Number(function(a, b)))
        });
    }

    // math.hypot(...values) - Square root of the sum of squares
    vm.register_native("math.hypot", |_, args| {
        let values = numbers("hypot", args)?;
        Ok(Particle::Number(
            values.iter().map(|v| v * v).sum::<f64>().sqrt(),
        ))
    });

    // math.min(...values) - Smallest value, inf when empty
    vm.register_native("math.min", |_, args| {
        let values = numbers("min", args)?;
        Ok(Particle::Number(values.into_iter().fold(f64::INFINITY, f64::min)))
    });

    // math.max(...values) - Largest value, -inf when empty
    vm.register_native("math.max", |_, args| {
        let values = numbers("max", args)?;
        Ok(Particle::Number(
            values.into_iter().fold(f64::NEG_INFINITY, f64::max),
        ))
    });

    vm.register_native_property("math.pi", Particle::Number(consts::PI));
    vm.register_native_property("math.e", Particle::Number(consts::E));
    vm.register_native_property("math.tau", Particle::Number(consts::TAU));
    vm.register_native_property("math.inf", Particle::Number(f64::INFINITY));
    vm.register_native_property("math.nan", Particle::Number(f64::NAN));
}

/// Every argument as a number.
fn numbers(name: &str, args: &[Particle]) -> Result<Vec<f64>, Disruption> {
    (0..args.len()).map(|i| number_arg(name, args, i)).collect()
}

/// Leading zero bits of the value as a 32-bit unsigned integer.
fn clz32(n: f64) -> f64 {
    if n < 0.0 {
        return 0.0;
    }
    (n as u32).leading_zeros() as f64
}

/// -1, 0 or 1.
fn signum(n: f64) -> f64 {
    if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// 32-bit integer multiplication.
fn imul(a: f64, b: f64) -> f64 {
    (a as i64 as i32).wrapping_mul(b as i64 as i32) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_helpers() {
        assert_eq!(clz32(1.0), 31.0);
        assert_eq!(clz32(0.0), 32.0);
        assert_eq!(clz32(-5.0), 0.0);
        assert_eq!(signum(-3.5), -1.0);
        assert_eq!(signum(0.0), 0.0);
        assert_eq!(imul(3.0, 4.5), 12.0);
    }
}
