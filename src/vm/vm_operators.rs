//! Arithmetic, bitwise, comparison and truthiness.

use std::cmp::Ordering;

use crate::bytecode::OpCode;
use crate::error::Disruption;
use crate::particle::{format_number, Object, Particle};

use super::vm::Atomizer;

/// Longest string a repetition may build, in bytes.
const MAX_REPEAT_LEN: usize = 1 << 30;

impl Atomizer {
    /// Pop two numeric operands, reporting `symbol` when either is not a number.
    fn numeric_operands(&mut self, symbol: &str) -> Result<(f64, f64), Disruption> {
        match (self.peek(1)?, self.peek(0)?) {
            (Particle::Number(a), Particle::Number(b)) => {
                self.pop()?;
                self.pop()?;
                Ok((a, b))
            }
            _ => Err(Disruption::wrong_operands(symbol)),
        }
    }

    /// ADD: numeric addition or string concatenation.
    pub(crate) fn op_add(&mut self) -> Result<(), Disruption> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;

        let text = match (a, b) {
            (Particle::Number(x), Particle::Number(y)) => {
                self.pop()?;
                self.pop()?;
                return self.push(Particle::Number(x + y));
            }
            (Particle::Obj(_), Particle::Obj(_)) => {
                match (self.heap.string_of(a), self.heap.string_of(b)) {
                    (Some(x), Some(y)) => {
                        let mut text = String::with_capacity(x.len() + y.len());
                        text.push_str(x);
                        text.push_str(y);
                        text
                    }
                    _ => return Err(not_concatenable()),
                }
            }
            (Particle::Obj(_), Particle::Number(y)) => match self.heap.string_of(a) {
                Some(x) => format!("{}{}", x, format_number(y)),
                None => return Err(not_concatenable()),
            },
            (Particle::Number(x), Particle::Obj(_)) => match self.heap.string_of(b) {
                Some(y) => format!("{}{}", format_number(x), y),
                None => return Err(not_concatenable()),
            },
            _ => return Err(not_concatenable()),
        };

        let result = self.heap.intern(&text);
        self.pop()?;
        self.pop()?;
        self.push(Particle::Obj(result))
    }

    /// MULTIPLY: numeric product or string repetition.
    pub(crate) fn op_multiply(&mut self) -> Result<(), Disruption> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;

        let (string, count) = match (a, b) {
            (Particle::Number(x), Particle::Number(y)) => {
                self.pop()?;
                self.pop()?;
                return self.push(Particle::Number(x * y));
            }
            (Particle::Obj(r), Particle::Number(n)) | (Particle::Number(n), Particle::Obj(r))
                if self.heap.str(r).is_some() =>
            {
                (r, n)
            }
            _ => return Err(Disruption::wrong_operands("*")),
        };

        let result = if count <= 0.0 {
            self.heap.intern("")
        } else if count == 1.0 {
            string
        } else {
            let piece = self.heap.name(string);
            let times = count as usize;
            match piece.len().checked_mul(times) {
                Some(total) if total <= MAX_REPEAT_LEN => {
                    let text = piece.repeat(times);
                    self.heap.intern(&text)
                }
                _ => {
                    return Err(Disruption::memory(
                        "String repetition exceeds the maximum string length.",
                    ))
                }
            }
        };
        self.pop()?;
        self.pop()?;
        self.push(Particle::Obj(result))
    }

    /// SUBTRACT, DIVIDE, MODULO and POWER.
    pub(crate) fn op_arithmetic(&mut self, op: OpCode) -> Result<(), Disruption> {
        let symbol = match op {
            OpCode::Subtract => "-",
            OpCode::Divide => "/",
            OpCode::Modulo => "%",
            _ => "**",
        };
        let (a, b) = self.numeric_operands(symbol)?;
        let result = match op {
            OpCode::Subtract => a - b,
            OpCode::Divide => a / b,
            OpCode::Modulo => a % b,
            _ => a.powf(b),
        };
        self.push(Particle::Number(result))
    }

    /// Bitwise operators over 32-bit signed integers.
    pub(crate) fn op_bitwise(&mut self, op: OpCode) -> Result<(), Disruption> {
        let symbol = match op {
            OpCode::BitAnd => "&",
            OpCode::BitOr => "|",
            OpCode::BitXor => "^",
            OpCode::ShiftLeft => "<<",
            _ => ">>",
        };
        let (a, b) = self.numeric_operands(symbol)?;
        let (a, b) = (to_i32(a), to_i32(b));
        let result = match op {
            OpCode::BitAnd => a & b,
            OpCode::BitOr => a | b,
            OpCode::BitXor => a ^ b,
            OpCode::ShiftLeft => a.wrapping_shl((b & 31) as u32),
            _ => a.wrapping_shr((b & 31) as u32),
        };
        self.push(Particle::Number(result as f64))
    }

    pub(crate) fn op_negate(&mut self) -> Result<(), Disruption> {
        match self.peek(0)? {
            Particle::Number(n) => {
                self.pop()?;
                self.push(Particle::Number(-n))
            }
            _ => Err(Disruption::type_error(
                "The \"-\" unary operator expects a numeric operand.",
            )),
        }
    }

    pub(crate) fn op_bit_not(&mut self) -> Result<(), Disruption> {
        match self.peek(0)? {
            Particle::Number(n) => {
                self.pop()?;
                self.push(Particle::Number(!to_i32(n) as f64))
            }
            _ => Err(Disruption::type_error(
                "The \"~\" unary operator expects a numeric operand.",
            )),
        }
    }

    /// GREATER / LESS over number pairs or string pairs.
    pub(crate) fn op_compare(&mut self, op: OpCode) -> Result<(), Disruption> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;

        let ordering = match (a, b) {
            (Particle::Number(x), Particle::Number(y)) => x.partial_cmp(&y),
            _ => match (self.heap.string_of(a), self.heap.string_of(b)) {
                (Some(x), Some(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
                _ => {
                    return Err(Disruption::type_error(
                        "Cannot compare operands with pointer comparisons if both are not of type string or numeric.",
                    ))
                }
            },
        };

        let result = match op {
            OpCode::Greater => ordering == Some(Ordering::Greater),
            _ => ordering == Some(Ordering::Less),
        };
        self.pop()?;
        self.pop()?;
        self.push(Particle::Bool(result))
    }

    /// Falsey: `0`, `null`, `false`, `""`, `[]`, and a field-less instance of
    /// any model other than the base `Model`.
    pub(crate) fn is_falsey(&self, value: Particle) -> bool {
        match value {
            Particle::Null => true,
            Particle::Bool(b) => !b,
            Particle::Number(n) => n == 0.0,
            Particle::Obj(r) => match self.heap.get(r) {
                Ok(Object::String(s)) => s.is_empty(),
                Ok(Object::Array(array)) => array.values.is_empty(),
                Ok(Object::Instance(instance)) => {
                    instance.fields.is_empty() && instance.model != self.base_model
                }
                _ => false,
            },
        }
    }
}

/// Truncate a numeric to a 32-bit signed integer.
fn to_i32(n: f64) -> i32 {
    (n as i64) as i32
}

fn not_concatenable() -> Disruption {
    Disruption::type_error("Only strings and numerics can be concatenated.")
}
