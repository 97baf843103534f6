//! Bytecode disassembler for debugging.

use std::fmt::Write;

use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::OpCode;
use crate::particle::{Heap, ObjRef, Object, Particle};

/// Disassemble a reaction, then every reaction nested in its constants.
pub fn disassemble_reaction(heap: &Heap, reaction: ObjRef) -> String {
    let mut output = String::new();
    let Ok(function) = heap.reaction(reaction) else {
        return output;
    };

    let name = match function.name {
        Some(name) => heap.name(name).to_string(),
        None => "<script>".to_string(),
    };
    let _ = writeln!(output, "== {} ==", name);
    disassemble_chunk(heap, &function.chunk, &mut output);

    for constant in &function.chunk.constants {
        if let Particle::Obj(nested) = constant {
            if matches!(heap.get(*nested), Ok(Object::Reaction(_))) {
                output.push('\n');
                output.push_str(&disassemble_reaction(heap, *nested));
            }
        }
    }

    output
}

/// Disassemble a chunk into human-readable output.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, output: &mut String) {
    let mut offset = 0;

    while offset < chunk.code.len() {
        offset = disassemble_instruction(heap, chunk, offset, output);
    }
}

/// Disassemble a single instruction, returning the offset of the next one.
pub fn disassemble_instruction(
    heap: &Heap,
    chunk: &Chunk,
    offset: usize,
    output: &mut String,
) -> usize {
    let _ = write!(output, "{:04} ", offset);

    // Line number, or | if same as previous
    let line = chunk.get_line(offset);
    if offset > 0 && line == chunk.get_line(offset - 1) {
        output.push_str("   | ");
    } else {
        let _ = write!(output, "{:4} ", line);
    }

    let byte = chunk.code[offset];
    let Some(opcode) = OpCode::from_u8(byte) else {
        let _ = writeln!(output, "Unknown opcode {}", byte);
        return offset + 1;
    };
    let name = opcode.name();

    match opcode {
        OpCode::Call => {
            let arg_count = operand_u8(chunk, offset + 1);
            let _ = writeln!(output, "{:<18} {}", name, arg_count);
            offset + 2
        }

        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::Model
        | OpCode::Method
        | OpCode::Field
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::SetBaseProperty
        | OpCode::GetSuper
        | OpCode::GetNative => {
            let index = operand_u16(chunk, offset + 1);
            let _ = writeln!(
                output,
                "{:<18} {:4} '{}'",
                name,
                index,
                constant_str(heap, chunk, index)
            );
            offset + 3
        }

        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Array => {
            let slot = operand_u16(chunk, offset + 1);
            let _ = writeln!(output, "{:<18} {:4}", name, slot);
            offset + 3
        }

        OpCode::Jump | OpCode::JumpIfFalse | OpCode::CatchMode => {
            let jump = operand_u16(chunk, offset + 1) as usize;
            let _ = writeln!(output, "{:<18} {:4} -> {}", name, offset, offset + 3 + jump);
            offset + 3
        }

        OpCode::Loop => {
            let jump = operand_u16(chunk, offset + 1) as usize;
            let target = (offset + 3).saturating_sub(jump);
            let _ = writeln!(output, "{:<18} {:4} -> {}", name, offset, target);
            offset + 3
        }

        OpCode::Invoke | OpCode::SuperInvoke => {
            let index = operand_u16(chunk, offset + 1);
            let arg_count = operand_u8(chunk, offset + 3);
            let _ = writeln!(
                output,
                "{:<18} ({} args) {:4} '{}'",
                name,
                arg_count,
                index,
                constant_str(heap, chunk, index)
            );
            offset + 4
        }

        // Closure (variable operands for upvalues)
        OpCode::Closure => {
            let index = operand_u16(chunk, offset + 1);
            let _ = writeln!(
                output,
                "{:<18} {:4} {}",
                name,
                index,
                constant_str(heap, chunk, index)
            );

            let upvalue_count = match chunk.constants.get(index as usize) {
                Some(Particle::Obj(r)) => heap.reaction(*r).map(|f| f.upvalue_count).unwrap_or(0),
                _ => 0,
            };
            let mut next = offset + 3;
            for _ in 0..upvalue_count {
                let is_local = operand_u8(chunk, next) != 0;
                let slot = operand_u16(chunk, next + 1);
                let _ = writeln!(
                    output,
                    "{:04}    |                     {} {}",
                    next,
                    if is_local { "local" } else { "upvalue" },
                    slot
                );
                next += 3;
            }
            next
        }

        _ => {
            let _ = writeln!(output, "{}", name);
            offset + 1
        }
    }
}

fn operand_u8(chunk: &Chunk, offset: usize) -> u8 {
    chunk.code.get(offset).copied().unwrap_or(0)
}

fn operand_u16(chunk: &Chunk, offset: usize) -> u16 {
    if offset + 1 < chunk.code.len() {
        chunk.read_u16(offset)
    } else {
        0
    }
}

/// Convert a constant to a display string.
fn constant_str(heap: &Heap, chunk: &Chunk, index: u16) -> String {
    match chunk.constants.get(index as usize) {
        Some(value) => {
            let text = heap.stringify(*value);
            if text.chars().count() > 24 {
                let short: String = text.chars().take(24).collect();
                format!("{}...", short)
            } else {
                text
            }
        }
        None => format!("?{}", index),
    }
}

/// Print disassembly to stderr.
pub fn print_disassembly(heap: &Heap, reaction: ObjRef) {
    eprint!("{}", disassemble_reaction(heap, reaction));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Reaction, ReactionKind};

    #[test]
    fn test_disassemble_simple_chunk() {
        let mut heap = Heap::default();
        let mut reaction = Reaction::new(None, ReactionKind::Script);
        let index = reaction.chunk.add_constant(Particle::Number(3.0)) as u16;
        reaction.chunk.write_op(OpCode::Constant, 1);
        reaction.chunk.write_u16(index, 1);
        reaction.chunk.write_op(OpCode::Pop, 1);
        reaction.chunk.write_op(OpCode::Null, 2);
        reaction.chunk.write_op(OpCode::Return, 2);
        let r = heap.alloc(Object::Reaction(reaction));

        let text = disassemble_reaction(&heap, r);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "== <script> ==");
        assert!(lines[1].starts_with("0000    1 CONSTANT"));
        assert!(lines[1].ends_with("'3'"));
        assert_eq!(lines[2], "0003    | POP");
        assert_eq!(lines[3], "0004    2 NULL");
        assert_eq!(lines[4], "0005    | RETURN");
    }

    #[test]
    fn test_disassemble_nested_closure() {
        let mut heap = Heap::default();
        let name = heap.intern("inner");
        let mut inner = Reaction::new(Some(name), ReactionKind::Reaction);
        inner.upvalue_count = 1;
        inner.chunk.write_op(OpCode::Null, 1);
        inner.chunk.write_op(OpCode::Return, 1);
        let inner = heap.alloc(Object::Reaction(inner));

        let mut outer = Reaction::new(None, ReactionKind::Script);
        let index = outer.chunk.add_constant(Particle::Obj(inner)) as u16;
        outer.chunk.write_op(OpCode::Closure, 1);
        outer.chunk.write_u16(index, 1);
        outer.chunk.write_byte(1, 1);
        outer.chunk.write_u16(2, 1);
        outer.chunk.write_op(OpCode::Return, 1);
        let outer = heap.alloc(Object::Reaction(outer));

        let text = disassemble_reaction(&heap, outer);
        assert!(text.contains("CLOSURE"));
        assert!(text.contains("local 2"));
        assert!(text.contains("0006    | RETURN"));
        assert!(text.contains("== inner =="));
    }
}
