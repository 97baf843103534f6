//! Bytecode chunk containing instructions and constants.

use crate::bytecode::instruction::OpCode;
use crate::particle::Particle;

/// A chunk of bytecode: the compiled body of one reaction.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// The bytecode instructions.
    pub code: Vec<u8>,
    /// Source line of every byte in `code`.
    pub lines: Vec<u32>,
    /// The constant pool. Append-only; the emitter deduplicates.
    pub constants: Vec<Particle>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode to the chunk.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write_byte(op as u8, line);
    }

    /// Write a raw byte to the chunk.
    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write a 16-bit value to the chunk (little-endian).
    pub fn write_u16(&mut self, value: u16, line: u32) {
        self.write_byte((value & 0xff) as u8, line);
        self.write_byte((value >> 8) as u8, line);
    }

    /// Read a 16-bit value from the chunk at offset.
    pub fn read_u16(&self, offset: usize) -> u16 {
        let lo = self.code[offset] as u16;
        let hi = self.code[offset + 1] as u16;
        lo | (hi << 8)
    }

    /// Patch a u16 value at the given offset.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.code[offset] = (value & 0xff) as u8;
        self.code[offset + 1] = (value >> 8) as u8;
    }

    /// Append a constant and return its index.
    pub fn add_constant(&mut self, value: Particle) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Index of an identical constant already in the pool.
    pub fn find_constant(&self, value: Particle) -> Option<usize> {
        self.constants.iter().position(|c| *c == value)
    }

    /// Get the current offset in the code.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Get the line number at a given offset.
    pub fn get_line(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_u16() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Constant, 1);
        chunk.write_u16(0x1234, 1);
        assert_eq!(chunk.code, vec![OpCode::Constant as u8, 0x34, 0x12]);
        assert_eq!(chunk.read_u16(1), 0x1234);
        assert_eq!(chunk.lines, vec![1, 1, 1]);
    }

    #[test]
    fn test_patch_u16() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 3);
        chunk.write_u16(0xffff, 3);
        chunk.patch_u16(1, 7);
        assert_eq!(chunk.read_u16(1), 7);
        assert_eq!(chunk.get_line(2), 3);
        assert_eq!(chunk.get_line(99), 0);
    }

    #[test]
    fn test_constants_are_append_only() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Particle::Number(1.0)), 0);
        assert_eq!(chunk.add_constant(Particle::Number(1.0)), 1);
        assert_eq!(chunk.find_constant(Particle::Number(1.0)), Some(0));
        assert_eq!(chunk.find_constant(Particle::Number(f64::NAN)), None);
    }
}
