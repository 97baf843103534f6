//! Bytecode module for the Atomizer.
//!
//! # Architecture
//!
//! - `instruction`: OpCode definitions for the bytecode instruction set
//! - `chunk`: Bytecode chunks containing instructions and constant pools
//! - `disassembler`: Debug output for bytecode inspection

pub mod chunk;
pub mod disassembler;
pub mod instruction;

pub use chunk::Chunk;
pub use disassembler::{disassemble_instruction, disassemble_reaction, print_disassembly};
pub use instruction::{OpCode, UpvalueInfo};
