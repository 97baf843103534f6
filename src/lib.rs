//! Nucleus: a small dynamically typed language with models, closures and
//! catchable disruptions.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! - **Lexer**: on-demand tokens over the source text
//! - **Fuser**: single pass Pratt compiler straight to bytecode
//! - **Atomizer**: stack based VM over an arena heap with a mark-sweep collector

#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_else_if)]

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod particle;
pub mod repl;
pub mod span;
pub mod stdlib;
pub mod vm;

use std::path::Path;

use error::NucleusError;

pub use vm::{compile_and_run, Atomizer, Config, ExitStatus};

/// Run a Nucleus program on a fresh Atomizer configured from the environment.
pub fn run(source: &str) -> Result<(), NucleusError> {
    Atomizer::with_config(Config::from_env()).interpret(source)
}

/// Run a Nucleus program with an explicit configuration.
pub fn run_with_config(source: &str, config: Config) -> Result<(), NucleusError> {
    Atomizer::with_config(config).interpret(source)
}

/// Read and run a Nucleus script.
pub fn run_file(path: &Path) -> Result<(), NucleusError> {
    let source = std::fs::read_to_string(path)?;
    run(&source)
}

/// Compile source code and return its disassembly without executing.
pub fn disassemble(source: &str) -> Result<String, NucleusError> {
    let mut vm = Atomizer::new();
    let script = vm.compile(source)?;
    Ok(bytecode::disassemble_reaction(vm.heap(), script))
}
