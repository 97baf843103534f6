//! The Atomizer: executes the bytecode produced by the Fuser.
//!
//! - `vm`: machine state, the dispatch loop and operand helpers
//! - `vm_calls`: calling closures, natives, models and bound methods
//! - `vm_classes`: model definition, properties and members
//! - `vm_operators`: arithmetic, comparison and truthiness
//! - `vm_exceptions`: catch regions and uncaught disruptions
//! - `upvalue`: capturing and closing over stack slots
//! - `config`: limits and debugging switches

pub mod config;
pub mod upvalue;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_calls;
pub mod vm_classes;
pub mod vm_exceptions;
pub mod vm_operators;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use vm::{Atomizer, CallFrame, CatchRegion, ExitStatus, SharedBuffer};

/// Compile and run `source` on a fresh Atomizer configured from the environment.
pub fn compile_and_run(source: &str) -> ExitStatus {
    Atomizer::with_config(Config::from_env()).compile_and_run(source)
}
