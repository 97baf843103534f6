//! The Fuser: a single-pass Pratt compiler from source text to bytecode.
//!
//! There is no syntax tree. Tokens are pulled from the scanner on demand and
//! bytecode is written straight into the chunk of the reaction being compiled.
//!
//! - `fuser`: Fuser state, emission helpers, scopes and name resolution
//! - `precedence`: operator binding powers
//! - `expressions`: prefix/infix parse rules
//! - `statements`: control flow and catch regions
//! - `declarations`: variables, reactions and models

mod fuser;
mod declarations;
mod expressions;
pub mod precedence;
mod statements;

#[cfg(test)]
mod tests;

use ahash::AHashSet;

use crate::error::CompileErrors;
use crate::particle::{GcRoots, Heap, ObjRef};

pub use fuser::Fuser;
pub use precedence::Precedence;

/// Compile `source` into a top-level script reaction.
///
/// `roots` marks whatever the caller keeps alive while the compiler may collect.
pub fn compile(source: &str, heap: &mut Heap, roots: &dyn GcRoots) -> Result<ObjRef, CompileErrors> {
    let mut immutable_globals = AHashSet::new();
    compile_script(source, heap, roots, &mut immutable_globals)
}

/// Like [`compile`], but global `const` names are read from and recorded into
/// `immutable_globals`, so they persist across separately compiled scripts.
pub fn compile_script(
    source: &str,
    heap: &mut Heap,
    roots: &dyn GcRoots,
    immutable_globals: &mut AHashSet<String>,
) -> Result<ObjRef, CompileErrors> {
    Fuser::new(source, heap, roots, immutable_globals).compile()
}
