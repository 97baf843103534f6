use pretty_assertions::assert_eq;

use super::*;
use crate::bytecode::OpCode;
use crate::error::CompileErrors;
use crate::particle::{GcConfig, Heap, ObjRef, Object, Particle};

fn compile_ok(source: &str) -> (Heap, ObjRef) {
    let mut heap = Heap::default();
    let roots: Vec<ObjRef> = Vec::new();
    let script = compile(source, &mut heap, &roots).expect("source should compile");
    (heap, script)
}

fn compile_err(source: &str) -> CompileErrors {
    let mut heap = Heap::default();
    let roots: Vec<ObjRef> = Vec::new();
    compile(source, &mut heap, &roots).expect_err("source should not compile")
}

fn code(heap: &Heap, reaction: ObjRef) -> Vec<u8> {
    heap.reaction(reaction).unwrap().chunk.code.clone()
}

fn op(op: OpCode) -> u8 {
    op as u8
}

/// Depth-first search for a nested reaction by name.
fn find_reaction(heap: &Heap, root: ObjRef, name: &str) -> Option<ObjRef> {
    let reaction = heap.reaction(root).ok()?;
    for constant in &reaction.chunk.constants {
        if let Particle::Obj(r) = constant {
            if let Ok(Object::Reaction(nested)) = heap.get(*r) {
                if nested.name.map(|n| heap.name(n)) == Some(name) {
                    return Some(*r);
                }
                if let Some(found) = find_reaction(heap, *r, name) {
                    return Some(found);
                }
            }
        }
    }
    None
}

// ============ Code generation ============

#[test]
fn test_scope_pops_in_reverse_order() {
    let (heap, script) = compile_ok("{ let a = 1; let b = 2; }");
    assert_eq!(
        code(&heap, script),
        vec![
            op(OpCode::Constant),
            0,
            0,
            op(OpCode::Constant),
            1,
            0,
            op(OpCode::Pop),
            op(OpCode::Pop),
            op(OpCode::Null),
            op(OpCode::Return),
        ]
    );
}

#[test]
fn test_captured_local_is_closed() {
    let (heap, script) = compile_ok("{ let a = 1; let f = reaction() { return a; }; }");
    let code = code(&heap, script);
    assert_eq!(
        code[code.len() - 4..],
        [
            op(OpCode::Pop),
            op(OpCode::CloseUpvalue),
            op(OpCode::Null),
            op(OpCode::Return),
        ]
    );
}

#[test]
fn test_comparison_lowering() {
    let (heap, script) = compile_ok("1 <= 2;");
    assert_eq!(
        code(&heap, script),
        vec![
            op(OpCode::Constant),
            0,
            0,
            op(OpCode::Constant),
            1,
            0,
            op(OpCode::Greater),
            op(OpCode::Not),
            op(OpCode::Pop),
            op(OpCode::Null),
            op(OpCode::Return),
        ]
    );
}

#[test]
fn test_constants_are_deduplicated() {
    let (heap, script) = compile_ok("let x = 1; x = x + 1; x = \"a\" + \"a\";");
    let reaction = heap.reaction(script).unwrap();
    let ones = reaction
        .chunk
        .constants
        .iter()
        .filter(|c| **c == Particle::Number(1.0))
        .count();
    assert_eq!(ones, 1);
    let strings = reaction
        .chunk
        .constants
        .iter()
        .filter(|c| heap.string_of(**c) == Some("a"))
        .count();
    assert_eq!(strings, 1);
}

#[test]
fn test_upvalues_are_deduplicated() {
    let (heap, script) = compile_ok(
        "reaction outer() { let x = 1; reaction inner() { return x + x; } return inner; }",
    );
    let inner = find_reaction(&heap, script, "inner").unwrap();
    assert_eq!(heap.reaction(inner).unwrap().upvalue_count, 1);
    let outer = find_reaction(&heap, script, "outer").unwrap();
    assert_eq!(heap.reaction(outer).unwrap().upvalue_count, 0);
}

#[test]
fn test_reaction_arity_and_defaults() {
    let (heap, script) = compile_ok("reaction f(a, b = 2, c = 3) { return a; }");
    let f = find_reaction(&heap, script, "f").unwrap();
    let f = heap.reaction(f).unwrap();
    assert_eq!(f.arity, 3);
    assert_eq!(f.defaults, 2);
    assert_eq!(f.required(), 1);
}

#[test]
fn test_string_escapes_are_decoded() {
    let (heap, _) = compile_ok("let s = \"a\\tb\\x41\";");
    assert!(heap.lookup_interned("a\tbA").is_some());
}

#[test]
fn test_number_literal_forms() {
    let (heap, script) = compile_ok("0x1F; 0b101; 0o17; 1_000; 2.5;");
    let constants = &heap.reaction(script).unwrap().chunk.constants;
    assert_eq!(
        constants,
        &vec![
            Particle::Number(31.0),
            Particle::Number(5.0),
            Particle::Number(15.0),
            Particle::Number(1000.0),
            Particle::Number(2.5),
        ]
    );
}

#[test]
fn test_model_with_base_compiles() {
    let (heap, script) = compile_ok(
        "model A { @construct(v) { this.v = v; } get() { return this.v; } }
         model B derives A { get() { return super.get() + 1; } };",
    );
    assert!(find_reaction(&heap, script, "@construct").is_some());
    let text = crate::bytecode::disassemble_reaction(&heap, script);
    assert!(text.contains("INHERIT"));
    assert!(text.contains("SUPER_INVOKE"));
}

// ============ Diagnostics ============

#[test]
fn test_const_reassignment_is_rejected() {
    let errors = compile_err("const s = \"ab\"; s = \"cd\";");
    assert_eq!(errors.len(), 1);
    assert!(errors.mentions("Cannot reassign an immutable constant."));
}

#[test]
fn test_mutate_allows_exactly_one_reassignment() {
    compile_ok("const s = 1; @mutate s = 2;");
    compile_ok("{ const a = 1; @mutate a = 2; }");
    let errors = compile_err("const s = 1; @mutate s = 2; s = 3;");
    assert!(errors.mentions("Cannot reassign an immutable constant."));
}

#[test]
fn test_unused_mutate_stays_pending() {
    compile_ok("@mutate let y = 1;");
    compile_ok("@mutate std.print(1);");
    compile_ok("@mutate");

    // The permit carries over to the next immutable assignment
    compile_ok("const c = 1; @mutate let y = 1; c = 2;");
    compile_ok("const c = 1; @mutate std.print(c); c = 2;");

    let errors = compile_err("const c = 1; @mutate let y = 1; c = 2; c = 3;");
    assert_eq!(errors.len(), 1);
    assert!(errors.mentions("Cannot reassign an immutable constant."));
}

#[test]
fn test_reaction_and_model_names_are_immutable() {
    assert!(compile_err("reaction f() {} f = 1;").mentions("immutable constant"));
    assert!(compile_err("model M {} M = 1;").mentions("immutable constant"));
    compile_ok("let f = 1; f = 2;");
}

#[test]
fn test_errors_accumulate_across_statements() {
    let errors = compile_err("let = 1;\nlet y 2;\nstd.print(1);");
    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors.0[0].to_string(),
        "[line 1] Syntax Error at '=': Expected a variable name."
    );
    assert_eq!(
        errors.0[1].to_string(),
        "[line 2] Syntax Error at '2': Expected a ';' after variable declaration."
    );
}

#[test]
fn test_error_at_end() {
    let errors = compile_err("let x = 1");
    assert_eq!(
        errors.0[0].to_string(),
        "[line 1] Syntax Error at end: Expected a ';' after variable declaration."
    );
}

#[test]
fn test_semantic_errors() {
    let cases = [
        ("1 + 2 = 3;", "Invalid assignment target."),
        ("std.print(this);", "Cannot use \"this\" outside of a model."),
        ("return 1;", "Cannot return from top-level code."),
        ("model A derives A {}", "A model cannot inherit from itself."),
        (
            "reaction f(a = 1, b) {}",
            "Non-defaulted reaction parameter specified after a defaulted reaction parameter.",
        ),
        ("{ let a = a; }", "Cannot read local variable in its own initialiser."),
        ("{ let a = 1; let a = 2; }", "A variable already exists with this name in this scope."),
        ("model A { @construct() { return 1; } }", "Cannot return a value from a model constructor."),
        ("model A { f() { return super.f(); } }", "Cannot use 'super' keyword in a model with no base."),
        ("let s = \"\\q\";", "Found an invalid escape sequence character."),
        (";", "Expected an expression."),
        ("try { } std.print(1);", "Expected coinciding 'catch' to 'try' block."),
    ];
    for (source, message) in cases {
        let errors = compile_err(source);
        assert!(
            errors.mentions(message),
            "{:?} should report {:?}, got {}",
            source,
            message,
            errors
        );
    }
}

#[test]
fn test_lexer_errors_are_reported() {
    let errors = compile_err("let x = $;");
    assert!(errors.mentions("Unexpected character."));
}

// ============ Garbage collection ============

#[test]
fn test_stress_collection_keeps_pending_constants() {
    let mut heap = Heap::new(GcConfig {
        stress: true,
        ..GcConfig::default()
    });
    let roots: Vec<ObjRef> = Vec::new();
    let script = compile(
        "let a = \"one\"; let b = \"two\";
         reaction f() { let t = \"three\"; return t; }
         let c = \"four\";",
        &mut heap,
        &roots,
    )
    .unwrap();
    assert!(heap.collections() > 0);

    let strings: Vec<String> = heap
        .reaction(script)
        .unwrap()
        .chunk
        .constants
        .iter()
        .filter_map(|c| heap.string_of(*c).map(str::to_string))
        .collect();
    for expected in ["a", "one", "b", "two", "f", "c", "four"] {
        assert!(strings.iter().any(|s| s == expected), "missing {}", expected);
    }

    let f = find_reaction(&heap, script, "f").unwrap();
    let constants = &heap.reaction(f).unwrap().chunk.constants;
    assert_eq!(heap.string_of(constants[0]), Some("three"));
}
