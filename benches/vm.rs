//! Benchmarks for compiling and running Nucleus programs on the Atomizer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nucleus::vm::{Atomizer, ExitStatus, SharedBuffer};

/// Compile and run on a fresh Atomizer, discarding printed output.
fn run(source: &str) {
    let mut vm = Atomizer::new();
    vm.set_output(SharedBuffer::new());
    assert_eq!(vm.compile_and_run(source), ExitStatus::Success);
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
reaction fib(n) {{
    if (n < 2) return n;
    return fib(n - 1) + fib(n - 2);
}}
let result = fib({});
"#,
            n
        );

        group.bench_with_input(BenchmarkId::from_parameter(n), &source, |b, src| {
            b.iter(|| run(black_box(src)))
        });
    }

    group.finish();
}

fn loop_sum(c: &mut Criterion) {
    let source = r#"
let total = 0;
for (let i : 0, 100000) total = total + i;
"#;
    c.bench_function("loop_sum", |b| b.iter(|| run(black_box(source))));
}

fn string_concat(c: &mut Criterion) {
    let source = r#"
let s = "";
for (let i : 0, 2000) s = s + "ab";
"#;
    c.bench_function("string_concat", |b| b.iter(|| run(black_box(source))));
}

fn model_methods(c: &mut Criterion) {
    let source = r#"
model Counter {
    count: 0;
    bump() { this.count = this.count + 1; }
}
let c = Counter();
for (let i : 0, 10000) c.bump();
"#;
    c.bench_function("model_methods", |b| b.iter(|| run(black_box(source))));
}

criterion_group!(benches, fib_scaling, loop_sum, string_concat, model_methods);
criterion_main!(benches);
