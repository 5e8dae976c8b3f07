mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gglang::compile;
use gglang::config::ProjectConfig;
use gglang::diagnostics::DiagnosticBag;
use gglang::{lexer, parser};

fn bench_frontend(c: &mut Criterion) {
    let config = ProjectConfig::default();

    for (label, path) in common::workloads() {
        let source = common::load_source(&path);

        c.bench_function(&format!("frontend_tokenize_{label}"), |b| {
            b.iter(|| {
                let mut bag = DiagnosticBag::new();
                let out = lexer::tokenize(black_box(&source), &mut bag);
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_tokenize_parse_{label}"), |b| {
            b.iter(|| {
                let mut bag = DiagnosticBag::new();
                let tokens = lexer::tokenize(black_box(&source), &mut bag);
                let out = parser::parse_unit(tokens, &mut bag);
                black_box(out);
            })
        });

        c.bench_function(&format!("compile_to_c_{label}"), |b| {
            b.iter(|| {
                let out = compile::compile_source(black_box(&source), None, &config);
                black_box(out);
            })
        });
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
