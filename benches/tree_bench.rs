//! Benchmarks for the piece-tree engine matching real editor usage patterns:
//! single keystrokes, batched typing bursts, line navigation, viewport
//! extraction, and full-document save.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ziggurat_engine::{Document, EngineConfig};

/// Generate a realistic document with mixed content.
fn generate_document(lines: usize) -> Vec<u8> {
    let mut doc = String::new();
    for i in 0..lines {
        match i % 5 {
            0 => doc.push_str(&format!("fn function_{i}() {{\n")),
            1 => doc.push_str(&format!(
                "    let variable_{i} = \"string literal with some text\";\n"
            )),
            2 => doc.push_str(&format!("    // comment explaining line {i}\n")),
            3 => doc.push_str(&format!("    process_data({i}, {}, {});\n", i * 2, i * 3)),
            _ => doc.push_str("}\n"),
        }
    }
    doc.into_bytes()
}

fn doc_with(text: &[u8]) -> Document {
    let mut doc = Document::with_config(EngineConfig::default());
    doc.raw_insert(0, text).unwrap();
    doc
}

fn bench_single_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_insert");

    for size in [100, 1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut doc = doc_with(&text);
                let mid = text.len() / 2;
                doc.raw_insert(mid, b"x").unwrap();
                let mut out = Vec::new();
                doc.materialize(&mut out).unwrap();
                std::hint::black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_batched_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_edits");

    for size in [1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut doc = doc_with(&text);
                let start = text.len() / 2;
                for i in 0..10 {
                    doc.raw_insert(start + i, b"a").unwrap();
                }
                let mut out = Vec::new();
                doc.materialize(&mut out).unwrap();
                std::hint::black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_navigation(c: &mut Criterion) {
    let mut group = c.benchmark_group("navigation");

    for size in [1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);
        let mut doc = doc_with(&text);

        group.bench_with_input(BenchmarkId::new("byte_to_line", size), size, |b, _| {
            let positions: Vec<usize> = (0..100).map(|i| (text.len() * i) / 100).collect();
            b.iter(|| {
                for &pos in &positions {
                    doc.move_to(pos);
                    std::hint::black_box(doc.position().row);
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("line_to_byte", size), size, |b, _| {
            let line_count = doc.line_count();
            let lines: Vec<usize> = (0..100).map(|i| (line_count * i) / 100).collect();
            b.iter(|| {
                for &line in &lines {
                    std::hint::black_box(doc.line_span(line));
                }
            });
        });
    }
    group.finish();
}

fn bench_text_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_extraction");

    for size in [1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);
        let doc = doc_with(&text);

        group.bench_with_input(BenchmarkId::new("viewport_slice", size), size, |b, _| {
            let viewport_size = 2_000;
            let positions: Vec<usize> = (0..10).map(|i| (text.len() * i) / 10).collect();
            b.iter(|| {
                let mut out = Vec::new();
                for &pos in &positions {
                    let end = (pos + viewport_size).min(text.len());
                    out.clear();
                    doc.materialize_range(&mut out, pos..end).unwrap();
                    std::hint::black_box(&out);
                }
            });
        });
    }
    group.finish();
}

fn bench_deletion(c: &mut Criterion) {
    let mut group = c.benchmark_group("deletion");

    for size in [1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);

        group.bench_with_input(BenchmarkId::new("single_delete", size), size, |b, _| {
            b.iter(|| {
                let mut doc = doc_with(&text);
                let mid = text.len() / 2;
                doc.raw_delete(mid, 1);
                let mut out = Vec::new();
                doc.materialize(&mut out).unwrap();
                std::hint::black_box(out);
            });
        });

        group.bench_with_input(BenchmarkId::new("line_delete", size), size, |b, _| {
            b.iter(|| {
                let mut doc = doc_with(&text);
                let mid = text.len() / 2;
                doc.move_to(mid);
                let row = doc.position().row;
                let span = doc.line_span(row);
                doc.raw_delete(span.start, span.end - span.start);
                let mut out = Vec::new();
                doc.materialize(&mut out).unwrap();
                std::hint::black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_full_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_traversal");

    for size in [1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);
        let doc = doc_with(&text);

        group.bench_with_input(BenchmarkId::new("to_string", size), size, |b, _| {
            b.iter(|| {
                let mut out = Vec::new();
                doc.materialize(&mut out).unwrap();
                std::hint::black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");

    for size in [1_000, 10_000, 100_000].iter() {
        let text = generate_document(*size);
        group.bench_with_input(BenchmarkId::new("from_bytes", size), size, |b, _| {
            b.iter(|| {
                std::hint::black_box(doc_with(&text));
            });
        });
    }
    group.finish();
}

fn bench_realistic_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("realistic_session");

    group.bench_function("typing_burst", |b| {
        let text = generate_document(5_000);

        b.iter(|| {
            let mut doc = doc_with(&text);
            let mut pos = text.len() / 2;
            let code = "fn example() {\n    let x = 42;\n    println!(\"x = {}\", x);\n}\n";

            for ch in code.chars() {
                let mut buf = [0u8; 4];
                let s = ch.encode_utf8(&mut buf);
                doc.raw_insert(pos, s.as_bytes()).unwrap();
                pos += s.len();
            }

            let mut out = Vec::new();
            doc.materialize(&mut out).unwrap();
            std::hint::black_box(out);
        });
    });

    group.bench_function("multi_site_edit", |b| {
        let text = generate_document(1_000);

        b.iter(|| {
            let mut doc = doc_with(&text);
            let positions: Vec<usize> = (0..10).map(|i| (text.len() * i) / 10).collect();

            // Insert back to front so earlier positions stay valid.
            for &pos in positions.iter().rev() {
                doc.raw_insert(pos, b"TODO: ").unwrap();
            }

            let mut out = Vec::new();
            doc.materialize(&mut out).unwrap();
            std::hint::black_box(out);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batched_edits,
    bench_navigation,
    bench_text_extraction,
    bench_deletion,
    bench_full_materialize,
    bench_construction,
    bench_realistic_session
);

criterion_main!(benches);
