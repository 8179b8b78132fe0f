//! Compile-pipeline benchmarks.
//!
//! Measures the cost of each compile stage composition across query
//! shapes: parse only, parse + analysis, and the full compile (through
//! planning).
//!
//! ```bash
//! cargo bench
//! cargo bench simple_queries
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use webql::{compile, parse};

fn bench_simple_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_queries");

    let queries = vec![
        ("minimal", "SELECT title FROM 'https://example.com'"),
        (
            "with_where",
            "SELECT title, price FROM 'https://example.com' WHERE price > 3",
        ),
        (
            "with_everything",
            "SELECT title, price AS cost FROM 'https://example.com' WHERE price > 3 \
             ORDER BY cost DESC LIMIT 10 OFFSET 2",
        ),
        (
            "navigate",
            "NAVIGATE TO 'https://example.com' WITH {waitUntil: 'load', timeout: 30s} \
             CAPTURE title, url",
        ),
    ];

    for (name, query) in queries {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("parse", name), query, |b, query| {
            b.iter(|| parse(black_box(query)));
        });
        group.bench_with_input(BenchmarkId::new("compile", name), query, |b, query| {
            b.iter(|| compile(black_box(query)).expect("compile"));
        });
    }

    group.finish();
}

fn bench_nested_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_queries");

    for depth in [1usize, 3, 6] {
        let mut query = String::from("SELECT a, b FROM 'https://example.com'");
        for _ in 0..depth {
            query = format!("SELECT a FROM ({query}) WHERE b > 1");
        }
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("compile", depth), &query, |b, query| {
            b.iter(|| compile(black_box(query)).expect("compile"));
        });
    }

    group.finish();
}

fn bench_wide_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_queries");

    for width in [10usize, 50, 200] {
        let fields: Vec<String> = (0..width).map(|i| format!("field_{i}")).collect();
        let query = format!("SELECT {} FROM 'https://example.com'", fields.join(", "));
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("compile", width), &query, |b, query| {
            b.iter(|| compile(black_box(query)).expect("compile"));
        });
    }

    group.finish();
}

fn bench_optimizer_heavy(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer_heavy");

    let queries = vec![
        (
            "folding_chain",
            "SELECT 1 + 2 * 3 - 4 / 2 + 5 % 3 AS n FROM 'about:blank'",
        ),
        (
            "pushdown",
            "SELECT name FROM (SELECT name, age, email, city FROM 'https://example.com') \
             WHERE age > 18 AND name LIKE 'a%'",
        ),
        (
            "dead_branches",
            "IF 1 > 2 THEN NAVIGATE TO 'https://a.com' ELSE IF TRUE THEN SHOW METRICS",
        ),
    ];

    for (name, query) in queries {
        group.bench_with_input(BenchmarkId::new("compile", name), query, |b, query| {
            b.iter(|| compile(black_box(query)).expect("compile"));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_simple_queries,
    bench_nested_queries,
    bench_wide_queries,
    bench_optimizer_heavy
);
criterion_main!(benches);
