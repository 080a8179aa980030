//! Benchmarks for the query pipeline.
//!
//! Benchmarks cover:
//! - Predicate compilation (conditions → text + params)
//! - Expression parsing (text → Expr)
//! - In-memory evaluation (filter, sort, page) over generated documents
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use querysource::expr::{matches, parse_ordering, parse_predicate, sort_documents};
use querysource::query::compiler::{compile_conditions, compose};
use querysource::query::request::parse_request;
use querysource::query::stream::{QueryStream, Scope};
use querysource::store::memory::run_stages;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

const SIMPLE: &[(&str, &str)] = &[("NumberGreaterThan", "5")];

const MIXED: &[(&str, &str)] = &[
    ("NameStartsWith", "TestExample"),
    ("NumberBetween", "100,900"),
    ("NumberNotEqualTo", "500"),
    ("TagsContains", "blue"),
];

const PAGED: &[(&str, &str)] = &[
    ("NumberGreaterThanOrEqualTo", "10"),
    ("OrderBy", "-Number,Name"),
    ("Skip", "20"),
    ("Take", "50"),
    ("Fields", "Name,Number"),
];

fn documents(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let tags = if i % 3 == 0 { vec!["red", "blue"] } else { vec!["green"] };
            json!({
                "Id": i,
                "Name": format!("TestExample{}", i),
                "Number": (i * 7919) % 1000,
                "Tags": tags,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");

    for (name, params) in [("simple", SIMPLE), ("mixed", MIXED), ("paged", PAGED)] {
        let query = parse_request(params.iter().copied()).unwrap().query;
        group.bench_with_input(BenchmarkId::new("predicate", name), &query, |b, q| {
            b.iter(|| compile_conditions(black_box(&q.conditions)));
        });
        group.bench_with_input(BenchmarkId::new("compose", name), &query, |b, q| {
            b.iter(|| compose(QueryStream::new(Scope::collection("Docs")), black_box(q)));
        });
    }

    group.finish();
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    for (name, params) in [("simple", SIMPLE), ("mixed", MIXED)] {
        let query = parse_request(params.iter().copied()).unwrap().query;
        let predicate = compile_conditions(&query.conditions).unwrap();
        group.bench_with_input(BenchmarkId::new("predicate", name), &predicate.text, |b, text| {
            b.iter(|| parse_predicate(black_box(text)).unwrap());
        });
    }

    group.bench_function("ordering", |b| {
        b.iter(|| parse_ordering(black_box("Number DESC,Name ASC,Id")).unwrap());
    });

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");

    let query = parse_request(MIXED.iter().copied()).unwrap().query;
    let predicate = compile_conditions(&query.conditions).unwrap();
    let expr = parse_predicate(&predicate.text).unwrap();

    for size in [100usize, 1_000, 10_000] {
        let docs = documents(size);
        group.bench_with_input(BenchmarkId::new("filter", size), &docs, |b, docs| {
            b.iter(|| {
                docs.iter()
                    .filter(|d| matches(&expr, d, &predicate.params))
                    .count()
            });
        });

        let keys = parse_ordering("Number DESC,Name").unwrap();
        group.bench_with_input(BenchmarkId::new("sort", size), &docs, |b, docs| {
            b.iter(|| {
                let mut docs = docs.clone();
                sort_documents(&mut docs, black_box(&keys));
                docs
            });
        });
    }

    let paged = parse_request(PAGED.iter().copied()).unwrap().query;
    let stream = compose(QueryStream::new(Scope::collection("Docs")), &paged);
    let docs = documents(10_000);
    group.bench_function("run_stages_paged_10000", |b| {
        b.iter(|| run_stages(docs.clone(), black_box(&stream.stages)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_compilation, bench_parsing, bench_evaluation);
criterion_main!(benches);
