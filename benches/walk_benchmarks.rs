//! Benchmarks for graph walks
//!
//! Measures performance of:
//! - Continue-only walks (the allocation-free path)
//! - Walks that replace a single deep leaf
//! - Walks that replace every leaf
//! - Abstract accessor traversal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::any::Any;
use std::time::Duration;

use rewalk::engine::{Abstract, Decision, Node};
use test_utils::calc::{CALCULATION, Calculation, ENGINE, Expr, Op, SCALAR, Scalar};

// ============================================================================
// Graph builders
// ============================================================================

/// Balanced binary tree of `depth` levels; scalars are numbered left to right.
fn balanced(depth: u32, next: &mut i64) -> Expr {
    if depth == 0 {
        *next += 1;
        return Expr::scalar(*next);
    }
    let left = balanced(depth - 1, next);
    let right = balanced(depth - 1, next);
    Expr::binary(Op::Add, left, right)
}

/// A single call with `width` scalar arguments.
fn wide(width: i64) -> Expr {
    Expr::func("sum", (0..width).map(Expr::scalar).collect())
}

fn balanced_calc(depth: u32) -> Calculation {
    Calculation::new(balanced(depth, &mut 0))
}

fn count_children(node: Abstract<'_>) -> usize {
    node.children().map(|child| 1 + count_children(child)).sum()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_noop_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("noop_walk");

    for depth in [4u32, 8, 12] {
        let calc = balanced_calc(depth);
        let visit = |_: Node<'_>| Decision::proceed();
        group.bench_with_input(BenchmarkId::new("balanced", depth), &calc, |b, calc| {
            b.iter(|| {
                let walked = ENGINE.walk(CALCULATION, black_box(calc), &visit).unwrap();
                black_box(walked.changed())
            });
        });
    }

    for width in [16i64, 256, 4096] {
        let calc = Calculation::new(wide(width));
        let visit = |_: Node<'_>| Decision::proceed();
        group.bench_with_input(BenchmarkId::new("wide", width), &calc, |b, calc| {
            b.iter(|| {
                let walked = ENGINE.walk(CALCULATION, black_box(calc), &visit).unwrap();
                black_box(walked.changed())
            });
        });
    }

    group.finish();
}

fn bench_replace_one_leaf(c: &mut Criterion) {
    let mut group = c.benchmark_group("replace_one_leaf");

    for depth in [4u32, 8, 12] {
        let calc = balanced_calc(depth);
        // The right-most scalar carries the highest number.
        let last = 1i64 << depth;
        let visit = move |node: Node<'_>| match node.downcast_ref::<Scalar>() {
            Some(s) if s.value == last => Decision::replace(SCALAR, Scalar { value: 0 }),
            _ => Decision::proceed(),
        };
        group.bench_with_input(BenchmarkId::from_parameter(depth), &calc, |b, calc| {
            b.iter(|| {
                let walked = ENGINE.walk(CALCULATION, black_box(calc), &visit).unwrap();
                black_box(walked.into_value::<Calculation>())
            });
        });
    }

    group.finish();
}

fn bench_replace_all_leaves(c: &mut Criterion) {
    let mut group = c.benchmark_group("replace_all_leaves");

    for depth in [4u32, 8, 12] {
        let calc = balanced_calc(depth);
        let visit = |node: Node<'_>| match node.downcast_ref::<Scalar>() {
            Some(s) => Decision::replace(SCALAR, Scalar { value: s.value * 2 }),
            None => Decision::proceed(),
        };
        group.bench_with_input(BenchmarkId::from_parameter(depth), &calc, |b, calc| {
            b.iter(|| {
                let walked = ENGINE.walk(CALCULATION, black_box(calc), &visit).unwrap();
                black_box(walked.into_value::<Calculation>())
            });
        });
    }

    group.finish();
}

fn bench_abstract_traversal(c: &mut Criterion) {
    let calc = balanced_calc(10);
    let value: &dyn Any = &calc;
    c.bench_function("abstract_traversal_depth_10", |b| {
        b.iter(|| {
            let root = ENGINE.abstract_node(CALCULATION, Some(black_box(value))).unwrap().unwrap();
            black_box(count_children(root))
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = bench_noop_walk, bench_replace_one_leaf, bench_replace_all_leaves, bench_abstract_traversal
}
criterion_main!(benches);
