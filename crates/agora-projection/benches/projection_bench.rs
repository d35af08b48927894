//! Benchmarks for opinion-space projection
//!
//! Measures performance of:
//! - Projecting a single participant at different vote counts
//! - Placing every comment of a basis

use std::collections::HashSet;

use agora_projection::{project, project_comments, Compensation, ProjectionBasis, Tid, Vote};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn basis_with(comments: u64) -> ProjectionBasis {
    (0..comments).fold(ProjectionBasis::new(), |basis, t| {
        let phase = t as f64 * 0.37;
        basis.with_comment(Tid(t), phase.sin() * 0.2, phase.cos(), phase.sin())
    })
}

/// Benchmark projecting one participant
fn bench_project(c: &mut Criterion) {
    let mut group = c.benchmark_group("project");
    let basis = basis_with(10_000);
    let excluded: HashSet<Tid> = (0..10_000).step_by(97).map(Tid).collect();

    for &votes_cast in &[1u64, 10, 100, 1_000, 10_000] {
        let votes: Vec<Vote> = (0..votes_cast)
            .map(|t| if t % 3 == 0 { Vote::disagree(t) } else { Vote::agree(t) })
            .collect();
        group.throughput(Throughput::Elements(votes_cast));
        group.bench_with_input(BenchmarkId::from_parameter(votes_cast), &votes, |b, votes| {
            b.iter(|| project(black_box(votes), &excluded, &basis, Compensation::Apply))
        });
    }
    group.finish();
}

/// Benchmark placing all comments
fn bench_project_comments(c: &mut Criterion) {
    let mut group = c.benchmark_group("project_comments");

    for &comments in &[100u64, 1_000, 10_000] {
        let basis = basis_with(comments);
        group.throughput(Throughput::Elements(comments));
        group.bench_with_input(BenchmarkId::from_parameter(comments), &basis, |b, basis| {
            b.iter(|| project_comments(black_box(basis), &HashSet::new()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_project, bench_project_comments);
criterion_main!(benches);
