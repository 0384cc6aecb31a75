// Tree building, reuse, merge and snapshot benchmarks.
//
// Run with: cargo bench
//
// Performance Targets:
// | Operation            | Target    | Description                          |
// |----------------------|-----------|--------------------------------------|
// | Build (1k results)   | < 10ms    | 1000 results with two images each    |
// | Build (10k results)  | < 100ms   | 10000 results with two images each   |
// | Reuse (10k)          | < 50ms    | overlay a 10k-result previous tree   |
// | Merge (2 x 5k)       | < 100ms   | two shards of the same tests         |
// | Save + load (1k)     | < 50ms    | snapshot round trip through SQLite   |

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use report_tree::model::{FormattedResult, ImageInfo, TestStatus, Tree};
use report_tree::storage::{ReportStorage, flatten, unflatten};
use report_tree::tree::{BuilderOptions, TestsTreeBuilder, merge_trees};
use std::hint::black_box;
use std::sync::Once;
use std::time::Instant;
use tempfile::TempDir;
use tracing::info;

const BROWSERS: [&str; 3] = ["chrome", "firefox", "yabro"];

fn init_bench_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = report_tree::logging::init_logging(0, true, false);
    });
}

fn log_group_start(name: &str) {
    info!("benchmark_group_start: name={name}");
}

fn log_group_end(name: &str) {
    info!("benchmark_group_end: name={name}");
}

fn log_bench_start(name: &str) -> Instant {
    info!("benchmark_start: {name}");
    Instant::now()
}

fn log_bench_end(name: &str, started_at: Instant) {
    info!("benchmark_end: {name} duration={:?}", started_at.elapsed());
}

/// A result in one of 20 top-level suites, spread over three browsers.
fn create_test_result(i: usize, status: TestStatus) -> FormattedResult {
    let suite = format!("suite{}", i % 20);
    let group = format!("group{}", (i / 20) % 10);
    let case = format!("case{i}");
    let browser = BROWSERS[i % BROWSERS.len()];

    let mut result = FormattedResult::new(&[suite.as_str(), group.as_str(), case.as_str()], browser, status);
    result.attempt = Some(0);
    result.timestamp = Some(i64::try_from(i).expect("index fits i64"));
    result.images_info = vec![
        ImageInfo::with_state("header", status),
        ImageInfo::with_state("footer", TestStatus::Success),
    ];
    result
}

fn create_results(count: usize) -> Vec<FormattedResult> {
    (0..count)
        .map(|i| {
            let status = if i % 7 == 0 {
                TestStatus::Fail
            } else {
                TestStatus::Success
            };
            create_test_result(i, status)
        })
        .collect()
}

fn build_tree(results: &[FormattedResult]) -> Tree {
    let mut builder = TestsTreeBuilder::new(BuilderOptions::default());
    for result in results {
        builder.add_test_result(result).unwrap();
    }
    builder.sort_tree();
    builder.into_tree()
}

// =============================================================================
// Builder Benchmarks
// =============================================================================

fn bench_build(c: &mut Criterion) {
    init_bench_logging();
    let group_name = "tree/build";
    log_group_start(group_name);
    let mut group = c.benchmark_group(group_name);

    for size in [1_000usize, 10_000] {
        let results = create_results(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &results, |b, results| {
            let bench_name = format!("tree/build/{size}");
            let bench_start = log_bench_start(&bench_name);
            b.iter(|| build_tree(black_box(results)));
            log_bench_end(&bench_name, bench_start);
        });
    }

    group.finish();
    log_group_end(group_name);
}

fn bench_reuse(c: &mut Criterion) {
    init_bench_logging();
    let group_name = "tree/reuse";
    log_group_start(group_name);
    let mut group = c.benchmark_group(group_name);

    let size = 10_000usize;
    let previous = build_tree(&create_results(size));
    let idle: Vec<FormattedResult> = (0..size)
        .map(|i| create_test_result(i, TestStatus::Idle))
        .collect();
    let fresh = build_tree(&idle);

    group.throughput(Throughput::Elements(size as u64));
    group.bench_function("overlay", |b| {
        let bench_name = "tree/reuse/overlay";
        let bench_start = log_bench_start(bench_name);
        b.iter(|| {
            let mut builder = TestsTreeBuilder::from_tree(fresh.clone(), BuilderOptions::default());
            builder.reuse_tests_tree(Some(black_box(&previous)))
        });
        log_bench_end(bench_name, bench_start);
    });

    group.finish();
    log_group_end(group_name);
}

fn bench_merge(c: &mut Criterion) {
    init_bench_logging();
    let group_name = "tree/merge";
    log_group_start(group_name);
    let mut group = c.benchmark_group(group_name);

    let size = 5_000usize;
    let first = build_tree(&create_results(size));
    let retried: Vec<FormattedResult> = (0..size)
        .map(|i| create_test_result(i, TestStatus::Success))
        .collect();
    let second = build_tree(&retried);
    let shards = vec![first, second];

    group.throughput(Throughput::Elements((size * 2) as u64));
    group.bench_function("two_shards", |b| {
        let bench_name = "tree/merge/two_shards";
        let bench_start = log_bench_start(bench_name);
        b.iter(|| merge_trees(black_box(&shards)).unwrap());
        log_bench_end(bench_name, bench_start);
    });

    group.finish();
    log_group_end(group_name);
}

// =============================================================================
// Persistence Benchmarks
// =============================================================================

fn bench_flatten(c: &mut Criterion) {
    init_bench_logging();
    let group_name = "storage/flatten";
    log_group_start(group_name);
    let mut group = c.benchmark_group(group_name);

    let tree = build_tree(&create_results(1_000));
    let rows = flatten(&tree).unwrap();

    group.bench_function("flatten", |b| {
        b.iter(|| flatten(black_box(&tree)).unwrap());
    });
    group.bench_function("unflatten", |b| {
        b.iter(|| unflatten(black_box(rows.clone())).unwrap());
    });

    group.finish();
    log_group_end(group_name);
}

fn bench_snapshot(c: &mut Criterion) {
    init_bench_logging();
    let group_name = "storage/snapshot";
    log_group_start(group_name);
    let mut group = c.benchmark_group(group_name);

    let tree = build_tree(&create_results(1_000));

    group.bench_function("save_load", |b| {
        let bench_name = "storage/snapshot/save_load";
        let bench_start = log_bench_start(bench_name);
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("bench.db");
        let mut storage = ReportStorage::open(&db_path).unwrap();

        b.iter(|| {
            storage.save_tree(black_box(&tree)).unwrap();
            storage.load_tree().unwrap()
        });
        log_bench_end(bench_name, bench_start);
    });

    group.finish();
    log_group_end(group_name);
}

criterion_group!(tree_benches, bench_build, bench_reuse, bench_merge);

criterion_group!(storage_benches, bench_flatten, bench_snapshot);

criterion_main!(tree_benches, storage_benches);
