//! Criterion benchmarks for page and pool allocation paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pagepool::{Page, Pool, PoolConfig};

const PAGE_SIZE: usize = 64 * 1024;
const ALIGN: usize = 16;

fn bench_page(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![16, 64, 256, 1024];

    let mut group = c.benchmark_group("PageOccupyRelease");
    for &bytes in &sizes {
        group.bench_with_input(BenchmarkId::from_parameter(bytes), &bytes, |b, &bytes| {
            let mut page = Page::<PAGE_SIZE, ALIGN>::new();
            b.iter(|| {
                let ptr = page.try_occupy::<u8>(black_box(bytes)).unwrap();
                assert!(page.release(ptr, bytes));
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("PageFragmentedFit");
    group.bench_function("half_occupied", |b| {
        let mut page = Page::<PAGE_SIZE, ALIGN>::new();
        let blocks: Vec<_> = std::iter::from_fn(|| page.try_occupy::<u8>(ALIGN)).collect();
        for block in blocks.iter().step_by(2) {
            page.release(*block, ALIGN);
        }
        b.iter(|| page.fit::<u8>(black_box(2 * ALIGN)));
    });
    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let pool = Pool::<PAGE_SIZE, ALIGN>::with_config(PoolConfig::manual().with_initial_pages(8))
        .expect("valid config");

    let mut group = c.benchmark_group("PoolOccupyRelease");
    for &bytes in &[16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(bytes), &bytes, |b, &bytes| {
            b.iter(|| {
                let ptr = pool.occupy::<u8>(black_box(bytes)).unwrap();
                assert!(pool.release(ptr, bytes));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_page, bench_pool);
criterion_main!(benches);
