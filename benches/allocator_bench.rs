use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use memglass::{Config, Guarded, Locked, Session};
use tempfile::TempDir;

fn bench_bump_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("RegionManager");

    for size in [64usize, 256, 1024, 4096].iter() {
        group.bench_with_input(BenchmarkId::new("allocate", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let config = Config::default()
                        .with_base_dir(dir.path())
                        .with_header_size(64 * 1024)
                        .with_header_capacities(8, 64, 16)
                        .with_initial_region_size(4 * 1024 * 1024)
                        .with_max_region_size(64 * 1024 * 1024);
                    let session = Session::create("bench", config).unwrap();
                    (dir, session)
                },
                |(_dir, session)| {
                    for _ in 0..100 {
                        let _ = session.allocate_raw(size, 8).unwrap();
                    }
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_seqlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("Guarded");

    #[derive(Clone, Copy)]
    #[repr(C)]
    struct Payload {
        values: [u64; 4],
    }

    group.bench_function("write", |b| {
        let cell = Guarded::new(Payload { values: [0; 4] });
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            cell.write(Payload { values: [n; 4] });
        });
    });

    group.bench_function("read", |b| {
        let cell = Guarded::new(Payload { values: [7; 4] });
        b.iter(|| {
            let payload = cell.read();
            criterion::black_box(payload.values[0])
        });
    });

    group.finish();
}

fn bench_locked(c: &mut Criterion) {
    let mut group = c.benchmark_group("Locked");

    group.bench_function("update", |b| {
        let cell = Locked::new(0u64);
        b.iter(|| cell.update(|v| *v += 1));
    });

    group.finish();
}

fn bench_type_id(c: &mut Criterion) {
    c.bench_function("stable_type_id", |b| {
        b.iter(|| memglass::stable_type_id(criterion::black_box("market::data::Quote")))
    });
}

criterion_group!(
    benches,
    bench_bump_allocation,
    bench_seqlock,
    bench_locked,
    bench_type_id
);
criterion_main!(benches);
