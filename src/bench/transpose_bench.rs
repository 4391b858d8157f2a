use collective_transpose::matrix::{random_matrix, transpose_blocked};
use collective_transpose::{StrategyKind, is_symmetric_distributed, transpose_distributed};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const WORKERS: usize = 4;

fn bench_transpose(c: &mut Criterion) {
    let mut group = c.benchmark_group("transpose");

    for n in [64, 256, 512] {
        let m = random_matrix(n, Some(42));
        let mut t = vec![0.0; n * n];
        group.throughput(Throughput::Bytes((2 * n * n * 8) as u64));

        group.bench_with_input(BenchmarkId::new("sequential_blocked", n), &n, |b, &n| {
            b.iter(|| transpose_blocked(black_box(&m), black_box(&mut t), n))
        });

        for kind in StrategyKind::ALL {
            group.bench_with_input(BenchmarkId::new(kind.code(), n), &n, |b, &n| {
                b.iter(|| {
                    transpose_distributed(black_box(&m), black_box(&mut t), n, WORKERS, kind)
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

fn bench_symmetry(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_symmetry");
    let n = 256;
    let m = random_matrix(n, Some(42));

    for kind in StrategyKind::ALL {
        group.bench_function(kind.code(), |b| {
            b.iter(|| is_symmetric_distributed(black_box(&m), n, WORKERS, kind).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transpose, bench_symmetry);
criterion_main!(benches);
