use collective_transpose::coordinator::{RunConfig, run_worker, run_worker_on};
use collective_transpose::fabric::{Fabric, ReduceOp};
use collective_transpose::matrix::{
    is_symmetric, random_matrix, sequence_matrix, symmetric_matrix, transpose_blocked,
};
use collective_transpose::strategy::ROOT;
use collective_transpose::verify::check_transpose_exact;
use collective_transpose::{
    Error, LocalWorld, StrategyKind, StridedLayout, is_symmetric_distributed,
    transpose_distributed, transpose_tiled,
};
use proptest::prelude::*;

fn assert_transposed(m: &[f64], t: &[f64], n: usize, name: &str) {
    assert_eq!(t.len(), n * n, "{}: length mismatch", name);
    for i in 0..n {
        for j in 0..n {
            assert_eq!(
                t[j * n + i].to_bits(),
                m[i * n + j].to_bits(),
                "{}: T[{}][{}] = {}, expected M[{}][{}] = {}",
                name,
                j,
                i,
                t[j * n + i],
                i,
                j,
                m[i * n + j]
            );
        }
    }
}

/// Every (n, workers) pair with n divisible by the worker count.
fn valid_shapes() -> Vec<(usize, usize)> {
    let mut shapes = Vec::new();
    for n in [2, 4, 8, 16] {
        for workers in [1, 2, 4] {
            if workers <= n {
                shapes.push((n, workers));
            }
        }
    }
    shapes
}

// ============================================================
// Symmetry check
// ============================================================

#[test]
fn test_symmetric_input_is_accepted() {
    for kind in StrategyKind::ALL {
        for (n, workers) in valid_shapes() {
            let m = symmetric_matrix(n, Some(7));
            let symmetric = is_symmetric_distributed(&m, n, workers, kind).unwrap();
            assert!(symmetric, "{kind}: n={n} P={workers} rejected a symmetric matrix");
        }
    }
}

#[test]
fn test_single_violation_in_each_partition() {
    for kind in StrategyKind::ALL {
        for (n, workers) in valid_shapes() {
            let chunk = n / workers;
            for rank in 0..workers {
                let row = rank * chunk + chunk - 1;
                let col = if row == 0 { 1 } else { 0 };

                let mut m = symmetric_matrix(n, Some(11));
                m[row * n + col] += 1.0;

                let symmetric = is_symmetric_distributed(&m, n, workers, kind).unwrap();
                assert!(
                    !symmetric,
                    "{kind}: n={n} P={workers} missed M[{row}][{col}] on rank {rank}"
                );
                assert_eq!(symmetric, is_symmetric(&m, n));
            }
        }
    }
}

#[test]
fn test_random_input_matches_sequential_check() {
    for kind in StrategyKind::ALL {
        let m = random_matrix(16, Some(3));
        assert_eq!(
            is_symmetric_distributed(&m, 16, 4, kind).unwrap(),
            is_symmetric(&m, 16)
        );
    }
}

// ============================================================
// Transpose
// ============================================================

#[test]
fn test_transpose_grid() {
    for kind in StrategyKind::ALL {
        for (n, workers) in valid_shapes() {
            let m = random_matrix(n, Some(n as u64));
            let mut t = vec![0.0; n * n];
            transpose_distributed(&m, &mut t, n, workers, kind).unwrap();
            assert_transposed(&m, &t, n, &format!("{kind} n={n} P={workers}"));
        }
    }
}

#[test]
fn test_transpose_matches_sequential() {
    let n = 64;
    let m = random_matrix(n, Some(5));
    let mut expected = vec![0.0; n * n];
    transpose_blocked(&m, &mut expected, n);

    for kind in StrategyKind::ALL {
        let mut t = vec![0.0; n * n];
        transpose_distributed(&m, &mut t, n, 4, kind).unwrap();
        assert_eq!(t, expected, "{kind}");
    }
}

#[test]
fn test_double_transpose_is_identity() {
    let n = 16;
    let m = random_matrix(n, Some(9));
    for kind in StrategyKind::ALL {
        let mut t = vec![0.0; n * n];
        let mut back = vec![0.0; n * n];
        transpose_distributed(&m, &mut t, n, 4, kind).unwrap();
        transpose_distributed(&t, &mut back, n, 4, kind).unwrap();
        assert_eq!(back, m, "{kind}");
    }
}

#[test]
fn test_tile_larger_than_chunk_degrades() {
    // n / P = 2 with a requested tile of 8.
    let (n, workers) = (8, 4);
    let m = sequence_matrix(n);
    let mut t = vec![0.0; n * n];
    transpose_tiled(&m, &mut t, n, workers, 8).unwrap();
    assert_transposed(&m, &t, n, "tile 8 on chunk 2");
}

#[test]
fn test_tile_sizes() {
    let n = 16;
    let m = random_matrix(n, Some(1));
    for (workers, tile) in [(1, 16), (1, 4), (2, 8), (2, 4), (4, 1), (4, 2), (4, 4)] {
        let mut t = vec![0.0; n * n];
        transpose_tiled(&m, &mut t, n, workers, tile).unwrap();
        assert_transposed(&m, &t, n, &format!("P={workers} tile={tile}"));
    }
}

#[test]
fn test_tile_not_dividing_chunk_is_rejected() {
    let n = 16;
    let m = random_matrix(n, Some(1));
    let mut t = vec![0.0; n * n];
    let err = transpose_tiled(&m, &mut t, n, 2, 3).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

// ============================================================
// Whole runs
// ============================================================

#[test]
fn test_sequence_matrix_run() {
    let config = RunConfig::new(2, 1).with_tile(2);
    let results = LocalWorld::new(2).run(|fabric| {
        let matrix = fabric.is_root(ROOT).then(|| sequence_matrix(4));
        run_worker_on(fabric, StrategyKind::Tiled, &config, matrix)
    });

    let report = results[ROOT].as_ref().unwrap().as_ref().unwrap();
    assert!(report.verdict.transposed);
    assert!(!report.verdict.symmetric);
    assert!(report.verdict.is_correct());
    assert_eq!(report.tile, Some(2));
    assert_eq!(report.transposed[1], 5.0);
    assert_eq!(report.transposed[4], 2.0);

    let record = report.record();
    assert_eq!(record.code, "MB");
    assert_eq!(record.n, 4);
    assert_eq!(record.workers, 2);

    assert!(matches!(results[1], Ok(None)));
}

#[test]
fn test_every_strategy_reports_correct_results() {
    let config = RunConfig::new(4, 3).with_seed(17);
    for kind in StrategyKind::ALL {
        let results = LocalWorld::new(4).run(|fabric| run_worker(fabric, kind, &config));
        let report = results[ROOT].as_ref().unwrap().as_ref().unwrap();
        assert!(report.verdict.is_correct(), "{kind}: {:?}", report.verdict);
        assert_eq!(report.n, 16);
        assert_eq!(report.repetitions, 3);
        assert!(report.timings.transpose_mean >= 0.0);
    }
}

#[test]
fn test_indivisible_dimension_stops_every_worker() {
    let config = RunConfig::new(2, 1);
    for kind in StrategyKind::ALL {
        let results = LocalWorld::new(3).run(|fabric| run_worker(fabric, kind, &config));
        assert_eq!(results.len(), 3);
        for result in results {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{kind}: {err}");
            assert_eq!(err.exit_code(), -1);
        }
    }
}

// ============================================================
// Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_reductions_ignore_order(mut values in prop::collection::vec(0.0f64..1e6, 1..16)) {
        let max = ReduceOp::Max.fold(values.iter().copied());
        let flags: Vec<f64> = values.iter().map(|v| f64::from(*v > 5e5)).collect();
        let all = ReduceOp::LogicalAnd.fold(flags.iter().copied());

        values.reverse();
        prop_assert_eq!(ReduceOp::Max.fold(values.iter().copied()), max);
        prop_assert_eq!(ReduceOp::LogicalAnd.fold(flags.iter().rev().copied()), all);
    }

    #[test]
    fn prop_unpack_restores_packed_elements(
        count in 1usize..6,
        len in 1usize..5,
        gap in 0usize..4,
        units in 1usize..4,
    ) {
        let layout = StridedLayout::vector(count, len, len + gap);
        let src: Vec<f64> = (0..layout.required_len(units)).map(|v| v as f64).collect();
        let packed = layout.pack(&src, units).unwrap();
        prop_assert_eq!(packed.len(), units * layout.elements());

        let mut dst = vec![-1.0; src.len()];
        layout.unpack(&packed, units, &mut dst).unwrap();
        for unit in 0..units {
            for offset in layout.offsets() {
                let at = unit * layout.extent() + offset;
                prop_assert_eq!(dst[at], src[at]);
            }
        }
    }

    #[test]
    fn prop_strategies_agree_on_transpose(exponent in 1u32..6, seed in any::<u64>()) {
        let n = 1usize << exponent;
        let workers = if n >= 4 { 4 } else { n };
        let m = random_matrix(n, Some(seed));
        for kind in StrategyKind::ALL {
            let mut t = vec![0.0; n * n];
            transpose_distributed(&m, &mut t, n, workers, kind).unwrap();
            prop_assert!(check_transpose_exact(&m, &t, n), "{}", kind);
        }
    }
}

#[test]
fn test_reduce_across_workers() {
    let results = LocalWorld::new(4).run(|fabric| {
        let max = fabric.reduce_max(fabric.rank() as f64, ROOT)?;
        let all = fabric.reduce_and(fabric.rank() != 2, ROOT)?;
        Ok((max, all))
    });
    assert_eq!(results[ROOT].as_ref().unwrap(), &(Some(3.0), Some(false)));
    for result in &results[1..] {
        assert_eq!(result.as_ref().unwrap(), &(None, None));
    }
}
