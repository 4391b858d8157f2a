//! Benchmark runner comparing the three strategies on the local fabric.

use anyhow::{Context, Result, bail};
use clap::Parser;
use collective_transpose::coordinator::{RunConfig, RunReport, run_worker};
use collective_transpose::matrix::{random_matrix, transpose_blocked};
use collective_transpose::results::transpose_bandwidth;
use collective_transpose::strategy::{DEFAULT_TILE, ROOT, StrategyKind};
use collective_transpose::LocalWorld;
use std::time::Instant;

/// Compare every strategy across several matrix sizes
#[derive(Parser, Debug)]
#[command(name = "transpose-bench", version)]
struct Args {
    /// Matrix sizes as exponents of 2
    #[arg(short, long, value_delimiter = ',', default_values_t = [6u32, 8, 10])]
    exponents: Vec<u32>,

    /// Repetitions of each timed phase
    #[arg(short, long, default_value_t = 20)]
    repetitions: usize,

    /// Number of local workers
    #[arg(short = 'p', long, default_value_t = 4)]
    workers: usize,

    /// Tile side for the block-tiled strategy
    #[arg(short, long, default_value_t = DEFAULT_TILE)]
    tile: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.exponents.is_empty() {
        bail!("no matrix sizes given");
    }

    println!("=== Distributed Transpose Benchmark ===\n");
    println!("Workers: {}, repetitions: {}\n", args.workers, args.repetitions);

    let mut all_results = Vec::new();

    for &exponent in &args.exponents {
        let config = RunConfig::new(exponent, args.repetitions).with_tile(args.tile);
        let n = config.n();
        println!("Matrix: {}×{}", n, n);
        println!("{}", "-".repeat(70));

        let mut results: Vec<(&str, (f64, f64))> = vec![(
            "Sequential blocked",
            bench_sequential(n, args.repetitions),
        )];

        for kind in StrategyKind::ALL {
            let report = bench_strategy(kind, &config, args.workers)
                .with_context(|| format!("{kind} failed for n = {n}"))?;
            if !report.verdict.is_correct() {
                println!("   {kind}: incorrect result!");
            }
            results.push((
                kind.code(),
                (
                    report.timings.transpose_mean * 1000.0,
                    report.timings.transpose_compute * 1000.0,
                ),
            ));
        }

        let baseline_time = results[0].1.0;
        for (i, (name, (time_ms, compute_ms))) in results.iter().enumerate() {
            println!(
                "{}. {:20} {:10.4} ms  {:10.4} ms compute  {:8.3} GB/s  ({:.2}×)",
                i + 1,
                name,
                time_ms,
                compute_ms,
                transpose_bandwidth(n, time_ms / 1000.0),
                baseline_time / time_ms
            );
        }
        println!();

        all_results.push((n, results));
    }

    print_summary_table(&all_results);
    Ok(())
}

/// Mean milliseconds of the sequential blocked transpose, twice for the table's two columns.
fn bench_sequential(n: usize, iterations: usize) -> (f64, f64) {
    let m = random_matrix(n, Some(0));
    let mut t = vec![0.0; n * n];

    // Warmup
    transpose_blocked(&m, &mut t, n);

    let start = Instant::now();
    for _ in 0..iterations {
        transpose_blocked(&m, &mut t, n);
    }
    let avg = start.elapsed().as_secs_f64() / iterations.max(1) as f64;
    (avg * 1000.0, avg * 1000.0)
}

fn bench_strategy(kind: StrategyKind, config: &RunConfig, workers: usize) -> Result<RunReport> {
    let mut results = LocalWorld::new(workers)
        .run(|fabric| run_worker(fabric, kind, config))
        .into_iter();
    match results.nth(ROOT) {
        Some(Ok(Some(report))) => Ok(report),
        Some(Err(err)) => Err(err.into()),
        _ => bail!("root produced no report"),
    }
}

#[allow(clippy::type_complexity)]
fn print_summary_table(all_results: &[(usize, Vec<(&str, (f64, f64))>)]) {
    println!("\n{}", "=".repeat(90));
    println!("SUMMARY (transpose, message passing included)");
    println!("{}", "=".repeat(90));

    print!("\n{:<20}", "Method");
    for (n, _) in all_results {
        print!(" {:>16}", format!("{}×{}", n, n));
    }
    println!(" {:>12}", "Speedup");
    println!("{}", "-".repeat(90));

    let num_methods = all_results[0].1.len();

    for method_idx in 0..num_methods {
        let method_name = all_results[0].1[method_idx].0;

        let mut speedups = Vec::new();
        print!("{:<20}", method_name);
        for (n, results) in all_results {
            let (time_ms, _) = results[method_idx].1;
            let baseline_time = results[0].1.0;
            speedups.push(baseline_time / time_ms);
            print!(" {:>11.3} GB/s", transpose_bandwidth(*n, time_ms / 1000.0));
        }

        let avg_speedup: f64 = speedups.iter().sum::<f64>() / speedups.len() as f64;
        println!(" {:>11.2}×", avg_speedup);
    }

    println!("{}", "=".repeat(90));
    println!("\nM = replicated broadcast, MC = row/column layouts, MB = block-tiled");
    println!("Speedup relative to the sequential blocked transpose. Higher is better.\n");
}
