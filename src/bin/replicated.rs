//! Symmetry check and transpose with every worker receiving the whole matrix.
//!
//! Usage: `transpose-replicated EXPONENT [REPETITIONS] [-p WORKERS]`

use collective_transpose::cli::run_cli;
use collective_transpose::strategy::StrategyKind;

fn main() {
    std::process::exit(run_cli(StrategyKind::Replicated));
}
