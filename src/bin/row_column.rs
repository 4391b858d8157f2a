//! Symmetry check and transpose with row and column chunks moved through strided layouts.
//!
//! Usage: `transpose-row-column EXPONENT [REPETITIONS] [-p WORKERS]`

use collective_transpose::cli::run_cli;
use collective_transpose::strategy::StrategyKind;

fn main() {
    std::process::exit(run_cli(StrategyKind::RowColumn));
}
