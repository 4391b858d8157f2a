//! Symmetry check and transpose on square tiles, each transposed in place by its owner.
//!
//! Usage: `transpose-tiled EXPONENT [REPETITIONS] [-p WORKERS]`

use collective_transpose::cli::run_cli;
use collective_transpose::strategy::StrategyKind;

fn main() {
    std::process::exit(run_cli(StrategyKind::Tiled));
}
