//! Results file: one comma-separated record per completed run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Default results file, appended to in the working directory.
pub const RESULTS_FILE: &str = "results_mpi.csv";

/// Written once, when the file is created.
pub const HEADER: &str =
    "code,n,processes,time1message,time1effective,time2message,time2effective";

/// One run: mean time per repetition of each phase, with message passing
/// included (`*_mean`) and excluded (`*_excl_comm`).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub code: String,
    pub n: usize,
    pub workers: usize,
    pub t1_mean: f64,
    pub t1_excl_comm: f64,
    pub t2_mean: f64,
    pub t2_excl_comm: f64,
}

impl ResultRecord {
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{:.9},{:.9},{:.9},{:.9}",
            self.code,
            self.n,
            self.workers,
            self.t1_mean,
            self.t1_excl_comm,
            self.t2_mean,
            self.t2_excl_comm
        )
    }

    /// Append this record to `path`, creating the file with a header if needed.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let persistence = |source| Error::Persistence {
            path: path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(persistence)?;
        let empty = file.metadata().map_err(persistence)?.len() == 0;
        if empty {
            writeln!(file, "{HEADER}").map_err(persistence)?;
        }
        writeln!(file, "{}", self.to_csv_line()).map_err(persistence)?;
        Ok(())
    }
}

/// Bytes read plus bytes written by one n×n transpose, in GB/s.
pub fn transpose_bandwidth(n: usize, seconds: f64) -> f64 {
    let bytes = 2.0 * (n * n * std::mem::size_of::<f64>()) as f64;
    bytes / seconds / 1e9
}

/// Comparisons below the diagonal per second, in billions.
pub fn symmetry_gflops(n: usize, seconds: f64) -> f64 {
    let ops = ((n * n / 2) as f64 - n as f64).max(0.0);
    ops / seconds / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ResultRecord {
        ResultRecord {
            code: "MC".into(),
            n: 4,
            workers: 2,
            t1_mean: 0.5,
            t1_excl_comm: 0.25,
            t2_mean: 1.0 / 3.0,
            t2_excl_comm: 0.0,
        }
    }

    #[test]
    fn line_uses_nine_decimals() {
        assert_eq!(
            record().to_csv_line(),
            "MC,4,2,0.500000000,0.250000000,0.333333333,0.000000000"
        );
    }

    #[test]
    fn appends_after_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        record().append_to(&path).unwrap();
        record().append_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn unwritable_path_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("results.csv");
        let err = record().append_to(&path).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn bandwidth_counts_read_and_write() {
        // 2 * 1024 * 1024 * 8 bytes in one second.
        let gbs = transpose_bandwidth(1024, 1.0);
        assert!((gbs - 0.016777216).abs() < 1e-12);
        assert_eq!(symmetry_gflops(2, 1.0), 0.0);
    }
}
