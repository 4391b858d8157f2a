//! Error taxonomy shared by every worker.
//!
//! Configuration and environment failures are decided identically on every
//! worker from locally derivable inputs, so all of them abort together without
//! an extra round of communication.

use thiserror::Error;

use crate::fabric::Collective;
use crate::layout::LayoutError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required command-line argument is missing or malformed.
    #[error("usage: {0}")]
    Usage(String),

    /// The run cannot proceed with the requested dimensions.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The message-passing runtime is missing or failed to start.
    #[error("message-passing runtime unavailable: {0}")]
    Environment(String),

    /// A worker could not allocate a buffer of the given element count.
    #[error("rank {rank}: failed to allocate {elements} elements for {what}")]
    Allocation {
        rank: usize,
        elements: usize,
        what: &'static str,
    },

    /// The results file could not be opened or written.
    #[error("could not persist results to {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A peer abandoned the run while this worker waited on a collective.
    #[error("run aborted by rank {rank}: {reason}")]
    Aborted { rank: usize, reason: String },

    /// Workers entered different collectives in the same round.
    #[error("rank {rank} entered {local:?} while rank {peer} entered {remote:?}")]
    CollectiveMismatch {
        rank: usize,
        local: Collective,
        peer: usize,
        remote: Collective,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl Error {
    /// Process exit status for this error: `1` for usage errors, `-1` otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 1,
            _ => -1,
        }
    }

    /// Whether the run must stop. Persistence failures are reported and the run continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Persistence { .. })
    }
}

/// Allocate a zeroed buffer, reporting failure instead of aborting the process.
pub(crate) fn try_zeroed(rank: usize, elements: usize, what: &'static str) -> Result<Vec<f64>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(elements)
        .map_err(|_| Error::Allocation {
            rank,
            elements,
            what,
        })?;
    buf.resize(elements, 0.0);
    Ok(buf)
}
