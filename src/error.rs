//! Unified error type for millcut public APIs.
//!
//! All fallible library entry points return [`PartitionError`]; the binary
//! maps it to a nonzero exit code. Refinement never surfaces errors for
//! rejected moves (those are recovered locally), so the variants here cover
//! argument validation, graph I/O, and broken structural invariants.

use thiserror::Error;

/// Unified error type for partitioning operations.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Bad command-line or configuration input (k < 2, imbalance out of range, ...).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The graph file could not be opened or read.
    #[error("cannot read graph file `{path}`: {source}")]
    GraphIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The graph file is syntactically or semantically malformed.
    #[error("malformed graph file `{path}` (line {line}): {reason}")]
    MalformedGraph {
        path: String,
        line: usize,
        reason: String,
    },

    /// A partition file did not match the graph it was applied to.
    #[error("malformed partition file `{path}` (line {line}): {reason}")]
    MalformedPartition {
        path: String,
        line: usize,
        reason: String,
    },

    /// Output could not be written.
    #[error("cannot write `{path}`: {source}")]
    OutputIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The graph builder ran past its preallocated edge capacity.
    #[error("graph builder overflow: {0} edges exceed the preallocated capacity")]
    BuilderOverflow(usize),

    /// A structural invariant was broken (boundary inconsistency, empty block,
    /// weight bound exceeded outside a speculative round).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl PartitionError {
    pub(crate) fn malformed_graph(
        path: impl Into<String>,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        PartitionError::MalformedGraph {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
