//! # swarm-assign - Vehicle to Mission Slot Assignment
//!
//! Matches a swarm of vehicles to planned mission slots and runs the heavy
//! lifting on a bounded pool of background threads.
//!
//! ## Features
//!
//! - Optimal (Hungarian) and greedy matching over a cost matrix, with an
//!   optional cost threshold
//! - Point assignment with pluggable distances (Euclidean, geodetic)
//! - Show specification decoding and show coordinate frame fitting
//! - Worker pool with typed, awaitable task handles
//!
//! ## Example
//!
//! ```rust
//! use swarm_assign::{solve_assignment, CostMatrix, MatchingOptions, PoolConfig, WorkerPool};
//!
//! let matrix = CostMatrix::from_rows(&[[5.0, 1.0], [2.0, 8.0]]);
//! let assignment = solve_assignment(&matrix, &MatchingOptions::greedy()).unwrap();
//! assert_eq!(assignment.pairs(), &[(0, 1), (1, 0)]);
//!
//! // Same call on a worker thread
//! let pool = WorkerPool::new(PoolConfig::new(2)).unwrap();
//! let handle = pool.solve_assignment_async(matrix, MatchingOptions::greedy());
//! assert_eq!(handle.wait().unwrap(), assignment);
//! ```

// Internal modules (port of scipy's linear_sum_assignment)
pub(crate) mod internal;

// Public modules
pub mod cancel;
pub mod matching;
pub mod distances;
pub mod assignment;
pub mod show;
pub mod coordinate_frame;
pub mod worker;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use matching::{
    solve_assignment, Assignment, CostMatrix, MatchingAlgorithm, MatchingOptions,
};
pub use distances::{distance_matrix, metric_by_name, Distance, DistanceMetric, Point};
pub use assignment::assign_points;
pub use show::{decode_show_archive, DecodeOptions, ShowArchive};
pub use coordinate_frame::{
    fit_show_coordinate_frame, CoordinateFrame, CoordinateTransformation, Handedness,
};
pub use worker::{
    PoolConfig, PoolStats, TaskCall, TaskHandle, TaskOutput, TaskState, WorkerFunction,
    WorkerPool,
};

// Error types
pub use crate::error::{Error, ErrorKind, Result};

mod error {
    use std::time::Duration;

    use thiserror::Error;

    /// Errors that can occur in the swarm-assign library
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid cost matrix: {0}")]
        InvalidMatrix(String),

        #[error("Unknown matching algorithm: {0}")]
        UnknownAlgorithm(String),

        #[error("Unknown distance metric: {0}")]
        UnknownMetric(String),

        #[error("Unknown worker function: {0}")]
        UnknownFunction(String),

        #[error("Invalid arguments: {0}")]
        InvalidArguments(String),

        #[error("Assignment solver failed: {0}")]
        SolverFailure(String),

        #[error("Cannot decode show archive: {0}")]
        ShowDecode(String),

        #[error("Worker panicked: {0}")]
        WorkerPanicked(String),

        #[error("Task result is no longer available")]
        WorkerLost,

        #[error("Unexpected task output: expected {expected}, got {got}")]
        UnexpectedOutput {
            expected: &'static str,
            got: &'static str,
        },

        #[error("Task was cancelled")]
        Cancelled,

        #[error("Timed out after {0:?}")]
        Timeout(Duration),

        #[error("Worker pool is shut down")]
        PoolClosed,

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }

    /// Coarse classification of [`Error`]s for callers deciding what to do next.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ErrorKind {
        /// The caller passed something invalid; retrying the same call fails again.
        ContractViolation,
        /// The computation itself failed.
        ComputationFailure,
        /// The caller cancelled or stopped waiting.
        Cancelled,
        /// The pool cannot take work.
        Unavailable,
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::InvalidConfig(_)
                | Error::InvalidMatrix(_)
                | Error::UnknownAlgorithm(_)
                | Error::UnknownMetric(_)
                | Error::UnknownFunction(_)
                | Error::InvalidArguments(_)
                | Error::UnexpectedOutput { .. } => ErrorKind::ContractViolation,
                Error::SolverFailure(_)
                | Error::ShowDecode(_)
                | Error::WorkerPanicked(_)
                | Error::WorkerLost => ErrorKind::ComputationFailure,
                Error::Cancelled | Error::Timeout(_) => ErrorKind::Cancelled,
                Error::PoolClosed | Error::Io(_) => ErrorKind::Unavailable,
            }
        }

        /// Whether resubmitting the same call may succeed. Nothing is retried internally.
        pub fn is_retryable(&self) -> bool {
            self.kind() == ErrorKind::ComputationFailure
        }
    }

    /// Result type for swarm-assign operations
    pub type Result<T> = std::result::Result<T, Error>;

}
