//! Error types for CSA Core
//!
//! Two failure families are kept strictly apart:
//! - business non-convergence is *data* (a failed outcome in the report)
//!   and never surfaces here;
//! - collaborator failures (store, solver, modification) and engine
//!   faults are errors that fail the run, after cleanup has executed.

use csa_model::{SolverError, StoreError};

/// Lease pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool was torn down while a task waited for a lease.
    /// Fatal for that one task only.
    #[error("lease pool closed")]
    Closed,
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Variant store operation failed
    #[error("variant store error: {0}")]
    Store(#[from] StoreError),

    /// Solver collaborator failed (distinct from non-convergence)
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    /// Lease pool failure
    #[error("lease pool error: {0}")]
    Pool(#[from] PoolError),

    /// A contingency task failed with a collaborator error
    #[error("contingency '{id}' failed: {source}")]
    ContingencyTask {
        /// Id of the failed contingency
        id: String,
        /// The underlying failure
        #[source]
        source: Box<AnalysisError>,
    },

    /// A spawned contingency task panicked
    #[error("contingency task panicked: {0}")]
    TaskPanicked(String),

    /// Two tasks tried to record an outcome for the same contingency id
    #[error("duplicate outcome for contingency '{0}'")]
    DuplicateOutcome(String),

    /// `build()` called before the pre-contingency outcome was recorded
    #[error("pre-contingency outcome not recorded")]
    MissingPreContingency,
}

impl AnalysisError {
    /// Wrap an error as the failure of one named contingency task
    #[inline]
    #[must_use]
    pub fn for_contingency(id: impl Into<String>, source: AnalysisError) -> Self {
        Self::ContingencyTask {
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// True when the failure came from an external collaborator rather
    /// than the engine itself
    #[inline]
    #[must_use]
    pub fn is_collaborator_failure(&self) -> bool {
        match self {
            Self::Store(_) | Self::Solver(_) => true,
            Self::ContingencyTask { source, .. } => source.is_collaborator_failure(),
            _ => false,
        }
    }
}
