//! The computation (solver) contract
//!
//! The solver is the expensive deterministic computation evaluated once
//! for the base case and once per contingency. Non-convergence is an
//! ordinary outcome, not an error: `Ok(outcome)` with
//! `outcome.is_converged() == false` means the computation ran and did
//! not converge, while `Err(_)` means the collaborator itself failed.

use crate::variant::VariantId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Convergence status of one computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputationStatus {
    /// The computation converged; violations and readings are meaningful
    Converged,
    /// The computation did not converge; no state to scan
    Failed,
}

/// Parameters handed to the solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParameters {
    /// Iteration budget
    pub max_iterations: u32,
    /// Convergence tolerance
    pub tolerance: f64,
    /// Start from the previous solution instead of a flat start.
    /// Post-contingency computations set this so each one starts from the
    /// base-case state variables.
    pub start_from_previous_values: bool,
}

impl SolverParameters {
    /// Parameters with the defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With iteration budget
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// With previous-values start
    #[inline]
    #[must_use]
    pub fn with_previous_values_start(mut self, enabled: bool) -> Self {
        self.start_from_previous_values = enabled;
        self
    }
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-6,
            start_from_previous_values: false,
        }
    }
}

/// Result of one computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    converged: bool,
    iteration_count: u32,
}

impl SolverOutcome {
    /// A converged outcome
    #[inline]
    #[must_use]
    pub fn converged(iteration_count: u32) -> Self {
        Self {
            converged: true,
            iteration_count,
        }
    }

    /// A non-converged outcome
    #[inline]
    #[must_use]
    pub fn diverged(iteration_count: u32) -> Self {
        Self {
            converged: false,
            iteration_count,
        }
    }

    /// Whether the computation converged
    #[inline]
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Iterations spent
    #[inline]
    #[must_use]
    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// Status tag for result building
    #[inline]
    #[must_use]
    pub fn status(&self) -> ComputationStatus {
        if self.converged {
            ComputationStatus::Converged
        } else {
            ComputationStatus::Failed
        }
    }
}

/// Solver errors (collaborator failures, not business non-convergence)
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// The solver failed to run at all
    #[error("solver failed: {0}")]
    Failed(String),

    /// Opaque collaborator error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The expensive deterministic computation.
///
/// Implementations may be invoked many times concurrently on *different*
/// variants of the same network; the engine never runs two computations
/// on the same variant at once.
#[async_trait]
pub trait Solver<N>: Send + Sync {
    /// Run the computation on `variant` of `network`
    async fn solve(
        &self,
        network: &N,
        variant: &VariantId,
        params: &SolverParameters,
    ) -> Result<SolverOutcome, SolverError>;
}
