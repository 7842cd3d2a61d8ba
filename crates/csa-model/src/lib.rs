//! CSA Model - shared data model and collaborator contracts
//!
//! Defines the vocabulary of the contingency analysis engine:
//! - Network variants and the variant store contract
//! - Contingencies and their network modifications
//! - Constraint violations and violation detection
//! - State monitors and monitored-quantity collection
//! - The computation (solver) contract
//!
//! The engine in `csa-core` is generic over a network type `N`; everything
//! here that touches the network is either a trait the embedding
//! application implements for its own model, or a plain value type.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod contingency;
pub mod monitor;
pub mod solver;
pub mod variant;
pub mod violation;

// Re-exports for convenience
pub use contingency::{
    ContingenciesProvider, Contingency, ListContingenciesProvider, NetworkModification,
};
pub use monitor::{
    BranchReading, BusReading, MonitorCollector, MonitorIndex, MonitorReadings, MonitorScope,
    StateMonitor,
};
pub use solver::{ComputationStatus, Solver, SolverError, SolverOutcome, SolverParameters};
pub use variant::{StoreError, VariantId, VariantStore};
pub use violation::{BranchSide, Violation, ViolationDetector, ViolationFilter, ViolationKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
