//! CSA Core - contingency analysis orchestration engine
//!
//! Runs an expensive deterministic computation once on a base case, then
//! re-runs it once per contingency on isolated copies of the network
//! state, bounded by a lease pool of reusable variants:
//! - Stage 1: base-case computation, violation scan and monitoring
//! - Stage 2: bounded fan-out, one leased variant per in-flight contingency
//! - Guaranteed teardown of every temporary variant
//! - Concurrent aggregation into an immutable report
//!
//! # Example
//!
//! ```rust,ignore
//! use csa_core::{AnalysisConfig, ContingencyAnalysis};
//! use csa_model::{SolverParameters, VariantId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ContingencyAnalysis::new(network, solver, detector, collector)
//!     .with_config(AnalysisConfig::new().with_max_variants(4));
//!
//! let report = engine
//!     .run(&VariantId::new("base"), &SolverParameters::new(), &provider)
//!     .await?;
//!
//! println!("{} contingencies evaluated", report.post_contingency().len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod analysis;
pub mod config;
pub mod error;
pub mod pool;
pub mod result;

// Re-exports for convenience
pub use analysis::ContingencyAnalysis;
pub use config::{AnalysisConfig, ConfigLookup, CONFIG_MODULE};
pub use error::{AnalysisError, PoolError};
pub use pool::{VariantLease, VariantLeasePool};
pub use result::{
    AnalysisReport, Interceptor, PostContingencyOutcome, PreContingencyOutcome, ReportBuilder,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with CSA Core
    pub use crate::{
        AnalysisConfig, AnalysisError, AnalysisReport, ContingencyAnalysis, ReportBuilder,
        VariantLeasePool,
    };
    pub use csa_model::{
        ComputationStatus, ContingenciesProvider, Contingency, SolverParameters, VariantId,
        VariantStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
