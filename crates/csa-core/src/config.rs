//! Engine configuration
//!
//! Two knobs, both with a default of 10:
//! - `dispatch_pool_size` bounds how many contingency tasks are in
//!   flight at once (the submission side);
//! - `max_variants` is the hard ceiling on concurrently leased variant
//!   copies (the memory side).
//!
//! Both can be overridden through a module/property keyed
//! [`ConfigLookup`], the way an embedding platform exposes its own
//! configuration store.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Configuration module name consulted by [`AnalysisConfig::from_lookup`]
pub const CONFIG_MODULE: &str = "contingency-analysis";

const DISPATCH_POOL_SIZE_KEY: &str = "dispatch-pool-size";
const MAX_VARIANTS_KEY: &str = "max-variants-per-analysis";

const DEFAULT_DISPATCH_POOL_SIZE: usize = 10;
const DEFAULT_MAX_VARIANTS: usize = 10;

/// String-keyed configuration lookup provided by the embedding application
pub trait ConfigLookup {
    /// Integer property of a module, if configured
    fn int_property(&self, module: &str, property: &str) -> Option<i64>;
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Bound on concurrently in-flight contingency tasks
    pub dispatch_pool_size: usize,
    /// Hard ceiling on concurrently leased variant copies
    pub max_variants: usize,
}

impl AnalysisConfig {
    /// Configuration with the defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With dispatch pool size
    #[inline]
    #[must_use]
    pub fn with_dispatch_pool_size(mut self, size: usize) -> Self {
        self.dispatch_pool_size = size;
        self
    }

    /// With variant ceiling
    #[inline]
    #[must_use]
    pub fn with_max_variants(mut self, max: usize) -> Self {
        self.max_variants = max;
        self
    }

    /// Read the configuration from a lookup, falling back to the defaults
    /// for absent properties.
    ///
    /// # Errors
    /// `AnalysisError::Config` when a configured value is not positive.
    pub fn from_lookup(lookup: &dyn ConfigLookup) -> Result<Self, AnalysisError> {
        let dispatch_pool_size = read_positive(
            lookup,
            DISPATCH_POOL_SIZE_KEY,
            DEFAULT_DISPATCH_POOL_SIZE,
        )?;
        let max_variants = read_positive(lookup, MAX_VARIANTS_KEY, DEFAULT_MAX_VARIANTS)?;
        Ok(Self {
            dispatch_pool_size,
            max_variants,
        })
    }

    /// Number of variant copies for one run:
    /// `min(max_variants, available_parallelism, max(1, contingency_count))`,
    /// never below 1.
    #[inline]
    #[must_use]
    pub fn worker_count(&self, available_parallelism: usize, contingency_count: usize) -> usize {
        self.max_variants
            .min(available_parallelism)
            .min(contingency_count.max(1))
            .max(1)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dispatch_pool_size: DEFAULT_DISPATCH_POOL_SIZE,
            max_variants: DEFAULT_MAX_VARIANTS,
        }
    }
}

fn read_positive(
    lookup: &dyn ConfigLookup,
    property: &str,
    default: usize,
) -> Result<usize, AnalysisError> {
    match lookup.int_property(CONFIG_MODULE, property) {
        None => Ok(default),
        Some(value) if value > 0 => Ok(value as usize),
        Some(value) => Err(AnalysisError::Config(format!(
            "{CONFIG_MODULE}.{property} must be positive, got {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLookup(HashMap<(&'static str, &'static str), i64>);

    impl ConfigLookup for MapLookup {
        fn int_property(&self, module: &str, property: &str) -> Option<i64> {
            self.0
                .iter()
                .find(|((m, p), _)| *m == module && *p == property)
                .map(|(_, v)| *v)
        }
    }

    #[test]
    fn defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.dispatch_pool_size, 10);
        assert_eq!(config.max_variants, 10);
    }

    #[test]
    fn from_lookup_overrides() {
        let lookup = MapLookup(HashMap::from([
            ((CONFIG_MODULE, "dispatch-pool-size"), 4),
            ((CONFIG_MODULE, "max-variants-per-analysis"), 6),
        ]));
        let config = AnalysisConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.dispatch_pool_size, 4);
        assert_eq!(config.max_variants, 6);
    }

    #[test]
    fn from_lookup_falls_back_to_defaults() {
        let lookup = MapLookup(HashMap::new());
        let config = AnalysisConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn from_lookup_rejects_non_positive() {
        let lookup = MapLookup(HashMap::from([((CONFIG_MODULE, "max-variants-per-analysis"), 0)]));
        let err = AnalysisConfig::from_lookup(&lookup).unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn worker_count_formula() {
        let config = AnalysisConfig::new().with_max_variants(2);
        // Ceiling wins
        assert_eq!(config.worker_count(8, 5), 2);
        // Parallelism wins
        assert_eq!(AnalysisConfig::new().worker_count(3, 5), 3);
        // Contingency count wins
        assert_eq!(AnalysisConfig::new().worker_count(8, 2), 2);
        // Never below 1
        assert_eq!(AnalysisConfig::new().worker_count(0, 0), 1);
    }
}
