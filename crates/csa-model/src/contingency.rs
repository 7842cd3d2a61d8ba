//! Contingencies and their network modifications
//!
//! A contingency is a named perturbation evaluated against the base case.
//! The perturbation itself is opaque to the engine: it is a
//! [`NetworkModification`] applied to one leased variant.

use crate::variant::{StoreError, VariantId};
use std::sync::Arc;

/// A perturbation applied to one network variant.
///
/// Implementations mutate only the variant they are given. The engine
/// guarantees it holds the only lease on that variant while `apply` runs.
pub trait NetworkModification<N>: Send + Sync {
    /// Apply this modification to `variant` of `network`
    fn apply(&self, network: &N, variant: &VariantId) -> Result<(), StoreError>;

    /// Human-readable name, for logging
    fn name(&self) -> &str {
        "network-modification"
    }
}

/// A named perturbation to evaluate against the base case.
///
/// Immutable once constructed; supplied once per run by the
/// [`ContingenciesProvider`] and read-only during the run.
pub struct Contingency<N> {
    id: String,
    modification: Arc<dyn NetworkModification<N>>,
}

impl<N> Contingency<N> {
    /// Create a contingency from its unique id and modification
    #[inline]
    pub fn new(id: impl Into<String>, modification: Arc<dyn NetworkModification<N>>) -> Self {
        Self {
            id: id.into(),
            modification,
        }
    }

    /// Unique contingency id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Apply this contingency's modification to `variant`
    pub fn apply(&self, network: &N, variant: &VariantId) -> Result<(), StoreError> {
        self.modification.apply(network, variant)
    }
}

impl<N> Clone for Contingency<N> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            modification: Arc::clone(&self.modification),
        }
    }
}

impl<N> std::fmt::Debug for Contingency<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contingency")
            .field("id", &self.id)
            .field("modification", &self.modification.name())
            .finish()
    }
}

/// Supplies the contingencies to evaluate for a given network.
///
/// The order of the returned list is irrelevant to the engine.
pub trait ContingenciesProvider<N>: Send + Sync {
    /// Contingencies to evaluate against `network`
    fn contingencies(&self, network: &N) -> Vec<Contingency<N>>;
}

/// Fixed list of contingencies, independent of the network
pub struct ListContingenciesProvider<N> {
    contingencies: Vec<Contingency<N>>,
}

impl<N> ListContingenciesProvider<N> {
    /// Create a provider over a fixed list
    #[inline]
    #[must_use]
    pub fn new(contingencies: Vec<Contingency<N>>) -> Self {
        Self { contingencies }
    }
}

impl<N> ContingenciesProvider<N> for ListContingenciesProvider<N>
where
    N: Send + Sync,
{
    fn contingencies(&self, _network: &N) -> Vec<Contingency<N>> {
        self.contingencies.clone()
    }
}
