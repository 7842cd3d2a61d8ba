//! Network variants and the variant store contract
//!
//! A variant is a named, independently mutable snapshot of the shared
//! network model. The engine only ever talks to the store through
//! [`VariantStore`]; cloning, mutation isolation and removal are the
//! store's responsibility.

use serde::{Deserialize, Serialize};

/// Opaque name of one network variant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(String);

impl VariantId {
    /// Create a variant identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VariantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Variant store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Variant does not exist in the store
    #[error("unknown variant: {0}")]
    UnknownVariant(VariantId),

    /// Clone target already exists and overwrite was not requested
    #[error("variant already exists: {0}")]
    VariantExists(VariantId),

    /// Concurrent variant access attempted before being enabled
    #[error("multi-thread variant access is not enabled")]
    MultiThreadAccessDisabled,

    /// A network modification could not be applied
    #[error("modification failed: {0}")]
    ModificationFailed(String),
}

/// Contract of the shared, variant-based network model.
///
/// Implementations must guarantee that mutating one variant is invisible
/// to all other variants, and that concurrent use from multiple tasks on
/// *disjoint* variants is safe once [`allow_multi_thread_access`] has been
/// enabled. The engine never touches the same variant from two tasks at
/// once; the lease pool in `csa-core` enforces exclusive ownership.
///
/// [`allow_multi_thread_access`]: VariantStore::allow_multi_thread_access
pub trait VariantStore: Send + Sync {
    /// Clone `src` into `dst`. With `overwrite` set, an existing `dst` is
    /// discarded and replaced; otherwise an existing `dst` is an error.
    fn clone_variant(
        &self,
        src: &VariantId,
        dst: &VariantId,
        overwrite: bool,
    ) -> Result<(), StoreError>;

    /// Clone `src` into every id in `dsts` in one bulk operation.
    ///
    /// The default implementation clones one by one; stores that can do
    /// better (a single copy-on-write fork, say) should override it.
    fn clone_variants(&self, src: &VariantId, dsts: &[VariantId]) -> Result<(), StoreError> {
        for dst in dsts {
            self.clone_variant(src, dst, false)?;
        }
        Ok(())
    }

    /// Remove a variant and release its storage
    fn remove_variant(&self, id: &VariantId) -> Result<(), StoreError>;

    /// Enable or disable concurrent access to disjoint variants
    fn allow_multi_thread_access(&self, allow: bool);

    /// Hardware parallelism available to computations on this model
    fn available_parallelism(&self) -> usize;
}
