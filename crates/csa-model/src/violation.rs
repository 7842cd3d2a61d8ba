//! Constraint violations, filtering and detection
//!
//! A violation records one operating constraint exceeded in a computed
//! state: which element, which kind of limit, the limit itself and the
//! observed value. Detection enumerates the violations of one variant;
//! filtering trims the detected set before it is frozen into a result.

use crate::variant::VariantId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of operating limit that was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Current above a loading limit
    Current,
    /// Voltage below its lower bound
    LowVoltage,
    /// Voltage above its upper bound
    HighVoltage,
    /// Voltage angle difference outside its bounds
    VoltageAngle,
}

/// Side of a multi-terminal element a violation is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchSide {
    One,
    Two,
    Three,
}

/// One detected constraint violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Id of the violated element
    pub subject_id: String,
    /// Optional human-readable element name
    pub subject_name: Option<String>,
    /// Kind of limit exceeded
    pub kind: ViolationKind,
    /// The limit value
    pub limit: f64,
    /// Optional name of the limit (permanent, "10'", ...)
    pub limit_name: Option<String>,
    /// Duration in seconds the violation is acceptable, `u64::MAX` for permanent limits
    pub acceptable_duration: u64,
    /// Reduction coefficient applied to the limit before comparison
    pub limit_reduction: f64,
    /// The observed value
    pub value: f64,
    /// Side of the element, when meaningful
    pub side: Option<BranchSide>,
    /// Nominal voltage of the subject's voltage level, used for filtering
    pub nominal_voltage: Option<f64>,
}

impl Violation {
    /// Create a violation with the mandatory fields
    #[inline]
    #[must_use]
    pub fn new(subject_id: impl Into<String>, kind: ViolationKind, limit: f64, value: f64) -> Self {
        Self {
            subject_id: subject_id.into(),
            subject_name: None,
            kind,
            limit,
            limit_name: None,
            acceptable_duration: u64::MAX,
            limit_reduction: 1.0,
            value,
            side: None,
            nominal_voltage: None,
        }
    }

    /// With subject name
    #[inline]
    #[must_use]
    pub fn with_subject_name(mut self, name: impl Into<String>) -> Self {
        self.subject_name = Some(name.into());
        self
    }

    /// With limit name and acceptable duration
    #[inline]
    #[must_use]
    pub fn with_limit_name(mut self, name: impl Into<String>, acceptable_duration: u64) -> Self {
        self.limit_name = Some(name.into());
        self.acceptable_duration = acceptable_duration;
        self
    }

    /// With limit reduction coefficient
    #[inline]
    #[must_use]
    pub fn with_limit_reduction(mut self, reduction: f64) -> Self {
        self.limit_reduction = reduction;
        self
    }

    /// With element side
    #[inline]
    #[must_use]
    pub fn with_side(mut self, side: BranchSide) -> Self {
        self.side = Some(side);
        self
    }

    /// With the subject's nominal voltage
    #[inline]
    #[must_use]
    pub fn with_nominal_voltage(mut self, nominal_voltage: f64) -> Self {
        self.nominal_voltage = Some(nominal_voltage);
        self
    }
}

/// Filter applied to detected violations before a result is frozen.
///
/// An empty filter keeps everything. Kinds not in the retained set are
/// dropped, as are violations on voltage levels below the nominal-voltage
/// floor (violations without a known nominal voltage are always kept).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationFilter {
    kinds: Option<HashSet<ViolationKind>>,
    min_nominal_voltage: Option<f64>,
}

impl ViolationFilter {
    /// Filter that keeps every violation
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain only the given kinds
    #[inline]
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ViolationKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Drop violations on voltage levels below `floor` kV
    #[inline]
    #[must_use]
    pub fn with_min_nominal_voltage(mut self, floor: f64) -> Self {
        self.min_nominal_voltage = Some(floor);
        self
    }

    /// Apply the filter, preserving order
    #[must_use]
    pub fn apply(&self, violations: Vec<Violation>) -> Vec<Violation> {
        violations
            .into_iter()
            .filter(|v| self.accepts(v))
            .collect()
    }

    fn accepts(&self, violation: &Violation) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&violation.kind) {
                return false;
            }
        }
        match (self.min_nominal_voltage, violation.nominal_voltage) {
            (Some(floor), Some(nominal)) => nominal >= floor,
            _ => true,
        }
    }
}

/// Enumerates the constraint violations of one computed variant.
///
/// Detection is synchronous and read-only; it returns a finite sequence
/// of violation records rather than pushing through a callback, so the
/// caller can append them to its own per-contingency result slot.
pub trait ViolationDetector<N>: Send + Sync {
    /// Violations of the base-case state in `variant`
    fn check_all(&self, network: &N, variant: &VariantId) -> Vec<Violation>;

    /// Violations of a post-contingency state in `variant`.
    ///
    /// The default ignores the contingency id, like the default detector
    /// of the base-case scan.
    fn check_all_post(
        &self,
        _contingency_id: &str,
        network: &N,
        variant: &VariantId,
    ) -> Vec<Violation> {
        self.check_all(network, variant)
    }
}
