//! Result aggregation
//!
//! Accumulates the base-case outcome and one outcome per contingency into
//! an immutable [`AnalysisReport`]. Concurrent writers are expected, one
//! per in-flight contingency task; each writes its own id's slot exactly
//! once. Violations pass through the [`ViolationFilter`] when an outcome
//! is frozen, and registered [`Interceptor`]s observe every frozen
//! outcome plus the final report.

use crate::error::AnalysisError;
use csa_model::{ComputationStatus, MonitorReadings, Violation, ViolationFilter};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of the base-case evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreContingencyOutcome {
    /// Convergence status
    pub status: ComputationStatus,
    /// Filtered violations; empty when the computation failed
    pub violations: Vec<Violation>,
    /// Monitored quantities; empty when the computation failed
    pub readings: MonitorReadings,
}

/// Outcome of one contingency evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContingencyOutcome {
    /// Id of the evaluated contingency
    pub contingency_id: String,
    /// Convergence status
    pub status: ComputationStatus,
    /// Filtered violations; empty when the computation failed
    pub violations: Vec<Violation>,
    /// Monitored quantities; empty when the computation failed
    pub readings: MonitorReadings,
}

/// Immutable result of one full analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pre_contingency: PreContingencyOutcome,
    post_contingency: Vec<PostContingencyOutcome>,
}

impl AnalysisReport {
    /// The base-case outcome
    #[inline]
    #[must_use]
    pub fn pre_contingency(&self) -> &PreContingencyOutcome {
        &self.pre_contingency
    }

    /// One outcome per evaluated contingency, sorted by id
    #[inline]
    #[must_use]
    pub fn post_contingency(&self) -> &[PostContingencyOutcome] {
        &self.post_contingency
    }

    /// Outcome of one contingency, by id
    #[must_use]
    pub fn find_post_contingency(&self, contingency_id: &str) -> Option<&PostContingencyOutcome> {
        self.post_contingency
            .iter()
            .find(|o| o.contingency_id == contingency_id)
    }
}

/// Observes outcomes as they are frozen into the report
pub trait Interceptor: Send + Sync {
    /// Called once when the base-case outcome is frozen
    fn on_pre_contingency(&self, _outcome: &PreContingencyOutcome) {}

    /// Called once per contingency when its outcome is frozen
    fn on_post_contingency(&self, _outcome: &PostContingencyOutcome) {}

    /// Called once with the final report
    fn on_report(&self, _report: &AnalysisReport) {}
}

/// Concurrent report accumulator.
///
/// The pre-contingency slot is written once by stage 1; the
/// per-contingency slots are keyed by id with a single writer per key.
#[derive(Default)]
pub struct ReportBuilder {
    filter: ViolationFilter,
    interceptors: Vec<Arc<dyn Interceptor>>,
    pre: Mutex<Option<PreContingencyOutcome>>,
    post: DashMap<String, PostContingencyOutcome>,
}

impl ReportBuilder {
    /// Create a builder with a violation filter and interceptors
    #[must_use]
    pub fn new(filter: ViolationFilter, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            filter,
            interceptors,
            pre: Mutex::new(None),
            post: DashMap::new(),
        }
    }

    /// Begin the base-case outcome
    #[must_use]
    pub fn pre_contingency(&self) -> PreContingencyBuilder<'_> {
        PreContingencyBuilder {
            parent: self,
            status: ComputationStatus::Converged,
            violations: Vec::new(),
            readings: MonitorReadings::default(),
        }
    }

    /// Begin the outcome of one contingency
    #[must_use]
    pub fn contingency(&self, contingency_id: &str) -> PostContingencyBuilder<'_> {
        PostContingencyBuilder {
            parent: self,
            contingency_id: contingency_id.to_string(),
            status: ComputationStatus::Converged,
            violations: Vec::new(),
            readings: MonitorReadings::default(),
        }
    }

    /// Freeze the report. Call only after every writer has finished.
    ///
    /// # Errors
    /// `AnalysisError::MissingPreContingency` when stage 1 never recorded
    /// its outcome.
    pub fn build(&self) -> Result<AnalysisReport, AnalysisError> {
        let pre_contingency = self
            .pre
            .lock()
            .take()
            .ok_or(AnalysisError::MissingPreContingency)?;

        let mut post_contingency: Vec<PostContingencyOutcome> = self
            .post
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        post_contingency.sort_by(|a, b| a.contingency_id.cmp(&b.contingency_id));

        let report = AnalysisReport {
            pre_contingency,
            post_contingency,
        };
        for interceptor in &self.interceptors {
            interceptor.on_report(&report);
        }
        Ok(report)
    }

    fn install_pre(&self, outcome: PreContingencyOutcome) {
        for interceptor in &self.interceptors {
            interceptor.on_pre_contingency(&outcome);
        }
        *self.pre.lock() = Some(outcome);
    }

    fn install_post(&self, outcome: PostContingencyOutcome) -> Result<(), AnalysisError> {
        use dashmap::mapref::entry::Entry;
        match self.post.entry(outcome.contingency_id.clone()) {
            Entry::Vacant(slot) => {
                // Observers only ever see outcomes the report keeps
                for interceptor in &self.interceptors {
                    interceptor.on_post_contingency(&outcome);
                }
                slot.insert(outcome);
                Ok(())
            }
            Entry::Occupied(_) => Err(AnalysisError::DuplicateOutcome(outcome.contingency_id)),
        }
    }
}

impl std::fmt::Debug for ReportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportBuilder")
            .field("pre_recorded", &self.pre.lock().is_some())
            .field("post_recorded", &self.post.len())
            .finish()
    }
}

/// Builder for the base-case outcome
#[derive(Debug)]
pub struct PreContingencyBuilder<'a> {
    parent: &'a ReportBuilder,
    status: ComputationStatus,
    violations: Vec<Violation>,
    readings: MonitorReadings,
}

impl PreContingencyBuilder<'_> {
    /// Set the convergence status
    #[inline]
    #[must_use]
    pub fn status(mut self, status: ComputationStatus) -> Self {
        self.status = status;
        self
    }

    /// Add one detected violation
    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Add detected violations
    pub fn add_violations(&mut self, violations: impl IntoIterator<Item = Violation>) {
        self.violations.extend(violations);
    }

    /// Add monitored-quantity readings
    pub fn add_readings(&mut self, readings: MonitorReadings) {
        self.readings.extend(readings);
    }

    /// Apply the violation filter and freeze the outcome
    pub fn finish(self) {
        let outcome = PreContingencyOutcome {
            status: self.status,
            violations: self.parent.filter.apply(self.violations),
            readings: self.readings,
        };
        self.parent.install_pre(outcome);
    }
}

/// Builder for one contingency's outcome
#[derive(Debug)]
pub struct PostContingencyBuilder<'a> {
    parent: &'a ReportBuilder,
    contingency_id: String,
    status: ComputationStatus,
    violations: Vec<Violation>,
    readings: MonitorReadings,
}

impl PostContingencyBuilder<'_> {
    /// Set the convergence status
    #[inline]
    #[must_use]
    pub fn status(mut self, status: ComputationStatus) -> Self {
        self.status = status;
        self
    }

    /// Add one detected violation
    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Add detected violations
    pub fn add_violations(&mut self, violations: impl IntoIterator<Item = Violation>) {
        self.violations.extend(violations);
    }

    /// Add monitored-quantity readings
    pub fn add_readings(&mut self, readings: MonitorReadings) {
        self.readings.extend(readings);
    }

    /// Apply the violation filter and freeze the outcome into its slot.
    ///
    /// # Errors
    /// `AnalysisError::DuplicateOutcome` when this id was already written.
    pub fn finish(self) -> Result<(), AnalysisError> {
        let outcome = PostContingencyOutcome {
            contingency_id: self.contingency_id,
            status: self.status,
            violations: self.parent.filter.apply(self.violations),
            readings: self.readings,
        };
        self.parent.install_post(outcome)
    }
}
