//! Testing utilities for the CSA workspace
//!
//! Instrumented in-memory fakes for every collaborator contract. Each
//! fake counts the calls the analysis scenarios assert on: clone and
//! remove operations on the network, scan invocations on the detector,
//! and the concurrency high-water mark on the solver.

#![allow(missing_docs)]

use async_trait::async_trait;
use csa_model::{
    BranchReading, BusReading, Contingency, MonitorCollector, MonitorReadings, NetworkModification,
    Solver, SolverError, SolverOutcome, SolverParameters, StateMonitor, StoreError, VariantId,
    VariantStore, Violation, ViolationDetector, ViolationKind,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Quantities = HashMap<String, f64>;

/// In-memory variant store: each variant maps quantity keys to values.
///
/// Conventions used by the other fakes:
/// - `overload:<subject>` > 0 makes [`FakeDetector`] report a current
///   violation on `<subject>` with that value;
/// - `solver:diverge` > 0 makes [`FakeSolver`] report non-convergence;
/// - `solver:error` > 0 makes [`FakeSolver`] fail with an error;
/// - `p1:<branch>` / `v:<bus>` feed [`FakeCollector`] readings.
#[derive(Debug)]
pub struct FakeNetwork {
    variants: RwLock<HashMap<VariantId, Quantities>>,
    multi_thread: AtomicBool,
    parallelism: usize,
    fail_bulk_after: Option<usize>,
    clone_calls: AtomicUsize,
    bulk_clone_calls: AtomicUsize,
    last_bulk_size: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl FakeNetwork {
    /// Network with one empty variant named `base_variant`
    #[must_use]
    pub fn new(base_variant: &str) -> Self {
        let mut variants = HashMap::new();
        variants.insert(VariantId::new(base_variant), Quantities::new());
        Self {
            variants: RwLock::new(variants),
            multi_thread: AtomicBool::new(false),
            parallelism: 8,
            fail_bulk_after: None,
            clone_calls: AtomicUsize::new(0),
            bulk_clone_calls: AtomicUsize::new(0),
            last_bulk_size: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// Override the reported hardware parallelism
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Make `clone_variants` fail after creating `after` targets
    #[must_use]
    pub fn with_bulk_clone_failure(mut self, after: usize) -> Self {
        self.fail_bulk_after = Some(after);
        self
    }

    /// Write a quantity into one variant
    pub fn set(&self, variant: &VariantId, key: &str, value: f64) -> Result<(), StoreError> {
        let mut variants = self.variants.write();
        let quantities = variants
            .get_mut(variant)
            .ok_or_else(|| StoreError::UnknownVariant(variant.clone()))?;
        quantities.insert(key.to_string(), value);
        Ok(())
    }

    /// Read a quantity from one variant
    #[must_use]
    pub fn get(&self, variant: &VariantId, key: &str) -> Option<f64> {
        self.variants.read().get(variant)?.get(key).copied()
    }

    /// All quantities of one variant
    #[must_use]
    pub fn quantities(&self, variant: &VariantId) -> Quantities {
        self.variants.read().get(variant).cloned().unwrap_or_default()
    }

    /// Existing variant ids, sorted
    #[must_use]
    pub fn variant_ids(&self) -> Vec<VariantId> {
        let mut ids: Vec<_> = self.variants.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn multi_thread_enabled(&self) -> bool {
        self.multi_thread.load(Ordering::SeqCst)
    }

    /// Calls to `clone_variant` (the per-contingency re-clones)
    #[must_use]
    pub fn clone_calls(&self) -> usize {
        self.clone_calls.load(Ordering::SeqCst)
    }

    /// Calls to the bulk `clone_variants`
    #[must_use]
    pub fn bulk_clone_calls(&self) -> usize {
        self.bulk_clone_calls.load(Ordering::SeqCst)
    }

    /// Number of targets in the most recent bulk clone
    #[must_use]
    pub fn last_bulk_size(&self) -> usize {
        self.last_bulk_size.load(Ordering::SeqCst)
    }

    /// Calls to `remove_variant`
    #[must_use]
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }
}

impl VariantStore for FakeNetwork {
    fn clone_variant(
        &self,
        src: &VariantId,
        dst: &VariantId,
        overwrite: bool,
    ) -> Result<(), StoreError> {
        self.clone_calls.fetch_add(1, Ordering::SeqCst);
        let mut variants = self.variants.write();
        let snapshot = variants
            .get(src)
            .cloned()
            .ok_or_else(|| StoreError::UnknownVariant(src.clone()))?;
        if !overwrite && variants.contains_key(dst) {
            return Err(StoreError::VariantExists(dst.clone()));
        }
        variants.insert(dst.clone(), snapshot);
        Ok(())
    }

    fn clone_variants(&self, src: &VariantId, dsts: &[VariantId]) -> Result<(), StoreError> {
        self.bulk_clone_calls.fetch_add(1, Ordering::SeqCst);
        self.last_bulk_size.store(dsts.len(), Ordering::SeqCst);
        let mut variants = self.variants.write();
        let snapshot = variants
            .get(src)
            .cloned()
            .ok_or_else(|| StoreError::UnknownVariant(src.clone()))?;
        for (i, dst) in dsts.iter().enumerate() {
            if self.fail_bulk_after == Some(i) || variants.contains_key(dst) {
                return Err(StoreError::VariantExists(dst.clone()));
            }
            variants.insert(dst.clone(), snapshot.clone());
        }
        Ok(())
    }

    fn remove_variant(&self, id: &VariantId) -> Result<(), StoreError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.variants
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownVariant(id.clone()))
    }

    fn allow_multi_thread_access(&self, allow: bool) {
        self.multi_thread.store(allow, Ordering::SeqCst);
    }

    fn available_parallelism(&self) -> usize {
        self.parallelism
    }
}

/// Scripted solver over [`FakeNetwork`] variants, instrumented with an
/// in-flight high-water mark for parallelism probes.
#[derive(Debug, Default)]
pub struct FakeSolver {
    delay: Duration,
    calls: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
    last_params: Mutex<Option<SolverParameters>>,
}

impl FakeSolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every solve, to force task overlap
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total solve invocations, base case included
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running solves observed
    #[must_use]
    pub fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }

    /// Parameters of the most recent solve
    #[must_use]
    pub fn last_params(&self) -> Option<SolverParameters> {
        self.last_params.lock().clone()
    }
}

#[async_trait]
impl Solver<FakeNetwork> for FakeSolver {
    async fn solve(
        &self,
        network: &FakeNetwork,
        variant: &VariantId,
        params: &SolverParameters,
    ) -> Result<SolverOutcome, SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock() = Some(params.clone());

        let running = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if network.get(variant, "solver:error").unwrap_or(0.0) > 0.0 {
            Err(SolverError::Failed("scripted solver error".to_string()))
        } else if network.get(variant, "solver:diverge").unwrap_or(0.0) > 0.0 {
            Ok(SolverOutcome::diverged(params.max_iterations))
        } else {
            Ok(SolverOutcome::converged(3))
        };

        self.inflight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Detector reporting one current violation per `overload:<subject>` key
#[derive(Debug, Default)]
pub struct FakeDetector {
    calls: AtomicUsize,
}

impl FakeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total scan invocations
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ViolationDetector<FakeNetwork> for FakeDetector {
    fn check_all(&self, network: &FakeNetwork, variant: &VariantId) -> Vec<Violation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut violations: Vec<Violation> = network
            .quantities(variant)
            .iter()
            .filter_map(|(key, value)| {
                let subject = key.strip_prefix("overload:")?;
                (*value > 0.0).then(|| {
                    Violation::new(subject, ViolationKind::Current, 100.0, *value)
                        .with_nominal_voltage(380.0)
                })
            })
            .collect();
        violations.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        violations
    }
}

/// Collector reading `p1:<branch>` and `v:<bus>` quantities
#[derive(Debug, Default)]
pub struct FakeCollector;

impl MonitorCollector<FakeNetwork> for FakeCollector {
    fn collect(
        &self,
        network: &FakeNetwork,
        variant: &VariantId,
        monitor: &StateMonitor,
    ) -> MonitorReadings {
        let quantity = |id: &str, key: &str| network.get(variant, &format!("{key}:{id}"));
        MonitorReadings {
            branches: monitor
                .branch_ids
                .iter()
                .map(|id| BranchReading {
                    branch_id: id.clone(),
                    p1: quantity(id, "p1").unwrap_or(0.0),
                    q1: quantity(id, "q1").unwrap_or(0.0),
                    i1: quantity(id, "i1").unwrap_or(0.0),
                    p2: quantity(id, "p2").unwrap_or(0.0),
                    q2: quantity(id, "q2").unwrap_or(0.0),
                    i2: quantity(id, "i2").unwrap_or(0.0),
                })
                .collect(),
            buses: monitor
                .bus_ids
                .iter()
                .map(|id| BusReading {
                    bus_id: id.clone(),
                    v: quantity(id, "v").unwrap_or(0.0),
                    angle: quantity(id, "angle").unwrap_or(0.0),
                })
                .collect(),
        }
    }
}

/// Modification writing one quantity into the leased variant
#[derive(Debug)]
pub struct SetQuantity {
    pub key: String,
    pub value: f64,
}

impl NetworkModification<FakeNetwork> for SetQuantity {
    fn apply(&self, network: &FakeNetwork, variant: &VariantId) -> Result<(), StoreError> {
        network.set(variant, &self.key, self.value)
    }

    fn name(&self) -> &str {
        "set-quantity"
    }
}

/// Modification that always fails, for collaborator-error scenarios
#[derive(Debug)]
pub struct FailingModification;

impl NetworkModification<FakeNetwork> for FailingModification {
    fn apply(&self, _network: &FakeNetwork, _variant: &VariantId) -> Result<(), StoreError> {
        Err(StoreError::ModificationFailed(
            "scripted modification failure".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "failing-modification"
    }
}

/// Contingency whose evaluation reports a current violation on `subject`
#[must_use]
pub fn overload_contingency(id: &str, subject: &str, value: f64) -> Contingency<FakeNetwork> {
    Contingency::new(
        id,
        Arc::new(SetQuantity {
            key: format!("overload:{subject}"),
            value,
        }),
    )
}

/// Contingency whose evaluation converges with no violations
#[must_use]
pub fn benign_contingency(id: &str) -> Contingency<FakeNetwork> {
    Contingency::new(
        id,
        Arc::new(SetQuantity {
            key: format!("touched:{id}"),
            value: 1.0,
        }),
    )
}

/// Contingency whose evaluation does not converge
#[must_use]
pub fn diverging_contingency(id: &str) -> Contingency<FakeNetwork> {
    Contingency::new(
        id,
        Arc::new(SetQuantity {
            key: "solver:diverge".to_string(),
            value: 1.0,
        }),
    )
}

/// Contingency whose modification fails with a collaborator error
#[must_use]
pub fn erroring_contingency(id: &str) -> Contingency<FakeNetwork> {
    Contingency::new(id, Arc::new(FailingModification))
}
