//! End-to-end scenarios for the contingency analysis engine, run against
//! the instrumented fakes from `csa-test-utils`.

use csa_core::{AnalysisConfig, AnalysisError, ContingencyAnalysis};
use csa_model::{
    ComputationStatus, ListContingenciesProvider, MonitorIndex, MonitorScope, SolverParameters,
    StateMonitor, VariantId,
};
use csa_test_utils::{
    benign_contingency, diverging_contingency, erroring_contingency, overload_contingency,
    FakeCollector, FakeDetector, FakeNetwork, FakeSolver,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "base";

struct Harness {
    network: Arc<FakeNetwork>,
    solver: Arc<FakeSolver>,
    detector: Arc<FakeDetector>,
    engine: ContingencyAnalysis<FakeNetwork>,
}

fn harness(network: FakeNetwork, solver: FakeSolver, config: AnalysisConfig) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let network = Arc::new(network);
    let solver = Arc::new(solver);
    let detector = Arc::new(FakeDetector::new());
    let engine = ContingencyAnalysis::new(
        Arc::clone(&network),
        solver.clone(),
        detector.clone(),
        Arc::new(FakeCollector),
    )
    .with_config(config);
    Harness {
        network,
        solver,
        detector,
        engine,
    }
}

fn base() -> VariantId {
    VariantId::new(BASE)
}

#[tokio::test]
async fn empty_contingency_list_skips_fan_out() {
    let h = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new(),
        AnalysisConfig::new(),
    );
    let provider = ListContingenciesProvider::new(Vec::new());

    let report = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    assert_eq!(
        report.pre_contingency().status,
        ComputationStatus::Converged
    );
    assert!(report.post_contingency().is_empty());
    // No pool, no variants: stage 2 never touched the store
    assert_eq!(h.network.bulk_clone_calls(), 0);
    assert_eq!(h.network.clone_calls(), 0);
    assert_eq!(h.network.variant_ids(), vec![base()]);
}

#[tokio::test]
async fn diverging_base_case_short_circuits_the_run() {
    let network = FakeNetwork::new(BASE);
    network.set(&base(), "solver:diverge", 1.0).unwrap();
    let h = harness(network, FakeSolver::new(), AnalysisConfig::new());
    let provider = ListContingenciesProvider::new(vec![
        overload_contingency("c1", "line-1", 150.0),
        benign_contingency("c2"),
    ]);

    let report = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    assert_eq!(report.pre_contingency().status, ComputationStatus::Failed);
    assert!(report.pre_contingency().violations.is_empty());
    assert!(report.post_contingency().is_empty());
    // The scanner never ran and no variant was ever allocated
    assert_eq!(h.detector.calls(), 0);
    assert_eq!(h.network.bulk_clone_calls(), 0);
    assert_eq!(h.network.clone_calls(), 0);
    assert_eq!(h.solver.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallelism_is_bounded_by_the_variant_ceiling() {
    let h = harness(
        FakeNetwork::new(BASE).with_parallelism(8),
        FakeSolver::new().with_delay(Duration::from_millis(50)),
        AnalysisConfig::new().with_max_variants(2),
    );
    let provider = ListContingenciesProvider::new(
        (0..5)
            .map(|i| benign_contingency(&format!("c{i}")))
            .collect(),
    );

    let report = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    assert_eq!(report.post_contingency().len(), 5);
    // worker_count = min(ceiling, parallelism, count) = min(2, 8, 5)
    assert_eq!(h.network.last_bulk_size(), 2);
    // At no instant were more than 2 contingency computations running
    assert_eq!(h.solver.max_inflight(), 2);
    assert!(h.network.multi_thread_enabled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_size_does_not_cap_compute_parallelism() {
    let h = harness(
        FakeNetwork::new(BASE).with_parallelism(8),
        FakeSolver::new().with_delay(Duration::from_millis(50)),
        AnalysisConfig::new()
            .with_dispatch_pool_size(1)
            .with_max_variants(2),
    );
    let provider = ListContingenciesProvider::new(
        (0..4)
            .map(|i| benign_contingency(&format!("c{i}")))
            .collect(),
    );

    let report = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    assert_eq!(report.post_contingency().len(), 4);
    // The dispatch permit is released once a lease is held, so both
    // leased variants compute at the same time even with one permit
    assert_eq!(h.solver.max_inflight(), 2);
}

#[tokio::test]
async fn non_convergence_of_one_contingency_is_isolated() {
    let h = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new(),
        AnalysisConfig::new(),
    );
    let provider = ListContingenciesProvider::new(vec![
        overload_contingency("c1", "line-1", 150.0),
        diverging_contingency("c2"),
        overload_contingency("c3", "line-3", 120.0),
    ]);

    let report = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    assert_eq!(report.post_contingency().len(), 3);

    let c1 = report.find_post_contingency("c1").unwrap();
    assert_eq!(c1.status, ComputationStatus::Converged);
    assert_eq!(c1.violations.len(), 1);
    assert_eq!(c1.violations[0].subject_id, "line-1");
    assert_eq!(c1.violations[0].value, 150.0);

    let c2 = report.find_post_contingency("c2").unwrap();
    assert_eq!(c2.status, ComputationStatus::Failed);
    assert!(c2.violations.is_empty());

    let c3 = report.find_post_contingency("c3").unwrap();
    assert_eq!(c3.status, ComputationStatus::Converged);
    assert_eq!(c3.violations.len(), 1);
    assert_eq!(c3.violations[0].subject_id, "line-3");

    // Post-contingency computations start from the base-case state
    let last = h.solver.last_params().unwrap();
    assert!(last.start_from_previous_values);
}

#[tokio::test]
async fn every_worker_variant_is_removed_after_a_successful_run() {
    let h = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new(),
        AnalysisConfig::new(),
    );
    let provider = ListContingenciesProvider::new(vec![
        overload_contingency("c1", "line-1", 150.0),
        diverging_contingency("c2"),
        benign_contingency("c3"),
    ]);

    h.engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    // The store is back to exactly the starting variant
    assert_eq!(h.network.variant_ids(), vec![base()]);
    let worker_count = h.network.last_bulk_size();
    assert_eq!(worker_count, 3);
    assert_eq!(h.network.remove_calls(), worker_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collaborator_error_fails_the_run_after_cleanup() {
    let h = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new().with_delay(Duration::from_millis(20)),
        AnalysisConfig::new(),
    );
    let provider = ListContingenciesProvider::new(vec![
        overload_contingency("c1", "line-1", 150.0),
        erroring_contingency("c2"),
    ]);

    let err = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        AnalysisError::ContingencyTask { id, .. } if id == "c2"
    ));
    assert!(err.is_collaborator_failure());

    // c2's failure did not cancel c1: its solve still ran (base case + c1)
    assert_eq!(h.solver.calls(), 2);
    assert_eq!(h.detector.calls(), 2);

    // Cleanup ran to completion before the error propagated
    assert_eq!(h.network.variant_ids(), vec![base()]);
    assert_eq!(h.network.remove_calls(), h.network.last_bulk_size());
}

#[tokio::test]
async fn partial_bulk_clone_is_cleaned_up() {
    let h = harness(
        FakeNetwork::new(BASE).with_bulk_clone_failure(1),
        FakeSolver::new(),
        AnalysisConfig::new(),
    );
    let provider = ListContingenciesProvider::new(vec![
        benign_contingency("c1"),
        benign_contingency("c2"),
        benign_contingency("c3"),
    ]);

    let err = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Store(_)));
    // No contingency ever ran and the half-created copies are gone
    assert_eq!(h.solver.calls(), 1);
    assert_eq!(h.network.variant_ids(), vec![base()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduling_never_changes_outcomes() {
    let contingencies = || {
        vec![
            overload_contingency("c1", "line-a", 130.0),
            overload_contingency("c2", "line-b", 140.0),
        ]
    };

    // Strictly sequential: one variant slot serves both contingencies
    let sequential = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new(),
        AnalysisConfig::new().with_max_variants(1),
    );
    let report_sequential = sequential
        .engine
        .run(
            &base(),
            &SolverParameters::new(),
            &ListContingenciesProvider::new(contingencies()),
        )
        .await
        .unwrap();
    // Both evaluations re-cloned the base over the shared slot
    assert_eq!(sequential.network.last_bulk_size(), 1);
    assert_eq!(sequential.network.clone_calls(), 2);

    // Parallel: two slots, overlapping computations
    let parallel = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new().with_delay(Duration::from_millis(20)),
        AnalysisConfig::new().with_max_variants(2),
    );
    let report_parallel = parallel
        .engine
        .run(
            &base(),
            &SolverParameters::new(),
            &ListContingenciesProvider::new(contingencies()),
        )
        .await
        .unwrap();

    for id in ["c1", "c2"] {
        let a = report_sequential.find_post_contingency(id).unwrap();
        let b = report_parallel.find_post_contingency(id).unwrap();
        assert_eq!(a.status, b.status);
        assert_eq!(a.violations, b.violations);
        // One subject only: the other contingency's mutation never leaked
        assert_eq!(a.violations.len(), 1);
    }
    assert_eq!(
        report_sequential
            .find_post_contingency("c1")
            .unwrap()
            .violations[0]
            .subject_id,
        "line-a"
    );
    assert_eq!(
        report_sequential
            .find_post_contingency("c2")
            .unwrap()
            .violations[0]
            .subject_id,
        "line-b"
    );
}

#[tokio::test]
async fn monitors_capture_readings_per_scope() {
    let network = FakeNetwork::new(BASE);
    network.set(&base(), "p1:line-1", 560.0).unwrap();
    network.set(&base(), "v:bus-1", 380.0).unwrap();
    network.set(&base(), "p1:line-2", 302.0).unwrap();

    let network = Arc::new(network);
    let engine = ContingencyAnalysis::new(
        Arc::clone(&network),
        Arc::new(FakeSolver::new()),
        Arc::new(FakeDetector::new()),
        Arc::new(FakeCollector),
    )
    .with_monitors(MonitorIndex::new([
        StateMonitor::new(MonitorScope::AllStates).with_branch("line-1"),
        StateMonitor::new(MonitorScope::BaseCaseOnly).with_bus("bus-1"),
        StateMonitor::new(MonitorScope::Contingency("c1".into())).with_branch("line-2"),
    ]));

    let provider =
        ListContingenciesProvider::new(vec![benign_contingency("c1"), benign_contingency("c2")]);
    let report = engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    // Base case: all-states branch plus base-case-only bus
    let pre = report.pre_contingency();
    assert_eq!(pre.readings.branches.len(), 1);
    assert_eq!(pre.readings.branches[0].p1, 560.0);
    assert_eq!(pre.readings.buses.len(), 1);

    // c1: all-states branch plus its specific monitor
    let c1 = report.find_post_contingency("c1").unwrap();
    let mut branch_ids: Vec<_> = c1
        .readings
        .branches
        .iter()
        .map(|b| b.branch_id.as_str())
        .collect();
    branch_ids.sort_unstable();
    assert_eq!(branch_ids, vec!["line-1", "line-2"]);
    assert!(c1.readings.buses.is_empty());

    // c2: all-states branch only
    let c2 = report.find_post_contingency("c2").unwrap();
    assert_eq!(c2.readings.branches.len(), 1);
    assert_eq!(c2.readings.branches[0].branch_id, "line-1");
}

#[tokio::test]
async fn report_serializes_to_json() {
    let h = harness(
        FakeNetwork::new(BASE),
        FakeSolver::new(),
        AnalysisConfig::new(),
    );
    let provider =
        ListContingenciesProvider::new(vec![overload_contingency("c1", "line-1", 150.0)]);
    let report = h
        .engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["pre_contingency"]["status"], "Converged");
    assert_eq!(
        json["post_contingency"][0]["violations"][0]["subject_id"],
        "line-1"
    );
}

#[tokio::test]
async fn failed_contingencies_capture_no_readings() {
    let network = Arc::new(FakeNetwork::new(BASE));
    let engine = ContingencyAnalysis::new(
        Arc::clone(&network),
        Arc::new(FakeSolver::new()),
        Arc::new(FakeDetector::new()),
        Arc::new(FakeCollector),
    )
    .with_monitors(MonitorIndex::new([
        StateMonitor::new(MonitorScope::AllStates).with_branch("line-1"),
    ]));

    let provider = ListContingenciesProvider::new(vec![diverging_contingency("c1")]);
    let report = engine
        .run(&base(), &SolverParameters::new(), &provider)
        .await
        .unwrap();

    let c1 = report.find_post_contingency("c1").unwrap();
    assert_eq!(c1.status, ComputationStatus::Failed);
    assert!(c1.readings.is_empty());
}
