//! Contingency analysis orchestration
//!
//! Two-phase engine over a variant-based network model:
//! 1. run the computation once on the caller's variant (the base case);
//! 2. on convergence, fan out one isolated computation per contingency
//!    across a bounded pool of reusable variant copies.
//!
//! The base case must fully complete, violation scan included, before any
//! fan-out work starts. Within the fan-out there is no ordering guarantee
//! among contingencies; every temporary variant is removed when the last
//! task has joined, whether the tasks succeeded or not.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, PoolError};
use crate::pool::VariantLeasePool;
use crate::result::{AnalysisReport, Interceptor, ReportBuilder};
use csa_model::{
    ComputationStatus, ContingenciesProvider, Contingency, MonitorCollector, MonitorIndex,
    Solver, SolverParameters, VariantId, VariantStore, ViolationDetector, ViolationFilter,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// The orchestration engine.
///
/// Owns the network handle and the collaborator contracts; one instance
/// can serve many sequential runs.
pub struct ContingencyAnalysis<N> {
    network: Arc<N>,
    solver: Arc<dyn Solver<N>>,
    detector: Arc<dyn ViolationDetector<N>>,
    collector: Arc<dyn MonitorCollector<N>>,
    filter: ViolationFilter,
    monitors: Arc<MonitorIndex>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    config: AnalysisConfig,
}

impl<N> ContingencyAnalysis<N>
where
    N: VariantStore + 'static,
{
    /// Create an engine over a network and its collaborators
    #[must_use]
    pub fn new(
        network: Arc<N>,
        solver: Arc<dyn Solver<N>>,
        detector: Arc<dyn ViolationDetector<N>>,
        collector: Arc<dyn MonitorCollector<N>>,
    ) -> Self {
        Self {
            network,
            solver,
            detector,
            collector,
            filter: ViolationFilter::new(),
            monitors: Arc::new(MonitorIndex::default()),
            interceptors: Vec::new(),
            config: AnalysisConfig::default(),
        }
    }

    /// With a violation filter
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: ViolationFilter) -> Self {
        self.filter = filter;
        self
    }

    /// With state monitors
    #[inline]
    #[must_use]
    pub fn with_monitors(mut self, monitors: MonitorIndex) -> Self {
        self.monitors = Arc::new(monitors);
        self
    }

    /// With engine configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a result interceptor
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full analysis: base case, then one isolated evaluation per
    /// contingency supplied by `provider`.
    ///
    /// The returned report is either complete (one entry per contingency,
    /// possibly with failed outcomes) or the run itself errors after all
    /// temporary variants have been cleaned up. A failed base case
    /// short-circuits the run with an empty post-contingency collection.
    ///
    /// # Errors
    /// Collaborator failures, after cleanup has executed.
    pub async fn run(
        &self,
        working_variant: &VariantId,
        params: &SolverParameters,
        provider: &dyn ContingenciesProvider<N>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let builder = Arc::new(ReportBuilder::new(
            self.filter.clone(),
            self.interceptors.clone(),
        ));

        tracing::info!(variant = %working_variant, "running base case");
        let outcome = self
            .solver
            .solve(&self.network, working_variant, params)
            .await?;

        if outcome.is_converged() {
            self.record_base_case(working_variant, &builder);

            // Post-contingency computations start from the base-case
            // state variables rather than a flat start.
            let post_params = params.clone().with_previous_values_start(true);
            self.run_post_contingencies(working_variant, &post_params, provider, &builder)
                .await?;
        } else {
            tracing::warn!(variant = %working_variant, "base case did not converge, skipping contingencies");
            builder
                .pre_contingency()
                .status(ComputationStatus::Failed)
                .finish();
        }

        builder.build()
    }

    /// Scan and capture the converged base case (stage 1, sequential)
    fn record_base_case(&self, working_variant: &VariantId, builder: &ReportBuilder) {
        let mut pre = builder.pre_contingency().status(ComputationStatus::Converged);
        pre.add_violations(self.detector.check_all(&self.network, working_variant));
        for monitor in [self.monitors.all_states(), self.monitors.base_case()] {
            if !monitor.is_empty() {
                pre.add_readings(self.collector.collect(&self.network, working_variant, monitor));
            }
        }
        pre.finish();
    }

    async fn run_post_contingencies(
        &self,
        base_variant: &VariantId,
        params: &SolverParameters,
        provider: &dyn ContingenciesProvider<N>,
        builder: &Arc<ReportBuilder>,
    ) -> Result<(), AnalysisError> {
        let contingencies = provider.contingencies(&self.network);
        if contingencies.is_empty() {
            tracing::debug!("no contingencies to evaluate");
            return Ok(());
        }

        let worker_count = self
            .config
            .worker_count(self.network.available_parallelism(), contingencies.len());
        let variant_ids = worker_variant_ids(worker_count);
        tracing::info!(
            contingencies = contingencies.len(),
            workers = worker_count,
            "fanning out contingency evaluations"
        );

        self.network.allow_multi_thread_access(true);
        if let Err(error) = self.network.clone_variants(base_variant, &variant_ids) {
            // A partway failure leaves some worker variants behind;
            // remove whatever the bulk clone managed to create.
            for variant in &variant_ids {
                let _ = self.network.remove_variant(variant);
            }
            return Err(error.into());
        }

        let pool = VariantLeasePool::new(variant_ids.clone());
        let dispatch = Arc::new(Semaphore::new(self.config.dispatch_pool_size));

        let mut tasks: JoinSet<Result<(), AnalysisError>> = JoinSet::new();
        for contingency in contingencies {
            tasks.spawn(evaluate_contingency(
                ContingencyTask {
                    network: Arc::clone(&self.network),
                    solver: Arc::clone(&self.solver),
                    detector: Arc::clone(&self.detector),
                    collector: Arc::clone(&self.collector),
                    monitors: Arc::clone(&self.monitors),
                    builder: Arc::clone(builder),
                    pool: Arc::clone(&pool),
                    dispatch: Arc::clone(&dispatch),
                    base_variant: base_variant.clone(),
                    params: params.clone(),
                },
                contingency,
            ));
        }

        // Join barrier: every task runs to completion even when another
        // one has already failed; only the first error is kept.
        let mut first_error: Option<AnalysisError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => Err(AnalysisError::TaskPanicked(join_error.to_string())),
            };
            if let Err(error) = result {
                tracing::error!(%error, "contingency task failed");
                first_error.get_or_insert(error);
            }
        }

        // Guaranteed teardown: every temporary variant is removed exactly
        // once before any error propagates to the caller.
        for variant in &variant_ids {
            if let Err(error) = self.network.remove_variant(variant) {
                tracing::warn!(%variant, %error, "failed to remove worker variant");
                first_error.get_or_insert(error.into());
            }
        }

        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

impl<N> std::fmt::Debug for ContingencyAnalysis<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContingencyAnalysis")
            .field("config", &self.config)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Everything one spawned contingency evaluation needs
struct ContingencyTask<N> {
    network: Arc<N>,
    solver: Arc<dyn Solver<N>>,
    detector: Arc<dyn ViolationDetector<N>>,
    collector: Arc<dyn MonitorCollector<N>>,
    monitors: Arc<MonitorIndex>,
    builder: Arc<ReportBuilder>,
    pool: Arc<VariantLeasePool>,
    dispatch: Arc<Semaphore>,
    base_variant: VariantId,
    params: SolverParameters,
}

/// Evaluate one contingency on a leased variant.
///
/// The lease is an RAII guard: it returns its variant to the pool when
/// this future completes, on the error paths included.
async fn evaluate_contingency<N>(
    task: ContingencyTask<N>,
    contingency: Contingency<N>,
) -> Result<(), AnalysisError>
where
    N: VariantStore + 'static,
{
    let result = evaluate_contingency_inner(&task, &contingency).await;
    result.map_err(|error| AnalysisError::for_contingency(contingency.id(), error))
}

async fn evaluate_contingency_inner<N>(
    task: &ContingencyTask<N>,
    contingency: &Contingency<N>,
) -> Result<(), AnalysisError>
where
    N: VariantStore + 'static,
{
    // The dispatch permit covers only the wait for a lease; once one is
    // held, compute concurrency is bounded by the pool alone.
    let permit = task
        .dispatch
        .acquire()
        .await
        .map_err(|_| PoolError::Closed)?;
    let lease = task.pool.acquire().await?;
    drop(permit);
    let variant = lease.id();
    tracing::debug!(worker = %variant, contingency = contingency.id(), "evaluating contingency");

    // Re-clone the base case over whatever state the previous occupant of
    // this slot left behind; skipping this would leak one contingency's
    // mutation into another's evaluation.
    task.network
        .clone_variant(&task.base_variant, variant, true)?;
    contingency.apply(&task.network, variant)?;

    let outcome = task
        .solver
        .solve(&task.network, variant, &task.params)
        .await?;

    let mut post = task.builder.contingency(contingency.id());
    if outcome.is_converged() {
        post = post.status(ComputationStatus::Converged);
        post.add_violations(
            task.detector
                .check_all_post(contingency.id(), &task.network, variant),
        );
        let all_states = task.monitors.all_states();
        if !all_states.is_empty() {
            post.add_readings(task.collector.collect(&task.network, variant, all_states));
        }
        if let Some(monitor) = task.monitors.for_contingency(contingency.id()) {
            post.add_readings(task.collector.collect(&task.network, variant, monitor));
        }
    } else {
        tracing::debug!(contingency = contingency.id(), "computation did not converge");
        post = post.status(ComputationStatus::Failed);
    }
    post.finish()
}

/// Worker variant names for one run: `<uuid>_<i>`
fn worker_variant_ids(worker_count: usize) -> Vec<VariantId> {
    let prefix = Uuid::new_v4();
    (0..worker_count)
        .map(|i| VariantId::new(format!("{prefix}_{i}")))
        .collect()
}
