//! State monitors and monitored-quantity collection
//!
//! A state monitor names the network elements whose instantaneous
//! quantities should be captured alongside violations, and the states
//! (base case, every state, or one specific contingency) it applies to.

use crate::variant::VariantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// States a monitor applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorScope {
    /// Base case and every post-contingency state
    AllStates,
    /// Base case only
    BaseCaseOnly,
    /// One specific contingency, by id
    Contingency(String),
}

/// Elements to capture for a set of states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMonitor {
    /// Which states this monitor applies to
    pub scope: MonitorScope,
    /// Branches to capture
    pub branch_ids: Vec<String>,
    /// Buses to capture
    pub bus_ids: Vec<String>,
}

impl StateMonitor {
    /// Create an empty monitor for a scope
    #[inline]
    #[must_use]
    pub fn new(scope: MonitorScope) -> Self {
        Self {
            scope,
            branch_ids: Vec::new(),
            bus_ids: Vec::new(),
        }
    }

    /// Add a branch to capture
    #[inline]
    #[must_use]
    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_ids.push(branch_id.into());
        self
    }

    /// Add a bus to capture
    #[inline]
    #[must_use]
    pub fn with_bus(mut self, bus_id: impl Into<String>) -> Self {
        self.bus_ids.push(bus_id.into());
        self
    }

    /// True when the monitor names no elements
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branch_ids.is_empty() && self.bus_ids.is_empty()
    }

    fn merge(&mut self, other: &StateMonitor) {
        self.branch_ids.extend(other.branch_ids.iter().cloned());
        self.bus_ids.extend(other.bus_ids.iter().cloned());
    }
}

/// Monitors partitioned by scope.
///
/// Stage 1 captures the all-states and base-case-only monitors; each
/// contingency task captures the all-states monitor plus the specific
/// monitor registered for its id, if any.
#[derive(Debug, Clone)]
pub struct MonitorIndex {
    all_states: StateMonitor,
    base_case: StateMonitor,
    specific: HashMap<String, StateMonitor>,
}

impl MonitorIndex {
    /// Partition a list of monitors by scope, merging same-scope entries
    #[must_use]
    pub fn new(monitors: impl IntoIterator<Item = StateMonitor>) -> Self {
        let mut all_states = StateMonitor::new(MonitorScope::AllStates);
        let mut base_case = StateMonitor::new(MonitorScope::BaseCaseOnly);
        let mut specific: HashMap<String, StateMonitor> = HashMap::new();

        for monitor in monitors {
            match &monitor.scope {
                MonitorScope::AllStates => all_states.merge(&monitor),
                MonitorScope::BaseCaseOnly => base_case.merge(&monitor),
                MonitorScope::Contingency(id) => {
                    specific
                        .entry(id.clone())
                        .or_insert_with(|| StateMonitor::new(monitor.scope.clone()))
                        .merge(&monitor);
                }
            }
        }

        Self {
            all_states,
            base_case,
            specific,
        }
    }

    /// Monitor applying to every state
    #[inline]
    #[must_use]
    pub fn all_states(&self) -> &StateMonitor {
        &self.all_states
    }

    /// Monitor applying to the base case only
    #[inline]
    #[must_use]
    pub fn base_case(&self) -> &StateMonitor {
        &self.base_case
    }

    /// Monitor registered for one specific contingency
    #[inline]
    #[must_use]
    pub fn for_contingency(&self, contingency_id: &str) -> Option<&StateMonitor> {
        self.specific.get(contingency_id)
    }
}

impl Default for MonitorIndex {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

/// Instantaneous quantities of one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchReading {
    pub branch_id: String,
    pub p1: f64,
    pub q1: f64,
    pub i1: f64,
    pub p2: f64,
    pub q2: f64,
    pub i2: f64,
}

/// Instantaneous quantities of one bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusReading {
    pub bus_id: String,
    pub v: f64,
    pub angle: f64,
}

/// Quantities captured for one state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorReadings {
    pub branches: Vec<BranchReading>,
    pub buses: Vec<BusReading>,
}

impl MonitorReadings {
    /// True when nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.buses.is_empty()
    }

    /// Append another capture to this one
    pub fn extend(&mut self, other: MonitorReadings) {
        self.branches.extend(other.branches);
        self.buses.extend(other.buses);
    }
}

/// Reads instantaneous quantities from one variant of the network
pub trait MonitorCollector<N>: Send + Sync {
    /// Capture the elements named by `monitor` from `variant`
    fn collect(&self, network: &N, variant: &VariantId, monitor: &StateMonitor) -> MonitorReadings;
}
