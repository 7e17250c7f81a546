use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Metrics bundle produced by a `ProjectMetricsService`. The seven values are
/// only ever stored together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub criticality: f64,
    pub fibonacci: f64,
    pub activity: f64,
    pub activity_std_dev_corrected: f64,
    pub geometric_criticality: f64,
    pub geometric_fibonacci: f64,
    pub geometric_activity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub cyclomatic_complexity: Option<u32>,
    pub duration_man_months: Option<f64>,
}

/// Immutable set of derived metrics. Replaced wholesale on every recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub risk: Option<RiskMetrics>,
    pub graph: GraphMetrics,
}

impl MetricsSnapshot {
    pub fn is_cleared(&self) -> bool {
        self.risk.is_none()
            && self.graph.cyclomatic_complexity.is_none()
            && self.graph.duration_man_months.is_none()
    }

    pub fn criticality_risk(&self) -> Option<f64> {
        self.risk.map(|r| r.criticality)
    }

    pub fn fibonacci_risk(&self) -> Option<f64> {
        self.risk.map(|r| r.fibonacci)
    }

    pub fn activity_risk(&self) -> Option<f64> {
        self.risk.map(|r| r.activity)
    }

    pub fn activity_risk_std_dev_corrected(&self) -> Option<f64> {
        self.risk.map(|r| r.activity_std_dev_corrected)
    }

    pub fn geometric_criticality_risk(&self) -> Option<f64> {
        self.risk.map(|r| r.geometric_criticality)
    }

    pub fn geometric_fibonacci_risk(&self) -> Option<f64> {
        self.risk.map(|r| r.geometric_fibonacci)
    }

    pub fn geometric_activity_risk(&self) -> Option<f64> {
        self.risk.map(|r| r.geometric_activity)
    }

    pub fn cyclomatic_complexity(&self) -> Option<u32> {
        self.graph.cyclomatic_complexity
    }

    pub fn duration_man_months(&self) -> Option<f64> {
        self.graph.duration_man_months
    }
}

/// A snapshot as published by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMetrics {
    /// Zero for the empty snapshot created with the coordinator.
    pub revision: u64,
    pub computed_at: DateTime<Utc>,
    pub snapshot: MetricsSnapshot,
}

impl PublishedMetrics {
    pub fn initial() -> Self {
        Self {
            revision: 0,
            computed_at: Utc::now(),
            snapshot: MetricsSnapshot::default(),
        }
    }
}

pub type SharedMetrics = Arc<PublishedMetrics>;

/// Flattened view of every exposed metric and pass-through, as handed to a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsView {
    pub revision: u64,
    pub computed_at: DateTime<Utc>,
    pub is_busy: bool,
    pub criticality_risk: Option<f64>,
    pub fibonacci_risk: Option<f64>,
    pub activity_risk: Option<f64>,
    pub activity_risk_std_dev_corrected: Option<f64>,
    pub geometric_criticality_risk: Option<f64>,
    pub geometric_fibonacci_risk: Option<f64>,
    pub geometric_activity_risk: Option<f64>,
    pub cyclomatic_complexity: Option<u32>,
    pub duration_man_months: Option<f64>,
    pub has_compilation_errors: bool,
    pub has_stale_outputs: bool,
    pub direct_cost: Option<f64>,
    pub indirect_cost: Option<f64>,
    pub other_cost: Option<f64>,
    pub total_cost: Option<f64>,
}
