use crate::models::activity::Activity;
use serde::{Deserialize, Serialize};

/// Output of one graph compilation, as handed over by the graph compiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledGraph {
    pub dependent_activities: Option<Vec<Activity>>,
    pub has_compilation_errors: bool,
    pub has_stale_outputs: bool,
    pub cyclomatic_complexity: Option<u32>,
    pub duration_man_days: Option<u32>,
    pub use_business_days: bool,
    pub costs: CostSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub direct: Option<f64>,
    pub indirect: Option<f64>,
    pub other: Option<f64>,
    /// Explicit total; derived from the components when absent.
    pub total: Option<f64>,
}

impl CostSummary {
    pub fn total(&self) -> Option<f64> {
        if self.total.is_some() {
            return self.total;
        }
        let parts = [self.direct, self.indirect, self.other];
        if parts.iter().all(Option::is_none) {
            return None;
        }
        Some(parts.iter().flatten().sum())
    }
}
