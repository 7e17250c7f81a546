use crate::models::activity::Activity;
use crate::models::graph::CompiledGraph;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read side of the compiled project graph, plus the shared busy flag.
///
/// `compiled` hands out one immutable compilation; the remaining accessors
/// read from it and may each see a different compilation if one lands in
/// between. Anything that combines several values should call `compiled`
/// once and work from that.
pub trait GraphModel: Send + Sync {
    fn compiled(&self) -> Arc<CompiledGraph>;
    fn is_busy(&self) -> bool;
    fn set_busy(&self, busy: bool);

    fn dependent_activities(&self) -> Option<Vec<Activity>> {
        self.compiled().dependent_activities.clone()
    }

    fn has_compilation_errors(&self) -> bool {
        self.compiled().has_compilation_errors
    }

    fn has_stale_outputs(&self) -> bool {
        self.compiled().has_stale_outputs
    }

    fn cyclomatic_complexity(&self) -> Option<u32> {
        self.compiled().cyclomatic_complexity
    }

    fn duration_man_days(&self) -> Option<u32> {
        self.compiled().duration_man_days
    }

    fn use_business_days(&self) -> bool {
        self.compiled().use_business_days
    }

    fn direct_cost(&self) -> Option<f64> {
        self.compiled().costs.direct
    }

    fn indirect_cost(&self) -> Option<f64> {
        self.compiled().costs.indirect
    }

    fn other_cost(&self) -> Option<f64> {
        self.compiled().costs.other
    }

    fn total_cost(&self) -> Option<f64> {
        self.compiled().costs.total()
    }
}

/// In-memory `GraphModel` holding the latest compilation output.
#[derive(Debug, Default)]
pub struct GraphState {
    compiled: ArcSwap<CompiledGraph>,
    busy: AtomicBool,
}

impl GraphState {
    pub fn new(compiled: CompiledGraph) -> Self {
        Self {
            compiled: ArcSwap::from_pointee(compiled),
            busy: AtomicBool::new(false),
        }
    }

    /// Install the output of a new compilation. Callers announce it with
    /// `PlannerEvent::GraphCompilationUpdated`.
    pub fn replace(&self, compiled: CompiledGraph) {
        self.compiled.store(Arc::new(compiled));
    }
}

impl GraphModel for GraphState {
    fn compiled(&self) -> Arc<CompiledGraph> {
        self.compiled.load_full()
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}
