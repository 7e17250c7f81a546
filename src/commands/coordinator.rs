use crate::analysis::calendar::{CalendarService, WorkingCalendar};
use crate::analysis::duration::man_days_to_man_months;
use crate::analysis::risk::{ProjectMetricsService, RiskCalculator};
use crate::commands::events::{EventAggregator, PlannerEvent, SubscriptionId};
use crate::commands::graph::GraphModel;
use crate::error::{PlannerError, Result};
use crate::models::activity::{Activity, ActivitySeverity};
use crate::models::graph::CompiledGraph;
use crate::models::metrics::{
    GraphMetrics, MetricsSnapshot, MetricsView, PublishedMetrics, RiskMetrics, SharedMetrics,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Owns the derived project metrics and recomputes them whenever the graph
/// compiler announces a new compilation.
///
/// Recomputes are serialised by one lock and never coalesced. Each one reads
/// a single compilation from the graph and ends with one atomic swap of the
/// published snapshot, so readers see either the previous or the next
/// snapshot and nothing in between.
///
/// Events are published outside the recompute lock, so subscribers may
/// trigger another recompute from their handler. With concurrent triggers
/// `MetricsChanged` events can arrive out of revision order; `current()` is
/// always the highest revision.
pub struct MetricsCoordinator {
    graph: Arc<dyn GraphModel>,
    metrics_service: Arc<dyn ProjectMetricsService>,
    calendar: Arc<dyn CalendarService>,
    events: Arc<EventAggregator>,
    severities: ArcSwapOption<Vec<ActivitySeverity>>,
    current: ArcSwap<PublishedMetrics>,
    /// Guards the recompute sequence; holds the last issued revision.
    recompute_lock: Mutex<u64>,
    /// Recomputes in flight; the busy flag is up while this is non-zero.
    busy_depth: Mutex<usize>,
    subscription: SubscriptionId,
}

#[derive(Default)]
pub struct MetricsCoordinatorBuilder {
    graph: Option<Arc<dyn GraphModel>>,
    metrics_service: Option<Arc<dyn ProjectMetricsService>>,
    calendar: Option<Arc<dyn CalendarService>>,
    events: Option<Arc<EventAggregator>>,
    severities: Option<Vec<ActivitySeverity>>,
}

impl MetricsCoordinatorBuilder {
    pub fn graph(mut self, graph: Arc<dyn GraphModel>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn metrics_service(mut self, service: Arc<dyn ProjectMetricsService>) -> Self {
        self.metrics_service = Some(service);
        self
    }

    pub fn calendar(mut self, calendar: Arc<dyn CalendarService>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn events(mut self, events: Arc<EventAggregator>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn activity_severities(mut self, severities: Vec<ActivitySeverity>) -> Self {
        self.severities = Some(severities);
        self
    }

    /// Build the coordinator and subscribe it to `GraphCompilationUpdated`.
    /// The subscription is dropped together with the coordinator.
    pub fn build(self) -> Result<Arc<MetricsCoordinator>> {
        let graph = self.graph.ok_or(PlannerError::MissingCollaborator("graph"))?;
        let metrics_service = self
            .metrics_service
            .ok_or(PlannerError::MissingCollaborator("metrics_service"))?;
        let calendar = self
            .calendar
            .ok_or(PlannerError::MissingCollaborator("calendar"))?;
        let events = self.events.ok_or(PlannerError::MissingCollaborator("events"))?;
        let severities = self.severities.map(Arc::new);

        let coordinator = Arc::new_cyclic(|weak: &Weak<MetricsCoordinator>| {
            let weak = weak.clone();
            let subscription = events.subscribe(move |event| {
                if matches!(event, PlannerEvent::GraphCompilationUpdated) {
                    if let Some(coordinator) = weak.upgrade() {
                        coordinator.on_graph_compilation_updated();
                    }
                }
            });

            MetricsCoordinator {
                graph,
                metrics_service,
                calendar,
                events: Arc::clone(&events),
                severities: ArcSwapOption::new(severities),
                current: ArcSwap::from_pointee(PublishedMetrics::initial()),
                recompute_lock: Mutex::new(0),
                busy_depth: Mutex::new(0),
                subscription,
            }
        });

        log::debug!("metrics coordinator subscribed as {}", coordinator.subscription);
        Ok(coordinator)
    }
}

impl MetricsCoordinator {
    pub fn builder() -> MetricsCoordinatorBuilder {
        MetricsCoordinatorBuilder::default()
    }

    /// Coordinator backed by `RiskCalculator` and a default `WorkingCalendar`.
    pub fn with_defaults(
        graph: Arc<dyn GraphModel>,
        events: Arc<EventAggregator>,
    ) -> Result<Arc<MetricsCoordinator>> {
        Self::builder()
            .graph(graph)
            .metrics_service(Arc::new(RiskCalculator))
            .calendar(Arc::new(WorkingCalendar::new()))
            .events(events)
            .build()
    }

    /// Recompute every metric group from the current compilation and
    /// publish the result. Blocks while another recompute holds the lock.
    pub fn on_graph_compilation_updated(&self) -> SharedMetrics {
        let busy = BusyGuard::enter(self);

        let published = {
            let mut revision = self
                .recompute_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let compiled = self.graph.compiled();
            let snapshot = MetricsSnapshot {
                risk: self.compute_risk_metrics(&compiled),
                graph: self.compute_graph_metrics(&compiled),
            };

            *revision += 1;
            let published = Arc::new(PublishedMetrics {
                revision: *revision,
                computed_at: Utc::now(),
                snapshot,
            });
            self.current.store(Arc::clone(&published));
            published
        };

        log::info!(
            "metrics revision {} published (risk: {}, complexity: {:?}, man-months: {:?})",
            published.revision,
            if published.snapshot.risk.is_some() { "set" } else { "cleared" },
            published.snapshot.graph.cyclomatic_complexity,
            published.snapshot.graph.duration_man_months,
        );
        self.events.publish(&PlannerEvent::MetricsChanged(Arc::clone(&published)));

        drop(busy);
        published
    }

    fn compute_risk_metrics(&self, compiled: &CompiledGraph) -> Option<RiskMetrics> {
        let activities = match compiled.dependent_activities.as_deref() {
            Some(activities) if !activities.is_empty() => activities,
            _ => {
                log::debug!("no dependent activities; risk metrics cleared");
                return None;
            }
        };
        if compiled.has_compilation_errors {
            log::warn!("graph has compilation errors; risk metrics cleared");
            return None;
        }

        let activities: Vec<Activity> = activities.iter().filter(|a| !a.is_dummy).cloned().collect();
        let severities = self.severities.load_full();
        Some(
            self.metrics_service
                .compute(&activities, severities.as_deref().map(Vec::as_slice)),
        )
    }

    fn compute_graph_metrics(&self, compiled: &CompiledGraph) -> GraphMetrics {
        if compiled.has_compilation_errors {
            log::warn!("graph has compilation errors; complexity and duration cleared");
            return GraphMetrics::default();
        }

        let duration_man_months = compiled.duration_man_days.and_then(|man_days| {
            self.calendar.set_business_day_mode(compiled.use_business_days);
            man_days_to_man_months(man_days, self.calendar.days_per_week())
        });

        GraphMetrics {
            cyclomatic_complexity: compiled.cyclomatic_complexity,
            duration_man_months,
        }
    }

    /// Raises the flag for the first recompute in flight and lowers it after
    /// the last; the event goes out after the depth lock is released.
    fn adjust_busy(&self, entering: bool) {
        let changed = {
            let mut depth = self.busy_depth.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = if entering {
                *depth += 1;
                *depth == 1
            } else {
                *depth = depth.saturating_sub(1);
                *depth == 0
            };
            if changed {
                self.graph.set_busy(entering);
            }
            changed
        };
        if changed {
            self.events.publish(&PlannerEvent::BusyChanged(entering));
        }
    }

    pub fn current(&self) -> SharedMetrics {
        self.current.load_full()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.current.load().snapshot
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    pub fn activity_severities(&self) -> Option<Vec<ActivitySeverity>> {
        self.severities.load_full().map(|s| s.as_ref().clone())
    }

    /// Takes effect on the next recompute.
    pub fn set_activity_severities(&self, severities: Option<Vec<ActivitySeverity>>) {
        self.severities.store(severities.map(Arc::new));
    }

    /// Week length the calendar uses in business-day mode. Takes effect on
    /// the next recompute.
    pub fn set_business_days_per_week(&self, days: u32) {
        self.calendar.set_business_days_per_week(days);
    }

    pub fn is_busy(&self) -> bool {
        self.graph.is_busy()
    }

    pub fn has_compilation_errors(&self) -> bool {
        self.graph.has_compilation_errors()
    }

    pub fn has_stale_outputs(&self) -> bool {
        self.graph.has_stale_outputs()
    }

    pub fn direct_cost(&self) -> Option<f64> {
        self.graph.direct_cost()
    }

    pub fn indirect_cost(&self) -> Option<f64> {
        self.graph.indirect_cost()
    }

    pub fn other_cost(&self) -> Option<f64> {
        self.graph.other_cost()
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.graph.total_cost()
    }

    pub fn view(&self) -> MetricsView {
        let current = self.current();
        let snapshot = current.snapshot;
        let compiled = self.graph.compiled();
        MetricsView {
            revision: current.revision,
            computed_at: current.computed_at,
            is_busy: self.is_busy(),
            criticality_risk: snapshot.criticality_risk(),
            fibonacci_risk: snapshot.fibonacci_risk(),
            activity_risk: snapshot.activity_risk(),
            activity_risk_std_dev_corrected: snapshot.activity_risk_std_dev_corrected(),
            geometric_criticality_risk: snapshot.geometric_criticality_risk(),
            geometric_fibonacci_risk: snapshot.geometric_fibonacci_risk(),
            geometric_activity_risk: snapshot.geometric_activity_risk(),
            cyclomatic_complexity: snapshot.cyclomatic_complexity(),
            duration_man_months: snapshot.duration_man_months(),
            has_compilation_errors: compiled.has_compilation_errors,
            has_stale_outputs: compiled.has_stale_outputs,
            direct_cost: compiled.costs.direct,
            indirect_cost: compiled.costs.indirect,
            other_cost: compiled.costs.other,
            total_cost: compiled.costs.total(),
        }
    }
}

impl Drop for MetricsCoordinator {
    fn drop(&mut self) {
        self.events.unsubscribe(self.subscription);
    }
}

impl std::fmt::Debug for MetricsCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCoordinator")
            .field("subscription", &self.subscription)
            .field("current", &self.current.load_full())
            .finish_non_exhaustive()
    }
}

/// Holds the busy flag up for the lifetime of a recompute.
struct BusyGuard<'a> {
    coordinator: &'a MetricsCoordinator,
}

impl<'a> BusyGuard<'a> {
    fn enter(coordinator: &'a MetricsCoordinator) -> Self {
        coordinator.adjust_busy(true);
        Self { coordinator }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.adjust_busy(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::graph::GraphState;
    use crate::models::graph::CompiledGraph;

    /// Records the activities it was asked about and returns fixed metrics.
    #[derive(Default)]
    struct RecordingService {
        seen: Mutex<Vec<Vec<u32>>>,
    }

    impl ProjectMetricsService for RecordingService {
        fn compute(&self, activities: &[Activity], _severities: Option<&[ActivitySeverity]>) -> RiskMetrics {
            self.seen
                .lock()
                .unwrap()
                .push(activities.iter().map(|a| a.id).collect());
            RiskMetrics {
                criticality: 0.1,
                fibonacci: 0.2,
                activity: 0.3,
                activity_std_dev_corrected: 0.4,
                geometric_criticality: 0.5,
                geometric_fibonacci: 0.6,
                geometric_activity: 0.7,
            }
        }
    }

    fn valid_graph() -> CompiledGraph {
        CompiledGraph {
            dependent_activities: Some(vec![
                Activity::new(1, "design", 5).with_slack(0),
                Activity::dummy(2),
                Activity::new(3, "build", 10).with_slack(4).with_dependencies(vec![1]),
            ]),
            cyclomatic_complexity: Some(2),
            duration_man_days: Some(260),
            use_business_days: true,
            ..CompiledGraph::default()
        }
    }

    fn coordinator_with(
        compiled: CompiledGraph,
    ) -> (Arc<MetricsCoordinator>, Arc<GraphState>, Arc<RecordingService>) {
        let graph = Arc::new(GraphState::new(compiled));
        let service = Arc::new(RecordingService::default());
        let coordinator = MetricsCoordinator::builder()
            .graph(graph.clone())
            .metrics_service(service.clone())
            .calendar(Arc::new(WorkingCalendar::new()))
            .events(EventAggregator::new())
            .build()
            .expect("build coordinator");
        (coordinator, graph, service)
    }

    #[test]
    fn starts_with_a_cleared_snapshot() {
        let (coordinator, _, _) = coordinator_with(valid_graph());
        assert!(coordinator.snapshot().is_cleared());
        assert_eq!(coordinator.current().revision, 0);
    }

    #[test]
    fn dummy_activities_never_reach_the_metrics_service() {
        let (coordinator, _, service) = coordinator_with(valid_graph());
        coordinator.on_graph_compilation_updated();

        assert_eq!(*service.seen.lock().unwrap(), vec![vec![1, 3]]);
        let risk = coordinator.snapshot().risk.expect("risk metrics populated");
        assert_eq!(risk.geometric_activity, 0.7);
    }

    #[test]
    fn compilation_errors_clear_both_groups() {
        let (coordinator, graph, service) = coordinator_with(valid_graph());
        coordinator.on_graph_compilation_updated();
        assert!(!coordinator.snapshot().is_cleared());

        graph.replace(CompiledGraph {
            has_compilation_errors: true,
            ..valid_graph()
        });
        coordinator.on_graph_compilation_updated();

        assert!(coordinator.snapshot().is_cleared());
        assert_eq!(service.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_activities_clear_only_the_risk_group() {
        let (coordinator, _, service) = coordinator_with(CompiledGraph {
            dependent_activities: Some(Vec::new()),
            ..valid_graph()
        });
        coordinator.on_graph_compilation_updated();

        let snapshot = coordinator.snapshot();
        assert!(snapshot.risk.is_none());
        assert_eq!(snapshot.cyclomatic_complexity(), Some(2));
        assert!(service.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn business_day_duration_converts_to_man_months() {
        let (coordinator, _, _) = coordinator_with(valid_graph());
        coordinator.on_graph_compilation_updated();

        let months = coordinator.snapshot().duration_man_months().expect("duration set");
        assert!((months - 12.0).abs() < 1e-9);
    }

    #[test]
    fn calendar_day_flag_is_read_at_computation_time() {
        let (coordinator, graph, _) = coordinator_with(valid_graph());
        graph.replace(CompiledGraph {
            duration_man_days: Some(364),
            use_business_days: false,
            ..valid_graph()
        });
        coordinator.on_graph_compilation_updated();

        let months = coordinator.snapshot().duration_man_months().expect("duration set");
        assert!((months - 12.0).abs() < 1e-9);
    }

    #[test]
    fn absent_duration_leaves_man_months_absent() {
        let (coordinator, _, _) = coordinator_with(CompiledGraph {
            duration_man_days: None,
            ..valid_graph()
        });
        coordinator.on_graph_compilation_updated();

        assert_eq!(coordinator.snapshot().duration_man_months(), None);
        assert_eq!(coordinator.snapshot().cyclomatic_complexity(), Some(2));
    }

    #[test]
    fn busy_is_released_after_recompute() {
        let (coordinator, graph, _) = coordinator_with(valid_graph());
        coordinator.on_graph_compilation_updated();
        assert!(!graph.is_busy());
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn revisions_increase_and_output_is_stable() {
        let (coordinator, _, _) = coordinator_with(valid_graph());
        let first = coordinator.on_graph_compilation_updated();
        let second = coordinator.on_graph_compilation_updated();

        assert_eq!(first.revision + 1, second.revision);
        assert_eq!(first.snapshot, second.snapshot);
    }

    #[test]
    fn missing_collaborators_are_rejected() {
        let err = MetricsCoordinator::builder()
            .graph(Arc::new(GraphState::default()))
            .events(EventAggregator::new())
            .calendar(Arc::new(WorkingCalendar::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, PlannerError::MissingCollaborator("metrics_service")));

        let err = MetricsCoordinator::builder().build().unwrap_err();
        assert!(matches!(err, PlannerError::MissingCollaborator("graph")));
    }

    #[test]
    fn dropping_the_coordinator_unsubscribes_it() {
        let events = EventAggregator::new();
        let coordinator =
            MetricsCoordinator::with_defaults(Arc::new(GraphState::default()), events.clone())
                .expect("build coordinator");
        assert_eq!(events.subscriber_count(), 1);

        drop(coordinator);
        assert_eq!(events.subscriber_count(), 0);
    }

    /// Installs a broken compilation while the risk metrics are computed.
    struct RecompilingService {
        graph: Arc<GraphState>,
    }

    impl ProjectMetricsService for RecompilingService {
        fn compute(&self, activities: &[Activity], severities: Option<&[ActivitySeverity]>) -> RiskMetrics {
            self.graph.replace(CompiledGraph {
                has_compilation_errors: true,
                ..valid_graph()
            });
            RiskCalculator.compute(activities, severities)
        }
    }

    #[test]
    fn snapshot_comes_from_a_single_compilation() {
        let graph = Arc::new(GraphState::new(valid_graph()));
        let coordinator = MetricsCoordinator::builder()
            .graph(graph.clone())
            .metrics_service(Arc::new(RecompilingService { graph: graph.clone() }))
            .calendar(Arc::new(WorkingCalendar::new()))
            .events(EventAggregator::new())
            .build()
            .expect("build coordinator");

        let first = coordinator.on_graph_compilation_updated().snapshot;
        assert!(first.risk.is_some());
        assert_eq!(first.cyclomatic_complexity(), Some(2));
        assert!(first.duration_man_months().is_some());

        let second = coordinator.on_graph_compilation_updated().snapshot;
        assert!(second.is_cleared());
    }

    #[test]
    fn only_dummy_activities_publish_zero_risk() {
        let (coordinator, _, service) = coordinator_with(CompiledGraph {
            dependent_activities: Some(vec![Activity::dummy(1), Activity::dummy(2)]),
            ..valid_graph()
        });
        coordinator.on_graph_compilation_updated();
        assert_eq!(*service.seen.lock().unwrap(), vec![Vec::<u32>::new()]);

        let defaults = MetricsCoordinator::with_defaults(
            Arc::new(GraphState::new(CompiledGraph {
                dependent_activities: Some(vec![Activity::dummy(1)]),
                ..valid_graph()
            })),
            EventAggregator::new(),
        )
        .expect("build coordinator");
        let snapshot = defaults.on_graph_compilation_updated().snapshot;
        assert_eq!(snapshot.risk, Some(RiskMetrics::default()));
    }

    #[test]
    fn handlers_may_trigger_a_recompute_from_metrics_changed() {
        let events = EventAggregator::new();
        let coordinator =
            MetricsCoordinator::with_defaults(Arc::new(GraphState::new(valid_graph())), events.clone())
                .expect("build coordinator");

        let busy_log = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&busy_log);
        let hub = Arc::downgrade(&events);
        events.subscribe(move |event| match event {
            PlannerEvent::MetricsChanged(published) if published.revision == 1 => {
                if let Some(hub) = hub.upgrade() {
                    hub.publish(&PlannerEvent::GraphCompilationUpdated);
                }
            }
            PlannerEvent::BusyChanged(busy) => log.lock().unwrap().push(*busy),
            _ => {}
        });

        events.publish(&PlannerEvent::GraphCompilationUpdated);

        assert_eq!(coordinator.current().revision, 2);
        assert_eq!(*busy_log.lock().unwrap(), vec![true, false]);
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn week_length_is_set_on_the_coordinators_calendar() {
        let (coordinator, _, _) = coordinator_with(valid_graph());
        coordinator.set_business_days_per_week(4);

        let months = coordinator
            .on_graph_compilation_updated()
            .snapshot
            .duration_man_months()
            .expect("duration set");
        assert!((months - 260.0 / (4.0 * 52.0 / 12.0)).abs() < 1e-9);
    }
}
