use crate::commands::coordinator::MetricsCoordinator;
use crate::commands::events::{EventAggregator, PlannerEvent};
use crate::error::PlannerError;
use crate::models::metrics::MetricsView;
use std::sync::Arc;

pub async fn get_project_metrics(coordinator: Arc<MetricsCoordinator>) -> Result<MetricsView, String> {
    Ok(coordinator.view())
}

/// Run a recompute on the blocking pool and return the resulting view.
pub async fn recompute_project_metrics(
    coordinator: Arc<MetricsCoordinator>,
) -> Result<MetricsView, String> {
    let worker = Arc::clone(&coordinator);
    tokio::task::spawn_blocking(move || {
        worker.on_graph_compilation_updated();
    })
    .await
    .map_err(|e| PlannerError::Worker(e.to_string()).to_string())?;

    Ok(coordinator.view())
}

/// Announce a finished graph compilation. Subscribers run on a worker thread;
/// this returns once they have all been called.
pub async fn notify_graph_compiled(events: Arc<EventAggregator>) -> Result<(), String> {
    let handle = events
        .publish_on_worker(PlannerEvent::GraphCompilationUpdated)
        .map_err(|e| PlannerError::Worker(format!("could not spawn event worker: {e}")).to_string())?;

    tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| PlannerError::Worker(e.to_string()).to_string())?
        .map_err(|_| PlannerError::Worker("event worker panicked".to_string()).to_string())
}
