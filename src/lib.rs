pub mod analysis;
pub mod commands;
pub mod error;
pub mod models;

pub use commands::coordinator::{MetricsCoordinator, MetricsCoordinatorBuilder};
pub use commands::events::{EventAggregator, PlannerEvent, SubscriptionId};
pub use error::{PlannerError, Result};

/// Initialise `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
