pub mod coordinator;
pub mod events;
pub mod graph;
pub mod metrics;
pub mod settings;
