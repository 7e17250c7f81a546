pub mod activity;
pub mod graph;
pub mod metrics;
