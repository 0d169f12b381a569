pub mod app;
pub mod config;
pub mod constants;
pub mod curie;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod types;
