pub mod cli;
pub mod config;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod project;
pub mod render;

pub use config::StorycutConfig;
pub use pipeline::{Pipeline, RunReport, SplitOutcome};
