mod pacing;
mod runner;

pub use pacing::PacingMonitor;
pub use runner::{spawn_pipeline, PipelineError, SecurityPipeline, StopHandle};
