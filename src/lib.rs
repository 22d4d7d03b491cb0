pub mod camera;
pub mod config;
pub mod detection;
pub mod display;
pub mod pipeline;

pub use camera::{CaptureError, FfmpegSource, Frame, FrameSource};
pub use config::Config;
pub use detection::{BoundingBox, DetectionRecord, ObjectDetector, ThreatLabels, ThreatLedger};
pub use display::{Annotation, FrameSink, Highlight};
pub use pipeline::{spawn_pipeline, PacingMonitor, PipelineError, SecurityPipeline, StopHandle};
