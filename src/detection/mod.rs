mod detector;
mod ledger;
mod record;

pub use detector::ObjectDetector;
pub use ledger::ThreatLedger;
pub use record::{BoundingBox, DetectionRecord, ThreatLabels};
