use crate::camera::Frame;

use super::DetectionRecord;

/// Inference backend seam. Implementations run the model over one frame and
/// return every detection above their own confidence threshold; they hold no
/// observable state between calls. Inference may be expensive, which is why
/// the pipeline gates it behind frame skipping.
pub trait ObjectDetector {
    fn detect(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<DetectionRecord>, Box<dyn std::error::Error + Send + Sync>>;
}
