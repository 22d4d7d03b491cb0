use crate::camera::Frame;
use crate::detection::DetectionRecord;

/// Color class for a rendered box. Benign objects keep one fixed color;
/// threat boxes alternate between the two alert variants over the flash
/// cycle so they stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    Benign,
    ThreatPrimary,
    ThreatAlternate,
}

/// One box to draw, with its caption data.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub record: DetectionRecord,
    pub highlight: Highlight,
}

impl Annotation {
    /// Caption text, e.g. `knife 0.92`.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.record.label, self.record.confidence)
    }
}

/// Flash color for threat boxes at the given frame count: primary for the
/// first half of the cycle, alternate for the second half.
pub fn threat_highlight(frame_count: u64, flash_cycle_frames: u32) -> Highlight {
    let cycle = flash_cycle_frames.max(1) as u64;
    if frame_count % cycle < cycle / 2 {
        Highlight::ThreatPrimary
    } else {
        Highlight::ThreatAlternate
    }
}

/// Rendering seam. Side-effecting and fire-and-forget from the pipeline's
/// perspective; `close` must be idempotent.
pub trait FrameSink {
    fn show(&mut self, frame: &Frame, annotations: &[Annotation]);
    fn show_plain(&mut self, frame: &Frame);
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    #[test]
    fn test_flash_parity_over_cycle() {
        // 20-frame cycle: primary for frames 0..10, alternate for 10..20.
        for frame in 0..10u64 {
            assert_eq!(threat_highlight(frame, 20), Highlight::ThreatPrimary);
        }
        for frame in 10..20u64 {
            assert_eq!(threat_highlight(frame, 20), Highlight::ThreatAlternate);
        }
        assert_eq!(threat_highlight(20, 20), Highlight::ThreatPrimary);
    }

    #[test]
    fn test_flash_alternates_exactly_once_per_half_cycle() {
        let mut switches = 0;
        let mut last = threat_highlight(0, 20);
        for frame in 1..40u64 {
            let current = threat_highlight(frame, 20);
            if current != last {
                switches += 1;
                last = current;
            }
        }
        assert_eq!(switches, 3); // at frames 10, 20 and 30
    }

    #[test]
    fn test_caption_format() {
        let annotation = Annotation {
            record: DetectionRecord::new("knife", BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.917),
            highlight: Highlight::ThreatPrimary,
        };
        assert_eq!(annotation.caption(), "knife 0.92");
    }
}
