use std::collections::HashSet;

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance between box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// One object detection from a single frame. Immutable once built; there is
/// no identity field, matching is by label plus spatial proximity.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl DetectionRecord {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence,
        }
    }
}

/// Configured set of labels that mark a detection as a threat.
/// Membership is case-insensitive.
#[derive(Debug, Clone)]
pub struct ThreatLabels {
    labels: HashSet<String>,
}

impl ThreatLabels {
    pub fn new<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|l| l.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.labels.contains(&label.to_lowercase())
    }
}
