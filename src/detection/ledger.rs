use crate::config::DetectionConfig;

use super::record::{BoundingBox, DetectionRecord, ThreatLabels};

struct ThreatEntry {
    label: String,
    bbox: BoundingBox,
    confidence: f32,
    last_seen_ms: u64,
}

/// Tracks threat-labeled detections so they stay visible for a grace period
/// after the detector last reported them.
///
/// Matching is greedy first-match: a detection updates the first entry with
/// the same label whose box center lies within the matching distance, in
/// entry order. Entries past the timeout are removed during `update` and are
/// never visible to `active_threats`, which applies the same staleness bound
/// independently at read time. Between updates a stale entry may still sit in
/// the collection, but reads never expose it.
pub struct ThreatLedger {
    entries: Vec<ThreatEntry>,
    labels: ThreatLabels,
    matching_distance: f32,
    timeout_ms: u64,
}

impl ThreatLedger {
    pub fn new(labels: ThreatLabels, matching_distance: f32, timeout_ms: u64) -> Self {
        Self {
            entries: Vec::new(),
            labels,
            matching_distance,
            timeout_ms,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            ThreatLabels::new(&config.threat_labels),
            config.matching_distance,
            config.timeout_ms,
        )
    }

    /// Feed one frame's detections. Non-threat labels are ignored.
    pub fn update(&mut self, detections: &[DetectionRecord], now_ms: u64) {
        for detection in detections {
            if !self.labels.matches(&detection.label) {
                continue;
            }

            match self.find_match(detection) {
                Some(entry) => {
                    entry.bbox = detection.bbox;
                    entry.confidence = detection.confidence;
                    entry.last_seen_ms = now_ms;
                }
                None => {
                    tracing::debug!(label = %detection.label, "threat entry created");
                    self.entries.push(ThreatEntry {
                        label: detection.label.clone(),
                        bbox: detection.bbox,
                        confidence: detection.confidence,
                        last_seen_ms: now_ms,
                    });
                }
            }
        }

        self.evict_stale(now_ms);
    }

    fn find_match(&mut self, detection: &DetectionRecord) -> Option<&mut ThreatEntry> {
        let matching_distance = self.matching_distance;
        self.entries.iter_mut().find(|entry| {
            entry.label == detection.label
                && entry.bbox.center_distance(&detection.bbox) < matching_distance
        })
    }

    fn evict_stale(&mut self, now_ms: u64) {
        let timeout_ms = self.timeout_ms;
        let before = self.entries.len();
        self.entries
            .retain(|entry| now_ms.saturating_sub(entry.last_seen_ms) < timeout_ms);

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "threat entries expired");
        }
    }

    /// Snapshot of the entries still inside the grace period. Does not mutate
    /// the ledger; filtering is independent of the cleanup done in `update`.
    pub fn active_threats(&self, now_ms: u64) -> Vec<DetectionRecord> {
        self.entries
            .iter()
            .filter(|entry| now_ms.saturating_sub(entry.last_seen_ms) < self.timeout_ms)
            .map(|entry| DetectionRecord::new(entry.label.clone(), entry.bbox, entry.confidence))
            .collect()
    }

    /// Physical entry count, including entries already past the timeout that
    /// no cleanup pass has removed yet.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
