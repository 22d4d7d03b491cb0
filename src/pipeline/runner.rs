use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::camera::{CaptureError, Frame, FrameSource};
use crate::config::Config;
use crate::detection::{DetectionRecord, ObjectDetector, ThreatLabels, ThreatLedger};
use crate::display::{threat_highlight, Annotation, FrameSink, Highlight};

use super::pacing::PacingMonitor;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("capture failed to open: {0}")]
    Capture(#[from] CaptureError),
}

/// Requests a cooperative stop from any thread, e.g. a signal handler. The
/// loop observes the flag at the top of each cycle; a cycle in progress
/// always completes.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the capture → detect → merge → render cycle.
///
/// Detection runs only every `frame_skip`-th frame; between detection frames
/// the previous results are reused unchanged, trading latency for compute.
/// Persisted threats from the ledger are merged into each frame's display
/// list so a threat stays on screen for its grace period after the detector
/// stops reporting it.
pub struct SecurityPipeline<S, D, K> {
    source: S,
    detector: D,
    sink: K,
    ledger: ThreatLedger,
    labels: ThreatLabels,
    pacing: PacingMonitor,
    epoch: Instant,
    frame_counter: u64,
    last_detections: Vec<DetectionRecord>,
    running: Arc<AtomicBool>,
    frame_skip: u64,
    matching_distance: f32,
    flash_cycle_frames: u32,
    sleep: Duration,
    fps_log_interval: u64,
}

impl<S, D, K> SecurityPipeline<S, D, K>
where
    S: FrameSource,
    D: ObjectDetector,
    K: FrameSink,
{
    pub fn new(config: &Config, source: S, detector: D, sink: K) -> Self {
        Self {
            source,
            detector,
            sink,
            ledger: ThreatLedger::from_config(&config.detection),
            labels: ThreatLabels::new(&config.detection.threat_labels),
            pacing: PacingMonitor::new(0, config.pacing.overrun_warn_ms),
            epoch: Instant::now(),
            frame_counter: 0,
            last_detections: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            frame_skip: config.detection.frame_skip as u64,
            matching_distance: config.detection.matching_distance,
            flash_cycle_frames: config.display.flash_cycle_frames,
            sleep: Duration::from_millis(config.pacing.sleep_ms),
            fps_log_interval: config.pacing.fps_log_interval.max(1),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Opens the capture source and blocks in the cycle loop until stopped.
    /// Starting an already-running pipeline is an error.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::AlreadyRunning);
        }

        if let Err(e) = self.source.open() {
            self.running.store(false, Ordering::Release);
            return Err(e.into());
        }

        tracing::info!("security pipeline running");

        while self.running.load(Ordering::Acquire) {
            self.cycle();
            thread::sleep(self.sleep);
        }

        tracing::info!("security pipeline stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Releases every resource and clears the ledger. Safe to call after an
    /// error exit or a partial startup; each step only touches its own
    /// resource.
    pub fn shutdown(&mut self) {
        self.stop();
        self.sink.close();
        self.source.release();
        self.ledger.clear();
        tracing::info!("security pipeline shutdown complete");
    }

    fn cycle(&mut self) {
        self.pacing.begin_frame(self.now_ms());

        match self.source.read() {
            Some(frame) => self.process_frame(&frame),
            None => tracing::warn!("failed to capture frame, camera may be disconnected"),
        }

        let now = self.now_ms();
        self.pacing.end_frame(now);
        if self.pacing.frame_count() % self.fps_log_interval == 0 {
            tracing::info!(
                fps = format!("{:.2}", self.pacing.current_fps(now)),
                "pacing"
            );
        }
    }

    fn process_frame(&mut self, frame: &Frame) {
        self.frame_counter += 1;

        if self.frame_counter % self.frame_skip == 0 {
            match self.detector.detect(frame) {
                Ok(detections) => {
                    self.last_detections = detections;
                    self.ledger.update(&self.last_detections, self.now_ms());
                    self.log_threats();
                }
                // Keep the previous detections; the next detection frame
                // will retry.
                Err(e) => tracing::error!(error = %e, "object detection failed"),
            }
        }

        let persisted = self.ledger.active_threats(self.now_ms());
        let merged = self.merge_display_list(persisted);

        if merged.is_empty() {
            self.sink.show_plain(frame);
        } else {
            let annotations = self.annotate(merged);
            self.sink.show(frame, &annotations);
        }
    }

    fn log_threats(&self) {
        for detection in &self.last_detections {
            if self.labels.matches(&detection.label) {
                tracing::warn!(
                    label = %detection.label,
                    confidence = format!("{:.2}", detection.confidence),
                    "threat detected"
                );
            }
        }
    }

    /// This frame's raw detections plus every persisted threat that does not
    /// duplicate an entry already in the list.
    fn merge_display_list(&self, persisted: Vec<DetectionRecord>) -> Vec<DetectionRecord> {
        let mut merged = self.last_detections.clone();
        for threat in persisted {
            let duplicate = merged
                .iter()
                .any(|existing| is_duplicate(existing, &threat, self.matching_distance));
            if !duplicate {
                merged.push(threat);
            }
        }
        merged
    }

    fn annotate(&self, merged: Vec<DetectionRecord>) -> Vec<Annotation> {
        let flash = threat_highlight(self.frame_counter, self.flash_cycle_frames);
        merged
            .into_iter()
            .map(|record| {
                let highlight = if self.labels.matches(&record.label) {
                    flash
                } else {
                    Highlight::Benign
                };
                Annotation { record, highlight }
            })
            .collect()
    }
}

/// Display-list duplicate check: same label and top-left corners within the
/// matching distance on each axis. Deliberately a different metric from the
/// ledger's Euclidean center distance.
fn is_duplicate(a: &DetectionRecord, b: &DetectionRecord, matching_distance: f32) -> bool {
    a.label == b.label
        && (a.bbox.x - b.bbox.x).abs() < matching_distance
        && (a.bbox.y - b.bbox.y).abs() < matching_distance
}

/// Runs the pipeline on the blocking thread pool and hands it back on join.
/// The returned handle stops it from any context.
pub fn spawn_pipeline<S, D, K>(
    mut pipeline: SecurityPipeline<S, D, K>,
) -> (
    StopHandle,
    tokio::task::JoinHandle<SecurityPipeline<S, D, K>>,
)
where
    S: FrameSource + Send + 'static,
    D: ObjectDetector + Send + 'static,
    K: FrameSink + Send + 'static,
{
    let stop = pipeline.stop_handle();
    let handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = pipeline.start() {
            tracing::error!(error = %e, "pipeline exited with error");
        }
        pipeline.shutdown();
        pipeline
    });
    (stop, handle)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::detection::BoundingBox;

    struct ScriptedSource {
        frames: VecDeque<Option<Frame>>,
        opened: bool,
        released: u32,
    }

    impl ScriptedSource {
        fn with_frames(count: usize) -> Self {
            Self {
                frames: (0..count).map(|_| Some(test_frame())).collect(),
                opened: false,
                released: 0,
            }
        }

        fn from_script(script: Vec<Option<Frame>>) -> Self {
            Self {
                frames: script.into(),
                opened: false,
                released: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<(), CaptureError> {
            self.opened = true;
            Ok(())
        }

        fn read(&mut self) -> Option<Frame> {
            self.frames.pop_front().flatten()
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    struct ScriptedDetector {
        responses: VecDeque<Vec<DetectionRecord>>,
        calls: u32,
    }

    impl ScriptedDetector {
        fn new(responses: Vec<Vec<DetectionRecord>>) -> Self {
            Self {
                responses: responses.into(),
                calls: 0,
            }
        }
    }

    impl ObjectDetector for ScriptedDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
        ) -> Result<Vec<DetectionRecord>, Box<dyn std::error::Error + Send + Sync>> {
            self.calls += 1;
            Ok(self.responses.pop_front().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        shown: Vec<Vec<Annotation>>,
        plain: u32,
        closed: u32,
    }

    impl FrameSink for RecordingSink {
        fn show(&mut self, _frame: &Frame, annotations: &[Annotation]) {
            self.shown.push(annotations.to_vec());
        }

        fn show_plain(&mut self, _frame: &Frame) {
            self.plain += 1;
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    fn test_frame() -> Frame {
        Frame {
            width: 4,
            height: 4,
            data: vec![0; 48],
        }
    }

    fn knife(x: f32, y: f32) -> DetectionRecord {
        DetectionRecord::new("knife", BoundingBox::new(x, y, 20.0, 20.0), 0.9)
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.detection.timeout_ms = 60_000;
        config
    }

    fn make_pipeline(
        config: &Config,
        source: ScriptedSource,
        detector: ScriptedDetector,
    ) -> SecurityPipeline<ScriptedSource, ScriptedDetector, RecordingSink> {
        SecurityPipeline::new(config, source, detector, RecordingSink::default())
    }

    #[test]
    fn test_detection_runs_only_on_skip_frames() {
        let config = test_config(); // frame_skip = 5
        let source = ScriptedSource::with_frames(10);
        let detector = ScriptedDetector::new(vec![vec![knife(10.0, 10.0)]]);
        let mut pipeline = make_pipeline(&config, source, detector);

        for _ in 0..4 {
            pipeline.cycle();
        }
        assert_eq!(pipeline.detector.calls, 0);
        // No detections, no persisted threats: plain frames only.
        assert_eq!(pipeline.sink.plain, 4);

        pipeline.cycle();
        assert_eq!(pipeline.detector.calls, 1);
        assert_eq!(pipeline.sink.shown.len(), 1);

        // Frames 6-9 reuse the frame-5 detections unchanged.
        for _ in 0..4 {
            pipeline.cycle();
        }
        assert_eq!(pipeline.detector.calls, 1);
        assert_eq!(pipeline.sink.shown.len(), 5);
        for annotations in &pipeline.sink.shown {
            assert_eq!(annotations.len(), 1);
            assert_eq!(annotations[0].record.label, "knife");
        }

        // Frame 10 refreshes.
        pipeline.cycle();
        assert_eq!(pipeline.detector.calls, 2);
    }

    #[test]
    fn test_persisted_threat_survives_empty_refresh() {
        let mut config = test_config();
        config.detection.frame_skip = 1;
        let source = ScriptedSource::with_frames(3);
        // Detected once, then gone from the raw stream.
        let detector = ScriptedDetector::new(vec![vec![knife(10.0, 10.0)], vec![], vec![]]);
        let mut pipeline = make_pipeline(&config, source, detector);

        for _ in 0..3 {
            pipeline.cycle();
        }

        // The ledger keeps it visible every frame.
        assert_eq!(pipeline.sink.shown.len(), 3);
        assert_eq!(pipeline.sink.shown[2].len(), 1);
        assert_eq!(pipeline.sink.shown[2][0].record.label, "knife");
    }

    #[test]
    fn test_merge_dedup_suppresses_nearby_persisted() {
        let config = test_config();
        let source = ScriptedSource::with_frames(0);
        let detector = ScriptedDetector::new(vec![]);
        let mut pipeline = make_pipeline(&config, source, detector);

        pipeline.last_detections = vec![knife(10.0, 10.0)];

        // Within the top-left delta on both axes: suppressed.
        let merged = pipeline.merge_display_list(vec![knife(50.0, 50.0)]);
        assert_eq!(merged.len(), 1);

        // Far on one axis: kept.
        let merged = pipeline.merge_display_list(vec![knife(150.0, 10.0)]);
        assert_eq!(merged.len(), 2);

        // Different label at the same spot: kept.
        let scissors =
            DetectionRecord::new("scissors", BoundingBox::new(10.0, 10.0, 20.0, 20.0), 0.8);
        let merged = pipeline.merge_display_list(vec![scissors]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_capture_failure_skips_render_but_counts_frame() {
        let config = test_config();
        let source = ScriptedSource::from_script(vec![None, Some(test_frame())]);
        let detector = ScriptedDetector::new(vec![]);
        let mut pipeline = make_pipeline(&config, source, detector);

        pipeline.cycle();
        assert_eq!(pipeline.frame_counter, 0);
        assert_eq!(pipeline.sink.plain, 0);
        assert!(pipeline.sink.shown.is_empty());
        assert_eq!(pipeline.pacing.frame_count(), 1);

        pipeline.cycle();
        assert_eq!(pipeline.frame_counter, 1);
        assert_eq!(pipeline.sink.plain, 1);
        assert_eq!(pipeline.pacing.frame_count(), 2);
    }

    #[test]
    fn test_detector_error_keeps_previous_cache() {
        struct FailingDetector;
        impl ObjectDetector for FailingDetector {
            fn detect(
                &mut self,
                _frame: &Frame,
            ) -> Result<Vec<DetectionRecord>, Box<dyn std::error::Error + Send + Sync>> {
                Err("inference backend gone".into())
            }
        }

        let mut config = test_config();
        config.detection.frame_skip = 1;
        let mut pipeline = SecurityPipeline::new(
            &config,
            ScriptedSource::with_frames(1),
            FailingDetector,
            RecordingSink::default(),
        );
        pipeline.last_detections = vec![knife(10.0, 10.0)];

        pipeline.cycle();

        assert_eq!(pipeline.last_detections.len(), 1);
        assert_eq!(pipeline.sink.shown.len(), 1);
    }

    #[test]
    fn test_annotations_flash_with_frame_counter() {
        let mut config = test_config();
        config.display.flash_cycle_frames = 20;
        let mut pipeline = make_pipeline(
            &config,
            ScriptedSource::with_frames(0),
            ScriptedDetector::new(vec![]),
        );

        let benign = DetectionRecord::new("cup", BoundingBox::new(0.0, 0.0, 5.0, 5.0), 0.5);

        pipeline.frame_counter = 3;
        let annotations = pipeline.annotate(vec![knife(10.0, 10.0), benign.clone()]);
        assert_eq!(annotations[0].highlight, Highlight::ThreatPrimary);
        assert_eq!(annotations[1].highlight, Highlight::Benign);

        pipeline.frame_counter = 13;
        let annotations = pipeline.annotate(vec![knife(10.0, 10.0), benign]);
        assert_eq!(annotations[0].highlight, Highlight::ThreatAlternate);
        assert_eq!(annotations[1].highlight, Highlight::Benign);
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let mut pipeline = make_pipeline(
            &test_config(),
            ScriptedSource::with_frames(0),
            ScriptedDetector::new(vec![]),
        );
        pipeline.running.store(true, Ordering::Release);

        assert!(matches!(
            pipeline.start(),
            Err(PipelineError::AlreadyRunning)
        ));
        // The failed start must not clear the running flag it did not set.
        assert!(pipeline.running.load(Ordering::Acquire));
    }

    #[test]
    fn test_shutdown_releases_everything_and_is_repeatable() {
        let mut config = test_config();
        config.detection.frame_skip = 1;
        let mut pipeline = make_pipeline(
            &config,
            ScriptedSource::with_frames(1),
            ScriptedDetector::new(vec![vec![knife(10.0, 10.0)]]),
        );

        pipeline.cycle();
        assert_eq!(pipeline.ledger.entry_count(), 1);

        pipeline.shutdown();
        assert_eq!(pipeline.sink.closed, 1);
        assert_eq!(pipeline.source.released, 1);
        assert_eq!(pipeline.ledger.entry_count(), 0);

        pipeline.shutdown();
        assert_eq!(pipeline.sink.closed, 2);
        assert_eq!(pipeline.source.released, 2);
    }
}
