/// Measures per-frame processing cost and rolling FPS for the capture loop.
///
/// Purely observational: an overrun only produces a warning, never
/// backpressure.
pub struct PacingMonitor {
    frame_count: u64,
    loop_start_ms: u64,
    frame_start_ms: u64,
    overrun_warn_ms: u64,
}

impl PacingMonitor {
    pub fn new(now_ms: u64, overrun_warn_ms: u64) -> Self {
        Self {
            frame_count: 0,
            loop_start_ms: now_ms,
            frame_start_ms: now_ms,
            overrun_warn_ms,
        }
    }

    pub fn begin_frame(&mut self, now_ms: u64) {
        self.frame_count += 1;
        self.frame_start_ms = now_ms;
    }

    /// Returns the measured processing time for the frame just ended.
    pub fn end_frame(&self, now_ms: u64) -> u64 {
        let processing_ms = now_ms.saturating_sub(self.frame_start_ms);
        if processing_ms > self.overrun_warn_ms {
            tracing::warn!(processing_ms, "frame processing overran its budget");
        }
        processing_ms
    }

    /// Frames per second since the loop started; 0.0 before any time has
    /// elapsed rather than a division by zero.
    pub fn current_fps(&self, now_ms: u64) -> f64 {
        let elapsed_ms = now_ms.saturating_sub(self.loop_start_ms);
        if elapsed_ms == 0 {
            return 0.0;
        }
        self.frame_count as f64 / (elapsed_ms as f64 / 1000.0)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
