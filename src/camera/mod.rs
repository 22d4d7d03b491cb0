mod ffmpeg;

pub use ffmpeg::FfmpegSource;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg not found")]
    FfmpegNotFound,
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// One captured video frame, packed BGR24.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Capture device seam.
///
/// `read` returning `None` means "no frame right now, try again next cycle";
/// it is never fatal and must be safe to call repeatedly after a failure.
/// `release` must be idempotent.
pub trait FrameSource {
    fn open(&mut self) -> Result<(), CaptureError>;
    fn read(&mut self) -> Option<Frame>;
    fn release(&mut self);
}
