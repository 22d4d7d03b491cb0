use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::config::CameraConfig;

use super::{CaptureError, Frame, FrameSource};

/// Captures frames by running ffmpeg as a child process and reading raw
/// BGR24 frames from its stdout. The input may be a local V4L2 device or an
/// rtsp:// URL.
pub struct FfmpegSource {
    config: CameraConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            child: None,
            stdout: None,
        }
    }

    fn frame_len(&self) -> usize {
        Frame::byte_len(self.config.width, self.config.height)
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn spawn_ffmpeg(&self) -> Result<Child, CaptureError> {
        Command::new("ffmpeg")
            .args(build_args(&self.config))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CaptureError::FfmpegNotFound
                } else {
                    CaptureError::Io(e)
                }
            })
    }
}

impl FrameSource for FfmpegSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.is_alive() {
            return Ok(());
        }

        let mut child = self.spawn_ffmpeg()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::DeviceUnavailable("failed to capture ffmpeg stdout".to_string())
        })?;

        self.child = Some(child);
        self.stdout = Some(stdout);

        tracing::info!(
            camera = %self.config.id,
            input = %self.config.input,
            "capture started"
        );
        Ok(())
    }

    fn read(&mut self) -> Option<Frame> {
        if !self.is_alive() {
            tracing::warn!(camera = %self.config.id, "ffmpeg process died, restarting");
            self.release();
            if let Err(e) = self.open() {
                tracing::error!(camera = %self.config.id, error = %e, "failed to restart capture");
                return None;
            }
        }

        let len = self.frame_len();
        let stdout = self.stdout.as_mut()?;
        let mut data = vec![0u8; len];

        match stdout.read_exact(&mut data) {
            Ok(()) => Some(Frame {
                width: self.config.width,
                height: self.config.height,
                data,
            }),
            Err(e) => {
                tracing::warn!(camera = %self.config.id, error = %e, "frame read failed");
                None
            }
        }
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_args(config: &CameraConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
    ];

    if config.input.starts_with("rtsp://") {
        args.extend(["-rtsp_transport".into(), "tcp".into()]);
    } else {
        args.extend([
            "-f".into(),
            "v4l2".into(),
            "-framerate".into(),
            config.fps.to_string(),
            "-video_size".into(),
            format!("{}x{}", config.width, config.height),
        ]);
    }

    args.extend([
        "-i".into(),
        config.input.clone(),
        "-vf".into(),
        format!("scale={}:{}", config.width, config.height),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "bgr24".into(),
        "-".into(),
    ]);

    args
}
