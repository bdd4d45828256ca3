// SPDX-License-Identifier: GPL-3.0-only

//! Image-file camera
//!
//! Replays still images as a looping frame stream, so scans can run without
//! camera hardware (demos, CI, scanning a screenshot). It reports itself as a
//! single back-facing device.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use super::{CameraBackend, CameraOutputs, CameraSelector};
use crate::constants::{file_formats, timing};
use crate::scanner::frame_slot::Delivery;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Device path reported for the image-file camera
pub const IMAGE_DEVICE_PATH: &str = "images";

/// Load an image file as a packed RGBA frame
pub fn load_image_as_frame(path: &Path) -> BackendResult<CameraFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !file_formats::is_image_extension(extension) {
        return Err(BackendError::Other(format!(
            "Unsupported image format: {}",
            path.display()
        )));
    }

    let rgba = image::open(path)
        .map_err(|e| BackendError::IoError(format!("Failed to load '{}': {e}", path.display())))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    debug!(path = %path.display(), width, height, "Image loaded");

    Ok(CameraFrame::packed(
        width,
        height,
        PixelFormat::RGBA,
        rgba.into_raw(),
    ))
}

/// Camera backend replaying image files
pub struct ImageFileBackend {
    paths: Vec<PathBuf>,
    interval: Duration,
    capture_loop: Option<CaptureLoopController>,
}

impl ImageFileBackend {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            interval: timing::IMAGE_STREAM_FRAME_DURATION,
            capture_loop: None,
        }
    }

    /// Change the delay between frames
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn device(&self) -> CameraDevice {
        CameraDevice {
            name: format!("Image files ({})", self.paths.len()),
            path: IMAGE_DEVICE_PATH.to_string(),
            rotation: SensorRotation::None,
            facing: LensFacing::Back,
        }
    }
}

impl CameraBackend for ImageFileBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        if self.paths.is_empty() {
            Vec::new()
        } else {
            vec![self.device()]
        }
    }

    fn bind(
        &mut self,
        selector: &CameraSelector,
        outputs: CameraOutputs,
    ) -> BackendResult<CameraDevice> {
        if self.capture_loop.is_some() {
            return Err(BackendError::AlreadyBound);
        }
        let device = selector.resolve(&self.enumerate_cameras())?;

        let frames = self
            .paths
            .iter()
            .map(|path| load_image_as_frame(path))
            .collect::<BackendResult<Vec<_>>>()?;
        info!(count = frames.len(), "Streaming image files");

        let mut next = 0usize;
        let controller =
            CaptureLoopController::start("image-files", self.interval, move || {
                let mut frame = frames[next % frames.len()].clone();
                next = next.wrapping_add(1);
                frame.captured_at = Instant::now();

                outputs.present(&frame);
                match outputs.analysis.deliver(frame, SensorRotation::None) {
                    Delivery::Closed => LoopAction::Stop,
                    Delivery::Queued | Delivery::Replaced => LoopAction::Continue,
                }
            })
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        self.capture_loop = Some(controller);
        Ok(device)
    }

    fn unbind(&mut self) -> BackendResult<()> {
        if let Some(mut controller) = self.capture_loop.take() {
            controller.stop();
            info!("Image file stream stopped");
        }
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.capture_loop.is_some()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::ImageFiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::frame_slot::{FrameSink, LatestFrameSlot};
    use std::sync::Arc;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]))
            .save(&path)
            .expect("write test image");
        path
    }

    #[test]
    fn test_load_image_as_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_png(dir.path(), "white.png", 3, 2);

        let frame = load_image_as_frame(&path).expect("load image");
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.format, PixelFormat::RGBA);
        assert!(frame.is_complete());

        assert!(load_image_as_frame(&dir.path().join("notes.txt")).is_err());
    }

    #[tokio::test]
    async fn test_bind_streams_frames_until_unbound() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_png(dir.path(), "a.png", 4, 4);

        let slot = Arc::new(LatestFrameSlot::new());
        let mut backend =
            ImageFileBackend::new(vec![path]).with_interval(Duration::from_millis(1));
        let device = backend
            .bind(
                &CameraSelector::back_only(),
                CameraOutputs::new(FrameSink::new(Arc::clone(&slot)), None),
            )
            .expect("bind image files");
        assert_eq!(device.facing, LensFacing::Back);
        assert!(backend.is_bound());

        let frame = slot.next().await.expect("first frame");
        assert_eq!(frame.frame().width, 4);

        backend.unbind().expect("unbind");
        assert!(!backend.is_bound());
    }

    #[test]
    fn test_missing_file_fails_bind() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut backend = ImageFileBackend::new(vec![PathBuf::from("/nonexistent/qr.png")]);
        let result = backend.bind(
            &CameraSelector::default(),
            CameraOutputs::new(FrameSink::new(slot), None),
        );
        assert!(result.is_err());
        assert!(!backend.is_bound());
    }
}
