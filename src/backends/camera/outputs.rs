// SPDX-License-Identifier: GPL-3.0-only

//! Targets a camera binding feeds: the preview surface and the analysis sink

use super::types::CameraFrame;
use crate::scanner::frame_slot::FrameSink;
use tokio::sync::watch;

/// Preview target
///
/// Holds only the most recent frame; the UI reads it at its own refresh rate.
/// Frames are copied before being published so the preview never pins camera
/// buffers.
#[derive(Debug, Clone)]
pub struct PreviewSurface {
    sender: watch::Sender<Option<CameraFrame>>,
}

/// UI side of a [`PreviewSurface`]
pub type PreviewReceiver = watch::Receiver<Option<CameraFrame>>;

impl PreviewSurface {
    /// Create a surface and the receiver the UI renders from
    pub fn channel() -> (Self, PreviewReceiver) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }

    /// Publish a frame; a no-op once every receiver is gone
    pub fn present(&self, frame: &CameraFrame) {
        self.sender.send_replace(Some(frame.to_copied()));
    }

    /// Blank the surface after the camera is released
    pub fn clear(&self) {
        self.sender.send_replace(None);
    }
}

/// Everything a backend needs for one binding
#[derive(Debug, Clone)]
pub struct CameraOutputs {
    /// Optional: headless scans have nothing to show
    pub preview: Option<PreviewSurface>,
    /// Analysis callback feeding the scan session
    pub analysis: FrameSink,
}

impl CameraOutputs {
    pub fn new(analysis: FrameSink, preview: Option<PreviewSurface>) -> Self {
        Self { preview, analysis }
    }

    /// Show a frame on the preview, if there is one
    pub fn present(&self, frame: &CameraFrame) {
        if let Some(preview) = &self.preview {
            preview.present(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;

    #[test]
    fn test_preview_keeps_latest_frame() {
        let (surface, receiver) = PreviewSurface::channel();
        assert!(receiver.borrow().is_none());

        surface.present(&CameraFrame::packed(1, 1, PixelFormat::Gray8, vec![1]));
        surface.present(&CameraFrame::packed(2, 1, PixelFormat::Gray8, vec![1, 2]));
        assert_eq!(receiver.borrow().as_ref().map(|f| f.width), Some(2));

        surface.clear();
        assert!(receiver.borrow().is_none());
    }
}
