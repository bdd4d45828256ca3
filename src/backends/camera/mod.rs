// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! A scan session needs one thing from a camera: bind a device to a preview
//! surface plus an analysis callback, and release it again later.
//!
//! ```text
//! ┌─────────────────────┐
//! │    Scan session     │
//! └──────────┬──────────┘
//!            │ bind(selector, outputs) / unbind()
//!            ▼
//! ┌─────────────────────┐
//! │  CameraBackend trait│
//! └──────────┬──────────┘
//!            │
//!     ┌──────┼───────────┐
//!     ▼      ▼           ▼
//! PipeWire  V4L2   Image files
//! ```

pub mod frame_loop;
pub mod image_files;
pub mod outputs;
mod pipeline;
pub mod pipewire;
pub mod types;
pub mod v4l2;

pub use image_files::ImageFileBackend;
pub use outputs::{CameraOutputs, PreviewReceiver, PreviewSurface};
pub use pipewire::PipeWireBackend;
pub use types::*;
pub use v4l2::V4l2Backend;

use tracing::debug;

/// Camera backend trait
///
/// Methods block (device negotiation, pipeline state changes), so async
/// callers run them on a blocking worker. A backend holds at most one binding.
pub trait CameraBackend: Send {
    /// Enumerate available cameras on this backend
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Start streaming the camera chosen by `selector` into `outputs`
    ///
    /// Frames are delivered on a backend-owned thread until [`unbind`](Self::unbind).
    /// Returns the device that was bound.
    fn bind(
        &mut self,
        selector: &CameraSelector,
        outputs: CameraOutputs,
    ) -> BackendResult<CameraDevice>;

    /// Stop streaming and release the device
    ///
    /// Idempotent; unbinding without a binding is a no-op.
    fn unbind(&mut self) -> BackendResult<()>;

    /// Check if a binding is currently active
    fn is_bound(&self) -> bool;

    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;
}

impl<T: CameraBackend + ?Sized> CameraBackend for Box<T> {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        (**self).enumerate_cameras()
    }

    fn bind(
        &mut self,
        selector: &CameraSelector,
        outputs: CameraOutputs,
    ) -> BackendResult<CameraDevice> {
        (**self).bind(selector, outputs)
    }

    fn unbind(&mut self) -> BackendResult<()> {
        (**self).unbind()
    }

    fn is_bound(&self) -> bool {
        (**self).is_bound()
    }

    fn backend_type(&self) -> CameraBackendType {
        (**self).backend_type()
    }
}

/// Get a concrete backend instance
///
/// `max_dimension` bounds the longer side of analysis frames. The image file
/// backend built here has no files; use [`ImageFileBackend::new`] to replay some.
pub fn get_backend(backend: CameraBackendType, max_dimension: u32) -> Box<dyn CameraBackend> {
    match backend {
        CameraBackendType::PipeWire => {
            Box::new(PipeWireBackend::new().with_max_dimension(max_dimension))
        }
        CameraBackendType::V4l2 => Box::new(V4l2Backend::new().with_max_dimension(max_dimension)),
        CameraBackendType::ImageFiles => Box::new(ImageFileBackend::new(Vec::new())),
    }
}

/// Which camera a session may use
///
/// Scanning wants a world-facing camera: the back camera of a phone or
/// tablet, or a USB webcam pointed at the code. Front cameras are never
/// selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSelector {
    /// Use exactly this device (backend-specific path)
    pub device_path: Option<String>,
    /// Accept devices with unknown mounting (USB webcams)
    pub allow_external: bool,
}

impl Default for CameraSelector {
    fn default() -> Self {
        Self {
            device_path: None,
            allow_external: true,
        }
    }
}

impl CameraSelector {
    /// Only back-facing cameras
    pub fn back_only() -> Self {
        Self {
            device_path: None,
            allow_external: false,
        }
    }

    /// Pin a device path
    pub fn with_device(mut self, path: impl Into<String>) -> Self {
        self.device_path = Some(path.into());
        self
    }

    /// Pick the device to bind
    ///
    /// A pinned device wins unless it is front-facing. Otherwise back-facing
    /// devices are preferred over external ones, keeping enumeration order.
    pub fn select<'a>(&self, devices: &'a [CameraDevice]) -> Option<&'a CameraDevice> {
        if let Some(path) = &self.device_path {
            let pinned = devices.iter().find(|d| &d.path == path)?;
            if pinned.facing == LensFacing::Front {
                debug!(path = %pinned.path, "Pinned camera is front-facing, refusing");
                return None;
            }
            return Some(pinned);
        }

        devices
            .iter()
            .find(|d| d.facing == LensFacing::Back)
            .or_else(|| {
                self.allow_external
                    .then(|| devices.iter().find(|d| d.facing == LensFacing::External))
                    .flatten()
            })
    }

    /// Like [`select`](Self::select), with an error naming what was missing
    pub fn resolve(&self, devices: &[CameraDevice]) -> BackendResult<CameraDevice> {
        self.select(devices).cloned().ok_or_else(|| {
            let wanted = match &self.device_path {
                Some(path) => format!("{path} (or it is front-facing)"),
                None if self.allow_external => "no back-facing or external camera".to_string(),
                None => "no back-facing camera".to_string(),
            };
            BackendError::DeviceNotFound(format!("{wanted}; {} device(s) found", devices.len()))
        })
    }
}
