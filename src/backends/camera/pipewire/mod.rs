// SPDX-License-Identifier: MPL-2.0

//! PipeWire camera backend
//!
//! The recommended way to reach cameras on a modern Linux desktop; it works
//! inside Flatpak once the camera portal has granted access.

mod enumeration;

pub use enumeration::{enumerate_pipewire_cameras, is_pipewire_available};

use super::pipeline::AnalysisPipeline;
use super::types::*;
use super::{CameraBackend, CameraOutputs, CameraSelector};
use crate::constants::pipeline::DEFAULT_ANALYSIS_MAX_DIMENSION;
use tracing::{info, warn};

/// PipeWire backend implementation
pub struct PipeWireBackend {
    pipeline: Option<AnalysisPipeline>,
    max_dimension: u32,
}

impl Default for PipeWireBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeWireBackend {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            max_dimension: DEFAULT_ANALYSIS_MAX_DIMENSION,
        }
    }

    /// Bound the size of delivered frames
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }
}

/// `pipewiresrc` element description for a device path
///
/// Empty paths let PipeWire pick its default camera.
pub(crate) fn pipewire_source(device_path: &str) -> String {
    let target = if device_path.is_empty() {
        None
    } else if let Some(serial) = device_path.strip_prefix("pipewire-serial-") {
        Some(format!("target-object={serial}"))
    } else if let Some(node_id) = device_path.strip_prefix("pipewire-") {
        Some(format!("target-object={node_id}"))
    } else if device_path.starts_with("/dev/video") {
        Some(format!("path=v4l2:{device_path}"))
    } else {
        warn!(device_path, "Unknown device path format, using path property");
        Some(format!("path={device_path}"))
    };

    match target {
        Some(target) => format!("pipewiresrc {target} do-timestamp=true"),
        None => "pipewiresrc do-timestamp=true".to_string(),
    }
}

impl CameraBackend for PipeWireBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let cameras = enumerate_pipewire_cameras().unwrap_or_default();
        info!(count = cameras.len(), "PipeWire cameras enumerated");
        cameras
    }

    fn bind(
        &mut self,
        selector: &CameraSelector,
        outputs: CameraOutputs,
    ) -> BackendResult<CameraDevice> {
        if self.pipeline.is_some() {
            return Err(BackendError::AlreadyBound);
        }
        if !is_pipewire_available() {
            return Err(BackendError::NotAvailable(
                "PipeWire camera source not found".to_string(),
            ));
        }

        let device = selector.resolve(&self.enumerate_cameras())?;
        let pipeline = AnalysisPipeline::launch(
            &pipewire_source(&device.path),
            &device,
            outputs,
            self.max_dimension,
        )?;
        self.pipeline = Some(pipeline);
        Ok(device)
    }

    fn unbind(&mut self) -> BackendResult<()> {
        match self.pipeline.take() {
            Some(pipeline) => {
                info!(device = %pipeline.device().name, "Releasing PipeWire camera");
                pipeline.stop()
            }
            None => Ok(()),
        }
    }

    fn is_bound(&self) -> bool {
        self.pipeline.is_some()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::PipeWire
    }
}
