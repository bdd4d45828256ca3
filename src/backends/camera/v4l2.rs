// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 camera backend
//!
//! Opens `/dev/videoN` through `v4l2src`, bypassing PipeWire. Useful on
//! systems without a PipeWire session and for pinning a specific node.

use super::pipeline::AnalysisPipeline;
use super::types::*;
use super::{CameraBackend, CameraOutputs, CameraSelector};
use crate::constants::pipeline::DEFAULT_ANALYSIS_MAX_DIMENSION;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SYSFS_VIDEO4LINUX: &str = "/sys/class/video4linux";

/// Capture device nodes (`/dev/videoN`), sorted by index
///
/// Metadata nodes (sysfs `index` other than 0) are skipped.
pub fn video_device_nodes() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(SYSFS_VIDEO4LINUX) else {
        return fallback_dev_scan();
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let number = name.strip_prefix("video")?.parse::<u32>().ok()?;
            let index = read_sysfs(&entry.path().join("index"));
            if index.as_deref().is_some_and(|i| i != "0") {
                debug!(node = %name, "Skipping metadata node");
                return None;
            }
            Some((number, PathBuf::from(format!("/dev/{name}"))))
        })
        .collect();
    nodes.sort_by_key(|(number, _)| *number);
    nodes.into_iter().map(|(_, path)| path).collect()
}

fn fallback_dev_scan() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return Vec::new();
    };
    let mut nodes: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("video"))
        })
        .collect();
    nodes.sort();
    nodes
}

fn read_sysfs(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Guess the mounting from a V4L2 card name
///
/// Platform cameras often say where they sit; USB webcams don't.
pub(crate) fn facing_from_card_name(name: &str) -> LensFacing {
    let lower = name.to_ascii_lowercase();
    if lower.contains("rear") || lower.contains("back") || lower.contains("world") {
        LensFacing::Back
    } else if lower.contains("front") || lower.contains("user") || lower.contains("selfie") {
        LensFacing::Front
    } else {
        LensFacing::External
    }
}

/// Enumerate V4L2 capture devices
pub fn enumerate_v4l2_cameras() -> Vec<CameraDevice> {
    video_device_nodes()
        .into_iter()
        .map(|path| {
            let node = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = read_sysfs(&Path::new(SYSFS_VIDEO4LINUX).join(&node).join("name"))
                .unwrap_or_else(|| node.clone());
            CameraDevice {
                facing: facing_from_card_name(&name),
                name,
                path: path.to_string_lossy().to_string(),
                rotation: SensorRotation::None,
            }
        })
        .collect()
}

/// V4L2 backend implementation
pub struct V4l2Backend {
    pipeline: Option<AnalysisPipeline>,
    max_dimension: u32,
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Backend {
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

impl CameraBackend for V4l2Backend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let cameras = enumerate_v4l2_cameras();
        info!(count = cameras.len(), "V4L2 cameras enumerated");
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

        let device = selector.resolve(&self.enumerate_cameras())?;
        let source = format!("v4l2src device={}", device.path);
        let pipeline = AnalysisPipeline::launch(&source, &device, outputs, self.max_dimension)?;
        self.pipeline = Some(pipeline);
        Ok(device)
    }

    fn unbind(&mut self) -> BackendResult<()> {
        match self.pipeline.take() {
            Some(pipeline) => {
                info!(device = %pipeline.device().path, "Releasing V4L2 camera");
                pipeline.stop()
            }
            None => Ok(()),
        }
    }

    fn is_bound(&self) -> bool {
        self.pipeline.is_some()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::V4l2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_from_card_name() {
        assert_eq!(facing_from_card_name("ov8858 rear"), LensFacing::Back);
        assert_eq!(facing_from_card_name("Front Camera"), LensFacing::Front);
        assert_eq!(
            facing_from_card_name("Integrated Webcam: Integrated W"),
            LensFacing::External
        );
    }
}
