// SPDX-License-Identifier: GPL-3.0-only

//! PipeWire camera enumeration
//!
//! Video sources are discovered with `pw-cli ls Node`; the per-node
//! libcamera properties (sensor rotation and mounting location) only show up
//! in `pw-cli info <id>`, so each camera is queried once more.

use super::super::types::{CameraDevice, LensFacing, SensorRotation};
use tracing::{debug, info, warn};

/// A `Video/Source` node from `pw-cli ls Node`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct VideoNode {
    pub id: String,
    pub serial: Option<String>,
    pub name: Option<String>,
}

impl VideoNode {
    /// Device path understood by [`pipewire_source`](super::pipewire_source)
    pub fn device_path(&self) -> String {
        match &self.serial {
            Some(serial) => format!("pipewire-serial-{serial}"),
            None => format!("pipewire-{}", self.id),
        }
    }
}

/// Enumerate cameras using PipeWire
///
/// Returns `None` when PipeWire is not usable at all. When `pw-cli` is
/// missing, a single default camera is reported and PipeWire picks the device.
pub fn enumerate_pipewire_cameras() -> Option<Vec<CameraDevice>> {
    if !is_pipewire_available() {
        return None;
    }

    let Some(nodes) = list_video_nodes() else {
        info!("pw-cli unavailable, using PipeWire default camera");
        return Some(vec![CameraDevice {
            name: "Default Camera (PipeWire)".to_string(),
            path: String::new(),
            rotation: SensorRotation::None,
            facing: LensFacing::External,
        }]);
    };

    let cameras = nodes
        .into_iter()
        .map(|node| {
            let (rotation, facing) = query_node_properties(&node.id);
            let device = CameraDevice {
                name: node
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("PipeWire node {}", node.id)),
                path: node.device_path(),
                rotation,
                facing,
            };
            debug!(id = %node.id, path = %device.path, %rotation, %facing, "Found video camera");
            device
        })
        .collect();
    Some(cameras)
}

/// Check whether GStreamer can create a `pipewiresrc`
pub fn is_pipewire_available() -> bool {
    if let Err(e) = gstreamer::init() {
        warn!(error = %e, "GStreamer init failed");
        return false;
    }
    let available = gstreamer::ElementFactory::find("pipewiresrc").is_some();
    if !available {
        debug!("pipewiresrc not available");
    }
    available
}

fn list_video_nodes() -> Option<Vec<VideoNode>> {
    let output = std::process::Command::new("pw-cli")
        .args(["ls", "Node"])
        .output()
        .ok()?;
    if !output.status.success() {
        debug!("pw-cli ls failed");
        return None;
    }
    Some(parse_node_list(&String::from_utf8_lossy(&output.stdout)))
}

fn query_node_properties(node_id: &str) -> (SensorRotation, LensFacing) {
    match std::process::Command::new("pw-cli")
        .args(["info", node_id])
        .output()
    {
        Ok(output) if output.status.success() => {
            parse_node_info(&String::from_utf8_lossy(&output.stdout))
        }
        _ => {
            debug!(node_id, "Failed to query node info");
            (SensorRotation::default(), LensFacing::default())
        }
    }
}

/// Parse `pw-cli ls Node` output into video source nodes
pub(crate) fn parse_node_list(output: &str) -> Vec<VideoNode> {
    let mut nodes = Vec::new();
    let mut current: Option<VideoNode> = None;
    let mut is_video_source = false;

    for line in output.lines() {
        let trimmed = line.trim();

        // "id 76, type PipeWire:Interface:Node/3"
        if trimmed.starts_with("id ") && trimmed.contains("type PipeWire:Interface:Node") {
            if is_video_source && let Some(node) = current.take() {
                nodes.push(node);
            }
            current = trimmed
                .strip_prefix("id ")
                .and_then(|rest| rest.split(',').next())
                .map(|id| VideoNode {
                    id: id.trim().to_string(),
                    ..VideoNode::default()
                });
            is_video_source = false;
            continue;
        }

        let Some(node) = current.as_mut() else {
            continue;
        };
        if trimmed.contains("media.class") && trimmed.contains("\"Video/Source\"") {
            is_video_source = true;
        } else if trimmed.contains("object.serial") {
            node.serial = extract_quoted_value(trimmed);
        } else if trimmed.contains("node.description") {
            node.name = extract_quoted_value(trimmed);
        }
    }

    if is_video_source && let Some(node) = current {
        nodes.push(node);
    }
    nodes
}

/// Parse rotation and mounting location from `pw-cli info` output
pub(crate) fn parse_node_info(output: &str) -> (SensorRotation, LensFacing) {
    let mut rotation = SensorRotation::default();
    let mut facing = LensFacing::default();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.contains("api.libcamera.rotation")
            && let Some(value) = extract_quoted_value(trimmed)
        {
            rotation = SensorRotation::from_degrees(&value);
        } else if trimmed.contains("api.libcamera.location")
            && let Some(value) = extract_quoted_value(trimmed)
        {
            facing = LensFacing::from_location(&value);
        }
    }
    (rotation, facing)
}

fn extract_quoted_value(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let end = line[start + 1..].find('"')?;
    Some(line[start + 1..start + 1 + end].to_string())
}
