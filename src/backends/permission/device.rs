// SPDX-License-Identifier: GPL-3.0-only

//! Camera permission from device node access
//!
//! Outside a sandbox the camera "permission" is Unix access to `/dev/video*`,
//! normally granted through the `video` group or a logind ACL. Nothing can be
//! requested at runtime; a request re-checks, which picks up an ACL granted
//! while the rationale was on screen.

use super::{CameraPermission, PermissionState};
use crate::backends::camera::v4l2::video_device_nodes;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Permission provider checking `/dev/video*` access
#[derive(Debug, Clone, Default)]
pub struct DevicePermission {
    /// Fixed node list; `None` scans the system
    nodes: Option<Vec<PathBuf>>,
}

impl DevicePermission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check these nodes instead of scanning `/dev`
    pub fn with_nodes(nodes: Vec<PathBuf>) -> Self {
        Self { nodes: Some(nodes) }
    }

    fn check(&self) -> PermissionState {
        let nodes = match &self.nodes {
            Some(nodes) => nodes.clone(),
            None => video_device_nodes(),
        };
        state_for_nodes(&nodes)
    }
}

/// Granted if any node is usable, Denied if nodes exist but none is usable
///
/// Without nodes there is nothing to gate; binding then reports the missing
/// camera.
fn state_for_nodes(nodes: &[PathBuf]) -> PermissionState {
    if nodes.is_empty() {
        debug!("No video device nodes");
        return PermissionState::Granted;
    }
    match nodes.iter().find(|node| is_accessible(node)) {
        Some(node) => {
            debug!(node = %node.display(), "Video device accessible");
            PermissionState::Granted
        }
        None => PermissionState::Denied,
    }
}

fn is_accessible(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

impl CameraPermission for DevicePermission {
    async fn status(&self) -> PermissionState {
        self.check()
    }

    fn should_show_rationale(&self) -> bool {
        self.check() == PermissionState::Denied
    }

    async fn request(&self) -> PermissionState {
        let state = self.check();
        info!(?state, "Re-checked video device access");
        state
    }
}
