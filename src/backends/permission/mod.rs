// SPDX-License-Identifier: MPL-2.0

//! Camera permission boundary
//!
//! A scan session asks a [`CameraPermission`] provider whether it may open the
//! camera, and asks a [`RationalePrompt`] to explain why when the provider
//! says an explanation is due. Three providers exist:
//!
//! - [`PortalPermission`]: the XDG Camera portal (sandboxed apps)
//! - [`DevicePermission`]: read/write access to `/dev/video*`
//! - [`Preauthorized`]: sources that need no permission (image files)

mod device;
mod portal;

pub use device::DevicePermission;
pub use portal::PortalPermission;

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Grant status of the camera permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Never asked, or nothing to ask about yet
    Undetermined,
}

/// Answer to the rationale prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RationaleChoice {
    /// Go on and request the permission
    Continue,
    /// Counts as a denial
    Decline,
}

/// Query and request the camera permission
pub trait CameraPermission: Send + Sync {
    /// Current status, without prompting anyone
    fn status(&self) -> impl Future<Output = PermissionState> + Send;

    /// Whether the user should see an explanation before the request
    fn should_show_rationale(&self) -> bool;

    /// Ask for the permission; may show platform UI
    fn request(&self) -> impl Future<Output = PermissionState> + Send;
}

/// Explains why the camera is needed
pub trait RationalePrompt: Send + Sync {
    fn explain(&self) -> impl Future<Output = RationaleChoice> + Send;
}

/// Prompt that always declines, for non-interactive runs
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineRationale;

impl RationalePrompt for DeclineRationale {
    async fn explain(&self) -> RationaleChoice {
        RationaleChoice::Decline
    }
}

/// Permission provider for sources that need none
#[derive(Debug, Clone, Copy, Default)]
pub struct Preauthorized;

impl CameraPermission for Preauthorized {
    async fn status(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn should_show_rationale(&self) -> bool {
        false
    }

    async fn request(&self) -> PermissionState {
        PermissionState::Granted
    }
}

/// Which permission provider guards real cameras
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionProvider {
    /// Portal inside Flatpak, device nodes otherwise
    #[default]
    Auto,
    /// XDG Camera portal
    Portal,
    /// Device node access check
    Device,
}

impl PermissionProvider {
    /// Resolve `Auto` for the current environment
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if is_flatpak() => Self::Portal,
            Self::Auto => Self::Device,
            other => other,
        }
    }
}

fn is_flatpak() -> bool {
    std::path::Path::new("/.flatpak-info").exists()
}

/// Runtime choice of permission provider
#[derive(Debug)]
pub enum SystemPermission {
    Portal(PortalPermission),
    Device(DevicePermission),
    Preauthorized(Preauthorized),
}

impl SystemPermission {
    pub fn for_provider(provider: PermissionProvider) -> Self {
        match provider.resolve() {
            PermissionProvider::Portal => Self::Portal(PortalPermission::new()),
            PermissionProvider::Device | PermissionProvider::Auto => {
                Self::Device(DevicePermission::new())
            }
        }
    }
}

impl CameraPermission for SystemPermission {
    async fn status(&self) -> PermissionState {
        match self {
            Self::Portal(p) => p.status().await,
            Self::Device(p) => p.status().await,
            Self::Preauthorized(p) => p.status().await,
        }
    }

    fn should_show_rationale(&self) -> bool {
        match self {
            Self::Portal(p) => p.should_show_rationale(),
            Self::Device(p) => p.should_show_rationale(),
            Self::Preauthorized(p) => p.should_show_rationale(),
        }
    }

    async fn request(&self) -> PermissionState {
        match self {
            Self::Portal(p) => p.request().await,
            Self::Device(p) => p.request().await,
            Self::Preauthorized(p) => p.request().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_preauthorized_is_granted() {
        let permission = SystemPermission::Preauthorized(Preauthorized);
        assert_eq!(permission.status().await, PermissionState::Granted);
        assert!(!permission.should_show_rationale());
    }

    #[test]
    fn test_explicit_provider_resolves_to_itself() {
        assert_eq!(PermissionProvider::Portal.resolve(), PermissionProvider::Portal);
        assert_eq!(PermissionProvider::Device.resolve(), PermissionProvider::Device);
        assert_ne!(PermissionProvider::Auto.resolve(), PermissionProvider::Auto);
    }
}
