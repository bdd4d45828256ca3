// SPDX-License-Identifier: GPL-3.0-only

//! XDG Camera portal
//!
//! `org.freedesktop.portal.Camera.AccessCamera` shows the desktop's permission
//! dialog and answers through a `Request.Response` signal on a path derived
//! from our unique bus name and a handle token. Subscribe before calling, or
//! a fast answer is lost.

use super::{CameraPermission, PermissionState};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

const PORTAL_DESTINATION: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const CAMERA_INTERFACE: &str = "org.freedesktop.portal.Camera";
const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";

/// Permission provider backed by the Camera portal
#[derive(Debug)]
pub struct PortalPermission {
    state: Mutex<PermissionState>,
    denied_before: AtomicBool,
}

impl Default for PortalPermission {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalPermission {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PermissionState::Undetermined),
            denied_before: AtomicBool::new(false),
        }
    }

    fn remember(&self, state: PermissionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        if state == PermissionState::Denied {
            self.denied_before.store(true, Ordering::SeqCst);
        }
    }
}

/// Object path the portal will emit the `Response` signal on
pub(crate) fn request_path(unique_name: &str, token: &str) -> String {
    let sender = unique_name.trim_start_matches(':').replace('.', "_");
    format!("{PORTAL_PATH}/request/{sender}/{token}")
}

/// Map a portal response code to a permission state
///
/// 0 = granted, 1 = dismissed by the user, 2 = refused otherwise.
pub(crate) fn state_for_response(code: u32) -> PermissionState {
    match code {
        0 => PermissionState::Granted,
        _ => PermissionState::Denied,
    }
}

async fn access_camera() -> zbus::Result<PermissionState> {
    let connection = zbus::Connection::session().await?;
    let camera = zbus::Proxy::new(
        &connection,
        PORTAL_DESTINATION,
        PORTAL_PATH,
        CAMERA_INTERFACE,
    )
    .await?;

    match camera.get_property::<bool>("IsCameraPresent").await {
        Ok(false) => warn!("Camera portal reports no camera present"),
        Ok(true) => {}
        Err(e) => debug!(error = %e, "IsCameraPresent unavailable"),
    }

    let unique_name = connection
        .unique_name()
        .map(|name| name.to_string())
        .ok_or_else(|| zbus::Error::Failure("Connection has no unique name".to_string()))?;
    let token = format!("scanner_{}", uuid::Uuid::new_v4().simple());
    let path = request_path(&unique_name, &token);

    let request =
        zbus::Proxy::new(&connection, PORTAL_DESTINATION, path.as_str(), REQUEST_INTERFACE)
            .await?;
    let mut responses = request.receive_signal("Response").await?;

    let mut options: HashMap<&str, Value> = HashMap::new();
    options.insert("handle_token", Value::from(token.as_str()));
    let handle: OwnedObjectPath = camera.call("AccessCamera", &(options,)).await?;
    debug!(handle = %handle, "AccessCamera request submitted");

    let message = responses
        .next()
        .await
        .ok_or_else(|| zbus::Error::Failure("Portal request closed".to_string()))?;
    let (code, _results): (u32, HashMap<String, OwnedValue>) = message.body().deserialize()?;
    Ok(state_for_response(code))
}

impl CameraPermission for PortalPermission {
    async fn status(&self) -> PermissionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_show_rationale(&self) -> bool {
        self.denied_before.load(Ordering::SeqCst)
    }

    async fn request(&self) -> PermissionState {
        let state = match access_camera().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Camera portal request failed");
                PermissionState::Denied
            }
        };
        info!(?state, "Camera portal answered");
        self.remember(state);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_path_from_unique_name() {
        assert_eq!(
            request_path(":1.42", "scanner_abc"),
            "/org/freedesktop/portal/desktop/request/1_42/scanner_abc"
        );
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(state_for_response(0), PermissionState::Granted);
        assert_eq!(state_for_response(1), PermissionState::Denied);
        assert_eq!(state_for_response(2), PermissionState::Denied);
    }

    #[tokio::test]
    async fn test_rationale_after_denial() {
        let portal = PortalPermission::new();
        assert_eq!(portal.status().await, PermissionState::Undetermined);
        assert!(!portal.should_show_rationale());

        portal.remember(PermissionState::Denied);
        assert!(portal.should_show_rationale());
        assert_eq!(portal.status().await, PermissionState::Denied);
    }
}
