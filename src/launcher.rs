// SPDX-License-Identifier: GPL-3.0-only

//! Launcher screen model
//!
//! UI-independent state behind the launcher: the last scanned value, a
//! transient notice, and the session currently in progress. Front-ends
//! render it and forward user input; the terminal UI and the tests drive the
//! same model.

use crate::backends::camera::{CameraBackend, ImageFileBackend, PreviewSurface, get_backend};
use crate::backends::permission::{Preauthorized, RationalePrompt, SystemPermission};
use crate::config::Config;
use crate::constants::{messages, timing};
use crate::scanner::{
    BarcodeRecord, Decoder, ScanOptions, ScanResult, ScanSession, ScanStatus, SessionHandle,
    SessionState, ValueType,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Notice {
    message: String,
    shown_at: Instant,
}

/// Launcher screen state
#[derive(Debug, Default)]
pub struct Launcher {
    displayed: Option<BarcodeRecord>,
    notice: Option<Notice>,
    active: Option<SessionHandle>,
}

impl Launcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scan unless one is already running
    ///
    /// Returns whether a session was started.
    pub fn activate(&mut self, start: impl FnOnce() -> SessionHandle) -> bool {
        if self.active.is_some() {
            debug!("Scan already in progress, ignoring activation");
            return false;
        }
        self.notice = None;
        self.active = Some(start());
        info!("Scan started from launcher");
        true
    }

    /// Back-navigation out of the scan screen
    pub fn cancel_scan(&mut self) {
        if let Some(session) = self.active.as_mut() {
            session.cancel();
        }
    }

    /// Pick up the outcome of the running session, if it has resolved
    pub fn poll(&mut self) -> Option<ScanStatus> {
        let result = self.active.as_mut()?.try_outcome()?;
        self.active = None;
        let status = result.status();
        self.apply(result);
        Some(status)
    }

    /// Wait for the running session and apply its outcome
    pub async fn wait(&mut self) -> Option<ScanStatus> {
        let result = self.active.take()?.outcome().await;
        let status = result.status();
        self.apply(result);
        Some(status)
    }

    /// Update the screen from a session outcome
    pub fn apply(&mut self, result: ScanResult) {
        match result.status() {
            ScanStatus::Success => {
                self.displayed = result.record().cloned();
                self.notice = None;
            }
            ScanStatus::Error => {
                let message = result
                    .message()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(messages::GENERIC_FAILURE);
                self.notice = Some(Notice {
                    message: message.to_string(),
                    shown_at: Instant::now(),
                });
            }
            ScanStatus::Cancelled => debug!("Scan cancelled, keeping launcher unchanged"),
        }
    }

    /// Raw text of the last successful scan
    pub fn displayed_value(&self) -> Option<&str> {
        self.displayed.as_ref().map(|r| r.raw_value.as_str())
    }

    pub fn displayed_type(&self) -> Option<ValueType> {
        self.displayed.as_ref().map(|r| r.value_type)
    }

    /// Notice text while it is still visible at `now`
    pub fn notice(&self, now: Instant) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|n| now.saturating_duration_since(n.shown_at) < timing::NOTICE_DURATION)
            .map(|n| n.message.as_str())
    }

    pub fn is_scanning(&self) -> bool {
        self.active.is_some()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.active.as_ref().map(SessionHandle::state)
    }
}

/// Where frames come from
#[derive(Debug, Clone)]
pub enum CameraSource {
    /// A real camera through the configured backend
    System,
    /// Replay image files as a camera
    ImageFiles(Vec<PathBuf>),
}

impl CameraSource {
    pub fn from_images(images: Vec<PathBuf>) -> Self {
        if images.is_empty() {
            Self::System
        } else {
            Self::ImageFiles(images)
        }
    }
}

/// Builds scan sessions from configuration
#[derive(Clone)]
pub struct SessionFactory {
    config: Config,
    source: CameraSource,
    decoder: Arc<dyn Decoder>,
}

impl SessionFactory {
    pub fn new(config: Config, source: CameraSource) -> Self {
        let decoder = Arc::new(config.decoder());
        Self {
            config,
            source,
            decoder,
        }
    }

    /// Replace the bundled decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Camera backend for the configured source
    pub fn camera(&self) -> Box<dyn CameraBackend> {
        match &self.source {
            CameraSource::ImageFiles(paths) => Box::new(ImageFileBackend::new(paths.clone())),
            CameraSource::System => {
                get_backend(self.config.backend, self.config.analysis_max_dimension)
            }
        }
    }

    /// Start a session on the current tokio runtime
    pub fn start<R: RationalePrompt + 'static>(
        &self,
        prompt: R,
        preview: Option<PreviewSurface>,
    ) -> SessionHandle {
        let (permission, selector) = match &self.source {
            CameraSource::ImageFiles(_) => (
                SystemPermission::Preauthorized(Preauthorized),
                Default::default(),
            ),
            CameraSource::System => (
                SystemPermission::for_provider(self.config.permission),
                self.config.selector(),
            ),
        };

        ScanSession::new(self.camera(), permission, prompt, Arc::clone(&self.decoder))
            .with_options(ScanOptions {
                selector,
                policy: self.config.selection_policy,
                preview,
            })
            .start()
    }
}
