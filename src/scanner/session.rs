// SPDX-License-Identifier: GPL-3.0-only

//! Scan session
//!
//! One session runs as one tokio task and moves through
//!
//! ```text
//! RequestingPermission ─► CapturingPreview ─► AnalyzingFrames ─► Resolved
//!          │                     │                   │
//!          └─────────────────────┴───────────────────┴──► Resolved (error / cancel)
//! ```
//!
//! Blocking collaborators (camera bind/unbind, decoding) run on the blocking
//! pool and report back into the session task. The session ends with exactly
//! one [`ScanResult`], sent after the camera binding has been released.

use super::decoder::{BarcodeRecord, Decoder};
use super::frame_slot::{FrameSink, LatestFrameSlot};
use super::policy::SelectionPolicy;
use super::result::{ScanResult, ScanStatus};
use crate::backends::camera::{CameraBackend, CameraOutputs, CameraSelector, PreviewSurface};
use crate::backends::permission::{
    CameraPermission, PermissionState, RationaleChoice, RationalePrompt,
};
use crate::constants::{messages, timing};
use crate::errors::SessionError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Observable progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    RequestingPermission,
    CapturingPreview,
    AnalyzingFrames,
    Resolved(ScanStatus),
}

impl SessionState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SessionState::Resolved(_))
    }
}

/// Per-session settings
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub selector: CameraSelector,
    pub policy: SelectionPolicy,
    /// Where to show the live feed; `None` for headless scans
    pub preview: Option<PreviewSurface>,
}

/// A scan session that has not started yet
pub struct ScanSession<C, P, R> {
    camera: C,
    permission: P,
    prompt: R,
    decoder: Arc<dyn Decoder>,
    options: ScanOptions,
}

impl<C, P, R> ScanSession<C, P, R>
where
    C: CameraBackend + 'static,
    P: CameraPermission + 'static,
    R: RationalePrompt + 'static,
{
    pub fn new(camera: C, permission: P, prompt: R, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            camera,
            permission,
            prompt,
            decoder,
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Spawn the session on the current tokio runtime
    pub fn start(self) -> SessionHandle {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::RequestingPermission);

        tokio::spawn(async move {
            let result = self.run(CancelSignal::new(cancel_rx), &state_tx).await;
            info!(status = %result.status(), "Scan session resolved");
            state_tx.send_replace(SessionState::Resolved(result.status()));
            if outcome_tx.send(result).is_err() {
                debug!("Scan session handle dropped before the outcome");
            }
        });

        SessionHandle {
            cancel: Some(cancel_tx),
            outcome: outcome_rx,
            state: state_rx,
        }
    }

    async fn run(
        self,
        mut cancel: CancelSignal,
        state: &watch::Sender<SessionState>,
    ) -> ScanResult {
        let Self {
            camera,
            permission,
            prompt,
            decoder,
            options,
        } = self;

        info!(policy = %options.policy, "Scan session started");
        if let Err(e) = acquire_permission(&permission, &prompt, &mut cancel).await {
            return ScanResult::from(Err(e));
        }

        state.send_replace(SessionState::CapturingPreview);
        ScanResult::from(capture(camera, decoder, options, &mut cancel, state).await)
    }
}

/// Controller side of a running session
///
/// Dropping the handle cancels the session; the camera is still released but
/// the result goes nowhere.
#[derive(Debug)]
pub struct SessionHandle {
    cancel: Option<oneshot::Sender<()>>,
    outcome: oneshot::Receiver<ScanResult>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Back-navigation: resolve as cancelled unless already resolved
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!("Cancelling scan session");
            let _ = cancel.send(());
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for watching state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Non-blocking check for the outcome
    pub fn try_outcome(&mut self) -> Option<ScanResult> {
        match self.outcome.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(ScanResult::error(messages::SESSION_ABORTED))
            }
        }
    }

    /// Wait for the outcome
    pub async fn outcome(self) -> ScanResult {
        // Keep the cancel sender alive while waiting; dropping it cancels
        let SessionHandle {
            cancel, outcome, ..
        } = self;
        let result = outcome
            .await
            .unwrap_or_else(|_| ScanResult::error(messages::SESSION_ABORTED));
        drop(cancel);
        result
    }
}

/// Receiving end of a cancellation request
///
/// Fires on an explicit cancel and when the handle is dropped.
struct CancelSignal {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl CancelSignal {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx, fired: false }
    }

    async fn fired(&mut self) {
        if !self.fired {
            let _ = (&mut self.rx).await;
            self.fired = true;
        }
    }

    fn is_fired(&mut self) -> bool {
        if !self.fired && !matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            self.fired = true;
        }
        self.fired
    }
}

async fn cancellable<T>(
    cancel: &mut CancelSignal,
    work: impl Future<Output = T>,
) -> Result<T, SessionError> {
    tokio::select! {
        biased;
        _ = cancel.fired() => Err(SessionError::UserCancelled),
        value = work => Ok(value),
    }
}

async fn acquire_permission<P, R>(
    permission: &P,
    prompt: &R,
    cancel: &mut CancelSignal,
) -> Result<(), SessionError>
where
    P: CameraPermission,
    R: RationalePrompt,
{
    if cancellable(cancel, permission.status()).await? == PermissionState::Granted {
        debug!("Camera permission already granted");
        return Ok(());
    }

    if permission.should_show_rationale() {
        info!("Showing camera permission rationale");
        if cancellable(cancel, prompt.explain()).await? == RationaleChoice::Decline {
            info!("Camera permission rationale declined");
            return Err(SessionError::PermissionDenied);
        }
    }

    match cancellable(cancel, permission.request()).await? {
        PermissionState::Granted => {
            info!("Camera permission granted");
            Ok(())
        }
        state => {
            info!(?state, "Camera permission not granted");
            Err(SessionError::PermissionDenied)
        }
    }
}

async fn capture<C: CameraBackend + 'static>(
    camera: C,
    decoder: Arc<dyn Decoder>,
    options: ScanOptions,
    cancel: &mut CancelSignal,
    state: &watch::Sender<SessionState>,
) -> Result<BarcodeRecord, SessionError> {
    let slot = Arc::new(LatestFrameSlot::new());
    let outputs = CameraOutputs::new(FrameSink::new(Arc::clone(&slot)), options.preview.clone());
    let selector = options.selector.clone();

    let mut bind_task = tokio::task::spawn_blocking(move || {
        let mut camera = camera;
        let bound = camera.bind(&selector, outputs);
        (camera, bound)
    });

    let joined = tokio::select! {
        biased;
        joined = &mut bind_task => joined,
        _ = cancel.fired() => {
            debug!("Cancelled while binding the camera, waiting for bind to return");
            bind_task.await
        }
    };
    let (camera, bound) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            slot.close();
            warn!(error = %e, "Camera bind task failed");
            return Err(SessionError::CameraStartFailure(e.to_string()));
        }
    };

    let outcome = if cancel.is_fired() {
        Err(SessionError::UserCancelled)
    } else {
        match bound {
            Err(e) => {
                warn!(error = %e, "Failed to bind camera");
                Err(SessionError::CameraStartFailure(e.to_string()))
            }
            Ok(device) => {
                info!(
                    device = %device.name,
                    facing = %device.facing,
                    rotation = %device.rotation,
                    "Camera bound"
                );
                state.send_replace(SessionState::AnalyzingFrames);
                analyze(&slot, &decoder, options.policy, cancel).await
            }
        }
    };

    release(camera, &slot, options.preview.as_ref()).await;
    outcome
}

async fn analyze(
    slot: &LatestFrameSlot,
    decoder: &Arc<dyn Decoder>,
    policy: SelectionPolicy,
    cancel: &mut CancelSignal,
) -> Result<BarcodeRecord, SessionError> {
    let mut analyzed: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.fired() => return Err(SessionError::UserCancelled),
            next = slot.next() => next,
        };
        let Some(frame) = next else {
            let reason = slot
                .failure()
                .unwrap_or_else(|| "frame stream ended".to_string());
            warn!(%reason, "Camera stopped while scanning");
            return Err(SessionError::CameraLost(reason));
        };

        let sequence = frame.sequence();
        let worker = Arc::clone(decoder);
        let decoded = tokio::task::spawn_blocking(move || {
            let result = worker.decode(frame.frame(), frame.rotation());
            // Release the frame as soon as the decoder is done with it
            drop(frame);
            result
        })
        .await;

        analyzed += 1;
        if analyzed % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(analyzed, superseded = slot.superseded(), "Analysis progress");
        }

        if cancel.is_fired() {
            return Err(SessionError::UserCancelled);
        }

        match decoded {
            Ok(Ok(records)) => {
                if let Some(record) = policy.select(&records) {
                    info!(
                        sequence,
                        format = %record.format,
                        value_type = record.value_type.label(),
                        "Barcode detected"
                    );
                    return Ok(record.clone());
                }
                if !records.is_empty() {
                    debug!(sequence, count = records.len(), "Detections rejected by selection policy");
                }
            }
            Ok(Err(e)) => {
                let e = SessionError::DecodeFailure(e);
                warn!(sequence, error = %e, "Discarding frame");
            }
            Err(e) => warn!(sequence, error = %e, "Decode task failed"),
        }
    }
}

async fn release<C: CameraBackend + 'static>(
    mut camera: C,
    slot: &LatestFrameSlot,
    preview: Option<&PreviewSurface>,
) {
    // Frames arriving from now on are released on arrival
    slot.close();

    match tokio::task::spawn_blocking(move || camera.unbind()).await {
        Ok(Ok(())) => debug!("Camera released"),
        Ok(Err(e)) => warn!(error = %e, "Failed to release camera"),
        Err(e) => warn!(error = %e, "Camera release task failed"),
    }

    if let Some(preview) = preview {
        preview.clear();
    }
}
