// SPDX-License-Identifier: GPL-3.0-only

//! Keep-latest hand-off between the camera and the analyzer
//!
//! The camera thread offers frames through a [`FrameSink`]; the scan session
//! takes one from the [`LatestFrameSlot`] only when the decoder is idle. The
//! slot holds at most one frame: a newer offer replaces (and releases) any
//! frame that has not been picked up yet. Once closed, offers are released on
//! arrival.

use crate::backends::camera::types::{CameraFrame, SensorRotation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Callback run when a frame is released back to its producer
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A frame handed to the analyzer
///
/// Owns the camera frame until dropped. Dropping is the release: the release
/// callback (if any) runs exactly once, and the frame's buffer goes back to
/// the camera pipeline.
pub struct AnalysisFrame {
    sequence: u64,
    rotation: SensorRotation,
    frame: CameraFrame,
    release: Option<ReleaseFn>,
}

impl AnalysisFrame {
    fn new(
        sequence: u64,
        rotation: SensorRotation,
        frame: CameraFrame,
        release: Option<ReleaseFn>,
    ) -> Self {
        Self {
            sequence,
            rotation,
            frame,
            release,
        }
    }

    /// Arrival order, starting at 0 for the first frame of a binding
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Clockwise rotation needed to display the frame upright
    pub fn rotation(&self) -> SensorRotation {
        self.rotation
    }

    pub fn frame(&self) -> &CameraFrame {
        &self.frame
    }
}

impl Drop for AnalysisFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for AnalysisFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisFrame")
            .field("sequence", &self.sequence)
            .field("rotation", &self.rotation)
            .field("width", &self.frame.width)
            .field("height", &self.frame.height)
            .finish()
    }
}

/// What happened to an offered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The slot was empty; the frame is waiting for the analyzer
    Queued,
    /// An unstarted frame was waiting and got released in favour of this one
    Replaced,
    /// The slot is closed; the frame was released immediately
    Closed,
}

#[derive(Default)]
struct SlotState {
    pending: Option<AnalysisFrame>,
    closed: bool,
    failure: Option<String>,
    superseded: u64,
}

/// Single-frame mailbox with keep-latest replacement
#[derive(Default)]
pub struct LatestFrameSlot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panic while holding the lock cannot leave the state half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a frame, replacing any frame not yet taken
    pub fn offer(&self, frame: AnalysisFrame) -> Delivery {
        let (delivery, evicted) = {
            let mut state = self.lock();
            if state.closed {
                (Delivery::Closed, Some(frame))
            } else {
                let evicted = state.pending.replace(frame);
                if evicted.is_some() {
                    state.superseded += 1;
                    (Delivery::Replaced, evicted)
                } else {
                    (Delivery::Queued, None)
                }
            }
        };

        // Release outside the lock; release callbacks may be arbitrary code
        if let Some(evicted) = evicted {
            trace!(sequence = evicted.sequence(), ?delivery, "Releasing unanalyzed frame");
            drop(evicted);
        }

        if delivery != Delivery::Closed {
            self.notify.notify_one();
        }
        delivery
    }

    /// Wait for the next frame; `None` once the slot is closed
    pub async fn next(&self) -> Option<AnalysisFrame> {
        loop {
            {
                let mut state = self.lock();
                if let Some(frame) = state.pending.take() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so an offer between the check and
            // this await is not lost
            self.notify.notified().await;
        }
    }

    /// Close the slot and release any pending frame
    pub fn close(&self) {
        self.shutdown(None);
    }

    /// Close the slot because the producer failed
    ///
    /// The first recorded failure wins.
    pub fn fail(&self, reason: impl Into<String>) {
        self.shutdown(Some(reason.into()));
    }

    fn shutdown(&self, failure: Option<String>) {
        let pending = {
            let mut state = self.lock();
            if !state.closed {
                state.closed = true;
                state.failure = failure;
            }
            state.pending.take()
        };
        drop(pending);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Reason passed to [`fail`](Self::fail), if the producer failed
    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    /// Number of frames released without being analyzed
    pub fn superseded(&self) -> u64 {
        self.lock().superseded
    }
}

/// Producer side handed to camera backends (the analysis callback)
///
/// Cheap to clone; every clone feeds the same slot and shares the sequence
/// counter.
#[derive(Clone)]
pub struct FrameSink {
    slot: Arc<LatestFrameSlot>,
    next_sequence: Arc<AtomicU64>,
}

impl FrameSink {
    pub fn new(slot: Arc<LatestFrameSlot>) -> Self {
        Self {
            slot,
            next_sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Deliver a frame whose buffer is released by dropping it
    pub fn deliver(&self, frame: CameraFrame, rotation: SensorRotation) -> Delivery {
        self.deliver_with_release(frame, rotation, None)
    }

    /// Deliver a frame with an explicit release callback
    pub fn deliver_with_release(
        &self,
        frame: CameraFrame,
        rotation: SensorRotation,
        release: Option<ReleaseFn>,
    ) -> Delivery {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let delivery = self
            .slot
            .offer(AnalysisFrame::new(sequence, rotation, frame, release));
        if delivery == Delivery::Closed {
            debug!(sequence, "Frame arrived after analysis stopped");
        }
        delivery
    }

    /// Report that the producer stopped (EOS, device lost, pipeline error)
    pub fn fail(&self, reason: impl Into<String>) {
        self.slot.fail(reason);
    }

    /// Whether the consumer has stopped taking frames
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("closed", &self.slot.is_closed())
            .field("delivered", &self.next_sequence.load(Ordering::Relaxed))
            .finish()
    }
}
