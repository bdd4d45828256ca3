// SPDX-License-Identifier: GPL-3.0-only

//! Scan session scenarios with fake camera, permission, prompt and decoder

use scanner::backends::camera::{
    BackendError, BackendResult, CameraBackend, CameraBackendType, CameraDevice, CameraFrame,
    CameraOutputs, CameraSelector, LensFacing, PixelFormat, SensorRotation,
};
use scanner::backends::permission::{
    CameraPermission, DevicePermission, PermissionState, RationaleChoice, RationalePrompt,
};
use scanner::constants::messages;
use scanner::scanner::{
    BarcodeFormat, BarcodeRecord, DecodeError, Decoder, Delivery, FrameSink, ScanOptions,
    ScanSession, ScanStatus, SelectionPolicy, SessionHandle, SessionState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Fakes
// ----------------------------------------------------------------------------

/// Frames are told apart by their width
fn frame(id: u32) -> CameraFrame {
    CameraFrame::packed(id, 1, PixelFormat::Gray8, vec![0; id as usize])
}

fn fake_device() -> CameraDevice {
    CameraDevice {
        name: "Fake camera".to_string(),
        path: "fake0".to_string(),
        rotation: SensorRotation::Rotate90,
        facing: LensFacing::Back,
    }
}

#[derive(Default)]
struct CameraLog {
    binds: AtomicUsize,
    unbinds: AtomicUsize,
    sink: Mutex<Option<FrameSink>>,
}

impl CameraLog {
    fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    fn unbinds(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }

    fn sink(&self) -> FrameSink {
        self.sink
            .lock()
            .unwrap()
            .clone()
            .expect("camera is bound")
    }
}

struct FakeCamera {
    log: Arc<CameraLog>,
    initial_frames: Vec<u32>,
    fail_bind: bool,
    /// Binding blocks until the gate opens
    bind_gate: Option<mpsc::Receiver<()>>,
    bound: bool,
}

impl FakeCamera {
    fn new(log: &Arc<CameraLog>) -> Self {
        Self {
            log: Arc::clone(log),
            initial_frames: Vec::new(),
            fail_bind: false,
            bind_gate: None,
            bound: false,
        }
    }

    /// Frames delivered synchronously while binding
    fn with_frames(mut self, ids: &[u32]) -> Self {
        self.initial_frames = ids.to_vec();
        self
    }

    fn failing(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.bind_gate = Some(rx);
        (self, tx)
    }
}

impl CameraBackend for FakeCamera {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        vec![fake_device()]
    }

    fn bind(
        &mut self,
        _selector: &CameraSelector,
        outputs: CameraOutputs,
    ) -> BackendResult<CameraDevice> {
        self.log.binds.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.bind_gate {
            let _ = gate.recv();
        }
        if self.fail_bind {
            return Err(BackendError::DeviceNotFound("no back camera".to_string()));
        }
        for id in &self.initial_frames {
            outputs.analysis.deliver(frame(*id), SensorRotation::Rotate90);
        }
        *self.log.sink.lock().unwrap() = Some(outputs.analysis);
        self.bound = true;
        Ok(fake_device())
    }

    fn unbind(&mut self) -> BackendResult<()> {
        if self.bound {
            self.bound = false;
            self.log.sink.lock().unwrap().take();
            self.log.unbinds.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::ImageFiles
    }
}

#[derive(Default)]
struct PermissionLog {
    status_calls: AtomicUsize,
    request_calls: AtomicUsize,
}

struct FakePermission {
    status: PermissionState,
    rationale: bool,
    request_result: PermissionState,
    log: Arc<PermissionLog>,
}

impl FakePermission {
    fn granted() -> Self {
        Self::new(PermissionState::Granted, false, PermissionState::Granted)
    }

    fn new(status: PermissionState, rationale: bool, request_result: PermissionState) -> Self {
        Self {
            status,
            rationale,
            request_result,
            log: Arc::default(),
        }
    }

    fn log(&self) -> Arc<PermissionLog> {
        Arc::clone(&self.log)
    }
}

impl CameraPermission for FakePermission {
    async fn status(&self) -> PermissionState {
        self.log.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status
    }

    fn should_show_rationale(&self) -> bool {
        self.rationale
    }

    async fn request(&self) -> PermissionState {
        self.log.request_calls.fetch_add(1, Ordering::SeqCst);
        self.request_result
    }
}

#[derive(Clone)]
struct FakePrompt {
    choice: RationaleChoice,
    calls: Arc<AtomicUsize>,
}

impl FakePrompt {
    fn new(choice: RationaleChoice) -> Self {
        Self {
            choice,
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RationalePrompt for FakePrompt {
    async fn explain(&self) -> RationaleChoice {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.choice
    }
}

/// A prompt the user never answers
struct SilentPrompt;

impl RationalePrompt for SilentPrompt {
    async fn explain(&self) -> RationaleChoice {
        std::future::pending().await
    }
}

type Script = HashMap<u32, Result<Vec<&'static str>, DecodeError>>;

/// Decoder answering from a script keyed by frame id
struct ScriptedDecoder {
    script: Script,
    calls: Arc<Mutex<Vec<u32>>>,
    rotations: Arc<Mutex<Vec<SensorRotation>>>,
    /// Decoding frame 10 blocks until the gate opens
    gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl ScriptedDecoder {
    fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::default(),
            rotations: Arc::default(),
            gate: None,
        }
    }

    fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(Mutex::new(rx));
        (self, tx)
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(
        &self,
        frame: &CameraFrame,
        rotation: SensorRotation,
    ) -> Result<Vec<BarcodeRecord>, DecodeError> {
        self.calls.lock().unwrap().push(frame.width);
        self.rotations.lock().unwrap().push(rotation);
        if frame.width == 10
            && let Some(gate) = &self.gate
        {
            let _ = gate.lock().unwrap().recv();
        }
        match self.script.get(&frame.width) {
            Some(Ok(values)) => Ok(values
                .iter()
                .map(|v| BarcodeRecord::new(*v, BarcodeFormat::QrCode))
                .collect()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }
}

fn script(entries: Vec<(u32, Result<Vec<&'static str>, DecodeError>)>) -> Script {
    entries.into_iter().collect()
}

/// Deliver a frame whose release is recorded in `released`
fn deliver(sink: &FrameSink, id: u32, released: &Arc<Mutex<Vec<u32>>>) -> Delivery {
    let released = Arc::clone(released);
    sink.deliver_with_release(
        frame(id),
        SensorRotation::Rotate90,
        Some(Box::new(move || released.lock().unwrap().push(id))),
    )
}

async fn wait_for_state(handle: &SessionHandle, wanted: SessionState) {
    let mut state = handle.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == wanted || s.is_resolved()),
    )
    .await
    .expect("state reached in time")
    .expect("session alive");
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn start<P: CameraPermission + 'static, R: RationalePrompt + 'static>(
    camera: FakeCamera,
    permission: P,
    prompt: R,
    decoder: ScriptedDecoder,
    policy: SelectionPolicy,
) -> SessionHandle {
    ScanSession::new(camera, permission, prompt, Arc::new(decoder))
        .with_options(ScanOptions {
            policy,
            ..ScanOptions::default()
        })
        .start()
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_pre_granted_scan_succeeds() {
    let camera_log = Arc::new(CameraLog::default());
    let permission = FakePermission::granted();
    let permission_log = permission.log();
    let prompt = FakePrompt::new(RationaleChoice::Continue);
    let decoder = ScriptedDecoder::new(script(vec![(30, Ok(vec!["ABC123"]))]));
    let rotations = Arc::clone(&decoder.rotations);

    let handle = start(
        FakeCamera::new(&camera_log).with_frames(&[30]),
        permission,
        prompt.clone(),
        decoder,
        SelectionPolicy::First,
    );
    let result = handle.outcome().await;

    assert_eq!(result.status(), ScanStatus::Success);
    assert_eq!(result.value(), Some("ABC123"));
    assert_eq!(result.reply().scan_value, "ABC123");
    assert!(result.reply().error.is_empty());

    // Already granted: no rationale, no request
    assert_eq!(prompt.calls(), 0);
    assert_eq!(permission_log.request_calls.load(Ordering::SeqCst), 0);

    // Released before reporting
    assert_eq!(camera_log.binds(), 1);
    assert_eq!(camera_log.unbinds(), 1);

    assert_eq!(*rotations.lock().unwrap(), vec![SensorRotation::Rotate90]);
}

#[tokio::test]
async fn test_denied_permission_never_binds_camera() {
    let camera_log = Arc::new(CameraLog::default());
    let permission = FakePermission::new(
        PermissionState::Undetermined,
        false,
        PermissionState::Denied,
    );
    let permission_log = permission.log();
    let prompt = FakePrompt::new(RationaleChoice::Continue);

    let result = start(
        FakeCamera::new(&camera_log),
        permission,
        prompt.clone(),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    )
    .outcome()
    .await;

    assert_eq!(result.status(), ScanStatus::Error);
    assert_eq!(result.message(), Some(messages::PERMISSION_DENIED));
    assert_eq!(result.reply().error, "Camera permission denied");
    assert_eq!(permission_log.request_calls.load(Ordering::SeqCst), 1);
    assert_eq!(prompt.calls(), 0);
    assert_eq!(camera_log.binds(), 0);
}

#[tokio::test]
async fn test_declined_rationale_counts_as_denial() {
    let camera_log = Arc::new(CameraLog::default());
    let permission = FakePermission::new(PermissionState::Denied, true, PermissionState::Granted);
    let permission_log = permission.log();
    let prompt = FakePrompt::new(RationaleChoice::Decline);

    let result = start(
        FakeCamera::new(&camera_log),
        permission,
        prompt.clone(),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    )
    .outcome()
    .await;

    assert_eq!(result.status(), ScanStatus::Error);
    assert_eq!(result.message(), Some(messages::PERMISSION_DENIED));
    assert_eq!(prompt.calls(), 1);
    assert_eq!(permission_log.request_calls.load(Ordering::SeqCst), 0);
    assert_eq!(camera_log.binds(), 0);
}

#[tokio::test]
async fn test_accepted_rationale_then_granted() {
    let camera_log = Arc::new(CameraLog::default());
    let permission = FakePermission::new(PermissionState::Denied, true, PermissionState::Granted);
    let permission_log = permission.log();
    let prompt = FakePrompt::new(RationaleChoice::Continue);

    let result = start(
        FakeCamera::new(&camera_log).with_frames(&[30]),
        permission,
        prompt.clone(),
        ScriptedDecoder::new(script(vec![(30, Ok(vec!["WIFI:S:home;;"]))])),
        SelectionPolicy::First,
    )
    .outcome()
    .await;

    assert_eq!(result.status(), ScanStatus::Success);
    assert_eq!(prompt.calls(), 1);
    assert_eq!(permission_log.request_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_back_navigation_during_preview_cancels() {
    let camera_log = Arc::new(CameraLog::default());
    let mut handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    );

    wait_for_state(&handle, SessionState::AnalyzingFrames).await;
    handle.cancel();
    let result = handle.outcome().await;

    assert_eq!(result.status(), ScanStatus::Cancelled);
    assert!(result.value().is_none());
    assert_eq!(camera_log.binds(), 1);
    assert_eq!(camera_log.unbinds(), 1);
}

#[tokio::test]
async fn test_cancel_while_rationale_is_open() {
    let camera_log = Arc::new(CameraLog::default());
    let mut handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::new(PermissionState::Undetermined, true, PermissionState::Granted),
        SilentPrompt,
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    );

    handle.cancel();
    let result = handle.outcome().await;

    assert_eq!(result.status(), ScanStatus::Cancelled);
    assert_eq!(camera_log.binds(), 0);
}

#[tokio::test]
async fn test_first_barcode_in_list_wins() {
    let camera_log = Arc::new(CameraLog::default());
    let result = start(
        FakeCamera::new(&camera_log).with_frames(&[30]),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(script(vec![(30, Ok(vec!["first", "second"]))])),
        SelectionPolicy::First,
    )
    .outcome()
    .await;

    assert_eq!(result.value(), Some("first"));
}

#[tokio::test]
async fn test_unique_policy_skips_conflicting_frames() {
    let camera_log = Arc::new(CameraLog::default());
    let decoder = ScriptedDecoder::new(script(vec![
        (10, Ok(vec!["a", "b"])),
        (20, Ok(vec!["c", "c"])),
    ]));
    let calls = Arc::clone(&decoder.calls);
    let released = Arc::new(Mutex::new(Vec::new()));

    let handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        decoder,
        SelectionPolicy::Unique,
    );
    wait_for_state(&handle, SessionState::AnalyzingFrames).await;
    let sink = camera_log.sink();

    deliver(&sink, 10, &released);
    wait_until(|| calls.lock().unwrap().len() == 1).await;
    deliver(&sink, 20, &released);

    let result = handle.outcome().await;
    assert_eq!(result.value(), Some("c"));
    assert_eq!(*calls.lock().unwrap(), vec![10, 20]);
}

#[tokio::test]
async fn test_decode_failure_is_not_fatal() {
    let camera_log = Arc::new(CameraLog::default());
    let decoder = ScriptedDecoder::new(script(vec![
        (10, Err(DecodeError::Backend("glare".to_string()))),
        (20, Ok(vec!["https://example.org"])),
    ]));
    let calls = Arc::clone(&decoder.calls);
    let released = Arc::new(Mutex::new(Vec::new()));

    let handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        decoder,
        SelectionPolicy::First,
    );
    wait_for_state(&handle, SessionState::AnalyzingFrames).await;
    let sink = camera_log.sink();

    deliver(&sink, 10, &released);
    wait_until(|| calls.lock().unwrap().len() == 1).await;
    deliver(&sink, 20, &released);

    let result = handle.outcome().await;
    assert_eq!(result.status(), ScanStatus::Success);
    assert_eq!(result.value(), Some("https://example.org"));

    let mut released = released.lock().unwrap().clone();
    released.sort();
    assert_eq!(released, vec![10, 20]);
}

#[tokio::test]
async fn test_keep_latest_releases_every_frame_once() {
    let camera_log = Arc::new(CameraLog::default());
    let (decoder, gate) =
        ScriptedDecoder::new(script(vec![(13, Ok(vec!["done"]))])).gated();
    let calls = Arc::clone(&decoder.calls);
    let released = Arc::new(Mutex::new(Vec::new()));

    let handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        decoder,
        SelectionPolicy::First,
    );
    wait_for_state(&handle, SessionState::AnalyzingFrames).await;
    let sink = camera_log.sink();

    // Frame 10 is being decoded; 11 and 12 are replaced before the decoder
    // is free again
    deliver(&sink, 10, &released);
    wait_until(|| calls.lock().unwrap().len() == 1).await;
    assert_eq!(deliver(&sink, 11, &released), Delivery::Queued);
    assert_eq!(deliver(&sink, 12, &released), Delivery::Replaced);
    assert_eq!(deliver(&sink, 13, &released), Delivery::Replaced);
    assert_eq!(*released.lock().unwrap(), vec![11, 12]);

    gate.send(()).unwrap();
    let result = handle.outcome().await;

    assert_eq!(result.value(), Some("done"));
    assert_eq!(*calls.lock().unwrap(), vec![10, 13]);

    let mut released = released.lock().unwrap().clone();
    released.sort();
    assert_eq!(released, vec![10, 11, 12, 13]);
}

#[tokio::test]
async fn test_frames_after_resolution_are_released_on_arrival() {
    let camera_log = Arc::new(CameraLog::default());
    let released = Arc::new(Mutex::new(Vec::new()));
    let handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(script(vec![(30, Ok(vec!["ABC123"]))])),
        SelectionPolicy::First,
    );
    wait_for_state(&handle, SessionState::AnalyzingFrames).await;
    // A straggling camera thread keeps its sink after unbind
    let sink = camera_log.sink();

    deliver(&sink, 30, &released);
    let result = handle.outcome().await;
    assert!(result.is_success());

    assert_eq!(deliver(&sink, 40, &released), Delivery::Closed);
    assert_eq!(*released.lock().unwrap(), vec![30, 40]);
}

#[tokio::test]
async fn test_bind_failure_is_an_error() {
    let camera_log = Arc::new(CameraLog::default());
    let result = start(
        FakeCamera::new(&camera_log).failing(),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    )
    .outcome()
    .await;

    assert_eq!(result.status(), ScanStatus::Error);
    let message = result.message().unwrap_or_default();
    assert!(message.starts_with(messages::CAMERA_START_FAILED));
    assert!(message.contains("no back camera"));
    assert_eq!(camera_log.binds(), 1);
    assert_eq!(camera_log.unbinds(), 0);
}

#[tokio::test]
async fn test_missing_camera_is_a_start_failure() {
    let camera_log = Arc::new(CameraLog::default());
    let prompt = FakePrompt::new(RationaleChoice::Continue);
    let result = start(
        FakeCamera::new(&camera_log).failing(),
        DevicePermission::with_nodes(Vec::new()),
        prompt.clone(),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    )
    .outcome()
    .await;

    assert_eq!(result.status(), ScanStatus::Error);
    let message = result.message().unwrap_or_default();
    assert!(message.starts_with(messages::CAMERA_START_FAILED));
    assert_ne!(message, messages::PERMISSION_DENIED);
    assert_eq!(prompt.calls(), 0);
    assert_eq!(camera_log.binds(), 1);
}

#[tokio::test]
async fn test_cancel_during_bind_waits_then_releases() {
    let camera_log = Arc::new(CameraLog::default());
    let (camera, open_gate) = FakeCamera::new(&camera_log).gated();
    let mut handle = start(
        camera,
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    );

    wait_for_state(&handle, SessionState::CapturingPreview).await;
    wait_until(|| camera_log.binds() == 1).await;
    handle.cancel();

    // Still inside bind: nothing to release yet
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(camera_log.unbinds(), 0);
    assert_eq!(handle.state(), SessionState::CapturingPreview);

    open_gate.send(()).expect("camera still binding");
    let result = handle.outcome().await;

    assert_eq!(result.status(), ScanStatus::Cancelled);
    assert_eq!(camera_log.binds(), 1);
    assert_eq!(camera_log.unbinds(), 1);
}

#[tokio::test]
async fn test_lost_camera_ends_session_with_error() {
    let camera_log = Arc::new(CameraLog::default());
    let handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    );
    wait_for_state(&handle, SessionState::AnalyzingFrames).await;
    camera_log.sink().fail("device unplugged");

    let result = handle.outcome().await;
    assert_eq!(result.status(), ScanStatus::Error);
    let message = result.message().unwrap_or_default();
    assert!(message.starts_with(messages::CAMERA_LOST));
    assert!(message.contains("device unplugged"));
    assert_eq!(camera_log.unbinds(), 1);
}

#[tokio::test]
async fn test_dropping_handle_releases_camera() {
    let camera_log = Arc::new(CameraLog::default());
    let handle = start(
        FakeCamera::new(&camera_log),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(Script::new()),
        SelectionPolicy::First,
    );
    wait_for_state(&handle, SessionState::AnalyzingFrames).await;

    drop(handle);
    wait_until(|| camera_log.unbinds() == 1).await;
    assert_eq!(camera_log.binds(), 1);
}

#[tokio::test]
async fn test_state_reports_resolution() {
    let camera_log = Arc::new(CameraLog::default());
    let handle = start(
        FakeCamera::new(&camera_log).with_frames(&[30]),
        FakePermission::granted(),
        FakePrompt::new(RationaleChoice::Continue),
        ScriptedDecoder::new(script(vec![(30, Ok(vec!["ABC123"]))])),
        SelectionPolicy::First,
    );
    let mut state = handle.subscribe();

    state
        .wait_for(SessionState::is_resolved)
        .await
        .expect("session resolves");
    assert_eq!(
        handle.state(),
        SessionState::Resolved(ScanStatus::Success)
    );
    assert_eq!(handle.outcome().await.value(), Some("ABC123"));
}
