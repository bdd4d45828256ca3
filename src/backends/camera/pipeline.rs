// SPDX-License-Identifier: MPL-2.0

//! GStreamer analysis pipeline shared by the PipeWire and V4L2 backends
//!
//! `<source> ! decodebin ! videoconvert ! videoscale ! RGBA caps ! appsink`
//!
//! Each appsink sample is mapped zero-copy into a [`CameraFrame`], shown on the
//! preview surface and offered to the analysis sink. Dropping the frame unmaps
//! the buffer and hands it back to the pool. End of stream and pipeline errors
//! fail the analysis sink, which ends the scan session.

use super::outputs::CameraOutputs;
use super::types::*;
use crate::constants::{pipeline, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Build the launch string for a source element description
pub(crate) fn build_pipeline_string(source: &str, max_dimension: u32) -> String {
    format!(
        "{source} ! decodebin ! videoconvert ! videoscale ! \
         video/x-raw,format={format},width=(int)[1,{max}],height=(int)[1,{max}],pixel-aspect-ratio=1/1 ! \
         appsink name={sink}",
        format = PixelFormat::RGBA.to_gst_format_string(),
        max = max_dimension.max(1),
        sink = pipeline::APPSINK_NAME,
    )
}

/// A running camera pipeline bound to one set of outputs
pub(crate) struct AnalysisPipeline {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    device: CameraDevice,
}

impl AnalysisPipeline {
    /// Launch the pipeline and start delivering frames
    pub fn launch(
        source: &str,
        device: &CameraDevice,
        outputs: CameraOutputs,
        max_dimension: u32,
    ) -> BackendResult<Self> {
        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let description = build_pipeline_string(source, max_dimension);
        info!(device = %device.name, pipeline = %description, "Launching camera pipeline");

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| BackendError::InitializationFailed(format!("Invalid pipeline: {e}")))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| {
                BackendError::InitializationFailed("Launch string is not a pipeline".to_string())
            })?;

        let appsink = pipeline
            .by_name(pipeline::APPSINK_NAME)
            .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".to_string()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| {
                BackendError::InitializationFailed("Failed to cast appsink".to_string())
            })?;

        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        install_callbacks(&appsink, device, &outputs);
        install_error_handler(&pipeline, &outputs);

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            error!(error = %e, "Failed to set pipeline to PLAYING");
            let reason = first_bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            shutdown(&pipeline, &appsink);
            return Err(BackendError::InitializationFailed(reason));
        }

        let (result, state, pending) = pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::START_TIMEOUT_SECS,
        ));
        debug!(?result, ?state, ?pending, "Pipeline state after start");
        let started = state == gstreamer::State::Playing
            || (matches!(result, Ok(gstreamer::StateChangeSuccess::Async))
                && pending == gstreamer::State::Playing);
        if !started {
            let reason = first_bus_error(&pipeline)
                .unwrap_or_else(|| format!("pipeline stuck in {state:?} ({result:?})"));
            shutdown(&pipeline, &appsink);
            return Err(BackendError::InitializationFailed(reason));
        }

        info!(device = %device.name, "Camera pipeline running");
        Ok(Self {
            pipeline,
            appsink,
            device: device.clone(),
        })
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    /// Stop the pipeline and release the device
    pub fn stop(self) -> BackendResult<()> {
        info!(device = %self.device.name, "Stopping camera pipeline");
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| BackendError::Other(format!("Failed to stop pipeline: {e}")))?;

        let (result, state, _) = self.pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::STOP_TIMEOUT_SECS,
        ));
        match result {
            Ok(_) => debug!(?state, "Camera pipeline stopped"),
            Err(e) => debug!(error = ?e, ?state, "Pipeline state change had issues"),
        }
        Ok(())
    }
}

impl Drop for AnalysisPipeline {
    fn drop(&mut self) {
        shutdown(&self.pipeline, &self.appsink);
    }
}

fn shutdown(pipeline: &gstreamer::Pipeline, appsink: &AppSink) {
    appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
    if let Some(bus) = pipeline.bus() {
        bus.unset_sync_handler();
    }
    let _ = pipeline.set_state(gstreamer::State::Null);
}

fn install_callbacks(appsink: &AppSink, device: &CameraDevice, outputs: &CameraOutputs) {
    let rotation = device.rotation;
    let frame_outputs = outputs.clone();
    let eos_sink = outputs.analysis.clone();
    let frame_counter = Arc::new(AtomicU64::new(0));

    appsink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                let frame_num = frame_counter.fetch_add(1, Ordering::Relaxed);
                let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;

                let frame = match frame_from_sample(&sample) {
                    Ok(frame) => frame,
                    Err(e) => {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            warn!(frame = frame_num, error = %e, "Skipping unusable sample");
                        }
                        return Ok(gstreamer::FlowSuccess::Ok);
                    }
                };

                if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        frame = frame_num,
                        width = frame.width,
                        height = frame.height,
                        stride = frame.stride,
                        "Camera frame"
                    );
                }

                frame_outputs.present(&frame);
                frame_outputs.analysis.deliver(frame, rotation);
                Ok(gstreamer::FlowSuccess::Ok)
            })
            .eos(move |_| {
                warn!("Camera stream reached end of stream");
                eos_sink.fail("end of stream");
            })
            .build(),
    );
}

fn install_error_handler(pipeline: &gstreamer::Pipeline, outputs: &CameraOutputs) {
    let Some(bus) = pipeline.bus() else {
        return;
    };
    let sink = outputs.analysis.clone();
    bus.set_sync_handler(move |_, msg| {
        if let gstreamer::MessageView::Error(err) = msg.view() {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "Camera pipeline error"
            );
            sink.fail(err.error().to_string());
        }
        gstreamer::BusSyncReply::Pass
    });
}

fn frame_from_sample(sample: &gstreamer::Sample) -> BackendResult<CameraFrame> {
    let caps = sample
        .caps()
        .ok_or_else(|| BackendError::Other("No caps in sample".to_string()))?;
    let video_info =
        VideoInfo::from_caps(caps).map_err(|e| BackendError::Other(e.to_string()))?;
    let format = PixelFormat::from_gst_format(video_info.format().to_str()).ok_or_else(|| {
        BackendError::Other(format!("Unexpected format {}", video_info.format().to_str()))
    })?;

    let buffer = sample
        .buffer_owned()
        .ok_or_else(|| BackendError::Other("No buffer in sample".to_string()))?;
    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
        return Err(BackendError::Other("Buffer marked as corrupted".to_string()));
    }
    let mapped = buffer
        .into_mapped_buffer_readable()
        .map_err(|_| BackendError::Other("Failed to map buffer".to_string()))?;

    Ok(CameraFrame {
        width: video_info.width(),
        height: video_info.height(),
        data: FrameData::from_mapped_buffer(mapped),
        format,
        stride: video_info.stride()[0].max(0) as u32,
        captured_at: Instant::now(),
    })
}

fn first_bus_error(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.timed_pop_filtered(
        gstreamer::ClockTime::from_mseconds(100),
        &[gstreamer::MessageType::Error],
    )?;
    match msg.view() {
        gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_string_requests_bounded_rgba() {
        let desc = build_pipeline_string("v4l2src device=/dev/video0", 640);
        assert!(desc.starts_with("v4l2src device=/dev/video0 ! decodebin"));
        assert!(desc.contains("format=RGBA"));
        assert!(desc.contains("width=(int)[1,640]"));
        assert!(desc.ends_with("appsink name=sink"));
    }
}
