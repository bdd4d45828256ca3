// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Messages carried in scan results
///
/// These end up in the `error` field of the scan reply and are shown by the
/// launcher as notices, so they are stable strings rather than localized text.
pub mod messages {
    /// Permission was refused, either at the rationale prompt or by the platform
    pub const PERMISSION_DENIED: &str = "Camera permission denied";

    /// The user navigated back before anything was detected
    pub const SCAN_CANCELED: &str = "Scan canceled";

    /// Prefix for failures while binding the camera
    pub const CAMERA_START_FAILED: &str = "Error starting camera";

    /// Prefix for a frame stream that ended while analyzing
    pub const CAMERA_LOST: &str = "Camera stopped unexpectedly";

    /// The session task went away without reporting
    pub const SESSION_ABORTED: &str = "Scan session ended unexpectedly";

    /// Launcher notice for an error result without a message
    pub const GENERIC_FAILURE: &str = "Scan failed";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Frame interval when replaying image files (~15fps is plenty for scanning)
    pub const IMAGE_STREAM_FRAME_DURATION: Duration = Duration::from_millis(66);

    /// Terminal input poll interval (also bounds preview refresh)
    pub const UI_POLL_INTERVAL: Duration = Duration::from_millis(16);

    /// How long a launcher notice stays visible
    pub const NOTICE_DURATION: Duration = Duration::from_secs(2);
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Appsink queue depth; old buffers are dropped beyond this
    pub const MAX_BUFFERS: u32 = 2;

    /// Default upper bound for analysis frame width/height
    pub const DEFAULT_ANALYSIS_MAX_DIMENSION: u32 = 1280;

    /// Name of the appsink element in launch strings
    pub const APPSINK_NAME: &str = "sink";
}

/// Decoder constants
pub mod decoder {
    /// Frames are downscaled so neither side exceeds this before detection.
    /// QR codes held up to a camera are large enough to survive it.
    pub const DEFAULT_MAX_DIMENSION: u32 = 640;

    /// Smallest frame side that can hold a QR version 1 symbol with quiet zone
    pub const MIN_DIMENSION: u32 = 21;
}

/// Supported input files for the image-file camera
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Process exit codes for the headless `scan` command
pub mod exit_codes {
    /// A barcode was decoded
    pub const SUCCESS: u8 = 0;

    /// The session resolved with an error
    pub const ERROR: u8 = 1;

    /// The session was cancelled (conventional SIGINT code)
    pub const CANCELLED: u8 = 130;
}
