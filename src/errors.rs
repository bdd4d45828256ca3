// SPDX-License-Identifier: MPL-2.0

//! Error types for the scanner

use crate::backends::camera::types::BackendError;
use crate::constants::messages;
use crate::scanner::decoder::DecodeError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Camera backend errors outside a scan session (listing, decoding files)
    #[error("Camera error: {0}")]
    Camera(#[from] BackendError),
    /// A scan session failed
    #[error("Scan error: {0}")]
    Session(#[from] SessionError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// Filesystem and terminal I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<DecodeError> for AppError {
    fn from(e: DecodeError) -> Self {
        AppError::Session(SessionError::DecodeFailure(e))
    }
}

/// Ways a scan session can end other than success
///
/// The `Display` text is the message reported in the scan result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Permission refused at the rationale prompt or by the platform
    #[error("{}", messages::PERMISSION_DENIED)]
    PermissionDenied,
    /// The camera could not be bound
    #[error("{msg}: {0}", msg = messages::CAMERA_START_FAILED)]
    CameraStartFailure(String),
    /// The frame stream ended while analyzing
    #[error("{msg}: {0}", msg = messages::CAMERA_LOST)]
    CameraLost(String),
    /// A single frame could not be decoded (never terminal for a session)
    #[error("Decode failed: {0}")]
    DecodeFailure(#[from] DecodeError),
    /// Back-navigation before a barcode was found
    #[error("{}", messages::SCAN_CANCELED)]
    UserCancelled,
}
