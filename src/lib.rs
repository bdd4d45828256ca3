// SPDX-License-Identifier: MPL-2.0

//! Scanner - scan barcodes with the camera
//!
//! A launcher starts a scan session; the session asks for camera permission,
//! binds a world-facing camera, feeds frames to a decoder with keep-latest
//! backpressure and resolves with exactly one result.
//!
//! # Architecture
//!
//! - [`scanner`]: scan session state machine, frame hand-off, decoder
//! - [`backends`]: camera backends and the permission boundary
//! - [`launcher`]: launcher screen model and session construction
//! - [`terminal`]: terminal front-end
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let factory = SessionFactory::new(Config::load_or_default(), CameraSource::System);
//! let result = factory.start(DeclineRationale, None).outcome().await;
//! println!("{}", serde_json::to_string(&result.reply())?);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod i18n;
pub mod launcher;
pub mod scanner;
pub mod terminal;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult, SessionError};
pub use launcher::{CameraSource, Launcher, SessionFactory};
pub use scanner::{
    BarcodeRecord, Decoder, ScanReply, ScanResult, ScanSession, ScanStatus, SelectionPolicy,
    SessionHandle, SessionState,
};
