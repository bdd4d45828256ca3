// SPDX-License-Identifier: GPL-3.0-only

//! Decoder boundary
//!
//! A decoder maps one camera frame (plus its rotation metadata) to zero or
//! more detected barcodes. It is injected into the scan session as
//! `Arc<dyn Decoder>`, so tests and alternative symbology engines can stand
//! in for the bundled QR decoder.

use super::value_type::ValueType;
use crate::backends::camera::types::{CameraFrame, PixelFormat, SensorRotation};
use serde::Serialize;

/// Symbology of a detected barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    QrCode,
    Aztec,
    DataMatrix,
    Pdf417,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    Code93,
    Codabar,
    Itf,
    Unknown,
}

impl std::fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::QrCode => "QR Code",
            Self::Aztec => "Aztec",
            Self::DataMatrix => "Data Matrix",
            Self::Pdf417 => "PDF417",
            Self::Ean13 => "EAN-13",
            Self::Ean8 => "EAN-8",
            Self::UpcA => "UPC-A",
            Self::UpcE => "UPC-E",
            Self::Code128 => "Code 128",
            Self::Code39 => "Code 39",
            Self::Code93 => "Code 93",
            Self::Codabar => "Codabar",
            Self::Itf => "ITF",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One barcode found in a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarcodeRecord {
    /// Decoded payload exactly as encoded in the symbol
    pub raw_value: String,
    pub format: BarcodeFormat,
    /// What the payload looks like (URL, WiFi credentials, ...)
    pub value_type: ValueType,
}

impl BarcodeRecord {
    /// Create a record, classifying the payload
    pub fn new(raw_value: impl Into<String>, format: BarcodeFormat) -> Self {
        let raw_value = raw_value.into();
        let value_type = ValueType::classify(&raw_value);
        Self {
            raw_value,
            format,
            value_type,
        }
    }
}

/// Per-frame decode failure
///
/// Never fatal for a scan session: the frame is discarded and analysis
/// continues with the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The decoder cannot read this pixel layout
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    /// The buffer is shorter than its declared geometry
    #[error("frame data truncated: {actual} of {expected} bytes")]
    TruncatedFrame { expected: usize, actual: usize },
    /// Symbols were located but none could be read
    #[error("{count} symbol(s) located but unreadable: {reason}")]
    Unreadable { count: usize, reason: String },
    /// The decoding engine itself failed
    #[error("decoder failure: {0}")]
    Backend(String),
}

/// Opaque barcode detection capability
pub trait Decoder: Send + Sync + 'static {
    /// Detect barcodes in `frame`
    ///
    /// `rotation` is the clockwise rotation that makes the frame upright.
    /// Called from a blocking worker thread; may take tens of milliseconds.
    fn decode(
        &self,
        frame: &CameraFrame,
        rotation: SensorRotation,
    ) -> Result<Vec<BarcodeRecord>, DecodeError>;
}

impl<F> Decoder for F
where
    F: Fn(&CameraFrame, SensorRotation) -> Result<Vec<BarcodeRecord>, DecodeError>
        + Send
        + Sync
        + 'static,
{
    fn decode(
        &self,
        frame: &CameraFrame,
        rotation: SensorRotation,
    ) -> Result<Vec<BarcodeRecord>, DecodeError> {
        self(frame, rotation)
    }
}
