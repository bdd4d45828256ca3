// SPDX-License-Identifier: GPL-3.0-only

//! Barcode scanning: the session state machine and its collaborators

pub mod decoder;
pub mod frame_slot;
pub mod policy;
pub mod qr_decoder;
pub mod result;
pub mod session;
pub mod value_type;

pub use decoder::{BarcodeFormat, BarcodeRecord, DecodeError, Decoder};
pub use frame_slot::{AnalysisFrame, Delivery, FrameSink, LatestFrameSlot};
pub use policy::SelectionPolicy;
pub use qr_decoder::RqrrDecoder;
pub use result::{ScanReply, ScanResult, ScanStatus};
pub use session::{ScanOptions, ScanSession, SessionHandle, SessionState};
pub use value_type::ValueType;
