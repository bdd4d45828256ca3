// SPDX-License-Identifier: GPL-3.0-only

//! Outcome of a scan session

use super::decoder::BarcodeRecord;
use crate::constants::messages;
use crate::errors::SessionError;
use serde::{Deserialize, Serialize};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Cancelled,
    Error,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The single result a session reports
///
/// Immutable once constructed. A success carries the decoded value (and the
/// detection it came from); cancellations and errors carry a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    status: ScanStatus,
    value: Option<String>,
    message: Option<String>,
    record: Option<BarcodeRecord>,
}

impl ScanResult {
    pub fn success(record: BarcodeRecord) -> Self {
        Self {
            status: ScanStatus::Success,
            value: Some(record.raw_value.clone()),
            message: None,
            record: Some(record),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: ScanStatus::Cancelled,
            value: None,
            message: Some(messages::SCAN_CANCELED.to_string()),
            record: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Error,
            value: None,
            message: Some(message.into()),
            record: None,
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    /// Decoded raw value; present only on success
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Full detection behind a successful result
    pub fn record(&self) -> Option<&BarcodeRecord> {
        self.record.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Success
    }

    /// Wire form handed back to the caller
    pub fn reply(&self) -> ScanReply {
        match self.status {
            ScanStatus::Success => ScanReply {
                scan_value: self.value.clone().unwrap_or_default(),
                error: String::new(),
            },
            ScanStatus::Cancelled | ScanStatus::Error => ScanReply {
                scan_value: String::new(),
                error: self.message.clone().unwrap_or_default(),
            },
        }
    }
}

impl From<Result<BarcodeRecord, SessionError>> for ScanResult {
    fn from(outcome: Result<BarcodeRecord, SessionError>) -> Self {
        match outcome {
            Ok(record) => Self::success(record),
            Err(SessionError::UserCancelled) => Self::cancelled(),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// Reply passed back to the launching screen
///
/// Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReply {
    pub scan_value: String,
    pub error: String,
}
