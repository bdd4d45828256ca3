// SPDX-License-Identifier: GPL-3.0-only

//! Choosing one barcode when a frame contains several

use super::decoder::BarcodeRecord;
use serde::{Deserialize, Serialize};

/// Which detection of a frame resolves the session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// The first barcode in decoder order wins
    #[default]
    First,
    /// Accept only when every barcode in the frame carries the same value
    ///
    /// Frames with conflicting payloads are skipped so the user can frame a
    /// single code.
    Unique,
}

impl SelectionPolicy {
    /// Pick the record that resolves the session, if any
    pub fn select<'a>(&self, records: &'a [BarcodeRecord]) -> Option<&'a BarcodeRecord> {
        let first = records.first()?;
        match self {
            Self::First => Some(first),
            Self::Unique => records
                .iter()
                .all(|r| r.raw_value == first.raw_value)
                .then_some(first),
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Unique => write!(f, "unique"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::decoder::BarcodeFormat;

    fn records(values: &[&str]) -> Vec<BarcodeRecord> {
        values
            .iter()
            .map(|v| BarcodeRecord::new(*v, BarcodeFormat::QrCode))
            .collect()
    }

    #[test]
    fn test_first_takes_head_of_list() {
        let found = records(&["one", "two"]);
        let selected = SelectionPolicy::First.select(&found).map(|r| r.raw_value.as_str());
        assert_eq!(selected, Some("one"));
        assert!(SelectionPolicy::First.select(&[]).is_none());
    }

    #[test]
    fn test_unique_rejects_conflicting_frame() {
        assert!(SelectionPolicy::Unique.select(&records(&["a", "b"])).is_none());

        let same = records(&["a", "a"]);
        let selected = SelectionPolicy::Unique.select(&same).map(|r| r.raw_value.as_str());
        assert_eq!(selected, Some("a"));
    }
}
