// SPDX-License-Identifier: MPL-2.0

//! Platform boundary of the scanner
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Scan session                  │
//! └──────────┬───────────────────────┬──────────┘
//!            │                       │
//! ┌──────────┴──────────┐ ┌──────────┴──────────┐
//! │     Permission      │ │       Camera        │
//! │ (portal / devices)  │ │ (PipeWire / V4L2 /  │
//! │                     │ │    image files)     │
//! └─────────────────────┘ └─────────────────────┘
//! ```
//!
//! - [`camera`]: device enumeration, binding and frame delivery
//! - [`permission`]: camera permission status, rationale and request

pub mod camera;
pub mod permission;
