// SPDX-License-Identifier: GPL-3.0-only

//! QR code decoder
//!
//! The bundled [`Decoder`]: converts a frame to a luma plane, downscales it,
//! turns it upright using the rotation metadata, then runs `rqrr` on it.

use super::decoder::{BarcodeFormat, BarcodeRecord, DecodeError, Decoder};
use crate::backends::camera::types::{CameraFrame, PixelFormat, SensorRotation};
use crate::constants::decoder::{DEFAULT_MAX_DIMENSION, MIN_DIMENSION};
use tracing::{debug, trace};

/// QR decoder backed by `rqrr`
#[derive(Debug, Clone, Copy)]
pub struct RqrrDecoder {
    /// Frames are downscaled so neither side exceeds this
    max_dimension: u32,
}

impl Default for RqrrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RqrrDecoder {
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(MIN_DIMENSION),
        }
    }
}

impl Decoder for RqrrDecoder {
    fn decode(
        &self,
        frame: &CameraFrame,
        rotation: SensorRotation,
    ) -> Result<Vec<BarcodeRecord>, DecodeError> {
        let start = std::time::Instant::now();
        let plane = LumaPlane::from_frame(frame)?
            .downscale(self.max_dimension)
            .rotate(rotation);

        if plane.width.min(plane.height) < MIN_DIMENSION as usize {
            trace!(width = plane.width, height = plane.height, "Frame too small for a QR code");
            return Ok(Vec::new());
        }

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(plane.width, plane.height, |x, y| {
                plane.data[y * plane.width + x]
            });
        let grids = prepared.detect_grids();

        let mut records = Vec::with_capacity(grids.len());
        let mut last_error = None;
        for grid in &grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    records.push(BarcodeRecord::new(content, BarcodeFormat::QrCode))
                }
                Err(e) => last_error = Some(format!("{e:?}")),
            }
        }

        debug!(
            grids = grids.len(),
            decoded = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "QR detection complete"
        );

        match last_error {
            Some(reason) if records.is_empty() => Err(DecodeError::Unreadable {
                count: grids.len(),
                reason,
            }),
            _ => Ok(records),
        }
    }
}

/// Tightly packed 8-bit luminance image
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LumaPlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl LumaPlane {
    /// Extract luminance from any supported pixel layout, honouring stride
    pub fn from_frame(frame: &CameraFrame) -> Result<Self, DecodeError> {
        if !frame.is_complete() {
            return Err(DecodeError::TruncatedFrame {
                expected: frame.required_len(),
                actual: frame.data.len(),
            });
        }

        let width = frame.width as usize;
        let height = frame.height as usize;
        let mut data = Vec::with_capacity(width * height);

        for y in 0..frame.height {
            let row = frame.row(y).ok_or(DecodeError::TruncatedFrame {
                expected: frame.required_len(),
                actual: frame.data.len(),
            })?;
            match frame.format {
                PixelFormat::Gray8 => data.extend_from_slice(row),
                PixelFormat::RGBA => {
                    data.extend(row.chunks_exact(4).map(|p| luma(p[0], p[1], p[2])))
                }
                PixelFormat::BGRA => {
                    data.extend(row.chunks_exact(4).map(|p| luma(p[2], p[1], p[0])))
                }
                PixelFormat::RGB24 => {
                    data.extend(row.chunks_exact(3).map(|p| luma(p[0], p[1], p[2])))
                }
            }
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Nearest-neighbour downscale so neither side exceeds `max_dimension`
    pub fn downscale(self, max_dimension: u32) -> Self {
        let max = max_dimension.max(1) as usize;
        if self.width <= max && self.height <= max {
            return self;
        }

        let scale = (self.width as f32 / max as f32).max(self.height as f32 / max as f32);
        let width = ((self.width as f32 / scale) as usize).clamp(1, max);
        let height = ((self.height as f32 / scale) as usize).clamp(1, max);

        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let src_y = ((y as f32 * scale) as usize).min(self.height - 1);
            let src_row = &self.data[src_y * self.width..(src_y + 1) * self.width];
            data.extend((0..width).map(|x| src_row[((x as f32 * scale) as usize).min(self.width - 1)]));
        }

        Self {
            width,
            height,
            data,
        }
    }

    /// Rotate clockwise by `rotation`
    pub fn rotate(self, rotation: SensorRotation) -> Self {
        let (w, h) = (self.width, self.height);
        let src = |x: usize, y: usize| self.data[y * w + x];

        let (width, height) = if rotation.swaps_dimensions() {
            (h, w)
        } else {
            (w, h)
        };
        let data: Vec<u8> = match rotation {
            SensorRotation::None => return self,
            // dst(x, y) = src(y, h - 1 - x)
            SensorRotation::Rotate90 => (0..height)
                .flat_map(|y| (0..width).map(move |x| (x, y)))
                .map(|(x, y)| src(y, h - 1 - x))
                .collect(),
            SensorRotation::Rotate180 => (0..height)
                .flat_map(|y| (0..width).map(move |x| (x, y)))
                .map(|(x, y)| src(w - 1 - x, h - 1 - y))
                .collect(),
            // dst(x, y) = src(w - 1 - y, x)
            SensorRotation::Rotate270 => (0..height)
                .flat_map(|y| (0..width).map(move |x| (x, y)))
                .map(|(x, y)| src(w - 1 - y, x))
                .collect(),
        };

        Self {
            width,
            height,
            data,
        }
    }
}

/// BT.601 luma, integer approximation
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}
