// THEORY:
// The `PixelBuffer` is the "dumb" data container that every stage of the engine
// reads. Like a video frame in a streaming pipeline, it is produced exactly once
// (by decoding) and then treated as read-only: stages that change colors build a
// brand new buffer instead of writing through a shared one. This is what lets the
// orchestrator hand the same decoded source to many concurrent variations through
// an `Arc` with no locking.
//
// Layout: tightly packed 8-bit RGB, row major, 3 bytes per pixel, no padding.

use image::RgbImage;

use crate::core_modules::color::RgbColor;
use crate::error::{RecolorError, Result};

pub const CHANNELS: usize = 3;

/// An immutable, tightly packed RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps raw RGB bytes, checking that the length matches the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(RecolorError::Decode {
                message: format!(
                    "{width}x{height} RGB buffer needs {expected} bytes, got {}",
                    data.len()
                ),
                source: None,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A solid-color buffer.
    pub fn filled(width: u32, height: u32, color: RgbColor) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * CHANNELS);
        for _ in 0..pixel_count {
            data.extend_from_slice(&[color.r, color.g, color.b]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Builds a buffer by evaluating `shade(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut shade: impl FnMut(u32, u32) -> RgbColor) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                let color = shade(x, y);
                data.extend_from_slice(&[color.r, color.g, color.b]);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Iterates pixels as `[r, g, b]` slices in row-major order.
    pub fn pixels(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(CHANNELS)
    }

    /// Returns `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<RgbColor> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some(RgbColor::new(
            self.data[start],
            self.data[start + 1],
            self.data[start + 2],
        ))
    }

    /// Byte length is consistent with the dimensions.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.data.len() == self.pixel_count() * CHANNELS
    }

    /// Same dimensions, new pixel data. Used by stages that produce a fresh buffer.
    pub(crate) fn with_data(&self, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), self.data.len());
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl From<RgbImage> for PixelBuffer {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

impl From<PixelBuffer> for RgbImage {
    fn from(buffer: PixelBuffer) -> Self {
        let PixelBuffer {
            width,
            height,
            data,
        } = buffer;
        // Length is an invariant of PixelBuffer, so this cannot fail.
        RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
    }
}
