//! CPU-side copies of readable framebuffer attachments.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrascopeError};

/// Texel layout of a readable attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Four normalized bytes per texel.
    Rgba8,
    /// One 32-bit float per texel.
    R32Float,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8 | Self::R32Float => 4,
        }
    }
}

/// A tightly packed image, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a zeroed buffer.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            data: vec![0; Self::byte_len(format, width, height)],
        }
    }

    fn byte_len(format: PixelFormat, width: u32, height: u32) -> usize {
        width as usize * height as usize * format.bytes_per_pixel() as usize
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes in one unpadded row.
    pub fn bytes_per_row(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }

    /// Reallocates for a new size. Old contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(Self::byte_len(self.format, width, height), 0);
    }

    /// Zeroes every texel.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Fills every texel with the same raw bytes.
    pub fn fill(&mut self, texel: [u8; 4]) {
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&texel);
        }
    }

    /// Copies rows from a buffer whose rows are padded to `padded_bytes_per_row`.
    pub fn copy_from_padded(&mut self, src: &[u8], padded_bytes_per_row: u32) -> Result<()> {
        let row = self.bytes_per_row() as usize;
        let padded = padded_bytes_per_row as usize;
        let expected = padded * self.height as usize;
        if padded < row || src.len() < expected {
            return Err(TerrascopeError::SizeMismatch {
                expected,
                actual: src.len(),
            });
        }
        if row == 0 {
            return Ok(());
        }
        for (dst, src) in self.data.chunks_exact_mut(row).zip(src.chunks(padded)) {
            dst.copy_from_slice(&src[..row]);
        }
        Ok(())
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    /// Raw bytes of one texel.
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let o = self.offset(x, y)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.data[o..o + 4]);
        Some(out)
    }

    pub fn set_texel(&mut self, x: u32, y: u32, texel: [u8; 4]) {
        if let Some(o) = self.offset(x, y) {
            self.data[o..o + 4].copy_from_slice(&texel);
        }
    }

    /// Texel interpreted as a float. `None` for non-float formats.
    pub fn f32_at(&self, x: u32, y: u32) -> Option<f32> {
        match self.format {
            PixelFormat::R32Float => self.texel(x, y).map(f32::from_le_bytes),
            PixelFormat::Rgba8 => None,
        }
    }

    pub fn set_f32(&mut self, x: u32, y: u32, value: f32) {
        self.set_texel(x, y, value.to_le_bytes());
    }

    /// Texel coordinates under a normalized position in `[0, 1)`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn texel_at(&self, normalized: DVec2) -> Option<(u32, u32)> {
        if !(0.0..1.0).contains(&normalized.x) || !(0.0..1.0).contains(&normalized.y) {
            return None;
        }
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let x = ((normalized.x * f64::from(self.width)) as u32).min(self.width - 1);
        let y = ((normalized.y * f64::from(self.height)) as u32).min(self.height - 1);
        Some((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_padded_strips_padding() {
        let mut image = PixelBuffer::new(PixelFormat::Rgba8, 2, 2);
        let mut src = vec![0u8; 256 * 2];
        src[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        src[256..264].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        image.copy_from_padded(&src, 256).unwrap();
        assert_eq!(image.texel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(image.texel(0, 1), Some([9, 10, 11, 12]));
    }

    #[test]
    fn test_copy_from_padded_rejects_short_source() {
        let mut image = PixelBuffer::new(PixelFormat::Rgba8, 4, 4);
        assert!(matches!(
            image.copy_from_padded(&[0; 100], 256),
            Err(TerrascopeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_float_texels() {
        let mut image = PixelBuffer::new(PixelFormat::R32Float, 3, 1);
        image.set_f32(2, 0, 1234.5);
        assert_eq!(image.f32_at(2, 0), Some(1234.5));
        assert_eq!(image.f32_at(3, 0), None);
    }

    #[test]
    fn test_texel_at_bounds() {
        let image = PixelBuffer::new(PixelFormat::Rgba8, 320, 240);
        assert_eq!(image.texel_at(DVec2::new(0.0, 0.0)), Some((0, 0)));
        assert_eq!(image.texel_at(DVec2::new(0.5, 0.5)), Some((160, 120)));
        assert_eq!(image.texel_at(DVec2::new(1.0, 0.5)), None);
        assert_eq!(image.texel_at(DVec2::new(-0.1, 0.5)), None);
    }

    #[test]
    fn test_resize_discards() {
        let mut image = PixelBuffer::new(PixelFormat::Rgba8, 1, 1);
        image.fill([9, 9, 9, 9]);
        image.resize(2, 2);
        assert_eq!(image.data().len(), 16);
        assert!(image.data().iter().all(|&b| b == 0));
    }
}
