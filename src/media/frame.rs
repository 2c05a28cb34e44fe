// SPDX-License-Identifier: MPL-2.0

//! Decoded frame types and pixel conversions
//!
//! Decoders hand out RGBA frames in top-down row order. The continuous
//! preview-frame path works with NV21 (full-resolution Y plane followed by
//! interleaved V/U at quarter resolution), which is also the raw input of
//! the first photo production tier.

use image::{RgbImage, RgbaImage, imageops::FilterType};
use std::sync::Arc;
use std::time::Duration;

/// One decoded RGBA frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA8, `width * height * 4` bytes, top-down rows
    pub data: Arc<[u8]>,
    /// Monotonic counter assigned by the producer
    pub sequence: u64,
    /// Presentation timestamp in the source media
    pub pts: Option<Duration>,
}

impl VideoFrame {
    /// Wrap raw RGBA bytes; `None` if the length does not match the size
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Option<Self> {
        if data.len() != rgba_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::from(data),
            sequence,
            pts: None,
        })
    }

    /// Frame filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], sequence: u64) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(rgba_len(width, height))
            .collect();
        Self {
            width,
            height,
            data: Arc::from(data),
            sequence,
            pts: None,
        }
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// RGBA value at (x, y), top-left origin
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        let p = self.data.get(offset..offset + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        Some(image::DynamicImage::ImageRgba8(self.to_rgba_image()?).to_rgb8())
    }
}

/// NV21 frame as delivered to preview-frame callbacks
#[derive(Debug, Clone)]
pub struct Nv21Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl Nv21Frame {
    pub fn from_rgba(frame: &VideoFrame, width: u32, height: u32) -> Option<Self> {
        let data = if frame.width == width && frame.height == height {
            rgba_to_nv21(&frame.data, width, height)
        } else {
            let image = frame.to_rgba_image()?;
            let scaled = image::imageops::resize(&image, width, height, FilterType::Triangle);
            rgba_to_nv21(scaled.as_raw(), width, height)
        };
        Some(Self {
            width,
            height,
            data: Arc::from(data),
        })
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        nv21_to_rgb(&self.data, self.width, self.height)
    }
}

pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// NV21 buffer size for the given dimensions
pub fn nv21_len(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * w.div_ceil(2) * h.div_ceil(2)
}

/// Convert RGBA to NV21 (BT.601 limited range)
pub fn rgba_to_nv21(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let chroma_w = w.div_ceil(2);
    let mut out = vec![0u8; nv21_len(width, height)];
    let (y_plane, vu_plane) = out.split_at_mut(w * h);

    for y in 0..h {
        for x in 0..w {
            let p = (y * w + x) * 4;
            let (r, g, b) = (rgba[p] as i32, rgba[p + 1] as i32, rgba[p + 2] as i32);
            y_plane[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;
        }
    }

    // One chroma sample per 2x2 block, taken from its top-left pixel
    for cy in 0..h.div_ceil(2) {
        for cx in 0..chroma_w {
            let p = ((cy * 2) * w + cx * 2) * 4;
            let (r, g, b) = (rgba[p] as i32, rgba[p + 1] as i32, rgba[p + 2] as i32);
            let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
            let offset = (cy * chroma_w + cx) * 2;
            vu_plane[offset] = v.clamp(0, 255) as u8;
            vu_plane[offset + 1] = u.clamp(0, 255) as u8;
        }
    }

    out
}

/// Convert NV21 to RGB (BT.601 limited range)
///
/// Returns `None` when the buffer is shorter than the declared size.
pub fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || nv21.len() < nv21_len(width, height) {
        return None;
    }
    let chroma_w = w.div_ceil(2);
    let (y_plane, vu_plane) = nv21.split_at(w * h);
    let mut rgb = vec![0u8; w * h * 3];

    for y in 0..h {
        let vu_row = (y / 2) * chroma_w * 2;
        for x in 0..w {
            let vu = vu_row + (x / 2) * 2;
            let v = vu_plane[vu] as i32 - 128;
            let u = vu_plane[vu + 1] as i32 - 128;
            let luma = ((y_plane[y * w + x] as i32 - 16) * 149) >> 7;
            let out = (y * w + x) * 3;
            rgb[out] = (luma + ((179 * v) >> 7)).clamp(0, 255) as u8;
            rgb[out + 1] = (luma - ((44 * u) >> 7) - ((91 * v) >> 7)).clamp(0, 255) as u8;
            rgb[out + 2] = (luma + ((227 * u) >> 7)).clamp(0, 255) as u8;
        }
    }

    RgbImage::from_raw(width, height, rgb)
}

/// Reverse row order in place (bottom-up readback to top-down)
pub fn flip_vertical(data: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    let rows = data.len() / row_bytes;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (head, tail) = data.split_at_mut(bottom * row_bytes);
        head[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
    }
}

/// Copy as much of `src` as fits into `dst`; returns the byte count
pub fn copy_clamped(dst: &mut [u8], src: &[u8]) -> usize {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv21_len_odd_dimensions() {
        assert_eq!(nv21_len(4, 4), 16 + 8);
        assert_eq!(nv21_len(3, 3), 9 + 8);
    }

    #[test]
    fn test_gray_survives_nv21() {
        let frame = VideoFrame::solid(8, 8, [128, 128, 128, 255], 0);
        let nv21 = rgba_to_nv21(&frame.data, 8, 8);
        let rgb = nv21_to_rgb(&nv21, 8, 8).unwrap();
        for p in rgb.pixels() {
            for c in p.0 {
                assert!((c as i32 - 128).abs() <= 3, "gray drifted to {}", c);
            }
        }
    }

    #[test]
    fn test_red_keeps_dominant_channel() {
        let frame = VideoFrame::solid(4, 2, [220, 20, 20, 255], 0);
        let nv21 = Nv21Frame::from_rgba(&frame, 4, 2).unwrap();
        let rgb = nv21.to_rgb_image().unwrap();
        let p = rgb.get_pixel(1, 1).0;
        assert!(p[0] > 180 && p[1] < 60 && p[2] < 60, "got {:?}", p);
    }

    #[test]
    fn test_nv21_short_buffer_rejected() {
        assert!(nv21_to_rgb(&[0u8; 10], 4, 4).is_none());
    }

    #[test]
    fn test_flip_vertical() {
        let mut data = vec![1, 1, 2, 2, 3, 3];
        flip_vertical(&mut data, 2);
        assert_eq!(data, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn test_copy_clamped_never_overruns() {
        let mut small = [0u8; 4];
        assert_eq!(copy_clamped(&mut small, &[9u8; 10]), 4);
        assert_eq!(small, [9; 4]);

        let mut large = [0u8; 6];
        assert_eq!(copy_clamped(&mut large, &[7u8; 3]), 3);
        assert_eq!(large, [7, 7, 7, 0, 0, 0]);
    }

    #[test]
    fn test_scaled_nv21_has_declared_size() {
        let frame = VideoFrame::solid(16, 8, [0, 0, 255, 255], 0);
        let nv21 = Nv21Frame::from_rgba(&frame, 6, 4).unwrap();
        assert_eq!(nv21.data.len(), nv21_len(6, 4));
    }
}
