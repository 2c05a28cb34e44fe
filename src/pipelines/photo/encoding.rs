// SPDX-License-Identifier: GPL-3.0-only

//! JPEG encoding of injected photos
//!
//! Injection encodes at full quality and retries once at reduced quality when
//! the result does not fit the receiving buffer.

use crate::constants::JpegQuality;
use crate::errors::PhotoError;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Encoded image data
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: JpegQuality,
}

/// Encode image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: JpegQuality) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);

    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality.value());

    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;

    Ok(buffer)
}

/// Encode so the result fits `capacity` bytes, trying each quality step once
pub fn encode_within(image: &RgbImage, capacity: usize) -> Result<EncodedImage, PhotoError> {
    let mut size = 0;
    for quality in JpegQuality::ALL {
        let data = encode_jpeg(image, quality)?;
        if data.len() <= capacity {
            debug!(
                size = data.len(),
                capacity,
                quality = quality.display_name(),
                "JPEG fits receiving buffer"
            );
            return Ok(EncodedImage {
                data,
                width: image.width(),
                height: image.height(),
                quality,
            });
        }
        debug!(size = data.len(), capacity, quality = quality.display_name(), "JPEG too large");
        size = data.len();
    }
    Err(PhotoError::TooLarge { size, capacity })
}

/// Save encoded image under a timestamped name in `output_dir`
pub async fn save_jpeg(encoded: EncodedImage, output_dir: &Path) -> Result<PathBuf, PhotoError> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filepath = output_dir.join(format!("photo_{}.jpg", timestamp));
    save_jpeg_to(encoded, filepath).await
}

/// Save encoded image to `path`
pub async fn save_jpeg_to(encoded: EncodedImage, path: PathBuf) -> Result<PathBuf, PhotoError> {
    info!(path = %path.display(), size = encoded.data.len(), "Saving photo");

    // Write to disk in background task (I/O-bound)
    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &encoded.data)
    })
    .await
    .map_err(|e| PhotoError::EncodingFailed(format!("save task error: {}", e)))?
    .map_err(|e| PhotoError::EncodingFailed(format!("failed to save photo: {}", e)))?;

    Ok(path)
}
