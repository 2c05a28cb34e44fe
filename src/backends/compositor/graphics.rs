// SPDX-License-Identifier: MPL-2.0

//! Graphics context abstraction owned by a compositor thread
//!
//! A [`GraphicsBackend`] is shared across threads and only creates contexts.
//! The [`GraphicsContext`] it returns is created on, and never leaves, the
//! compositor thread that asked for it.

use super::transform::{Mat4, Viewport};
use crate::backends::capture::TargetSurface;
use crate::errors::CompositorError;
use crate::media::frame::{VideoFrame, flip_vertical};
use std::sync::Arc;

/// Teardown steps, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStage {
    Texture,
    Program,
    Surface,
    Context,
    Display,
}

impl ReleaseStage {
    /// Order in which a channel releases its context
    pub const ORDER: [ReleaseStage; 5] = [
        ReleaseStage::Texture,
        ReleaseStage::Program,
        ReleaseStage::Surface,
        ReleaseStage::Context,
        ReleaseStage::Display,
    ];
}

/// Factory for graphics contexts
pub trait GraphicsBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create a context; called on the compositor thread
    fn create_context(&self) -> Result<Box<dyn GraphicsContext>, CompositorError>;
}

/// Single-thread graphics context
///
/// Drawing happens into an internal framebuffer sized to the viewport;
/// `present` hands it to the attached window, if any.
pub trait GraphicsContext {
    /// Make the target the current presentable surface
    fn attach_window(&mut self, target: Arc<dyn TargetSurface>) -> Result<(), CompositorError>;

    /// Make a private off-screen surface current
    fn attach_offscreen(&mut self, width: u32, height: u32) -> Result<(), CompositorError>;

    fn has_window(&self) -> bool;

    fn link_program(&mut self) -> Result<(), CompositorError>;

    /// Allocate the texture decoded frames are uploaded into
    fn create_external_texture(&mut self) -> Result<(), CompositorError>;

    fn update_texture(&mut self, frame: &VideoFrame) -> Result<(), CompositorError>;

    /// Clear, then draw the textured quad transformed by `mvp`, sampling through `st`
    fn draw(&mut self, viewport: Viewport, mvp: &Mat4, st: &Mat4) -> Result<(), CompositorError>;

    /// Bottom-up RGBA rows of the last drawn framebuffer, clipped or padded to the size
    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CompositorError>;

    fn present(&mut self) -> Result<(), CompositorError>;

    /// Release one resource class; must tolerate repeated or out-of-state calls
    fn release_stage(&mut self, stage: ReleaseStage);
}

/// CPU copy of a drawn frame, rows stored bottom-up
#[derive(Debug, Clone, Default)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Region anchored at the lower-left corner, zero-filled outside the buffer
    pub fn read_region(&self, width: u32, height: u32) -> Vec<u8> {
        let mut out = vec![0u8; width as usize * height as usize * 4];
        let copy_w = width.min(self.width) as usize * 4;
        for row in 0..height.min(self.height) as usize {
            let src = row * self.width as usize * 4;
            let dst = row * width as usize * 4;
            out[dst..dst + copy_w].copy_from_slice(&self.data[src..src + copy_w]);
        }
        out
    }

    /// Top-down frame for presenting to a target
    pub fn to_frame(&self, sequence: u64) -> Option<VideoFrame> {
        let mut data = self.data.clone();
        flip_vertical(&mut data, self.width as usize * 4);
        VideoFrame::from_rgba(self.width, self.height, data, sequence)
    }
}

/// Reject targets that refuse a window surface
pub fn check_window(target: &Arc<dyn TargetSurface>) -> Result<(), CompositorError> {
    if !target.is_valid() {
        return Err(CompositorError::WindowRejected("target released".into()));
    }
    if !target.accepts_window() {
        return Err(CompositorError::WindowRejected(format!(
            "{} does not accept a window surface",
            target.describe()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_region_pads_and_clips() {
        let mut fb = Framebuffer::new(2, 2);
        fb.data.copy_from_slice(&[
            1, 1, 1, 1, 2, 2, 2, 2, //
            3, 3, 3, 3, 4, 4, 4, 4,
        ]);
        let clipped = fb.read_region(1, 2);
        assert_eq!(clipped, vec![1, 1, 1, 1, 3, 3, 3, 3]);

        let padded = fb.read_region(3, 1);
        assert_eq!(padded, vec![1, 1, 1, 1, 2, 2, 2, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn test_to_frame_flips_rows() {
        let mut fb = Framebuffer::new(1, 2);
        fb.data.copy_from_slice(&[10, 10, 10, 255, 20, 20, 20, 255]);
        let frame = fb.to_frame(0).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([20, 20, 20, 255]));
        assert_eq!(frame.pixel(0, 1), Some([10, 10, 10, 255]));
    }
}
