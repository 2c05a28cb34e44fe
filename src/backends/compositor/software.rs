// SPDX-License-Identifier: MPL-2.0

//! CPU rasterizer implementing the graphics context
//!
//! Produces the same pixels as the GPU path with nearest-neighbor sampling.
//! Always available, so it backs headless runs and tests.

use super::graphics::{Framebuffer, GraphicsBackend, GraphicsContext, ReleaseStage, check_window};
use super::transform::{Mat4, Viewport};
use crate::backends::capture::TargetSurface;
use crate::errors::CompositorError;
use crate::media::frame::VideoFrame;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Live context counters, shared by every context of one backend
#[derive(Debug, Default)]
pub struct BackendStats {
    pub contexts_created: AtomicUsize,
    pub contexts_released: AtomicUsize,
    pub frames_presented: AtomicUsize,
}

impl BackendStats {
    pub fn live_contexts(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
            - self.contexts_released.load(Ordering::SeqCst)
    }
}

/// Backend creating [`SoftwareContext`]s
#[derive(Debug, Default, Clone)]
pub struct SoftwareBackend {
    stats: Arc<BackendStats>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        Arc::clone(&self.stats)
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_context(&self) -> Result<Box<dyn GraphicsContext>, CompositorError> {
        self.stats.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SoftwareContext {
            stats: Arc::clone(&self.stats),
            window: None,
            offscreen: None,
            program: false,
            texture: None,
            texture_allocated: false,
            framebuffer: Framebuffer::default(),
            presented: 0,
            context_alive: true,
        }))
    }
}

pub struct SoftwareContext {
    stats: Arc<BackendStats>,
    window: Option<Arc<dyn TargetSurface>>,
    offscreen: Option<(u32, u32)>,
    program: bool,
    texture: Option<VideoFrame>,
    texture_allocated: bool,
    framebuffer: Framebuffer,
    presented: u64,
    context_alive: bool,
}

impl SoftwareContext {
    fn sample(texture: &VideoFrame, u: f32, v: f32) -> [u8; 4] {
        let x = ((u * texture.width as f32).floor() as i64).clamp(0, texture.width as i64 - 1);
        let y = ((v * texture.height as f32).floor() as i64).clamp(0, texture.height as i64 - 1);
        texture.pixel(x as u32, y as u32).unwrap_or(CLEAR_COLOR)
    }
}

impl GraphicsContext for SoftwareContext {
    fn attach_window(&mut self, target: Arc<dyn TargetSurface>) -> Result<(), CompositorError> {
        check_window(&target)?;
        self.window = Some(target);
        Ok(())
    }

    fn attach_offscreen(&mut self, width: u32, height: u32) -> Result<(), CompositorError> {
        self.offscreen = Some((width, height));
        Ok(())
    }

    fn has_window(&self) -> bool {
        self.window.is_some()
    }

    fn link_program(&mut self) -> Result<(), CompositorError> {
        self.program = true;
        Ok(())
    }

    fn create_external_texture(&mut self) -> Result<(), CompositorError> {
        self.texture_allocated = true;
        Ok(())
    }

    fn update_texture(&mut self, frame: &VideoFrame) -> Result<(), CompositorError> {
        if !self.texture_allocated {
            return Err(CompositorError::Texture("texture not allocated".into()));
        }
        self.texture = Some(frame.clone());
        Ok(())
    }

    fn draw(&mut self, viewport: Viewport, mvp: &Mat4, st: &Mat4) -> Result<(), CompositorError> {
        if !self.program {
            return Err(CompositorError::Draw("no program".into()));
        }
        if self.window.is_none() && self.offscreen.is_none() {
            return Err(CompositorError::Draw("no surface bound".into()));
        }
        let inverse = mvp
            .inverse_2d()
            .ok_or_else(|| CompositorError::Draw("singular transform".into()))?;

        let (w, h) = (viewport.width, viewport.height);
        let mut fb = Framebuffer::new(w, h);

        for row in 0..h {
            let ndc_y = (2 * row + 1) as f32 / h as f32 - 1.0;
            for col in 0..w {
                let ndc_x = (2 * col + 1) as f32 / w as f32 - 1.0;
                let (qx, qy) = inverse.apply(ndc_x, ndc_y);
                let pixel = match &self.texture {
                    Some(texture) if qx.abs() <= 1.0 && qy.abs() <= 1.0 => {
                        let (u, v) = st.apply((qx + 1.0) * 0.5, (qy + 1.0) * 0.5);
                        Self::sample(texture, u, v)
                    }
                    _ => CLEAR_COLOR,
                };
                let offset = ((row * w + col) * 4) as usize;
                fb.data[offset..offset + 4].copy_from_slice(&pixel);
            }
        }

        self.framebuffer = fb;
        Ok(())
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CompositorError> {
        Ok(self.framebuffer.read_region(width, height))
    }

    fn present(&mut self) -> Result<(), CompositorError> {
        let Some(window) = &self.window else {
            // Off-screen swap has no visible effect
            return Ok(());
        };
        let frame = self
            .framebuffer
            .to_frame(self.presented)
            .ok_or_else(|| CompositorError::Draw("empty framebuffer".into()))?;
        window.queue_frame(frame)?;
        self.presented += 1;
        self.stats.frames_presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_stage(&mut self, stage: ReleaseStage) {
        match stage {
            ReleaseStage::Texture => {
                self.texture = None;
                self.texture_allocated = false;
            }
            ReleaseStage::Program => self.program = false,
            ReleaseStage::Surface => {
                self.window = None;
                self.offscreen = None;
                self.framebuffer = Framebuffer::default();
            }
            ReleaseStage::Context => {
                if self.context_alive {
                    self.context_alive = false;
                    self.stats.contexts_released.fetch_add(1, Ordering::SeqCst);
                }
            }
            ReleaseStage::Display => debug!("Software display released"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::transform::rotation_matrix;
    use super::*;

    /// 2x2 texture: red, green on top; blue, white below
    fn quadrant_texture() -> VideoFrame {
        VideoFrame::from_rgba(
            2,
            2,
            vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 255,
            ],
            0,
        )
        .unwrap()
    }

    fn drawn_top_down(degrees: i32) -> VideoFrame {
        let backend = SoftwareBackend::new();
        let mut ctx = backend.create_context().unwrap();
        ctx.attach_offscreen(2, 2).unwrap();
        ctx.link_program().unwrap();
        ctx.create_external_texture().unwrap();
        ctx.update_texture(&quadrant_texture()).unwrap();
        ctx.draw(Viewport::new(2, 2), &rotation_matrix(degrees), &Mat4::flip_y())
            .unwrap();
        let mut rows = ctx.read_pixels(2, 2).unwrap();
        crate::media::frame::flip_vertical(&mut rows, 8);
        VideoFrame::from_rgba(2, 2, rows, 0).unwrap()
    }

    #[test]
    fn test_unrotated_draw_is_upright() {
        let out = drawn_top_down(0);
        assert_eq!(out.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(out.pixel(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(out.pixel(0, 1), Some([0, 0, 255, 255]));
        assert_eq!(out.pixel(1, 1), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_quarter_turn_is_clockwise() {
        // Clockwise: the left column (red over blue) becomes the top row (blue, red)
        let out = drawn_top_down(90);
        assert_eq!(out.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(out.pixel(1, 0), Some([255, 0, 0, 255]));
        assert_eq!(out.pixel(0, 1), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(1, 1), Some([0, 255, 0, 255]));
    }

    #[test]
    fn test_half_turn() {
        let out = drawn_top_down(180);
        assert_eq!(out.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(1, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_draw_without_surface_fails() {
        let backend = SoftwareBackend::new();
        let mut ctx = backend.create_context().unwrap();
        ctx.link_program().unwrap();
        assert!(
            ctx.draw(Viewport::new(1, 1), &Mat4::IDENTITY, &Mat4::IDENTITY)
                .is_err()
        );
    }

    #[test]
    fn test_release_counts_context_once() {
        let backend = SoftwareBackend::new();
        let stats = backend.stats();
        let mut ctx = backend.create_context().unwrap();
        assert_eq!(stats.live_contexts(), 1);
        for stage in ReleaseStage::ORDER {
            ctx.release_stage(stage);
        }
        ctx.release_stage(ReleaseStage::Context);
        assert_eq!(stats.live_contexts(), 0);
    }
}
