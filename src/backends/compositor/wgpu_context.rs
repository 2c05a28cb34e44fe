// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of the graphics context
//!
//! Frames are uploaded into an RGBA texture, drawn as a rotated quad into an
//! off-screen render target, and read back for presentation. The render target
//! is top-down; readback reverses the rows so callers see the same bottom-up
//! layout as the software path.

use super::graphics::{Framebuffer, GraphicsBackend, GraphicsContext, ReleaseStage, check_window};
use super::transform::{Mat4, Viewport};
use crate::backends::capture::TargetSurface;
use crate::errors::CompositorError;
use crate::gpu::{GpuDeviceInfo, create_render_device_blocking};
use crate::media::frame::VideoFrame;
use crate::shaders::{COMPOSITE_SHADER, QUAD_VERTEX_COUNT};
use std::sync::Arc;
use tracing::{debug, info};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Uniform block matching `Transforms` in composite.wgsl
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TransformUniform {
    mvp: [f32; 16],
    st: [f32; 16],
}

/// Backend sharing one device between every context it creates
#[derive(Clone)]
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
}

impl WgpuBackend {
    /// Create the device; fails when no adapter is available
    pub fn new() -> Result<Self, CompositorError> {
        let (device, queue, info) = create_render_device_blocking("camswap_compositor")
            .map_err(CompositorError::ContextCreation)?;
        Ok(Self {
            device,
            queue,
            info,
        })
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_context(&self) -> Result<Box<dyn GraphicsContext>, CompositorError> {
        debug!(adapter = %self.info.adapter_name, "Creating wgpu compositor context");
        Ok(Box::new(WgpuContext {
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
            window: None,
            offscreen: None,
            pipeline: None,
            uniform: None,
            sampler: None,
            input: None,
            target: None,
            framebuffer: Framebuffer::default(),
            stale: false,
            presented: 0,
        }))
    }
}

struct Program {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

struct SizedTexture {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    window: Option<Arc<dyn TargetSurface>>,
    offscreen: Option<(u32, u32)>,
    pipeline: Option<Program>,
    uniform: Option<wgpu::Buffer>,
    sampler: Option<wgpu::Sampler>,
    input: Option<SizedTexture>,
    target: Option<SizedTexture>,
    framebuffer: Framebuffer,
    /// Target drawn since the last readback
    stale: bool,
    presented: u64,
}

impl WgpuContext {
    fn create_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
    ) -> SizedTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        });
        SizedTexture {
            texture,
            width,
            height,
        }
    }

    fn upload(&self, texture: &wgpu::Texture, width: u32, height: u32, data: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Copy the render target to the CPU framebuffer if it changed
    fn readback(&mut self) -> Result<(), CompositorError> {
        if !self.stale {
            return Ok(());
        }
        let Some(target) = &self.target else {
            return Ok(());
        };
        let (width, height) = (target.width, target.height);
        let row_bytes = width * 4;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("composite_readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let padded = pollster::block_on(read_buffer(&self.device, &staging))?;

        // Render target rows are top-down; the framebuffer is bottom-up
        let mut fb = Framebuffer::new(width, height);
        for (dst_row, src_row) in (0..height as usize).rev().enumerate() {
            let src = src_row * padded_row as usize;
            let dst = dst_row * row_bytes as usize;
            fb.data[dst..dst + row_bytes as usize]
                .copy_from_slice(&padded[src..src + row_bytes as usize]);
        }
        self.framebuffer = fb;
        self.stale = false;
        Ok(())
    }
}

/// Map a staging buffer and copy its contents out
async fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, CompositorError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| CompositorError::Draw("Failed to receive buffer mapping".into()))?
        .map_err(|e| CompositorError::Draw(format!("Failed to map buffer: {:?}", e)))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

impl GraphicsContext for WgpuContext {
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
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("composite_shader"),
                source: wgpu::ShaderSource::Wgsl(COMPOSITE_SHADER.into()),
            });

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("composite_bind_group_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("composite_pipeline_layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("composite_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TEXTURE_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(CompositorError::ProgramLink(error.to_string()));
        }

        self.uniform = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("composite_transforms"),
            size: std::mem::size_of::<TransformUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.pipeline = Some(Program { pipeline, layout });
        info!("Composite program linked");
        Ok(())
    }

    fn create_external_texture(&mut self) -> Result<(), CompositorError> {
        self.sampler = Some(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("composite_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }));

        // Placeholder until the first frame arrives
        let placeholder = self.create_texture(
            "composite_input",
            1,
            1,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        self.upload(&placeholder.texture, 1, 1, &[0, 0, 0, 255]);
        self.input = Some(placeholder);
        Ok(())
    }

    fn update_texture(&mut self, frame: &VideoFrame) -> Result<(), CompositorError> {
        let resize = match &self.input {
            Some(input) => input.width != frame.width || input.height != frame.height,
            None => return Err(CompositorError::Texture("texture not allocated".into())),
        };
        if resize {
            debug!(width = frame.width, height = frame.height, "Reallocating input texture");
            self.input = Some(self.create_texture(
                "composite_input",
                frame.width,
                frame.height,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ));
        }
        if let Some(input) = &self.input {
            self.upload(&input.texture, frame.width, frame.height, &frame.data);
        }
        Ok(())
    }

    fn draw(&mut self, viewport: Viewport, mvp: &Mat4, st: &Mat4) -> Result<(), CompositorError> {
        if self.window.is_none() && self.offscreen.is_none() {
            return Err(CompositorError::Draw("no surface bound".into()));
        }
        if viewport.is_empty() {
            return Err(CompositorError::Draw("empty viewport".into()));
        }

        let needs_target = !matches!(
            &self.target,
            Some(t) if t.width == viewport.width && t.height == viewport.height
        );
        if needs_target {
            self.target = Some(self.create_texture(
                "composite_target",
                viewport.width,
                viewport.height,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            ));
        }

        let (Some(program), Some(uniform), Some(sampler), Some(input), Some(target)) = (
            &self.pipeline,
            &self.uniform,
            &self.sampler,
            &self.input,
            &self.target,
        ) else {
            return Err(CompositorError::Draw("program or texture missing".into()));
        };

        let transforms = TransformUniform {
            mvp: mvp.0,
            st: st.0,
        };
        self.queue
            .write_buffer(uniform, 0, bytemuck::bytes_of(&transforms));

        let input_view = input
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let target_view = target
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_bind_group"),
            layout: &program.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, Some(&bind_group), &[]);
            pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.stale = true;
        Ok(())
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CompositorError> {
        self.readback()?;
        Ok(self.framebuffer.read_region(width, height))
    }

    fn present(&mut self) -> Result<(), CompositorError> {
        if self.window.is_none() {
            return Ok(());
        }
        self.readback()?;
        let frame = self
            .framebuffer
            .to_frame(self.presented)
            .ok_or_else(|| CompositorError::Draw("empty framebuffer".into()))?;
        if let Some(window) = &self.window {
            window.queue_frame(frame)?;
        }
        self.presented += 1;
        Ok(())
    }

    fn release_stage(&mut self, stage: ReleaseStage) {
        match stage {
            ReleaseStage::Texture => {
                self.input = None;
                self.sampler = None;
            }
            ReleaseStage::Program => {
                self.pipeline = None;
                self.uniform = None;
            }
            ReleaseStage::Surface => {
                self.window = None;
                self.offscreen = None;
                self.target = None;
                self.framebuffer = Framebuffer::default();
                self.stale = false;
            }
            // The device is shared by the backend and outlives its contexts
            ReleaseStage::Context => {
                let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
            }
            ReleaseStage::Display => debug!("wgpu context released"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::transform::rotation_matrix;
    use super::*;

    #[test]
    fn test_uniform_layout_matches_shader() {
        // Two mat4x4<f32>
        assert_eq!(std::mem::size_of::<TransformUniform>(), 128);
    }

    #[test]
    fn test_gpu_draw_matches_orientation() {
        let backend = match WgpuBackend::new() {
            Ok(backend) => backend,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let mut ctx = backend.create_context().unwrap();
        ctx.attach_offscreen(2, 2).unwrap();
        ctx.link_program().unwrap();
        ctx.create_external_texture().unwrap();
        let texture = VideoFrame::from_rgba(
            2,
            2,
            vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 255,
            ],
            0,
        )
        .unwrap();
        ctx.update_texture(&texture).unwrap();
        ctx.draw(Viewport::new(2, 2), &rotation_matrix(0), &Mat4::flip_y())
            .unwrap();

        // Bottom-up: first row read is the bottom of the picture
        let rows = ctx.read_pixels(2, 2).unwrap();
        assert_eq!(&rows[0..4], &[0, 0, 255, 255]);
        assert_eq!(&rows[8..12], &[255, 0, 0, 255]);

        for stage in ReleaseStage::ORDER {
            ctx.release_stage(stage);
        }
    }
}
