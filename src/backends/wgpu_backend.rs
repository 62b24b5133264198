// SPDX-License-Identifier: MPL-2.0

//! GPU render backend on wgpu
//!
//! Draws the effect program into an offscreen `Rgba8Unorm` target and copies
//! the target into `MAP_READ` staging buffers. Every device call runs inside
//! validation and out-of-memory error scopes so failures come back as
//! [`FilterError`] values instead of the default uncaptured-error panic.

use super::{
    BackendType, BufferId, DrawPass, GeometryId, PlaneFormat, ProgramId, RenderBackend,
    ResourceKind, ResourceStats, TextureId,
};
use crate::constants::BYTES_PER_PIXEL;
use crate::errors::{FilterError, FilterResult};
use crate::gpu::wgpu::util::DeviceExt;
use crate::gpu::{self, GpuDeviceInfo, wgpu};
use crate::shaders::gpu_processor::{self, CachedDimensions, PendingMap};
use crate::shaders::{Effect, EffectParams, QuadVertex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    /// Effect currently written into `uniform_buffer`
    effect: Option<Effect>,
}

struct GpuGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: PlaneFormat,
    width: u32,
    height: u32,
}

struct StagingBuffer {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    /// Mapping requested after the last copy into this buffer
    pending: Option<PendingMap>,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// wgpu implementation of [`RenderBackend`]
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    sampler: wgpu::Sampler,
    next_id: u32,
    programs: HashMap<ProgramId, GpuProgram>,
    geometries: HashMap<GeometryId, GpuGeometry>,
    textures: HashMap<TextureId, GpuTexture>,
    buffers: HashMap<BufferId, StagingBuffer>,
    target: Option<RenderTarget>,
    target_dims: CachedDimensions,
    stats: ResourceStats,
}

impl WgpuBackend {
    /// Acquire an adapter and device
    ///
    /// # Returns
    /// * `Err(FilterError::ResourceCreation)` - No adapter or device available
    pub fn new(power_preference: wgpu::PowerPreference) -> FilterResult<Self> {
        let (device, queue, info) = pollster::block_on(gpu::create_render_device(
            "nv12_effect_device",
            power_preference,
        ))
        .map_err(FilterError::ResourceCreation)?;

        info!(
            adapter_name = %info.adapter_name,
            backend = ?info.backend,
            "GPU render backend ready"
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nv12_plane_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            info,
            sampler,
            next_id: 0,
            programs: HashMap::new(),
            geometries: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            target: None,
            target_dims: CachedDimensions::default(),
            stats: ResourceStats::default(),
        })
    }

    /// Adapter the device was created on
    pub fn device_info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    fn next_raw_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `f` inside out-of-memory and validation error scopes
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }

    fn ensure_target(&mut self, width: u32, height: u32) -> FilterResult<()> {
        if self.target.is_some() && !self.target_dims.needs_update(width, height) {
            return Ok(());
        }
        debug!(width, height, "Allocating render target");

        self.target = None;
        self.target_dims.reset();
        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("nv12_effect_target"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TARGET_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .map_err(|e| FilterError::DeviceState(format!("render target: {}", e)))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.target = Some(RenderTarget { texture, view });
        self.target_dims.update(width, height);
        Ok(())
    }
}

fn plane_texture_format(format: PlaneFormat) -> wgpu::TextureFormat {
    match format {
        PlaneFormat::Luma => wgpu::TextureFormat::R8Unorm,
        PlaneFormat::Chroma => wgpu::TextureFormat::Rg8Unorm,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl RenderBackend for WgpuBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Gpu
    }

    fn describe(&self) -> String {
        format!("{} ({:?})", self.info.adapter_name, self.info.backend)
    }

    fn stats(&self) -> ResourceStats {
        self.stats
    }

    fn create_program(&mut self, source: &str) -> FilterResult<ProgramId> {
        let program = self
            .scoped(|device| {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("nv12_effect_shader"),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });

                // Y texture, UV texture, sampler, effect uniform
                let bind_group_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("nv12_effect_bind_group_layout"),
                        entries: &[
                            texture_entry(0),
                            texture_entry(1),
                            wgpu::BindGroupLayoutEntry {
                                binding: 2,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Sampler(
                                    wgpu::SamplerBindingType::Filtering,
                                ),
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 3,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Buffer {
                                    ty: wgpu::BufferBindingType::Uniform,
                                    has_dynamic_offset: false,
                                    min_binding_size: None,
                                },
                                count: None,
                            },
                        ],
                    });

                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("nv12_effect_pipeline_layout"),
                        bind_group_layouts: &[&bind_group_layout],
                        push_constant_ranges: &[],
                    });

                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("nv12_effect_pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<QuadVertex>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &QUAD_ATTRIBUTES,
                        }],
                        compilation_options: Default::default(),
                    },
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState {
                        count: 1,
                        mask: !0,
                        alpha_to_coverage_enabled: false,
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: TARGET_FORMAT,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    multiview: None,
                    cache: None,
                });

                let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("nv12_effect_params"),
                    size: std::mem::size_of::<EffectParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                GpuProgram {
                    pipeline,
                    bind_group_layout,
                    uniform_buffer,
                    effect: None,
                }
            })
            .map_err(|e| {
                error!(error = %e, "Effect program failed to build");
                FilterError::ResourceCreation(format!("effect program: {}", e))
            })?;

        let id = ProgramId::new(self.next_raw_id());
        self.programs.insert(id, program);
        self.stats.on_create(ResourceKind::Program);
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if let Some(program) = self.programs.remove(&program) {
            program.uniform_buffer.destroy();
            self.stats.on_destroy(ResourceKind::Program);
        }
    }

    fn create_geometry(
        &mut self,
        vertices: &[QuadVertex],
        indices: &[u16],
    ) -> FilterResult<GeometryId> {
        let geometry = self
            .scoped(|device| GpuGeometry {
                vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("nv12_quad_vertices"),
                    contents: bytemuck::cast_slice(vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("nv12_quad_indices"),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                index_count: indices.len() as u32,
            })
            .map_err(|e| FilterError::DeviceState(format!("quad geometry: {}", e)))?;

        let id = GeometryId::new(self.next_raw_id());
        self.geometries.insert(id, geometry);
        self.stats.on_create(ResourceKind::Geometry);
        Ok(id)
    }

    fn destroy_geometry(&mut self, geometry: GeometryId) {
        if let Some(geometry) = self.geometries.remove(&geometry) {
            geometry.vertex_buffer.destroy();
            geometry.index_buffer.destroy();
            self.stats.on_destroy(ResourceKind::Geometry);
        }
    }

    fn create_texture(
        &mut self,
        format: PlaneFormat,
        width: u32,
        height: u32,
    ) -> FilterResult<TextureId> {
        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(match format {
                        PlaneFormat::Luma => "nv12_y_texture",
                        PlaneFormat::Chroma => "nv12_uv_texture",
                    }),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: plane_texture_format(format),
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .map_err(|e| FilterError::DeviceState(format!("{:?} texture: {}", format, e)))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TextureId::new(self.next_raw_id());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                format,
                width,
                height,
            },
        );
        self.stats.on_create(ResourceKind::Texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(texture) = self.textures.remove(&texture) {
            texture.texture.destroy();
            self.stats.on_destroy(ResourceKind::Texture);
        }
    }

    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn upload_plane(&mut self, texture: TextureId, data: &[u8]) -> FilterResult<()> {
        let tex = self
            .textures
            .get(&texture)
            .ok_or_else(|| FilterError::Precondition(format!("unknown texture {:?}", texture)))?;
        let row_bytes = tex.width * tex.format.bytes_per_texel();
        let expected = row_bytes as usize * tex.height as usize;
        if data.len() != expected {
            return Err(FilterError::Precondition(format!(
                "{:?} plane upload for {}x{} needs {} bytes, got {}",
                tex.format,
                tex.width,
                tex.height,
                expected,
                data.len()
            )));
        }

        self.scoped(|_| {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &tex.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row_bytes),
                    rows_per_image: Some(tex.height),
                },
                wgpu::Extent3d {
                    width: tex.width,
                    height: tex.height,
                    depth_or_array_layers: 1,
                },
            );
        })
        .map_err(|e| FilterError::DeviceState(format!("plane upload: {}", e)))
    }

    fn create_staging_buffer(&mut self, width: u32, height: u32) -> FilterResult<BufferId> {
        let padded_row = gpu_processor::padded_bytes_per_row(width);
        let size = padded_row as u64 * height as u64;
        let buffer = self
            .scoped(|device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("nv12_effect_staging"),
                    size,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                })
            })
            .map_err(|e| FilterError::DeviceState(format!("staging buffer: {}", e)))?;

        let id = BufferId::new(self.next_raw_id());
        self.buffers.insert(
            id,
            StagingBuffer {
                buffer,
                width,
                height,
                padded_row,
                pending: None,
            },
        );
        self.stats.on_create(ResourceKind::Buffer);
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(staging) = self.buffers.remove(&buffer) {
            staging.buffer.destroy();
            self.stats.on_destroy(ResourceKind::Buffer);
        }
    }

    fn staging_buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.buffers.get(&buffer).map(|b| b.buffer.size())
    }

    fn draw(&mut self, pass: &DrawPass) -> FilterResult<()> {
        self.ensure_target(pass.width, pass.height)?;

        let program = self
            .programs
            .get_mut(&pass.program)
            .ok_or_else(|| FilterError::Precondition(format!("unknown program {:?}", pass.program)))?;
        if program.effect != Some(pass.effect) {
            self.queue.write_buffer(
                &program.uniform_buffer,
                0,
                bytemuck::bytes_of(&EffectParams::new(pass.effect)),
            );
            program.effect = Some(pass.effect);
        }

        let program = &self.programs[&pass.program];
        let geometry = self.geometries.get(&pass.geometry).ok_or_else(|| {
            FilterError::Precondition(format!("unknown geometry {:?}", pass.geometry))
        })?;
        let luma = self
            .textures
            .get(&pass.luma)
            .ok_or_else(|| FilterError::Precondition(format!("unknown texture {:?}", pass.luma)))?;
        let chroma = self.textures.get(&pass.chroma).ok_or_else(|| {
            FilterError::Precondition(format!("unknown texture {:?}", pass.chroma))
        })?;
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| FilterError::DeviceState("render target missing".to_string()))?;

        self.scoped(|device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("nv12_effect_bind_group"),
                layout: &program.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&luma.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&chroma.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: program.uniform_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nv12_effect_draw_encoder"),
            });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("nv12_effect_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

                render_pass.set_viewport(
                    0.0,
                    0.0,
                    pass.width as f32,
                    pass.height as f32,
                    0.0,
                    1.0,
                );
                render_pass.set_pipeline(&program.pipeline);
                render_pass.set_bind_group(0, Some(&bind_group), &[]);
                render_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                render_pass
                    .set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..geometry.index_count, 0, 0..1);
            }

            self.queue.submit(std::iter::once(encoder.finish()));
        })
        .map_err(|e| FilterError::DeviceState(format!("draw: {}", e)))
    }

    fn request_readback(&mut self, buffer: BufferId) -> FilterResult<()> {
        let staging = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| FilterError::Precondition(format!("unknown buffer {:?}", buffer)))?;
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| FilterError::DeviceState("nothing has been drawn".to_string()))?;
        if self.target_dims.needs_update(staging.width, staging.height) {
            return Err(FilterError::DeviceState(format!(
                "staging buffer sized {}x{} cannot receive a {}x{} target",
                staging.width, staging.height, self.target_dims.width, self.target_dims.height
            )));
        }

        // A slot that was never read is still mapped or has a map in flight
        if staging.pending.take().is_some() {
            staging.buffer.unmap();
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nv12_effect_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(staging.padded_row),
                    rows_per_image: Some(staging.height),
                },
            },
            wgpu::Extent3d {
                width: staging.width,
                height: staging.height,
                depth_or_array_layers: 1,
            },
        );
        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FilterError::DeviceState(format!("readback copy: {}", e)));
        }

        staging.pending = Some(gpu_processor::request_map_read(
            &staging.buffer,
            Some(submission),
        ));
        Ok(())
    }

    fn read_staging(&mut self, buffer: BufferId, out: &mut [u8]) -> FilterResult<()> {
        let staging = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| FilterError::Precondition(format!("unknown buffer {:?}", buffer)))?;
        let unpadded_row = (staging.width * BYTES_PER_PIXEL) as usize;
        let expected = unpadded_row * staging.height as usize;
        if out.len() != expected {
            return Err(FilterError::Precondition(format!(
                "readback destination must be {} bytes, got {}",
                expected,
                out.len()
            )));
        }

        let pending = staging
            .pending
            .take()
            .unwrap_or_else(|| gpu_processor::request_map_read(&staging.buffer, None));
        pollster::block_on(gpu_processor::read_buffer_async(
            &self.device,
            &staging.buffer,
            pending,
            out,
            unpadded_row,
            staging.padded_row as usize,
        ))
        .map_err(FilterError::DeviceState)
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        debug!(
            live = self.stats.live_total(),
            "Dropping GPU render backend"
        );
    }
}
