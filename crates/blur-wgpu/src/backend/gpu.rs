//! wgpu implementation of [`Device`]
//!
//! Stages are reflected through naga for diagnostics and lookups, then handed
//! to wgpu as shader modules. Linking builds a render pipeline with an
//! automatic layout. wgpu validation errors are captured with error scopes and
//! reported as compile, link or allocation failures instead of reaching the
//! uncaptured-error handler.
//!
//! The visible surface is a headless `Rgba8Unorm` texture. Each draw and clear
//! is submitted on its own so uniform buffer writes are ordered with the passes
//! that read them.

use crate::device::{
    AttributeLocation, BufferId, Device, DeviceId, DrawCall, FramebufferId, HandleCounter, ProgramId, ShaderId, ShaderStage, TargetBinding,
    TextureId, UniformLocation,
};
use crate::error::{BlurError, Result};
use crate::reflect::{self, ProgramInterface, StageInterface};
use crate::texture::{BYTES_PER_PIXEL, Image};
use std::collections::HashMap;

/// Format of every texture and of the visible surface
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Binding of the sampled texture in the program's bind group
const TEXTURE_BINDING: u32 = 1;
/// Binding of the sampler in the program's bind group
const SAMPLER_BINDING: u32 = 2;

const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

#[derive(Debug)]
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone)]
struct CompiledStage {
    interface: StageInterface,
    module: wgpu::ShaderModule,
}

#[derive(Debug)]
struct GpuShader {
    stage: ShaderStage,
    compiled: Option<CompiledStage>,
}

#[derive(Debug)]
struct LinkedProgram {
    interface: ProgramInterface,
    pipeline: wgpu::RenderPipeline,
    /// Shader locations in vertex buffer slot order
    slots: Vec<u32>,
    uniform_buffer: Option<wgpu::Buffer>,
}

#[derive(Debug)]
struct GpuProgram {
    vertex: Option<CompiledStage>,
    fragment: Option<CompiledStage>,
    linked: Option<LinkedProgram>,
}

/// Rasterizing device backed by a wgpu adapter
#[derive(Debug)]
pub struct WgpuDevice {
    id: DeviceId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    handles: HandleCounter,
    sampler: wgpu::Sampler,
    surface: GpuTexture,
    shaders: HashMap<ShaderId, GpuShader>,
    programs: HashMap<ProgramId, GpuProgram>,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
}

impl WgpuDevice {
    /// Requests an adapter and device, with a `width` × `height` visible surface
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BlurError::Device(format!("no suitable adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Blur Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| BlurError::Device(format!("failed to request device: {e}")))?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "wgpu device ready");
        Self::from_parts(device, queue, width, height)
    }

    /// Wraps an existing device and queue
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Result<Self> {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blur Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 0.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });
        let surface = create_gpu_texture(&device, "Visible Surface", width, height).map_err(|reason| BlurError::allocation("surface", reason))?;

        Ok(Self {
            id: DeviceId::next(),
            device,
            queue,
            handles: HandleCounter::default(),
            sampler,
            surface,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
        })
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn wgpu_queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn linked_program(&self, program: ProgramId) -> Option<&LinkedProgram> {
        self.programs.get(&program)?.linked.as_ref()
    }

    fn target_view(&self, target: &TargetBinding) -> Result<(&wgpu::TextureView, Option<TextureId>)> {
        match target.framebuffer {
            None => Ok((&self.surface.view, None)),
            Some(framebuffer) => {
                let texture = *self
                    .framebuffers
                    .get(&framebuffer)
                    .ok_or_else(|| BlurError::invalid_state(format!("unknown framebuffer {}", framebuffer.raw())))?;
                let gpu_texture = self
                    .textures
                    .get(&texture)
                    .ok_or_else(|| BlurError::invalid_state(format!("framebuffer {} lost its texture", framebuffer.raw())))?;
                Ok((&gpu_texture.view, Some(texture)))
            }
        }
    }

    /// Runs `f` inside an error scope catching `filter`
    fn scoped<T>(&self, filter: wgpu::ErrorFilter, f: impl FnOnce() -> T) -> std::result::Result<T, String> {
        self.device.push_error_scope(filter);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }

    fn read_back(&self, texture: &GpuTexture) -> Result<Vec<u8>> {
        let GpuTexture { texture, width, height, .. } = texture;
        let (width, height) = (*width, *height);
        let unpadded_bytes_per_row = width * BYTES_PER_PIXEL as u32;
        let bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
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

        let buffer_slice = buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::PollType::Wait).map_err(|e| BlurError::Device(e.to_string()))?;
        pollster::block_on(receiver.receive())
            .ok_or_else(|| BlurError::Device("readback mapping was cancelled".to_string()))?
            .map_err(|e| BlurError::Device(format!("failed to map readback buffer: {e}")))?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in data.chunks_exact(bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }
}

fn create_gpu_texture(device: &wgpu::Device, label: &str, width: u32, height: u32) -> std::result::Result<GpuTexture, String> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
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
        usage: TEXTURE_USAGE,
        view_formats: &[],
    });
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    if let Some(error) = validation.or(out_of_memory) {
        return Err(error.to_string());
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(GpuTexture { texture, view, width, height })
}

fn vertex_format(components: u32) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

impl Device for WgpuDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderId> {
        let id = ShaderId::from_raw(self.handles.next());
        self.shaders.insert(id, GpuShader { stage, compiled: None });
        Ok(id)
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> std::result::Result<(), String> {
        let stage = self.shaders.get(&shader).map(|object| object.stage).ok_or_else(|| format!("unknown shader {}", shader.raw()))?;
        let interface = reflect::compile_stage(stage, source)?;
        let module = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(interface.entry_point.as_str()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        if let Some(object) = self.shaders.get_mut(&shader) {
            object.compiled = Some(CompiledStage { interface, module });
        }
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId> {
        let attached = |id: ShaderId| {
            self.shaders
                .get(&id)
                .map(|object| object.compiled.clone())
                .ok_or_else(|| BlurError::invalid_state(format!("unknown shader {}", id.raw())))
        };
        let program = GpuProgram {
            vertex: attached(vertex)?,
            fragment: attached(fragment)?,
            linked: None,
        };
        let id = ProgramId::from_raw(self.handles.next());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn link_program(&mut self, program: ProgramId) -> std::result::Result<(), String> {
        let object = self.programs.get(&program).ok_or_else(|| format!("unknown program {}", program.raw()))?;
        let (Some(vertex), Some(fragment)) = (&object.vertex, &object.fragment) else {
            return Err("both stages must be compiled before linking".to_string());
        };
        let interface = reflect::link(&vertex.interface, &fragment.interface)?;

        let mut slots = Vec::with_capacity(interface.attributes.len());
        let mut attribute_descs = Vec::with_capacity(interface.attributes.len());
        for attribute in &interface.attributes {
            let format = vertex_format(attribute.location.components)
                .ok_or_else(|| format!("vertex input `{}` must be an f32 scalar or vector", attribute.name))?;
            slots.push(attribute.location.location);
            attribute_descs.push([wgpu::VertexAttribute {
                format,
                offset: 0,
                shader_location: attribute.location.location,
            }]);
        }
        let buffers: Vec<wgpu::VertexBufferLayout> = attribute_descs
            .iter()
            .map(|attributes| wgpu::VertexBufferLayout {
                array_stride: attributes[0].format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let pipeline = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Blur Program"),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(interface.vertex_entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(interface.fragment_entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TEXTURE_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })?;

        let uniform_buffer = interface.uniform_block.as_ref().map(|block| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Blur Uniforms"),
                size: block.size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let linked = LinkedProgram {
            interface,
            pipeline,
            slots,
            uniform_buffer,
        };
        if let Some(object) = self.programs.get_mut(&program) {
            object.linked = Some(linked);
        }
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        self.linked_program(program)?.interface.attribute(name)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.linked_program(program)?.interface.uniform(name)
    }

    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>) -> Result<TextureId> {
        let gpu_texture = create_gpu_texture(&self.device, "Blur Texture", width, height).map_err(|reason| BlurError::allocation("texture", reason))?;
        if let Some(pixels) = pixels {
            let expected = width as usize * height as usize * BYTES_PER_PIXEL;
            if pixels.len() != expected {
                return Err(BlurError::allocation("texture", format!("expected {expected} bytes of pixel data, got {}", pixels.len())));
            }
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &gpu_texture.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * BYTES_PER_PIXEL as u32),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        let id = TextureId::from_raw(self.handles.next());
        self.textures.insert(id, gpu_texture);
        Ok(id)
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|gpu_texture| (gpu_texture.width, gpu_texture.height))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(gpu_texture) = self.textures.remove(&texture) {
            gpu_texture.texture.destroy();
        }
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId> {
        let gpu_texture = self
            .textures
            .get(&texture)
            .ok_or_else(|| BlurError::allocation("framebuffer", format!("incomplete attachment: texture {} does not exist", texture.raw())))?;
        if !gpu_texture.texture.usage().contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            return Err(BlurError::allocation("framebuffer", "texture cannot be used as a render attachment"));
        }
        let id = FramebufferId::from_raw(self.handles.next());
        self.framebuffers.insert(id, texture);
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferId> {
        let contents: &[u8] = bytemuck::cast_slice(data);
        let buffer = self
            .scoped(wgpu::ErrorFilter::OutOfMemory, || {
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Blur Vertex Buffer"),
                    size: contents.len() as u64,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                self.queue.write_buffer(&buffer, 0, contents);
                buffer
            })
            .map_err(|reason| BlurError::allocation("buffer", reason))?;
        let id = BufferId::from_raw(self.handles.next());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn clear(&mut self, target: &TargetBinding, color: [f32; 4]) -> Result<()> {
        let (view, _) = self.target_view(target)?;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Clear Encoder") });
        {
            let [r, g, b, a] = color.map(f64::from);
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let program = self
            .linked_program(call.program)
            .ok_or_else(|| BlurError::invalid_state(format!("program {} is not linked", call.program.raw())))?;
        let (view, target_texture) = self.target_view(&call.target)?;
        if target_texture == Some(call.texture) {
            return Err(BlurError::invalid_state(format!("texture {} is both sampled and rendered to", call.texture.raw())));
        }
        let source = self
            .textures
            .get(&call.texture)
            .ok_or_else(|| BlurError::invalid_state(format!("unknown texture {}", call.texture.raw())))?;

        let mut vertex_buffers = Vec::with_capacity(program.slots.len());
        for location in &program.slots {
            let attribute = call
                .attributes
                .iter()
                .find(|attribute| attribute.location.location == *location)
                .ok_or_else(|| BlurError::invalid_state(format!("no vertex buffer bound to location {location}")))?;
            let buffer = self
                .buffers
                .get(&attribute.buffer)
                .ok_or_else(|| BlurError::invalid_state(format!("unknown vertex buffer {}", attribute.buffer.raw())))?;
            vertex_buffers.push(buffer);
        }

        let uniform_bytes = program.interface.encode_uniforms(call.uniforms).map_err(BlurError::InvalidState)?;
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: TEXTURE_BINDING,
                resource: wgpu::BindingResource::TextureView(&source.view),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        if let (Some(buffer), Some(block)) = (&program.uniform_buffer, &program.interface.uniform_block) {
            self.queue.write_buffer(buffer, 0, &uniform_bytes);
            entries.push(wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            });
        }
        entries.sort_by_key(|entry| entry.binding);

        let viewport = call.target.viewport;
        self.scoped(wgpu::ErrorFilter::Validation, || {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Blur Bind Group"),
                layout: &program.pipeline.get_bind_group_layout(0),
                entries: &entries,
            });

            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Blur Pass") });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Blur Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                render_pass.set_viewport(viewport.x as f32, viewport.y as f32, viewport.width as f32, viewport.height as f32, 0.0, 1.0);
                render_pass.set_pipeline(&program.pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                for (slot, buffer) in vertex_buffers.iter().enumerate() {
                    render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                render_pass.draw(0..call.vertex_count, 0..1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        })
        .map_err(BlurError::Device)
    }

    fn read_texture(&mut self, texture: TextureId) -> Result<Image> {
        let gpu_texture = self
            .textures
            .get(&texture)
            .ok_or_else(|| BlurError::invalid_state(format!("unknown texture {}", texture.raw())))?;
        let pixels = self.read_back(gpu_texture)?;
        Image::new(gpu_texture.width, gpu_texture.height, pixels)
    }

    fn read_surface(&mut self) -> Result<Image> {
        let pixels = self.read_back(&self.surface)?;
        let row = self.surface.width as usize * BYTES_PER_PIXEL;
        let flipped: Vec<u8> = pixels.chunks_exact(row).rev().flatten().copied().collect();
        Image::new(self.surface.width, self.surface.height, flipped)
    }
}
