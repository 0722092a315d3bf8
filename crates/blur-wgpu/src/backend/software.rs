//! Deterministic CPU device
//!
//! Shader stages are parsed, validated and linked through naga exactly as on
//! the GPU backend, so compile and link diagnostics and every location lookup
//! are real. Draws are rasterized on the CPU; the fragment stage of the blur
//! program is evaluated natively from the decoded uniform block.
//!
//! Rasterization follows wgpu conventions: clip-space `y = +1` maps to the
//! first memory row, fragments are shaded at pixel centres, samplers use
//! nearest filtering with clamp-to-edge addressing and RGBA8 output is
//! rounded to the nearest representable value.

use crate::device::{
    AttributeLocation, BufferId, Device, DeviceId, DrawCall, FramebufferId, HandleCounter, ProgramId, ShaderId, ShaderStage, TargetBinding,
    TextureId, UniformLocation,
};
use crate::error::{BlurError, Result};
use crate::reflect::{self, ProgramInterface, StageInterface};
use crate::texture::{BYTES_PER_PIXEL, Image};
use std::collections::HashMap;

/// Largest texture dimension accepted unless configured otherwise
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    compiled: Option<StageInterface>,
}

#[derive(Debug)]
struct ProgramObject {
    vertex: Option<StageInterface>,
    fragment: Option<StageInterface>,
    linked: Option<ProgramInterface>,
}

#[derive(Debug, Clone)]
struct Pixels {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Pixels {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        let start = (y * self.width as usize + x) * BYTES_PER_PIXEL;
        std::array::from_fn(|c| self.data[start + c] as f32 / 255.0)
    }

    /// Nearest sample with clamp-to-edge addressing
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let x = (u * self.width as f32).floor() as i64;
        let y = (v * self.height as f32).floor() as i64;
        self.texel(x, y)
    }

    fn store(&mut self, x: u32, y: u32, color: [f32; 4]) {
        let start = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[start..start + BYTES_PER_PIXEL].copy_from_slice(&quantize(color));
    }

    fn fill(&mut self, color: [f32; 4]) {
        let texel = quantize(color);
        for chunk in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&texel);
        }
    }
}

fn quantize(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Uniform values the native blur fragment stage reads
#[derive(Debug, Clone, Copy)]
struct BlurUniforms {
    resolution: [f32; 2],
    frag_resolution: [f32; 2],
    direction: [f32; 2],
    tap_offsets: [f32; 2],
    flip_y: f32,
    tap_weights: [f32; 3],
}

impl BlurUniforms {
    fn decode(interface: &ProgramInterface, bytes: &[u8]) -> Result<Self> {
        let block = interface
            .uniform_block
            .as_ref()
            .ok_or_else(|| BlurError::Device("software device requires the blur uniform block".to_string()))?;
        let read = |name: &str| -> Result<Vec<f32>> {
            block
                .decode(bytes, name)
                .ok_or_else(|| BlurError::Device(format!("software device cannot evaluate a program without uniform `{name}`")))
        };
        let vec2 = |name: &str| -> Result<[f32; 2]> {
            let values = read(name)?;
            Ok([values[0], *values.get(1).unwrap_or(&0.0)])
        };
        let weights = read("tap_weights")?;
        Ok(Self {
            resolution: vec2("resolution")?,
            frag_resolution: vec2("frag_resolution")?,
            direction: vec2("direction")?,
            tap_offsets: vec2("tap_offsets")?,
            flip_y: read("flip_y")?[0],
            tap_weights: [weights[0], *weights.get(1).unwrap_or(&0.0), *weights.get(2).unwrap_or(&0.0)],
        })
    }

    /// Fragment stage of the blur program at framebuffer coordinate (`x`, `y`)
    fn shade(&self, source: &Pixels, x: f32, y: f32) -> [f32; 4] {
        let u = x / self.frag_resolution[0];
        let v = 0.5 + (y / self.frag_resolution[1] - 0.5) * self.flip_y;

        let step = |offset: f32| {
            [
                offset * self.direction[0] / self.frag_resolution[0],
                offset * self.direction[1] / self.frag_resolution[1],
            ]
        };
        let taps = [
            ([0.0, 0.0], self.tap_weights[0]),
            (step(self.tap_offsets[0]), self.tap_weights[1]),
            (step(-self.tap_offsets[0]), self.tap_weights[1]),
            (step(self.tap_offsets[1]), self.tap_weights[2]),
            (step(-self.tap_offsets[1]), self.tap_weights[2]),
        ];

        let mut color = [0.0f32; 4];
        for (offset, weight) in taps {
            let texel = source.sample(u + offset[0], v + offset[1]);
            for c in 0..4 {
                color[c] += texel[c] * weight;
            }
        }
        color
    }
}

/// CPU implementation of [`Device`]
#[derive(Debug)]
pub struct SoftwareDevice {
    id: DeviceId,
    max_texture_dimension: u32,
    texture_budget: Option<usize>,
    fail_next: Option<&'static str>,
    handles: HandleCounter,
    surface: Pixels,
    shaders: HashMap<ShaderId, ShaderObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    textures: HashMap<TextureId, Pixels>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    buffers: HashMap<BufferId, Vec<f32>>,
}

impl SoftwareDevice {
    /// Creates a device whose visible surface is `width` × `height`
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: DeviceId::next(),
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            texture_budget: None,
            fail_next: None,
            handles: HandleCounter::default(),
            surface: Pixels::new(width, height),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    /// Lowers the largest accepted texture width or height
    pub fn with_max_texture_dimension(mut self, max_texture_dimension: u32) -> Self {
        self.max_texture_dimension = max_texture_dimension;
        self
    }

    /// Limits how many textures may be live at once
    pub fn with_texture_budget(mut self, textures: usize) -> Self {
        self.texture_budget = Some(textures);
        self
    }

    /// Makes the next creation of `resource` fail
    ///
    /// `resource` is one of `"shader"`, `"program"`, `"texture"`,
    /// `"framebuffer"` or `"buffer"`.
    pub fn fail_next_allocation(&mut self, resource: &'static str) {
        self.fail_next = Some(resource);
    }

    /// Number of shader, program, texture, framebuffer and buffer objects alive
    pub fn live_objects(&self) -> usize {
        self.shaders.len() + self.programs.len() + self.textures.len() + self.framebuffers.len() + self.buffers.len()
    }

    fn check_injected_failure(&mut self, resource: &'static str) -> Result<()> {
        if self.fail_next == Some(resource) {
            self.fail_next = None;
            return Err(BlurError::allocation(resource, "injected allocation failure"));
        }
        Ok(())
    }

    fn linked_program(&self, program: ProgramId) -> Option<&ProgramInterface> {
        self.programs.get(&program)?.linked.as_ref()
    }

    fn vertex_positions(&self, call: &DrawCall<'_>, position: AttributeLocation) -> Result<Vec<[f32; 2]>> {
        let attribute = call
            .attributes
            .iter()
            .find(|attribute| attribute.location.location == position.location)
            .ok_or_else(|| BlurError::invalid_state(format!("no vertex buffer bound to location {}", position.location)))?;
        let data = self
            .buffers
            .get(&attribute.buffer)
            .ok_or_else(|| BlurError::invalid_state(format!("unknown vertex buffer {}", attribute.buffer.raw())))?;

        let stride = position.components as usize;
        let needed = call.vertex_count as usize * stride;
        if stride < 2 || data.len() < needed {
            return Err(BlurError::invalid_state(format!(
                "vertex buffer {} holds {} floats, draw needs {needed}",
                attribute.buffer.raw(),
                data.len()
            )));
        }
        Ok(data[..needed].chunks_exact(stride).map(|vertex| [vertex[0], vertex[1]]).collect())
    }
}

/// Signed doubled area of the triangle (`a`, `b`, `p`)
fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn covers(triangle: &[[f32; 2]; 3], p: [f32; 2]) -> bool {
    let [a, b, c] = *triangle;
    let area = edge(a, b, c);
    if area == 0.0 {
        return false;
    }
    let (w0, w1, w2) = (edge(b, c, p), edge(c, a, p), edge(a, b, p));
    if area > 0.0 {
        w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
    } else {
        w0 <= 0.0 && w1 <= 0.0 && w2 <= 0.0
    }
}

impl Device for SoftwareDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderId> {
        self.check_injected_failure("shader")?;
        let id = ShaderId::from_raw(self.handles.next());
        self.shaders.insert(id, ShaderObject { stage, compiled: None });
        Ok(id)
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> std::result::Result<(), String> {
        let object = self.shaders.get_mut(&shader).ok_or_else(|| format!("unknown shader {}", shader.raw()))?;
        object.compiled = None;
        object.compiled = Some(reflect::compile_stage(object.stage, source)?);
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
        let program = ProgramObject {
            vertex: attached(vertex)?,
            fragment: attached(fragment)?,
            linked: None,
        };
        self.check_injected_failure("program")?;
        let id = ProgramId::from_raw(self.handles.next());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn link_program(&mut self, program: ProgramId) -> std::result::Result<(), String> {
        let object = self.programs.get_mut(&program).ok_or_else(|| format!("unknown program {}", program.raw()))?;
        let (Some(vertex), Some(fragment)) = (&object.vertex, &object.fragment) else {
            return Err("both stages must be compiled before linking".to_string());
        };
        object.linked = Some(reflect::link(vertex, fragment)?);
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        self.linked_program(program)?.attribute(name)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.linked_program(program)?.uniform(name)
    }

    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>) -> Result<TextureId> {
        if width == 0 || height == 0 || width > self.max_texture_dimension || height > self.max_texture_dimension {
            return Err(BlurError::allocation("texture", format!("unsupported size {width}x{height}")));
        }
        if let Some(budget) = self.texture_budget.filter(|budget| self.textures.len() >= *budget) {
            return Err(BlurError::allocation("texture", format!("out of memory: {budget} textures already live")));
        }
        self.check_injected_failure("texture")?;

        let mut texture = Pixels::new(width, height);
        if let Some(pixels) = pixels {
            if pixels.len() != texture.data.len() {
                return Err(BlurError::allocation("texture", format!("expected {} bytes of pixel data, got {}", texture.data.len(), pixels.len())));
            }
            texture.data.copy_from_slice(pixels);
        }
        let id = TextureId::from_raw(self.handles.next());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|pixels| (pixels.width, pixels.height))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId> {
        if !self.textures.contains_key(&texture) {
            return Err(BlurError::allocation("framebuffer", format!("incomplete attachment: texture {} does not exist", texture.raw())));
        }
        self.check_injected_failure("framebuffer")?;
        let id = FramebufferId::from_raw(self.handles.next());
        self.framebuffers.insert(id, texture);
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferId> {
        self.check_injected_failure("buffer")?;
        let id = BufferId::from_raw(self.handles.next());
        self.buffers.insert(id, data.to_vec());
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn clear(&mut self, target: &TargetBinding, color: [f32; 4]) -> Result<()> {
        match target.framebuffer {
            None => self.surface.fill(color),
            Some(framebuffer) => {
                let texture = *self
                    .framebuffers
                    .get(&framebuffer)
                    .ok_or_else(|| BlurError::invalid_state(format!("unknown framebuffer {}", framebuffer.raw())))?;
                self.textures
                    .get_mut(&texture)
                    .ok_or_else(|| BlurError::invalid_state(format!("framebuffer {} lost its texture", framebuffer.raw())))?
                    .fill(color);
            }
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let interface = self
            .linked_program(call.program)
            .ok_or_else(|| BlurError::invalid_state(format!("program {} is not linked", call.program.raw())))?;
        let uniform_bytes = interface.encode_uniforms(call.uniforms).map_err(BlurError::InvalidState)?;
        let uniforms = BlurUniforms::decode(interface, &uniform_bytes)?;
        let position = interface
            .attribute("position")
            .ok_or_else(|| BlurError::Device("software device requires a `position` vertex input".to_string()))?;
        let positions = self.vertex_positions(call, position)?;

        let target_texture = match call.target.framebuffer {
            None => None,
            Some(framebuffer) => Some(
                *self
                    .framebuffers
                    .get(&framebuffer)
                    .ok_or_else(|| BlurError::invalid_state(format!("unknown framebuffer {}", framebuffer.raw())))?,
            ),
        };
        if target_texture == Some(call.texture) {
            return Err(BlurError::invalid_state(format!("texture {} is both sampled and rendered to", call.texture.raw())));
        }
        let source = self
            .textures
            .get(&call.texture)
            .ok_or_else(|| BlurError::invalid_state(format!("unknown texture {}", call.texture.raw())))?
            .clone();

        let target = match target_texture {
            None => &mut self.surface,
            Some(texture) => self
                .textures
                .get_mut(&texture)
                .ok_or_else(|| BlurError::invalid_state(format!("render target texture {} does not exist", texture.raw())))?,
        };

        let viewport = call.target.viewport;
        // pixel position -> clip space -> framebuffer coordinates
        let to_framebuffer = |p: [f32; 2]| {
            let clip_x = p[0] / uniforms.resolution[0] * 2.0 - 1.0;
            let clip_y = -(p[1] / uniforms.resolution[1] * 2.0 - 1.0);
            [
                viewport.x as f32 + (clip_x + 1.0) * 0.5 * viewport.width as f32,
                viewport.y as f32 + (1.0 - clip_y) * 0.5 * viewport.height as f32,
            ]
        };

        let x_end = (viewport.x + viewport.width).min(target.width);
        let y_end = (viewport.y + viewport.height).min(target.height);
        for triangle in positions.chunks_exact(3) {
            let triangle = [to_framebuffer(triangle[0]), to_framebuffer(triangle[1]), to_framebuffer(triangle[2])];
            for y in viewport.y..y_end {
                for x in viewport.x..x_end {
                    let centre = [x as f32 + 0.5, y as f32 + 0.5];
                    if covers(&triangle, centre) {
                        let color = uniforms.shade(&source, centre[0], centre[1]);
                        target.store(x, y, color);
                    }
                }
            }
        }
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> Result<Image> {
        let pixels = self
            .textures
            .get(&texture)
            .ok_or_else(|| BlurError::invalid_state(format!("unknown texture {}", texture.raw())))?;
        Image::new(pixels.width, pixels.height, pixels.data.clone())
    }

    fn read_surface(&mut self) -> Result<Image> {
        let row = self.surface.width as usize * BYTES_PER_PIXEL;
        let flipped: Vec<u8> = self.surface.data.chunks_exact(row).rev().flatten().copied().collect();
        Image::new(self.surface.width, self.surface.height, flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{VertexAttribute, Viewport};
    use crate::program::ShaderProgram;
    use crate::shaders::{FRAGMENT_SHADER, VERTEX_SHADER};

    #[test]
    fn nearest_sampling_clamps_to_edge() {
        let mut pixels = Pixels::new(2, 1);
        pixels.store(0, 0, [1.0, 0.0, 0.0, 1.0]);
        pixels.store(1, 0, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(pixels.sample(-3.0, 0.5), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(pixels.sample(0.49, 0.5), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(pixels.sample(0.51, 0.5), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(pixels.sample(7.0, 9.0), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn quantize_rounds_and_clamps() {
        assert_eq!(quantize([0.5, 1.2, -0.1, 0.998]), [128, 255, 0, 254]);
    }

    #[test]
    fn triangle_coverage_ignores_winding() {
        let clockwise = [[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]];
        let counter = [[0.0, 0.0], [0.0, 4.0], [4.0, 0.0]];
        assert!(covers(&clockwise, [1.0, 1.0]));
        assert!(covers(&counter, [1.0, 1.0]));
        assert!(!covers(&clockwise, [3.5, 3.5]));
        assert!(!covers(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]], [1.0, 1.0]));
    }

    #[test]
    fn read_surface_returns_display_order() {
        let mut device = SoftwareDevice::new(1, 2);
        device.surface.store(0, 0, [1.0, 0.0, 0.0, 1.0]);
        let image = device.read_surface().unwrap();
        assert_eq!(image.pixel(0, 1), [255, 0, 0, 255]);
        assert_eq!(image.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_rejects_feedback_loop() {
        let mut device = SoftwareDevice::new(2, 2);
        let program = ShaderProgram::compile(&mut device, VERTEX_SHADER, FRAGMENT_SHADER).unwrap();
        let texture = device.create_texture(2, 2, None).unwrap();
        let framebuffer = device.create_framebuffer(texture).unwrap();
        let positions = device.create_vertex_buffer(&crate::geometry::rectangle(0.0, 0.0, 2.0, 2.0)).unwrap();

        let err = device
            .draw(&DrawCall {
                program: program.id(),
                target: TargetBinding {
                    framebuffer: Some(framebuffer),
                    viewport: Viewport::full(2, 2),
                },
                texture,
                attributes: &[VertexAttribute {
                    location: program.attributes().position,
                    buffer: positions,
                }],
                uniforms: &[],
                vertex_count: 6,
            })
            .unwrap_err();
        assert!(matches!(err, BlurError::InvalidState(_)), "{err}");
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut device = SoftwareDevice::new(2, 2);
        device.fail_next_allocation("buffer");
        assert!(matches!(device.create_vertex_buffer(&[0.0]), Err(BlurError::ResourceAllocation { resource: "buffer", .. })));
        assert!(device.create_vertex_buffer(&[0.0]).is_ok());
    }

    #[test]
    fn texture_upload_length_is_checked() {
        let mut device = SoftwareDevice::new(2, 2);
        assert!(device.create_texture(2, 2, Some(&[0u8; 3])).is_err());
        assert_eq!(device.live_objects(), 0);
    }
}
