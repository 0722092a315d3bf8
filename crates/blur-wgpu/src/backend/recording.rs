//! Device wrapper that records every call
//!
//! Because a [`DrawCall`] carries all of its bind-point state, the recorded
//! log is enough to check pass ordering, read/write texture alternation and
//! uniform values without inspecting pixels.

use crate::device::{
    AttributeLocation, BufferId, Device, DeviceId, DrawCall, FramebufferId, ProgramId, ShaderId, ShaderStage, TargetBinding, TextureId,
    UniformLocation, UniformValue, VertexAttribute,
};
use crate::error::Result;
use crate::texture::Image;

/// Owned copy of a draw call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: ProgramId,
    pub target: TargetBinding,
    pub texture: TextureId,
    pub attributes: Vec<VertexAttribute>,
    pub uniforms: Vec<(UniformLocation, UniformValue)>,
    pub vertex_count: u32,
}

impl RecordedDraw {
    /// Value the draw assigned to `location`
    pub fn uniform(&self, location: UniformLocation) -> Option<UniformValue> {
        self.uniforms.iter().find(|(loc, _)| *loc == location).map(|(_, value)| *value)
    }
}

/// One call forwarded to the wrapped device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateShader { stage: ShaderStage, shader: ShaderId },
    CompileShader { shader: ShaderId, success: bool },
    DeleteShader(ShaderId),
    CreateProgram { program: ProgramId, vertex: ShaderId, fragment: ShaderId },
    LinkProgram { program: ProgramId, success: bool },
    DeleteProgram(ProgramId),
    CreateTexture { texture: TextureId, width: u32, height: u32, uploaded: bool },
    DeleteTexture(TextureId),
    CreateFramebuffer { framebuffer: FramebufferId, texture: TextureId },
    DeleteFramebuffer(FramebufferId),
    CreateVertexBuffer { buffer: BufferId, len: usize },
    DeleteBuffer(BufferId),
    Clear { target: TargetBinding, color: [f32; 4] },
    Draw(RecordedDraw),
}

/// Forwards to an inner device and logs successful calls in order
#[derive(Debug)]
pub struct RecordingDevice<D> {
    inner: D,
    calls: Vec<DeviceCall>,
}

impl<D: Device> RecordingDevice<D> {
    pub fn new(inner: D) -> Self {
        Self { inner, calls: Vec::new() }
    }

    /// Every recorded call, oldest first
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Recorded draws, oldest first
    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.calls.iter().filter_map(|call| match call {
            DeviceCall::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Forgets everything recorded so far
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: Device> Device for RecordingDevice<D> {
    fn id(&self) -> DeviceId {
        self.inner.id()
    }

    fn surface_size(&self) -> (u32, u32) {
        self.inner.surface_size()
    }

    fn max_texture_dimension(&self) -> u32 {
        self.inner.max_texture_dimension()
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderId> {
        let shader = self.inner.create_shader(stage)?;
        self.calls.push(DeviceCall::CreateShader { stage, shader });
        Ok(shader)
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> std::result::Result<(), String> {
        let result = self.inner.compile_shader(shader, source);
        self.calls.push(DeviceCall::CompileShader { shader, success: result.is_ok() });
        result
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.inner.delete_shader(shader);
        self.calls.push(DeviceCall::DeleteShader(shader));
    }

    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId> {
        let program = self.inner.create_program(vertex, fragment)?;
        self.calls.push(DeviceCall::CreateProgram { program, vertex, fragment });
        Ok(program)
    }

    fn link_program(&mut self, program: ProgramId) -> std::result::Result<(), String> {
        let result = self.inner.link_program(program);
        self.calls.push(DeviceCall::LinkProgram { program, success: result.is_ok() });
        result
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.inner.delete_program(program);
        self.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        self.inner.attribute_location(program, name)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.inner.uniform_location(program, name)
    }

    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>) -> Result<TextureId> {
        let texture = self.inner.create_texture(width, height, pixels)?;
        self.calls.push(DeviceCall::CreateTexture {
            texture,
            width,
            height,
            uploaded: pixels.is_some(),
        });
        Ok(texture)
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.inner.texture_size(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.inner.delete_texture(texture);
        self.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId> {
        let framebuffer = self.inner.create_framebuffer(texture)?;
        self.calls.push(DeviceCall::CreateFramebuffer { framebuffer, texture });
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.inner.delete_framebuffer(framebuffer);
        self.calls.push(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferId> {
        let buffer = self.inner.create_vertex_buffer(data)?;
        self.calls.push(DeviceCall::CreateVertexBuffer { buffer, len: data.len() });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.inner.delete_buffer(buffer);
        self.calls.push(DeviceCall::DeleteBuffer(buffer));
    }

    fn clear(&mut self, target: &TargetBinding, color: [f32; 4]) -> Result<()> {
        self.inner.clear(target, color)?;
        self.calls.push(DeviceCall::Clear { target: *target, color });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        self.inner.draw(call)?;
        self.calls.push(DeviceCall::Draw(RecordedDraw {
            program: call.program,
            target: call.target,
            texture: call.texture,
            attributes: call.attributes.to_vec(),
            uniforms: call.uniforms.to_vec(),
            vertex_count: call.vertex_count,
        }));
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> Result<Image> {
        self.inner.read_texture(texture)
    }

    fn read_surface(&mut self) -> Result<Image> {
        self.inner.read_surface()
    }
}
