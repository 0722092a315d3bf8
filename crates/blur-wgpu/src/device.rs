//! Device contract used by the blur pipeline
//!
//! A [`Device`] exposes the handful of operations a rasterizing GPU API offers:
//! shader and program objects, textures, framebuffers, vertex buffers and a
//! draw call. Unlike a GL context there is no hidden bind-point state. Every
//! [`DrawCall`] names the program, target, viewport, source texture, vertex
//! attributes and uniform values it uses, so the ordering of a pass sequence
//! is visible in the values passed around and can be recorded by a fake
//! device.

use crate::error::Result;
use crate::texture::Image;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Programmable pipeline stage of a shader object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Per-vertex stage
    Vertex,
    /// Per-fragment stage
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Unique identity of a device instance
///
/// Handles are only meaningful on the device that issued them; pipelines
/// remember this id to refuse being driven through another device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocates a process-wide unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a raw device handle
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the raw device handle
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Handle to a shader stage object
    ShaderId
);
handle!(
    /// Handle to a linked (or linkable) program object
    ProgramId
);
handle!(
    /// Handle to a 2D RGBA8 texture
    TextureId
);
handle!(
    /// Handle to an offscreen framebuffer with one color attachment
    FramebufferId
);
handle!(
    /// Handle to a vertex buffer of `f32` components
    BufferId
);

/// Monotonic handle source shared by the backends
#[derive(Debug, Default)]
pub(crate) struct HandleCounter(u32);

impl HandleCounter {
    /// Returns the next unused raw handle; zero is never issued
    pub(crate) fn next(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }
}

/// Pixel rectangle draws are mapped into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Viewport covering a whole `width` × `height` target
    pub const fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Destination of a draw: an offscreen framebuffer or the visible surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBinding {
    /// `None` selects the device's visible surface
    pub framebuffer: Option<FramebufferId>,
    /// Viewport set together with the target
    pub viewport: Viewport,
}

/// Shape of a uniform value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    /// Number of `f32` components
    pub const fn components(self) -> usize {
        match self {
            UniformKind::Float => 1,
            UniformKind::Vec2 => 2,
            UniformKind::Vec3 => 3,
            UniformKind::Vec4 => 4,
        }
    }
}

/// Resolved location of a uniform inside a program's uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    /// Byte offset inside the uniform block
    pub offset: u32,
    /// Expected value shape
    pub kind: UniformKind,
}

/// Resolved vertex attribute slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLocation {
    /// Shader `@location` index
    pub location: u32,
    /// Number of `f32` components per vertex
    pub components: u32,
}

/// Value written to a uniform for one draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    /// Shape of this value
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
        }
    }

    /// Components in declaration order
    pub fn as_slice(&self) -> &[f32] {
        match self {
            UniformValue::Float(v) => std::slice::from_ref(v),
            UniformValue::Vec2(v) => v,
            UniformValue::Vec3(v) => v,
            UniformValue::Vec4(v) => v,
        }
    }
}

/// Binds one vertex buffer to one attribute location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: AttributeLocation,
    pub buffer: BufferId,
}

/// Everything a single draw depends on
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub target: TargetBinding,
    /// Texture bound to the program's sampling unit
    pub texture: TextureId,
    pub attributes: &'a [VertexAttribute],
    pub uniforms: &'a [(UniformLocation, UniformValue)],
    /// Number of vertices drawn as a triangle list
    pub vertex_count: u32,
}

/// Rasterizing device the blur pipeline renders through
///
/// Textures are RGBA8, sampled with nearest filtering and clamp-to-edge
/// addressing. Shader sources are WGSL. `compile_shader` and `link_program`
/// return the device diagnostic as plain text, like a driver info log; the
/// caller decides how to report it.
pub trait Device {
    /// Identity of this device instance
    fn id(&self) -> DeviceId;

    /// Pixel size of the visible surface
    fn surface_size(&self) -> (u32, u32);

    /// Largest texture width or height the device accepts
    fn max_texture_dimension(&self) -> u32;

    /// Creates an empty shader object for `stage`
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderId>;

    /// Compiles `source` into the shader object
    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> std::result::Result<(), String>;

    /// Releases a shader object; unknown handles are ignored
    fn delete_shader(&mut self, shader: ShaderId);

    /// Creates a program object with both stages attached
    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId>;

    /// Links the attached stages into an executable program
    fn link_program(&mut self, program: ProgramId) -> std::result::Result<(), String>;

    /// Releases a program object; unknown handles are ignored
    fn delete_program(&mut self, program: ProgramId);

    /// Looks up a vertex input of a linked program by name
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation>;

    /// Looks up a uniform of a linked program by name
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Allocates a `width` × `height` texture, uploading `pixels` when given
    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>) -> Result<TextureId>;

    /// Size of a live texture
    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)>;

    /// Releases a texture; unknown handles are ignored
    fn delete_texture(&mut self, texture: TextureId);

    /// Creates a framebuffer rendering into `texture`
    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId>;

    /// Releases a framebuffer; unknown handles are ignored
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Uploads a static vertex buffer
    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferId>;

    /// Releases a vertex buffer; unknown handles are ignored
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Fills the whole target with `color`
    fn clear(&mut self, target: &TargetBinding, color: [f32; 4]) -> Result<()>;

    /// Issues one triangle-list draw
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    /// Reads a texture back in storage order
    fn read_texture(&mut self, texture: TextureId) -> Result<Image>;

    /// Reads the visible surface back in display order (top row first)
    fn read_surface(&mut self) -> Result<Image>;
}
