//! Separable Gaussian blur on a rasterizing device
//!
//! This crate renders one source image onto a device's visible surface through
//! a multi-pass blur: a number of directional convolution passes ping-pong
//! between two offscreen targets, alternating horizontal and vertical, and a
//! final composite pass writes the result to the surface.
//!
//! All GPU work goes through the [`Device`] trait. [`backend::WgpuDevice`]
//! runs on real hardware, [`backend::SoftwareDevice`] is a deterministic CPU
//! reference and [`backend::RecordingDevice`] logs every call of the device it
//! wraps.

pub mod backend;
mod config;
mod device;
mod error;
mod geometry;
mod kernel;
mod ping_pong;
mod pipeline;
mod program;
pub mod reflect;
mod render_target;
pub mod shaders;
mod texture;

pub use config::BlurConfig;
pub use device::{
    AttributeLocation, BufferId, Device, DeviceId, DrawCall, FramebufferId, ProgramId, ShaderId, ShaderStage, TargetBinding, TextureId, UniformKind,
    UniformLocation, UniformValue, VertexAttribute, Viewport,
};
pub use error::{BlurError, Result};
pub use geometry::{Geometry, Quad, VERTEX_COUNT, rectangle};
pub use kernel::{BlurKernel, kernel_weight};
pub use ping_pong::PingPongTargetPair;
pub use pipeline::{BlurPipeline, PipelineState};
pub use program::{AttributeLocations, ShaderProgram, UniformLocations};
pub use render_target::{OffscreenTarget, RenderTarget};
pub use texture::{BYTES_PER_PIXEL, Image, Texture};
