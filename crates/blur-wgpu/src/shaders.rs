//! Embedded WGSL sources of the blur program
//!
//! Both stages declare the same `BlurUniforms` block at `@group(0) @binding(0)`.
//! The fragment stage samples `source_texture` at `@binding(1)` through
//! `source_sampler` at `@binding(2)`.

/// Vertex stage: maps the pixel-space quad into clip space
pub const VERTEX_SHADER: &str = include_str!("shaders/blur.vert.wgsl");

/// Fragment stage: one directional 9-tap Gaussian pass
pub const FRAGMENT_SHADER: &str = include_str!("shaders/blur.frag.wgsl");

