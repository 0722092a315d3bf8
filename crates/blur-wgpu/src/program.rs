//! Compiled blur program and its cached interface locations

use crate::device::{AttributeLocation, Device, ProgramId, ShaderId, ShaderStage, UniformLocation};
use crate::error::{BlurError, Result};

/// Vertex inputs of the blur program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocations {
    pub position: AttributeLocation,
    pub tex_coord: AttributeLocation,
}

/// Uniforms of the blur program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocations {
    /// Size of the destination in pixels, for the vertex transform
    pub resolution: UniformLocation,
    /// Size the fragment coordinate is normalized by
    pub frag_resolution: UniformLocation,
    pub texture_size: UniformLocation,
    pub direction: UniformLocation,
    pub tap_offsets: UniformLocation,
    pub flip_y: UniformLocation,
    pub tap_weights: UniformLocation,
}

/// A linked vertex + fragment program with its locations resolved once
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    attributes: AttributeLocations,
    uniforms: UniformLocations,
}

impl ShaderProgram {
    /// Compiles and links both stages, then resolves every location
    ///
    /// Whatever step fails, every object created so far is deleted before the
    /// error is returned. Stage objects are deleted after a successful link.
    pub fn compile<D: Device + ?Sized>(device: &mut D, vertex_source: &str, fragment_source: &str) -> Result<Self> {
        let vertex = compile_stage(device, ShaderStage::Vertex, vertex_source)?;
        let fragment = match compile_stage(device, ShaderStage::Fragment, fragment_source) {
            Ok(fragment) => fragment,
            Err(e) => {
                device.delete_shader(vertex);
                return Err(e);
            }
        };

        let linked = link(device, vertex, fragment);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        let id = linked?;

        match resolve_locations(&*device, id) {
            Ok((attributes, uniforms)) => Ok(Self { id, attributes, uniforms }),
            Err(e) => {
                device.delete_program(id);
                Err(e)
            }
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn attributes(&self) -> &AttributeLocations {
        &self.attributes
    }

    pub fn uniforms(&self) -> &UniformLocations {
        &self.uniforms
    }

    /// Releases the program object
    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) {
        device.delete_program(self.id);
    }
}

fn compile_stage<D: Device + ?Sized>(device: &mut D, stage: ShaderStage, source: &str) -> Result<ShaderId> {
    let shader = device.create_shader(stage)?;
    if let Err(log) = device.compile_shader(shader, source) {
        device.delete_shader(shader);
        tracing::warn!(%stage, "shader compilation failed, shader object released");
        return Err(BlurError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

fn link<D: Device + ?Sized>(device: &mut D, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId> {
    let program = device.create_program(vertex, fragment)?;
    if let Err(log) = device.link_program(program) {
        device.delete_program(program);
        tracing::warn!("program link failed, program object released");
        return Err(BlurError::ProgramLink { log });
    }
    Ok(program)
}

fn resolve_locations<D: Device + ?Sized>(device: &D, program: ProgramId) -> Result<(AttributeLocations, UniformLocations)> {
    let attribute = |name: &str| {
        device.attribute_location(program, name).ok_or_else(|| BlurError::ProgramLink {
            log: format!("vertex attribute `{name}` is not an input of the linked program"),
        })
    };
    let uniform = |name: &str| {
        device.uniform_location(program, name).ok_or_else(|| BlurError::ProgramLink {
            log: format!("uniform `{name}` is not declared by the linked program"),
        })
    };

    let attributes = AttributeLocations {
        position: attribute("position")?,
        tex_coord: attribute("tex_coord")?,
    };
    let uniforms = UniformLocations {
        resolution: uniform("resolution")?,
        frag_resolution: uniform("frag_resolution")?,
        texture_size: uniform("texture_size")?,
        direction: uniform("direction")?,
        tap_offsets: uniform("tap_offsets")?,
        flip_y: uniform("flip_y")?,
        tap_weights: uniform("tap_weights")?,
    };
    Ok((attributes, uniforms))
}
