//! WGSL interface reflection
//!
//! Both backends compile shader stages through naga so that compile errors,
//! link errors and attribute/uniform lookups behave the same everywhere. A
//! stage is parsed and validated into a [`StageInterface`]; two stages are
//! linked into a [`ProgramInterface`] which answers name lookups and encodes
//! uniform values into the byte layout of the program's uniform block.

use crate::device::{AttributeLocation, ShaderStage, UniformKind, UniformLocation, UniformValue};
use naga::{AddressSpace, Binding, Handle, Module, ScalarKind, Type, TypeInner, VectorSize};

/// A named `@location` input or output of an entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceVariable {
    pub name: String,
    pub location: AttributeLocation,
}

/// A member of a uniform block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub location: UniformLocation,
}

/// A `var<uniform>` struct bound at `@group(group) @binding(binding)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    /// Size of the block in bytes
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformBlock {
    /// Encodes uniform values into a buffer of the block's layout
    ///
    /// Members that are not assigned stay zero.
    pub fn encode(&self, values: &[(UniformLocation, UniformValue)]) -> Result<Vec<u8>, String> {
        let mut bytes = vec![0u8; self.size as usize];
        for (location, value) in values {
            if !self.members.iter().any(|member| member.location == *location) {
                return Err(format!("no uniform at offset {} of kind {:?}", location.offset, location.kind));
            }
            if value.kind() != location.kind {
                return Err(format!("uniform at offset {} expects {:?}, got {:?}", location.offset, location.kind, value.kind()));
            }
            let start = location.offset as usize;
            let data: &[u8] = bytemuck::cast_slice(value.as_slice());
            bytes[start..start + data.len()].copy_from_slice(data);
        }
        Ok(bytes)
    }

    /// Reads a member back out of an encoded buffer
    pub fn decode(&self, bytes: &[u8], name: &str) -> Option<Vec<f32>> {
        let member = self.members.iter().find(|member| member.name == name)?;
        let start = member.location.offset as usize;
        let end = start + member.location.kind.components() * std::mem::size_of::<f32>();
        let data = bytes.get(start..end)?;
        Some(data.chunks_exact(4).map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])).collect())
    }
}

/// Reflected interface of one compiled stage
#[derive(Debug, Clone)]
pub struct StageInterface {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub inputs: Vec<InterfaceVariable>,
    pub outputs: Vec<InterfaceVariable>,
    pub uniform_blocks: Vec<UniformBlock>,
}

/// Parses, validates and reflects one WGSL stage
///
/// The error string is the formatted naga diagnostic, the equivalent of a
/// driver's shader info log.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<StageInterface, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default());
    validator.validate(&module).map_err(|e| e.emit_to_string(source))?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry_point = module
        .entry_points
        .iter()
        .find(|entry_point| entry_point.stage == naga_stage)
        .ok_or_else(|| format!("no @{stage} entry point"))?;

    let mut inputs = Vec::new();
    for argument in &entry_point.function.arguments {
        collect_locations(&module, argument.name.as_deref(), argument.ty, argument.binding.as_ref(), &mut inputs);
    }

    let mut outputs = Vec::new();
    if let Some(result) = &entry_point.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    Ok(StageInterface {
        stage,
        entry_point: entry_point.name.clone(),
        inputs,
        outputs,
        uniform_blocks: uniform_blocks(&module)?,
    })
}

/// Collects `@location` bindings, descending into struct members
fn collect_locations(module: &Module, name: Option<&str>, ty: Handle<Type>, binding: Option<&Binding>, out: &mut Vec<InterfaceVariable>) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(InterfaceVariable {
            name: name.unwrap_or_default().to_string(),
            location: AttributeLocation {
                location: *location,
                components: components_of(&module.types[ty].inner),
            },
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.name.as_deref(), member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn components_of(inner: &TypeInner) -> u32 {
    match inner {
        TypeInner::Scalar(_) => 1,
        TypeInner::Vector { size, .. } => *size as u32,
        _ => 0,
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Scalar(scalar) if scalar.kind == ScalarKind::Float => Some(UniformKind::Float),
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => Some(match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        }),
        _ => None,
    }
}

fn uniform_blocks(module: &Module) -> Result<Vec<UniformBlock>, String> {
    let mut blocks = Vec::new();
    for (_, variable) in module.global_variables.iter() {
        if variable.space != AddressSpace::Uniform {
            continue;
        }
        let Some(binding) = &variable.binding else {
            continue;
        };
        let variable_name = variable.name.as_deref().unwrap_or("<unnamed>");
        let TypeInner::Struct { members, span } = &module.types[variable.ty].inner else {
            return Err(format!("uniform `{variable_name}` must be a struct"));
        };

        let mut block_members = Vec::with_capacity(members.len());
        for member in members {
            let member_name = member.name.clone().unwrap_or_default();
            let kind = uniform_kind(&module.types[member.ty].inner)
                .ok_or_else(|| format!("uniform member `{variable_name}.{member_name}` must be an f32 scalar or vector"))?;
            block_members.push(UniformMember {
                name: member_name,
                location: UniformLocation { offset: member.offset, kind },
            });
        }

        blocks.push(UniformBlock {
            group: binding.group,
            binding: binding.binding,
            size: *span,
            members: block_members,
        });
    }
    Ok(blocks)
}

/// Reflected interface of a linked vertex + fragment program
#[derive(Debug, Clone)]
pub struct ProgramInterface {
    pub vertex_entry_point: String,
    pub fragment_entry_point: String,
    /// Vertex stage inputs
    pub attributes: Vec<InterfaceVariable>,
    pub uniform_block: Option<UniformBlock>,
}

impl ProgramInterface {
    /// Looks up a vertex input by name
    pub fn attribute(&self, name: &str) -> Option<AttributeLocation> {
        self.attributes.iter().find(|attribute| attribute.name == name).map(|attribute| attribute.location)
    }

    /// Looks up a uniform block member by name
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_block.as_ref()?.members.iter().find(|member| member.name == name).map(|member| member.location)
    }

    /// Encodes a draw's uniform values; programs without a block accept none
    pub fn encode_uniforms(&self, values: &[(UniformLocation, UniformValue)]) -> Result<Vec<u8>, String> {
        match &self.uniform_block {
            Some(block) => block.encode(values),
            None if values.is_empty() => Ok(Vec::new()),
            None => Err("program declares no uniforms".to_string()),
        }
    }
}

/// Links two reflected stages
///
/// Every fragment input must be written by the vertex stage with the same
/// component count, and a uniform block shared by both stages must have the
/// same layout in each. A program may declare at most one uniform block.
pub fn link(vertex: &StageInterface, fragment: &StageInterface) -> Result<ProgramInterface, String> {
    if vertex.stage != ShaderStage::Vertex {
        return Err(format!("expected a vertex shader in the vertex slot, found a {} shader", vertex.stage));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(format!("expected a fragment shader in the fragment slot, found a {} shader", fragment.stage));
    }

    for input in &fragment.inputs {
        let output = vertex
            .outputs
            .iter()
            .find(|output| output.location.location == input.location.location)
            .ok_or_else(|| format!("fragment input `{}` at location {} is not written by the vertex stage", input.name, input.location.location))?;
        if output.location.components != input.location.components {
            return Err(format!(
                "location {} has {} components in the vertex stage but {} in the fragment stage",
                input.location.location, output.location.components, input.location.components
            ));
        }
    }

    let mut blocks: Vec<UniformBlock> = vertex.uniform_blocks.clone();
    for block in &fragment.uniform_blocks {
        match blocks.iter().find(|existing| existing.group == block.group && existing.binding == block.binding) {
            Some(existing) if existing != block => {
                return Err(format!("uniform block at group {} binding {} differs between stages", block.group, block.binding));
            }
            Some(_) => {}
            None => blocks.push(block.clone()),
        }
    }
    if blocks.len() > 1 {
        return Err(format!("program declares {} uniform blocks, at most one is supported", blocks.len()));
    }

    Ok(ProgramInterface {
        vertex_entry_point: vertex.entry_point.clone(),
        fragment_entry_point: fragment.entry_point.clone(),
        attributes: vertex.inputs.clone(),
        uniform_block: blocks.pop(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{FRAGMENT_SHADER, VERTEX_SHADER};

    fn blur_program() -> ProgramInterface {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
        let fragment = compile_stage(ShaderStage::Fragment, FRAGMENT_SHADER).unwrap();
        link(&vertex, &fragment).unwrap()
    }

    #[test]
    fn reflects_blur_attributes() {
        let program = blur_program();
        assert_eq!(program.vertex_entry_point, "vs_main");
        assert_eq!(program.fragment_entry_point, "fs_main");
        assert_eq!(program.attribute("position"), Some(AttributeLocation { location: 0, components: 2 }));
        assert_eq!(program.attribute("tex_coord"), Some(AttributeLocation { location: 1, components: 2 }));
        assert_eq!(program.attribute("color"), None);
    }

    #[test]
    fn reflects_blur_uniform_layout() {
        let program = blur_program();
        let block = program.uniform_block.as_ref().unwrap();
        assert_eq!((block.group, block.binding), (0, 0));
        assert_eq!(block.size, 64);

        let offset = |name| program.uniform(name).unwrap().offset;
        assert_eq!(offset("resolution"), 0);
        assert_eq!(offset("frag_resolution"), 8);
        assert_eq!(offset("texture_size"), 16);
        assert_eq!(offset("direction"), 24);
        assert_eq!(offset("tap_offsets"), 32);
        assert_eq!(offset("flip_y"), 40);
        assert_eq!(offset("tap_weights"), 48);
        assert_eq!(program.uniform("flip_y").unwrap().kind, UniformKind::Float);
        assert_eq!(program.uniform("tap_weights").unwrap().kind, UniformKind::Vec3);
    }

    #[test]
    fn compile_error_carries_diagnostic() {
        let err = compile_stage(ShaderStage::Vertex, "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return undefined_name; }").unwrap_err();
        assert!(err.contains("undefined_name"), "{err}");
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = compile_stage(ShaderStage::Fragment, VERTEX_SHADER).unwrap_err();
        assert!(err.contains("@fragment"), "{err}");
    }

    #[test]
    fn link_rejects_unwritten_fragment_input() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
        let fragment = compile_stage(
            ShaderStage::Fragment,
            "@fragment fn fs_main(@location(3) shade: vec4<f32>) -> @location(0) vec4<f32> { return shade; }",
        )
        .unwrap();
        let err = link(&vertex, &fragment).unwrap_err();
        assert!(err.contains("location 3"), "{err}");
    }

    #[test]
    fn link_rejects_mismatched_uniform_blocks() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
        let fragment = compile_stage(
            ShaderStage::Fragment,
            "struct Other { tint: vec4<f32> }\n\
             @group(0) @binding(0) var<uniform> u: Other;\n\
             @fragment fn fs_main() -> @location(0) vec4<f32> { return u.tint; }",
        )
        .unwrap();
        let err = link(&vertex, &fragment).unwrap_err();
        assert!(err.contains("differs between stages"), "{err}");
    }

    #[test]
    fn encode_places_values_at_member_offsets() {
        let program = blur_program();
        let direction = program.uniform("direction").unwrap();
        let flip_y = program.uniform("flip_y").unwrap();
        let bytes = program
            .encode_uniforms(&[(direction, UniformValue::Vec2([10.0, 0.0])), (flip_y, UniformValue::Float(-1.0))])
            .unwrap();
        let block = program.uniform_block.as_ref().unwrap();
        assert_eq!(block.decode(&bytes, "direction"), Some(vec![10.0, 0.0]));
        assert_eq!(block.decode(&bytes, "flip_y"), Some(vec![-1.0]));
        assert_eq!(block.decode(&bytes, "resolution"), Some(vec![0.0, 0.0]));
    }

    #[test]
    fn encode_rejects_wrong_kind() {
        let program = blur_program();
        let flip_y = program.uniform("flip_y").unwrap();
        assert!(program.encode_uniforms(&[(flip_y, UniformValue::Vec2([1.0, 1.0]))]).is_err());
    }
}
