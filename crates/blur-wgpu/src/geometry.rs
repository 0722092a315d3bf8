//! Quad vertex buffers

use crate::device::{AttributeLocation, BufferId, Device, VertexAttribute};
use crate::error::Result;

/// Vertices of a quad drawn as two triangles
pub const VERTEX_COUNT: u32 = 6;

/// Texture coordinates matching the vertex order of [`rectangle`]
const UNIT_TEX_COORDS: [f32; 12] = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0];

/// Two triangles covering the rectangle at (`x`, `y`) of size `width` × `height`
pub fn rectangle(x: f32, y: f32, width: f32, height: f32) -> [f32; 12] {
    let (x1, x2) = (x, x + width);
    let (y1, y2) = (y, y + height);
    [x1, y1, x2, y1, x1, y2, x1, y2, x2, y1, x2, y2]
}

/// Which position quad a draw uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quad {
    /// Covers the source image, used for every offscreen pass
    Image,
    /// Covers the whole visible surface, used by the composite pass
    Surface,
}

/// Position and texture-coordinate buffers shared by every pass
///
/// Positions are in pixels of the target they are drawn into, so the image
/// quad spans the ping-pong targets and the surface quad spans the visible
/// surface. Both share one set of texture coordinates.
#[derive(Debug)]
pub struct Geometry {
    image_positions: BufferId,
    surface_positions: BufferId,
    tex_coords: BufferId,
}

impl Geometry {
    /// Uploads the image and surface quads
    pub fn new<D: Device + ?Sized>(device: &mut D, image_size: (u32, u32), surface_size: (u32, u32)) -> Result<Self> {
        let image_positions = device.create_vertex_buffer(&quad_of(image_size))?;
        let surface_positions = match device.create_vertex_buffer(&quad_of(surface_size)) {
            Ok(buffer) => buffer,
            Err(e) => {
                device.delete_buffer(image_positions);
                return Err(e);
            }
        };
        let tex_coords = match device.create_vertex_buffer(&UNIT_TEX_COORDS) {
            Ok(buffer) => buffer,
            Err(e) => {
                device.delete_buffer(surface_positions);
                device.delete_buffer(image_positions);
                return Err(e);
            }
        };
        Ok(Self {
            image_positions,
            surface_positions,
            tex_coords,
        })
    }

    /// Binds the buffers of `quad` to the program's attribute slots
    pub fn attributes(&self, quad: Quad, position: AttributeLocation, tex_coord: AttributeLocation) -> [VertexAttribute; 2] {
        let positions = match quad {
            Quad::Image => self.image_positions,
            Quad::Surface => self.surface_positions,
        };
        [
            VertexAttribute { location: position, buffer: positions },
            VertexAttribute { location: tex_coord, buffer: self.tex_coords },
        ]
    }

    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) {
        device.delete_buffer(self.image_positions);
        device.delete_buffer(self.surface_positions);
        device.delete_buffer(self.tex_coords);
    }
}

fn quad_of((width, height): (u32, u32)) -> [f32; 12] {
    rectangle(0.0, 0.0, width as f32, height as f32)
}
