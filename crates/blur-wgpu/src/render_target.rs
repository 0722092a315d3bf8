//! Draw destinations

use crate::device::{Device, FramebufferId, TargetBinding, Viewport};
use crate::error::Result;
use crate::texture::Texture;

/// A framebuffer rendering into a texture it exclusively owns
#[derive(Debug)]
pub struct OffscreenTarget {
    framebuffer: FramebufferId,
    texture: Texture,
}

impl OffscreenTarget {
    /// Attaches `texture` as the sole color output of a new framebuffer
    ///
    /// On failure the texture is released together with the error.
    pub fn from_texture<D: Device + ?Sized>(device: &mut D, texture: Texture) -> Result<Self> {
        match device.create_framebuffer(texture.id()) {
            Ok(framebuffer) => Ok(Self { framebuffer, texture }),
            Err(e) => {
                texture.destroy(device);
                Err(e)
            }
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    /// Binding for the next draw, with the viewport reset to the full texture
    pub fn bind(&self) -> TargetBinding {
        TargetBinding {
            framebuffer: Some(self.framebuffer),
            viewport: Viewport::full(self.texture.width(), self.texture.height()),
        }
    }

    /// Texture written by draws into this target
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Releases the framebuffer and its texture
    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) {
        device.delete_framebuffer(self.framebuffer);
        self.texture.destroy(device);
    }
}

/// A surface draws can write into
///
/// The visible surface belongs to the device and is never released by a
/// target.
#[derive(Debug)]
pub enum RenderTarget {
    Offscreen(OffscreenTarget),
    VisibleSurface { width: u32, height: u32 },
}

impl RenderTarget {
    /// Offscreen target rendering into `texture`
    pub fn from_texture<D: Device + ?Sized>(device: &mut D, texture: Texture) -> Result<Self> {
        OffscreenTarget::from_texture(device, texture).map(Self::Offscreen)
    }

    /// The device's on-screen surface
    pub fn visible_surface<D: Device + ?Sized>(device: &D) -> Self {
        let (width, height) = device.surface_size();
        Self::VisibleSurface { width, height }
    }

    /// Pixel size of the target
    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::Offscreen(target) => target.size(),
            Self::VisibleSurface { width, height } => (*width, *height),
        }
    }

    /// Binding for the next draw, with the viewport reset to the full target
    pub fn bind(&self) -> TargetBinding {
        match self {
            Self::Offscreen(target) => target.bind(),
            Self::VisibleSurface { width, height } => TargetBinding {
                framebuffer: None,
                viewport: Viewport::full(*width, *height),
            },
        }
    }

    /// Texture written by draws into this target; `None` for the visible surface
    pub fn texture(&self) -> Option<&Texture> {
        match self {
            Self::Offscreen(target) => Some(target.texture()),
            Self::VisibleSurface { .. } => None,
        }
    }

    /// Releases an offscreen target's framebuffer and texture
    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) {
        if let Self::Offscreen(target) = self {
            target.destroy(device);
        }
    }
}
