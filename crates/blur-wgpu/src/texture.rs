//! Source images and GPU textures
//!
//! [`Image`] is the decoded input handed over by the caller. [`Texture`] is a
//! fixed-size RGBA8 texture living on a [`Device`], created either from an
//! image or empty as a render target.

use crate::device::{Device, TextureId};
use crate::error::{BlurError, Result};
use bytes::Bytes;

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// An immutable, tightly packed, row-major RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl Image {
    /// Wraps decoded pixels, checking that the buffer matches the dimensions
    pub fn new(width: u32, height: u32, pixels: impl Into<Bytes>) -> Result<Self> {
        let pixels = pixels.into();
        if width == 0 || height == 0 {
            return Err(BlurError::InvalidImage(format!("image must not be empty, got {width}x{height}")));
        }
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(BlurError::InvalidImage(format!(
                "{width}x{height} RGBA8 image needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// Creates an image where every pixel is `rgba`
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let count = width as usize * height as usize;
        Self::new(width, height, rgba.repeat(count))
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at column `x`, row `y`
    ///
    /// # Panics
    /// Panics if `(x, y)` lies outside the image. Use [`Image::pixel_checked`]
    /// for coordinates that may be out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        match self.pixel_checked(x, y) {
            Some(pixel) => pixel,
            None => panic!("pixel ({x}, {y}) is outside the {}x{} image", self.width, self.height),
        }
    }

    /// Pixel at column `x`, row `y`, or `None` outside the image
    pub fn pixel_checked(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels.get(start..start + BYTES_PER_PIXEL)?.try_into().ok()
    }

    /// Converts into an `image` crate buffer for encoding
    pub fn to_rgba_image(&self) -> Result<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec())
            .ok_or_else(|| BlurError::InvalidImage("pixel buffer does not match dimensions".to_string()))
    }
}

impl TryFrom<image::RgbaImage> for Image {
    type Error = BlurError;

    fn try_from(image: image::RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

/// A 2D RGBA8 texture owned by the pipeline
///
/// Sampled with nearest filtering and clamp-to-edge addressing; the blur
/// kernel places every tap explicitly, and the source is a raster image rather
/// than a tileable surface.
#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Uploads the full pixel buffer of `image` once
    pub fn from_image<D: Device + ?Sized>(device: &mut D, image: &Image) -> Result<Self> {
        Self::allocate(device, image.width(), image.height(), Some(image.pixels()))
    }

    /// Allocates a texture whose content is undefined until a pass writes it
    pub fn empty<D: Device + ?Sized>(device: &mut D, width: u32, height: u32) -> Result<Self> {
        Self::allocate(device, width, height, None)
    }

    fn allocate<D: Device + ?Sized>(device: &mut D, width: u32, height: u32, pixels: Option<&[u8]>) -> Result<Self> {
        let limit = device.max_texture_dimension();
        if width == 0 || height == 0 {
            return Err(BlurError::allocation("texture", format!("{width}x{height} has no pixels")));
        }
        if width > limit || height > limit {
            return Err(BlurError::allocation("texture", format!("{width}x{height} exceeds the device limit of {limit}")));
        }
        let id = device.create_texture(width, height, pixels)?;
        Ok(Self { id, width, height })
    }

    /// Device handle, placed into a draw call to bind the texture for sampling
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Releases the device texture
    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) {
        device.delete_texture(self.id);
    }
}
