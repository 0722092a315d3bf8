//! Runs one blur configuration on a device and times it

use blur_wgpu::backend::{SoftwareDevice, WgpuDevice};
use blur_wgpu::{BlurConfig, BlurError, BlurPipeline, Device, Image};
use std::time::{Duration, Instant};

/// Errors raised while producing verification outputs
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error(transparent)]
    Blur(#[from] BlurError),
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
}

/// A device paired with a name for reports
pub struct BlurEngine<D> {
    name: &'static str,
    device: D,
}

impl BlurEngine<SoftwareDevice> {
    /// CPU reference engine with a `width` × `height` surface
    pub fn software(width: u32, height: u32) -> Self {
        Self {
            name: "software",
            device: SoftwareDevice::new(width, height),
        }
    }
}

impl BlurEngine<WgpuDevice> {
    /// GPU engine with a `width` × `height` surface
    pub async fn wgpu(width: u32, height: u32) -> Result<Self, VerificationError> {
        Ok(Self {
            name: "wgpu",
            device: WgpuDevice::new(width, height).await?,
        })
    }
}

impl<D: Device> BlurEngine<D> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Blurs `image` onto the surface and reads it back
    ///
    /// # Returns
    /// The surface contents and the time spent creating, running and
    /// discarding the pipeline
    pub fn process(&mut self, image: &Image, config: BlurConfig) -> Result<(Image, Duration), VerificationError> {
        let timepoint = Instant::now();
        BlurPipeline::render(&mut self.device, image, config)?;
        let duration = timepoint.elapsed();
        Ok((self.device.read_surface()?, duration))
    }
}

/// Loads an image file as RGBA8
pub fn load_image(path: &str) -> Result<Image, VerificationError> {
    Ok(Image::try_from(image::open(path)?.to_rgba8())?)
}
