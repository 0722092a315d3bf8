//! Multi-pass blur execution
//!
//! A [`BlurPipeline`] owns every device object of one blur: the program, the
//! quad geometry, the uploaded source texture and the ping-pong pair. Running
//! it draws `iterations` directional passes into the ping-pong targets,
//! alternating horizontal and vertical, followed by one composite pass that
//! stretches the result over the whole visible surface.

use crate::config::BlurConfig;
use crate::device::{Device, DeviceId, DrawCall, TargetBinding, UniformLocation, UniformValue};
use crate::error::{BlurError, Result};
use crate::geometry::{Geometry, Quad, VERTEX_COUNT};
use crate::kernel::BlurKernel;
use crate::ping_pong::PingPongTargetPair;
use crate::program::ShaderProgram;
use crate::render_target::RenderTarget;
use crate::shaders::{FRAGMENT_SHADER, VERTEX_SHADER};
use crate::texture::{Image, Texture};

/// Surface color the composite pass clears to
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// Progress of a pipeline; it only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Every object is allocated, nothing has been drawn
    Init,
    /// Drawing convolution passes into the ping-pong targets
    Convolve,
    /// Drawing the final pass onto the visible surface
    Composite,
    /// The visible surface holds the blurred image
    Done,
}

/// Per-pass values of a single draw
#[derive(Debug, Clone, Copy)]
struct Pass {
    quad: Quad,
    direction: [f32; 2],
    flip_y: f32,
}

/// A separable Gaussian blur bound to one device
///
/// The pipeline remembers the device it was created on and rejects being run
/// or discarded through any other. Concurrent pipelines on one device are not
/// supported.
#[derive(Debug)]
pub struct BlurPipeline {
    device_id: DeviceId,
    state: PipelineState,
    config: BlurConfig,
    kernel: BlurKernel,
    image_size: (u32, u32),
    program: ShaderProgram,
    geometry: Geometry,
    source: Texture,
    ping_pong: PingPongTargetPair,
}

impl BlurPipeline {
    /// Compiles the program and allocates every object the run needs
    ///
    /// No draw happens here. If any step fails, the objects created by the
    /// earlier steps are released before the error is returned.
    pub fn new<D: Device + ?Sized>(device: &mut D, image: &Image, config: BlurConfig) -> Result<Self> {
        config.validate()?;
        let (width, height) = (image.width(), image.height());

        let program = ShaderProgram::compile(device, VERTEX_SHADER, FRAGMENT_SHADER)?;

        let surface_size = device.surface_size();
        let geometry = match Geometry::new(device, (width, height), surface_size) {
            Ok(geometry) => geometry,
            Err(e) => {
                tracing::warn!("geometry allocation failed, releasing program");
                program.destroy(device);
                return Err(e);
            }
        };

        let source = match Texture::from_image(device, image) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("source texture allocation failed, releasing program and geometry");
                geometry.destroy(device);
                program.destroy(device);
                return Err(e);
            }
        };

        let ping_pong = match PingPongTargetPair::new(device, width, height) {
            Ok(ping_pong) => ping_pong,
            Err(e) => {
                tracing::warn!("ping-pong allocation failed, releasing program, geometry and source texture");
                source.destroy(device);
                geometry.destroy(device);
                program.destroy(device);
                return Err(e);
            }
        };

        tracing::info!(
            width,
            height,
            iterations = config.iterations,
            radius = config.radius,
            sigma = ?config.sigma,
            "blur pipeline created"
        );

        Ok(Self {
            device_id: device.id(),
            state: PipelineState::Init,
            kernel: config.kernel(),
            config,
            image_size: (width, height),
            program,
            geometry,
            source,
            ping_pong,
        })
    }

    /// Draws every convolution pass followed by the composite pass
    ///
    /// A pipeline runs once; a second call fails with
    /// [`BlurError::InvalidState`].
    pub fn run<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        self.check_device(&*device)?;
        if self.state != PipelineState::Init {
            return Err(BlurError::invalid_state(format!("pipeline cannot run from state {:?}", self.state)));
        }

        self.state = PipelineState::Convolve;
        let radius = self.config.radius;
        for i in 0..self.config.iterations {
            let direction = if i % 2 == 0 { [radius, 0.0] } else { [0.0, radius] };
            let source = if i == 0 { &self.source } else { self.ping_pong.texture_written_by_iteration(i - 1) };
            let target = self.ping_pong.target_for_iteration(i);
            tracing::debug!(iteration = i, ?direction, "convolution pass");
            self.draw(device, target.bind(), source, Pass { quad: Quad::Image, direction, flip_y: 1.0 })?;
        }

        self.state = PipelineState::Composite;
        let source = match self.config.iterations {
            0 => &self.source,
            iterations => self.ping_pong.texture_written_by_iteration(iterations - 1),
        };
        let surface = RenderTarget::visible_surface(&*device).bind();
        device.clear(&surface, CLEAR_COLOR)?;
        tracing::debug!(width = surface.viewport.width, height = surface.viewport.height, "composite pass");
        self.draw(device, surface, source, Pass { quad: Quad::Surface, direction: [0.0, 0.0], flip_y: -1.0 })?;

        self.state = PipelineState::Done;
        tracing::info!(passes = self.config.iterations + 1, "blur pipeline finished");
        Ok(())
    }

    /// Draws one pass into `binding`; the resolution uniforms follow its viewport
    fn draw<D: Device + ?Sized>(&self, device: &mut D, binding: TargetBinding, source: &Texture, pass: Pass) -> Result<()> {
        let resolution = [binding.viewport.width as f32, binding.viewport.height as f32];
        let uniforms = self.program.uniforms();

        let values: [(UniformLocation, UniformValue); 7] = [
            (uniforms.resolution, UniformValue::Vec2(resolution)),
            (uniforms.frag_resolution, UniformValue::Vec2(resolution)),
            (uniforms.texture_size, UniformValue::Vec2([self.image_size.0 as f32, self.image_size.1 as f32])),
            (uniforms.direction, UniformValue::Vec2(pass.direction)),
            (uniforms.tap_offsets, UniformValue::Vec2(self.kernel.offsets)),
            (uniforms.flip_y, UniformValue::Float(pass.flip_y)),
            (uniforms.tap_weights, UniformValue::Vec3(self.kernel.weights)),
        ];
        let locations = self.program.attributes();
        let attributes = self.geometry.attributes(pass.quad, locations.position, locations.tex_coord);

        device.draw(&DrawCall {
            program: self.program.id(),
            target: binding,
            texture: source.id(),
            attributes: &attributes,
            uniforms: &values,
            vertex_count: VERTEX_COUNT,
        })
    }

    /// Releases every object owned by the pipeline
    ///
    /// Handles are only valid on the creating device, so a pipeline discarded
    /// through another device is rejected and releases nothing.
    pub fn discard<D: Device + ?Sized>(self, device: &mut D) -> Result<()> {
        self.check_device(&*device)?;
        self.ping_pong.destroy(device);
        self.source.destroy(device);
        self.geometry.destroy(device);
        self.program.destroy(device);
        tracing::debug!("blur pipeline discarded");
        Ok(())
    }

    /// Creates, runs and discards a pipeline in one call
    pub fn render<D: Device + ?Sized>(device: &mut D, image: &Image, config: BlurConfig) -> Result<()> {
        let mut pipeline = Self::new(device, image, config)?;
        let result = pipeline.run(device);
        pipeline.discard(device)?;
        result
    }

    fn check_device<D: Device + ?Sized>(&self, device: &D) -> Result<()> {
        if device.id() != self.device_id {
            return Err(BlurError::invalid_state("pipeline used with a device other than the one it was created on"));
        }
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &BlurConfig {
        &self.config
    }

    pub fn kernel(&self) -> &BlurKernel {
        &self.kernel
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn source_texture(&self) -> &Texture {
        &self.source
    }

    pub fn ping_pong(&self) -> &PingPongTargetPair {
        &self.ping_pong
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareDevice;

    fn gradient(width: u32, height: u32) -> Image {
        let pixels: Vec<u8> = (0..width * height).flat_map(|i| [(i * 7 % 256) as u8, (i * 13 % 256) as u8, 50, 255]).collect();
        Image::new(width, height, pixels).unwrap()
    }

    #[test]
    fn state_moves_forward_once() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut pipeline = BlurPipeline::new(&mut device, &gradient(4, 4), BlurConfig::default()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Init);

        pipeline.run(&mut device).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);

        let err = pipeline.run(&mut device).unwrap_err();
        assert!(matches!(err, BlurError::InvalidState(_)));
        pipeline.discard(&mut device).unwrap();
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn rejects_foreign_device() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut other = SoftwareDevice::new(4, 4);
        let mut pipeline = BlurPipeline::new(&mut device, &gradient(4, 4), BlurConfig::default()).unwrap();

        assert!(matches!(pipeline.run(&mut other), Err(BlurError::InvalidState(_))));
        assert_eq!(pipeline.state(), PipelineState::Init);
        assert!(matches!(pipeline.discard(&mut other), Err(BlurError::InvalidState(_))));
    }

    #[test]
    fn invalid_config_allocates_nothing() {
        let mut device = SoftwareDevice::new(4, 4);
        let config = BlurConfig { radius: -2.0, ..Default::default() };
        assert!(matches!(BlurPipeline::new(&mut device, &gradient(4, 4), config), Err(BlurError::InvalidConfig(_))));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn sigma_selects_derived_kernel() {
        let mut device = SoftwareDevice::new(4, 4);
        let config = BlurConfig { sigma: Some(2.0), ..Default::default() };
        let pipeline = BlurPipeline::new(&mut device, &gradient(4, 4), config).unwrap();
        assert_eq!(*pipeline.kernel(), BlurKernel::from_sigma(2.0));
        pipeline.discard(&mut device).unwrap();
    }
}
