//! Gaussian blur CLI
//!
//! Decodes an image, blurs it onto a device surface of the same size (or of
//! `--surface-size`) and writes the surface back out.
//!
//! # Usage
//! ```bash
//! blur-cli input.png output.png --iterations 8 --radius 10 --backend wgpu
//! blur-cli input.png output.png --config blur.yaml --backend software
//! ```

use blur_wgpu::{
    BlurConfig, BlurPipeline, Device, Image,
    backend::{SoftwareDevice, WgpuDevice},
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Device the blur runs on
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// GPU through wgpu
    Wgpu,
    /// CPU reference rasterizer
    Software,
}

/// Command-line arguments for the blur tool
#[derive(Parser)]
#[command(version, about = "CLI tool for blurring images with a separable Gaussian")]
struct Args {
    /// Input image file path
    input: PathBuf,

    /// Output image file path
    output: PathBuf,

    /// YAML file with `iterations`, `radius` and `sigma`
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Number of convolution passes (overrides the config file)
    #[arg(long, short)]
    iterations: Option<u32>,

    /// Tap spacing in pixels (overrides the config file)
    #[arg(long, short)]
    radius: Option<f32>,

    /// Derive kernel weights from this standard deviation (overrides the config file)
    #[arg(long, short)]
    sigma: Option<f32>,

    /// Size of the output surface as WIDTHxHEIGHT; defaults to the image size
    #[arg(long, value_parser = parse_size)]
    surface_size: Option<(u32, u32)>,

    #[arg(long, short, value_enum, default_value = "wgpu")]
    backend: Backend,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width.parse().map_err(|e| format!("invalid width: {e}"))?;
    let height = height.parse().map_err(|e| format!("invalid height: {e}"))?;
    Ok((width, height))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BlurConfig::from_yaml_file(path)?,
        None => BlurConfig::default(),
    };
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(radius) = args.radius {
        config.radius = radius;
    }
    if args.sigma.is_some() {
        config.sigma = args.sigma;
    }

    tracing::info!("Loading image from: {}", args.input.display());
    let image = Image::try_from(image::open(&args.input)?.to_rgba8())?;
    let (surface_width, surface_height) = args.surface_size.unwrap_or((image.width(), image.height()));
    tracing::info!(width = image.width(), height = image.height(), ?config, "Input image loaded");

    let output = match args.backend {
        Backend::Wgpu => {
            let mut device = pollster::block_on(WgpuDevice::new(surface_width, surface_height))?;
            blur(&mut device, &image, config)?
        }
        Backend::Software => {
            let mut device = SoftwareDevice::new(surface_width, surface_height);
            blur(&mut device, &image, config)?
        }
    };

    output.to_rgba_image()?.save(&args.output)?;
    tracing::info!("Saved result to: {}", args.output.display());

    Ok(())
}

fn blur<D: Device>(device: &mut D, image: &Image, config: BlurConfig) -> Result<Image, Box<dyn std::error::Error>> {
    BlurPipeline::render(device, image, config)?;
    Ok(device.read_surface()?)
}
