//! Blur verification binary
//!
//! Blurs an input image with a set of configurations on the software
//! reference device and on the wgpu device, and compares the results.

use blur_wgpu::BlurConfig;
use blur_wgpu_verification::{
    compare::{CompareResult, compare_images},
    engine::{BlurEngine, load_image},
};

/// Largest per-channel difference accepted between the two devices
const TOLERANCE: u8 = 2;

/// Configurations exercised by the verification run
fn get_configs() -> Vec<BlurConfig> {
    vec![
        BlurConfig { iterations: 0, ..Default::default() },
        BlurConfig { iterations: 1, radius: 1.0, sigma: None },
        BlurConfig { iterations: 2, radius: 4.0, sigma: None },
        BlurConfig::default(),
        BlurConfig { iterations: 8, radius: 10.0, sigma: Some(2.0) },
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <input_image>", args[0]);
        return Ok(());
    }

    let input_image = load_image(&args[1]).map_err(|e| format!("Failed to open input image: {e}"))?;
    let (width, height) = (input_image.width(), input_image.height());

    let mut reference = BlurEngine::software(width, height);
    let mut candidate = BlurEngine::wgpu(width, height).await?;

    let mut failures = 0;
    for config in get_configs() {
        let (reference_output, reference_duration) = match reference.process(&input_image, config) {
            Ok(output) => output,
            Err(e) => {
                eprintln!("✗ Error running {} for {config:?}: {e}", reference.name());
                failures += 1;
                continue;
            }
        };
        let (candidate_output, candidate_duration) = match candidate.process(&input_image, config) {
            Ok(output) => output,
            Err(e) => {
                eprintln!("✗ Error running {} for {config:?}: {e}", candidate.name());
                failures += 1;
                continue;
            }
        };

        match compare_images(&reference_output, &candidate_output, TOLERANCE) {
            CompareResult::Match { max_difference } => {
                println!("✓ Outputs match for {config:?} (max difference {max_difference}, software: {reference_duration:.2?}, wgpu: {candidate_duration:.2?})");
            }
            CompareResult::DimensionMismatch {
                reference_dimensions,
                candidate_dimensions,
            } => {
                failures += 1;
                eprintln!("✗ Dimension mismatch for {config:?}: software {reference_dimensions:?}, wgpu {candidate_dimensions:?}");
            }
            CompareResult::PixelMismatch {
                r_matched,
                g_matched,
                b_matched,
                a_matched,
                max_difference,
                first_mismatch,
            } => {
                failures += 1;
                eprintln!(
                    "✗ Pixel mismatch for {config:?}: R {r_matched}, G {g_matched}, B {b_matched}, A {a_matched}, max difference {max_difference}, first at {first_mismatch:?}"
                );
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} configuration(s) failed verification").into());
    }
    Ok(())
}
