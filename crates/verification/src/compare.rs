//! Image comparison utilities for verification
//!
//! Compares the output of a device under test against the software reference.
//! GPUs round and sample slightly differently from the CPU rasterizer, so
//! channels are compared against a tolerance rather than for equality.

use blur_wgpu::Image;

/// Result of comparing two images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// Every channel is within the tolerance
    Match {
        /// Largest channel difference found
        max_difference: u8,
    },
    /// Images have different dimensions
    DimensionMismatch {
        /// Dimensions of the reference output
        reference_dimensions: (u32, u32),
        /// Dimensions of the output under test
        candidate_dimensions: (u32, u32),
    },
    /// Images have matching dimensions but some channel exceeds the tolerance
    PixelMismatch {
        /// Whether red component values match
        r_matched: bool,
        /// Whether green component values match
        g_matched: bool,
        /// Whether blue component values match
        b_matched: bool,
        /// Whether alpha component values match
        a_matched: bool,
        /// Largest channel difference found
        max_difference: u8,
        /// First pixel exceeding the tolerance
        first_mismatch: (u32, u32),
    },
}

impl CompareResult {
    pub fn is_match(&self) -> bool {
        matches!(self, CompareResult::Match { .. })
    }
}

/// Compares two RGBA8 images channel by channel
///
/// # Arguments
/// * `reference` - Image produced by the reference device
/// * `candidate` - Image produced by the device under test
/// * `tolerance` - Largest per-channel difference still counted as a match
pub fn compare_images(reference: &Image, candidate: &Image, tolerance: u8) -> CompareResult {
    let reference_dimensions = (reference.width(), reference.height());
    let candidate_dimensions = (candidate.width(), candidate.height());
    if reference_dimensions != candidate_dimensions {
        return CompareResult::DimensionMismatch {
            reference_dimensions,
            candidate_dimensions,
        };
    }

    let mut matched = [true; 4];
    let mut max_difference = 0u8;
    let mut first_mismatch = None;
    let width = reference.width() as usize;

    for (index, (expected, actual)) in reference.pixels().chunks_exact(4).zip(candidate.pixels().chunks_exact(4)).enumerate() {
        for channel in 0..4 {
            let difference = expected[channel].abs_diff(actual[channel]);
            max_difference = max_difference.max(difference);
            if difference > tolerance {
                matched[channel] = false;
                first_mismatch.get_or_insert(((index % width) as u32, (index / width) as u32));
            }
        }
    }

    match first_mismatch {
        None => CompareResult::Match { max_difference },
        Some(first_mismatch) => CompareResult::PixelMismatch {
            r_matched: matched[0],
            g_matched: matched[1],
            b_matched: matched[2],
            a_matched: matched[3],
            max_difference,
            first_mismatch,
        },
    }
}
