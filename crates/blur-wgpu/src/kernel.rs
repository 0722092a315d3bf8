//! 9-tap Gaussian kernel evaluated with 5 texture reads
//!
//! Each pass reads the centre texel plus two symmetric pairs. The pair
//! positions merge two neighbouring discrete taps into one read placed at
//! their weighted centre, so 5 reads cover a 9-texel footprint.

/// Offsets of the two symmetric tap pairs, in units of the pass direction
const TAP_OFFSETS: [f32; 2] = [1.384_615_4, 3.230_769_2];

/// Tap layout and weights of one directional pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurKernel {
    /// Distances of the first and second tap pair from the centre
    pub offsets: [f32; 2],
    /// Weights of the centre tap, each first-pair tap and each second-pair tap
    pub weights: [f32; 3],
}

impl BlurKernel {
    /// Hand-tuned weights for the fixed tap layout
    pub const STANDARD: Self = Self {
        offsets: TAP_OFFSETS,
        weights: [0.227_027_03, 0.316_216_22, 0.070_270_27],
    };

    /// Derives weights from a discrete Gaussian with standard deviation `sigma`
    ///
    /// Tap positions stay at the standard layout. Each pair weight is the sum
    /// of the two discrete weights it merges, so the result keeps the 5-read
    /// evaluation and sums to one.
    pub fn from_sigma(sigma: f32) -> Self {
        let discrete: [f32; 5] = std::array::from_fn(|k| {
            let x = k as f32;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        });
        // centre counted once, every other tap on both sides
        let total = kernel_weight(&[discrete[0], 2.0 * discrete[1], 2.0 * discrete[2], 2.0 * discrete[3], 2.0 * discrete[4]]);
        let normalized = discrete.map(|weight| weight / total);

        Self {
            offsets: TAP_OFFSETS,
            weights: [normalized[0], normalized[1] + normalized[2], normalized[3] + normalized[4]],
        }
    }

    /// Sum of all nine tap weights; 1 for an energy-preserving kernel
    pub fn sum(&self) -> f32 {
        self.weights[0] + 2.0 * self.weights[1] + 2.0 * self.weights[2]
    }
}

impl Default for BlurKernel {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Normalization factor of a kernel: its sum, or 1 when the sum is not positive
pub fn kernel_weight(kernel: &[f32]) -> f32 {
    let sum: f32 = kernel.iter().sum();
    if sum <= 0.0 { 1.0 } else { sum }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_kernel_is_normalized() {
        assert!((BlurKernel::STANDARD.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sigma_kernels_are_normalized() {
        for sigma in [0.5, 1.0, 1.5, 2.0, 4.0, 10.0] {
            let kernel = BlurKernel::from_sigma(sigma);
            assert!((kernel.sum() - 1.0).abs() < 1e-6, "sigma {sigma}: {}", kernel.sum());
            assert_eq!(kernel.offsets, BlurKernel::STANDARD.offsets);
        }
    }

    #[test]
    fn wider_sigma_moves_weight_outwards() {
        let narrow = BlurKernel::from_sigma(1.0);
        let wide = BlurKernel::from_sigma(3.0);
        assert!(wide.weights[0] < narrow.weights[0]);
        assert!(wide.weights[2] > narrow.weights[2]);
    }

    #[test]
    fn kernel_weight_falls_back_to_one() {
        assert_eq!(kernel_weight(&[1.0, 2.0, 1.0]), 4.0);
        assert_eq!(kernel_weight(&[0.0, 0.0]), 1.0);
        assert_eq!(kernel_weight(&[-1.0, 0.5]), 1.0);
        assert_eq!(kernel_weight(&[]), 1.0);
    }
}
