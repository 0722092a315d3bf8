//! Two render targets used alternately as read source and write destination

use crate::device::Device;
use crate::error::Result;
use crate::render_target::OffscreenTarget;
use crate::texture::Texture;

/// Pair of equally sized offscreen targets indexed by iteration parity
///
/// Iteration `i` writes target `i % 2` and reads what iteration `i - 1`
/// wrote into the other one, so no pass reads the texture it writes.
#[derive(Debug)]
pub struct PingPongTargetPair {
    targets: [OffscreenTarget; 2],
    width: u32,
    height: u32,
}

impl PingPongTargetPair {
    /// Allocates two empty `width` × `height` targets
    pub fn new<D: Device + ?Sized>(device: &mut D, width: u32, height: u32) -> Result<Self> {
        let first = Self::allocate_target(device, width, height)?;
        let second = match Self::allocate_target(device, width, height) {
            Ok(target) => target,
            Err(e) => {
                first.destroy(device);
                return Err(e);
            }
        };
        Ok(Self {
            targets: [first, second],
            width,
            height,
        })
    }

    fn allocate_target<D: Device + ?Sized>(device: &mut D, width: u32, height: u32) -> Result<OffscreenTarget> {
        let texture = Texture::empty(device, width, height)?;
        OffscreenTarget::from_texture(device, texture)
    }

    /// Target written by iteration `i`
    pub fn target_for_iteration(&self, i: u32) -> &OffscreenTarget {
        &self.targets[(i % 2) as usize]
    }

    /// Texture written by iteration `i`, read by iteration `i + 1`
    pub fn texture_written_by_iteration(&self, i: u32) -> &Texture {
        self.target_for_iteration(i).texture()
    }

    /// Size shared by both targets
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) {
        for target in self.targets {
            target.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareDevice;

    #[test]
    fn alternates_by_parity() {
        let mut device = SoftwareDevice::new(8, 8);
        let pair = PingPongTargetPair::new(&mut device, 3, 2).unwrap();

        let even = pair.texture_written_by_iteration(0).id();
        let odd = pair.texture_written_by_iteration(1).id();
        assert_ne!(even, odd);
        for i in 0..6 {
            let expected = if i % 2 == 0 { even } else { odd };
            assert_eq!(pair.texture_written_by_iteration(i).id(), expected);
            assert_eq!(pair.target_for_iteration(i).texture().id(), expected);
            assert_ne!(pair.target_for_iteration(i + 1).texture().id(), expected);
            assert!(pair.target_for_iteration(i).bind().framebuffer.is_some());
        }
    }

    #[test]
    fn both_targets_have_pair_size() {
        let mut device = SoftwareDevice::new(8, 8);
        let pair = PingPongTargetPair::new(&mut device, 3, 2).unwrap();
        assert_eq!(pair.size(), (3, 2));
        for i in 0..2 {
            assert_eq!(pair.target_for_iteration(i).size(), (3, 2));
        }
        pair.destroy(&mut device);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn second_allocation_failure_releases_first_target() {
        let mut device = SoftwareDevice::new(8, 8).with_texture_budget(1);
        assert!(PingPongTargetPair::new(&mut device, 3, 2).is_err());
        assert_eq!(device.live_objects(), 0);
    }
}
