//! [`Device`](crate::Device) implementations

mod gpu;
mod recording;
mod software;

pub use gpu::WgpuDevice;
pub use recording::{DeviceCall, RecordedDraw, RecordingDevice};
pub use software::{DEFAULT_MAX_TEXTURE_DIMENSION, SoftwareDevice};
