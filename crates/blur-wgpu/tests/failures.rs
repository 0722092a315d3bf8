use blur_wgpu::backend::{DeviceCall, RecordingDevice, SoftwareDevice};
use blur_wgpu::{BlurConfig, BlurError, BlurPipeline, Device, Image, PipelineState};

fn sample_image() -> Image {
    Image::filled(8, 6, [10, 20, 30, 255]).unwrap()
}

#[test]
fn injected_allocation_failures_leak_nothing() {
    for resource in ["shader", "program", "buffer", "texture", "framebuffer"] {
        let mut device = RecordingDevice::new(SoftwareDevice::new(8, 6));
        device.inner_mut().fail_next_allocation(resource);

        let err = BlurPipeline::new(&mut device, &sample_image(), BlurConfig::default()).unwrap_err();
        assert!(
            matches!(&err, BlurError::ResourceAllocation { resource: failed, .. } if *failed == resource),
            "{resource}: {err}"
        );
        assert_eq!(device.inner().live_objects(), 0, "{resource} failure leaked objects");
        assert!(
            !device.calls().iter().any(|call| matches!(call, DeviceCall::Draw(_) | DeviceCall::Clear { .. })),
            "{resource} failure still drew"
        );
    }
}

#[test]
fn texture_exhaustion_at_every_step_leaks_nothing() {
    // 0: source texture, 1: first ping-pong target, 2: second ping-pong target
    for budget in 0..3 {
        let mut device = SoftwareDevice::new(8, 6).with_texture_budget(budget);
        let err = BlurPipeline::new(&mut device, &sample_image(), BlurConfig::default()).unwrap_err();
        assert!(matches!(err, BlurError::ResourceAllocation { resource: "texture", .. }), "budget {budget}: {err}");
        assert_eq!(device.live_objects(), 0, "budget {budget}");
    }

    let mut device = SoftwareDevice::new(8, 6).with_texture_budget(3);
    let pipeline = BlurPipeline::new(&mut device, &sample_image(), BlurConfig::default()).unwrap();
    pipeline.discard(&mut device).unwrap();
}

#[test]
fn oversized_image_is_an_allocation_error() {
    let mut device = SoftwareDevice::new(8, 8).with_max_texture_dimension(16);
    let image = Image::filled(17, 2, [0, 0, 0, 255]).unwrap();
    let err = BlurPipeline::new(&mut device, &image, BlurConfig::default()).unwrap_err();
    assert!(matches!(err, BlurError::ResourceAllocation { resource: "texture", .. }), "{err}");
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn second_run_is_rejected_without_drawing() {
    let mut device = RecordingDevice::new(SoftwareDevice::new(8, 6));
    let mut pipeline = BlurPipeline::new(&mut device, &sample_image(), BlurConfig { iterations: 2, ..Default::default() }).unwrap();
    pipeline.run(&mut device).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);

    device.clear_calls();
    let err = pipeline.run(&mut device).unwrap_err();
    assert!(matches!(err, BlurError::InvalidState(_)), "{err}");
    assert!(device.calls().is_empty());
    pipeline.discard(&mut device).unwrap();
}

#[test]
fn surface_untouched_when_init_fails() {
    let mut device = SoftwareDevice::new(8, 6);
    device.fail_next_allocation("framebuffer");
    assert!(BlurPipeline::new(&mut device, &sample_image(), BlurConfig::default()).is_err());
    assert!(device.read_surface().unwrap().pixels().iter().all(|&c| c == 0));
}

#[test]
fn handles_from_another_device_are_rejected() {
    let mut first = SoftwareDevice::new(8, 6);
    let mut second = SoftwareDevice::new(8, 6);
    let mut pipeline = BlurPipeline::new(&mut first, &sample_image(), BlurConfig::default()).unwrap();

    assert!(matches!(pipeline.run(&mut second), Err(BlurError::InvalidState(_))));
    assert_eq!(second.live_objects(), 0);

    pipeline.run(&mut first).unwrap();
    pipeline.discard(&mut first).unwrap();
    assert_eq!(first.live_objects(), 0);
}
