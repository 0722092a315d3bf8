use blur_wgpu::backend::{DeviceCall, RecordingDevice, SoftwareDevice};
use blur_wgpu::{BlurConfig, BlurPipeline, Device, Image, UniformValue};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

fn image_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 4]) -> Image {
    let pixels: Vec<u8> = (0..height).flat_map(|y| (0..width).map(move |x| (x, y))).flat_map(|(x, y)| f(x, y)).collect();
    Image::new(width, height, pixels).unwrap()
}

/// Runs a full blur on a software device sized to the image and reads the surface back
fn blur(image: &Image, config: BlurConfig) -> Image {
    let mut device = SoftwareDevice::new(image.width(), image.height());
    BlurPipeline::render(&mut device, image, config).unwrap();
    assert_eq!(device.live_objects(), 0);
    device.read_surface().unwrap()
}

fn channel_sum(image: &Image) -> i64 {
    image.pixels().iter().map(|&c| c as i64).sum()
}

/// Spread of the red channel around its centroid
fn spread(image: &Image) -> f64 {
    let mut mass = 0.0;
    let (mut cx, mut cy) = (0.0, 0.0);
    for y in 0..image.height() {
        for x in 0..image.width() {
            let m = image.pixel(x, y)[0] as f64;
            mass += m;
            cx += m * x as f64;
            cy += m * y as f64;
        }
    }
    let (cx, cy) = (cx / mass, cy / mass);

    let mut variance = 0.0;
    for y in 0..image.height() {
        for x in 0..image.width() {
            let m = image.pixel(x, y)[0] as f64;
            variance += m * ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2));
        }
    }
    variance / mass
}

#[test]
fn red_image_with_green_centre() {
    let input = image_from_fn(4, 4, |x, y| if (1..3).contains(&x) && (1..3).contains(&y) { GREEN } else { RED });
    let output = blur(&input, BlurConfig { iterations: 1, radius: 1.0, sigma: None });

    for (x, y) in [(0, 0), (3, 0), (0, 3), (3, 3)] {
        let [r, g, _, a] = output.pixel(x, y);
        assert!(r > g, "corner ({x}, {y}) is {:?}", output.pixel(x, y));
        assert_eq!(a, 255);
    }
    for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
        let [r, g, _, _] = output.pixel(x, y);
        assert!(g > r, "centre ({x}, {y}) is {:?}", output.pixel(x, y));
    }
    // the centre is no longer pure green
    assert_ne!(output.pixel(1, 1), GREEN);

    let difference = (channel_sum(&output) - channel_sum(&input)).abs();
    assert!(difference <= 16, "channel sums differ by {difference}");
}

#[test]
fn flat_image_stays_flat() {
    let color = [40, 120, 200, 255];
    let input = Image::filled(13, 7, color).unwrap();
    for config in [
        BlurConfig { iterations: 1, radius: 1.0, sigma: None },
        BlurConfig { iterations: 5, radius: 3.5, sigma: None },
        BlurConfig { iterations: 8, radius: 10.0, sigma: None },
        BlurConfig { iterations: 4, radius: 2.0, sigma: Some(1.5) },
    ] {
        assert_eq!(blur(&input, config), input, "{config:?}");
    }
}

#[test]
fn zero_iterations_copies_source() {
    let input = image_from_fn(5, 3, |x, y| [(x * 50) as u8, (y * 80) as u8, 7, 255]);
    let mut device = RecordingDevice::new(SoftwareDevice::new(5, 3));
    let mut pipeline = BlurPipeline::new(&mut device, &input, BlurConfig { iterations: 0, ..Default::default() }).unwrap();
    pipeline.run(&mut device).unwrap();

    let draws: Vec<_> = device.draws().cloned().collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].texture, pipeline.source_texture().id());
    assert_eq!(draws[0].target.framebuffer, None);

    assert_eq!(device.read_surface().unwrap(), input);
    pipeline.discard(&mut device).unwrap();
}

#[test]
fn more_iterations_spread_an_impulse() {
    let input = image_from_fn(33, 33, |x, y| if (14..19).contains(&x) && (14..19).contains(&y) { [255, 255, 255, 255] } else { [0, 0, 0, 255] });

    let spreads: Vec<f64> = [0, 2, 4, 6]
        .into_iter()
        .map(|iterations| spread(&blur(&input, BlurConfig { iterations, radius: 1.0, sigma: None })))
        .collect();
    for pair in spreads.windows(2) {
        assert!(pair[1] > pair[0], "spread did not increase: {spreads:?}");
    }
}

#[test]
fn ping_pong_textures_keep_image_size() {
    let input = Image::filled(7, 5, [9, 9, 9, 255]).unwrap();
    let mut device = SoftwareDevice::new(20, 20);
    let mut pipeline = BlurPipeline::new(&mut device, &input, BlurConfig::default()).unwrap();
    pipeline.run(&mut device).unwrap();

    for i in 0..2 {
        let texture = pipeline.ping_pong().texture_written_by_iteration(i);
        assert_eq!(device.texture_size(texture.id()), Some((7, 5)));
    }
    pipeline.discard(&mut device).unwrap();
}

#[test]
fn composite_stretches_over_larger_surface() {
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const YELLOW: [u8; 4] = [255, 255, 0, 255];
    let input = image_from_fn(2, 2, |x, y| [[RED, GREEN], [BLUE, YELLOW]][y as usize][x as usize]);
    let mut device = SoftwareDevice::new(4, 4);
    BlurPipeline::render(&mut device, &input, BlurConfig { iterations: 0, ..Default::default() }).unwrap();

    let output = device.read_surface().unwrap();
    let expected = image_from_fn(4, 4, |x, y| input.pixel(x / 2, y / 2));
    assert_eq!(output, expected);
}

#[test]
fn composite_covers_non_uniformly_scaled_surface() {
    let input = image_from_fn(3, 2, |x, y| [(x * 100) as u8, (y * 200) as u8, 50, 255]);
    let mut device = SoftwareDevice::new(6, 8);
    BlurPipeline::render(&mut device, &input, BlurConfig { iterations: 0, ..Default::default() }).unwrap();

    let output = device.read_surface().unwrap();
    assert_eq!(output, image_from_fn(6, 8, |x, y| input.pixel(x / 2, y / 4)));
    // no cleared pixels are left anywhere on the surface
    assert!(output.pixels().chunks_exact(4).all(|pixel| pixel[3] == 255));
}

#[test]
fn blurred_result_fills_smaller_surface() {
    let input = Image::filled(8, 8, [70, 140, 210, 255]).unwrap();
    let mut device = SoftwareDevice::new(4, 2);
    BlurPipeline::render(&mut device, &input, BlurConfig::default()).unwrap();
    assert_eq!(device.read_surface().unwrap(), Image::filled(4, 2, [70, 140, 210, 255]).unwrap());
}

#[test]
fn passes_alternate_direction_and_targets() {
    let input = Image::filled(6, 4, [1, 2, 3, 255]).unwrap();
    let mut device = RecordingDevice::new(SoftwareDevice::new(10, 8));
    let config = BlurConfig { iterations: 4, radius: 3.0, sigma: None };
    let mut pipeline = BlurPipeline::new(&mut device, &input, config).unwrap();
    assert_eq!(device.draws().count(), 0, "init must not draw");

    device.clear_calls();
    pipeline.run(&mut device).unwrap();

    let uniforms = *pipeline.program().uniforms();
    let draws: Vec<_> = device.draws().cloned().collect();
    assert_eq!(draws.len(), 5);

    for (i, draw) in draws[..4].iter().enumerate() {
        let i = i as u32;
        let expected = if i % 2 == 0 { [3.0, 0.0] } else { [0.0, 3.0] };
        assert_eq!(draw.uniform(uniforms.direction), Some(UniformValue::Vec2(expected)), "iteration {i}");
        assert_eq!(draw.uniform(uniforms.flip_y), Some(UniformValue::Float(1.0)), "iteration {i}");
        assert_eq!(draw.uniform(uniforms.resolution), Some(UniformValue::Vec2([6.0, 4.0])));
        assert_eq!(draw.target, pipeline.ping_pong().target_for_iteration(i).bind());

        let expected_source = if i == 0 { pipeline.source_texture().id() } else { pipeline.ping_pong().texture_written_by_iteration(i - 1).id() };
        assert_eq!(draw.texture, expected_source, "iteration {i}");
        assert_ne!(draw.texture, pipeline.ping_pong().target_for_iteration(i).texture().id());
    }

    let composite = &draws[4];
    assert_eq!(composite.target.framebuffer, None);
    assert_eq!((composite.target.viewport.width, composite.target.viewport.height), (10, 8));
    assert_eq!(composite.uniform(uniforms.flip_y), Some(UniformValue::Float(-1.0)));
    assert_eq!(composite.uniform(uniforms.direction), Some(UniformValue::Vec2([0.0, 0.0])));
    assert_eq!(composite.uniform(uniforms.resolution), Some(UniformValue::Vec2([10.0, 8.0])));
    assert_eq!(composite.uniform(uniforms.texture_size), Some(UniformValue::Vec2([6.0, 4.0])));
    assert_eq!(composite.texture, pipeline.ping_pong().texture_written_by_iteration(3).id());

    let flips: Vec<_> = draws.iter().filter(|draw| draw.uniform(uniforms.flip_y) == Some(UniformValue::Float(-1.0))).collect();
    assert_eq!(flips.len(), 1);

    // the surface is cleared right before the composite draw
    let calls = device.calls();
    let clear_index = calls.iter().position(|call| matches!(call, DeviceCall::Clear { .. })).unwrap();
    assert!(matches!(&calls[clear_index], DeviceCall::Clear { target, color } if target.framebuffer.is_none() && *color == [0.0; 4]));
    assert!(matches!(&calls[clear_index + 1], DeviceCall::Draw(draw) if draw.target.framebuffer.is_none()));

    pipeline.discard(&mut device).unwrap();
    assert_eq!(device.inner().live_objects(), 0);
}

#[test]
fn kernel_uniforms_follow_config() {
    let input = Image::filled(4, 4, [0, 0, 0, 255]).unwrap();
    let mut device = RecordingDevice::new(SoftwareDevice::new(4, 4));
    let config = BlurConfig { iterations: 1, radius: 1.0, sigma: Some(2.0) };
    let mut pipeline = BlurPipeline::new(&mut device, &input, config).unwrap();
    pipeline.run(&mut device).unwrap();

    let uniforms = *pipeline.program().uniforms();
    let kernel = config.kernel();
    for draw in device.draws() {
        assert_eq!(draw.uniform(uniforms.tap_weights), Some(UniformValue::Vec3(kernel.weights)));
        assert_eq!(draw.uniform(uniforms.tap_offsets), Some(UniformValue::Vec2(kernel.offsets)));
    }
    pipeline.discard(&mut device).unwrap();
}

#[test]
fn release_order_on_discard() {
    let input = Image::filled(2, 2, RED).unwrap();
    let mut device = RecordingDevice::new(SoftwareDevice::new(2, 2));
    let pipeline = BlurPipeline::new(&mut device, &input, BlurConfig::default()).unwrap();
    let created = device
        .calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                DeviceCall::CreateProgram { .. } | DeviceCall::CreateTexture { .. } | DeviceCall::CreateFramebuffer { .. } | DeviceCall::CreateVertexBuffer { .. }
            )
        })
        .count();
    // program, three buffers, source texture, two targets with a framebuffer each
    assert_eq!(created, 9);

    device.clear_calls();
    pipeline.discard(&mut device).unwrap();
    assert_eq!(device.calls().len(), created);
    assert!(device.calls().iter().all(|call| matches!(
        call,
        DeviceCall::DeleteProgram(_) | DeviceCall::DeleteTexture(_) | DeviceCall::DeleteFramebuffer(_) | DeviceCall::DeleteBuffer(_)
    )));
    assert_eq!(device.inner().live_objects(), 0);
}
