//! End-to-end frames rendered by the software device

use gloss_gpu::headless::{CapturedFrame, SoftwareDevice};
use gloss_gpu::{DisplayListBuilder, DrawStatus, Renderer, RendererConfig, SaveFlags};
use gloss_paint::{
    Bitmap, Color, ColorFilter, GradientStop, IRect, Paint, Path, Point, Rect, Region, RegionOp, Shader,
    TransferMode,
};
use tracing_subscriber::EnvFilter;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

/// Renderer warnings show up with `RUST_LOG=gloss_gpu=trace`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn renderer(config: RendererConfig) -> Renderer<SoftwareDevice> {
    init_tracing();
    let mut renderer = Renderer::new(SoftwareDevice::new(64, 64), config);
    renderer.set_viewport(64, 64);
    renderer.prepare(false);
    renderer
}

fn capture(renderer: &Renderer<SoftwareDevice>) -> CapturedFrame {
    CapturedFrame::capture(renderer.device())
}

fn near(actual: u8, expected: u8) -> bool {
    actual.abs_diff(expected) <= 3
}

#[test]
fn framebuffer_layer_composites_with_its_alpha() {
    let mut r = renderer(RendererConfig::default());
    let count = r.save_layer_alpha(10.0, 10.0, 50.0, 50.0, 128, SaveFlags::CLIP_TO_LAYER);
    r.draw_rect(20.0, 20.0, 30.0, 30.0, &Paint::fill(Color::RED));
    r.restore_to_count(count);

    let frame = capture(&r);
    let [red, green, blue, alpha] = frame.pixel(25, 25);
    assert!(near(red, 128), "red {red}");
    assert!(near(alpha, 128), "alpha {alpha}");
    assert_eq!((green, blue), (0, 0));
    assert_eq!(frame.pixel(40, 40), CLEAR);
    assert_eq!(frame.pixel(5, 5), CLEAR);
}

#[test]
fn copy_layer_puts_background_back_underneath() {
    let mut r = renderer(RendererConfig::default());
    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLUE));
    let count = r.save_layer_alpha(0.0, 0.0, 32.0, 32.0, 255, SaveFlags::MATRIX_CLIP);
    r.draw_rect(0.0, 0.0, 16.0, 16.0, &Paint::fill(Color::RED));
    r.restore_to_count(count);

    let frame = capture(&r);
    assert_eq!(frame.pixel(8, 8), RED);
    assert_eq!(frame.pixel(24, 24), BLUE);
    assert_eq!(frame.pixel(48, 48), BLUE);
}

#[test]
fn rotated_clip_goes_through_the_stencil() {
    let mut r = renderer(RendererConfig::default());
    r.save(SaveFlags::MATRIX_CLIP);
    r.translate(32.0, 32.0);
    r.rotate(45.0);
    r.clip_rect(-10.0, -10.0, 10.0, 10.0, RegionOp::Intersect);
    assert!(r.has_complex_clip());
    r.draw_rect(-40.0, -40.0, 40.0, 40.0, &Paint::fill(Color::RED));
    r.restore();

    let frame = capture(&r);
    assert_eq!(frame.pixel(32, 32), RED);
    assert_eq!(frame.pixel(20, 32), RED);
    // Inside the bounds of the rotated clip, outside the clip itself
    assert_eq!(frame.pixel(20, 20), CLEAR);
    assert_eq!(frame.pixel(2, 2), CLEAR);
}

#[test]
fn linear_gradient_spans_the_rect() {
    let mut r = renderer(RendererConfig::default());
    r.set_shader(Some(Shader::linear(
        Point::new(0.0, 0.0),
        Point::new(64.0, 0.0),
        Color::RED,
        Color::BLUE,
    )));
    r.draw_rect(0.0, 0.0, 64.0, 8.0, &Paint::fill(Color::BLACK));

    let frame = capture(&r);
    let left = frame.pixel(1, 4);
    let right = frame.pixel(62, 4);
    assert!(left[0] > 200 && left[2] < 60, "{left:?}");
    assert!(right[2] > 200 && right[0] < 60, "{right:?}");
    assert_eq!(left[3], 255);
}

#[test]
fn color_filter_applies_to_fills() {
    let mut r = renderer(RendererConfig::default());
    #[rustfmt::skip]
    let red_to_green = [
        0.0, 0.0, 0.0, 0.0, 0.0,
        1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ];
    r.set_color_filter(Some(ColorFilter::Matrix(red_to_green)));
    r.draw_rect(0.0, 0.0, 16.0, 16.0, &Paint::fill(Color::RED));
    assert_eq!(capture(&r).pixel(8, 8), [0, 255, 0, 255]);
}

#[test]
fn bitmaps_keep_their_orientation() {
    let mut r = renderer(RendererConfig::default());
    let bitmap = Bitmap::from_fn(4, 4, |_, y| if y < 2 { Color::RED } else { Color::BLUE });
    assert_eq!(r.draw_bitmap(&bitmap, 8.0, 8.0, &Paint::default()), DrawStatus::DREW);

    let frame = capture(&r);
    assert_eq!(frame.pixel(8, 8), RED);
    assert_eq!(frame.pixel(9, 11), BLUE);
    assert_eq!(frame.pixel(7, 7), CLEAR);
}

#[test]
fn hardware_layer_is_rendered_then_drawn() {
    let mut r = renderer(RendererConfig::default());
    let layer = r.create_layer(20, 20, false).expect("layer");
    let list = DisplayListBuilder::new()
        .draw_rect(Rect::new(0.0, 0.0, 20.0, 20.0), Paint::fill(Color::RED))
        .build()
        .into_shared();
    layer.lock().set_deferred_update(list, Rect::EMPTY);
    r.push_layer_update(&layer);

    r.prepare(false);
    assert_eq!(r.draw_layer(&layer, 10.0, 10.0), DrawStatus::DREW);
    r.finish();

    let frame = capture(&r);
    assert_eq!(frame.pixel(20, 20), RED);
    assert_eq!(frame.pixel(5, 5), CLEAR);
    assert_eq!(frame.pixel(40, 40), CLEAR);
}

#[test]
fn config_from_toml_drives_the_renderer() {
    let config = RendererConfig::from_toml_str("[debug]\noverdraw = true\n").expect("config");
    let mut r = renderer(config);
    r.draw_rect(0.0, 0.0, 8.0, 8.0, &Paint::fill(Color::BLACK));
    assert_eq!(r.device().stencil_value(4, 4), 1);
    assert_eq!(r.device().stencil_value(12, 12), 0);
}

#[test]
fn opaque_frame_rasterizes_exact_rect() {
    init_tracing();
    let mut r = Renderer::new(SoftwareDevice::new(100, 100), RendererConfig::default());
    r.set_viewport(100, 100);
    assert_eq!(r.prepare(true), DrawStatus::DONE);
    r.draw_rect(10.0, 10.0, 50.0, 50.0, &Paint::fill(Color::RED));
    r.finish();

    let frame = capture(&r);
    assert_eq!(frame.count(RED), 40 * 40);
    assert_eq!(frame.pixel(10, 10), RED);
    assert_eq!(frame.pixel(49, 49), RED);
    assert_eq!(frame.pixel(50, 50), CLEAR);
    assert_eq!(frame.pixel(9, 30), CLEAR);
}

#[test]
fn opaque_layer_matches_direct_drawing() {
    let scene = |r: &mut Renderer<SoftwareDevice>| {
        r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLUE));
        r.draw_rect(12.0, 20.0, 40.0, 44.0, &Paint::fill(Color::RED));
    };

    let mut direct = renderer(RendererConfig::default());
    scene(&mut direct);

    let mut layered = renderer(RendererConfig::default());
    let count = layered.save_layer_alpha(0.0, 0.0, 64.0, 64.0, 255, SaveFlags::CLIP_TO_LAYER);
    scene(&mut layered);
    layered.restore_to_count(count);

    let (a, b) = (capture(&direct), capture(&layered));
    assert!(a.pixels.iter().zip(&b.pixels).all(|(x, y)| x.abs_diff(*y) <= 1));
}

#[test]
fn half_alpha_layer_blends_over_background() {
    let mut r = renderer(RendererConfig::default());
    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLUE));
    let count = r.save_layer_alpha(0.0, 0.0, 32.0, 32.0, 128, SaveFlags::CLIP_TO_LAYER);
    r.draw_rect(0.0, 0.0, 32.0, 32.0, &Paint::fill(Color::RED));
    r.restore_to_count(count);

    // src * a + dst * (1 - a) with a = 128 / 255
    let [red, green, blue, alpha] = capture(&r).pixel(16, 16);
    assert!(near(red, 128), "red {red}");
    assert!(near(blue, 127), "blue {blue}");
    assert_eq!((green, alpha), (0, 255));
    assert_eq!(capture(&r).pixel(48, 48), BLUE);
}

#[test]
fn clip_is_undone_by_restore() {
    init_tracing();
    let mut r = Renderer::new(SoftwareDevice::new(100, 100), RendererConfig::default());
    r.set_viewport(100, 100);
    r.prepare(false);

    r.save(SaveFlags::MATRIX_CLIP);
    r.clip_rect(0.0, 0.0, 50.0, 100.0, RegionOp::Intersect);
    r.draw_rect(0.0, 0.0, 100.0, 100.0, &Paint::fill(Color::BLUE));
    r.restore();

    let clipped = capture(&r);
    assert_eq!(clipped.count(BLUE), 50 * 100);
    assert_eq!(clipped.pixel(49, 50), BLUE);
    assert_eq!(clipped.pixel(50, 50), CLEAR);

    r.draw_rect(50.0, 0.0, 100.0, 100.0, &Paint::fill(Color::GREEN));
    let frame = capture(&r);
    assert_eq!(frame.pixel(25, 50), BLUE);
    assert_eq!(frame.pixel(75, 50), GREEN);
    assert_eq!(frame.count(GREEN), 50 * 100);
}

#[test]
fn layer_dirty_region_is_union_of_draws() {
    let mut r = renderer(RendererConfig::default());
    let layer = r.create_layer(32, 32, false).expect("layer");
    let list = DisplayListBuilder::new()
        .draw_rect(Rect::new(0.0, 0.0, 5.0, 5.0), Paint::fill(Color::RED))
        .draw_rect(Rect::new(10.0, 10.0, 15.0, 15.0), Paint::fill(Color::RED))
        .build()
        .into_shared();
    layer.lock().set_deferred_update(list, Rect::EMPTY);
    r.push_layer_update(&layer);
    r.prepare(false);

    let layer = layer.lock();
    assert_eq!(layer.region.bounds(), IRect::new(0, 0, 15, 15));
    assert!(!layer.region.is_rect());
}

#[test]
fn translucent_paint_blends_once() {
    let mut r = renderer(RendererConfig::default());
    r.draw_rect(0.0, 0.0, 16.0, 16.0, &Paint::fill(Color::RED.with_alpha(0.5)));

    let [red, green, blue, alpha] = capture(&r).pixel(8, 8);
    assert!(near(red, 128), "red {red}");
    assert!(near(alpha, 128), "alpha {alpha}");
    assert_eq!((green, blue), (0, 0));
}

#[test]
fn copy_layer_fades_with_its_alpha() {
    let mut r = renderer(RendererConfig::default());
    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLUE));
    let count = r.save_layer_alpha(0.0, 0.0, 32.0, 32.0, 128, SaveFlags::MATRIX_CLIP);
    r.draw_rect(0.0, 0.0, 32.0, 32.0, &Paint::fill(Color::RED));
    r.restore_to_count(count);

    let frame = capture(&r);
    let [red, green, blue, alpha] = frame.pixel(16, 16);
    assert!(near(red, 128), "red {red}");
    assert!(near(blue, 127), "blue {blue}");
    assert_eq!((green, alpha), (0, 255));
    assert_eq!(frame.pixel(48, 48), BLUE);
}

#[test]
fn stencil_clip_writes_do_not_dirty_the_layer() {
    let mut r = renderer(RendererConfig::default());
    let layer = r.create_layer(32, 32, false).expect("layer");
    // The stencil covers the whole difference region, the draw only a corner
    let list = DisplayListBuilder::new()
        .clip_rect(Rect::new(10.0, 10.0, 20.0, 20.0), RegionOp::Difference)
        .draw_rect(Rect::new(0.0, 0.0, 4.0, 4.0), Paint::fill(Color::RED))
        .build()
        .into_shared();
    layer.lock().set_deferred_update(list, Rect::EMPTY);
    r.push_layer_update(&layer);
    r.prepare(false);

    assert_eq!(layer.lock().region.bounds(), IRect::new(0, 0, 4, 4));
}

#[test]
fn intersecting_path_and_region_clips_only_shrink() {
    let mut r = renderer(RendererConfig::default());
    r.clip_rect(8.0, 8.0, 40.0, 40.0, RegionOp::Intersect);

    let before = r.clip_rect_target();
    let mut path = Path::new();
    path.add_rect(&Rect::new(0.0, 0.0, 64.0, 20.0));
    assert!(r.clip_path(&path, RegionOp::Intersect));
    let after = r.clip_rect_target();
    assert!(before.contains(&after));
    assert_eq!(after, Rect::new(8.0, 8.0, 40.0, 20.0));

    let region = Region::from_rect(IRect::new(30, 0, 64, 64));
    assert!(r.clip_region(&region, RegionOp::Intersect));
    let last = r.clip_rect_target();
    assert!(after.contains(&last));
    assert_eq!(last, Rect::new(30.0, 8.0, 40.0, 20.0));

    // A disjoint region empties the clip instead of growing it
    let outside = Region::from_rect(IRect::new(50, 50, 60, 60));
    assert!(!r.clip_region(&outside, RegionOp::Intersect));
    assert!(r.clip_rect_target().is_empty());
}

#[test]
fn restore_undoes_alpha_and_region_clip() {
    let mut r = renderer(RendererConfig::default());
    let matrix = r.matrix();
    let clip = r.clip_rect_target();

    let count = r.save(SaveFlags::MATRIX_CLIP);
    r.translate(4.0, 4.0);
    r.scale_alpha(0.5);
    r.clip_region(&Region::from_rect(IRect::new(0, 0, 16, 16)), RegionOp::Difference);
    let mut path = Path::new();
    path.add_rect(&Rect::new(0.0, 0.0, 40.0, 40.0));
    r.clip_path(&path, RegionOp::Intersect);
    assert!(r.has_complex_clip());
    r.restore_to_count(count);

    assert_eq!(r.matrix(), matrix);
    assert_eq!(r.clip_rect_target(), clip);
    assert!(!r.has_complex_clip());

    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::RED));
    let frame = capture(&r);
    assert_eq!(frame.pixel(8, 8), RED);
    assert_eq!(frame.count(RED), 64 * 64);
}

#[test]
fn radial_gradient_runs_from_center_outward() {
    let mut r = renderer(RendererConfig::default());
    r.set_shader(Some(Shader::radial(Point::new(32.0, 32.0), 32.0, Color::RED, Color::BLUE)));
    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLACK));

    let frame = capture(&r);
    let center = frame.pixel(32, 32);
    let corner = frame.pixel(1, 1);
    assert!(center[0] > 200 && center[2] < 60, "{center:?}");
    assert!(corner[2] > 240 && corner[0] < 15, "{corner:?}");
    assert_eq!(center[3], 255);
}

#[test]
fn sweep_gradient_turns_around_its_center() {
    let mut r = renderer(RendererConfig::default());
    let stops = [
        GradientStop::new(0.0, Color::RED),
        GradientStop::new(0.5, Color::BLUE),
        GradientStop::new(1.0, Color::RED),
    ];
    r.set_shader(Some(Shader::sweep(Point::new(32.0, 32.0), &stops)));
    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLACK));

    let frame = capture(&r);
    let right = frame.pixel(60, 32);
    let left = frame.pixel(4, 32);
    assert!(right[0] > 200 && right[2] < 60, "{right:?}");
    assert!(left[2] > 200 && left[0] < 60, "{left:?}");
}

#[test]
fn compose_shader_blends_second_over_first() {
    let mut r = renderer(RendererConfig::default());
    let base = Shader::linear(Point::ZERO, Point::new(64.0, 0.0), Color::GREEN, Color::GREEN);
    let spot = Shader::radial(Point::new(32.0, 32.0), 16.0, Color::RED, Color::TRANSPARENT);
    let shader = Shader::compose(base, spot, TransferMode::SrcOver).expect("compose");
    r.set_shader(Some(shader));
    r.draw_rect(0.0, 0.0, 64.0, 64.0, &Paint::fill(Color::BLACK));

    let frame = capture(&r);
    let center = frame.pixel(32, 32);
    assert!(center[0] > 200 && center[1] < 60, "{center:?}");
    let [red, green, blue, alpha] = frame.pixel(2, 2);
    assert!(near(green, 255) && near(alpha, 255), "{green} {alpha}");
    assert_eq!((red, blue), (0, 0));
}
