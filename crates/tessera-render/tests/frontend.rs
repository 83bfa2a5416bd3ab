// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use tessera_render::headless::{Event, HeadlessDevice};
use tessera_render::{
    DeferReason, FrameConfig, FrameStatus, RenderPacket, RenderSize, Renderer, RendererFrontend,
    Vertex3d,
};

const PACKET: RenderPacket = RenderPacket { delta_time: 0.016 };

fn frontend(device: &Arc<HeadlessDevice>, size: RenderSize) -> RendererFrontend<HeadlessDevice> {
    RendererFrontend::initialize(device.clone(), "frontend-test", size, FrameConfig::default())
        .expect("initialize")
}

#[test]
fn unlaid_out_window_falls_back_to_default_size() {
    let device = Arc::new(HeadlessDevice::default());
    let r = frontend(&device, RenderSize::new(0, 0));
    assert_eq!(r.orchestrator().framebuffer_size(), RenderSize::new(800, 600));

    let r = frontend(&device, RenderSize::new(1280, 0));
    assert_eq!(r.orchestrator().framebuffer_size(), RenderSize::new(1280, 600));
}

#[test]
fn initialize_uploads_the_quad() {
    let device = Arc::new(HeadlessDevice::default());
    let r = frontend(&device, RenderSize::new(640, 480));

    assert_eq!(r.geometry().index_count(), 6);
    let indices = device
        .buffer_contents(r.geometry().index_buffer().handle())
        .unwrap();
    let first: &[u32] = bytemuck::cast_slice(&indices[..24]);
    assert_eq!(first, &[0, 1, 2, 0, 3, 1]);
    assert!(device.violations().is_empty());
}

#[test]
fn frame_number_counts_presented_frames_only() {
    let device = Arc::new(HeadlessDevice::default());
    let mut r = frontend(&device, RenderSize::new(640, 480));

    for _ in 0..3 {
        r.draw_frame(&PACKET).unwrap();
    }
    assert_eq!(r.frame_number(), 3);

    r.on_resized(RenderSize::new(320, 240));
    assert_eq!(
        r.render_frame(&PACKET).unwrap(),
        FrameStatus::Deferred(DeferReason::Resized)
    );
    assert_eq!(r.frame_number(), 3);

    r.draw_frame(&PACKET).unwrap();
    assert_eq!(r.frame_number(), 4);
    assert!(device.violations().is_empty());
}

#[test]
fn clear_only_frames_record_no_draws() {
    let device = Arc::new(HeadlessDevice::default());
    let mut r = frontend(&device, RenderSize::new(640, 480));
    device.clear_events();

    r.draw_frame(&PACKET).unwrap();

    let events = device.events();
    assert!(events.iter().any(|e| matches!(e, Event::BeginRenderPass { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::DrawIndexed { .. })));
}

#[test]
fn pipeline_draws_the_uploaded_geometry() {
    let device = Arc::new(HeadlessDevice::default());
    let mut r = frontend(&device, RenderSize::new(640, 480));
    r.set_pipeline(Some(device.create_pipeline()));
    device.clear_events();

    r.draw_frame(&PACKET).unwrap();
    assert!(device
        .events()
        .contains(&Event::DrawIndexed { index_count: 6 }));

    let triangle = [
        Vertex3d::default(),
        Vertex3d {
            position: glam::Vec3::X,
        },
        Vertex3d {
            position: glam::Vec3::Y,
        },
    ];
    let indices: Vec<u32> = (0..3000).map(|i| i % 3).collect();
    r.upload_geometry(&triangle, &indices).unwrap();
    assert!(r.geometry().index_buffer().total_size() >= 3000 * 4);

    device.clear_events();
    r.draw_frame(&PACKET).unwrap();
    assert!(device
        .events()
        .contains(&Event::DrawIndexed { index_count: 3000 }));
    assert!(device.violations().is_empty());
}

#[test]
fn clear_color_reaches_the_render_pass() {
    let device = Arc::new(HeadlessDevice::default());
    let mut r = frontend(&device, RenderSize::new(640, 480));
    r.set_clear_color([1.0, 0.0, 0.5, 1.0]);
    device.clear_events();

    r.draw_frame(&PACKET).unwrap();

    let clear = device.events().into_iter().find_map(|e| match e {
        Event::BeginRenderPass { clear, .. } => Some(clear),
        _ => None,
    });
    assert_eq!(clear.map(|c| c.color), Some([1.0, 0.0, 0.5, 1.0]));
}

#[test]
fn vsync_toggle_recreates_with_new_present_mode() {
    let device = Arc::new(HeadlessDevice::default());
    let mut r = frontend(&device, RenderSize::new(640, 480));
    r.draw_frame(&PACKET).unwrap();

    r.set_vsync(false);
    assert_eq!(
        r.render_frame(&PACKET).unwrap(),
        FrameStatus::Deferred(DeferReason::Resized)
    );
    assert_eq!(
        r.orchestrator().swapchain().present_mode(),
        tessera_render::PresentMode::Immediate
    );
    r.draw_frame(&PACKET).unwrap();
    assert!(device.violations().is_empty());
}

#[test]
fn device_loss_surfaces_as_error() {
    let device = Arc::new(HeadlessDevice::default());
    let mut r = frontend(&device, RenderSize::new(640, 480));
    device.faults().lose_device();

    let err = r.draw_frame(&PACKET).unwrap_err();
    assert!(err.to_string().contains("frame 0"));
    r.shutdown();
}
