// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use tessera_render::headless::{Event, HeadlessConfig, HeadlessDevice};
use tessera_render::{
    DeferReason, FrameConfig, FrameOrchestrator, FrameState, FrameStatus, RenderError, RenderSize,
    Viewport,
};

const DT: f32 = 1.0 / 60.0;

fn device_with_images(min: u32, max: u32) -> Arc<HeadlessDevice> {
    Arc::new(HeadlessDevice::new(HeadlessConfig {
        min_image_count: min,
        max_image_count: max,
        ..HeadlessConfig::default()
    }))
}

fn orchestrator(device: &Arc<HeadlessDevice>) -> FrameOrchestrator<HeadlessDevice> {
    FrameOrchestrator::new(device.clone(), RenderSize::new(800, 600), FrameConfig::default())
        .expect("orchestrator")
}

/// One begin/end pair. Returns the status of begin.
fn frame(o: &mut FrameOrchestrator<HeadlessDevice>) -> FrameStatus {
    let status = o.begin_frame(DT).expect("begin_frame");
    if status.is_ready() {
        o.end_frame(DT).expect("end_frame");
    }
    status
}

fn count(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

fn assert_clean(device: &HeadlessDevice) {
    let v = device.violations();
    assert!(v.is_empty(), "validation: {v:#?}");
}

#[test]
fn four_image_surface_gives_three_frames_in_flight() {
    let device = device_with_images(3, 4);
    let o = orchestrator(&device);

    assert_eq!(o.image_count(), 4);
    assert_eq!(o.max_frames_in_flight(), 3);
    assert_eq!(o.slots().len(), 3);
    assert!(o.slots().iter().all(|s| s.in_flight.is_signaled()));
    assert_eq!(o.command_units().len(), 4);
    assert_eq!(o.current_frame(), 0);
    assert_eq!(o.state(), FrameState::Idle);
}

#[test]
fn ten_frames_cycle_the_slot_ring() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    let mut seen = Vec::new();
    for _ in 0..10 {
        seen.push(o.current_frame());
        assert_eq!(frame(&mut o), FrameStatus::Ready);
    }
    assert_eq!(seen, [0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(o.current_frame(), 1);
    assert_eq!(o.recreation_count(), 0);

    let events = device.events();
    assert_eq!(count(&events, |e| matches!(e, Event::Submit { .. })), 10);
    assert_eq!(count(&events, |e| matches!(e, Event::Present { .. })), 10);
    assert_clean(&device);
}

#[test]
fn round_robin_holds_over_many_frames() {
    let device = device_with_images(2, 3);
    let mut o = orchestrator(&device);
    let n = o.max_frames_in_flight();
    assert_eq!(n, 2);

    for i in 0..(3 * n * 4) {
        assert_eq!(o.current_frame(), i % n);
        assert!(frame(&mut o).is_ready());
    }
    assert_clean(&device);
}

#[test]
fn submission_uses_the_slot_semaphores() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    for _ in 0..6 {
        let slot = o.current_frame();
        let image_available = o.slots()[slot].image_available.handle();
        let queue_complete = o.slots()[slot].queue_complete.handle();
        let fence = o.slots()[slot].in_flight.handle();
        device.clear_events();

        assert!(frame(&mut o).is_ready());

        let events = device.events();
        let acquired = events.iter().find_map(|e| match e {
            Event::Acquire { image: Some(i), signal } => Some((*i, *signal)),
            _ => None,
        });
        let (image, signal) = acquired.expect("acquire");
        assert_eq!(signal, image_available);
        assert!(events.contains(&Event::Submit {
            cb: o.command_units()[image as usize].handle(),
            wait: Some(image_available),
            signal: Some(queue_complete),
            fence: Some(fence),
        }));
        assert!(events.contains(&Event::Present {
            image,
            wait: queue_complete,
        }));
        assert_eq!(o.images_in_flight()[image as usize], Some(slot));
    }
    assert_clean(&device);
}

#[test]
fn resize_between_frames_recreates_once() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    for _ in 0..4 {
        assert!(frame(&mut o).is_ready());
    }

    let new_size = RenderSize::new(1024, 768);
    o.on_resized(new_size);
    device.clear_events();

    // frame 5
    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::Resized));
    assert_eq!(o.recreation_count(), 1);
    let events = device.events();
    assert_eq!(count(&events, |e| matches!(e, Event::Acquire { .. })), 0);
    assert_eq!(count(&events, |e| matches!(e, Event::Submit { .. })), 0);
    assert_eq!(
        count(&events, |e| matches!(
            e,
            Event::SwapchainCreated { extent, old: Some(_), .. } if *extent == new_size
        )),
        1
    );
    assert!(events.contains(&Event::WaitIdle));

    // frame 6
    device.clear_events();
    assert_eq!(frame(&mut o), FrameStatus::Ready);
    assert_eq!(o.framebuffer_size(), new_size);
    assert_eq!(o.recreation_count(), 1);
    let viewport = device.events().into_iter().find_map(|e| match e {
        Event::SetViewport(v) => Some(v),
        _ => None,
    });
    assert_eq!(viewport, Some(Viewport::top_left(new_size)));
    assert_eq!(viewport.map(|v| v.height), Some(-768.0));
    assert_clean(&device);
}

#[test]
fn several_resizes_collapse_into_one_recreation() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    o.on_resized(RenderSize::new(900, 700));
    o.on_resized(RenderSize::new(1000, 700));
    o.on_resized(RenderSize::new(1100, 700));

    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::Resized));
    assert_eq!(frame(&mut o), FrameStatus::Ready);
    assert_eq!(o.recreation_count(), 1);
    assert_eq!(o.framebuffer_size(), RenderSize::new(1100, 700));
}

#[test]
fn out_of_date_acquire_recreates_without_submitting() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    for _ in 0..6 {
        assert!(frame(&mut o).is_ready());
    }
    let slot_before = o.current_frame();

    device.faults().acquire_out_of_date(1);
    device.clear_events();

    // frame 7
    assert_eq!(
        frame(&mut o),
        FrameStatus::Deferred(DeferReason::SwapchainOutOfDate)
    );
    let events = device.events();
    assert_eq!(count(&events, |e| matches!(e, Event::Submit { .. })), 0);
    assert_eq!(count(&events, |e| matches!(e, Event::Present { .. })), 0);
    assert_eq!(
        count(&events, |e| matches!(e, Event::SwapchainCreated { .. })),
        1
    );
    assert_eq!(o.recreation_count(), 1);
    assert_eq!(o.current_frame(), slot_before);

    assert!(frame(&mut o).is_ready());
    assert_clean(&device);
}

#[test]
fn zero_width_defers_without_touching_the_swapchain() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    assert!(frame(&mut o).is_ready());

    o.on_resized(RenderSize::new(0, 600));
    device.clear_events();
    for _ in 0..3 {
        assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::Minimized));
    }
    let events = device.events();
    assert!(
        events.iter().all(|e| !matches!(
            e,
            Event::Acquire { .. }
                | Event::BeginCommandBuffer { .. }
                | Event::SwapchainCreated { .. }
                | Event::Submit { .. }
        )),
        "{events:?}"
    );
    assert_eq!(o.recreation_count(), 0);

    o.on_resized(RenderSize::new(640, 480));
    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::Resized));
    assert_eq!(frame(&mut o), FrameStatus::Ready);
    assert_eq!(o.framebuffer_size(), RenderSize::new(640, 480));
    assert_eq!(o.recreation_count(), 1);
    assert_clean(&device);
}

#[test]
fn recreate_with_same_size_is_stable() {
    let device = device_with_images(2, 3);
    let mut o = orchestrator(&device);
    let size = RenderSize::new(1280, 720);

    assert!(o.recreate(size).unwrap());
    let first = (o.image_count(), o.framebuffer_size(), o.max_frames_in_flight());
    assert!(o.recreate(size).unwrap());
    let second = (o.image_count(), o.framebuffer_size(), o.max_frames_in_flight());

    assert_eq!(first, second);
    assert_eq!(first.1, size);
    assert_eq!(o.recreation_count(), 2);
    assert!(o.images_in_flight().iter().all(Option::is_none));

    assert!(!o.recreate(RenderSize::new(0, 720)).unwrap());
    assert_eq!(o.recreation_count(), 2);
    assert!(frame(&mut o).is_ready());
    assert_clean(&device);
}

#[test]
fn suboptimal_present_recreates_at_next_begin() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    device.faults().present_suboptimal(1);
    assert!(frame(&mut o).is_ready());
    assert_eq!(o.recreation_count(), 0);

    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::Resized));
    assert_eq!(o.recreation_count(), 1);
    assert!(frame(&mut o).is_ready());
    assert_clean(&device);
}

#[test]
fn suboptimal_acquire_still_renders() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    device.faults().acquire_suboptimal(1);
    assert!(frame(&mut o).is_ready());
    assert_eq!(o.recreation_count(), 0);
    assert_clean(&device);
}

#[test]
fn surface_driven_resize_is_picked_up_by_acquire() {
    let device = Arc::new(HeadlessDevice::new(HeadlessConfig {
        fixed_extent: true,
        ..HeadlessConfig::default()
    }));
    let mut o = orchestrator(&device);
    assert!(frame(&mut o).is_ready());

    device.set_surface_size(RenderSize::new(1920, 1080));
    assert_eq!(
        frame(&mut o),
        FrameStatus::Deferred(DeferReason::SwapchainOutOfDate)
    );
    assert_eq!(o.framebuffer_size(), RenderSize::new(1920, 1080));
    assert!(frame(&mut o).is_ready());
    assert_clean(&device);
}

#[test]
fn fence_timeout_skips_the_frame() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    // past the first lap the slot fences are no longer known signaled
    for _ in 0..3 {
        assert!(frame(&mut o).is_ready());
    }
    let slot = o.current_frame();

    device.faults().fence_timeouts(1);
    device.clear_events();
    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::FenceTimeout));
    assert_eq!(o.current_frame(), slot);
    assert_eq!(
        count(&device.events(), |e| matches!(e, Event::Acquire { .. })),
        0
    );

    assert!(frame(&mut o).is_ready());
    assert_clean(&device);
}

#[test]
fn image_fence_timeout_defers_and_resumes_the_image() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    assert!(frame(&mut o).is_ready());
    assert_eq!(o.images_in_flight()[0], Some(0));

    // slot 1 has never submitted, so only the image's fence is waited on
    assert_eq!(o.current_frame(), 1);
    assert!(o.slots()[1].in_flight.is_signaled());
    device.faults().force_acquire(0).fence_timeouts(1);
    assert_eq!(
        o.begin_frame(DT).expect("begin_frame"),
        FrameStatus::Deferred(DeferReason::FenceTimeout)
    );
    assert_eq!(o.pending_image(), Some(0));
    assert_eq!(o.current_frame(), 1);
    assert_eq!(o.state(), FrameState::Idle);

    device.clear_events();
    assert!(frame(&mut o).is_ready());
    assert_eq!(o.image_index(), 0);
    assert_eq!(o.pending_image(), None);
    assert_eq!(o.images_in_flight()[0], Some(1));
    let events = device.events();
    assert_eq!(count(&events, |e| matches!(e, Event::Acquire { .. })), 0);
    assert_eq!(count(&events, |e| matches!(e, Event::Submit { .. })), 1);
    assert_clean(&device);
}

#[test]
fn resize_drops_an_image_held_over_a_fence_timeout() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    assert!(frame(&mut o).is_ready());
    device.faults().force_acquire(0).fence_timeouts(1);
    assert_eq!(
        frame(&mut o),
        FrameStatus::Deferred(DeferReason::FenceTimeout)
    );

    o.on_resized(RenderSize::new(1024, 768));
    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::Resized));
    assert_eq!(o.pending_image(), None);
    for _ in 0..6 {
        assert!(frame(&mut o).is_ready());
    }
    assert_clean(&device);
}

#[test]
fn reacquired_image_waits_for_its_previous_slot() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    assert!(frame(&mut o).is_ready());
    let owner_fence = o.slots()[0].in_flight.handle();

    device.clear_events();
    device.faults().force_acquire(0);
    assert!(frame(&mut o).is_ready());
    assert_eq!(o.image_index(), 0);

    let events = device.events();
    let waited = events
        .iter()
        .position(|e| {
            *e == Event::FenceWait {
                fence: owner_fence,
                signaled: true,
            }
        })
        .expect("owner fence waited");
    let submitted = events
        .iter()
        .position(|e| matches!(e, Event::Submit { .. }))
        .expect("frame submitted");
    assert!(waited < submitted);
    assert_eq!(o.images_in_flight()[0], Some(1));
    assert_clean(&device);
}

#[test]
fn device_loss_is_fatal() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    device.faults().lose_device();

    let err = o.begin_frame(DT).unwrap_err();
    assert!(matches!(err, RenderError::DeviceLost));
    assert!(err.is_fatal());
    assert_eq!(o.state(), FrameState::Idle);
}

#[test]
fn submit_failure_is_fatal() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    assert!(o.begin_frame(DT).unwrap().is_ready());
    device.faults().submit_failures(1);
    let err = o.end_frame(DT).unwrap_err();
    assert!(matches!(err, RenderError::Submission(_)));
    assert!(err.is_fatal());
}

#[test]
fn acquire_timeout_defers() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);

    device.faults().acquire_timeouts(1);
    assert_eq!(frame(&mut o), FrameStatus::Deferred(DeferReason::AcquireTimeout));
    assert!(frame(&mut o).is_ready());
    assert_clean(&device);
}

#[test]
fn long_run_with_resizes_and_faults_keeps_protocol() {
    let device = device_with_images(2, 4);
    let mut o = orchestrator(&device);

    for i in 0..60u32 {
        match i {
            7 => o.on_resized(RenderSize::new(1024, 768)),
            13 => {
                device.faults().acquire_out_of_date(1);
            }
            21 => o.on_resized(RenderSize::new(0, 0)),
            25 => o.on_resized(RenderSize::new(640, 360)),
            31 => {
                device.faults().present_out_of_date(1);
            }
            40 => {
                device.faults().fence_timeouts(1);
            }
            _ => {}
        }
        frame(&mut o);
        assert!(o.current_frame() < o.max_frames_in_flight());
        assert_eq!(o.state(), FrameState::Idle);
    }
    assert_eq!(o.framebuffer_size(), RenderSize::new(640, 360));
    assert_eq!(o.recreation_count(), 4);
    assert_clean(&device);
}

#[test]
fn teardown_releases_everything_once() {
    let device = device_with_images(3, 4);
    {
        let mut o = orchestrator(&device);
        for _ in 0..5 {
            frame(&mut o);
        }
        o.on_resized(RenderSize::new(320, 240));
        for _ in 0..3 {
            frame(&mut o);
        }
    }
    assert_eq!(device.live_fences(), 0);
    assert_eq!(device.live_semaphores(), 0);
    assert_eq!(device.live_command_buffers(), 0);
    assert_eq!(device.live_image_views(), 0);
    assert_eq!(device.live_framebuffers(), 0);
    assert_eq!(device.live_render_passes(), 0);
    assert_eq!(device.live_swapchains(), 0);
    assert_eq!(device.live_images(), 0);
    assert_eq!(device.live_memories(), 0);
    assert_clean(&device);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "already open")]
fn double_begin_is_a_programmer_error() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    assert!(o.begin_frame(DT).unwrap().is_ready());
    let _ = o.begin_frame(DT);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "without a successful begin_frame")]
fn end_without_begin_is_a_programmer_error() {
    let device = device_with_images(3, 4);
    let mut o = orchestrator(&device);
    let _ = o.end_frame(DT);
}
