// SPDX-License-Identifier: CEPL-1.0
//! Begin-frame / end-frame protocol.
//!
//! N frame slots (one fence and two semaphores each) rotate over M
//! presentable images, each with its own command unit. Per frame:
//!
//! 1. wait the slot's in-flight fence
//! 2. acquire an image (signals the slot's image-available semaphore)
//! 3. wait whatever slot last submitted to that image, then reset and record
//!    the image's command unit. A timeout here keeps the image acquired and
//!    the next `begin_frame` resumes from this step
//! 4. submit: wait image-available at color output, signal queue-complete and
//!    the slot fence
//! 5. present waiting on queue-complete, advance the slot ring
//!
//! Resizes only bump a generation counter ([`ResizeSignal`]); the next
//! `begin_frame` sees the mismatch and recreates everything tied to the
//! swapchain before any acquire.
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::command::CommandUnit;
use crate::config::FrameConfig;
use crate::device::{
    AcquireOutcome, Device, PipelineStage, PresentOutcome, Rect2D, RenderPassDesc, Viewport,
};
use crate::error::{RenderError, RenderResult};
use crate::renderpass::RenderPass;
use crate::resize::ResizeSignal;
use crate::swapchain::{Swapchain, SwapchainConfig};
use crate::sync::{Fence, Semaphore};
use crate::RenderSize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    WaitingFence,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferReason {
    /// A previous recreation did not finish.
    RecreationInProgress,
    /// The swapchain was just rebuilt for a new size.
    Resized,
    /// The latest size has a zero dimension; nothing is done until it changes.
    Minimized,
    /// A slot or image fence did not signal in time.
    FenceTimeout,
    /// Acquire reported out-of-date; the swapchain was rebuilt.
    SwapchainOutOfDate,
    AcquireTimeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    Deferred(DeferReason),
}

impl FrameStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, FrameStatus::Ready)
    }
}

pub struct FrameSlot<D: Device> {
    pub image_available: Semaphore<D>,
    pub queue_complete: Semaphore<D>,
    pub in_flight: Fence<D>,
}

impl<D: Device> FrameSlot<D> {
    fn new(device: &Arc<D>) -> RenderResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            queue_complete: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

fn create_slots<D: Device>(device: &Arc<D>, count: usize) -> RenderResult<Vec<FrameSlot<D>>> {
    (0..count).map(|_| FrameSlot::new(device)).collect()
}

fn allocate_units<D: Device>(device: &Arc<D>, count: usize) -> RenderResult<Vec<CommandUnit<D>>> {
    let pool = device.graphics_command_pool();
    (0..count)
        .map(|_| CommandUnit::allocate(device.clone(), pool, true))
        .collect()
}

/// Owns everything tied to the swapchain and drives the frame protocol.
///
/// Field order is teardown order.
pub struct FrameOrchestrator<D: Device> {
    command_units: Vec<CommandUnit<D>>,
    slots: Vec<FrameSlot<D>>,
    /// image index -> slot whose fence guards the last submission to it
    images_in_flight: Vec<Option<usize>>,
    swapchain: Swapchain<D>,
    render_pass: RenderPass<D>,
    device: Arc<D>,

    config: FrameConfig,
    resize: ResizeSignal,
    framebuffer_size: RenderSize,
    last_generation: u64,
    recreating: bool,
    recreate_requested: bool,
    current_frame: usize,
    image_index: u32,
    /// Acquired by the current slot but not yet recorded because the
    /// previous user's fence timed out.
    pending_image: Option<u32>,
    state: FrameState,
    recreation_count: u64,
}

impl<D: Device> FrameOrchestrator<D> {
    pub fn new(device: Arc<D>, size: RenderSize, config: FrameConfig) -> RenderResult<Self> {
        let mut swapchain = Swapchain::create(device.clone(), size, SwapchainConfig::from(&config))?;
        let extent = swapchain.extent();
        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassDesc {
                color_format: swapchain.surface_format().format,
                depth_format: swapchain.depth_format(),
            },
            Rect2D::from_size(extent),
            config.clear_color,
        )?;
        swapchain.regenerate_framebuffers(&render_pass)?;

        let command_units = allocate_units(&device, swapchain.image_count())?;
        let slots = create_slots(&device, swapchain.max_frames_in_flight())?;
        let images_in_flight = vec![None; swapchain.image_count()];
        let resize = ResizeSignal::new(extent);
        let last_generation = resize.generation();

        info!(
            device = device.name(),
            %extent,
            images = swapchain.image_count(),
            frames_in_flight = slots.len(),
            "frame orchestrator ready"
        );

        Ok(Self {
            command_units,
            slots,
            images_in_flight,
            swapchain,
            render_pass,
            device,
            config,
            resize,
            framebuffer_size: extent,
            last_generation,
            recreating: false,
            recreate_requested: false,
            current_frame: 0,
            image_index: 0,
            pending_image: None,
            state: FrameState::Idle,
            recreation_count: 0,
        })
    }

    /// Starts a frame. `Deferred` means nothing was recorded and `end_frame`
    /// must not be called; errors are fatal. A frame deferred on the fence of
    /// the image's previous user keeps the image acquired for the next call.
    pub fn begin_frame(&mut self, delta_time: f32) -> RenderResult<FrameStatus> {
        debug_assert_eq!(
            self.state,
            FrameState::Idle,
            "begin_frame while a frame is already open"
        );
        if self.state != FrameState::Idle {
            return Err(RenderError::OutOfSequence("begin_frame while a frame is open"));
        }

        if self.recreating {
            // an earlier recreation bailed out half way
            self.device.wait_idle()?;
            self.recreating = false;
            self.recreate_requested = true;
            debug!("recreation still pending, frame deferred");
            return Ok(FrameStatus::Deferred(DeferReason::RecreationInProgress));
        }

        let generation = self.resize.generation();
        if generation != self.last_generation || self.recreate_requested {
            let size = if generation != self.last_generation {
                self.resize.size()
            } else {
                self.framebuffer_size
            };
            if size.is_zero() {
                trace!(%size, "framebuffer has no area, frame deferred");
                return Ok(FrameStatus::Deferred(DeferReason::Minimized));
            }
            let recreated = self.recreate_at(size, generation)?;
            return Ok(FrameStatus::Deferred(if recreated {
                DeferReason::Resized
            } else {
                DeferReason::Minimized
            }));
        }

        let current = self.current_frame;
        let index = match self.pending_image.take() {
            Some(index) => {
                trace!(frame = current, image = index, "resuming acquired image");
                index
            }
            None => match self.wait_and_acquire(current, generation)? {
                Ok(index) => index,
                Err(reason) => return Ok(FrameStatus::Deferred(reason)),
            },
        };
        self.image_index = index;
        let image = index as usize;

        // The image may still be in use by a submission from another slot.
        // Its acquire semaphore is already pending, so on a timeout the image
        // stays acquired and the next begin_frame picks it up again.
        match self.wait_image_owner(image) {
            Ok(true) => {}
            Ok(false) => {
                self.pending_image = Some(index);
                self.state = FrameState::Idle;
                return Ok(FrameStatus::Deferred(DeferReason::FenceTimeout));
            }
            Err(e) => {
                self.state = FrameState::Idle;
                return Err(e);
            }
        }

        self.state = FrameState::Recording;
        let size = self.framebuffer_size;
        let unit = &mut self.command_units[image];
        unit.reset()?;
        unit.begin(false, false, false)?;
        unit.set_viewport(&Viewport::top_left(size));
        unit.set_scissor(&Rect2D::from_size(size));

        let framebuffer = self.swapchain.framebuffer(image).ok_or_else(|| {
            RenderError::backend("begin_frame", format!("image {image} has no framebuffer"))
        })?;
        self.render_pass.begin(&self.command_units[image], framebuffer);

        trace!(frame = current, image, delta_time, "frame begun");
        Ok(FrameStatus::Ready)
    }

    /// Ends, submits and presents the frame opened by `begin_frame`. An
    /// out-of-date or suboptimal present only schedules a recreation; every
    /// error is fatal.
    pub fn end_frame(&mut self, delta_time: f32) -> RenderResult<()> {
        debug_assert_eq!(
            self.state,
            FrameState::Recording,
            "end_frame without a successful begin_frame"
        );
        if self.state != FrameState::Recording {
            return Err(RenderError::OutOfSequence("end_frame without begin_frame"));
        }
        let current = self.current_frame;
        let image = self.image_index as usize;

        self.render_pass.end(&self.command_units[image]);
        self.command_units[image].end()?;

        self.state = FrameState::Submitting;
        if !self.wait_image_owner(image)? {
            self.state = FrameState::Idle;
            return Err(RenderError::FenceTimeout {
                timeout_ns: self.config.fence_timeout_ns,
            });
        }
        self.images_in_flight[image] = Some(current);

        let slot = &mut self.slots[current];
        slot.in_flight.reset()?;
        let submitted = self.command_units[image].submit(
            self.device.graphics_queue(),
            Some((
                slot.image_available.handle(),
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            )),
            Some(slot.queue_complete.handle()),
            Some(slot.in_flight.handle()),
        );
        if let Err(e) = submitted {
            error!(frame = current, image, "queue submit failed: {e}");
            self.state = FrameState::Idle;
            return Err(match e {
                RenderError::DeviceLost => RenderError::DeviceLost,
                other => RenderError::Submission(other.to_string()),
            });
        }

        self.state = FrameState::Presenting;
        let presented = self.swapchain.present(
            self.device.present_queue(),
            self.slots[current].queue_complete.handle(),
            self.image_index,
        );
        match presented {
            Ok(PresentOutcome::Presented) => {}
            Ok(PresentOutcome::Suboptimal | PresentOutcome::OutOfDate) => {
                self.recreate_requested = true;
            }
            Err(e) => {
                error!(frame = current, image, "present failed: {e}");
                self.state = FrameState::Idle;
                return Err(e);
            }
        }

        self.current_frame = (current + 1) % self.slots.len();
        self.state = FrameState::Idle;
        trace!(frame = current, image, delta_time, "frame presented");
        Ok(())
    }

    /// Records a new framebuffer size for the next `begin_frame`.
    pub fn on_resized(&self, size: RenderSize) {
        self.resize.notify(size);
    }

    /// Rebuilds the swapchain and everything tied to it at `size`.
    ///
    /// Returns `false` without touching anything when a recreation is already
    /// running or `size` has no area.
    pub fn recreate(&mut self, size: RenderSize) -> RenderResult<bool> {
        let generation = self.resize.generation();
        self.recreate_at(size, generation)
    }

    fn recreate_at(&mut self, size: RenderSize, generation: u64) -> RenderResult<bool> {
        if self.recreating {
            debug!("recreate called while already recreating");
            return Ok(false);
        }
        if size.is_zero() {
            debug!(%size, "recreate skipped for zero-sized framebuffer");
            return Ok(false);
        }
        debug_assert_eq!(self.state, FrameState::Idle);

        self.recreating = true;
        self.state = FrameState::Recreating;
        self.device.wait_idle()?;

        self.images_in_flight.iter_mut().for_each(|owner| *owner = None);
        self.command_units.clear();
        if let Some(image) = self.pending_image.take() {
            // The old swapchain goes away with the image still acquired;
            // its acquire semaphore is never waited on, so it is replaced.
            debug!(image, "dropping acquired image for recreation");
            self.slots[self.current_frame].image_available = Semaphore::new(self.device.clone())?;
        }

        match self.rebuild(size) {
            Ok(()) => {}
            Err(RenderError::InvalidExtent { width, height }) => {
                // The surface shrank to nothing after the size was recorded.
                debug!(width, height, "surface has no area, recreation postponed");
                self.command_units = allocate_units(&self.device, self.swapchain.image_count())?;
                self.recreating = false;
                self.state = FrameState::Idle;
                return Ok(false);
            }
            Err(e) => {
                error!("swapchain recreation failed: {e}");
                self.state = FrameState::Idle;
                return Err(e);
            }
        }

        self.last_generation = generation;
        self.recreate_requested = false;
        self.recreation_count += 1;
        self.recreating = false;
        self.state = FrameState::Idle;
        info!(
            extent = %self.framebuffer_size,
            generation,
            recreations = self.recreation_count,
            "swapchain resources rebuilt"
        );
        Ok(true)
    }

    fn rebuild(&mut self, size: RenderSize) -> RenderResult<()> {
        let old_color = self.swapchain.surface_format().format;
        let old_depth = self.swapchain.depth_format();
        self.swapchain.recreate(size)?;

        let desc = RenderPassDesc {
            color_format: self.swapchain.surface_format().format,
            depth_format: self.swapchain.depth_format(),
        };
        let extent = self.swapchain.extent();
        if desc.color_format != old_color || desc.depth_format != old_depth {
            info!(?desc, "surface format changed, render pass rebuilt");
            self.render_pass = RenderPass::new(
                self.device.clone(),
                desc,
                Rect2D::from_size(extent),
                self.render_pass.clear_values().color,
            )?;
        }
        self.render_pass.set_render_area(Rect2D::from_size(extent));
        self.swapchain.regenerate_framebuffers(&self.render_pass)?;
        self.framebuffer_size = extent;

        self.command_units = allocate_units(&self.device, self.swapchain.image_count())?;
        self.images_in_flight = vec![None; self.swapchain.image_count()];

        let frames = self.swapchain.max_frames_in_flight();
        if frames != self.slots.len() {
            debug!(from = self.slots.len(), to = frames, "frame slot count changed");
            self.slots.clear();
            self.slots = create_slots(&self.device, frames)?;
            self.current_frame = 0;
        }
        Ok(())
    }

    /// Slot fence wait and acquire. The inner `Err` is a deferral.
    fn wait_and_acquire(
        &mut self,
        current: usize,
        generation: u64,
    ) -> RenderResult<Result<u32, DeferReason>> {
        self.state = FrameState::WaitingFence;
        match self.slots[current].in_flight.wait(self.config.fence_timeout_ns) {
            Ok(true) => {}
            Ok(false) => {
                self.state = FrameState::Idle;
                return Ok(Err(DeferReason::FenceTimeout));
            }
            Err(e) => {
                error!(frame = current, "in-flight fence wait failed: {e}");
                self.state = FrameState::Idle;
                return Err(e);
            }
        }

        self.state = FrameState::Acquiring;
        let outcome = self
            .swapchain
            .acquire_next_image(u64::MAX, self.slots[current].image_available.handle());
        match outcome {
            Ok(AcquireOutcome::Acquired { index, .. }) => Ok(Ok(index)),
            Ok(AcquireOutcome::OutOfDate) => {
                self.state = FrameState::Idle;
                self.recreate_at(self.framebuffer_size, generation)?;
                Ok(Err(DeferReason::SwapchainOutOfDate))
            }
            Ok(AcquireOutcome::Timeout) => {
                self.state = FrameState::Idle;
                Ok(Err(DeferReason::AcquireTimeout))
            }
            Err(e) => {
                error!("acquire failed: {e}");
                self.state = FrameState::Idle;
                Err(e)
            }
        }
    }

    /// Waits for the slot that last submitted to `image`. `Ok(false)` is a
    /// timeout.
    fn wait_image_owner(&mut self, image: usize) -> RenderResult<bool> {
        let Some(owner) = self.images_in_flight[image] else {
            return Ok(true);
        };
        let fence = &mut self.slots[owner].in_flight;
        if fence.is_signaled() {
            return Ok(true);
        }
        trace!(image, owner, "waiting on previous user of image");
        fence.wait(self.config.fence_timeout_ns)
    }

    /// Command unit of the image being recorded, between a successful
    /// `begin_frame` and `end_frame`.
    pub fn command_unit(&self) -> Option<&CommandUnit<D>> {
        (self.state == FrameState::Recording).then(|| &self.command_units[self.image_index as usize])
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.config.clear_color = rgba;
        self.render_pass.set_clear_color(rgba);
    }

    /// Changing vsync takes effect through a recreation at the next frame.
    pub fn set_vsync(&mut self, vsync: bool) {
        if self.config.vsync == vsync {
            return;
        }
        self.config.vsync = vsync;
        self.swapchain.set_config(SwapchainConfig::from(&self.config));
        self.recreate_requested = true;
    }

    /// Blocks until the device has no pending work.
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.device.wait_idle()
    }

    pub fn resize_signal(&self) -> ResizeSignal {
        self.resize.clone()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Image held over from a frame deferred on its previous user's fence.
    pub fn pending_image(&self) -> Option<u32> {
        self.pending_image
    }

    pub fn framebuffer_size(&self) -> RenderSize {
        self.framebuffer_size
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::top_left(self.framebuffer_size)
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreation_count
    }

    pub fn max_frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    pub fn slots(&self) -> &[FrameSlot<D>] {
        &self.slots
    }

    pub fn command_units(&self) -> &[CommandUnit<D>] {
        &self.command_units
    }

    pub fn swapchain(&self) -> &Swapchain<D> {
        &self.swapchain
    }

    pub fn render_pass(&self) -> &RenderPass<D> {
        &self.render_pass
    }
}

impl<D: Device> Drop for FrameOrchestrator<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle during teardown failed: {e}");
        }
    }
}
