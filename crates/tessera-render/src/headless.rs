// SPDX-License-Identifier: CEPL-1.0
//! Software [`Device`] without a GPU.
//!
//! Submissions queue up and retire in order when a fence, the queue or the
//! device is waited on; buffer copies run at retirement. The usage rules a
//! validation layer would enforce are checked and every breach is recorded in
//! [`HeadlessDevice::violations`]. Faults (out-of-date surfaces, timeouts,
//! device loss, failed submits) are injected through
//! [`HeadlessDevice::faults`].
use std::collections::{HashMap, HashSet, VecDeque};
use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::device::{
    AcquireOutcome, BufferUsage, ClearValues, ColorSpace, CommandBufferUsage, Device, FenceWait,
    Format, ImageAspect, ImageDesc, IndexType, MemoryProperty, MemoryRequirements, PipelineStage,
    PresentMode, PresentOutcome, Rect2D, RenderPassDesc, SurfaceCapabilities, SurfaceFormat,
    SwapchainDesc, Viewport,
};
use crate::error::{RenderError, RenderResult};
use crate::RenderSize;

macro_rules! handles {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

handles!(
    QueueId,
    FenceId,
    SemaphoreId,
    PoolId,
    CommandBufferId,
    BufferId,
    MemoryId,
    ImageId,
    ImageViewId,
    RenderPassId,
    FramebufferId,
    PipelineId,
    SwapchainId,
);

/// The single queue; it serves graphics and present.
pub const GRAPHICS_QUEUE: QueueId = QueueId(1);
const POOL: PoolId = PoolId(1);
const MAX_EXTENT: u32 = 16384;

#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessConfig {
    pub surface_size: RenderSize,
    pub min_image_count: u32,
    /// Zero means no upper limit.
    pub max_image_count: u32,
    /// When set the surface dictates its extent, and a swapchain whose extent
    /// no longer matches reports out-of-date.
    pub fixed_extent: bool,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
    pub memory_types: Vec<MemoryProperty>,
    pub depth_formats: Vec<Format>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            surface_size: RenderSize::new(800, 600),
            min_image_count: 2,
            max_image_count: 8,
            fixed_extent: false,
            formats: vec![
                SurfaceFormat {
                    format: Format::B8G8R8A8Srgb,
                    color_space: ColorSpace::SrgbNonlinear,
                },
                SurfaceFormat {
                    format: Format::B8G8R8A8Unorm,
                    color_space: ColorSpace::SrgbNonlinear,
                },
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate],
            memory_types: vec![
                MemoryProperty::DEVICE_LOCAL,
                MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT,
                MemoryProperty::HOST_VISIBLE
                    | MemoryProperty::HOST_COHERENT
                    | MemoryProperty::HOST_CACHED,
            ],
            depth_formats: vec![Format::D32Sfloat, Format::D24UnormS8Uint],
        }
    }
}

/// What the device saw, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    WaitIdle,
    QueueWaitIdle,
    FenceWait { fence: FenceId, signaled: bool },
    FenceReset { fence: FenceId },
    SwapchainCreated {
        swapchain: SwapchainId,
        extent: RenderSize,
        images: usize,
        old: Option<SwapchainId>,
    },
    /// `image` is `None` when the acquire did not hand out an image.
    Acquire { image: Option<u32>, signal: SemaphoreId },
    BeginCommandBuffer { cb: CommandBufferId },
    Submit {
        cb: CommandBufferId,
        wait: Option<SemaphoreId>,
        signal: Option<SemaphoreId>,
        fence: Option<FenceId>,
    },
    Present { image: u32, wait: SemaphoreId },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    BeginRenderPass { framebuffer: FramebufferId, clear: ClearValues },
    DrawIndexed { index_count: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CbPhase {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Clone, Copy, Debug)]
struct CopyOp {
    src: BufferId,
    dst: BufferId,
    src_offset: u64,
    dst_offset: u64,
    size: u64,
}

#[derive(Debug)]
struct CommandBufferState {
    phase: CbPhase,
    copies: Vec<CopyOp>,
    in_render_pass: bool,
    /// Framebuffers rendered to since the last begin or reset.
    framebuffers: Vec<FramebufferId>,
}

#[derive(Debug)]
struct BufferState {
    size: u64,
    usage: BufferUsage,
    memory: Option<(MemoryId, u64)>,
}

#[derive(Debug)]
struct MemoryState {
    data: Vec<u8>,
    properties: MemoryProperty,
    mapped: bool,
}

#[derive(Debug)]
struct SwapchainState {
    images: Vec<ImageId>,
    acquired: Vec<bool>,
    next: usize,
    extent: RenderSize,
    retired: bool,
}

#[derive(Debug)]
struct Submission {
    cb: CommandBufferId,
    signal: Option<SemaphoreId>,
    fence: Option<FenceId>,
}

#[derive(Debug, Default)]
struct Faults {
    device_lost: bool,
    acquire_out_of_date: u32,
    acquire_suboptimal: u32,
    acquire_timeouts: u32,
    present_out_of_date: u32,
    present_suboptimal: u32,
    fence_timeouts: u32,
    submit_failures: u32,
    forced_acquire: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    surface_size: RenderSize,
    fences: HashMap<FenceId, bool>,
    /// semaphore -> signaled (or has a signal operation pending)
    semaphores: HashMap<SemaphoreId, bool>,
    command_buffers: HashMap<CommandBufferId, CommandBufferState>,
    buffers: HashMap<BufferId, BufferState>,
    memories: HashMap<MemoryId, MemoryState>,
    images: HashMap<ImageId, Option<MemoryId>>,
    swapchain_images: HashSet<ImageId>,
    views: HashSet<ImageViewId>,
    render_passes: HashSet<RenderPassId>,
    framebuffers: HashSet<FramebufferId>,
    pipelines: HashSet<PipelineId>,
    swapchains: HashMap<SwapchainId, SwapchainState>,
    queue: VecDeque<Submission>,
    events: Vec<Event>,
    violations: Vec<String>,
    faults: Faults,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn violation(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!(target: "headless", "validation: {msg}");
        self.violations.push(msg);
    }

    fn check_lost(&self) -> RenderResult<()> {
        if self.faults.device_lost {
            Err(RenderError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn recording(&mut self, cb: CommandBufferId, what: &str) -> bool {
        match self.command_buffers.get(&cb).map(|c| c.phase) {
            Some(CbPhase::Recording) => true,
            Some(phase) => {
                self.violation(format!("{what} on {cb:?} while {phase:?}"));
                false
            }
            None => {
                self.violation(format!("{what} on unknown {cb:?}"));
                false
            }
        }
    }

    /// Retires submissions in order. With `until`, stops after the one that
    /// signals that fence.
    fn retire(&mut self, until: Option<FenceId>) {
        while let Some(sub) = self.queue.pop_front() {
            let copies = match self.command_buffers.get_mut(&sub.cb) {
                Some(cb) => {
                    cb.phase = CbPhase::Executable;
                    std::mem::take(&mut cb.copies)
                }
                None => Vec::new(),
            };
            for copy in &copies {
                self.execute_copy(copy);
            }
            if let Some(cb) = self.command_buffers.get_mut(&sub.cb) {
                cb.copies = copies;
            }
            if let Some(fence) = sub.fence {
                if let Some(signaled) = self.fences.get_mut(&fence) {
                    *signaled = true;
                }
            }
            trace!(cb = ?sub.cb, signal = ?sub.signal, "submission retired");
            if until.is_some() && sub.fence == until {
                break;
            }
        }
    }

    fn execute_copy(&mut self, copy: &CopyOp) {
        let Some(bytes) = self.read_buffer(copy.src, copy.src_offset, copy.size) else {
            self.violation(format!("copy from unbacked {:?}", copy.src));
            return;
        };
        let Some((memory, base)) = self.buffers.get(&copy.dst).and_then(|b| b.memory) else {
            self.violation(format!("copy into unbacked {:?}", copy.dst));
            return;
        };
        if let Some(m) = self.memories.get_mut(&memory) {
            let start = (base + copy.dst_offset) as usize;
            m.data[start..start + bytes.len()].copy_from_slice(&bytes);
        }
    }

    fn read_buffer(&self, buffer: BufferId, offset: u64, size: u64) -> Option<Vec<u8>> {
        let (memory, base) = self.buffers.get(&buffer)?.memory?;
        let m = self.memories.get(&memory)?;
        let start = (base + offset) as usize;
        m.data.get(start..start + size as usize).map(<[u8]>::to_vec)
    }

    fn pending_on_fence(&self, fence: FenceId) -> bool {
        self.queue.iter().any(|s| s.fence == Some(fence))
    }

    /// A queued submission still renders to `framebuffer`.
    fn framebuffer_busy(&self, framebuffer: FramebufferId) -> bool {
        self.queue.iter().any(|sub| {
            self.command_buffers
                .get(&sub.cb)
                .is_some_and(|c| c.framebuffers.contains(&framebuffer))
        })
    }
}

pub struct HeadlessDevice {
    config: HeadlessConfig,
    state: Mutex<State>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

/// Arms one-shot faults; counts are consumed one per matching call.
pub struct FaultInjector<'a> {
    state: MutexGuard<'a, State>,
}

impl FaultInjector<'_> {
    /// Every following call that can report device loss does.
    pub fn lose_device(&mut self) -> &mut Self {
        self.state.faults.device_lost = true;
        self
    }

    pub fn acquire_out_of_date(&mut self, count: u32) -> &mut Self {
        self.state.faults.acquire_out_of_date += count;
        self
    }

    pub fn acquire_suboptimal(&mut self, count: u32) -> &mut Self {
        self.state.faults.acquire_suboptimal += count;
        self
    }

    pub fn acquire_timeouts(&mut self, count: u32) -> &mut Self {
        self.state.faults.acquire_timeouts += count;
        self
    }

    pub fn present_out_of_date(&mut self, count: u32) -> &mut Self {
        self.state.faults.present_out_of_date += count;
        self
    }

    pub fn present_suboptimal(&mut self, count: u32) -> &mut Self {
        self.state.faults.present_suboptimal += count;
        self
    }

    /// Fence waits that report a timeout without retiring anything.
    pub fn fence_timeouts(&mut self, count: u32) -> &mut Self {
        self.state.faults.fence_timeouts += count;
        self
    }

    pub fn submit_failures(&mut self, count: u32) -> &mut Self {
        self.state.faults.submit_failures += count;
        self
    }

    /// The next acquire hands out `index` if that image is free, instead of
    /// the round-robin pick.
    pub fn force_acquire(&mut self, index: u32) -> &mut Self {
        self.state.faults.forced_acquire = Some(index);
        self
    }
}

impl HeadlessDevice {
    pub fn new(config: HeadlessConfig) -> Self {
        let state = State {
            surface_size: config.surface_size,
            ..State::default()
        };
        debug!(surface = %config.surface_size, "headless device created");
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    pub fn faults(&self) -> FaultInjector<'_> {
        FaultInjector {
            state: self.state.lock(),
        }
    }

    /// Resizes the simulated surface. With a fixed extent, swapchains built
    /// for the old size report out-of-date from now on.
    pub fn set_surface_size(&self, size: RenderSize) {
        self.state.lock().surface_size = size;
    }

    pub fn surface_size(&self) -> RenderSize {
        self.state.lock().surface_size
    }

    /// Stand-in for the pipeline loader: an opaque pipeline handle.
    pub fn create_pipeline(&self) -> PipelineId {
        let mut s = self.state.lock();
        let id = PipelineId(s.id());
        s.pipelines.insert(id);
        id
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Bytes currently stored in `buffer`'s memory, as the GPU would see them
    /// after all retired work.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        let s = self.state.lock();
        let size = s.buffers.get(&buffer)?.size;
        s.read_buffer(buffer, 0, size)
    }

    pub fn pending_submissions(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        self.state.lock().command_buffers.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_memories(&self) -> usize {
        self.state.lock().memories.len()
    }

    /// Images created through `create_image`; swapchain images are not
    /// counted.
    pub fn live_images(&self) -> usize {
        self.state.lock().images.len()
    }

    pub fn live_image_views(&self) -> usize {
        self.state.lock().views.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().framebuffers.len()
    }

    pub fn live_render_passes(&self) -> usize {
        self.state.lock().render_passes.len()
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.lock().swapchains.len()
    }

    fn memory_type_bits(&self) -> u32 {
        let n = self.config.memory_types.len().min(32);
        if n == 32 {
            u32::MAX
        } else {
            (1u32 << n) - 1
        }
    }
}

impl Device for HeadlessDevice {
    type Queue = QueueId;
    type Fence = FenceId;
    type Semaphore = SemaphoreId;
    type CommandPool = PoolId;
    type CommandBuffer = CommandBufferId;
    type Buffer = BufferId;
    type Memory = MemoryId;
    type Image = ImageId;
    type ImageView = ImageViewId;
    type RenderPass = RenderPassId;
    type Framebuffer = FramebufferId;
    type Pipeline = PipelineId;
    type Swapchain = SwapchainId;

    fn name(&self) -> &str {
        "headless"
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        s.retire(None);
        s.events.push(Event::WaitIdle);
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: QueueId) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        s.retire(None);
        s.events.push(Event::QueueWaitIdle);
        Ok(())
    }

    fn graphics_queue(&self) -> QueueId {
        GRAPHICS_QUEUE
    }

    fn present_queue(&self) -> QueueId {
        GRAPHICS_QUEUE
    }

    fn graphics_command_pool(&self) -> PoolId {
        POOL
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<FenceId> {
        let mut s = self.state.lock();
        let id = FenceId(s.id());
        s.fences.insert(id, signaled);
        Ok(id)
    }

    fn destroy_fence(&self, fence: FenceId) {
        let mut s = self.state.lock();
        if s.pending_on_fence(fence) {
            s.violation(format!("destroy of {fence:?} with pending work"));
        }
        if s.fences.remove(&fence).is_none() {
            s.violation(format!("destroy of unknown {fence:?}"));
        }
    }

    fn wait_for_fence(&self, fence: FenceId, timeout_ns: u64) -> RenderResult<FenceWait> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if !s.fences.contains_key(&fence) {
            s.violation(format!("wait on unknown {fence:?}"));
            return Err(RenderError::backend("wait_for_fence", "unknown fence"));
        }
        if s.faults.fence_timeouts > 0 {
            s.faults.fence_timeouts -= 1;
            s.events.push(Event::FenceWait {
                fence,
                signaled: false,
            });
            return Ok(FenceWait::TimedOut);
        }
        if s.pending_on_fence(fence) {
            s.retire(Some(fence));
        }
        let signaled = s.fences.get(&fence).copied().unwrap_or(false);
        s.events.push(Event::FenceWait { fence, signaled });
        if signaled {
            Ok(FenceWait::Signaled)
        } else {
            if timeout_ns == u64::MAX {
                s.violation(format!("unbounded wait on {fence:?} that nothing will signal"));
            }
            Ok(FenceWait::TimedOut)
        }
    }

    fn reset_fence(&self, fence: FenceId) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if s.pending_on_fence(fence) {
            s.violation(format!("reset of {fence:?} used by a pending submission"));
        }
        match s.fences.get_mut(&fence) {
            Some(signaled) => *signaled = false,
            None => s.violation(format!("reset of unknown {fence:?}")),
        }
        s.events.push(Event::FenceReset { fence });
        Ok(())
    }

    fn create_semaphore(&self) -> RenderResult<SemaphoreId> {
        let mut s = self.state.lock();
        let id = SemaphoreId(s.id());
        s.semaphores.insert(id, false);
        Ok(id)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreId) {
        let mut s = self.state.lock();
        if s.semaphores.remove(&semaphore).is_none() {
            s.violation(format!("destroy of unknown {semaphore:?}"));
        }
    }

    fn allocate_command_buffer(&self, _pool: PoolId, _primary: bool) -> RenderResult<CommandBufferId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let id = CommandBufferId(s.id());
        s.command_buffers.insert(
            id,
            CommandBufferState {
                phase: CbPhase::Initial,
                copies: Vec::new(),
                in_render_pass: false,
                framebuffers: Vec::new(),
            },
        );
        Ok(id)
    }

    fn free_command_buffer(&self, _pool: PoolId, cb: CommandBufferId) {
        let mut s = self.state.lock();
        match s.command_buffers.remove(&cb) {
            Some(c) if c.phase == CbPhase::Pending => {
                s.violation(format!("free of pending {cb:?}"));
            }
            Some(_) => {}
            None => s.violation(format!("free of unknown {cb:?}")),
        }
    }

    fn begin_command_buffer(&self, cb: CommandBufferId, _usage: CommandBufferUsage) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let phase = s.command_buffers.get(&cb).map(|c| c.phase);
        match phase {
            Some(CbPhase::Pending) => s.violation(format!("begin of pending {cb:?}")),
            Some(CbPhase::Recording) => s.violation(format!("begin of {cb:?} already recording")),
            Some(_) => {}
            None => {
                s.violation(format!("begin of unknown {cb:?}"));
                return Err(RenderError::backend("begin_command_buffer", "unknown command buffer"));
            }
        }
        if let Some(c) = s.command_buffers.get_mut(&cb) {
            c.phase = CbPhase::Recording;
            c.copies.clear();
            c.in_render_pass = false;
            c.framebuffers.clear();
        }
        s.events.push(Event::BeginCommandBuffer { cb });
        Ok(())
    }

    fn end_command_buffer(&self, cb: CommandBufferId) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if s.recording(cb, "end") {
            let open_pass = s.command_buffers.get(&cb).is_some_and(|c| c.in_render_pass);
            if open_pass {
                s.violation(format!("end of {cb:?} inside a render pass"));
            }
            if let Some(c) = s.command_buffers.get_mut(&cb) {
                c.phase = CbPhase::Executable;
            }
        }
        Ok(())
    }

    fn reset_command_buffer(&self, cb: CommandBufferId) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let phase = s.command_buffers.get(&cb).map(|c| c.phase);
        match phase {
            Some(CbPhase::Pending) => s.violation(format!("reset of pending {cb:?}")),
            Some(_) => {}
            None => s.violation(format!("reset of unknown {cb:?}")),
        }
        if let Some(c) = s.command_buffers.get_mut(&cb) {
            c.phase = CbPhase::Initial;
            c.copies.clear();
            c.in_render_pass = false;
            c.framebuffers.clear();
        }
        Ok(())
    }

    fn queue_submit(
        &self,
        _queue: QueueId,
        cb: CommandBufferId,
        wait: Option<(SemaphoreId, PipelineStage)>,
        signal: Option<SemaphoreId>,
        fence: Option<FenceId>,
    ) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if s.faults.submit_failures > 0 {
            s.faults.submit_failures -= 1;
            return Err(RenderError::Submission("injected submit failure".into()));
        }
        match s.command_buffers.get(&cb).map(|c| c.phase) {
            Some(CbPhase::Executable) => {}
            Some(phase) => s.violation(format!("submit of {cb:?} while {phase:?}")),
            None => {
                s.violation(format!("submit of unknown {cb:?}"));
                return Err(RenderError::Submission("unknown command buffer".into()));
            }
        }
        if let Some(f) = fence {
            if s.fences.get(&f).copied().unwrap_or(false) {
                s.violation(format!("submit with signaled {f:?}"));
            }
        }
        if let Some((sem, _)) = wait {
            match s.semaphores.get_mut(&sem) {
                Some(signaled) if *signaled => *signaled = false,
                Some(_) => s.violation(format!("submit waits on {sem:?} that nothing signals")),
                None => s.violation(format!("submit waits on unknown {sem:?}")),
            }
        }
        if let Some(sem) = signal {
            match s.semaphores.get_mut(&sem) {
                Some(signaled) if !*signaled => *signaled = true,
                Some(_) => s.violation(format!("submit signals {sem:?} that is already signaled")),
                None => s.violation(format!("submit signals unknown {sem:?}")),
            }
        }
        if let Some(c) = s.command_buffers.get_mut(&cb) {
            c.phase = CbPhase::Pending;
        }
        s.queue.push_back(Submission { cb, signal, fence });
        s.events.push(Event::Submit {
            cb,
            wait: wait.map(|(sem, _)| sem),
            signal,
            fence,
        });
        Ok(())
    }

    fn cmd_set_viewport(&self, cb: CommandBufferId, viewport: &Viewport) {
        let mut s = self.state.lock();
        if s.recording(cb, "set_viewport") {
            s.events.push(Event::SetViewport(*viewport));
        }
    }

    fn cmd_set_scissor(&self, cb: CommandBufferId, scissor: &Rect2D) {
        let mut s = self.state.lock();
        if s.recording(cb, "set_scissor") {
            s.events.push(Event::SetScissor(*scissor));
        }
    }

    fn cmd_begin_render_pass(
        &self,
        cb: CommandBufferId,
        render_pass: RenderPassId,
        framebuffer: FramebufferId,
        _area: &Rect2D,
        clear: &ClearValues,
    ) {
        let mut s = self.state.lock();
        if !s.recording(cb, "begin_render_pass") {
            return;
        }
        if !s.render_passes.contains(&render_pass) {
            s.violation(format!("begin of unknown {render_pass:?}"));
        }
        if !s.framebuffers.contains(&framebuffer) {
            s.violation(format!("begin with unknown {framebuffer:?}"));
        }
        let nested = s.command_buffers.get(&cb).is_some_and(|c| c.in_render_pass);
        if nested {
            s.violation(format!("nested render pass in {cb:?}"));
        }
        if s.framebuffer_busy(framebuffer) {
            s.violation(format!(
                "render pass on {framebuffer:?} while an earlier submission to it is pending"
            ));
        }
        if let Some(c) = s.command_buffers.get_mut(&cb) {
            c.in_render_pass = true;
            c.framebuffers.push(framebuffer);
        }
        s.events.push(Event::BeginRenderPass {
            framebuffer,
            clear: *clear,
        });
    }

    fn cmd_end_render_pass(&self, cb: CommandBufferId) {
        let mut s = self.state.lock();
        if !s.recording(cb, "end_render_pass") {
            return;
        }
        let open = s.command_buffers.get(&cb).is_some_and(|c| c.in_render_pass);
        if !open {
            s.violation(format!("end_render_pass without begin in {cb:?}"));
        }
        if let Some(c) = s.command_buffers.get_mut(&cb) {
            c.in_render_pass = false;
        }
    }

    fn cmd_bind_pipeline(&self, cb: CommandBufferId, pipeline: PipelineId) {
        let mut s = self.state.lock();
        if s.recording(cb, "bind_pipeline") && !s.pipelines.contains(&pipeline) {
            s.violation(format!("bind of unknown {pipeline:?}"));
        }
    }

    fn cmd_bind_vertex_buffer(&self, cb: CommandBufferId, buffer: BufferId, _offset: u64) {
        let mut s = self.state.lock();
        if !s.recording(cb, "bind_vertex_buffer") {
            return;
        }
        let usage = s.buffers.get(&buffer).map(|b| b.usage);
        if !usage.is_some_and(|u| u.contains(BufferUsage::VERTEX)) {
            s.violation(format!("{buffer:?} bound as vertex buffer without VERTEX usage"));
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        cb: CommandBufferId,
        buffer: BufferId,
        _offset: u64,
        _index_type: IndexType,
    ) {
        let mut s = self.state.lock();
        if !s.recording(cb, "bind_index_buffer") {
            return;
        }
        let usage = s.buffers.get(&buffer).map(|b| b.usage);
        if !usage.is_some_and(|u| u.contains(BufferUsage::INDEX)) {
            s.violation(format!("{buffer:?} bound as index buffer without INDEX usage"));
        }
    }

    fn cmd_draw_indexed(
        &self,
        cb: CommandBufferId,
        index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        let mut s = self.state.lock();
        if !s.recording(cb, "draw_indexed") {
            return;
        }
        let in_pass = s.command_buffers.get(&cb).is_some_and(|c| c.in_render_pass);
        if !in_pass {
            s.violation(format!("draw outside a render pass in {cb:?}"));
        }
        s.events.push(Event::DrawIndexed { index_count });
    }

    fn cmd_copy_buffer(
        &self,
        cb: CommandBufferId,
        src: BufferId,
        dst: BufferId,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let mut s = self.state.lock();
        if !s.recording(cb, "copy_buffer") {
            return;
        }
        let in_pass = s.command_buffers.get(&cb).is_some_and(|c| c.in_render_pass);
        if in_pass {
            s.violation(format!("copy inside a render pass in {cb:?}"));
        }
        let src_state = s.buffers.get(&src).map(|b| (b.usage, b.size));
        let dst_state = s.buffers.get(&dst).map(|b| (b.usage, b.size));
        match (src_state, dst_state) {
            (Some((su, ss)), Some((du, ds))) => {
                if !su.contains(BufferUsage::TRANSFER_SRC) {
                    s.violation(format!("copy from {src:?} without TRANSFER_SRC"));
                }
                if !du.contains(BufferUsage::TRANSFER_DST) {
                    s.violation(format!("copy into {dst:?} without TRANSFER_DST"));
                }
                if src_offset + size > ss || dst_offset + size > ds {
                    s.violation(format!("copy of {size} bytes out of range"));
                    return;
                }
            }
            _ => {
                s.violation("copy between unknown buffers");
                return;
            }
        }
        if let Some(c) = s.command_buffers.get_mut(&cb) {
            c.copies.push(CopyOp {
                src,
                dst,
                src_offset,
                dst_offset,
                size,
            });
        }
    }

    fn memory_types(&self) -> Vec<MemoryProperty> {
        self.config.memory_types.clone()
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RenderResult<BufferId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if size == 0 {
            return Err(RenderError::Allocation("zero-sized buffer".into()));
        }
        let id = BufferId(s.id());
        s.buffers.insert(
            id,
            BufferState {
                size,
                usage,
                memory: None,
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut s = self.state.lock();
        if s.buffers.remove(&buffer).is_none() {
            s.violation(format!("destroy of unknown {buffer:?}"));
        }
    }

    fn buffer_memory_requirements(&self, buffer: BufferId) -> MemoryRequirements {
        let size = self
            .state
            .lock()
            .buffers
            .get(&buffer)
            .map_or(0, |b| b.size);
        MemoryRequirements {
            size,
            alignment: 16,
            memory_type_bits: self.memory_type_bits(),
        }
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> RenderResult<MemoryId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let Some(&properties) = self.config.memory_types.get(memory_type_index as usize) else {
            return Err(RenderError::Allocation(format!(
                "memory type {memory_type_index} does not exist"
            )));
        };
        let id = MemoryId(s.id());
        s.memories.insert(
            id,
            MemoryState {
                data: vec![0; size as usize],
                properties,
                mapped: false,
            },
        );
        Ok(id)
    }

    fn free_memory(&self, memory: MemoryId) {
        let mut s = self.state.lock();
        match s.memories.remove(&memory) {
            Some(m) if m.mapped => s.violation(format!("free of mapped {memory:?}")),
            Some(_) => {}
            None => s.violation(format!("free of unknown {memory:?}")),
        }
    }

    fn bind_buffer_memory(&self, buffer: BufferId, memory: MemoryId, offset: u64) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let mem_len = s.memories.get(&memory).map(|m| m.data.len() as u64);
        let Some(mem_len) = mem_len else {
            s.violation(format!("bind of unknown {memory:?}"));
            return Err(RenderError::backend("bind_buffer_memory", "unknown memory"));
        };
        let Some((size, bound)) = s.buffers.get(&buffer).map(|b| (b.size, b.memory.is_some()))
        else {
            s.violation(format!("bind of unknown {buffer:?}"));
            return Err(RenderError::backend("bind_buffer_memory", "unknown buffer"));
        };
        if bound {
            s.violation(format!("{buffer:?} bound twice"));
            return Ok(());
        }
        if offset + size > mem_len {
            return Err(RenderError::backend("bind_buffer_memory", "memory too small"));
        }
        if let Some(b) = s.buffers.get_mut(&buffer) {
            b.memory = Some((memory, offset));
        }
        Ok(())
    }

    fn map_memory(&self, memory: MemoryId, offset: u64, size: u64) -> RenderResult<NonNull<u8>> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let info = s
            .memories
            .get(&memory)
            .map(|m| (m.properties, m.mapped, m.data.len() as u64));
        let Some((properties, mapped, len)) = info else {
            s.violation(format!("map of unknown {memory:?}"));
            return Err(RenderError::backend("map_memory", "unknown memory"));
        };
        if !properties.contains(MemoryProperty::HOST_VISIBLE) {
            s.violation(format!("map of non host-visible {memory:?}"));
            return Err(RenderError::backend("map_memory", "memory is not host visible"));
        }
        if mapped {
            s.violation(format!("{memory:?} mapped twice"));
            return Err(RenderError::backend("map_memory", "already mapped"));
        }
        if offset + size > len {
            return Err(RenderError::backend("map_memory", "range out of bounds"));
        }
        let Some(m) = s.memories.get_mut(&memory) else {
            return Err(RenderError::backend("map_memory", "unknown memory"));
        };
        m.mapped = true;
        // The Vec never reallocates, so the pointer stays valid until the
        // memory is freed.
        let ptr = m.data[offset as usize..].as_mut_ptr();
        NonNull::new(ptr).ok_or_else(|| RenderError::backend("map_memory", "null mapping"))
    }

    fn unmap_memory(&self, memory: MemoryId) {
        let mut s = self.state.lock();
        match s.memories.get_mut(&memory) {
            Some(m) if m.mapped => m.mapped = false,
            Some(_) => s.violation(format!("unmap of unmapped {memory:?}")),
            None => s.violation(format!("unmap of unknown {memory:?}")),
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> RenderResult<ImageId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::InvalidExtent {
                width: desc.width,
                height: desc.height,
            });
        }
        let id = ImageId(s.id());
        s.images.insert(id, None);
        Ok(id)
    }

    fn destroy_image(&self, image: ImageId) {
        let mut s = self.state.lock();
        if s.swapchain_images.contains(&image) {
            s.violation(format!("destroy of swapchain-owned {image:?}"));
            return;
        }
        if s.images.remove(&image).is_none() {
            s.violation(format!("destroy of unknown {image:?}"));
        }
    }

    fn image_memory_requirements(&self, _image: ImageId) -> MemoryRequirements {
        MemoryRequirements {
            size: 256,
            alignment: 256,
            memory_type_bits: self.memory_type_bits(),
        }
    }

    fn bind_image_memory(&self, image: ImageId, memory: MemoryId) -> RenderResult<()> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if !s.memories.contains_key(&memory) {
            s.violation(format!("bind of unknown {memory:?}"));
            return Err(RenderError::backend("bind_image_memory", "unknown memory"));
        }
        match s.images.get_mut(&image) {
            Some(slot) => {
                *slot = Some(memory);
                Ok(())
            }
            None => {
                s.violation(format!("bind of unknown {image:?}"));
                Err(RenderError::backend("bind_image_memory", "unknown image"))
            }
        }
    }

    fn create_image_view(&self, image: ImageId, _format: Format, _aspect: ImageAspect) -> RenderResult<ImageViewId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if !s.images.contains_key(&image) && !s.swapchain_images.contains(&image) {
            s.violation(format!("view of unknown {image:?}"));
            return Err(RenderError::backend("create_image_view", "unknown image"));
        }
        let id = ImageViewId(s.id());
        s.views.insert(id);
        Ok(id)
    }

    fn destroy_image_view(&self, view: ImageViewId) {
        let mut s = self.state.lock();
        if !s.views.remove(&view) {
            s.violation(format!("destroy of unknown {view:?}"));
        }
    }

    fn detect_depth_format(&self) -> Option<Format> {
        Format::DEPTH_CANDIDATES
            .into_iter()
            .find(|f| self.config.depth_formats.contains(f))
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> RenderResult<RenderPassId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let id = RenderPassId(s.id());
        s.render_passes.insert(id);
        Ok(id)
    }

    fn destroy_render_pass(&self, render_pass: RenderPassId) {
        let mut s = self.state.lock();
        if !s.render_passes.remove(&render_pass) {
            s.violation(format!("destroy of unknown {render_pass:?}"));
        }
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassId,
        attachments: &[ImageViewId],
        size: RenderSize,
    ) -> RenderResult<FramebufferId> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if !s.render_passes.contains(&render_pass) {
            s.violation(format!("framebuffer for unknown {render_pass:?}"));
        }
        if let Some(v) = attachments.iter().find(|v| !s.views.contains(*v)) {
            let msg = format!("framebuffer with unknown attachment {v:?}");
            s.violation(msg);
        }
        if size.is_zero() {
            return Err(RenderError::InvalidExtent {
                width: size.width,
                height: size.height,
            });
        }
        let id = FramebufferId(s.id());
        s.framebuffers.insert(id);
        Ok(id)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferId) {
        let mut s = self.state.lock();
        if !s.framebuffers.remove(&framebuffer) {
            s.violation(format!("destroy of unknown {framebuffer:?}"));
        }
    }

    fn surface_capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        let s = self.state.lock();
        s.check_lost()?;
        Ok(SurfaceCapabilities {
            min_image_count: self.config.min_image_count,
            max_image_count: self.config.max_image_count,
            current_extent: self.config.fixed_extent.then_some(s.surface_size),
            min_extent: RenderSize::new(1, 1),
            max_extent: RenderSize::new(MAX_EXTENT, MAX_EXTENT),
            formats: self.config.formats.clone(),
            present_modes: self.config.present_modes.clone(),
        })
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: Option<SwapchainId>,
    ) -> RenderResult<(SwapchainId, Vec<ImageId>)> {
        let mut s = self.state.lock();
        s.check_lost()?;
        if desc.extent.is_zero() {
            return Err(RenderError::InvalidExtent {
                width: desc.extent.width,
                height: desc.extent.height,
            });
        }
        if let Some(old) = old {
            match s.swapchains.get(&old).map(|sc| sc.retired) {
                Some(true) => s.violation(format!("{old:?} replaced twice")),
                Some(false) => {
                    if let Some(sc) = s.swapchains.get_mut(&old) {
                        sc.retired = true;
                    }
                }
                None => s.violation(format!("replacing unknown {old:?}")),
            }
        }
        let images: Vec<ImageId> = (0..desc.image_count).map(|_| ImageId(s.id())).collect();
        s.swapchain_images.extend(images.iter().copied());
        let id = SwapchainId(s.id());
        s.swapchains.insert(
            id,
            SwapchainState {
                images: images.clone(),
                acquired: vec![false; images.len()],
                next: 0,
                extent: desc.extent,
                retired: false,
            },
        );
        s.events.push(Event::SwapchainCreated {
            swapchain: id,
            extent: desc.extent,
            images: images.len(),
            old,
        });
        debug!(?id, extent = %desc.extent, images = images.len(), "headless swapchain created");
        Ok((id, images))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainId) {
        let mut s = self.state.lock();
        match s.swapchains.remove(&swapchain) {
            Some(sc) => {
                for image in sc.images {
                    s.swapchain_images.remove(&image);
                }
            }
            None => s.violation(format!("destroy of unknown {swapchain:?}")),
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainId,
        _timeout_ns: u64,
        signal: SemaphoreId,
    ) -> RenderResult<AcquireOutcome> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let surface = s.surface_size;
        let fixed = self.config.fixed_extent;
        let Some(sc) = s.swapchains.get(&swapchain) else {
            s.violation(format!("acquire from unknown {swapchain:?}"));
            return Err(RenderError::Surface("unknown swapchain".into()));
        };
        let stale = sc.retired || (fixed && sc.extent != surface);

        let refuse = |s: &mut State| {
            s.events.push(Event::Acquire {
                image: None,
                signal,
            });
        };
        if stale || s.faults.acquire_out_of_date > 0 {
            if !stale {
                s.faults.acquire_out_of_date -= 1;
            }
            refuse(&mut *s);
            return Ok(AcquireOutcome::OutOfDate);
        }
        if s.faults.acquire_timeouts > 0 {
            s.faults.acquire_timeouts -= 1;
            refuse(&mut *s);
            return Ok(AcquireOutcome::Timeout);
        }

        let forced = s.faults.forced_acquire.take();
        let Some(sc) = s.swapchains.get_mut(&swapchain) else {
            return Err(RenderError::Surface("unknown swapchain".into()));
        };
        let count = sc.images.len();
        let forced = forced
            .map(|i| i as usize)
            .filter(|&i| i < count && !sc.acquired[i]);
        let free = forced.or_else(|| {
            (0..count)
                .map(|k| (sc.next + k) % count)
                .find(|&i| !sc.acquired[i])
        });
        let Some(index) = free else {
            refuse(&mut *s);
            return Ok(AcquireOutcome::Timeout);
        };
        sc.acquired[index] = true;
        sc.next = (index + 1) % count;

        match s.semaphores.get_mut(&signal) {
            Some(signaled) if !*signaled => *signaled = true,
            Some(_) => s.violation(format!("acquire signals {signal:?} that is already signaled")),
            None => s.violation(format!("acquire signals unknown {signal:?}")),
        }
        let suboptimal = s.faults.acquire_suboptimal > 0;
        if suboptimal {
            s.faults.acquire_suboptimal -= 1;
        }
        s.events.push(Event::Acquire {
            image: Some(index as u32),
            signal,
        });
        Ok(AcquireOutcome::Acquired {
            index: index as u32,
            suboptimal,
        })
    }

    fn queue_present(
        &self,
        _queue: QueueId,
        swapchain: SwapchainId,
        image_index: u32,
        wait: SemaphoreId,
    ) -> RenderResult<PresentOutcome> {
        let mut s = self.state.lock();
        s.check_lost()?;
        let surface = s.surface_size;
        let fixed = self.config.fixed_extent;
        let (was_acquired, stale) = match s.swapchains.get_mut(&swapchain) {
            Some(sc) => {
                let slot = sc.acquired.get_mut(image_index as usize);
                let was = slot.map(|a| std::mem::replace(a, false)).unwrap_or(false);
                (was, sc.retired || (fixed && sc.extent != surface))
            }
            None => {
                s.violation(format!("present to unknown {swapchain:?}"));
                return Err(RenderError::Surface("unknown swapchain".into()));
            }
        };
        if !was_acquired {
            s.violation(format!("present of image {image_index} that was not acquired"));
        }
        match s.semaphores.get_mut(&wait) {
            Some(signaled) if *signaled => *signaled = false,
            Some(_) => s.violation(format!("present waits on {wait:?} that nothing signals")),
            None => s.violation(format!("present waits on unknown {wait:?}")),
        }
        s.events.push(Event::Present {
            image: image_index,
            wait,
        });

        if stale {
            return Ok(PresentOutcome::OutOfDate);
        }
        if s.faults.present_out_of_date > 0 {
            s.faults.present_out_of_date -= 1;
            return Ok(PresentOutcome::OutOfDate);
        }
        if s.faults.present_suboptimal > 0 {
            s.faults.present_suboptimal -= 1;
            return Ok(PresentOutcome::Suboptimal);
        }
        Ok(PresentOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_run_when_the_queue_drains() {
        let d = HeadlessDevice::default();
        let host = MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT;
        let host_index = d.config().memory_types.iter().position(|m| m.contains(host)).unwrap() as u32;

        let src = d.create_buffer(4, BufferUsage::TRANSFER_SRC).unwrap();
        let src_mem = d.allocate_memory(4, host_index).unwrap();
        d.bind_buffer_memory(src, src_mem, 0).unwrap();
        let dst = d.create_buffer(4, BufferUsage::TRANSFER_DST).unwrap();
        let dst_mem = d.allocate_memory(4, 0).unwrap();
        d.bind_buffer_memory(dst, dst_mem, 0).unwrap();

        let ptr = d.map_memory(src_mem, 0, 4).unwrap();
        unsafe { std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr.as_ptr(), 4) };
        d.unmap_memory(src_mem);

        let cb = d.allocate_command_buffer(POOL, true).unwrap();
        d.begin_command_buffer(cb, CommandBufferUsage::ONE_TIME_SUBMIT).unwrap();
        d.cmd_copy_buffer(cb, src, dst, 0, 0, 4);
        d.end_command_buffer(cb).unwrap();
        d.queue_submit(GRAPHICS_QUEUE, cb, None, None, None).unwrap();

        assert_eq!(d.buffer_contents(dst).unwrap(), vec![0; 4]);
        d.queue_wait_idle(GRAPHICS_QUEUE).unwrap();
        assert_eq!(d.buffer_contents(dst).unwrap(), vec![1, 2, 3, 4]);
        assert!(d.violations().is_empty(), "{:?}", d.violations());
    }

    #[test]
    fn mapping_device_local_memory_is_flagged() {
        let d = HeadlessDevice::default();
        let mem = d.allocate_memory(16, 0).unwrap();
        assert!(d.map_memory(mem, 0, 16).is_err());
        assert_eq!(d.violations().len(), 1);
    }

    #[test]
    fn double_destroy_is_flagged() {
        let d = HeadlessDevice::default();
        let f = d.create_fence(true).unwrap();
        d.destroy_fence(f);
        d.destroy_fence(f);
        assert_eq!(d.violations().len(), 1);
    }

    #[test]
    fn semaphore_must_be_signaled_before_wait() {
        let d = HeadlessDevice::default();
        let sem = d.create_semaphore().unwrap();
        let cb = d.allocate_command_buffer(POOL, true).unwrap();
        d.begin_command_buffer(cb, CommandBufferUsage::empty()).unwrap();
        d.end_command_buffer(cb).unwrap();
        d.queue_submit(
            GRAPHICS_QUEUE,
            cb,
            Some((sem, PipelineStage::COLOR_ATTACHMENT_OUTPUT)),
            None,
            None,
        )
        .unwrap();
        assert!(d.violations()[0].contains("nothing signals"));
    }

    #[test]
    fn rendering_to_a_busy_framebuffer_is_flagged() {
        let d = HeadlessDevice::default();
        let rp = d
            .create_render_pass(&RenderPassDesc {
                color_format: Format::B8G8R8A8Unorm,
                depth_format: Format::D32Sfloat,
            })
            .unwrap();
        let size = RenderSize::new(4, 4);
        let fb = d.create_framebuffer(rp, &[], size).unwrap();
        let clear = ClearValues {
            color: [0.0; 4],
            depth: 1.0,
            stencil: 0,
        };
        let record = |cb| {
            d.begin_command_buffer(cb, CommandBufferUsage::empty()).unwrap();
            d.cmd_begin_render_pass(cb, rp, fb, &Rect2D::from_size(size), &clear);
            d.cmd_end_render_pass(cb);
            d.end_command_buffer(cb).unwrap();
        };

        let first = d.allocate_command_buffer(POOL, true).unwrap();
        record(first);
        d.queue_submit(GRAPHICS_QUEUE, first, None, None, None).unwrap();
        assert!(d.violations().is_empty());

        let second = d.allocate_command_buffer(POOL, true).unwrap();
        record(second);
        assert_eq!(d.violations().len(), 1);
        assert!(d.violations()[0].contains("pending"));

        d.queue_wait_idle(GRAPHICS_QUEUE).unwrap();
        record(first);
        assert_eq!(d.violations().len(), 1);
    }

    #[test]
    fn forced_acquire_overrides_round_robin_once() {
        let d = HeadlessDevice::default();
        let desc = SwapchainDesc {
            image_count: 3,
            surface_format: d.config().formats[0],
            present_mode: PresentMode::Fifo,
            extent: RenderSize::new(800, 600),
        };
        let (sc, _) = d.create_swapchain(&desc, None).unwrap();
        let a = d.create_semaphore().unwrap();
        let b = d.create_semaphore().unwrap();

        d.faults().force_acquire(2);
        assert_eq!(
            d.acquire_next_image(sc, u64::MAX, a).unwrap(),
            AcquireOutcome::Acquired {
                index: 2,
                suboptimal: false
            }
        );
        // back to round-robin after the forced image
        assert_eq!(
            d.acquire_next_image(sc, u64::MAX, b).unwrap(),
            AcquireOutcome::Acquired {
                index: 0,
                suboptimal: false
            }
        );
    }

    #[test]
    fn fixed_extent_surface_reports_out_of_date_after_resize() {
        let d = HeadlessDevice::new(HeadlessConfig {
            fixed_extent: true,
            ..HeadlessConfig::default()
        });
        let desc = SwapchainDesc {
            image_count: 3,
            surface_format: d.config().formats[0],
            present_mode: PresentMode::Fifo,
            extent: RenderSize::new(800, 600),
        };
        let (sc, _) = d.create_swapchain(&desc, None).unwrap();
        let sem = d.create_semaphore().unwrap();
        d.set_surface_size(RenderSize::new(1024, 768));
        assert_eq!(
            d.acquire_next_image(sc, u64::MAX, sem).unwrap(),
            AcquireOutcome::OutOfDate
        );
    }
}
