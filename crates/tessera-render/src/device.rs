// SPDX-License-Identifier: CEPL-1.0
//! The backend seam.
//!
//! [`Device`] is the narrow set of GPU operations the frame core needs.
//! Handles are plain `Copy` values; whoever creates one is responsible for
//! destroying it, and the wrappers in this crate do that in `Drop`.
//!
//! Flag types reuse the Vulkan bit values so the Vulkan backend converts them
//! with `from_raw`.
use std::fmt::Debug;
use std::ptr::NonNull;

use bitflags::bitflags;

use crate::error::RenderResult;
use crate::RenderSize;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0x0000_0001;
        const TRANSFER_DST = 0x0000_0002;
        const UNIFORM      = 0x0000_0010;
        const INDEX        = 0x0000_0040;
        const VERTEX       = 0x0000_0080;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MemoryProperty: u32 {
        const DEVICE_LOCAL  = 0x0000_0001;
        const HOST_VISIBLE  = 0x0000_0002;
        const HOST_COHERENT = 0x0000_0004;
        const HOST_CACHED   = 0x0000_0008;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CommandBufferUsage: u32 {
        const ONE_TIME_SUBMIT      = 0x0000_0001;
        const RENDER_PASS_CONTINUE = 0x0000_0002;
        const SIMULTANEOUS_USE     = 0x0000_0004;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE             = 0x0000_0001;
        const COLOR_ATTACHMENT_OUTPUT = 0x0000_0400;
        const TRANSFER                = 0x0000_1000;
        const BOTTOM_OF_PIPE          = 0x0000_2000;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC             = 0x0000_0001;
        const TRANSFER_DST             = 0x0000_0002;
        const SAMPLED                  = 0x0000_0004;
        const COLOR_ATTACHMENT         = 0x0000_0010;
        const DEPTH_STENCIL_ATTACHMENT = 0x0000_0020;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Undefined,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    D32Sfloat,
    D32SfloatS8Uint,
    D24UnormS8Uint,
    /// Anything the core has no opinion about, carried as the raw backend value.
    Other(i32),
}

impl Format {
    /// Depth formats probed in order when picking the depth attachment.
    pub const DEPTH_CANDIDATES: [Format; 3] = [
        Format::D32Sfloat,
        Format::D32SfloatS8Uint,
        Format::D24UnormS8Uint,
    ];

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D32Sfloat | Format::D32SfloatS8Uint | Format::D24UnormS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D32SfloatS8Uint | Format::D24UnormS8Uint)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: Format,
    pub color_space: ColorSpace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Everything the swapchain needs to know about the surface, queried fresh on
/// every (re)creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// Zero means no upper limit.
    pub max_image_count: u32,
    /// `None` when the surface lets the swapchain pick its extent.
    pub current_extent: Option<RenderSize>,
    pub min_extent: RenderSize,
    pub max_extent: RenderSize,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with the origin moved to the top-left corner:
    /// `y` starts at the bottom edge and the height is negated.
    pub fn top_left(size: RenderSize) -> Self {
        Self {
            x: 0.0,
            y: size.height as f32,
            width: size.width as f32,
            height: -(size.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_size(size: RenderSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    pub memory_type_bits: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageAspect {
    Color,
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub usage: ImageUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: Format,
    pub depth_format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub image_count: u32,
    pub surface_format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: RenderSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceWait {
    Signaled,
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `suboptimal` images are still presentable.
    Acquired { index: u32, suboptimal: bool },
    OutOfDate,
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Marker for backend handle types.
pub trait Handle: Copy + Eq + Debug + Send + Sync + 'static {}
impl<T: Copy + Eq + Debug + Send + Sync + 'static> Handle for T {}

/// GPU operations the frame core is written against.
///
/// Methods take `&self`; a backend either forwards to an externally
/// synchronized API or guards its own state. `destroy_*`/`free_*` never fail.
/// Soft presentation results are returned as values, hard failures as
/// [`RenderError`](crate::RenderError).
pub trait Device: Send + Sync + 'static {
    type Queue: Handle;
    type Fence: Handle;
    type Semaphore: Handle;
    type CommandPool: Handle;
    type CommandBuffer: Handle;
    type Buffer: Handle;
    type Memory: Handle;
    type Image: Handle;
    type ImageView: Handle;
    type RenderPass: Handle;
    type Framebuffer: Handle;
    type Pipeline: Handle;
    type Swapchain: Handle;

    fn name(&self) -> &str;

    // device / queues
    fn wait_idle(&self) -> RenderResult<()>;
    fn queue_wait_idle(&self, queue: Self::Queue) -> RenderResult<()>;
    fn graphics_queue(&self) -> Self::Queue;
    fn present_queue(&self) -> Self::Queue;
    fn graphics_command_pool(&self) -> Self::CommandPool;

    // sync
    fn create_fence(&self, signaled: bool) -> RenderResult<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);
    fn wait_for_fence(&self, fence: Self::Fence, timeout_ns: u64) -> RenderResult<FenceWait>;
    fn reset_fence(&self, fence: Self::Fence) -> RenderResult<()>;
    fn create_semaphore(&self) -> RenderResult<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);

    // command buffers
    fn allocate_command_buffer(
        &self,
        pool: Self::CommandPool,
        primary: bool,
    ) -> RenderResult<Self::CommandBuffer>;
    fn free_command_buffer(&self, pool: Self::CommandPool, cb: Self::CommandBuffer);
    fn begin_command_buffer(
        &self,
        cb: Self::CommandBuffer,
        usage: CommandBufferUsage,
    ) -> RenderResult<()>;
    fn end_command_buffer(&self, cb: Self::CommandBuffer) -> RenderResult<()>;
    fn reset_command_buffer(&self, cb: Self::CommandBuffer) -> RenderResult<()>;
    fn queue_submit(
        &self,
        queue: Self::Queue,
        cb: Self::CommandBuffer,
        wait: Option<(Self::Semaphore, PipelineStage)>,
        signal: Option<Self::Semaphore>,
        fence: Option<Self::Fence>,
    ) -> RenderResult<()>;

    // recording
    fn cmd_set_viewport(&self, cb: Self::CommandBuffer, viewport: &Viewport);
    fn cmd_set_scissor(&self, cb: Self::CommandBuffer, scissor: &Rect2D);
    fn cmd_begin_render_pass(
        &self,
        cb: Self::CommandBuffer,
        render_pass: Self::RenderPass,
        framebuffer: Self::Framebuffer,
        area: &Rect2D,
        clear: &ClearValues,
    );
    fn cmd_end_render_pass(&self, cb: Self::CommandBuffer);
    fn cmd_bind_pipeline(&self, cb: Self::CommandBuffer, pipeline: Self::Pipeline);
    fn cmd_bind_vertex_buffer(&self, cb: Self::CommandBuffer, buffer: Self::Buffer, offset: u64);
    fn cmd_bind_index_buffer(
        &self,
        cb: Self::CommandBuffer,
        buffer: Self::Buffer,
        offset: u64,
        index_type: IndexType,
    );
    fn cmd_draw_indexed(
        &self,
        cb: Self::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_copy_buffer(
        &self,
        cb: Self::CommandBuffer,
        src: Self::Buffer,
        dst: Self::Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    );

    // memory
    /// Property flags of every memory type, indexed by memory type index.
    fn memory_types(&self) -> Vec<MemoryProperty>;
    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RenderResult<Self::Buffer>;
    fn destroy_buffer(&self, buffer: Self::Buffer);
    fn buffer_memory_requirements(&self, buffer: Self::Buffer) -> MemoryRequirements;
    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> RenderResult<Self::Memory>;
    fn free_memory(&self, memory: Self::Memory);
    fn bind_buffer_memory(
        &self,
        buffer: Self::Buffer,
        memory: Self::Memory,
        offset: u64,
    ) -> RenderResult<()>;
    /// Maps `size` bytes at `offset`. The pointer stays valid until
    /// `unmap_memory`.
    fn map_memory(&self, memory: Self::Memory, offset: u64, size: u64)
        -> RenderResult<NonNull<u8>>;
    fn unmap_memory(&self, memory: Self::Memory);

    // images
    fn create_image(&self, desc: &ImageDesc) -> RenderResult<Self::Image>;
    fn destroy_image(&self, image: Self::Image);
    fn image_memory_requirements(&self, image: Self::Image) -> MemoryRequirements;
    fn bind_image_memory(&self, image: Self::Image, memory: Self::Memory) -> RenderResult<()>;
    fn create_image_view(
        &self,
        image: Self::Image,
        format: Format,
        aspect: ImageAspect,
    ) -> RenderResult<Self::ImageView>;
    fn destroy_image_view(&self, view: Self::ImageView);
    /// First of [`Format::DEPTH_CANDIDATES`] usable as a depth attachment.
    fn detect_depth_format(&self) -> Option<Format>;

    // passes
    fn create_render_pass(&self, desc: &RenderPassDesc) -> RenderResult<Self::RenderPass>;
    fn destroy_render_pass(&self, render_pass: Self::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: Self::RenderPass,
        attachments: &[Self::ImageView],
        size: RenderSize,
    ) -> RenderResult<Self::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);

    // presentation
    fn surface_capabilities(&self) -> RenderResult<SurfaceCapabilities>;
    /// Images belong to the swapchain and go away with it.
    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: Option<Self::Swapchain>,
    ) -> RenderResult<(Self::Swapchain, Vec<Self::Image>)>;
    fn destroy_swapchain(&self, swapchain: Self::Swapchain);
    fn acquire_next_image(
        &self,
        swapchain: Self::Swapchain,
        timeout_ns: u64,
        signal: Self::Semaphore,
    ) -> RenderResult<AcquireOutcome>;
    fn queue_present(
        &self,
        queue: Self::Queue,
        swapchain: Self::Swapchain,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> RenderResult<PresentOutcome>;
}
