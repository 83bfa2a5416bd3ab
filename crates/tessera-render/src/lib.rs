// SPDX-License-Identifier: CEPL-1.0
//! Frame lifecycle and swapchain synchronization core.
//!
//! Everything here is generic over [`Device`], the seam a GPU backend
//! implements. `tessera-render-vk` provides the Vulkan one; the `headless`
//! feature adds a software device used by the tests and by headless runs.
use anyhow::Result;

mod buffer;
mod command;
mod config;
mod device;
mod error;
mod frame;
mod framebuffer;
mod frontend;
mod geometry;
#[cfg(any(test, feature = "headless"))]
pub mod headless;
mod renderpass;
mod resize;
mod swapchain;
mod sync;

pub use buffer::{find_memory_index, Buffer};
pub use command::{CommandUnit, CommandUnitState};
pub use config::{FrameConfig, VsyncMode};
pub use device::{
    AcquireOutcome, BufferUsage, ClearValues, ColorSpace, CommandBufferUsage, Device, FenceWait,
    Format, ImageAspect, ImageDesc, ImageUsage, IndexType, MemoryProperty, MemoryRequirements,
    PipelineStage, PresentMode, PresentOutcome, Rect2D, RenderPassDesc, SurfaceCapabilities,
    SurfaceFormat, SwapchainDesc, Viewport,
};
pub use error::{RenderError, RenderResult};
pub use frame::{DeferReason, FrameOrchestrator, FrameSlot, FrameState, FrameStatus};
pub use framebuffer::Framebuffer;
pub use frontend::{RenderPacket, RendererFrontend};
pub use geometry::{ObjectGeometry, Vertex3d, QUAD_INDICES, QUAD_VERTICES};
pub use renderpass::RenderPass;
pub use resize::ResizeSignal;
pub use swapchain::{
    choose_image_count, choose_present_mode, choose_surface_format, extent_from_caps,
    DepthAttachment, PresentableImage, Swapchain, SwapchainConfig,
};
pub use sync::{Fence, Semaphore};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension; nothing can be created
    /// or recreated at that size.
    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Contract the application driver talks to.
pub trait Renderer {
    /// Begin-frame, draw, end-frame. A deferred frame is still `Ok`; an error
    /// is fatal and the driver should leave its loop.
    fn draw_frame(&mut self, packet: &RenderPacket) -> Result<()>;

    /// Records a new framebuffer size. Never recreates anything itself; the
    /// next `draw_frame` picks it up.
    fn on_resized(&mut self, size: RenderSize);

    fn set_clear_color(&mut self, rgba: [f32; 4]);

    fn frame_number(&self) -> u64;

    /// Waits for the GPU to go idle. Resources are released when the
    /// renderer is dropped.
    fn shutdown(&mut self);
}
