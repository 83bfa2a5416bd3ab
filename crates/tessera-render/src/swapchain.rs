// SPDX-License-Identifier: CEPL-1.0
//! Presentable images, their views and framebuffers, and the shared depth
//! attachment.
//!
//! Selection policy (format, present mode, extent, image count) lives in free
//! functions so it can be checked without a device.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::buffer::find_memory_index;
use crate::config::{FrameConfig, VsyncMode};
use crate::device::{
    AcquireOutcome, ColorSpace, Device, Format, ImageAspect, ImageDesc, ImageUsage,
    MemoryProperty, PresentMode, PresentOutcome, SurfaceCapabilities, SurfaceFormat,
    SwapchainDesc,
};
use crate::error::{RenderError, RenderResult};
use crate::framebuffer::Framebuffer;
use crate::renderpass::RenderPass;
use crate::RenderSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    pub preferred_image_count: Option<u32>,
}

impl From<&FrameConfig> for SwapchainConfig {
    fn from(cfg: &FrameConfig) -> Self {
        Self {
            vsync: cfg.vsync,
            vsync_mode: cfg.vsync_mode,
            preferred_image_count: cfg.preferred_image_count,
        }
    }
}

/// `B8G8R8A8_UNORM` with sRGB non-linear, then the sRGB 8-bit formats, then
/// whatever the driver lists first.
pub fn choose_surface_format(formats: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    let find = |pred: &dyn Fn(&SurfaceFormat) -> bool| formats.iter().copied().find(|f| pred(f));
    find(&|f| f.format == Format::B8G8R8A8Unorm && f.color_space == ColorSpace::SrgbNonlinear)
        .or_else(|| find(&|f| f.format == Format::B8G8R8A8Srgb))
        .or_else(|| find(&|f| f.format == Format::R8G8B8A8Srgb))
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[PresentMode], vsync: bool, mode: VsyncMode) -> PresentMode {
    let order: &[PresentMode] = match (vsync, mode) {
        (false, _) => &[
            PresentMode::Immediate,
            PresentMode::Mailbox,
            PresentMode::Fifo,
        ],
        (true, VsyncMode::Mailbox) => &[PresentMode::Mailbox, PresentMode::Fifo],
        (true, VsyncMode::Fifo) => &[PresentMode::Fifo, PresentMode::Mailbox],
    };
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(PresentMode::Fifo)
}

pub fn extent_from_caps(caps: &SurfaceCapabilities, want: RenderSize) -> RenderSize {
    match caps.current_extent {
        Some(extent) => extent,
        None => RenderSize {
            width: want
                .width
                .clamp(caps.min_extent.width, caps.max_extent.width),
            height: want
                .height
                .clamp(caps.min_extent.height, caps.max_extent.height),
        },
    }
}

/// One more than the minimum, or the preferred count when larger, capped by
/// the maximum (0 means uncapped).
pub fn choose_image_count(caps: &SurfaceCapabilities, preferred: Option<u32>) -> u32 {
    let want = (caps.min_image_count + 1).max(preferred.unwrap_or(0));
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub struct PresentableImage<D: Device> {
    pub image: D::Image,
    pub view: D::ImageView,
    pub framebuffer: Option<Framebuffer<D>>,
}

pub struct DepthAttachment<D: Device> {
    device: Arc<D>,
    pub format: Format,
    pub image: D::Image,
    pub memory: D::Memory,
    pub view: D::ImageView,
}

impl<D: Device> DepthAttachment<D> {
    pub fn new(device: Arc<D>, size: RenderSize, format: Format) -> RenderResult<Self> {
        let image = device.create_image(&ImageDesc {
            width: size.width,
            height: size.height,
            format,
            usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
        })?;
        let reqs = device.image_memory_requirements(image);
        let Some(index) = find_memory_index(
            &device.memory_types(),
            reqs.memory_type_bits,
            MemoryProperty::DEVICE_LOCAL,
        ) else {
            device.destroy_image(image);
            return Err(RenderError::NoSuitableMemoryType {
                type_bits: reqs.memory_type_bits,
                required: MemoryProperty::DEVICE_LOCAL,
            });
        };
        let memory = match device.allocate_memory(reqs.size, index) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_image(image);
                return Err(RenderError::Allocation(e.to_string()));
            }
        };
        let view = device
            .bind_image_memory(image, memory)
            .and_then(|_| device.create_image_view(image, format, ImageAspect::Depth));
        match view {
            Ok(view) => Ok(Self {
                device,
                format,
                image,
                memory,
                view,
            }),
            Err(e) => {
                device.free_memory(memory);
                device.destroy_image(image);
                Err(e)
            }
        }
    }
}

impl<D: Device> Drop for DepthAttachment<D> {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
        self.device.destroy_image(self.image);
        self.device.free_memory(self.memory);
    }
}

struct Built<D: Device> {
    handle: D::Swapchain,
    surface_format: SurfaceFormat,
    present_mode: PresentMode,
    extent: RenderSize,
    images: Vec<PresentableImage<D>>,
    depth: DepthAttachment<D>,
}

pub struct Swapchain<D: Device> {
    device: Arc<D>,
    handle: D::Swapchain,
    config: SwapchainConfig,
    surface_format: SurfaceFormat,
    present_mode: PresentMode,
    extent: RenderSize,
    images: Vec<PresentableImage<D>>,
    depth: DepthAttachment<D>,
    max_frames_in_flight: usize,
}

impl<D: Device> Swapchain<D> {
    /// Creates M presentable images with views and a depth attachment;
    /// N = M - 1 frames may be in flight. Zero-sized requests are rejected.
    pub fn create(device: Arc<D>, size: RenderSize, config: SwapchainConfig) -> RenderResult<Self> {
        let built = build(&device, size, &config, None)?;
        let max_frames_in_flight = frames_in_flight(built.images.len());
        info!(
            extent = %built.extent,
            images = built.images.len(),
            frames_in_flight = max_frames_in_flight,
            format = ?built.surface_format.format,
            present_mode = ?built.present_mode,
            "swapchain created"
        );
        Ok(Self {
            device,
            handle: built.handle,
            config,
            surface_format: built.surface_format,
            present_mode: built.present_mode,
            extent: built.extent,
            images: built.images,
            depth: built.depth,
            max_frames_in_flight,
        })
    }

    /// Rebuilds images, views and depth at `size`, handing the current
    /// swapchain to the driver as the one being replaced. Framebuffers are
    /// dropped; call [`Self::regenerate_framebuffers`] afterwards. The caller
    /// is expected to have waited for the device to go idle.
    pub fn recreate(&mut self, size: RenderSize) -> RenderResult<()> {
        let built = build(&self.device, size, &self.config, Some(self.handle))?;

        self.release_images();
        self.device.destroy_swapchain(self.handle);

        self.handle = built.handle;
        self.surface_format = built.surface_format;
        self.present_mode = built.present_mode;
        self.extent = built.extent;
        self.images = built.images;
        self.depth = built.depth;
        self.max_frames_in_flight = frames_in_flight(self.images.len());
        info!(
            extent = %self.extent,
            images = self.images.len(),
            frames_in_flight = self.max_frames_in_flight,
            "swapchain recreated"
        );
        Ok(())
    }

    pub fn set_config(&mut self, config: SwapchainConfig) {
        self.config = config;
    }

    pub fn acquire_next_image(
        &self,
        timeout_ns: u64,
        signal: D::Semaphore,
    ) -> RenderResult<AcquireOutcome> {
        let outcome = self
            .device
            .acquire_next_image(self.handle, timeout_ns, signal)?;
        match outcome {
            AcquireOutcome::OutOfDate => debug!("acquire: swapchain out of date"),
            AcquireOutcome::Timeout => warn!(timeout_ns, "acquire timed out"),
            AcquireOutcome::Acquired {
                suboptimal: true, ..
            } => debug!("acquire: suboptimal"),
            AcquireOutcome::Acquired { .. } => {}
        }
        Ok(outcome)
    }

    pub fn present(
        &self,
        queue: D::Queue,
        wait: D::Semaphore,
        image_index: u32,
    ) -> RenderResult<PresentOutcome> {
        let outcome = self
            .device
            .queue_present(queue, self.handle, image_index, wait)?;
        if outcome != PresentOutcome::Presented {
            warn!(?outcome, image_index, "present needs a swapchain recreation");
        }
        Ok(outcome)
    }

    /// One framebuffer per image over `[color view, depth view]`.
    pub fn regenerate_framebuffers(&mut self, render_pass: &RenderPass<D>) -> RenderResult<()> {
        for img in &mut self.images {
            img.framebuffer = None;
            img.framebuffer = Some(Framebuffer::new(
                self.device.clone(),
                render_pass,
                self.extent,
                vec![img.view, self.depth.view],
            )?);
        }
        debug!(count = self.images.len(), "framebuffers regenerated");
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> D::Swapchain {
        self.handle
    }

    pub fn extent(&self) -> RenderSize {
        self.extent
    }

    pub fn surface_format(&self) -> SurfaceFormat {
        self.surface_format
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    pub fn depth_format(&self) -> Format {
        self.depth.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    pub fn images(&self) -> &[PresentableImage<D>] {
        &self.images
    }

    pub fn framebuffer(&self, image_index: usize) -> Option<&Framebuffer<D>> {
        self.images.get(image_index)?.framebuffer.as_ref()
    }

    fn release_images(&mut self) {
        for img in self.images.drain(..) {
            drop(img.framebuffer);
            self.device.destroy_image_view(img.view);
        }
    }
}

impl<D: Device> Drop for Swapchain<D> {
    fn drop(&mut self) {
        self.release_images();
        self.device.destroy_swapchain(self.handle);
    }
}

fn frames_in_flight(image_count: usize) -> usize {
    image_count.saturating_sub(1).max(1)
}

fn build<D: Device>(
    device: &Arc<D>,
    size: RenderSize,
    config: &SwapchainConfig,
    old: Option<D::Swapchain>,
) -> RenderResult<Built<D>> {
    if size.is_zero() {
        return Err(RenderError::InvalidExtent {
            width: size.width,
            height: size.height,
        });
    }
    let caps = device.surface_capabilities()?;
    let surface_format = choose_surface_format(&caps.formats)
        .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
    let present_mode = choose_present_mode(&caps.present_modes, config.vsync, config.vsync_mode);
    let extent = extent_from_caps(&caps, size);
    if extent.is_zero() {
        return Err(RenderError::InvalidExtent {
            width: extent.width,
            height: extent.height,
        });
    }
    let depth_format = device
        .detect_depth_format()
        .ok_or_else(|| RenderError::Surface("no supported depth format".into()))?;
    let image_count = choose_image_count(&caps, config.preferred_image_count);

    let desc = SwapchainDesc {
        image_count,
        surface_format,
        present_mode,
        extent,
    };
    let (handle, raw_images) = device.create_swapchain(&desc, old)?;

    let mut images = Vec::with_capacity(raw_images.len());
    for image in raw_images {
        match device.create_image_view(image, surface_format.format, ImageAspect::Color) {
            Ok(view) => images.push(PresentableImage {
                image,
                view,
                framebuffer: None,
            }),
            Err(e) => {
                for img in images {
                    device.destroy_image_view(img.view);
                }
                device.destroy_swapchain(handle);
                return Err(e);
            }
        }
    }

    let depth = match DepthAttachment::new(device.clone(), extent, depth_format) {
        Ok(d) => d,
        Err(e) => {
            for img in images {
                device.destroy_image_view(img.view);
            }
            device.destroy_swapchain(handle);
            return Err(e);
        }
    };

    Ok(Built {
        handle,
        surface_format,
        present_mode,
        extent,
        images,
        depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: min,
            max_image_count: max,
            current_extent: None,
            min_extent: RenderSize::new(1, 1),
            max_extent: RenderSize::new(4096, 4096),
            formats: vec![],
            present_modes: vec![PresentMode::Fifo],
        }
    }

    fn sf(format: Format, color_space: ColorSpace) -> SurfaceFormat {
        SurfaceFormat {
            format,
            color_space,
        }
    }

    #[test]
    fn image_count_policy() {
        assert_eq!(choose_image_count(&caps(2, 8), None), 3);
        assert_eq!(choose_image_count(&caps(3, 3), None), 3);
        assert_eq!(choose_image_count(&caps(2, 0), None), 3);
        assert_eq!(choose_image_count(&caps(2, 0), Some(5)), 5);
        assert_eq!(choose_image_count(&caps(2, 4), Some(6)), 4);
        // preferred below min + 1 does not shrink the chain
        assert_eq!(choose_image_count(&caps(3, 8), Some(2)), 4);
    }

    #[test]
    fn frames_in_flight_is_one_less_than_images() {
        assert_eq!(frames_in_flight(4), 3);
        assert_eq!(frames_in_flight(3), 2);
        assert_eq!(frames_in_flight(1), 1);
    }

    #[test]
    fn surface_format_preference() {
        let formats = [
            sf(Format::R8G8B8A8Srgb, ColorSpace::SrgbNonlinear),
            sf(Format::B8G8R8A8Srgb, ColorSpace::SrgbNonlinear),
            sf(Format::B8G8R8A8Unorm, ColorSpace::SrgbNonlinear),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(Format::B8G8R8A8Unorm)
        );
        assert_eq!(
            choose_surface_format(&formats[..2]).map(|f| f.format),
            Some(Format::B8G8R8A8Srgb)
        );
        let odd = [sf(Format::Other(64), ColorSpace::Other(7))];
        assert_eq!(choose_surface_format(&odd), Some(odd[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_policy() {
        let all = [
            PresentMode::Fifo,
            PresentMode::Mailbox,
            PresentMode::Immediate,
        ];
        assert_eq!(
            choose_present_mode(&all, true, VsyncMode::Mailbox),
            PresentMode::Mailbox
        );
        assert_eq!(
            choose_present_mode(&all, true, VsyncMode::Fifo),
            PresentMode::Fifo
        );
        assert_eq!(
            choose_present_mode(&all, false, VsyncMode::Fifo),
            PresentMode::Immediate
        );
        assert_eq!(
            choose_present_mode(&[PresentMode::Fifo], false, VsyncMode::Mailbox),
            PresentMode::Fifo
        );
        assert_eq!(
            choose_present_mode(&[], true, VsyncMode::Mailbox),
            PresentMode::Fifo
        );
    }

    #[test]
    fn extent_uses_current_or_clamps() {
        let mut c = caps(2, 3);
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(9000, 0)),
            RenderSize::new(4096, 1)
        );
        c.current_extent = Some(RenderSize::new(640, 480));
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(1024, 768)),
            RenderSize::new(640, 480)
        );
    }
}
