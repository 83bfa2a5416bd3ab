// SPDX-License-Identifier: CEPL-1.0
use std::ptr::NonNull;

use anyhow::Result;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tessera_render::{
    AcquireOutcome, BufferUsage, ClearValues, CommandBufferUsage, Device, FenceWait, Format,
    ImageAspect, ImageDesc, IndexType, MemoryProperty, MemoryRequirements, PipelineStage,
    PresentOutcome, Rect2D, RenderError, RenderPassDesc, RenderResult, RenderSize,
    SurfaceCapabilities, SwapchainDesc, Viewport,
};
use tracing::{debug, info, warn};

use crate::convert::*;
use crate::instance::{self, DebugState};

/// [`Device`] over a Vulkan instance, surface and logical device.
///
/// One graphics queue serves graphics and present. Queue and command-pool
/// access is externally synchronized in Vulkan, so both sit behind a lock.
pub struct VkDevice {
    _entry: Entry,
    instance: Instance,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    debug: DebugState,

    phys: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    gpu_name: String,

    swapchain_loader: swapchain::Device,
    pool: vk::CommandPool,
    memory_types: Vec<MemoryProperty>,

    queue_lock: Mutex<()>,
    pool_lock: Mutex<()>,
}

impl VkDevice {
    /// Instance, surface, physical device, logical device and command pool,
    /// in that order.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &str,
    ) -> Result<Self> {
        unsafe {
            let bundle = instance::init_instance_and_surface(window, display, app_name)?;
            let dev = match instance::create_logical_device(&bundle) {
                Ok(d) => d,
                Err(e) => {
                    instance::destroy_debug_messenger(&bundle.debug);
                    bundle
                        .surface_loader
                        .destroy_surface(bundle.surface, None);
                    bundle.instance.destroy_instance(None);
                    return Err(e);
                }
            };
            let swapchain_loader = swapchain::Device::new(&bundle.instance, &dev.device);
            let pool = match instance::create_command_pool(&dev.device, dev.queue_family) {
                Ok(p) => p,
                Err(e) => {
                    dev.device.destroy_device(None);
                    instance::destroy_debug_messenger(&bundle.debug);
                    bundle
                        .surface_loader
                        .destroy_surface(bundle.surface, None);
                    bundle.instance.destroy_instance(None);
                    return Err(e.context("create_command_pool"));
                }
            };

            let mem = bundle
                .instance
                .get_physical_device_memory_properties(dev.phys);
            let memory_types = mem.memory_types[..mem.memory_type_count as usize]
                .iter()
                .map(|t| memory_property_from_vk(t.property_flags))
                .collect();

            Ok(Self {
                _entry: bundle.entry,
                instance: bundle.instance,
                surface_loader: bundle.surface_loader,
                surface: bundle.surface,
                debug: bundle.debug,
                phys: dev.phys,
                device: dev.device,
                queue_family: dev.queue_family,
                queue: dev.queue,
                gpu_name: dev.device_name,
                swapchain_loader,
                pool,
                memory_types,
                queue_lock: Mutex::new(()),
                pool_lock: Mutex::new(()),
            })
        }
    }

    pub fn gpu_name(&self) -> &str {
        &self.gpu_name
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Raw device for code that records its own Vulkan commands (pipeline
    /// creation lives outside the frame core).
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }
}

// STRICT TEARDOWN ORDER:
// everything created from the device is owned by the frame core and gone by
// the time the last `Arc<VkDevice>` drops. Pool, device, debug messenger,
// surface, instance.
impl Drop for VkDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle during teardown: {e}");
            }
            self.device.destroy_command_pool(self.pool, None);
            self.device.destroy_device(None);
            instance::destroy_debug_messenger(&self.debug);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        info!("Vulkan device destroyed");
    }
}

impl Device for VkDevice {
    type Queue = vk::Queue;
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandPool = vk::CommandPool;
    type CommandBuffer = vk::CommandBuffer;
    type Buffer = vk::Buffer;
    type Memory = vk::DeviceMemory;
    type Image = vk::Image;
    type ImageView = vk::ImageView;
    type RenderPass = vk::RenderPass;
    type Framebuffer = vk::Framebuffer;
    type Pipeline = vk::Pipeline;
    type Swapchain = vk::SwapchainKHR;

    fn name(&self) -> &str {
        "vulkan"
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let _queue = self.queue_lock.lock();
        unsafe { self.device.device_wait_idle() }.map_err(|e| map_result("device_wait_idle", e))
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> RenderResult<()> {
        let _queue = self.queue_lock.lock();
        unsafe { self.device.queue_wait_idle(queue) }.map_err(|e| map_result("queue_wait_idle", e))
    }

    fn graphics_queue(&self) -> vk::Queue {
        self.queue
    }

    fn present_queue(&self) -> vk::Queue {
        self.queue
    }

    fn graphics_command_pool(&self) -> vk::CommandPool {
        self.pool
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&ci, None) }.map_err(|e| map_result("create_fence", e))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<FenceWait> {
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(FenceWait::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceWait::TimedOut),
            Err(e) => Err(map_result("wait_for_fences", e)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(|e| map_result("reset_fences", e))
    }

    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        let ci = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&ci, None) }
            .map_err(|e| map_result("create_semaphore", e))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn allocate_command_buffer(
        &self,
        pool: vk::CommandPool,
        primary: bool,
    ) -> RenderResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: if primary {
                vk::CommandBufferLevel::PRIMARY
            } else {
                vk::CommandBufferLevel::SECONDARY
            },
            command_buffer_count: 1,
            ..Default::default()
        };
        let _pool = self.pool_lock.lock();
        let bufs = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| map_result("allocate_command_buffers", e))?;
        bufs.into_iter()
            .next()
            .ok_or_else(|| RenderError::backend("allocate_command_buffers", "no buffer returned"))
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, cb: vk::CommandBuffer) {
        let _pool = self.pool_lock.lock();
        unsafe { self.device.free_command_buffers(pool, &[cb]) }
    }

    fn begin_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        usage: CommandBufferUsage,
    ) -> RenderResult<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: command_usage_to_vk(usage),
            ..Default::default()
        };
        unsafe { self.device.begin_command_buffer(cb, &begin) }
            .map_err(|e| map_result("begin_command_buffer", e))
    }

    fn end_command_buffer(&self, cb: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.device.end_command_buffer(cb) }
            .map_err(|e| map_result("end_command_buffer", e))
    }

    fn reset_command_buffer(&self, cb: vk::CommandBuffer) -> RenderResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| map_result("reset_command_buffer", e))
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        cb: vk::CommandBuffer,
        wait: Option<(vk::Semaphore, PipelineStage)>,
        signal: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> RenderResult<()> {
        let wait_sems: Vec<vk::Semaphore> = wait.iter().map(|&(s, _)| s).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait
            .iter()
            .map(|&(_, stage)| pipeline_stage_to_vk(stage))
            .collect();
        let signal_sems: Vec<vk::Semaphore> = signal.into_iter().collect();

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_sems.len() as u32,
            p_wait_semaphores: wait_sems.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cb,
            signal_semaphore_count: signal_sems.len() as u32,
            p_signal_semaphores: signal_sems.as_ptr(),
            ..Default::default()
        };
        let _queue = self.queue_lock.lock();
        unsafe {
            self.device.queue_submit(
                queue,
                std::slice::from_ref(&submit),
                fence.unwrap_or(vk::Fence::null()),
            )
        }
        .map_err(|e| map_result("queue_submit", e))
    }

    fn cmd_set_viewport(&self, cb: vk::CommandBuffer, viewport: &Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(cb, 0, &[viewport_to_vk(viewport)])
        }
    }

    fn cmd_set_scissor(&self, cb: vk::CommandBuffer, scissor: &Rect2D) {
        unsafe { self.device.cmd_set_scissor(cb, 0, &[rect_to_vk(scissor)]) }
    }

    fn cmd_begin_render_pass(
        &self,
        cb: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: &Rect2D,
        clear: &ClearValues,
    ) {
        let clears = clear_values_to_vk(clear);
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass,
            framebuffer,
            render_area: rect_to_vk(area),
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .cmd_begin_render_pass(cb, &rp_begin, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cb: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cb) }
    }

    fn cmd_bind_pipeline(&self, cb: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_vertex_buffer(&self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: u64) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(cb, 0, &[buffer], &[offset])
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        index_type: IndexType,
    ) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(cb, buffer, offset, index_type_to_vk(index_type))
        }
    }

    fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                cb,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe { self.device.cmd_copy_buffer(cb, src, dst, &[region]) }
    }

    fn memory_types(&self) -> Vec<MemoryProperty> {
        self.memory_types.clone()
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RenderResult<vk::Buffer> {
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage: buffer_usage_to_vk(usage),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe { self.device.create_buffer(&bci, None) }.map_err(|e| map_result("create_buffer", e))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> MemoryRequirements {
        requirements_from_vk(unsafe { self.device.get_buffer_memory_requirements(buffer) })
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> RenderResult<vk::DeviceMemory> {
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: size,
            memory_type_index,
            ..Default::default()
        };
        unsafe { self.device.allocate_memory(&mai, None) }
            .map_err(|e| map_result("allocate_memory", e))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> RenderResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }
            .map_err(|e| map_result("bind_buffer_memory", e))
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: u64,
        size: u64,
    ) -> RenderResult<NonNull<u8>> {
        let ptr = unsafe {
            self.device
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
        }
        .map_err(|e| map_result("map_memory", e))?;
        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| RenderError::backend("map_memory", "driver returned a null mapping"))
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    fn create_image(&self, desc: &ImageDesc) -> RenderResult<vk::Image> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::InvalidExtent {
                width: desc.width,
                height: desc.height,
            });
        }
        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: format_to_vk(desc.format),
            extent: vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: image_usage_to_vk(desc.usage),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        unsafe { self.device.create_image(&img_ci, None) }.map_err(|e| map_result("create_image", e))
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> MemoryRequirements {
        requirements_from_vk(unsafe { self.device.get_image_memory_requirements(image) })
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> RenderResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, 0) }
            .map_err(|e| map_result("bind_image_memory", e))
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: Format,
        aspect: ImageAspect,
    ) -> RenderResult<vk::ImageView> {
        let sub = vk::ImageSubresourceRange {
            aspect_mask: aspect_to_vk(aspect, format),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: format_to_vk(format),
            subresource_range: sub,
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&view_ci, None) }
            .map_err(|e| map_result("create_image_view", e))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn detect_depth_format(&self) -> Option<Format> {
        Format::DEPTH_CANDIDATES.into_iter().find(|&f| {
            let props = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.phys, format_to_vk(f))
            };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RenderResult<vk::RenderPass> {
        let has_depth = desc.depth_format != Format::Undefined;
        let mut attachments = vec![vk::AttachmentDescription {
            format: format_to_vk(desc.color_format),
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        }];
        if has_depth {
            attachments.push(vk::AttachmentDescription {
                format: format_to_vk(desc.depth_format),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::CLEAR,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            });
        }

        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_depth_stencil_attachment: if has_depth {
                &depth_ref as *const _
            } else {
                std::ptr::null()
            },
            ..Default::default()
        };

        // Wait for the acquire semaphore's stage before touching the
        // attachments.
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            dst_stage_mask: stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        unsafe { self.device.create_render_pass(&rp_info, None) }
            .map_err(|e| map_result("create_render_pass", e))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        size: RenderSize,
    ) -> RenderResult<vk::Framebuffer> {
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: size.width,
            height: size.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.device.create_framebuffer(&fb_info, None) }
            .map_err(|e| map_result("create_framebuffer", e))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn surface_capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        let (caps, formats, modes) = unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
                .map_err(|e| map_result("get_physical_device_surface_capabilities", e))?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
                .map_err(|e| map_result("get_physical_device_surface_formats", e))?;
            let modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
                .map_err(|e| map_result("get_physical_device_surface_present_modes", e))?;
            (caps, formats, modes)
        };

        // u32::MAX means the swapchain decides
        let current_extent =
            (caps.current_extent.width != u32::MAX).then(|| extent_from_vk(caps.current_extent));

        Ok(SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            current_extent,
            min_extent: extent_from_vk(caps.min_image_extent),
            max_extent: extent_from_vk(caps.max_image_extent),
            formats: formats.into_iter().map(surface_format_from_vk).collect(),
            present_modes: modes.into_iter().filter_map(present_mode_from_vk).collect(),
        })
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: Option<vk::SwapchainKHR>,
    ) -> RenderResult<(vk::SwapchainKHR, Vec<vk::Image>)> {
        if desc.extent.is_zero() {
            return Err(RenderError::InvalidExtent {
                width: desc.extent.width,
                height: desc.extent.height,
            });
        }
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
        }
        .map_err(|e| map_result("get_physical_device_surface_capabilities", e))?;

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: desc.image_count,
            image_format: format_to_vk(desc.surface_format.format),
            image_color_space: color_space_to_vk(desc.surface_format.color_space),
            image_extent: extent_to_vk(desc.extent),
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: present_mode_to_vk(desc.present_mode),
            clipped: vk::TRUE,
            old_swapchain: old.unwrap_or(vk::SwapchainKHR::null()),
            ..Default::default()
        };

        unsafe {
            let swapchain = self
                .swapchain_loader
                .create_swapchain(&swap_info, None)
                .map_err(|e| map_result("create_swapchain", e))?;
            match self.swapchain_loader.get_swapchain_images(swapchain) {
                Ok(images) => {
                    debug!(
                        images = images.len(),
                        extent = %desc.extent,
                        mode = ?desc.present_mode,
                        "swapchain created"
                    );
                    Ok((swapchain, images))
                }
                Err(e) => {
                    self.swapchain_loader.destroy_swapchain(swapchain, None);
                    Err(map_result("get_swapchain_images", e))
                }
            }
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome> {
        let r = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        };
        match r {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(AcquireOutcome::Timeout),
            Err(e) => Err(map_result("acquire_next_image", e)),
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RenderResult<PresentOutcome> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let _queue = self.queue_lock.lock();
        match unsafe { self.swapchain_loader.queue_present(queue, &present) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(map_result("queue_present", e)),
        }
    }
}
