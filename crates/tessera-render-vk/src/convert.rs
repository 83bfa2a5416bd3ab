// SPDX-License-Identifier: CEPL-1.0
//! Conversions between the backend-neutral types and `ash::vk`.
use ash::vk;
use tessera_render::{
    BufferUsage, ClearValues, ColorSpace, CommandBufferUsage, Format, ImageAspect, ImageUsage,
    IndexType, MemoryProperty, MemoryRequirements, PipelineStage, PresentMode, Rect2D,
    RenderError, RenderSize, SurfaceFormat, Viewport,
};

pub fn format_to_vk(f: Format) -> vk::Format {
    match f {
        Format::Undefined => vk::Format::UNDEFINED,
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::D32Sfloat => vk::Format::D32_SFLOAT,
        Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::Other(raw) => vk::Format::from_raw(raw),
    }
}

pub fn format_from_vk(f: vk::Format) -> Format {
    match f {
        vk::Format::UNDEFINED => Format::Undefined,
        vk::Format::B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::B8G8R8A8Srgb,
        vk::Format::R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::R8G8B8A8Srgb,
        vk::Format::D32_SFLOAT => Format::D32Sfloat,
        vk::Format::D32_SFLOAT_S8_UINT => Format::D32SfloatS8Uint,
        vk::Format::D24_UNORM_S8_UINT => Format::D24UnormS8Uint,
        other => Format::Other(other.as_raw()),
    }
}

pub fn color_space_to_vk(cs: ColorSpace) -> vk::ColorSpaceKHR {
    match cs {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

pub fn surface_format_from_vk(f: vk::SurfaceFormatKHR) -> SurfaceFormat {
    SurfaceFormat {
        format: format_from_vk(f.format),
        color_space: match f.color_space {
            vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
            other => ColorSpace::Other(other.as_raw()),
        },
    }
}

pub fn present_mode_to_vk(m: PresentMode) -> vk::PresentModeKHR {
    match m {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

/// Modes the core does not know (shared refresh and friends) are dropped.
pub fn present_mode_from_vk(m: vk::PresentModeKHR) -> Option<PresentMode> {
    match m {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

pub fn extent_to_vk(size: RenderSize) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

pub fn extent_from_vk(e: vk::Extent2D) -> RenderSize {
    RenderSize::new(e.width, e.height)
}

pub fn viewport_to_vk(v: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: v.x,
        y: v.y,
        width: v.width,
        height: v.height,
        min_depth: v.min_depth,
        max_depth: v.max_depth,
    }
}

pub fn rect_to_vk(r: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: r.x, y: r.y },
        extent: vk::Extent2D {
            width: r.width,
            height: r.height,
        },
    }
}

/// Color first, depth/stencil second, matching the attachment order of
/// every render pass this backend creates.
pub fn clear_values_to_vk(c: &ClearValues) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: c.color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: c.depth,
                stencil: c.stencil,
            },
        },
    ]
}

pub fn index_type_to_vk(t: IndexType) -> vk::IndexType {
    match t {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

pub fn aspect_to_vk(a: ImageAspect, format: Format) -> vk::ImageAspectFlags {
    match a {
        ImageAspect::Color => vk::ImageAspectFlags::COLOR,
        ImageAspect::Depth if format.has_stencil() => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        ImageAspect::Depth => vk::ImageAspectFlags::DEPTH,
    }
}

// The flag types share Vulkan's bit values.

pub fn buffer_usage_to_vk(u: BufferUsage) -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::from_raw(u.bits())
}

pub fn image_usage_to_vk(u: ImageUsage) -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::from_raw(u.bits())
}

pub fn memory_property_to_vk(p: MemoryProperty) -> vk::MemoryPropertyFlags {
    vk::MemoryPropertyFlags::from_raw(p.bits())
}

pub fn memory_property_from_vk(p: vk::MemoryPropertyFlags) -> MemoryProperty {
    MemoryProperty::from_bits_truncate(p.as_raw())
}

pub fn command_usage_to_vk(u: CommandBufferUsage) -> vk::CommandBufferUsageFlags {
    vk::CommandBufferUsageFlags::from_raw(u.bits())
}

pub fn pipeline_stage_to_vk(s: PipelineStage) -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::from_raw(s.bits())
}

pub fn requirements_from_vk(r: vk::MemoryRequirements) -> MemoryRequirements {
    MemoryRequirements {
        size: r.size,
        alignment: r.alignment,
        memory_type_bits: r.memory_type_bits,
    }
}

/// Hard failures only. Soft presentation results are matched by the caller
/// before this is reached.
pub fn map_result(op: &'static str, r: vk::Result) -> RenderError {
    match r {
        vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            RenderError::Allocation(format!("{op}: {r}"))
        }
        vk::Result::ERROR_SURFACE_LOST_KHR | vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => {
            RenderError::Surface(format!("{op}: {r}"))
        }
        other => RenderError::backend(op, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_line_up_with_vulkan() {
        assert_eq!(
            buffer_usage_to_vk(BufferUsage::VERTEX | BufferUsage::TRANSFER_DST),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            buffer_usage_to_vk(BufferUsage::INDEX | BufferUsage::UNIFORM),
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            memory_property_to_vk(MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        );
        assert_eq!(
            pipeline_stage_to_vk(PipelineStage::COLOR_ATTACHMENT_OUTPUT),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            image_usage_to_vk(ImageUsage::DEPTH_STENCIL_ATTACHMENT),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert_eq!(
            command_usage_to_vk(CommandBufferUsage::ONE_TIME_SUBMIT),
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        );
    }

    #[test]
    fn lazily_allocated_memory_bit_is_dropped() {
        let p = memory_property_from_vk(
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
        );
        assert_eq!(p, MemoryProperty::DEVICE_LOCAL);
    }

    #[test]
    fn unknown_formats_survive_the_trip() {
        let raw = vk::Format::A2B10G10R10_UNORM_PACK32;
        assert_eq!(format_to_vk(format_from_vk(raw)), raw);
        assert_eq!(format_from_vk(vk::Format::D32_SFLOAT), Format::D32Sfloat);
    }

    #[test]
    fn device_lost_maps_to_fatal_error() {
        let e = map_result("queue_submit", vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(e, RenderError::DeviceLost));
        assert!(e.is_fatal());
        assert!(matches!(
            map_result("create_swapchain", vk::Result::ERROR_SURFACE_LOST_KHR),
            RenderError::Surface(_)
        ));
    }

    #[test]
    fn depth_stencil_aspect() {
        assert_eq!(
            aspect_to_vk(ImageAspect::Depth, Format::D24UnormS8Uint),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_to_vk(ImageAspect::Depth, Format::D32Sfloat),
            vk::ImageAspectFlags::DEPTH
        );
    }
}
