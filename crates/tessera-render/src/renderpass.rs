// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use tracing::debug;

use crate::command::CommandUnit;
use crate::device::{ClearValues, Device, Format, Rect2D, RenderPassDesc};
use crate::error::RenderResult;
use crate::framebuffer::Framebuffer;

/// Color + depth render pass, its render area and clear values.
pub struct RenderPass<D: Device> {
    device: Arc<D>,
    handle: D::RenderPass,
    desc: RenderPassDesc,
    render_area: Rect2D,
    clear: ClearValues,
}

impl<D: Device> RenderPass<D> {
    pub fn new(
        device: Arc<D>,
        desc: RenderPassDesc,
        render_area: Rect2D,
        clear_color: [f32; 4],
    ) -> RenderResult<Self> {
        let handle = device.create_render_pass(&desc)?;
        debug!(?handle, ?desc, "render pass created");
        Ok(Self {
            device,
            handle,
            desc,
            render_area,
            clear: ClearValues {
                color: clear_color,
                depth: 1.0,
                stencil: 0,
            },
        })
    }

    #[inline]
    pub fn handle(&self) -> D::RenderPass {
        self.handle
    }

    pub fn color_format(&self) -> Format {
        self.desc.color_format
    }

    pub fn depth_format(&self) -> Format {
        self.desc.depth_format
    }

    pub fn render_area(&self) -> Rect2D {
        self.render_area
    }

    pub fn set_render_area(&mut self, area: Rect2D) {
        self.render_area = area;
    }

    pub fn clear_values(&self) -> ClearValues {
        self.clear
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear.color = rgba;
    }

    pub fn begin(&self, unit: &CommandUnit<D>, framebuffer: &Framebuffer<D>) {
        unit.begin_render_pass(self.handle, framebuffer.handle(), &self.render_area, &self.clear);
    }

    pub fn end(&self, unit: &CommandUnit<D>) {
        unit.end_render_pass();
    }
}

impl<D: Device> Drop for RenderPass<D> {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.handle);
    }
}
