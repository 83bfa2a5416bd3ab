// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use crate::device::Device;
use crate::error::RenderResult;
use crate::renderpass::RenderPass;
use crate::RenderSize;

/// Framebuffer for one presentable image. The attachment views are owned by
/// the swapchain; only the framebuffer handle is released here.
pub struct Framebuffer<D: Device> {
    device: Arc<D>,
    handle: D::Framebuffer,
    attachments: Vec<D::ImageView>,
    size: RenderSize,
}

impl<D: Device> Framebuffer<D> {
    pub fn new(
        device: Arc<D>,
        render_pass: &RenderPass<D>,
        size: RenderSize,
        attachments: Vec<D::ImageView>,
    ) -> RenderResult<Self> {
        let handle = device.create_framebuffer(render_pass.handle(), &attachments, size)?;
        Ok(Self {
            device,
            handle,
            attachments,
            size,
        })
    }

    #[inline]
    pub fn handle(&self) -> D::Framebuffer {
        self.handle
    }

    pub fn attachments(&self) -> &[D::ImageView] {
        &self.attachments
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }
}

impl<D: Device> Drop for Framebuffer<D> {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}
