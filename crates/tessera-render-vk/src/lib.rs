// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for `tessera-render`.
use std::sync::Arc;

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tessera_render::{FrameConfig, RenderSize, RendererFrontend};
use tracing::info;

mod convert;
mod device;
mod instance;

pub use device::VkDevice;

/// Brings up the Vulkan device for `window` and a renderer on top of it.
pub fn create_renderer(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    app_name: &str,
    config: FrameConfig,
) -> Result<RendererFrontend<VkDevice>> {
    let device = Arc::new(VkDevice::new(window, display, app_name)?);
    info!(gpu = device.gpu_name(), "Vulkan backend selected");
    RendererFrontend::initialize(device, app_name, size, config).context("renderer initialize")
}
