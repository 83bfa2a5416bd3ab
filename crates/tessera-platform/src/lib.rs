// SPDX-License-Identifier: CEPL-1.0
//! Window-system glue. The event pump itself belongs to the driver; this crate
//! only hands out `winit` and the size query the renderer polls at startup.
pub use winit;

use winit::window::Window;

/// Framebuffer size in physical pixels. A minimized window reports 0 on one
/// or both axes.
pub fn framebuffer_size(window: &Window) -> (u32, u32) {
    let size = window.inner_size();
    tracing::trace!("framebuffer size {}x{}", size.width, size.height);
    (size.width, size.height)
}

/// True when the window cannot be rendered to (minimized or zero-sized).
pub fn is_minimized(window: &Window) -> bool {
    let (w, h) = framebuffer_size(window);
    w == 0 || h == 0 || window.is_minimized().unwrap_or(false)
}
