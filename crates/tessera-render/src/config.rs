// SPDX-License-Identifier: CEPL-1.0

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    /// Target monitor refresh rate.
    Fifo,
    /// Latest image wins, fps uncapped.
    #[default]
    Mailbox,
}

/// Knobs the frame core reads at creation and on every recreation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameConfig {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    /// Asked-for presentable image count; the surface limits still win.
    pub preferred_image_count: Option<u32>,
    /// Timeout for the per-frame fence wait. `u64::MAX` waits forever.
    pub fence_timeout_ns: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.02, 0.02, 0.04, 1.0],
            vsync: true,
            vsync_mode: VsyncMode::Mailbox,
            preferred_image_count: None,
            fence_timeout_ns: u64::MAX,
        }
    }
}
