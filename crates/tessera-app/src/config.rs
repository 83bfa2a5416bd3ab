// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tessera_render::{FrameConfig, VsyncMode};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
}

/// `[render]` table of `tessera.toml`. Every key is optional.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VsyncModeCfg,
    pub preferred_image_count: Option<u32>,
    /// Unset waits forever.
    pub fence_timeout_ms: Option<u64>,
    pub unfocused: UnfocusedPolicy,
    pub unfocused_fps: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnfocusedPolicy {
    None,
    #[default]
    Throttle,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let frame = FrameConfig::default();
        RenderCfg {
            clear_color: frame.clear_color,
            vsync: frame.vsync,
            vsync_mode: VsyncModeCfg::Mailbox,
            preferred_image_count: None,
            fence_timeout_ms: None,
            unfocused: UnfocusedPolicy::Throttle,
            unfocused_fps: 30,
        }
    }
}

impl RenderCfg {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            clear_color: self.clear_color,
            vsync: self.vsync,
            vsync_mode: match self.vsync_mode {
                VsyncModeCfg::Fifo => VsyncMode::Fifo,
                VsyncModeCfg::Mailbox => VsyncMode::Mailbox,
            },
            preferred_image_count: self.preferred_image_count,
            fence_timeout_ns: self
                .fence_timeout_ms
                .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000)),
        }
    }

    /// Redraw cap while the window is unfocused, if any.
    pub fn unfocused_fps_cap(&self) -> Option<u32> {
        match self.unfocused {
            UnfocusedPolicy::Throttle if self.unfocused_fps > 0 => Some(self.unfocused_fps),
            _ => None,
        }
    }
}

/// Missing file or bad TOML both fall back to defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(e) => {
            debug!("{} not read ({e}); using defaults", path.display());
            AppCfg::default()
        }
    }
}

fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_render_table() {
        let cfg = parse_cfg(
            r#"
            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            vsync = false
            vsync_mode = "fifo"
            preferred_image_count = 3
            fence_timeout_ms = 250
            unfocused = "none"
            unfocused_fps = 10
            "#,
        )
        .unwrap();

        let frame = cfg.render.frame_config();
        assert_eq!(frame.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert!(!frame.vsync);
        assert_eq!(frame.vsync_mode, VsyncMode::Fifo);
        assert_eq!(frame.preferred_image_count, Some(3));
        assert_eq!(frame.fence_timeout_ns, 250_000_000);
        assert_eq!(cfg.render.unfocused_fps_cap(), None);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = parse_cfg("[render]\nvsync = true\n").unwrap();
        assert_eq!(cfg.render, RenderCfg::default());
        assert_eq!(cfg.render.frame_config(), FrameConfig::default());
        assert_eq!(cfg.render.unfocused_fps_cap(), Some(30));

        assert_eq!(parse_cfg("").unwrap(), AppCfg::default());
    }

    #[test]
    fn unknown_vsync_mode_is_rejected() {
        assert!(parse_cfg("[render]\nvsync_mode = \"adaptive\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_cfg(Path::new("does/not/exist/tessera.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
