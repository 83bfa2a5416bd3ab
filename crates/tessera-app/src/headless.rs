// SPDX-License-Identifier: CEPL-1.0
//! Windowless run against the simulated device.
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tessera_core::Clock;
use tessera_render::headless::HeadlessDevice;
use tessera_render::{FrameConfig, RenderPacket, RenderSize, Renderer, RendererFrontend};
use tracing::{debug, info, warn};

const START_SIZE: RenderSize = RenderSize::new(1280, 720);
const RESIZED_TO: RenderSize = RenderSize::new(1600, 900);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub presented: u64,
    pub deferred: u64,
    pub recreations: u64,
}

/// Drives `frames` frames; `resize_at` injects one resize before that frame.
/// Any protocol violation the device recorded fails the run.
pub fn run(config: FrameConfig, frames: u64, resize_at: Option<u64>) -> Result<RunSummary> {
    let device = Arc::new(HeadlessDevice::default());
    let mut renderer = RendererFrontend::initialize(device.clone(), "tessera", START_SIZE, config)
        .context("headless renderer")?;
    renderer.set_pipeline(Some(device.create_pipeline()));

    let mut clock = Clock::new();
    clock.start();
    let mut deferred = 0;
    for i in 0..frames {
        if resize_at == Some(i) {
            info!(frame = i, size = %RESIZED_TO, "injecting resize");
            device.set_surface_size(RESIZED_TO);
            renderer.on_resized(RESIZED_TO);
        }
        let packet = RenderPacket {
            delta_time: clock.tick(),
        };
        let status = renderer
            .render_frame(&packet)
            .with_context(|| format!("frame {i}"))?;
        if !status.is_ready() {
            debug!(frame = i, ?status, "frame deferred");
            deferred += 1;
        }
    }
    renderer.shutdown();

    let violations = device.violations();
    if !violations.is_empty() {
        for v in &violations {
            warn!("{v}");
        }
        bail!("device recorded {} protocol violations", violations.len());
    }

    let summary = RunSummary {
        presented: renderer.frame_number(),
        deferred,
        recreations: renderer.orchestrator().recreation_count(),
    };
    info!(
        presented = summary.presented,
        deferred = summary.deferred,
        recreations = summary.recreations,
        "headless run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_run_presents_every_frame() {
        let s = run(FrameConfig::default(), 30, None).unwrap();
        assert_eq!(
            s,
            RunSummary {
                presented: 30,
                deferred: 0,
                recreations: 0
            }
        );
    }

    #[test]
    fn injected_resize_costs_one_frame() {
        let s = run(FrameConfig::default(), 30, Some(10)).unwrap();
        assert_eq!(s.recreations, 1);
        assert_eq!(s.deferred, 1);
        assert_eq!(s.presented, 29);
    }
}
