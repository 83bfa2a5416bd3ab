// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::FrameConfig;
use crate::device::Device;
use crate::error::RenderResult;
use crate::frame::{FrameOrchestrator, FrameStatus};
use crate::geometry::{ObjectGeometry, Vertex3d, QUAD_INDICES, QUAD_VERTICES};
use crate::{RenderSize, Renderer};

const FALLBACK_SIZE: RenderSize = RenderSize::new(800, 600);
const INITIAL_VERTEX_CAPACITY: u64 = 1024;
const INITIAL_INDEX_CAPACITY: u64 = 4096;

/// Per-frame input from the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderPacket {
    pub delta_time: f32,
}

/// Renderer built on a [`FrameOrchestrator`]: owns the frame counter, the
/// object geometry and the pipeline handed in by the loader.
pub struct RendererFrontend<D: Device> {
    orchestrator: FrameOrchestrator<D>,
    geometry: ObjectGeometry<D>,
    pipeline: Option<D::Pipeline>,
    frame_number: u64,
    app_name: String,
}

impl<D: Device> RendererFrontend<D> {
    /// A zero dimension in `size` (window not laid out yet) falls back to
    /// 800x600.
    pub fn initialize(
        device: Arc<D>,
        app_name: &str,
        size: RenderSize,
        config: FrameConfig,
    ) -> RenderResult<Self> {
        let size = RenderSize::new(
            if size.width == 0 { FALLBACK_SIZE.width } else { size.width },
            if size.height == 0 { FALLBACK_SIZE.height } else { size.height },
        );
        let orchestrator = FrameOrchestrator::new(device.clone(), size, config)?;
        let mut geometry =
            ObjectGeometry::new(device.clone(), INITIAL_VERTEX_CAPACITY, INITIAL_INDEX_CAPACITY)?;
        geometry.upload(device.graphics_queue(), &QUAD_VERTICES, &QUAD_INDICES)?;

        info!(app = app_name, backend = device.name(), %size, "renderer initialized");
        Ok(Self {
            orchestrator,
            geometry,
            pipeline: None,
            frame_number: 0,
            app_name: app_name.to_owned(),
        })
    }

    /// Begin, record, end. A deferred begin returns straight away; a failed
    /// end is fatal.
    pub fn render_frame(&mut self, packet: &RenderPacket) -> RenderResult<FrameStatus> {
        let status = self.orchestrator.begin_frame(packet.delta_time)?;
        if !status.is_ready() {
            return Ok(status);
        }

        if let (Some(pipeline), Some(unit)) = (self.pipeline, self.orchestrator.command_unit()) {
            self.geometry.record_draw(unit, pipeline);
        }

        if let Err(e) = self.orchestrator.end_frame(packet.delta_time) {
            error!(frame = self.frame_number, "end_frame failed: {e}");
            return Err(e);
        }
        self.frame_number += 1;
        Ok(status)
    }

    /// Pipeline bound for the geometry draw. `None` records clear-only frames.
    pub fn set_pipeline(&mut self, pipeline: Option<D::Pipeline>) {
        self.pipeline = pipeline;
    }

    pub fn upload_geometry(&mut self, vertices: &[Vertex3d], indices: &[u32]) -> RenderResult<()> {
        let queue = self.orchestrator.device().graphics_queue();
        self.geometry.upload(queue, vertices, indices)
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.orchestrator.set_vsync(vsync);
    }

    pub fn orchestrator(&self) -> &FrameOrchestrator<D> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut FrameOrchestrator<D> {
        &mut self.orchestrator
    }

    pub fn geometry(&self) -> &ObjectGeometry<D> {
        &self.geometry
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }
}

impl<D: Device> Renderer for RendererFrontend<D> {
    fn draw_frame(&mut self, packet: &RenderPacket) -> Result<()> {
        self.render_frame(packet)
            .map(|_| ())
            .with_context(|| format!("frame {}", self.frame_number))
    }

    fn on_resized(&mut self, size: RenderSize) {
        self.orchestrator.on_resized(size);
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.orchestrator.set_clear_color(rgba);
    }

    fn frame_number(&self) -> u64 {
        self.frame_number
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.orchestrator.wait_idle() {
            warn!("wait_idle on shutdown failed: {e}");
        }
        info!(app = %self.app_name, frames = self.frame_number, "renderer shut down");
    }
}
