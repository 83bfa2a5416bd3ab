// SPDX-License-Identifier: CEPL-1.0
//! One recordable unit of GPU work and its lifecycle.
use std::sync::Arc;

use tracing::trace;

use crate::device::{
    ClearValues, CommandBufferUsage, Device, IndexType, PipelineStage, Rect2D, Viewport,
};
use crate::error::RenderResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommandUnitState {
    #[default]
    Ready,
    Recording,
    RecordingEnded,
    Submitted,
}

/// A command buffer plus the state it is in.
///
/// `Ready -> Recording -> RecordingEnded -> Submitted -> Ready`. Calling an
/// operation from the wrong state is a programmer error and trips a debug
/// assertion; release builds rely on the frame orchestrator never doing it.
pub struct CommandUnit<D: Device> {
    device: Arc<D>,
    pool: D::CommandPool,
    handle: D::CommandBuffer,
    state: CommandUnitState,
}

impl<D: Device> CommandUnit<D> {
    pub fn allocate(device: Arc<D>, pool: D::CommandPool, primary: bool) -> RenderResult<Self> {
        let handle = device.allocate_command_buffer(pool, primary)?;
        Ok(Self {
            device,
            pool,
            handle,
            state: CommandUnitState::Ready,
        })
    }

    /// Allocates a unit from the device's graphics pool and begins it for a
    /// single submission.
    pub fn allocate_and_begin_single_use(device: Arc<D>) -> RenderResult<Self> {
        let pool = device.graphics_command_pool();
        let mut unit = Self::allocate(device, pool, true)?;
        unit.begin(true, false, false)?;
        Ok(unit)
    }

    #[inline]
    pub fn handle(&self) -> D::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn state(&self) -> CommandUnitState {
        self.state
    }

    pub fn begin(
        &mut self,
        single_use: bool,
        renderpass_continue: bool,
        simultaneous_use: bool,
    ) -> RenderResult<()> {
        debug_assert_eq!(
            self.state,
            CommandUnitState::Ready,
            "begin on a command unit that was not reset"
        );
        let mut usage = CommandBufferUsage::empty();
        usage.set(CommandBufferUsage::ONE_TIME_SUBMIT, single_use);
        usage.set(CommandBufferUsage::RENDER_PASS_CONTINUE, renderpass_continue);
        usage.set(CommandBufferUsage::SIMULTANEOUS_USE, simultaneous_use);
        self.device.begin_command_buffer(self.handle, usage)?;
        self.state = CommandUnitState::Recording;
        Ok(())
    }

    pub fn end(&mut self) -> RenderResult<()> {
        debug_assert_eq!(self.state, CommandUnitState::Recording);
        self.device.end_command_buffer(self.handle)?;
        self.state = CommandUnitState::RecordingEnded;
        Ok(())
    }

    /// Called after the queue accepted the submission.
    pub fn mark_submitted(&mut self) {
        debug_assert_eq!(self.state, CommandUnitState::RecordingEnded);
        self.state = CommandUnitState::Submitted;
    }

    /// Back to `Ready`. Valid from any state; a unit left `RecordingEnded` by
    /// an abandoned frame is reset the same way as a submitted one.
    pub fn reset(&mut self) -> RenderResult<()> {
        self.device.reset_command_buffer(self.handle)?;
        self.state = CommandUnitState::Ready;
        Ok(())
    }

    /// Ends the unit, submits it, waits for the queue to drain and frees it.
    pub fn end_single_use(mut self, queue: D::Queue) -> RenderResult<()> {
        self.end()?;
        self.device
            .queue_submit(queue, self.handle, None, None, None)?;
        self.mark_submitted();
        self.device.queue_wait_idle(queue)?;
        trace!(cb = ?self.handle, "single-use unit retired");
        Ok(())
    }

    pub fn set_viewport(&self, viewport: &Viewport) {
        self.assert_recording();
        self.device.cmd_set_viewport(self.handle, viewport);
    }

    pub fn set_scissor(&self, scissor: &Rect2D) {
        self.assert_recording();
        self.device.cmd_set_scissor(self.handle, scissor);
    }

    pub fn begin_render_pass(
        &self,
        render_pass: D::RenderPass,
        framebuffer: D::Framebuffer,
        area: &Rect2D,
        clear: &ClearValues,
    ) {
        self.assert_recording();
        self.device
            .cmd_begin_render_pass(self.handle, render_pass, framebuffer, area, clear);
    }

    pub fn end_render_pass(&self) {
        self.assert_recording();
        self.device.cmd_end_render_pass(self.handle);
    }

    pub fn bind_pipeline(&self, pipeline: D::Pipeline) {
        self.assert_recording();
        self.device.cmd_bind_pipeline(self.handle, pipeline);
    }

    pub fn bind_vertex_buffer(&self, buffer: D::Buffer, offset: u64) {
        self.assert_recording();
        self.device.cmd_bind_vertex_buffer(self.handle, buffer, offset);
    }

    pub fn bind_index_buffer(&self, buffer: D::Buffer, offset: u64, index_type: IndexType) {
        self.assert_recording();
        self.device
            .cmd_bind_index_buffer(self.handle, buffer, offset, index_type);
    }

    pub fn draw_indexed(&self, index_count: u32, instance_count: u32, first_index: u32) {
        self.assert_recording();
        self.device
            .cmd_draw_indexed(self.handle, index_count, instance_count, first_index, 0, 0);
    }

    pub fn copy_buffer(
        &self,
        src: D::Buffer,
        dst: D::Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        self.assert_recording();
        self.device
            .cmd_copy_buffer(self.handle, src, dst, src_offset, dst_offset, size);
    }

    /// Submit helper used by the frame orchestrator.
    pub(crate) fn submit(
        &mut self,
        queue: D::Queue,
        wait: Option<(D::Semaphore, PipelineStage)>,
        signal: Option<D::Semaphore>,
        fence: Option<D::Fence>,
    ) -> RenderResult<()> {
        self.device
            .queue_submit(queue, self.handle, wait, signal, fence)?;
        self.mark_submitted();
        Ok(())
    }

    #[inline]
    fn assert_recording(&self) {
        debug_assert_eq!(
            self.state,
            CommandUnitState::Recording,
            "recording into a command unit that is not recording"
        );
    }
}

impl<D: Device> Drop for CommandUnit<D> {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.pool, self.handle);
    }
}
