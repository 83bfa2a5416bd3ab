// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::debug;

use crate::buffer::Buffer;
use crate::command::CommandUnit;
use crate::device::{BufferUsage, Device, IndexType, MemoryProperty};
use crate::error::RenderResult;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex3d {
    pub position: Vec3,
}

const QUAD_SCALE: f32 = 10.0;

/// Test quad drawn until real meshes arrive.
pub const QUAD_VERTICES: [Vertex3d; 4] = [
    Vertex3d {
        position: Vec3::new(-0.5 * QUAD_SCALE, -0.5 * QUAD_SCALE, 0.0),
    },
    Vertex3d {
        position: Vec3::new(0.5 * QUAD_SCALE, 0.5 * QUAD_SCALE, 0.0),
    },
    Vertex3d {
        position: Vec3::new(-0.5 * QUAD_SCALE, 0.5 * QUAD_SCALE, 0.0),
    },
    Vertex3d {
        position: Vec3::new(0.5 * QUAD_SCALE, -0.5 * QUAD_SCALE, 0.0),
    },
];
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 3, 1];

fn geometry_usage(kind: BufferUsage) -> BufferUsage {
    kind | BufferUsage::TRANSFER_DST | BufferUsage::TRANSFER_SRC
}

/// Device-local vertex and index buffers for object geometry.
pub struct ObjectGeometry<D: Device> {
    vertex_buffer: Buffer<D>,
    index_buffer: Buffer<D>,
    index_count: u32,
}

impl<D: Device> ObjectGeometry<D> {
    pub fn new(device: Arc<D>, vertex_capacity: u64, index_capacity: u64) -> RenderResult<Self> {
        let vertex_buffer = Buffer::new(
            device.clone(),
            vertex_capacity * std::mem::size_of::<Vertex3d>() as u64,
            geometry_usage(BufferUsage::VERTEX),
            MemoryProperty::DEVICE_LOCAL,
            true,
        )?;
        let index_buffer = Buffer::new(
            device,
            index_capacity * std::mem::size_of::<u32>() as u64,
            geometry_usage(BufferUsage::INDEX),
            MemoryProperty::DEVICE_LOCAL,
            true,
        )?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: 0,
        })
    }

    /// Replaces the geometry through staging uploads, growing either buffer
    /// when the data does not fit.
    pub fn upload(
        &mut self,
        queue: D::Queue,
        vertices: &[Vertex3d],
        indices: &[u32],
    ) -> RenderResult<()> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        grow_to_fit(&mut self.vertex_buffer, queue, vertex_bytes.len() as u64)?;
        grow_to_fit(&mut self.index_buffer, queue, index_bytes.len() as u64)?;
        self.vertex_buffer
            .upload_via_staging(queue, 0, vertex_bytes)?;
        self.index_buffer.upload_via_staging(queue, 0, index_bytes)?;
        self.index_count = indices.len() as u32;
        debug!(
            vertices = vertices.len(),
            indices = indices.len(),
            "geometry uploaded"
        );
        Ok(())
    }

    /// Binds `pipeline` and the buffers and issues one indexed draw.
    pub fn record_draw(&self, unit: &CommandUnit<D>, pipeline: D::Pipeline) {
        if self.index_count == 0 {
            return;
        }
        unit.bind_pipeline(pipeline);
        unit.bind_vertex_buffer(self.vertex_buffer.handle(), 0);
        unit.bind_index_buffer(self.index_buffer.handle(), 0, IndexType::U32);
        unit.draw_indexed(self.index_count, 1, 0);
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_buffer(&self) -> &Buffer<D> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Buffer<D> {
        &self.index_buffer
    }
}

fn grow_to_fit<D: Device>(buffer: &mut Buffer<D>, queue: D::Queue, needed: u64) -> RenderResult<()> {
    if needed <= buffer.total_size() {
        return Ok(());
    }
    buffer.resize(needed.next_power_of_two(), queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 12);
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 48);
    }

    #[test]
    fn quad_indices_stay_in_range() {
        assert!(QUAD_INDICES
            .iter()
            .all(|&i| (i as usize) < QUAD_VERTICES.len()));
        assert_eq!(QUAD_VERTICES[1].position, Vec3::new(5.0, 5.0, 0.0));
    }
}
