// SPDX-License-Identifier: CEPL-1.0
//! GPU buffers: creation with a memory-type search, map-copy writes,
//! staged uploads into device-local memory and copy-then-swap resizing.
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, error};

use crate::command::CommandUnit;
use crate::device::{BufferUsage, Device, MemoryProperty};
use crate::error::{RenderError, RenderResult};

/// Index of the first memory type allowed by `type_filter` (bit `i` set means
/// type `i` is allowed) whose properties include all of `required`.
pub fn find_memory_index(
    types: &[MemoryProperty],
    type_filter: u32,
    required: MemoryProperty,
) -> Option<u32> {
    types
        .iter()
        .enumerate()
        .take(32)
        .find(|(i, props)| type_filter & (1 << i) != 0 && props.contains(required))
        .map(|(i, _)| i as u32)
}

pub struct Buffer<D: Device> {
    device: Arc<D>,
    handle: D::Buffer,
    memory: D::Memory,
    usage: BufferUsage,
    memory_flags: MemoryProperty,
    memory_index: u32,
    total_size: u64,
    mapped: bool,
}

/// A buffer and its memory before they are owned by a [`Buffer`].
struct Allocation<D: Device> {
    handle: D::Buffer,
    memory: D::Memory,
    memory_index: u32,
}

fn allocate<D: Device>(
    device: &D,
    size: u64,
    usage: BufferUsage,
    memory_flags: MemoryProperty,
) -> RenderResult<Allocation<D>> {
    let handle = device.create_buffer(size, usage).map_err(|e| {
        error!(size, ?usage, "buffer creation failed: {e}");
        e
    })?;
    let reqs = device.buffer_memory_requirements(handle);
    let Some(memory_index) =
        find_memory_index(&device.memory_types(), reqs.memory_type_bits, memory_flags)
    else {
        error!(
            type_bits = reqs.memory_type_bits,
            ?memory_flags,
            "no memory type for buffer"
        );
        device.destroy_buffer(handle);
        return Err(RenderError::NoSuitableMemoryType {
            type_bits: reqs.memory_type_bits,
            required: memory_flags,
        });
    };
    let memory = match device.allocate_memory(reqs.size, memory_index) {
        Ok(m) => m,
        Err(e) => {
            error!(size = reqs.size, memory_index, "buffer memory allocation failed: {e}");
            device.destroy_buffer(handle);
            return Err(RenderError::Allocation(e.to_string()));
        }
    };
    Ok(Allocation {
        handle,
        memory,
        memory_index,
    })
}

impl<D: Device> Buffer<D> {
    /// Creates the buffer and its memory. With `bind_on_create` the memory is
    /// bound at offset 0 straight away.
    pub fn new(
        device: Arc<D>,
        size: u64,
        usage: BufferUsage,
        memory_flags: MemoryProperty,
        bind_on_create: bool,
    ) -> RenderResult<Self> {
        let a = allocate(device.as_ref(), size, usage, memory_flags)?;
        let buffer = Self {
            device,
            handle: a.handle,
            memory: a.memory,
            usage,
            memory_flags,
            memory_index: a.memory_index,
            total_size: size,
            mapped: false,
        };
        if bind_on_create {
            buffer.bind(0)?;
        }
        debug!(handle = ?buffer.handle, size, ?usage, "buffer created");
        Ok(buffer)
    }

    #[inline]
    pub fn handle(&self) -> D::Buffer {
        self.handle
    }

    #[inline]
    pub fn memory(&self) -> D::Memory {
        self.memory
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn memory_flags(&self) -> MemoryProperty {
        self.memory_flags
    }

    #[inline]
    pub fn memory_index(&self) -> u32 {
        self.memory_index
    }

    pub fn bind(&self, offset: u64) -> RenderResult<()> {
        self.device
            .bind_buffer_memory(self.handle, self.memory, offset)
    }

    /// Maps a range for direct CPU access. Only host-visible buffers can be
    /// mapped.
    pub fn lock_memory(&mut self, offset: u64, size: u64) -> RenderResult<NonNull<u8>> {
        debug_assert!(!self.mapped, "buffer mapped twice");
        let ptr = self.device.map_memory(self.memory, offset, size)?;
        self.mapped = true;
        Ok(ptr)
    }

    pub fn unlock_memory(&mut self) {
        if self.mapped {
            self.device.unmap_memory(self.memory);
            self.mapped = false;
        }
    }

    /// Map, copy `data` to `offset`, unmap.
    pub fn load_data(&mut self, offset: u64, data: &[u8]) -> RenderResult<()> {
        let len = data.len() as u64;
        self.check_range("load_data", offset, len)?;
        if len == 0 {
            return Ok(());
        }
        let dst = self.lock_memory(offset, len)?;
        // SAFETY: the mapping covers `len` bytes at `dst` and `data` lives in
        // host memory, so the regions cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.as_ptr(), data.len());
        }
        self.unlock_memory();
        Ok(())
    }

    /// Device-side copy into `dest`. The queue is drained first so the source
    /// is not still being written by earlier work.
    pub fn copy_to(
        &self,
        queue: D::Queue,
        src_offset: u64,
        dest: &Buffer<D>,
        dst_offset: u64,
        size: u64,
    ) -> RenderResult<()> {
        self.check_range("copy_to", src_offset, size)?;
        dest.check_range("copy_to", dst_offset, size)?;
        self.device.queue_wait_idle(queue)?;
        let unit = CommandUnit::allocate_and_begin_single_use(self.device.clone())?;
        unit.copy_buffer(self.handle, dest.handle, src_offset, dst_offset, size);
        unit.end_single_use(queue)
    }

    /// Writes `data` through a temporary host-visible staging buffer and a
    /// device copy. The only way to fill device-local memory.
    pub fn upload_via_staging(
        &mut self,
        queue: D::Queue,
        offset: u64,
        data: &[u8],
    ) -> RenderResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as u64;
        self.check_range("upload_via_staging", offset, len)?;
        let mut staging = Buffer::new(
            self.device.clone(),
            len,
            BufferUsage::TRANSFER_SRC,
            MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT,
            true,
        )?;
        staging.load_data(0, data)?;
        staging.copy_to(queue, 0, self, offset, len)
    }

    /// Replaces the buffer with one of `new_size` bytes, carrying over the
    /// first `min(old, new)` bytes. Never in place: the old buffer and memory
    /// are released only after the copy completed and the device went idle.
    /// On failure the old buffer is left untouched.
    pub fn resize(&mut self, new_size: u64, queue: D::Queue) -> RenderResult<()> {
        debug_assert!(!self.mapped, "resize of a mapped buffer");
        let a = allocate(self.device.as_ref(), new_size, self.usage, self.memory_flags)?;
        let device = self.device.clone();
        let release = |a: &Allocation<D>| {
            device.free_memory(a.memory);
            device.destroy_buffer(a.handle);
        };

        if let Err(e) = device.bind_buffer_memory(a.handle, a.memory, 0) {
            error!("binding resized buffer failed: {e}");
            release(&a);
            return Err(e);
        }

        let copy_size = self.total_size.min(new_size);
        if copy_size > 0 {
            let copied = CommandUnit::allocate_and_begin_single_use(device.clone()).and_then(
                |unit| {
                    unit.copy_buffer(self.handle, a.handle, 0, 0, copy_size);
                    unit.end_single_use(queue)
                },
            );
            if let Err(e) = copied {
                error!("copy into resized buffer failed: {e}");
                release(&a);
                return Err(e);
            }
        }

        if let Err(e) = device.wait_idle() {
            release(&a);
            return Err(e);
        }

        device.free_memory(self.memory);
        device.destroy_buffer(self.handle);
        debug!(
            old = ?self.handle,
            new = ?a.handle,
            from = self.total_size,
            to = new_size,
            "buffer resized"
        );
        self.handle = a.handle;
        self.memory = a.memory;
        self.memory_index = a.memory_index;
        self.total_size = new_size;
        Ok(())
    }

    fn check_range(&self, op: &'static str, offset: u64, len: u64) -> RenderResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.total_size => Ok(()),
            _ => Err(RenderError::backend(
                op,
                format!(
                    "range {offset}+{len} exceeds buffer of {} bytes",
                    self.total_size
                ),
            )),
        }
    }
}

impl<D: Device> Drop for Buffer<D> {
    fn drop(&mut self) {
        self.unlock_memory();
        self.device.free_memory(self.memory);
        self.device.destroy_buffer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: MemoryProperty = MemoryProperty::HOST_VISIBLE.union(MemoryProperty::HOST_COHERENT);

    #[test]
    fn memory_search_respects_filter_and_flags() {
        let types = [
            MemoryProperty::DEVICE_LOCAL,
            HOST,
            MemoryProperty::DEVICE_LOCAL.union(HOST),
        ];
        assert_eq!(
            find_memory_index(&types, 0b111, MemoryProperty::DEVICE_LOCAL),
            Some(0)
        );
        assert_eq!(find_memory_index(&types, 0b111, HOST), Some(1));
        // type 1 filtered out
        assert_eq!(find_memory_index(&types, 0b101, HOST), Some(2));
        assert_eq!(find_memory_index(&types, 0b001, HOST), None);
        assert_eq!(find_memory_index(&types, 0, MemoryProperty::empty()), None);
    }

    #[test]
    fn memory_search_on_empty_table() {
        assert_eq!(find_memory_index(&[], u32::MAX, HOST), None);
    }
}
