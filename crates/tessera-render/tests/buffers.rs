// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use tessera_render::headless::{HeadlessConfig, HeadlessDevice, GRAPHICS_QUEUE};
use tessera_render::{Buffer, BufferUsage, MemoryProperty, RenderError};

fn host_visible() -> MemoryProperty {
    MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT
}

fn transfer_both(kind: BufferUsage) -> BufferUsage {
    kind | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn load_data_writes_host_visible_memory() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer = Buffer::new(
        device.clone(),
        64,
        BufferUsage::UNIFORM,
        host_visible(),
        true,
    )
    .unwrap();

    buffer.load_data(16, &[1, 2, 3, 4]).unwrap();

    let bytes = device.buffer_contents(buffer.handle()).unwrap();
    assert_eq!(&bytes[16..20], &[1, 2, 3, 4]);
    assert!(bytes[..16].iter().all(|&b| b == 0));
    assert!(device.violations().is_empty());
}

#[test]
fn load_data_out_of_range_is_rejected() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer =
        Buffer::new(device.clone(), 8, BufferUsage::UNIFORM, host_visible(), true).unwrap();

    let err = buffer.load_data(6, &[0; 4]).unwrap_err();
    assert!(matches!(err, RenderError::Backend { .. }));
    assert!(device.violations().is_empty());
}

#[test]
fn staging_upload_fills_device_local_buffer() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer = Buffer::new(
        device.clone(),
        256,
        transfer_both(BufferUsage::VERTEX),
        MemoryProperty::DEVICE_LOCAL,
        true,
    )
    .unwrap();
    let data = pattern(200);

    buffer.upload_via_staging(GRAPHICS_QUEUE, 32, &data).unwrap();

    let bytes = device.buffer_contents(buffer.handle()).unwrap();
    assert_eq!(&bytes[32..232], data.as_slice());
    // staging buffer and its single-use unit are gone
    assert_eq!(device.live_buffers(), 1);
    assert_eq!(device.live_command_buffers(), 0);
    assert_eq!(device.pending_submissions(), 0);
    assert!(device.violations().is_empty());
}

#[test]
fn device_local_memory_is_never_mapped() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer = Buffer::new(
        device.clone(),
        64,
        transfer_both(BufferUsage::INDEX),
        MemoryProperty::DEVICE_LOCAL,
        true,
    )
    .unwrap();

    assert!(buffer.load_data(0, &[9; 8]).is_err());
    assert!(!device.violations().is_empty());
}

#[test]
fn copy_to_moves_bytes_between_buffers() {
    let device = Arc::new(HeadlessDevice::default());
    let mut src = Buffer::new(
        device.clone(),
        32,
        BufferUsage::TRANSFER_SRC,
        host_visible(),
        true,
    )
    .unwrap();
    let dst = Buffer::new(
        device.clone(),
        32,
        BufferUsage::TRANSFER_DST,
        MemoryProperty::DEVICE_LOCAL,
        true,
    )
    .unwrap();
    src.load_data(0, &pattern(32)).unwrap();

    src.copy_to(GRAPHICS_QUEUE, 8, &dst, 0, 16).unwrap();

    let bytes = device.buffer_contents(dst.handle()).unwrap();
    assert_eq!(&bytes[..16], &pattern(32)[8..24]);
    assert!(device.violations().is_empty());
}

#[test]
fn growing_resize_keeps_contents() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer = Buffer::new(
        device.clone(),
        64,
        transfer_both(BufferUsage::VERTEX),
        MemoryProperty::DEVICE_LOCAL,
        true,
    )
    .unwrap();
    let data = pattern(64);
    buffer.upload_via_staging(GRAPHICS_QUEUE, 0, &data).unwrap();
    let old_handle = buffer.handle();

    buffer.resize(256, GRAPHICS_QUEUE).unwrap();

    assert_ne!(buffer.handle(), old_handle);
    assert_eq!(buffer.total_size(), 256);
    let bytes = device.buffer_contents(buffer.handle()).unwrap();
    assert_eq!(bytes.len(), 256);
    assert_eq!(&bytes[..64], data.as_slice());
    assert_eq!(device.live_buffers(), 1);
    assert_eq!(device.live_memories(), 1);
    assert!(device.violations().is_empty());
}

#[test]
fn shrinking_resize_keeps_prefix() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer = Buffer::new(
        device.clone(),
        128,
        transfer_both(BufferUsage::INDEX),
        MemoryProperty::DEVICE_LOCAL,
        true,
    )
    .unwrap();
    let data = pattern(128);
    buffer.upload_via_staging(GRAPHICS_QUEUE, 0, &data).unwrap();

    buffer.resize(48, GRAPHICS_QUEUE).unwrap();

    let bytes = device.buffer_contents(buffer.handle()).unwrap();
    assert_eq!(bytes.as_slice(), &data[..48]);
    assert!(device.violations().is_empty());
}

#[test]
fn failed_resize_keeps_the_old_buffer() {
    let device = Arc::new(HeadlessDevice::default());
    let mut buffer = Buffer::new(
        device.clone(),
        32,
        transfer_both(BufferUsage::VERTEX),
        MemoryProperty::DEVICE_LOCAL,
        true,
    )
    .unwrap();
    let before = buffer.handle();

    assert!(buffer.resize(0, GRAPHICS_QUEUE).is_err());

    assert_eq!(buffer.handle(), before);
    assert_eq!(buffer.total_size(), 32);
    assert_eq!(device.live_buffers(), 1);
}

#[test]
fn missing_memory_type_is_reported() {
    let device = Arc::new(HeadlessDevice::new(HeadlessConfig {
        memory_types: vec![MemoryProperty::DEVICE_LOCAL],
        ..HeadlessConfig::default()
    }));

    let err = Buffer::new(
        device.clone(),
        64,
        BufferUsage::UNIFORM,
        host_visible(),
        true,
    )
    .err()
    .unwrap();

    assert!(matches!(
        err,
        RenderError::NoSuitableMemoryType { type_bits: 0b1, .. }
    ));
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_memories(), 0);
}

#[test]
fn drop_releases_buffer_and_memory_once() {
    let device = Arc::new(HeadlessDevice::default());
    {
        let mut a = Buffer::new(device.clone(), 16, BufferUsage::UNIFORM, host_visible(), true)
            .unwrap();
        let _b = Buffer::new(
            device.clone(),
            16,
            transfer_both(BufferUsage::VERTEX),
            MemoryProperty::DEVICE_LOCAL,
            true,
        )
        .unwrap();
        // left mapped on purpose
        a.lock_memory(0, 16).unwrap();
        assert_eq!(device.live_buffers(), 2);
    }
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_memories(), 0);
    assert!(device.violations().is_empty());
}
