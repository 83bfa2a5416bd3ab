// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use portable_atomic::{AtomicU64, Ordering};

use crate::RenderSize;

#[derive(Debug, Default)]
struct Inner {
    generation: AtomicU64,
    /// `width << 32 | height`
    size: AtomicU64,
}

/// Resize notifications, shared between whoever observes the window and the
/// frame orchestrator. Notifying only stores the size and bumps the
/// generation; the orchestrator compares generations at the top of the next
/// frame and recreates then.
#[derive(Clone, Debug, Default)]
pub struct ResizeSignal {
    inner: Arc<Inner>,
}

impl ResizeSignal {
    pub fn new(size: RenderSize) -> Self {
        let s = Self::default();
        s.inner.size.store(pack(size), Ordering::Relaxed);
        s
    }

    pub fn notify(&self, size: RenderSize) {
        self.inner.size.store(pack(size), Ordering::Release);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Most recently notified size.
    pub fn size(&self) -> RenderSize {
        unpack(self.inner.size.load(Ordering::Acquire))
    }
}

fn pack(size: RenderSize) -> u64 {
    (u64::from(size.width) << 32) | u64::from(size.height)
}

fn unpack(v: u64) -> RenderSize {
    RenderSize::new((v >> 32) as u32, v as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_bumps_generation_and_stores_size() {
        let signal = ResizeSignal::new(RenderSize::new(800, 600));
        assert_eq!(signal.generation(), 0);
        assert_eq!(signal.size(), RenderSize::new(800, 600));

        let remote = signal.clone();
        remote.notify(RenderSize::new(1024, 768));
        remote.notify(RenderSize::new(0, 768));
        assert_eq!(signal.generation(), 2);
        assert_eq!(signal.size(), RenderSize::new(0, 768));
    }

    #[test]
    fn notify_from_another_thread() {
        let signal = ResizeSignal::new(RenderSize::new(1, 1));
        let remote = signal.clone();
        std::thread::spawn(move || remote.notify(RenderSize::new(u32::MAX, 7)))
            .join()
            .unwrap();
        assert_eq!(signal.generation(), 1);
        assert_eq!(signal.size(), RenderSize::new(u32::MAX, 7));
    }
}
