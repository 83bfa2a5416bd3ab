// SPDX-License-Identifier: CEPL-1.0
//! Fence and semaphore wrappers.
//!
//! Semaphores only order GPU work: they are handed to submit/acquire/present
//! and never polled or reset. Fences are the CPU's view of GPU progress.
use std::sync::Arc;

use tracing::{debug, warn};

use crate::device::{Device, FenceWait};
use crate::error::RenderResult;

pub struct Semaphore<D: Device> {
    device: Arc<D>,
    handle: D::Semaphore,
}

impl<D: Device> Semaphore<D> {
    pub fn new(device: Arc<D>) -> RenderResult<Self> {
        let handle = device.create_semaphore()?;
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> D::Semaphore {
        self.handle
    }
}

impl<D: Device> Drop for Semaphore<D> {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.handle);
    }
}

/// CPU-observable fence with a cached signaled flag, so waiting on a fence
/// already seen signaled costs nothing.
pub struct Fence<D: Device> {
    device: Arc<D>,
    handle: D::Fence,
    signaled: bool,
}

impl<D: Device> Fence<D> {
    /// A fence created signaled lets the first wait on it pass immediately.
    pub fn new(device: Arc<D>, signaled: bool) -> RenderResult<Self> {
        let handle = device.create_fence(signaled)?;
        debug!(?handle, signaled, "fence created");
        Ok(Self {
            device,
            handle,
            signaled,
        })
    }

    #[inline]
    pub fn handle(&self) -> D::Fence {
        self.handle
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    /// Blocks until the fence signals or `timeout_ns` elapses.
    ///
    /// `Ok(false)` is a timeout and is only logged; the caller decides what
    /// to do with the frame. Errors (device loss and friends) are not retried.
    pub fn wait(&mut self, timeout_ns: u64) -> RenderResult<bool> {
        if self.signaled {
            return Ok(true);
        }
        match self.device.wait_for_fence(self.handle, timeout_ns)? {
            FenceWait::Signaled => {
                self.signaled = true;
                Ok(true)
            }
            FenceWait::TimedOut => {
                warn!(handle = ?self.handle, timeout_ns, "fence wait timed out");
                Ok(false)
            }
        }
    }

    /// Signaled -> unsignaled. Callers wait first; resetting an unsignaled
    /// fence is a protocol error.
    pub fn reset(&mut self) -> RenderResult<()> {
        debug_assert!(self.signaled, "reset of a fence that was never seen signaled");
        self.device.reset_fence(self.handle)?;
        self.signaled = false;
        Ok(())
    }
}

impl<D: Device> Drop for Fence<D> {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn signaled_fence_passes_without_touching_the_device() {
        let device = Arc::new(HeadlessDevice::default());
        let mut fence = Fence::new(device.clone(), true).unwrap();
        device.clear_events();
        assert!(fence.wait(u64::MAX).unwrap());
        assert!(device.events().is_empty());
    }

    #[test]
    fn reset_then_wait_on_idle_queue_times_out() {
        let device = Arc::new(HeadlessDevice::default());
        let mut fence = Fence::new(device.clone(), true).unwrap();
        fence.reset().unwrap();
        assert!(!fence.is_signaled());
        // nothing submitted against it, so it can never signal
        assert!(!fence.wait(1_000).unwrap());
        assert!(device.violations().is_empty());
    }

    #[test]
    fn device_loss_is_an_error() {
        let device = Arc::new(HeadlessDevice::default());
        let mut fence = Fence::new(device.clone(), false).unwrap();
        device.faults().lose_device();
        assert!(fence.wait(u64::MAX).is_err());
    }

    #[test]
    fn drop_destroys_handles() {
        let device = Arc::new(HeadlessDevice::default());
        {
            let _f = Fence::new(device.clone(), true).unwrap();
            let _s = Semaphore::new(device.clone()).unwrap();
            assert_eq!(device.live_fences(), 1);
            assert_eq!(device.live_semaphores(), 1);
        }
        assert_eq!(device.live_fences(), 0);
        assert_eq!(device.live_semaphores(), 0);
        assert!(device.violations().is_empty());
    }
}
