// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

use crate::device::MemoryProperty;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("device lost")]
    DeviceLost,

    #[error("fence wait timed out after {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    #[error("queue submission failed: {0}")]
    Submission(String),

    #[error("no memory type matches filter {type_bits:#b} with {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: MemoryProperty,
    },

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("invalid extent {width}x{height}")]
    InvalidExtent { width: u32, height: u32 },

    #[error("surface: {0}")]
    Surface(String),

    /// Frame protocol called out of order (for example `end_frame` without a
    /// successful `begin_frame`).
    #[error("frame protocol violated: {0}")]
    OutOfSequence(&'static str),

    #[error("{op} failed: {reason}")]
    Backend { op: &'static str, reason: String },
}

impl RenderError {
    pub fn backend(op: &'static str, reason: impl ToString) -> Self {
        Self::Backend {
            op,
            reason: reason.to_string(),
        }
    }

    /// Fatal errors end the render loop. Everything else leaves the renderer
    /// usable, although the failed call had no effect.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost
                | Self::FenceTimeout { .. }
                | Self::Submission(_)
                | Self::OutOfSequence(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(RenderError::DeviceLost.is_fatal());
        assert!(RenderError::Submission("queue".into()).is_fatal());
        assert!(RenderError::FenceTimeout { timeout_ns: 1 }.is_fatal());
        assert!(!RenderError::InvalidExtent { width: 0, height: 600 }.is_fatal());
        assert!(!RenderError::Allocation("oom".into()).is_fatal());
    }

    #[test]
    fn memory_type_message_names_the_filter() {
        let e = RenderError::NoSuitableMemoryType {
            type_bits: 0b101,
            required: MemoryProperty::DEVICE_LOCAL,
        };
        let msg = e.to_string();
        assert!(msg.contains("0b101"), "{msg}");
        assert!(msg.contains("DEVICE_LOCAL"), "{msg}");
    }
}
