//! Deferred destruction of GPU resources
//!
//! Resources replaced during a frame may still be read by commands in flight.
//! They are queued on the frame slot that last used them and destroyed once
//! that slot's fence has signaled.

use super::device::{GpuBuffer, GpuDevice};

type Deletion = Box<dyn FnOnce(&mut dyn GpuDevice)>;

/// FIFO of pending destructions for one frame slot
#[derive(Default)]
pub struct DeletionQueue {
    pending: Vec<Deletion>,
}

impl DeletionQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary destruction
    pub fn push(&mut self, deletion: impl FnOnce(&mut dyn GpuDevice) + 'static) {
        self.pending.push(Box::new(deletion));
    }

    /// Queue a buffer for destruction
    pub fn push_buffer(&mut self, buffer: GpuBuffer) {
        self.push(move |device| device.destroy_buffer(buffer));
    }

    /// Number of pending destructions
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run every pending destruction in queue order
    ///
    /// Only call once the owning slot's fence has signaled.
    pub fn flush(&mut self, device: &mut dyn GpuDevice) -> usize {
        let count = self.pending.len();
        for deletion in self.pending.drain(..) {
            deletion(device);
        }
        if count > 0 {
            log::trace!("Deletion queue flushed {} resources", count);
        }
        count
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.pending.len())
            .finish()
    }
}
