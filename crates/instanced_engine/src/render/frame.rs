//! Frames-in-flight scheduling
//!
//! Each in-flight slot owns a fence and a deletion queue. Beginning a frame on
//! a slot waits for that slot's previous submission, then releases whatever
//! the slot retired while it was in flight.

use ash::vk;

use super::deletion_queue::DeletionQueue;
use super::device::GpuDevice;
use super::error::RenderResult;

/// The slot a frame is being recorded into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// Slot index in `0..max_frames_in_flight`
    pub index: usize,
    /// Fence the frame's submission must signal
    pub fence: vk::Fence,
    /// Monotonic frame counter
    pub frame_number: u64,
}

#[derive(Debug)]
struct SlotState {
    fence: vk::Fence,
    deletion: DeletionQueue,
    submitted: bool,
}

/// Round-robin owner of the per-slot fences and deletion queues
#[derive(Debug)]
pub struct FrameScheduler {
    slots: Vec<SlotState>,
    current: usize,
    frame_number: u64,
    fence_timeout_ns: u64,
    recording: bool,
}

impl FrameScheduler {
    /// Create `frames_in_flight` slots
    pub fn new(device: &mut dyn GpuDevice, frames_in_flight: usize, fence_timeout_ns: u64) -> RenderResult<Self> {
        log::debug!("Creating FrameScheduler with {} frames in flight", frames_in_flight);

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            slots.push(SlotState {
                fence: device.create_fence()?,
                deletion: DeletionQueue::new(),
                submitted: false,
            });
        }

        Ok(Self {
            slots,
            current: 0,
            frame_number: 0,
            fence_timeout_ns,
            recording: false,
        })
    }

    /// Number of slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Frames begun so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Wait for the current slot, flush its deletions and hand it out
    ///
    /// On a fence timeout the slot keeps its pending deletions and the error
    /// is returned.
    pub fn begin_frame(&mut self, device: &mut dyn GpuDevice) -> RenderResult<FrameSlot> {
        let slot = &mut self.slots[self.current];

        // Only wait if this slot has actually been submitted before
        if slot.submitted {
            device.wait_for_fence(slot.fence, self.fence_timeout_ns)?;
            device.reset_fence(slot.fence)?;
            slot.submitted = false;
        }
        slot.deletion.flush(device);

        self.recording = true;
        Ok(FrameSlot {
            index: self.current,
            fence: slot.fence,
            frame_number: self.frame_number,
        })
    }

    /// Deletion queue of `slot`
    pub fn deletion_queue(&mut self, slot: usize) -> &mut DeletionQueue {
        &mut self.slots[slot].deletion
    }

    /// Mark the current slot as submitted and advance to the next
    pub fn end_frame(&mut self) {
        if !self.recording {
            log::warn!("end_frame called without begin_frame");
            return;
        }
        self.slots[self.current].submitted = true;
        self.recording = false;
        self.current = (self.current + 1) % self.slots.len();
        self.frame_number += 1;
    }

    /// Give up on the frame being recorded; the slot is reused next time
    pub fn abort_frame(&mut self) {
        self.recording = false;
    }

    /// Wait for every submitted slot, run all deletions and destroy the fences
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for slot in &mut self.slots {
            if slot.submitted {
                if let Err(e) = device.wait_for_fence(slot.fence, self.fence_timeout_ns) {
                    log::warn!("Frame fence wait failed during shutdown: {}", e);
                }
            }
            slot.deletion.flush(device);
            device.destroy_fence(slot.fence);
        }
        self.slots.clear();
        log::debug!("FrameScheduler destroyed");
    }
}
