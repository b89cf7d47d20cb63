use gvl_core::ErrorRecord;

use crate::ring::MessageRing;

/// One submission's claim on a ring allocation (§4.9 "the host enqueues a
/// segment that owns one allocation of the ring"). A segment is created when
/// the command buffer touching `stream_id` is submitted and completed once
/// its driver fence signals.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub stream_id: usize,
}

impl Segment {
    pub fn new(stream_id: usize) -> Self {
        Segment { stream_id }
    }

    /// Runs on fence signal: reads the counter, clamps to capacity, and
    /// returns the decoded records for the decoder thread to route.
    pub fn complete(&self, ring: &MessageRing) -> Vec<ErrorRecord> {
        ring.drain(self.stream_id)
    }
}
