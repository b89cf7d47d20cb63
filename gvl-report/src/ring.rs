use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use gvl_core::ErrorRecord;

struct StreamSlot {
    counter: AtomicU32,
    words: Mutex<Vec<u32>>,
}

/// Host-side model of the GPU-writable message ring (§4.9, §6): one atomic
/// counter and one capacity-sized word buffer per stream. Real GPU execution
/// is out of scope here -- this reproduces exactly the semantics injected
/// guard code has, `idx = atomicAdd(counter[streamId], 1); if (idx <
/// capacity) stream[streamId].write(idx, payload)`, so the host-side
/// segment/decoder path can be driven deterministically from plain data.
pub struct MessageRing {
    capacity: u32,
    streams: Vec<StreamSlot>,
}

impl MessageRing {
    pub fn new(stream_count: usize, capacity: u32) -> Self {
        let streams = (0..stream_count)
            .map(|_| StreamSlot {
                counter: AtomicU32::new(0),
                words: Mutex::new(vec![0u32; capacity as usize]),
            })
            .collect();
        MessageRing { capacity, streams }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// One simulated guard-code write. Returns whether it landed; `false`
    /// means the pre-incremented index was past capacity and the write was
    /// dropped, matching the boundary behaviour in §8 ("one more write is
    /// dropped").
    pub fn record(&self, stream_id: usize, word: u32) -> bool {
        let slot = &self.streams[stream_id];
        let idx = slot.counter.fetch_add(1, Ordering::SeqCst);
        if idx < self.capacity {
            slot.words.lock()[idx as usize] = word;
            true
        } else {
            false
        }
    }

    /// Segment completion (§4.9): reads the stream's counter, clamps to
    /// capacity, decodes the populated prefix into records, and resets the
    /// counter so the ring allocation can be reused by the next segment.
    pub fn drain(&self, stream_id: usize) -> Vec<ErrorRecord> {
        let slot = &self.streams[stream_id];
        let observed = slot.counter.swap(0, Ordering::SeqCst);
        let delivered = observed.min(self.capacity);
        let words = slot.words.lock();
        words[..delivered as usize]
            .iter()
            .map(|&word| ErrorRecord::unpack(word))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_up_to_capacity_are_all_delivered() {
        let ring = MessageRing::new(1, 4);
        for i in 0..4u32 {
            assert!(ring.record(0, ErrorRecord::new(1, i, 0).pack()));
        }
        let drained = ring.drain(0);
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0].span_guid, 0);
        assert_eq!(drained[3].span_guid, 3);
    }

    #[test]
    fn writes_past_capacity_are_dropped() {
        let ring = MessageRing::new(1, 4);
        for i in 0..4u32 {
            assert!(ring.record(0, ErrorRecord::new(1, i, 0).pack()));
        }
        assert!(!ring.record(0, ErrorRecord::new(1, 99, 0).pack()));
        assert_eq!(ring.drain(0).len(), 4);
    }

    #[test]
    fn drain_resets_the_counter_for_reuse() {
        let ring = MessageRing::new(1, 2);
        ring.record(0, ErrorRecord::new(1, 0, 0).pack());
        assert_eq!(ring.drain(0).len(), 1);
        ring.record(0, ErrorRecord::new(1, 7, 0).pack());
        let drained = ring.drain(0);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].span_guid, 7);
    }

    #[test]
    fn streams_are_independent() {
        let ring = MessageRing::new(2, 4);
        ring.record(0, ErrorRecord::new(1, 1, 0).pack());
        ring.record(1, ErrorRecord::new(2, 2, 0).pack());
        assert_eq!(ring.drain(0).len(), 1);
        assert_eq!(ring.drain(1).len(), 1);
    }
}
