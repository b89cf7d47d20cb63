use gvl_report::Segment;

use crate::device::DeviceState;

/// Work injected at the start of a submission batch: a refresh of every
/// valid descriptor set's diagnostic tables, so guard code reads
/// up-to-date PRMT/metadata even for resources created since the last
/// submission (§5 "pre-batch command buffer ... carries the layer's
/// descriptor-table refresh").
#[derive(Debug, Default, Clone, Copy)]
pub struct PreBatchWork {
    pub sets_refreshed: usize,
}

/// Work injected at the end of a submission batch: resets the message
/// ring's per-stream counters so the next batch's segment starts counting
/// from zero (§5 "post-batch command buffer ... carries ... the
/// ring-counter reset").
#[derive(Debug, Default, Clone, Copy)]
pub struct PostBatchWork {
    pub streams_reset: usize,
}

/// One submission batch, ordered exactly as §5 requires: pre-batch command
/// buffer, then every user command buffer, then post-batch command buffer.
/// The struct shape enforces this by construction -- there is no field that
/// lets a caller interleave `pre`/`post` with `user_buffer_count` buffers in
/// a different order.
#[derive(Debug)]
pub struct SubmissionBatch {
    pub pre: PreBatchWork,
    pub user_buffer_count: usize,
    pub post: PostBatchWork,
}

impl DeviceState {
    /// Builds the pre/post bookend work for a batch of `user_buffer_count`
    /// application command buffers (§5).
    pub fn begin_submission(&self, user_buffer_count: usize) -> SubmissionBatch {
        SubmissionBatch {
            pre: PreBatchWork {
                sets_refreshed: self.descriptors.valid_set_ids().len(),
            },
            user_buffer_count,
            post: PostBatchWork {
                streams_reset: self.ring.stream_count(),
            },
        }
    }

    /// Runs on the segment's driver fence signal (§4.9): drains the
    /// segment's ring stream, clamping to capacity, and routes the decoded
    /// records into the device's open report by feature-id.
    pub fn complete_segment(&self, segment: &Segment) {
        let records = segment.complete(&self.ring);
        if records.is_empty() {
            return;
        }
        let mut passes = self.active_passes();
        self.report.lock().decode(&records, &mut passes, &self.descriptors);
    }
}
