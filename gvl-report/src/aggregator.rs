use std::collections::HashMap;

use gvl_core::{ErrorRecord, ResourceResolver, ValidationMessage};
use gvl_passes::Pass;

/// Messages produced within one frame/submit (§4.9 "within a report, messages
/// are grouped into steps").
#[derive(Debug, Clone, Default)]
pub struct ReportStep {
    pub messages: Vec<ValidationMessage>,
}

/// One application-bounded begin/end report (§4.9).
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub steps: Vec<ReportStep>,
}

/// Decodes drained ring records into report messages, routing each group by
/// feature-id to the owning pass's `Handle` (§4.9). One instance lives on
/// the device-state table in `gvl-layer`.
pub struct ReportAggregator {
    command_version: u64,
    current: Option<Report>,
    current_step: ReportStep,
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAggregator {
    pub fn new() -> Self {
        ReportAggregator {
            command_version: 0,
            current: None,
            current_step: ReportStep::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn begin_report(&mut self) {
        self.current = Some(Report::default());
        self.current_step = ReportStep::default();
    }

    /// Groups `records` by feature-id and hands each group to the pass that
    /// registered that id, appending the resulting messages to the step
    /// presently being accumulated. Records whose feature-id matches no
    /// registered pass are dropped with a warning (§7's "unknown descriptor
    /// operation" posture: never fatal, always logged).
    pub fn decode(&mut self, records: &[ErrorRecord], passes: &mut [Box<dyn Pass>], resolver: &dyn ResourceResolver) {
        if self.current.is_none() {
            log::warn!("gvl-report: decode() called with no open report; {} record(s) dropped", records.len());
            return;
        }
        let mut by_feature: HashMap<u8, Vec<ErrorRecord>> = HashMap::new();
        for record in records {
            by_feature.entry(record.feature_id).or_default().push(*record);
        }
        for (feature_id, group) in by_feature {
            match passes.iter_mut().find(|pass| pass.feature_id() as u8 == feature_id) {
                Some(pass) => {
                    let messages = pass.handle(self.command_version, &group, resolver);
                    self.current_step.messages.extend(messages);
                }
                None => {
                    log::warn!(
                        "gvl-report: no pass registered for feature-id {feature_id}, dropping {} record(s)",
                        group.len()
                    );
                }
            }
        }
    }

    /// Ends the step presently being accumulated (one per frame/submit,
    /// §4.9) and starts a fresh one.
    pub fn end_step(&mut self) {
        if let Some(report) = self.current.as_mut() {
            report.steps.push(std::mem::take(&mut self.current_step));
        }
        self.command_version += 1;
    }

    /// Ends the current report (§4.9): runs every pass's deferred `Report`
    /// to emit aggregates, folds in any not-yet-closed step, `Flush`es every
    /// pass's state, and returns the finished report.
    pub fn end_report(&mut self, passes: &mut [Box<dyn Pass>]) -> Report {
        for pass in passes.iter_mut() {
            pass.report();
        }
        let mut report = self.current.take().unwrap_or_default();
        let trailing_step = std::mem::take(&mut self.current_step);
        if !trailing_step.messages.is_empty() || report.steps.is_empty() {
            report.steps.push(trailing_step);
        }
        for pass in passes.iter_mut() {
            pass.flush();
        }
        report
    }
}
