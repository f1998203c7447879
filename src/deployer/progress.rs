//! Deployment progress channel.
//!
//! Every externally observable milestone of a deployment produces a
//! [`ProgressEvent`]. Events carry the cumulative cost so far, which only ever
//! grows, so a listener can drive a progress bar without keeping state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milestone of one item's deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    /// Work on the item began.
    Started,
    /// The item exists in the destination catalog.
    Created,
    /// One sub-part of a composite was accepted.
    AddedPart,
    /// Deferred definitions or the final item update were applied.
    Updated,
    /// The item is complete.
    Done,
    /// The item failed; the error follows.
    Failed,
    /// The item was rolled back after the listener asked to stop.
    Cancelled,
}

impl ProgressStatus {
    /// Status keyword as reported to listeners.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Created => "created",
            Self::AddedPart => "added-part",
            Self::Updated => "updated",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Source id of the item the event is about.
    pub process_id: String,
    /// Milestone reached.
    pub status: ProgressStatus,
    /// Cost units consumed so far across the deployment.
    pub cost_used: u64,
    /// Current estimate of the deployment's total cost.
    pub total_cost: u64,
}

/// Listener for progress events.
///
/// The return value is only consulted for [`ProgressStatus::Done`] events:
/// returning `false` there asks the deployment to stop after that item.
pub type ProgressCallback<'a> = Box<dyn FnMut(&ProgressEvent) -> bool + Send + 'a>;

/// Monotonic cost accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostTracker {
    used: u64,
    total: u64,
}

impl CostTracker {
    /// Start accounting against an estimated total.
    pub fn new(total: u64) -> Self {
        Self {
            used: 0,
            total,
        }
    }

    /// Consume `units`; the total grows if the estimate is exceeded.
    pub fn charge(&mut self, units: u64) {
        self.used = self.used.saturating_add(units);
        self.total = self.total.max(self.used);
    }

    /// Units consumed so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Current total estimate.
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Cost tracker plus an optional listener.
pub struct ProgressReporter<'a> {
    tracker: CostTracker,
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    /// Report to `callback`.
    pub fn new(total: u64, callback: ProgressCallback<'a>) -> Self {
        Self {
            tracker: CostTracker::new(total),
            callback: Some(callback),
        }
    }

    /// Account cost without a listener.
    pub fn silent(total: u64) -> Self {
        Self {
            tracker: CostTracker::new(total),
            callback: None,
        }
    }

    /// Consume cost units.
    pub fn charge(&mut self, units: u64) {
        self.tracker.charge(units);
    }

    /// Current accounting.
    pub fn tracker(&self) -> CostTracker {
        self.tracker
    }

    /// Notify the listener. Returns whether the deployment may continue.
    pub fn emit(&mut self, process_id: &str, status: ProgressStatus) -> bool {
        let event = ProgressEvent {
            process_id: process_id.to_string(),
            status,
            cost_used: self.tracker.used(),
            total_cost: self.tracker.total(),
        };
        tracing::debug!(
            "{} {} ({}/{})",
            event.process_id,
            event.status,
            event.cost_used,
            event.total_cost
        );
        match self.callback.as_mut() {
            Some(callback) => callback(&event) || status != ProgressStatus::Done,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_cost_is_monotonic_and_total_grows() {
        let mut tracker = CostTracker::new(3);
        tracker.charge(2);
        assert_eq!((tracker.used(), tracker.total()), (2, 3));
        tracker.charge(4);
        assert_eq!((tracker.used(), tracker.total()), (6, 6));
    }

    #[test]
    fn test_reporter_stops_only_on_done() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut reporter = ProgressReporter::new(
            5,
            Box::new(move |event: &ProgressEvent| {
                sink.lock().push(event.clone());
                false
            }),
        );
        reporter.charge(1);
        assert!(reporter.emit("abc", ProgressStatus::Created));
        assert!(!reporter.emit("abc", ProgressStatus::Done));

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].cost_used, 1);
        assert_eq!(events[0].total_cost, 5);
        assert_eq!(events[1].status, ProgressStatus::Done);
    }

    #[test]
    fn test_status_keywords() {
        assert_eq!(ProgressStatus::AddedPart.to_string(), "added-part");
        assert_eq!(serde_json::to_string(&ProgressStatus::Cancelled).unwrap(), "\"cancelled\"");
    }
}
