//! Record of pin outcomes per identifier.
//!
//! Pinning is best-effort. A `LimitedPlan` outcome never blocks a write; the
//! ledger is what the UI asks to decide whether to show the "shared, but may
//! not persist" warning next to an item.

use std::sync::Arc;

use board_types::ContentId;
use dashmap::DashMap;

use crate::store::PinOutcome;

/// Concurrent map from identifier to its last pin outcome.
#[derive(Debug, Clone, Default)]
pub struct PinLedger {
    outcomes: Arc<DashMap<ContentId, PinOutcome>>,
}

impl PinLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a pin request, replacing any earlier one.
    pub fn record(&self, cid: &ContentId, outcome: PinOutcome) {
        if let PinOutcome::LimitedPlan { reason } = &outcome {
            tracing::warn!(cid = %cid, reason = %reason, "Pin limited by plan");
        }
        self.outcomes.insert(cid.clone(), outcome);
    }

    /// Last recorded outcome for `cid`.
    pub fn outcome(&self, cid: &ContentId) -> Option<PinOutcome> {
        self.outcomes.get(cid).map(|entry| entry.value().clone())
    }

    /// Whether the last pin of `cid` was refused by the plan.
    pub fn has_limitation(&self, cid: &ContentId) -> bool {
        matches!(self.outcome(cid), Some(PinOutcome::LimitedPlan { .. }))
    }

    /// All identifiers whose last pin was refused by the plan.
    pub fn limited(&self) -> Vec<ContentId> {
        let mut cids: Vec<ContentId> = self
            .outcomes
            .iter()
            .filter(|entry| matches!(entry.value(), PinOutcome::LimitedPlan { .. }))
            .map(|entry| entry.key().clone())
            .collect();
        cids.sort();
        cids
    }

    /// Number of identifiers recorded.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
