//! Per-item results of a synchronization run

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ItemRef;

/// Outcome of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    Error,
}

/// Result of applying (or not applying) one selected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub item_ref: ItemRef,
    pub outcome: SyncOutcome,
    pub message: String,
}

impl SyncResult {
    pub fn success(item_ref: ItemRef, message: impl Into<String>) -> Self {
        Self {
            item_ref,
            outcome: SyncOutcome::Success,
            message: message.into(),
        }
    }

    pub fn error(item_ref: ItemRef, message: impl Into<String>) -> Self {
        Self {
            item_ref,
            outcome: SyncOutcome::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SyncOutcome::Success
    }
}

/// Report of one synchronization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    /// Nothing was written
    pub dry_run: bool,
    /// The run stopped before the last item
    pub aborted: bool,
    /// One result per selected item, in selection order
    pub results: Vec<SyncResult>,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            aborted: false,
            results: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// True when every item succeeded.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(SyncResult::is_success)
    }

    pub fn result_for(&self, item: &ItemRef) -> Option<&SyncResult> {
        self.results.iter().find(|r| &r.item_ref == item)
    }
}
