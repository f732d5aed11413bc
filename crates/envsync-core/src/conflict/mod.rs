//! Conflict tracking between a pending change and an independently
//! modified destination
//!
//! This module provides:
//! - **ledger**: the persisted baseline and conflict ledgers
//! - **detector**: compares destination values against their baselines
//! - **resolver**: records an operator decision on a conflict

mod detector;
mod ledger;
mod resolver;

pub use detector::{ConflictDetector, ItemState};
pub use ledger::{BaselineEntry, BaselineLedger, ConflictLedger, LedgerLock};
pub use resolver::{ConflictResolver, Decision, FinalValue};

use chrono::{DateTime, Utc};
use envsync_fs::Fingerprint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ItemRef, ItemType, ItemValue};

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Push the source value
    Source,
    /// Leave the destination as it is
    Destination,
    /// Push an operator-supplied value
    Custom,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Custom => "custom",
        })
    }
}

/// The destination changed an item since it was last known to be in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    /// Source environment the pending change comes from
    pub staging_id: String,
    pub item_type: ItemType,
    pub item_ref: ItemRef,
    /// What a sync would push
    pub source_value: ItemValue,
    /// What the destination holds now
    pub destination_value: ItemValue,
    /// Last known-synchronized value
    pub baseline_value: Option<ItemValue>,
    /// Fingerprint of `destination_value`; `None` when absent
    pub destination_fingerprint: Option<Fingerprint>,
    /// Baseline entry the divergence was measured against
    #[serde(default)]
    pub baseline_fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub baseline_recorded_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolution: Option<Resolution>,
    pub custom_value: Option<ItemValue>,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Whether this conflict describes the item's current situation: the
    /// destination still holds the value it was detected against, and the
    /// baseline has not been re-recorded since.
    pub fn applies_to(&self, fingerprint: Option<&Fingerprint>, baseline: &BaselineEntry) -> bool {
        self.destination_fingerprint.as_ref() == fingerprint
            && self.baseline_recorded_at == Some(baseline.recorded_at)
            && self.baseline_fingerprint == baseline.fingerprint
    }
}
