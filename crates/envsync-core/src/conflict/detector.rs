//! Conflict detection against recorded baselines

use chrono::Utc;
use envsync_fs::Fingerprint;
use uuid::Uuid;

use super::{BaselineLedger, Conflict, ConflictLedger};
use crate::model::{ItemRef, ItemValue};

/// Current state of one selected item on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub item: ItemRef,
    /// Value a sync would push
    pub source: ItemValue,
    /// Value the destination holds now
    pub destination: ItemValue,
    /// Fingerprint of `destination`; `None` when absent
    pub destination_fingerprint: Option<Fingerprint>,
}

/// Flags items whose destination value moved away from its baseline.
#[derive(Debug, Clone)]
pub struct ConflictDetector<'a> {
    staging_id: &'a str,
}

impl<'a> ConflictDetector<'a> {
    /// `staging_id` names the source environment the changes come from.
    pub fn new(staging_id: &'a str) -> Self {
        Self { staging_id }
    }

    /// Detect conflicts for `items`, record new ones in `ledger` and return them.
    ///
    /// An item without a baseline is never in conflict. An item already
    /// carrying a conflict for the same destination value and the same
    /// baseline is not flagged again; a different destination value, or a
    /// divergence from a newer baseline, yields a fresh conflict.
    pub fn detect(
        &self,
        items: &[ItemState],
        baselines: &BaselineLedger,
        ledger: &mut ConflictLedger,
    ) -> Vec<Conflict> {
        let mut detected = Vec::new();

        for state in items {
            let Some(baseline) = baselines.get(&state.item) else {
                tracing::debug!(item = %state.item, "no baseline recorded, not a conflict");
                continue;
            };

            let current = state.destination_fingerprint.as_ref();
            if baseline.fingerprint.as_ref() == current {
                continue;
            }

            if let Some(existing) = ledger.for_destination(&state.item, current, Some(baseline)) {
                tracing::debug!(
                    item = %state.item,
                    conflict = %existing.id,
                    "conflict already recorded for this destination value"
                );
                continue;
            }

            let conflict = Conflict {
                id: Uuid::new_v4(),
                staging_id: self.staging_id.to_string(),
                item_type: state.item.item_type(),
                item_ref: state.item.clone(),
                source_value: state.source.clone(),
                destination_value: state.destination.clone(),
                baseline_value: baseline.value.clone(),
                destination_fingerprint: state.destination_fingerprint.clone(),
                baseline_fingerprint: baseline.fingerprint.clone(),
                baseline_recorded_at: Some(baseline.recorded_at),
                resolved: false,
                resolution: None,
                custom_value: None,
                detected_at: Utc::now(),
                resolved_at: None,
            };
            tracing::warn!(item = %state.item, conflict = %conflict.id, "destination changed since last sync");
            ledger.add(conflict.clone());
            detected.push(conflict);
        }

        detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::BaselineEntry;
    use envsync_fs::checksum::fingerprint_str;
    use pretty_assertions::assert_eq;

    fn state(item: &ItemRef, destination: Option<&str>) -> ItemState {
        ItemState {
            item: item.clone(),
            source: ItemValue::File(fingerprint_str("source")),
            destination: destination
                .map(|d| ItemValue::File(fingerprint_str(d)))
                .unwrap_or(ItemValue::Absent),
            destination_fingerprint: destination.map(fingerprint_str),
        }
    }

    fn baselines(item: &ItemRef, value: Option<&str>) -> BaselineLedger {
        let mut ledger = BaselineLedger::new();
        ledger.record(item, BaselineEntry::new(value.map(fingerprint_str), None));
        ledger
    }

    #[test]
    fn unchanged_destination_is_not_a_conflict() {
        let item = ItemRef::file("style.css");
        let mut ledger = ConflictLedger::new();
        let found = ConflictDetector::new("staging").detect(
            &[state(&item, Some("v1"))],
            &baselines(&item, Some("v1")),
            &mut ledger,
        );
        assert!(found.is_empty());
        assert!(ledger.conflicts().is_empty());
    }

    #[test]
    fn missing_baseline_is_not_a_conflict() {
        let item = ItemRef::file("style.css");
        let mut ledger = ConflictLedger::new();
        let found = ConflictDetector::new("staging").detect(
            &[state(&item, Some("v2"))],
            &BaselineLedger::new(),
            &mut ledger,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn changed_destination_is_flagged_once_per_value() {
        let item = ItemRef::row("items", "5");
        let base = baselines(&item, Some("v1"));
        let mut ledger = ConflictLedger::new();
        let detector = ConflictDetector::new("staging");

        let first = detector.detect(&[state(&item, Some("v2"))], &base, &mut ledger);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].staging_id, "staging");
        assert!(!first[0].resolved);

        let again = detector.detect(&[state(&item, Some("v2"))], &base, &mut ledger);
        assert!(again.is_empty());

        let newer = detector.detect(&[state(&item, Some("v3"))], &base, &mut ledger);
        assert_eq!(newer.len(), 1);
        assert_eq!(ledger.conflicts().len(), 2);
    }

    #[test]
    fn deletion_on_destination_is_a_conflict() {
        let item = ItemRef::file("style.css");
        let mut ledger = ConflictLedger::new();
        let found = ConflictDetector::new("staging").detect(
            &[state(&item, None)],
            &baselines(&item, Some("v1")),
            &mut ledger,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].destination_value, ItemValue::Absent);
        assert_eq!(found[0].destination_fingerprint, None);
    }

    #[test]
    fn newer_baseline_retires_earlier_conflicts() {
        let item = ItemRef::file("style.css");
        let mut ledger = ConflictLedger::new();
        let detector = ConflictDetector::new("staging");

        let first = detector.detect(&[state(&item, Some("edited"))], &baselines(&item, Some("v1")), &mut ledger);
        assert_eq!(first.len(), 1);

        // A later sync re-records the baseline; the destination then returns
        // to the value the first conflict saw
        let resynced = baselines(&item, Some("pushed"));
        let second = detector.detect(&[state(&item, Some("edited"))], &resynced, &mut ledger);
        assert_eq!(second.len(), 1);
        assert_ne!(second[0].id, first[0].id);
        assert_eq!(second[0].baseline_fingerprint, Some(fingerprint_str("pushed")));
    }
}
