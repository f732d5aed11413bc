//! Recording operator decisions on conflicts

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Conflict, ConflictLedger, Resolution};
use crate::model::{ItemType, ItemValue};
use crate::{Error, Result};

/// What the operator chose for a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    KeepSource,
    KeepDestination,
    /// Replacement value: file content or a (partial) row
    Custom(ItemValue),
}

/// The value an item ends up with once its conflict is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalValue {
    pub resolution: Resolution,
    pub value: ItemValue,
}

/// Applies [`Decision`]s to conflicts in a [`ConflictLedger`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve conflict `id`.
    ///
    /// Resolving an already resolved conflict replaces the earlier decision.
    ///
    /// # Errors
    ///
    /// [`Error::ConflictNotFound`] for an unknown id, and
    /// [`Error::InvalidResolution`] when a custom value does not fit the
    /// item (file content for files, a row for rows).
    pub fn resolve(
        &self,
        ledger: &mut ConflictLedger,
        id: Uuid,
        decision: Decision,
    ) -> Result<FinalValue> {
        let conflict = ledger.get_mut(id).ok_or_else(|| Error::ConflictNotFound {
            id: id.to_string(),
        })?;

        let (outcome, custom) = match decision {
            Decision::KeepSource => (
                FinalValue {
                    resolution: Resolution::Source,
                    value: conflict.source_value.clone(),
                },
                None,
            ),
            Decision::KeepDestination => (
                FinalValue {
                    resolution: Resolution::Destination,
                    value: conflict.destination_value.clone(),
                },
                None,
            ),
            Decision::Custom(value) => {
                let value = checked_custom(conflict, value)?;
                let outcome = FinalValue {
                    resolution: Resolution::Custom,
                    value: merged_over_source(conflict, &value),
                };
                (outcome, Some(value))
            }
        };

        conflict.resolution = Some(outcome.resolution);
        // Only the operator's own columns are kept as overrides
        conflict.custom_value = custom;
        conflict.resolved = true;
        conflict.resolved_at = Some(Utc::now());

        tracing::info!(
            conflict = %id,
            item = %conflict.item_ref,
            resolution = %outcome.resolution,
            "conflict resolved"
        );
        Ok(outcome)
    }
}

/// Check a custom value against the item type.
fn checked_custom(conflict: &Conflict, value: ItemValue) -> Result<ItemValue> {
    let invalid = |message: &str| Error::InvalidResolution {
        message: format!("{}: {message}", conflict.item_ref),
    };

    match (conflict.item_type, value) {
        (ItemType::File, ItemValue::Content(bytes)) => Ok(ItemValue::Content(bytes)),
        (ItemType::File, _) => Err(invalid("a file needs replacement content")),
        (ItemType::Database, ItemValue::Row(custom)) if custom.is_empty() => {
            Err(invalid("a custom row needs at least one column"))
        }
        (ItemType::Database, ItemValue::Row(custom)) => Ok(ItemValue::Row(custom)),
        (ItemType::Database, _) => Err(invalid("a row needs a row value")),
    }
}

/// The row the item ends up with: a partial custom row only replaces the
/// columns it names.
fn merged_over_source(conflict: &Conflict, custom: &ItemValue) -> ItemValue {
    match (custom, &conflict.source_value) {
        (ItemValue::Row(custom), ItemValue::Row(source)) => {
            let mut merged = source.clone();
            merged.extend(custom.clone());
            ItemValue::Row(merged)
        }
        _ => custom.clone(),
    }
}
