//! Applying a sync plan to the destination

use std::time::Duration;

use envsync_fs::{NormalizedPath, SyncLock};

use super::plan::{PlanAction, PlanItem, SyncOptions};
use super::report::{SyncReport, SyncResult};
use crate::environment::Endpoint;
use crate::model::{ChangeStatus, FileChange, ItemRef, Row, RowChange};
use crate::{Error, Result};

const UNAVAILABLE: &str = "destination unavailable";
const ABORTED: &str = "sync aborted before this item";

/// Applies plan items from the source to the destination, one at a time.
///
/// Each item succeeds or fails on its own; only a destination that cannot
/// be reached at all stops the batch.
pub struct Synchronizer<'a> {
    source: &'a Endpoint,
    destination: &'a Endpoint,
    lock_path: NormalizedPath,
    lock_timeout: Duration,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        source: &'a Endpoint,
        destination: &'a Endpoint,
        lock_path: NormalizedPath,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            lock_path,
            lock_timeout,
        }
    }

    /// Run `plan` under the sync lock.
    ///
    /// Dry runs do not take the lock.
    ///
    /// # Errors
    ///
    /// [`Error::SyncInProgress`] when another run holds the lock past the
    /// timeout. Item failures are reported in the [`SyncReport`].
    pub fn run(&self, plan: Vec<PlanItem>, options: &SyncOptions) -> Result<SyncReport> {
        let _lock = if options.dry_run {
            None
        } else {
            Some(
                SyncLock::acquire(&self.lock_path, self.lock_timeout).map_err(|e| match e {
                    envsync_fs::Error::LockFailed { .. } => Error::SyncInProgress {
                        path: self.lock_path.to_native(),
                    },
                    other => other.into(),
                })?,
            )
        };

        let mut report = SyncReport::new(options.dry_run);
        let mut items = plan.into_iter();
        let mut stop_reason: Option<&str> = None;

        for planned in items.by_ref() {
            if options.abort.is_aborted() {
                report.aborted = true;
                report.results.push(SyncResult::error(planned.item, ABORTED));
                stop_reason = Some(ABORTED);
                break;
            }

            let item = planned.item.clone();
            match self.apply(planned, options.dry_run) {
                Ok(result) => {
                    tracing::debug!(item = %result.item_ref, message = %result.message, "item processed");
                    report.results.push(result);
                }
                Err(e) if e.is_destination_unavailable() || self.destination.store.is_unavailable(&e) => {
                    tracing::warn!(%item, error = %e, "destination unavailable, stopping run");
                    report.aborted = true;
                    report.results.push(SyncResult::error(item, e.to_string()));
                    stop_reason = Some(UNAVAILABLE);
                    break;
                }
                Err(e) => {
                    tracing::warn!(%item, error = %e, "item failed");
                    report.results.push(SyncResult::error(item, e.to_string()));
                }
            }
        }

        if let Some(reason) = stop_reason {
            for rest in items {
                report.results.push(SyncResult::error(rest.item, reason));
            }
        }

        tracing::info!(
            run = %report.run_id,
            dry_run = report.dry_run,
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            aborted = report.aborted,
            "sync run finished"
        );
        Ok(report)
    }

    fn apply(&self, planned: PlanItem, dry_run: bool) -> Result<SyncResult> {
        let item = planned.item;
        match planned.action {
            PlanAction::Skip { reason } => Ok(SyncResult::success(item, reason)),
            PlanAction::Blocked { reason } => Ok(SyncResult::error(item, reason)),
            PlanAction::ApplyFile { change, content } => {
                let message = self.apply_file(&change, content.as_deref(), dry_run)?;
                Ok(SyncResult::success(item, message))
            }
            PlanAction::ApplyRow { change, overrides } => {
                let message = self
                    .apply_row(&change, overrides.as_ref(), dry_run)
                    .map_err(|e| {
                        if self.destination.store.is_unavailable(&e) {
                            e
                        } else {
                            apply_error(&item, e)
                        }
                    })?;
                Ok(SyncResult::success(item, message))
            }
        }
    }

    fn apply_file(&self, change: &FileChange, content: Option<&[u8]>, dry_run: bool) -> Result<String> {
        let path = change.relative_path.as_str();
        let root = &self.destination.environment.root;
        if !root.is_dir() {
            return Err(Error::DestinationUnavailable {
                message: format!("root {root} does not exist"),
            });
        }
        let target = self.destination.environment.file_path(path);

        let item = ItemRef::file(path);
        match (change.status, content) {
            (_, Some(bytes)) => {
                if dry_run {
                    return Ok(format!("[dry-run] Would write custom content to {path}"));
                }
                envsync_fs::io::write_atomic(&target, bytes).map_err(|e| apply_error(&item, e.into()))?;
                Ok(format!("Wrote custom content to {path}"))
            }
            (ChangeStatus::Added | ChangeStatus::Modified, None) => {
                if dry_run {
                    return Ok(format!("[dry-run] Would copy {path}"));
                }
                let source = self.source.environment.file_path(path);
                let bytes = envsync_fs::io::copy_atomic(&source, &target)
                    .map_err(|e| apply_error(&item, e.into()))?;
                Ok(format!("Copied {path} ({bytes} bytes)"))
            }
            (ChangeStatus::Deleted, None) => {
                if dry_run {
                    return Ok(format!("[dry-run] Would delete {path}"));
                }
                let removed = envsync_fs::io::remove_if_present(&target)
                    .map_err(|e| apply_error(&item, e.into()))?;
                Ok(if removed {
                    format!("Deleted {path}")
                } else {
                    format!("{path} already absent")
                })
            }
        }
    }

    fn apply_row(&self, change: &RowChange, overrides: Option<&Row>, dry_run: bool) -> Result<String> {
        let table = self.destination.environment.physical_table(&change.table);
        let key_column = change.primary_key_column.as_str();
        let key = change.primary_key_value.as_str();
        let label = format!("{} #{}", change.table, key);
        let store = &self.destination.store;

        match (change.status, overrides) {
            (ChangeStatus::Deleted, None) => {
                if dry_run {
                    return Ok(format!("[dry-run] Would delete {label}"));
                }
                let removed = store.delete_row(&table, key_column, key)?;
                Ok(if removed > 0 {
                    format!("Deleted {label}")
                } else {
                    format!("{label} already absent")
                })
            }
            (ChangeStatus::Modified, _) => {
                let mut values: Row = change
                    .field_diffs
                    .iter()
                    .map(|(column, diff)| {
                        let value = change
                            .source_row
                            .as_ref()
                            .and_then(|row| row.get(column))
                            .unwrap_or(&diff.source_value);
                        (column.clone(), value.clone())
                    })
                    .collect();
                if let Some(overrides) = overrides {
                    values.extend(overrides.clone());
                }
                values.remove(key_column);

                if dry_run {
                    return Ok(format!(
                        "[dry-run] Would update {label} ({} columns)",
                        values.len()
                    ));
                }
                let updated = store.update_row(&table, key_column, key, &values)?;
                if updated == 0 {
                    return Err(Error::Apply {
                        item: label,
                        message: "row no longer exists on the destination".to_string(),
                    });
                }
                Ok(format!("Updated {label} ({} columns)", values.len()))
            }
            (_, overrides) => {
                // Added rows, and any row given an operator-supplied value
                let mut row = change.source_row.clone().unwrap_or_default();
                if let Some(overrides) = overrides {
                    row.extend(overrides.clone());
                }
                if row.is_empty() {
                    return Err(Error::Apply {
                        item: label,
                        message: "no source row to insert".to_string(),
                    });
                }
                row.entry(key_column.to_string())
                    .or_insert_with(|| key.into());

                if dry_run {
                    return Ok(format!("[dry-run] Would insert {label}"));
                }
                if store.fetch_row(&table, key_column, key)?.is_some() {
                    let mut values = row;
                    values.remove(key_column);
                    store.update_row(&table, key_column, key, &values)?;
                    Ok(format!("Updated existing {label}"))
                } else {
                    store.insert_row(&table, &row)?;
                    Ok(format!("Inserted {label}"))
                }
            }
        }
    }
}

/// Wrap an item failure, leaving unavailability errors intact for the run loop.
fn apply_error(item: &ItemRef, err: Error) -> Error {
    if err.is_destination_unavailable() {
        return err;
    }
    match err {
        Error::Apply { .. } => err,
        other => Error::Apply {
            item: item.to_string(),
            message: other.to_string(),
        },
    }
}
