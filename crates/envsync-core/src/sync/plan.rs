//! Sync plans and run options

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::{FileChange, ItemRef, Row, RowChange};

/// What to do with one selected item.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    /// Apply a file change; `content` replaces the source file's content
    ApplyFile {
        change: FileChange,
        content: Option<Vec<u8>>,
    },
    /// Apply a row change; `overrides` columns win over source values
    ApplyRow {
        change: RowChange,
        overrides: Option<Row>,
    },
    /// Not applied, reported as an error (e.g. unresolved conflict)
    Blocked { reason: String },
    /// Not applied, reported as a success (e.g. nothing to do)
    Skip { reason: String },
}

/// One entry of a sync plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub item: ItemRef,
    pub action: PlanAction,
}

impl PlanItem {
    pub fn new(item: ItemRef, action: PlanAction) -> Self {
        Self { item, action }
    }

    pub fn file(change: FileChange) -> Self {
        Self::new(
            ItemRef::file(change.relative_path.clone()),
            PlanAction::ApplyFile {
                change,
                content: None,
            },
        )
    }

    pub fn row(change: RowChange) -> Self {
        Self::new(
            ItemRef::row(change.table.clone(), change.primary_key_value.clone()),
            PlanAction::ApplyRow {
                change,
                overrides: None,
            },
        )
    }

    pub fn blocked(item: ItemRef, reason: impl Into<String>) -> Self {
        Self::new(
            item,
            PlanAction::Blocked {
                reason: reason.into(),
            },
        )
    }

    pub fn skip(item: ItemRef, reason: impl Into<String>) -> Self {
        Self::new(
            item,
            PlanAction::Skip {
                reason: reason.into(),
            },
        )
    }
}

/// Lets another thread stop a run between items.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run to stop before its next item.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Options for a synchronization run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// If true, report what would happen without writing anything.
    /// Messages are prefixed with "[dry-run] Would ..."
    pub dry_run: bool,
    /// Checked between items
    pub abort: AbortHandle,
}

impl SyncOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}
