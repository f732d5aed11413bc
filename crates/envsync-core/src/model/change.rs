//! Change set types produced by the differs and the grouper

use std::collections::BTreeMap;
use std::fmt;

use envsync_fs::Fingerprint;
use serde::{Deserialize, Serialize};

use super::value::{Row, Value};

/// Direction-less classification of a change, seen from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Present on the source only
    Added,
    /// Present on both sides with different content
    Modified,
    /// Present on the destination only
    Deleted,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        })
    }
}

/// One changed path of the file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Forward-slash path relative to the environment root
    pub relative_path: String,
    pub status: ChangeStatus,
    pub source_hash: Option<Fingerprint>,
    pub destination_hash: Option<Fingerprint>,
}

/// Source and destination values of one column.
///
/// NULL stands in for the side on which the row does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub source_value: Value,
    pub destination_value: Value,
}

/// One changed row, identified by `(table, primary_key_value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    /// Logical table name (environment prefix stripped)
    pub table: String,
    /// Primary key column discovered for the table
    pub primary_key_column: String,
    pub primary_key_value: String,
    pub status: ChangeStatus,
    /// Added/Deleted: every compared column. Modified: only differing columns.
    pub field_diffs: BTreeMap<String, FieldDiff>,
    /// Human-readable one-liner
    pub summary: String,
    /// Full source row, when the row exists on the source
    pub source_row: Option<Row>,
    /// Full destination row, when the row exists on the destination
    pub destination_row: Option<Row>,
}

impl RowChange {
    /// Row details used for grouping: the source row, or the destination
    /// row when the change is a deletion.
    pub fn details(&self) -> Option<&Row> {
        self.source_row.as_ref().or(self.destination_row.as_ref())
    }

    /// Text value of a column from [`Self::details`].
    pub fn detail(&self, column: &str) -> Option<String> {
        self.details()?.get(column)?.as_text()
    }
}

/// A logical content unit: an anchor row plus its dependent rows.
///
/// Groups are a view over rows already present in the flat diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroup {
    /// Deterministic `<table>:<anchor key>`
    pub group_id: String,
    pub anchor: RowChange,
    /// Declared kind (content type) of the anchor
    pub kind: String,
    /// Child, metadata and related rows keyed by table, in discovery order
    pub members: BTreeMap<String, Vec<RowChange>>,
    /// Attachment rows, kept apart from other children
    pub attachments: Vec<RowChange>,
    pub title: String,
    pub status: ChangeStatus,
}

impl ChangeGroup {
    /// Anchor, attachments and members in application order.
    pub fn rows(&self) -> impl Iterator<Item = &RowChange> {
        std::iter::once(&self.anchor)
            .chain(self.attachments.iter())
            .chain(self.members.values().flatten())
    }

    /// Number of rows in the group, anchor included.
    pub fn row_count(&self) -> usize {
        1 + self.attachments.len() + self.members.values().map(Vec::len).sum::<usize>()
    }
}

/// Output of the grouper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedChanges {
    /// Groups ordered by kind, then discovery order
    pub groups: Vec<ChangeGroup>,
    /// Rows no grouping rule claimed
    pub standalone: Vec<RowChange>,
}

impl GroupedChanges {
    /// Groups bucketed by kind, for presentation.
    pub fn by_kind(&self) -> BTreeMap<&str, Vec<&ChangeGroup>> {
        let mut buckets: BTreeMap<&str, Vec<&ChangeGroup>> = BTreeMap::new();
        for group in &self.groups {
            buckets.entry(group.kind.as_str()).or_default().push(group);
        }
        buckets
    }

    pub fn find(&self, group_id: &str) -> Option<&ChangeGroup> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }
}
