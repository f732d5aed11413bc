//! Data model shared by the differs, the grouper, conflicts and sync

mod change;
mod item;
mod value;

pub use change::{ChangeGroup, ChangeStatus, FieldDiff, FileChange, GroupedChanges, RowChange};
pub use item::{ItemRef, ItemType, ItemValue};
pub use value::{Row, Value, row_fingerprint};
