//! Command implementations for envsync-cli

pub mod baseline;
pub mod conflicts;
pub mod diff;
pub mod groups;
pub mod sync;

pub use baseline::run_baseline;
pub use conflicts::{run_conflicts, run_resolve};
pub use diff::{DiffScope, run_diff, run_preview};
pub use groups::run_groups;
pub use sync::run_sync;

use envsync_core::ItemRef;

use crate::error::Result;

/// Parse item references given on the command line.
pub(crate) fn parse_items(items: &[String]) -> Result<Vec<ItemRef>> {
    Ok(items
        .iter()
        .map(|item| item.parse::<ItemRef>())
        .collect::<envsync_core::Result<Vec<_>>>()?)
}
