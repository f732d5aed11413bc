//! Applying selected changes to the destination
//!
//! This module provides:
//! - **plan**: what to do per selected item, plus run options and the abort handle
//! - **synchronizer**: executes a plan under the sync lock
//! - **report**: one [`SyncResult`] per item

mod plan;
mod report;
mod synchronizer;

pub use plan::{AbortHandle, PlanAction, PlanItem, SyncOptions};
pub use report::{SyncOutcome, SyncReport, SyncResult};
pub use synchronizer::Synchronizer;
