//! Synchronization engine for paired staging/production environments
//!
//! This crate compares a source environment against a destination on two
//! axes, a file tree and a relational database, and applies an
//! operator-selected subset of the differences:
//!
//! - **Diffing**: fingerprint-based file diff and key-based row diff
//! - **Grouping**: row changes clustered into content units (a page with its
//!   revisions, attachments and metadata)
//! - **Conflicts**: destination values that moved since the last sync, and
//!   the operator decisions that settle them
//! - **Synchronization**: per-item application with failure isolation
//!
//! # Architecture
//!
//! ```text
//!                 envsync-cli
//!                      |
//!               StagingEngine
//!                      |
//!   +--------+---------+---------+----------+
//!   |        |         |         |          |
//!  diff    group   conflict     sync      cache
//!   |                  |         |
//!   +------ store ------+--------+
//!                      |
//!                 envsync-fs
//! ```

pub mod cache;
pub mod config;
pub mod conflict;
pub mod diff;
pub mod engine;
pub mod environment;
pub mod error;
pub mod group;
pub mod model;
pub mod store;
pub mod sync;

pub use cache::{DiffCache, DiffScope};
pub use config::{EngineConfig, Manifest};
pub use conflict::{Conflict, Decision, FinalValue, Resolution};
pub use diff::{DatabaseDiffReport, FileDiffReport, SchemaIssue};
pub use engine::StagingEngine;
pub use environment::{Endpoint, Environment};
pub use error::{Error, Result};
pub use model::{ChangeGroup, ChangeStatus, FileChange, GroupedChanges, ItemRef, ItemValue, RowChange};
pub use store::{RowStore, SqliteStore};
pub use sync::{AbortHandle, SyncOptions, SyncReport, SyncResult};
