//! Filesystem layer for envsync
//!
//! Provides the pieces the engine needs to look at and touch a file tree:
//! normalized relative paths, content fingerprints, exclusion rules,
//! a filtered tree walker, atomic writes and the advisory sync lock.

pub mod checksum;
pub mod config;
pub mod error;
pub mod exclude;
pub mod io;
pub mod lock;
pub mod path;
pub mod walk;

pub use checksum::{ContentClass, Fingerprint};
pub use config::ConfigStore;
pub use error::{Error, Result};
pub use exclude::ExclusionRules;
pub use lock::SyncLock;
pub use path::NormalizedPath;
pub use walk::{ScanWarning, TreeWalker, WalkItem, WarningKind};
