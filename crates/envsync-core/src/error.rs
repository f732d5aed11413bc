//! Error types for envsync-core

use std::path::PathBuf;

use rusqlite::ErrorCode;

/// Result type for envsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in envsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path could not be scanned
    #[error("Scan error at {path}: {message}")]
    Scan { path: String, message: String },

    /// A table cannot be diffed (missing on one side, no usable primary key)
    #[error("Schema error in table {table}: {message}")]
    Schema { table: String, message: String },

    /// An item with an unresolved conflict was selected for synchronization
    #[error("Unresolved conflict for {item}; resolve it before synchronizing")]
    Conflict { item: String },

    /// A destination write failed for one item
    #[error("Failed to apply {item}: {message}")]
    Apply { item: String, message: String },

    /// The destination cannot be reached at all
    #[error("Destination unavailable: {message}")]
    DestinationUnavailable { message: String },

    /// An environment root does not exist
    #[error("Environment root not found: {path}")]
    RootNotFound { path: PathBuf },

    /// No conflict with this id in the ledger
    #[error("Conflict not found: {id}")]
    ConflictNotFound { id: String },

    /// The operator decision does not fit the conflicted item
    #[error("Invalid resolution: {message}")]
    InvalidResolution { message: String },

    /// An item reference could not be parsed or does not exist
    #[error("Invalid item reference '{value}': {message}")]
    InvalidItemRef { value: String, message: String },

    /// Another synchronization run holds the destination lock
    #[error("Another synchronization is running (lock held at {path})")]
    SyncInProgress { path: PathBuf },

    /// A row store's connection mutex was poisoned by a panicking thread
    #[error("Row store lock poisoned")]
    StorePoisoned,

    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parsed but is not usable
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from envsync-fs
    #[error(transparent)]
    Fs(#[from] envsync_fs::Error),

    /// SQLite error from the row store
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    /// True when the failure means the destination as a whole cannot be
    /// written, rather than one item being rejected.
    ///
    /// The synchronizer stops a batch early on these.
    pub fn is_destination_unavailable(&self) -> bool {
        match self {
            Self::DestinationUnavailable { .. } | Self::StorePoisoned => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DatabaseCorrupt
            ),
            Self::Fs(fs_err) => matches!(
                fs_err.io_kind(),
                Some(std::io::ErrorKind::NotConnected | std::io::ErrorKind::StorageFull)
            ),
            _ => false,
        }
    }
}
