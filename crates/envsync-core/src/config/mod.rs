//! Configuration for the engine
//!
//! - [`EngineConfig`]: exclusions, database diff, grouping, cache and sync settings
//! - [`Manifest`]: an [`EngineConfig`] plus the two environment endpoints,
//!   as read from `envsync.toml`

mod manifest;
mod settings;

pub use manifest::{EndpointConfig, Manifest};
pub use settings::{
    CacheConfig, DatabaseConfig, EngineConfig, ExclusionConfig, ForeignLink, GroupingConfig,
    IgnoredRowRule, SyncConfig,
};
