//! Shared test utilities for the envsync workspace.
//!
//! This crate provides paired staging/production fixtures so crate test
//! suites do not each rebuild temporary trees and databases. It is a
//! dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`envs`]: [`TestEnvironments`], two file trees and two SQLite databases
//! - [`schema`]: SQL for the tables the fixtures use

pub mod envs;
pub mod schema;

pub use envs::TestEnvironments;
