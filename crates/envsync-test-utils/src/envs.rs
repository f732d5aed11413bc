//! [`TestEnvironments`] fixture: a staging and a production environment in
//! one temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::TempDir;

/// Layout below the temporary directory:
///
/// ```text
/// staging/        source file tree
/// production/     destination file tree
/// staging.db      source database
/// production.db   destination database
/// state/          conflicts, baselines, sync lock
/// ```
///
/// # Example
///
/// ```rust
/// use envsync_test_utils::TestEnvironments;
///
/// let envs = TestEnvironments::new();
/// envs.write_source("style.css", "body { color: red }");
/// envs.exec_destination("CREATE TABLE items (id INTEGER PRIMARY KEY, title TEXT);");
/// assert!(!envs.destination_has("style.css"));
/// ```
pub struct TestEnvironments {
    temp_dir: TempDir,
}

impl Default for TestEnvironments {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnvironments {
    /// Create both trees and both (empty) databases.
    ///
    /// # Panics
    /// Panics if the temporary directory cannot be set up.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["staging", "production", "state"] {
            fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        let envs = Self { temp_dir };
        Connection::open(envs.source_db()).unwrap();
        Connection::open(envs.destination_db()).unwrap();
        envs
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_root(&self) -> PathBuf {
        self.root().join("staging")
    }

    pub fn destination_root(&self) -> PathBuf {
        self.root().join("production")
    }

    pub fn source_db(&self) -> PathBuf {
        self.root().join("staging.db")
    }

    pub fn destination_db(&self) -> PathBuf {
        self.root().join("production.db")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root().join("state")
    }

    /// Write a file below the staging root, creating directories.
    pub fn write_source(&self, relative: &str, content: impl AsRef<[u8]>) {
        write(&self.source_root().join(relative), content.as_ref());
    }

    /// Write a file below the production root, creating directories.
    pub fn write_destination(&self, relative: &str, content: impl AsRef<[u8]>) {
        write(&self.destination_root().join(relative), content.as_ref());
    }

    /// Write the same file on both sides.
    pub fn write_both(&self, relative: &str, content: impl AsRef<[u8]>) {
        self.write_source(relative, content.as_ref());
        self.write_destination(relative, content.as_ref());
    }

    pub fn remove_destination(&self, relative: &str) {
        fs::remove_file(self.destination_root().join(relative)).unwrap();
    }

    pub fn destination_has(&self, relative: &str) -> bool {
        self.destination_root().join(relative).exists()
    }

    /// # Panics
    /// Panics if the file cannot be read.
    pub fn read_destination(&self, relative: &str) -> String {
        let path = self.destination_root().join(relative);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
    }

    /// Run SQL against the staging database.
    pub fn exec_source(&self, sql: &str) {
        exec(&self.source_db(), sql);
    }

    /// Run SQL against the production database.
    pub fn exec_destination(&self, sql: &str) {
        exec(&self.destination_db(), sql);
    }

    /// Run SQL against both databases.
    pub fn exec_both(&self, sql: &str) {
        self.exec_source(sql);
        self.exec_destination(sql);
    }

    /// First column of the first row of `sql` on production, as text.
    pub fn query_destination(&self, sql: &str) -> Option<String> {
        query(&self.destination_db(), sql)
    }

    /// First column of the first row of `sql` on staging, as text.
    pub fn query_source(&self, sql: &str) -> Option<String> {
        query(&self.source_db(), sql)
    }

    /// Write `envsync.toml` pointing at this fixture, with `extra` appended.
    ///
    /// Both environments use an empty table prefix.
    pub fn write_manifest(&self, extra: &str) -> PathBuf {
        let path = self.root().join("envsync.toml");
        let manifest = format!(
            "state_dir = \"state\"\n\n\
             [source]\nname = \"staging\"\nroot = \"staging\"\ndatabase = \"staging.db\"\n\n\
             [destination]\nname = \"production\"\nroot = \"production\"\ndatabase = \"production.db\"\n\n\
             {extra}\n"
        );
        fs::write(&path, manifest).unwrap();
        path
    }
}

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap_or_else(|e| panic!("cannot write {}: {e}", path.display()));
}

fn exec(db: &Path, sql: &str) {
    let conn = Connection::open(db).unwrap();
    conn.execute_batch(sql)
        .unwrap_or_else(|e| panic!("SQL failed on {}: {e}\n{sql}", db.display()));
}

fn query(db: &Path, sql: &str) -> Option<String> {
    let conn = Connection::open(db).unwrap();
    let result = conn.query_row(sql, [], |row| {
        let value: rusqlite::types::Value = row.get(0)?;
        Ok(match value {
            rusqlite::types::Value::Null => None,
            rusqlite::types::Value::Integer(i) => Some(i.to_string()),
            rusqlite::types::Value::Real(r) => Some(r.to_string()),
            rusqlite::types::Value::Text(t) => Some(t),
            rusqlite::types::Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
        })
    });
    match result {
        Ok(value) => value,
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => panic!("query failed on {}: {e}\n{sql}", db.display()),
    }
}
