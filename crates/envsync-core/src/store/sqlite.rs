//! SQLite-backed row store

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, OptionalExtension, ToSql, params, params_from_iter};

use super::{ColumnInfo, RowStore, TableSchema};
use crate::model::{Row, Value};
use crate::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Connections {
    /// A private in-memory database exists on exactly one connection
    Single(Mutex<Connection>),
    /// A database file; each concurrent caller gets its own connection
    Pool {
        path: PathBuf,
        idle: Mutex<Vec<Connection>>,
    },
}

/// A [`RowStore`] over one SQLite database.
///
/// File databases keep a small pool of connections so the per-table diff
/// workers read in parallel. Connections are opened on demand and returned
/// to the pool after each call.
pub struct SqliteStore {
    connections: Connections,
    label: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("label", &self.label).finish()
    }
}

impl SqliteStore {
    /// Open an existing database file for reading and writing.
    ///
    /// A missing file is an error rather than a fresh empty database, so a
    /// mistyped destination path cannot look like "everything deleted".
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_file(path)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            connections: Connections::Pool {
                path: path.to_path_buf(),
                idle: Mutex::new(vec![conn]),
            },
            label: path.display().to_string(),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(
            Connection::open_in_memory()?,
            ":memory:".to_string(),
        ))
    }

    /// Wrap an already opened connection. Calls are serialized on it.
    pub fn from_connection(conn: Connection, label: impl Into<String>) -> Self {
        Self {
            connections: Connections::Single(Mutex::new(conn)),
            label: label.into(),
        }
    }

    /// Run raw SQL, e.g. to seed a database.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    /// Where this store points, for logs and messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        match &self.connections {
            Connections::Single(conn) => {
                let conn = conn.lock().map_err(|_| Error::StorePoisoned)?;
                Ok(f(&conn)?)
            }
            Connections::Pool { path, idle } => {
                let pooled = idle.lock().map_err(|_| Error::StorePoisoned)?.pop();
                let conn = match pooled {
                    Some(conn) => conn,
                    None => open_file(path)?,
                };
                let result = f(&conn);
                idle.lock().map_err(|_| Error::StorePoisoned)?.push(conn);
                Ok(result?)
            }
        }
    }

    fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
    }
}

fn open_file(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Every stored value a text key may stand for.
///
/// Keys travel as text. A column without type affinity keeps integers,
/// reals, text and blobs as they were written, so `'5'` alone would never
/// match a stored integer `5`.
fn key_candidates(key: &str) -> Vec<Value> {
    let mut candidates = vec![Value::Text(key.to_string())];
    match key.parse::<i64>() {
        Ok(number) if number.to_string() == key => candidates.push(Value::Integer(number)),
        _ => match key.parse::<f64>() {
            Ok(number) if number.is_finite() => candidates.push(Value::Real(number)),
            _ => {}
        },
    }
    candidates.push(Value::Blob(key.as_bytes().to_vec()));
    candidates
}

/// `"column" IN (?n, ...)` over the candidates of `key`, numbering
/// placeholders from `first`.
fn key_clause(key_column: &str, key: &str, first: usize) -> (String, Vec<Value>) {
    let candidates = key_candidates(key);
    let placeholders: Vec<String> = (first..first + candidates.len())
        .map(|i| format!("?{i}"))
        .collect();
    (
        format!("{} IN ({})", quote(key_column), placeholders.join(", ")),
        candidates,
    )
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl RowStore for SqliteStore {
    fn tables(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    fn schema(&self, table: &str) -> Result<TableSchema> {
        let found = self.with_conn(|conn| {
            if !Self::table_exists(conn, table)? {
                return Ok(None);
            }
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
            let mut columns = Vec::new();
            let mut keyed: Vec<(i64, String)> = Vec::new();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(1)?;
                let declared_type: String = row.get(2)?;
                let pk_index: i64 = row.get(5)?;
                if pk_index > 0 {
                    keyed.push((pk_index, name.clone()));
                }
                columns.push(ColumnInfo {
                    name,
                    declared_type,
                });
            }
            keyed.sort();
            Ok(Some((columns, keyed)))
        })?;

        let (columns, keyed) = found.ok_or_else(|| Error::Schema {
            table: table.to_string(),
            message: format!("table does not exist in {}", self.label),
        })?;

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            primary_key: keyed.into_iter().map(|(_, name)| name).collect(),
        })
    }

    fn primary_keys(&self, table: &str, key_column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {key} FROM {table} WHERE {key} IS NOT NULL ORDER BY {key}",
            key = quote(key_column),
            table = quote(table)
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let keys = stmt
                .query_map([], |row| {
                    Ok(match value_from_ref(row.get_ref(0)?) {
                        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
                        other => other.to_string(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
    }

    fn fetch_row(&self, table: &str, key_column: &str, key: &str) -> Result<Option<Row>> {
        let (clause, keys) = key_clause(key_column, key, 1);
        let sql = format!("SELECT * FROM {} WHERE {clause} LIMIT 1", quote(table));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            stmt.query_row(params_from_iter(&keys), |row| {
                let mut out = Row::new();
                for (idx, name) in names.iter().enumerate() {
                    out.insert(name.clone(), value_from_ref(row.get_ref(idx)?));
                }
                Ok(out)
            })
            .optional()
        })
    }

    fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let columns: Vec<String> = row.keys().map(|c| quote(c)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        self.with_conn(|conn| conn.execute(&sql, params_from_iter(row.values())))?;
        Ok(())
    }

    fn update_row(&self, table: &str, key_column: &str, key: &str, values: &Row) -> Result<usize> {
        if values.is_empty() {
            let (clause, keys) = key_clause(key_column, key, 1);
            let sql = format!("SELECT COUNT(*) FROM {} WHERE {clause}", quote(table));
            let count = self.with_conn(|conn| {
                conn.query_row(&sql, params_from_iter(&keys), |row| row.get::<_, i64>(0))
            })?;
            return Ok(usize::try_from(count).unwrap_or_default());
        }

        let assignments: Vec<String> = values
            .keys()
            .enumerate()
            .map(|(idx, column)| format!("{} = ?{}", quote(column), idx + 1))
            .collect();
        let (clause, keys) = key_clause(key_column, key, values.len() + 1);
        let sql = format!(
            "UPDATE {} SET {} WHERE {clause}",
            quote(table),
            assignments.join(", ")
        );
        let params = values.values().chain(keys.iter());
        self.with_conn(|conn| conn.execute(&sql, params_from_iter(params)))
    }

    fn delete_row(&self, table: &str, key_column: &str, key: &str) -> Result<usize> {
        let (clause, keys) = key_clause(key_column, key, 1);
        let sql = format!("DELETE FROM {} WHERE {clause}", quote(table));
        self.with_conn(|conn| conn.execute(&sql, params_from_iter(&keys)))
    }
}
