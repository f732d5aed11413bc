//! Typed row values
//!
//! Rows keep their dynamic, per-table column sets but every cell is a tagged
//! [`Value`]. Equality decisions go through [`Value::equivalent`], which
//! applies the normalization rules used by the relational differ.

use std::collections::BTreeMap;
use std::fmt;

use envsync_fs::Fingerprint;
use envsync_fs::checksum::{fingerprint_str, normalize_text};
use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// A row as an ordered mapping from column name to value.
pub type Row = BTreeMap<String, Value>;

/// Comparable form of a value after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum Normalized {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// NULL and the empty string normalize to the same "empty" value;
    /// numbers compare by their canonical text form; text has its line
    /// endings normalized.
    fn normalized(&self) -> Normalized {
        match self {
            Self::Null => Normalized::Empty,
            Self::Text(s) if s.is_empty() => Normalized::Empty,
            Self::Text(s) => Normalized::Text(normalize_text(s).into_owned()),
            Self::Integer(i) => Normalized::Text(i.to_string()),
            Self::Real(r) => Normalized::Text(r.to_string()),
            Self::Blob(b) => Normalized::Bytes(b.clone()),
        }
    }

    /// Normalized equality used for "modified" decisions.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text form for keys, labels and summaries.
    ///
    /// Returns `None` for NULL and blobs.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null | Self::Blob(_) => None,
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(r) => Some(r.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Fingerprint of a row's comparable columns.
///
/// Columns for which `compared` returns false are left out, so volatile
/// columns never change a row's fingerprint. Two rows that the differ
/// considers equal always share a fingerprint.
pub fn row_fingerprint(row: &Row, compared: impl Fn(&str) -> bool) -> Fingerprint {
    let canonical: BTreeMap<&str, Normalized> = row
        .iter()
        .filter(|(column, _)| compared(column))
        .map(|(column, value)| (column.as_str(), value.normalized()))
        .collect();
    // Serializing a map of strings and byte arrays cannot fail
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    fingerprint_str(&json)
}
