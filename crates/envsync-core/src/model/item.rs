//! Addressable items: what an operator selects, what a conflict is about

use std::fmt;
use std::str::FromStr;

use envsync_fs::Fingerprint;
use serde::{Deserialize, Serialize};

use super::value::{Row, Value};
use crate::Error;

/// Reference to a selectable item.
///
/// Text form: `file:<path>`, `row:<table>/<key>`, `group:<id>`. A string
/// without a recognised prefix is taken as a file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ItemRef {
    File { path: String },
    Row { table: String, key: String },
    Group { id: String },
}

impl ItemRef {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File {
            path: path.into().trim_start_matches('/').to_string(),
        }
    }

    pub fn row(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Row {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::Group { id: id.into() }
    }

    /// Whether the item lives in the file tree or the database.
    ///
    /// Groups are database items.
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::File { .. } => ItemType::File,
            Self::Row { .. } | Self::Group { .. } => ItemType::Database,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "file:{path}"),
            Self::Row { table, key } => write!(f, "row:{table}/{key}"),
            Self::Group { id } => write!(f, "group:{id}"),
        }
    }
}

impl FromStr for ItemRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| Error::InvalidItemRef {
            value: s.to_string(),
            message: message.to_string(),
        };

        let s_trimmed = s.trim();
        if s_trimmed.is_empty() {
            return Err(invalid("empty reference"));
        }

        if let Some(rest) = s_trimmed.strip_prefix("row:") {
            let (table, key) = rest
                .split_once('/')
                .ok_or_else(|| invalid("expected row:<table>/<key>"))?;
            if table.is_empty() || key.is_empty() {
                return Err(invalid("expected row:<table>/<key>"));
            }
            return Ok(Self::row(table, key));
        }
        if let Some(id) = s_trimmed.strip_prefix("group:") {
            if id.is_empty() {
                return Err(invalid("expected group:<id>"));
            }
            return Ok(Self::group(id));
        }
        let path = s_trimmed.strip_prefix("file:").unwrap_or(s_trimmed);
        if path.trim_start_matches('/').is_empty() {
            return Err(invalid("expected a file path"));
        }
        Ok(Self::file(path))
    }
}

impl TryFrom<String> for ItemRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemRef> for String {
    fn from(item: ItemRef) -> Self {
        item.to_string()
    }
}

/// Axis an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Database,
    File,
}

/// A value an item can hold, as recorded in baselines and conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ItemValue {
    /// The item does not exist on that side
    Absent,
    /// A file, by content fingerprint
    File(Fingerprint),
    /// Literal file content supplied by an operator
    Content(Vec<u8>),
    /// A database row
    Row(Row),
}

impl ItemValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Build a row value from a JSON object, as typed by an operator.
    ///
    /// Strings become text, integers and floats become numbers, `null`
    /// becomes NULL; nested values are stored as their JSON text.
    pub fn row_from_json(json: &serde_json::Value) -> crate::Result<Self> {
        let object = json.as_object().ok_or_else(|| Error::InvalidResolution {
            message: "custom row value must be a JSON object".to_string(),
        })?;

        let row: Row = object
            .iter()
            .map(|(column, value)| {
                let value = match value {
                    serde_json::Value::Null => Value::Null,
                    serde_json::Value::String(s) => Value::Text(s.clone()),
                    serde_json::Value::Number(n) => match n.as_i64() {
                        Some(i) => Value::Integer(i),
                        None => Value::Real(n.as_f64().unwrap_or_default()),
                    },
                    serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
                    other => Value::Text(other.to_string()),
                };
                (column.clone(), value)
            })
            .collect();
        Ok(Self::Row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("file:wp-content/style.css", ItemRef::file("wp-content/style.css"))]
    #[case("style.css", ItemRef::file("style.css"))]
    #[case("/style.css", ItemRef::file("style.css"))]
    #[case("row:items/5", ItemRef::row("items", "5"))]
    #[case("row:options/a/b", ItemRef::row("options", "a/b"))]
    #[case("group:posts:12", ItemRef::group("posts:12"))]
    fn parses_text_form(#[case] text: &str, #[case] expected: ItemRef) {
        assert_eq!(text.parse::<ItemRef>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("row:items")]
    #[case("row:/5")]
    #[case("group:")]
    #[case("file:/")]
    fn rejects_malformed_references(#[case] text: &str) {
        assert!(text.parse::<ItemRef>().is_err(), "{text}");
    }

    #[test]
    fn display_round_trips() {
        for item in [
            ItemRef::file("a/b.css"),
            ItemRef::row("posts", "12"),
            ItemRef::group("posts:12"),
        ] {
            assert_eq!(item.to_string().parse::<ItemRef>().unwrap(), item);
        }
    }

    #[test]
    fn row_from_json_maps_types() {
        let json = serde_json::json!({"title": "C", "menu_order": 3, "excerpt": null});
        let ItemValue::Row(row) = ItemValue::row_from_json(&json).unwrap() else {
            panic!("expected a row value");
        };
        assert_eq!(row["title"], Value::Text("C".into()));
        assert_eq!(row["menu_order"], Value::Integer(3));
        assert_eq!(row["excerpt"], Value::Null);
    }

    #[test]
    fn row_from_json_rejects_non_objects() {
        assert!(ItemValue::row_from_json(&serde_json::json!("C")).is_err());
    }
}
