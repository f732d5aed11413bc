//! Relational differ
//!
//! Tables are paired by logical name and compared row by row through their
//! single-column primary key. Each table is independent: a table that
//! cannot be compared becomes a [`SchemaIssue`] and the rest of the diff
//! carries on.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use super::{DatabaseDiffReport, SchemaIssue, deal, worker_count};
use crate::config::{DatabaseConfig, ExclusionConfig};
use crate::environment::Endpoint;
use crate::model::{ChangeStatus, FieldDiff, Row, RowChange, Value};
use crate::{Error, Result};

/// A compiled ignored-row rule.
#[derive(Debug)]
struct IgnoredRows {
    rules: Vec<(String, String, Regex)>,
}

impl IgnoredRows {
    fn compile(config: &DatabaseConfig) -> Result<Self> {
        let rules = config
            .ignored_rows
            .iter()
            .map(|rule| {
                let regex = Regex::new(&wildcard_regex(&rule.pattern)).map_err(|e| {
                    Error::InvalidConfig {
                        message: format!("ignored row pattern '{}': {e}", rule.pattern),
                    }
                })?;
                Ok((rule.table.clone(), rule.column.clone(), regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    fn is_ignored(&self, table: &str, row: &Row) -> bool {
        self.rules.iter().any(|(t, column, regex)| {
            t == table
                && row
                    .get(column)
                    .and_then(Value::as_text)
                    .is_some_and(|text| regex.is_match(&text))
        })
    }
}

/// Anchored regex for a `*`/`?` wildcard pattern.
fn wildcard_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Sort key placing numeric keys first, in numeric order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyOrder<'a> {
    Number(i64),
    Text(&'a str),
}

impl<'a> KeyOrder<'a> {
    fn of(key: &'a str) -> Self {
        key.parse()
            .map(KeyOrder::Number)
            .unwrap_or(KeyOrder::Text(key))
    }
}

fn compare_changes(a: &RowChange, b: &RowChange) -> Ordering {
    a.table.cmp(&b.table).then_with(|| {
        KeyOrder::of(&a.primary_key_value).cmp(&KeyOrder::of(&b.primary_key_value))
    })
}

/// One table present on both sides.
#[derive(Debug, Clone)]
/// Row changes of one table, plus listed keys whose rows could not be read
struct TableDiff {
    changes: Vec<RowChange>,
    unreadable: Vec<String>,
}

struct TablePair {
    logical: String,
    source: String,
    destination: String,
}

/// Compares the source database against the destination database.
pub struct RelationalDiffer<'a> {
    source: &'a Endpoint,
    destination: &'a Endpoint,
    exclusions: &'a ExclusionConfig,
    database: &'a DatabaseConfig,
}

impl<'a> RelationalDiffer<'a> {
    pub fn new(
        source: &'a Endpoint,
        destination: &'a Endpoint,
        exclusions: &'a ExclusionConfig,
        database: &'a DatabaseConfig,
    ) -> Self {
        Self {
            source,
            destination,
            exclusions,
            database,
        }
    }

    /// Compute the row change set.
    ///
    /// # Errors
    ///
    /// Only failures that make a whole database unreachable are returned;
    /// per-table problems are listed in [`DatabaseDiffReport::issues`].
    pub fn diff(&self) -> Result<DatabaseDiffReport> {
        let ignored = IgnoredRows::compile(self.database)?;
        let (pairs, mut issues) = self.pair_tables()?;

        let workers = worker_count(pairs.len(), self.database.max_workers);
        let buckets = deal(pairs, workers);

        let outcomes: Vec<(TablePair, Result<TableDiff>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .into_iter()
                .map(|bucket| {
                    let ignored = &ignored;
                    scope.spawn(move || {
                        bucket
                            .into_iter()
                            .map(|pair| {
                                let result = self.diff_table(&pair, ignored);
                                (pair, result)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });

        let mut changes = Vec::new();
        for (pair, outcome) in outcomes {
            match outcome {
                Ok(table) => {
                    if !table.unreadable.is_empty() {
                        tracing::warn!(
                            table = %pair.logical,
                            keys = ?table.unreadable,
                            "listed rows could not be read back"
                        );
                        issues.push(SchemaIssue {
                            table: pair.logical.clone(),
                            message: format!(
                                "{} row(s) listed by key could not be read back: {}",
                                table.unreadable.len(),
                                table.unreadable.join(", ")
                            ),
                        });
                    }
                    changes.extend(table.changes);
                }
                Err(e) if e.is_destination_unavailable() => return Err(e),
                Err(e) => {
                    let message = match e {
                        Error::Schema { message, .. } => message,
                        other => other.to_string(),
                    };
                    tracing::warn!(table = %pair.logical, %message, "table skipped");
                    issues.push(SchemaIssue {
                        table: pair.logical,
                        message,
                    });
                }
            }
        }

        changes.sort_by(compare_changes);
        issues.sort_by(|a, b| a.table.cmp(&b.table));

        tracing::info!(
            source = %self.source.name(),
            destination = %self.destination.name(),
            changes = changes.len(),
            issues = issues.len(),
            "database diff complete"
        );
        Ok(DatabaseDiffReport { changes, issues })
    }

    /// Pair tables by logical name; one-sided tables become issues.
    fn pair_tables(&self) -> Result<(Vec<TablePair>, Vec<SchemaIssue>)> {
        let logical = |endpoint: &Endpoint| -> Result<BTreeMap<String, String>> {
            Ok(endpoint
                .store
                .tables()?
                .into_iter()
                .filter_map(|physical| {
                    let name = endpoint.environment.logical_table(&physical)?.to_string();
                    Some((name, physical))
                })
                .filter(|(name, _)| !self.exclusions.is_table_excluded(name))
                .collect())
        };

        let source = logical(self.source)?;
        let destination = logical(self.destination)?;

        let mut pairs = Vec::new();
        let mut issues = Vec::new();
        let names: BTreeSet<&String> = source.keys().chain(destination.keys()).collect();
        for name in names {
            match (source.get(name), destination.get(name)) {
                (Some(src), Some(dst)) => pairs.push(TablePair {
                    logical: name.clone(),
                    source: src.clone(),
                    destination: dst.clone(),
                }),
                (Some(_), None) => issues.push(self.one_sided(name, self.source)),
                (None, Some(_)) => issues.push(self.one_sided(name, self.destination)),
                (None, None) => {}
            }
        }
        Ok((pairs, issues))
    }

    fn one_sided(&self, table: &str, owner: &Endpoint) -> SchemaIssue {
        tracing::warn!(%table, environment = %owner.name(), "table exists on one side only");
        SchemaIssue {
            table: table.to_string(),
            message: format!("table exists only in {}", owner.name()),
        }
    }

    fn diff_table(&self, pair: &TablePair, ignored: &IgnoredRows) -> Result<TableDiff> {
        let table = pair.logical.as_str();
        let key = self.primary_key(pair)?;
        tracing::debug!(%table, %key, "diffing table");

        let source_keys: BTreeSet<String> = self
            .source
            .store
            .primary_keys(&pair.source, &key)?
            .into_iter()
            .collect();
        let destination_keys: BTreeSet<String> = self
            .destination
            .store
            .primary_keys(&pair.destination, &key)?
            .into_iter()
            .collect();

        let compared = |column: &str| !self.exclusions.is_column_excluded(table, column);
        let mut changes = Vec::new();
        let mut unreadable = Vec::new();

        for value in source_keys.union(&destination_keys) {
            let listed_in_source = source_keys.contains(value);
            let listed_in_destination = destination_keys.contains(value);
            let source_row = if listed_in_source {
                self.source.store.fetch_row(&pair.source, &key, value)?
            } else {
                None
            };
            let destination_row = if listed_in_destination {
                self.destination
                    .store
                    .fetch_row(&pair.destination, &key, value)?
            } else {
                None
            };
            // A listed key that fetches nothing would otherwise pass for added or deleted
            if (listed_in_source && source_row.is_none())
                || (listed_in_destination && destination_row.is_none())
            {
                unreadable.push(value.clone());
                continue;
            }

            let (status, field_diffs) = match (&source_row, &destination_row) {
                (Some(src), None) => (ChangeStatus::Added, one_sided_diffs(src, &compared, true)),
                (None, Some(dst)) => (ChangeStatus::Deleted, one_sided_diffs(dst, &compared, false)),
                (Some(src), Some(dst)) => {
                    let diffs = column_diffs(src, dst, &compared);
                    if diffs.is_empty() {
                        continue;
                    }
                    (ChangeStatus::Modified, diffs)
                }
                (None, None) => continue,
            };

            let details = source_row
                .as_ref()
                .or(destination_row.as_ref())
                .map(|row| (row, ignored.is_ignored(table, row)));
            let Some((details, false)) = details else {
                continue;
            };

            let summary = self.summary(table, value, status, details);
            changes.push(RowChange {
                table: table.to_string(),
                primary_key_column: key.clone(),
                primary_key_value: value.clone(),
                status,
                field_diffs,
                summary,
                source_row,
                destination_row,
            });
        }

        tracing::debug!(%table, changes = changes.len(), "table diffed");
        Ok(TableDiff {
            changes,
            unreadable,
        })
    }

    /// The single primary key column shared by both sides.
    fn primary_key(&self, pair: &TablePair) -> Result<String> {
        let schema_error = |message: String| Error::Schema {
            table: pair.logical.clone(),
            message,
        };

        let source = self.source.store.schema(&pair.source)?;
        let key = match source.primary_key.as_slice() {
            [] => return Err(schema_error("table has no primary key".to_string())),
            [column] => column.clone(),
            columns => {
                return Err(schema_error(format!(
                    "composite primary key ({}) is not supported",
                    columns.join(", ")
                )));
            }
        };

        let destination = self.destination.store.schema(&pair.destination)?;
        if destination.single_primary_key() != Some(key.as_str()) {
            return Err(schema_error(format!(
                "primary key differs between environments ({} has {:?})",
                self.destination.name(),
                destination.primary_key
            )));
        }
        Ok(key)
    }

    fn summary(&self, table: &str, key: &str, status: ChangeStatus, row: &Row) -> String {
        let label = self
            .database
            .label_columns
            .iter()
            .filter_map(|column| row.get(column).and_then(Value::as_text))
            .find(|text| !text.is_empty());
        match label {
            Some(label) => format!("{table} #{key} {status}: {label}"),
            None => format!("{table} #{key} {status}"),
        }
    }
}

/// Every compared column of a row present on one side only.
fn one_sided_diffs(
    row: &Row,
    compared: &impl Fn(&str) -> bool,
    on_source: bool,
) -> BTreeMap<String, FieldDiff> {
    row.iter()
        .filter(|(column, _)| compared(column))
        .map(|(column, value)| {
            let diff = if on_source {
                FieldDiff {
                    source_value: value.clone(),
                    destination_value: Value::Null,
                }
            } else {
                FieldDiff {
                    source_value: Value::Null,
                    destination_value: value.clone(),
                }
            };
            (column.clone(), diff)
        })
        .collect()
}

/// Compared columns whose normalized values differ.
///
/// A column missing on one side compares as NULL.
fn column_diffs(
    source: &Row,
    destination: &Row,
    compared: &impl Fn(&str) -> bool,
) -> BTreeMap<String, FieldDiff> {
    let columns: BTreeSet<&String> = source.keys().chain(destination.keys()).collect();
    columns
        .into_iter()
        .filter(|column| compared(column))
        .filter_map(|column| {
            let src = source.get(column).unwrap_or(&Value::Null);
            let dst = destination.get(column).unwrap_or(&Value::Null);
            (!src.equivalent(dst)).then(|| {
                (
                    column.clone(),
                    FieldDiff {
                        source_value: src.clone(),
                        destination_value: dst.clone(),
                    },
                )
            })
        })
        .collect()
}
