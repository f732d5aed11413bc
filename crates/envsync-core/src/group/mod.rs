//! Clustering row changes into content groups
//!
//! A flat row diff is hard to review: one edited page shows up as a posts
//! row, a handful of postmeta rows, its attachments and their metadata. The
//! grouper folds those back into one [`ChangeGroup`] per content item.
//!
//! Grouping runs in two passes over the diff:
//!
//! 1. **Adjacency**: primary-table rows are linked to their parent through
//!    the parent column of the row snapshot. Attachments are tracked apart
//!    from other children.
//! 2. **Materialization**: each root claims its subtree breadth-first, then
//!    metadata and related rows pointing at any claimed primary id.
//!
//! A row is claimed at most once; the first group to reach it keeps it.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::config::GroupingConfig;
use crate::model::{ChangeGroup, GroupedChanges, RowChange};

/// Parent references that mean "no parent".
fn is_root_reference(parent: Option<&str>) -> bool {
    matches!(parent.map(str::trim), None | Some("") | Some("0"))
}

/// Groups row changes according to a [`GroupingConfig`].
#[derive(Debug, Clone)]
pub struct ChangeGrouper<'a> {
    config: &'a GroupingConfig,
}

/// Child and attachment lists of one primary id.
#[derive(Debug, Default)]
struct Links {
    children: Vec<usize>,
    attachments: Vec<usize>,
}

impl<'a> ChangeGrouper<'a> {
    pub fn new(config: &'a GroupingConfig) -> Self {
        Self { config }
    }

    /// Group `changes`, which are expected in diff order.
    ///
    /// The result depends only on the input order and content, so grouping
    /// the same diff twice yields the same groups and ids.
    pub fn group(&self, changes: &[RowChange]) -> GroupedChanges {
        let primary = self.config.primary_table.as_str();
        let mut claimed = vec![false; changes.len()];

        // Pass 1: adjacency over primary rows
        let primary_rows: Vec<usize> = changes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.table == primary)
            .map(|(idx, _)| idx)
            .collect();
        let index_of: HashMap<&str, usize> = primary_rows
            .iter()
            .map(|&idx| (changes[idx].primary_key_value.as_str(), idx))
            .collect();

        let mut links: HashMap<usize, Links> = HashMap::new();
        let mut roots = Vec::new();
        for &idx in &primary_rows {
            let change = &changes[idx];
            let parent = change.detail(&self.config.parent_column);
            let parent_idx = if is_root_reference(parent.as_deref()) {
                None
            } else {
                parent
                    .as_deref()
                    .and_then(|p| index_of.get(p.trim()).copied())
                    .filter(|&p| p != idx)
            };

            match parent_idx {
                None => roots.push(idx),
                Some(parent_idx) => {
                    let entry = links.entry(parent_idx).or_default();
                    if self.kind_of(change).as_deref() == Some(self.config.attachment_kind.as_str())
                    {
                        entry.attachments.push(idx);
                    } else {
                        entry.children.push(idx);
                    }
                }
            }
        }

        // Pass 2: materialize roots, then rows stranded in parent cycles
        let mut groups = Vec::new();
        let mut owner: HashMap<String, usize> = HashMap::new();
        for idx in roots.into_iter().chain(primary_rows.iter().copied()) {
            if claimed[idx] {
                continue;
            }
            let group = self.materialize(changes, idx, &links, &mut claimed);
            let group_index = groups.len();
            for row in group.rows() {
                owner.insert(row.primary_key_value.clone(), group_index);
            }
            groups.push(group);
        }

        // Metadata and related rows follow their primary row's group
        for link in self.config.metadata.iter().chain(&self.config.related) {
            for (idx, change) in changes.iter().enumerate() {
                if claimed[idx] || change.table != link.table {
                    continue;
                }
                let Some(group_index) = change
                    .detail(&link.foreign_column)
                    .and_then(|fk| owner.get(fk.trim()).copied())
                else {
                    continue;
                };
                claimed[idx] = true;
                groups[group_index]
                    .members
                    .entry(link.table.clone())
                    .or_default()
                    .push(change.clone());
            }
        }

        let standalone: Vec<RowChange> = changes
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(change, _)| change.clone())
            .collect();

        // Stable, so discovery order holds within a kind
        groups.sort_by(|a: &ChangeGroup, b: &ChangeGroup| a.kind.cmp(&b.kind));

        tracing::debug!(
            groups = groups.len(),
            standalone = standalone.len(),
            "grouped row changes"
        );
        GroupedChanges { groups, standalone }
    }

    fn kind_of(&self, change: &RowChange) -> Option<String> {
        change.detail(&self.config.kind_column)
    }

    /// Build the group anchored at `root`, claiming its subtree breadth-first.
    fn materialize(
        &self,
        changes: &[RowChange],
        root: usize,
        links: &HashMap<usize, Links>,
        claimed: &mut [bool],
    ) -> ChangeGroup {
        claimed[root] = true;
        let anchor = changes[root].clone();
        let mut members: BTreeMap<String, Vec<RowChange>> = BTreeMap::new();
        let mut attachments = Vec::new();

        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = links.get(&current) else {
                continue;
            };
            for &child in &node.children {
                if !claimed[child] {
                    claimed[child] = true;
                    members
                        .entry(self.config.primary_table.clone())
                        .or_default()
                        .push(changes[child].clone());
                    queue.push_back(child);
                }
            }
            for &attachment in &node.attachments {
                if !claimed[attachment] {
                    claimed[attachment] = true;
                    attachments.push(changes[attachment].clone());
                    queue.push_back(attachment);
                }
            }
        }

        let kind = self
            .kind_of(&anchor)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| anchor.table.clone());
        let title = anchor
            .detail(&self.config.title_column)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| anchor.summary.clone());

        ChangeGroup {
            group_id: format!("{}:{}", anchor.table, anchor.primary_key_value),
            kind,
            title,
            status: anchor.status,
            anchor,
            members,
            attachments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeStatus, Row, Value};
    use pretty_assertions::assert_eq;

    fn change(table: &str, key: &str, columns: &[(&str, &str)]) -> RowChange {
        let mut row = Row::new();
        for (column, value) in columns {
            row.insert((*column).to_string(), Value::from(*value));
        }
        RowChange {
            table: table.to_string(),
            primary_key_column: "ID".to_string(),
            primary_key_value: key.to_string(),
            status: ChangeStatus::Modified,
            field_diffs: BTreeMap::new(),
            summary: format!("{table} #{key} modified"),
            source_row: Some(row),
            destination_row: None,
        }
    }

    fn post(key: &str, parent: &str, kind: &str) -> RowChange {
        change(
            "posts",
            key,
            &[("post_parent", parent), ("post_type", kind), ("post_title", key)],
        )
    }

    fn keys(rows: &[RowChange]) -> Vec<&str> {
        rows.iter().map(|r| r.primary_key_value.as_str()).collect()
    }

    #[test]
    fn page_with_children_attachments_and_meta() {
        let changes = vec![
            post("1", "0", "page"),
            post("2", "1", "page"),
            post("3", "1", "attachment"),
            post("4", "2", "page"),
            change("postmeta", "10", &[("post_id", "4")]),
            change("postmeta", "11", &[("post_id", "3")]),
            change("postmeta", "12", &[("post_id", "99")]),
            change("comments", "20", &[("comment_post_ID", "1")]),
        ];
        let config = GroupingConfig::default();
        let grouped = ChangeGrouper::new(&config).group(&changes);

        assert_eq!(grouped.groups.len(), 1);
        let group = &grouped.groups[0];
        assert_eq!(group.group_id, "posts:1");
        assert_eq!(group.kind, "page");
        assert_eq!(keys(&group.members["posts"]), vec!["2", "4"]);
        assert_eq!(keys(&group.attachments), vec!["3"]);
        assert_eq!(keys(&group.members["postmeta"]), vec!["10", "11"]);
        assert_eq!(keys(&group.members["comments"]), vec!["20"]);
        assert_eq!(group.row_count(), 7);
        assert_eq!(keys(&grouped.standalone), vec!["12"]);
    }

    #[test]
    fn orphans_become_roots() {
        let changes = vec![post("5", "42", "post"), post("6", "", "post")];
        let config = GroupingConfig::default();
        let grouped = ChangeGrouper::new(&config).group(&changes);
        let ids: Vec<&str> = grouped.groups.iter().map(|g| g.group_id.as_str()).collect();
        assert_eq!(ids, vec!["posts:5", "posts:6"]);
    }

    #[test]
    fn cycles_are_broken_in_diff_order() {
        let changes = vec![post("7", "8", "page"), post("8", "7", "page")];
        let config = GroupingConfig::default();
        let grouped = ChangeGrouper::new(&config).group(&changes);

        assert_eq!(grouped.groups.len(), 1);
        assert_eq!(grouped.groups[0].group_id, "posts:7");
        assert_eq!(keys(&grouped.groups[0].members["posts"]), vec!["8"]);
    }

    #[test]
    fn groups_are_bucketed_by_kind_stably() {
        let changes = vec![
            post("1", "0", "post"),
            post("2", "0", "page"),
            post("3", "0", "post"),
        ];
        let config = GroupingConfig::default();
        let grouped = ChangeGrouper::new(&config).group(&changes);
        let ids: Vec<&str> = grouped.groups.iter().map(|g| g.group_id.as_str()).collect();
        assert_eq!(ids, vec!["posts:2", "posts:1", "posts:3"]);
        assert_eq!(grouped.by_kind()["post"].len(), 2);
    }

    #[test]
    fn every_row_is_placed_exactly_once_and_grouping_is_repeatable() {
        let changes = vec![
            post("1", "0", "page"),
            post("2", "1", "attachment"),
            change("postmeta", "10", &[("post_id", "2")]),
            change("options", "1", &[("option_name", "blogname")]),
        ];
        let config = GroupingConfig::default();
        let grouper = ChangeGrouper::new(&config);
        let first = grouper.group(&changes);
        let second = grouper.group(&changes);
        assert_eq!(first, second);

        let placed: usize =
            first.groups.iter().map(ChangeGroup::row_count).sum::<usize>() + first.standalone.len();
        assert_eq!(placed, changes.len());
    }

    #[test]
    fn deleted_rows_group_by_destination_snapshot() {
        let mut parent = post("1", "0", "page");
        parent.status = ChangeStatus::Deleted;
        let mut child = post("2", "1", "page");
        child.destination_row = child.source_row.take();
        child.status = ChangeStatus::Deleted;

        let config = GroupingConfig::default();
        let grouped = ChangeGrouper::new(&config).group(&[parent, child]);
        assert_eq!(grouped.groups.len(), 1);
        assert_eq!(grouped.groups[0].status, ChangeStatus::Deleted);
        assert_eq!(keys(&grouped.groups[0].members["posts"]), vec!["2"]);
    }
}
