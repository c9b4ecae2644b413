//! Structural diff between two snapshots.
//!
//! [`diff`] yields a nested changeset mirroring the tree: containers that differ carry
//! their child changes, containers that appear or disappear are single `Add`/`Remove`
//! entries, and rows are compared by position inside their bucket.
//! [`flatten_changeset`] turns it into one entry per leaf change, addressed by a path
//! of the form `$.account|table|scope|index`.

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::snapshot::{RowSnapshot, Snapshot};

/// Prefix of every flattened path.
pub const PATH_ROOT: &str = "$.";
/// Separator between path components.
pub const PATH_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Add,
    Remove,
    Update,
}

/// One node of the nested changeset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(rename = "type")]
    pub operation: Operation,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RowSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<RowSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
}

impl Change {
    fn container(operation: Operation, key: &str) -> Self {
        Self {
            operation,
            key: key.to_string(),
            value: None,
            old_value: None,
            changes: Vec::new(),
        }
    }

    fn nested(key: &str, changes: Vec<Change>) -> Self {
        Self {
            operation: Operation::Update,
            key: key.to_string(),
            value: None,
            old_value: None,
            changes,
        }
    }

    fn row(operation: Operation, index: usize, value: Option<&RowSnapshot>, old_value: Option<&RowSnapshot>) -> Self {
        Self {
            operation,
            key: index.to_string(),
            value: value.cloned(),
            old_value: old_value.cloned(),
            changes: Vec::new(),
        }
    }

    /// True for nodes that only group child changes.
    pub fn is_nested(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// A leaf change with its full path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatChange {
    pub path: String,
    #[serde(rename = "type")]
    pub operation: Operation,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RowSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<RowSnapshot>,
}

/// Nested changeset turning `pre` into `post`.
pub fn diff(pre: &Snapshot, post: &Snapshot) -> Vec<Change> {
    diff_level(pre.levels(), post.levels(), |pre_tables, post_tables| {
        diff_level(pre_tables, post_tables, |pre_scopes, post_scopes| {
            diff_level(pre_scopes, post_scopes, |pre_rows, post_rows| diff_rows(pre_rows, post_rows))
        })
    })
}

/// Compares one map level: keys of `pre` in order first, then keys only in `post`.
fn diff_level<T, F>(pre: &IndexMap<String, T>, post: &IndexMap<String, T>, child: F) -> Vec<Change>
where
    F: Fn(&T, &T) -> Vec<Change>,
{
    let mut changes = Vec::new();
    for (key, before) in pre {
        match post.get(key) {
            None => changes.push(Change::container(Operation::Remove, key)),
            Some(after) => {
                let nested = child(before, after);
                if !nested.is_empty() {
                    changes.push(Change::nested(key, nested));
                }
            }
        }
    }
    for key in post.keys().filter(|key| !pre.contains_key(*key)) {
        changes.push(Change::container(Operation::Add, key));
    }
    changes
}

fn diff_rows(pre: &[RowSnapshot], post: &[RowSnapshot]) -> Vec<Change> {
    let mut changes = Vec::new();
    for index in 0..pre.len().max(post.len()) {
        match (pre.get(index), post.get(index)) {
            (Some(before), Some(after)) if before != after => {
                changes.push(Change::row(Operation::Update, index, Some(after), Some(before)));
            }
            (None, Some(after)) => changes.push(Change::row(Operation::Add, index, Some(after), None)),
            (Some(before), None) => changes.push(Change::row(Operation::Remove, index, None, Some(before))),
            _ => {}
        }
    }
    changes
}

/// One entry per leaf change, depth first.
pub fn flatten_changeset(changes: &[Change]) -> Vec<FlatChange> {
    let mut flat = Vec::new();
    let mut path = Vec::new();
    flatten_into(changes, &mut path, &mut flat);
    flat
}

fn flatten_into<'a>(changes: &'a [Change], path: &mut Vec<&'a str>, out: &mut Vec<FlatChange>) {
    for change in changes {
        path.push(&change.key);
        if change.is_nested() {
            flatten_into(&change.changes, path, out);
        } else {
            out.push(FlatChange {
                path: format_path(path),
                operation: change.operation,
                key: change.key.clone(),
                value: change.value.clone(),
                old_value: change.old_value.clone(),
            });
        }
        path.pop();
    }
}

pub fn format_path(components: &[&str]) -> String {
    let mut path = String::from(PATH_ROOT);
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            path.push(PATH_SEPARATOR);
        }
        path.push_str(component);
    }
    path
}
