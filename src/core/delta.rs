//! Per-row storage deltas of one transaction.
//!
//! Rebuilds the flattened diff of two snapshots into the snapshot's own shape:
//! - an updated row becomes `{old, new}`, and the first update of a bucket brings back
//!   the bucket's other pre-transaction rows unchanged;
//! - an added row becomes `{new}`; an added scope, table or account is copied from the
//!   post snapshot with every row as `{new}`;
//! - a removed row is not reported.

use std::collections::HashSet;

use log::{debug, warn};
use serde::Serialize;

use crate::core::diff::{diff, flatten_changeset, FlatChange, Operation, PATH_ROOT, PATH_SEPARATOR};
use crate::core::snapshot::{RowSnapshot, Snapshot, StorageTree};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowDelta {
    Updated { old: RowSnapshot, new: RowSnapshot },
    Added { new: RowSnapshot },
    Unchanged(RowSnapshot),
}

impl RowDelta {
    /// Row as it is after the transaction.
    pub fn current(&self) -> &RowSnapshot {
        match self {
            RowDelta::Updated { new, .. } | RowDelta::Added { new } => new,
            RowDelta::Unchanged(row) => row,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, RowDelta::Unchanged(_))
    }
}

pub type StorageDeltas = StorageTree<RowDelta>;

/// Path components of a flattened change, after the root prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeltaPath<'a> {
    account: &'a str,
    table: Option<&'a str>,
    scope: Option<&'a str>,
    index: Option<usize>,
}

impl<'a> DeltaPath<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let rest = path.get(PATH_ROOT.len()..)?;
        let mut parts = rest.split(PATH_SEPARATOR);
        let account = parts.next().filter(|a| !a.is_empty())?;
        let table = parts.next();
        let scope = parts.next();
        let index = match parts.next() {
            Some(raw) => Some(raw.parse().ok()?),
            None => None,
        };
        Some(Self {
            account,
            table,
            scope,
            index,
        })
    }
}

type Slots = StorageTree<Option<RowDelta>>;

pub struct DiffReconciler;

impl DiffReconciler {
    /// Delta tree turning `pre` into `post`.
    pub fn reconcile(pre: &Snapshot, post: &Snapshot) -> StorageDeltas {
        let changes = flatten_changeset(&diff(pre, post));
        Self::reconcile_changes(pre, post, &changes)
    }

    /// Applies an already flattened changeset.
    pub fn reconcile_changes(pre: &Snapshot, post: &Snapshot, changes: &[FlatChange]) -> StorageDeltas {
        let mut slots = Slots::new();
        let mut restored: HashSet<(String, String, String)> = HashSet::new();

        for change in changes {
            let Some(path) = DeltaPath::parse(&change.path) else {
                warn!("skipping change with malformed path {}", change.path);
                continue;
            };
            match change.operation {
                Operation::Update => Self::apply_update(&mut slots, &mut restored, pre, post, &path, change),
                Operation::Add => Self::apply_add(&mut slots, post, &path, change),
                Operation::Remove => {}
            }
        }

        let deltas = slots.compact();
        debug!("storage deltas: {} rows from {} changes", deltas.len(), changes.len());
        deltas
    }

    fn apply_update(
        slots: &mut Slots,
        restored: &mut HashSet<(String, String, String)>,
        pre: &Snapshot,
        post: &Snapshot,
        path: &DeltaPath<'_>,
        change: &FlatChange,
    ) {
        let (Some(table), Some(scope), Some(index)) = (path.table, path.scope, path.index) else {
            return;
        };
        let (Some(old), Some(new)) = (change.old_value.clone(), change.value.clone()) else {
            return;
        };
        let bucket = slots.bucket_mut(path.account, table, scope);
        let key = (path.account.to_string(), table.to_string(), scope.to_string());
        if restored.insert(key) {
            let still_present = post.bucket(path.account, table, scope).map_or(0, Vec::len);
            if let Some(rows) = pre.bucket(path.account, table, scope) {
                for (i, row) in rows.iter().enumerate().take(still_present) {
                    set_slot(bucket, i, RowDelta::Unchanged(row.clone()));
                }
            }
        }
        set_slot(bucket, index, RowDelta::Updated { old, new });
    }

    fn apply_add(slots: &mut Slots, post: &Snapshot, path: &DeltaPath<'_>, change: &FlatChange) {
        match (path.table, path.scope, path.index) {
            (Some(table), Some(scope), Some(index)) => {
                if let Some(new) = change.value.clone() {
                    set_slot(slots.bucket_mut(path.account, table, scope), index, RowDelta::Added { new });
                }
            }
            (table, scope, _) => fill_from_post(slots, post, path.account, table, scope),
        }
    }
}

fn set_slot(bucket: &mut Vec<Option<RowDelta>>, index: usize, delta: RowDelta) {
    if bucket.len() <= index {
        bucket.resize(index + 1, None);
    }
    bucket[index] = Some(delta);
}

/// Copies the post-snapshot subtree at the path, every row marked added.
fn fill_from_post(slots: &mut Slots, post: &Snapshot, account: &str, table: Option<&str>, scope: Option<&str>) {
    let Some(tables) = post.account(account) else {
        return;
    };
    slots.account_mut(account);
    for (table_name, scopes) in tables.iter().filter(|(t, _)| table.map_or(true, |wanted| wanted == t.as_str())) {
        slots.table_mut(account, table_name);
        for (scope_name, rows) in scopes.iter().filter(|(s, _)| scope.map_or(true, |wanted| wanted == s.as_str())) {
            let bucket = slots.bucket_mut(account, table_name, scope_name);
            for (i, row) in rows.iter().enumerate() {
                set_slot(bucket, i, RowDelta::Added { new: row.clone() });
            }
        }
    }
}
