//! Read-only projection of the row store into `account → table → scope → [row]`.
//!
//! The same fixed-depth tree carries snapshots (leaf = [`RowSnapshot`]) and storage
//! deltas (leaf = [`RowDelta`](crate::core::delta::RowDelta)). Every level keeps
//! insertion order so a projection lists rows in the order the store walk met them.

use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::core::account::AccountRegistry;
use crate::core::secondary::{IndexPlane, SecondaryIndexValue};
use crate::core::store::{Table, TableStore};
use crate::error::Result;
use crate::name::{Name, MAX_NAME_LEN};

pub type ScopeMap<L> = IndexMap<String, Vec<L>>;
pub type TableMap<L> = IndexMap<String, ScopeMap<L>>;

/// Three levels of ordered maps over a list of leaves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StorageTree<L> {
    accounts: IndexMap<String, TableMap<L>>,
}

impl<L> Default for StorageTree<L> {
    fn default() -> Self {
        Self {
            accounts: IndexMap::new(),
        }
    }
}

impl<L> StorageTree<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub(crate) fn levels(&self) -> &IndexMap<String, TableMap<L>> {
        &self.accounts
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&String, &TableMap<L>)> {
        self.accounts.iter()
    }

    pub fn account(&self, account: &str) -> Option<&TableMap<L>> {
        self.accounts.get(account)
    }

    pub fn table(&self, account: &str, table: &str) -> Option<&ScopeMap<L>> {
        self.account(account)?.get(table)
    }

    pub fn bucket(&self, account: &str, table: &str, scope: &str) -> Option<&Vec<L>> {
        self.table(account, table)?.get(scope)
    }

    pub fn row(&self, account: &str, table: &str, scope: &str, index: usize) -> Option<&L> {
        self.bucket(account, table, scope)?.get(index)
    }

    /// Bucket at the path, creating every missing level.
    pub fn bucket_mut(&mut self, account: &str, table: &str, scope: &str) -> &mut Vec<L> {
        self.table_mut(account, table).entry(scope.to_string()).or_default()
    }

    pub fn table_mut(&mut self, account: &str, table: &str) -> &mut ScopeMap<L> {
        self.account_mut(account).entry(table.to_string()).or_default()
    }

    pub fn account_mut(&mut self, account: &str) -> &mut TableMap<L> {
        self.accounts.entry(account.to_string()).or_default()
    }

    /// Total number of leaves.
    pub fn len(&self) -> usize {
        self.accounts
            .values()
            .flat_map(|tables| tables.values())
            .flat_map(|scopes| scopes.values())
            .map(Vec::len)
            .sum()
    }

    /// Same shape with every leaf mapped through `f`.
    pub fn map<U>(&self, mut f: impl FnMut(&L) -> U) -> StorageTree<U> {
        let accounts = self
            .accounts
            .iter()
            .map(|(account, tables)| {
                let tables: TableMap<U> = tables
                    .iter()
                    .map(|(table, scopes)| {
                        let scopes: ScopeMap<U> = scopes
                            .iter()
                            .map(|(scope, rows)| (scope.clone(), rows.iter().map(&mut f).collect()))
                            .collect();
                        (table.clone(), scopes)
                    })
                    .collect();
                (account.clone(), tables)
            })
            .collect();
        StorageTree { accounts }
    }
}

impl<L> StorageTree<Option<L>> {
    /// Drops empty slots from every bucket.
    pub fn compact(self) -> StorageTree<L> {
        let accounts = self
            .accounts
            .into_iter()
            .map(|(account, tables)| {
                let tables: TableMap<L> = tables
                    .into_iter()
                    .map(|(table, scopes)| {
                        let scopes: ScopeMap<L> = scopes
                            .into_iter()
                            .map(|(scope, rows)| (scope, rows.into_iter().flatten().collect()))
                            .collect();
                        (table, scopes)
                    })
                    .collect();
                (account, tables)
            })
            .collect();
        StorageTree { accounts }
    }
}

/// One row as it appears in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSnapshot {
    pub primary_key: u64,
    pub payer: String,
    pub value: Value,
    /// At most one entry per plane, in plane order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_indexes: Vec<SecondaryIndexValue>,
}

pub type Snapshot = StorageTree<RowSnapshot>;

/// Scope key used for the empty scope.
pub const EMPTY_SCOPE: &str = ".";

/// Recovers the primary table name from a table handle. A handle that prints as a
/// full 13-symbol name carries a plane suffix in its last symbol.
pub fn primary_table_name(table: Name) -> String {
    let mut name = table.to_string();
    if name.len() == MAX_NAME_LEN {
        name.pop();
    }
    name.trim_end_matches('.').to_string()
}

fn scope_key(scope: Name) -> String {
    if scope.is_empty() {
        EMPTY_SCOPE.to_string()
    } else {
        scope.to_string()
    }
}

pub struct StorageProjector;

impl StorageProjector {
    /// Projects every table of `store`, decoding row values through the owning account.
    pub fn snapshot(store: &TableStore, accounts: &AccountRegistry) -> Result<Snapshot> {
        let mut tree = Snapshot::new();
        for table in store.table_index() {
            let account = table.code.to_string();
            let table_name = primary_table_name(table.table);
            let scope = scope_key(table.scope);
            let rows = Self::project_table(store, accounts, table)?;
            tree.bucket_mut(&account, &table_name, &scope).extend(rows);
        }
        debug!(
            "projected {} rows from {} tables",
            tree.len(),
            store.table_count()
        );
        Ok(tree)
    }

    fn project_table(store: &TableStore, accounts: &AccountRegistry, table: &Table) -> Result<Vec<RowSnapshot>> {
        let owner = accounts.resolve(table.code);
        if owner.is_none() {
            warn!("table {} belongs to unknown account, rows shown as hex", table.key());
        }
        let accessor = owner.map(|account| account.table_rows(store, table.table, table.scope));

        let mut rows = Vec::with_capacity(table.len());
        let mut cursor = table.lowest_key().and_then(|key| table.lowerbound(key));
        while let Some(row) = cursor {
            let value = match &accessor {
                Some(accessor) => accessor.get(row.primary_key)?.unwrap_or(Value::Null),
                None => Value::String(hex::encode(&row.value)),
            };
            let secondary_indexes = IndexPlane::ALL
                .iter()
                .filter_map(|plane| store.secondary(*plane, table.id, row.primary_key))
                .map(|entry| entry.key().decode())
                .collect();
            rows.push(RowSnapshot {
                primary_key: row.primary_key,
                payer: row.payer.to_string(),
                value,
                secondary_indexes,
            });
            cursor = table.next(row.primary_key);
        }
        Ok(rows)
    }
}
