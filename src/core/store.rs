//! In-memory multi-index row store.
//!
//! Tables are identified by (code, scope, table) and get a store-local id on creation.
//! Rows are ordered by primary key. Secondary entries live in four planes keyed by
//! `(table id, primary key)` and never exist without their primary row.
//!
//! # Invariants
//! - The primary row is authoritative: `store_secondary` requires it, `erase` drops every secondary entry of the row.
//! - A table is dropped from the index once its last row is erased.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use thiserror::Error;

use crate::core::secondary::{normalize_double, IndexPlane, SecondaryKey};
use crate::error::SimError;
use crate::name::Name;

pub type TableId = u32;

/// Errors produced by the row store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("row {primary_key} already exists in {table}")]
    DuplicateKey { table: TableKey, primary_key: u64 },

    #[error("row {primary_key} not found in {table}")]
    RowNotFound { table: TableKey, primary_key: u64 },

    #[error("secondary key for row {primary_key} in {table} has no primary row")]
    PrimaryRowMissing { table: TableKey, primary_key: u64 },
}

impl From<StoreError> for SimError {
    fn from(err: StoreError) -> Self {
        SimError::Store(err.to_string())
    }
}

/// (code, scope, table) triple identifying a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub code: Name,
    pub scope: Name,
    pub table: Name,
}

impl TableKey {
    pub fn new(code: Name, scope: Name, table: Name) -> Self {
        Self { code, scope, table }
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.code, self.scope, self.table)
    }
}

/// A primary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub table_id: TableId,
    pub primary_key: u64,
    pub payer: Name,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryEntry {
    pub table_id: TableId,
    pub primary_key: u64,
    pub payer: Name,
    pub secondary_key: SecondaryKeyBits,
}

/// Bit-exact storage of a secondary key so entries compare with `Eq`.
/// Doubles are held byte-swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecondaryKeyBits {
    U64(u64),
    U128(u128),
    U256([u128; 2]),
    Double(u64),
}

impl From<SecondaryKey> for SecondaryKeyBits {
    fn from(key: SecondaryKey) -> Self {
        match key {
            SecondaryKey::U64(v) => SecondaryKeyBits::U64(v),
            SecondaryKey::U128(v) => SecondaryKeyBits::U128(v),
            SecondaryKey::U256(v) => SecondaryKeyBits::U256(v),
            SecondaryKey::Double(v) => SecondaryKeyBits::Double(normalize_double(v).to_bits()),
        }
    }
}

impl From<SecondaryKeyBits> for SecondaryKey {
    fn from(bits: SecondaryKeyBits) -> Self {
        match bits {
            SecondaryKeyBits::U64(v) => SecondaryKey::U64(v),
            SecondaryKeyBits::U128(v) => SecondaryKey::U128(v),
            SecondaryKeyBits::U256(v) => SecondaryKey::U256(v),
            SecondaryKeyBits::Double(v) => SecondaryKey::Double(normalize_double(f64::from_bits(v))),
        }
    }
}

impl SecondaryEntry {
    pub fn key(&self) -> SecondaryKey {
        self.secondary_key.into()
    }
}

/// One table: rows ordered by ascending primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: TableId,
    pub code: Name,
    pub scope: Name,
    pub table: Name,
    pub payer: Name,
    rows: BTreeMap<u64, KeyValue>,
}

impl Table {
    fn new(id: TableId, key: TableKey, payer: Name) -> Self {
        Self {
            id,
            code: key.code,
            scope: key.scope,
            table: key.table,
            payer,
            rows: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(self.code, self.scope, self.table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Smallest primary key, or `None` for an empty table.
    pub fn lowest_key(&self) -> Option<u64> {
        self.rows.keys().next().copied()
    }

    pub fn highest_key(&self) -> Option<u64> {
        self.rows.keys().next_back().copied()
    }

    pub fn find(&self, primary_key: u64) -> Option<&KeyValue> {
        self.rows.get(&primary_key)
    }

    /// First row with a primary key `>= key`.
    pub fn lowerbound(&self, key: u64) -> Option<&KeyValue> {
        self.rows.range(key..).next().map(|(_, kv)| kv)
    }

    /// First row with a primary key `> key`.
    pub fn upperbound(&self, key: u64) -> Option<&KeyValue> {
        self.next(key)
    }

    /// Row following `key` in primary-key order.
    pub fn next(&self, key: u64) -> Option<&KeyValue> {
        let start = key.checked_add(1)?;
        self.rows.range(start..).next().map(|(_, kv)| kv)
    }

    pub fn rows(&self) -> impl Iterator<Item = &KeyValue> {
        self.rows.values()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableStore {
    tables: BTreeMap<TableKey, Table>,
    ids: HashMap<TableId, TableKey>,
    next_id: TableId,
    secondary: [HashMap<(TableId, u64), SecondaryEntry>; 4],
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Every table, ordered by (code, scope, table).
    pub fn table_index(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn find_table(&self, code: Name, scope: Name, table: Name) -> Option<&Table> {
        self.tables.get(&TableKey::new(code, scope, table))
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&Table> {
        self.ids.get(&id).and_then(|key| self.tables.get(key))
    }

    pub fn find_or_create_table(&mut self, code: Name, scope: Name, table: Name, payer: Name) -> TableId {
        let key = TableKey::new(code, scope, table);
        if let Some(existing) = self.tables.get(&key) {
            return existing.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.tables.insert(key, Table::new(id, key, payer));
        self.ids.insert(id, key);
        id
    }

    pub fn get(&self, code: Name, scope: Name, table: Name, primary_key: u64) -> Option<&KeyValue> {
        self.find_table(code, scope, table)?.find(primary_key)
    }

    /// Inserts a new row. Fails if the primary key is taken.
    pub fn store(
        &mut self,
        code: Name,
        scope: Name,
        table: Name,
        payer: Name,
        primary_key: u64,
        value: impl Into<Bytes>,
    ) -> Result<TableId, StoreError> {
        let key = TableKey::new(code, scope, table);
        if self.get(code, scope, table, primary_key).is_some() {
            return Err(StoreError::DuplicateKey { table: key, primary_key });
        }
        let id = self.find_or_create_table(code, scope, table, payer);
        if let Some(t) = self.tables.get_mut(&key) {
            t.rows.insert(
                primary_key,
                KeyValue {
                    table_id: id,
                    primary_key,
                    payer,
                    value: value.into(),
                },
            );
        }
        Ok(id)
    }

    /// Replaces the value and payer of an existing row.
    pub fn update(
        &mut self,
        code: Name,
        scope: Name,
        table: Name,
        payer: Name,
        primary_key: u64,
        value: impl Into<Bytes>,
    ) -> Result<(), StoreError> {
        let key = TableKey::new(code, scope, table);
        let row = self
            .tables
            .get_mut(&key)
            .and_then(|t| t.rows.get_mut(&primary_key))
            .ok_or(StoreError::RowNotFound { table: key, primary_key })?;
        row.payer = payer;
        row.value = value.into();
        Ok(())
    }

    /// Removes a row together with its secondary entries.
    pub fn erase(&mut self, code: Name, scope: Name, table: Name, primary_key: u64) -> Result<KeyValue, StoreError> {
        let key = TableKey::new(code, scope, table);
        let t = self
            .tables
            .get_mut(&key)
            .ok_or(StoreError::RowNotFound { table: key, primary_key })?;
        let row = t
            .rows
            .remove(&primary_key)
            .ok_or(StoreError::RowNotFound { table: key, primary_key })?;
        let now_empty = t.rows.is_empty();
        let id = t.id;
        for plane in self.secondary.iter_mut() {
            plane.remove(&(id, primary_key));
        }
        if now_empty {
            self.tables.remove(&key);
            self.ids.remove(&id);
        }
        Ok(row)
    }

    /// Sets the row's entry in the key's plane, replacing any previous one.
    pub fn store_secondary(
        &mut self,
        code: Name,
        scope: Name,
        table: Name,
        payer: Name,
        primary_key: u64,
        secondary_key: SecondaryKey,
    ) -> Result<(), StoreError> {
        let key = TableKey::new(code, scope, table);
        let table_id = self
            .get(code, scope, table, primary_key)
            .map(|row| row.table_id)
            .ok_or(StoreError::PrimaryRowMissing { table: key, primary_key })?;
        let plane = secondary_key.plane();
        self.secondary[plane.position()].insert(
            (table_id, primary_key),
            SecondaryEntry {
                table_id,
                primary_key,
                payer,
                secondary_key: secondary_key.into(),
            },
        );
        Ok(())
    }

    pub fn erase_secondary(&mut self, plane: IndexPlane, table_id: TableId, primary_key: u64) -> Option<SecondaryEntry> {
        self.secondary[plane.position()].remove(&(table_id, primary_key))
    }

    /// Secondary lookup keyed by `(table id, primary key)`.
    pub fn secondary(&self, plane: IndexPlane, table_id: TableId, primary_key: u64) -> Option<&SecondaryEntry> {
        self.secondary[plane.position()].get(&(table_id, primary_key))
    }
}
