//! Accounts, the VM seam, and the account registry.
//!
//! An account may be a deployed contract: it then carries a VM factory and a VM
//! instance. The instance is thrown away and rebuilt at the start of every
//! transaction so nothing but persisted rows survives between transactions.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::core::context::ActionContext;
use crate::core::host::ApplyHost;
use crate::core::store::{KeyValue, TableStore};
use crate::error::{Result, SimError};
use crate::name::Name;
use crate::utils::sha256_hex;

/// Executes one action context. Must fill the context's queues and flags before returning.
pub trait Vm: Send {
    fn apply(&mut self, ctx: &mut ActionContext, host: &mut ApplyHost<'_>) -> anyhow::Result<()>;
}

/// What a VM factory gets to build a fresh instance from.
#[derive(Debug, Clone)]
pub struct VmInit {
    pub account: Name,
    pub code: Bytes,
    pub abi: Option<String>,
    pub enable_inline: bool,
}

pub trait VmFactory: Send + Sync {
    fn instantiate(&self, init: &VmInit) -> anyhow::Result<Box<dyn Vm>>;
}

impl<F> VmFactory for F
where
    F: Fn(&VmInit) -> anyhow::Result<Box<dyn Vm>> + Send + Sync,
{
    fn instantiate(&self, init: &VmInit) -> anyhow::Result<Box<dyn Vm>> {
        self(init)
    }
}

/// Decodes a raw row of `table` into a JSON value, per the contract's schema.
pub trait RowDecoder: Send + Sync {
    fn decode_row(&self, table: Name, raw: &[u8]) -> anyhow::Result<Value>;
}

impl<F> RowDecoder for F
where
    F: Fn(Name, &[u8]) -> anyhow::Result<Value> + Send + Sync,
{
    fn decode_row(&self, table: Name, raw: &[u8]) -> anyhow::Result<Value> {
        self(table, raw)
    }
}

/// Code hash record, as a contract would read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeHash {
    pub struct_version: u32,
    pub code_sequence: u64,
    pub code_hash: String,
    pub vm_type: u8,
    pub vm_version: u8,
}

pub struct Account {
    pub name: Name,
    code: Bytes,
    abi: Option<String>,
    code_sequence: u64,
    enable_inline: bool,
    vm_factory: Option<Arc<dyn VmFactory>>,
    vm: Option<Box<dyn Vm>>,
    row_decoder: Option<Arc<dyn RowDecoder>>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("is_contract", &self.is_contract())
            .field("code_len", &self.code.len())
            .field("code_sequence", &self.code_sequence)
            .field("enable_inline", &self.enable_inline)
            .field("has_vm", &self.vm.is_some())
            .field("has_row_decoder", &self.row_decoder.is_some())
            .finish()
    }
}

impl Account {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            code: Bytes::new(),
            abi: None,
            code_sequence: 0,
            enable_inline: true,
            vm_factory: None,
            vm: None,
            row_decoder: None,
        }
    }

    pub fn with_contract(mut self, factory: Arc<dyn VmFactory>) -> Self {
        self.set_contract(factory, Bytes::new(), None);
        self
    }

    pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_abi(mut self, abi: impl Into<String>) -> Self {
        self.abi = Some(abi.into());
        self
    }

    pub fn with_inline(mut self, enable_inline: bool) -> Self {
        self.enable_inline = enable_inline;
        self
    }

    pub fn with_row_decoder(mut self, decoder: Arc<dyn RowDecoder>) -> Self {
        self.row_decoder = Some(decoder);
        self
    }

    pub fn set_row_decoder(&mut self, decoder: Arc<dyn RowDecoder>) {
        self.row_decoder = Some(decoder);
    }

    /// Deploys (or redeploys) a contract. Bumps the code sequence and drops the current VM.
    pub fn set_contract(&mut self, factory: Arc<dyn VmFactory>, code: Bytes, abi: Option<String>) {
        self.vm_factory = Some(factory);
        if !code.is_empty() {
            self.code = code;
        }
        if abi.is_some() {
            self.abi = abi;
        }
        self.code_sequence += 1;
        self.vm = None;
    }

    pub fn is_contract(&self) -> bool {
        self.vm_factory.is_some()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn abi(&self) -> Option<&str> {
        self.abi.as_deref()
    }

    pub fn enable_inline(&self) -> bool {
        self.enable_inline
    }

    /// Zero hash when the account has no code.
    pub fn code_hash(&self) -> CodeHash {
        let code_hash = if self.code.is_empty() {
            "0".repeat(64)
        } else {
            sha256_hex(&self.code)
        };
        CodeHash {
            struct_version: 0,
            code_sequence: self.code_sequence,
            code_hash,
            vm_type: 0,
            vm_version: 0,
        }
    }

    /// Discards the VM instance and builds a fresh one. No-op for plain accounts.
    pub fn recreate_vm(&mut self) -> Result<()> {
        self.vm = None;
        if let Some(factory) = &self.vm_factory {
            let init = VmInit {
                account: self.name,
                code: self.code.clone(),
                abi: self.abi.clone(),
                enable_inline: self.enable_inline,
            };
            let vm = factory
                .instantiate(&init)
                .map_err(|source| SimError::VmInit {
                    account: self.name,
                    source,
                })?;
            self.vm = Some(vm);
        }
        Ok(())
    }

    pub(crate) fn take_vm(&mut self) -> Option<Box<dyn Vm>> {
        self.vm.take()
    }

    pub(crate) fn restore_vm(&mut self, vm: Box<dyn Vm>) {
        self.vm = Some(vm);
    }

    /// Decodes a raw row value through the account's row decoder, or to a hex string without one.
    pub fn decode_row(&self, table: Name, raw: &[u8]) -> Result<Value> {
        match &self.row_decoder {
            Some(decoder) => decoder.decode_row(table, raw).map_err(|e| {
                SimError::Decode(format!("{}::{} row: {}", self.name, table, e))
            }),
            None => Ok(Value::String(hex::encode(raw))),
        }
    }

    /// Row accessor for one table and scope of this contract.
    pub fn table_rows<'a>(&'a self, store: &'a TableStore, table: Name, scope: Name) -> TableRowAccessor<'a> {
        TableRowAccessor {
            account: self,
            store,
            table,
            scope,
        }
    }
}

/// Reads and decodes rows of one (table, scope) owned by an account.
pub struct TableRowAccessor<'a> {
    account: &'a Account,
    store: &'a TableStore,
    table: Name,
    scope: Name,
}

impl<'a> TableRowAccessor<'a> {
    pub fn raw(&self, primary_key: u64) -> Option<&'a KeyValue> {
        self.store
            .get(self.account.name, self.scope, self.table, primary_key)
    }

    /// Decoded value of the row, `None` if it does not exist.
    pub fn get(&self, primary_key: u64) -> Result<Option<Value>> {
        match self.raw(primary_key) {
            Some(row) => self.account.decode_row(self.table, &row.value).map(Some),
            None => Ok(None),
        }
    }

    /// All decoded rows in primary-key order.
    pub fn all(&self) -> Result<Vec<Value>> {
        let Some(table) = self.store.find_table(self.account.name, self.scope, self.table) else {
            return Ok(Vec::new());
        };
        table
            .rows()
            .map(|row| self.account.decode_row(self.table, &row.value))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: HashMap<Name, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Adds or replaces an account.
    pub fn insert(&mut self, account: Account) -> &mut Account {
        match self.accounts.entry(account.name) {
            Entry::Occupied(mut slot) => {
                slot.insert(account);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(account),
        }
    }

    pub fn resolve(&self, name: Name) -> Option<&Account> {
        self.accounts.get(&name)
    }

    pub fn resolve_mut(&mut self, name: Name) -> Option<&mut Account> {
        self.accounts.get_mut(&name)
    }

    pub fn contains(&self, name: Name) -> bool {
        self.accounts.contains_key(&name)
    }

    /// Resolves `name` to a deployed contract, or fails with `MissingContract`.
    pub fn resolve_contract(&self, name: Name) -> Result<&Account> {
        self.resolve(name)
            .filter(|account| account.is_contract())
            .ok_or(SimError::MissingContract(name))
    }

    /// Account names in ascending order.
    pub fn names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self.accounts.keys().copied().collect();
        names.sort();
        names
    }

    /// Rebuilds every account's VM. Accounts share no VM state, so the parallel path
    /// builds them independently and returns once all are done.
    pub fn recreate_vms(&mut self, parallel: bool) -> Result<()> {
        if parallel {
            self.accounts
                .par_iter_mut()
                .try_for_each(|(_, account)| account.recreate_vm())
        } else {
            for name in self.names() {
                if let Some(account) = self.accounts.get_mut(&name) {
                    account.recreate_vm()?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::n;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopVm;

    impl Vm for NoopVm {
        fn apply(&mut self, _ctx: &mut ActionContext, _host: &mut ApplyHost<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop_factory(counter: Arc<AtomicUsize>) -> Arc<dyn VmFactory> {
        Arc::new(move |_: &VmInit| -> anyhow::Result<Box<dyn Vm>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopVm))
        })
    }

    #[test]
    fn test_plain_account_is_not_contract() {
        let account = Account::new(n("alice"));
        assert!(!account.is_contract());
        assert_eq!(account.code_hash().code_hash, "0".repeat(64));
    }

    #[test]
    fn test_resolve_contract() {
        let mut registry = AccountRegistry::new();
        registry.insert(Account::new(n("alice")));
        registry.insert(Account::new(n("token")).with_contract(noop_factory(Arc::new(AtomicUsize::new(0)))));
        assert!(registry.resolve_contract(n("token")).is_ok());
        assert!(registry.resolve_contract(n("alice")).unwrap_err().is_missing_contract());
        assert!(registry.resolve_contract(n("nobody")).unwrap_err().is_missing_contract());
    }

    #[test]
    fn test_recreate_vms_parallel_and_sequential() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = AccountRegistry::new();
        for name in ["a", "b", "c"] {
            registry.insert(Account::new(n(name)).with_contract(noop_factory(Arc::clone(&counter))));
        }
        registry.insert(Account::new(n("plain")));
        registry.recreate_vms(true).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        registry.recreate_vms(false).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_recreate_vm_failure() {
        let failing: Arc<dyn VmFactory> = Arc::new(|_: &VmInit| -> anyhow::Result<Box<dyn Vm>> {
            anyhow::bail!("bad wasm")
        });
        let mut account = Account::new(n("broken")).with_contract(failing);
        let err = account.recreate_vm().unwrap_err();
        assert!(matches!(err, SimError::VmInit { .. }));
    }

    #[test]
    fn test_code_hash_and_sequence() {
        let mut account = Account::new(n("token")).with_code(vec![0u8, 97, 115, 109]);
        account.set_contract(noop_factory(Arc::new(AtomicUsize::new(0))), Bytes::new(), None);
        let hash = account.code_hash();
        assert_eq!(hash.code_sequence, 1);
        assert_eq!(hash.code_hash, sha256_hex(&[0u8, 97, 115, 109]));
    }

    #[test]
    fn test_row_accessor_default_hex() {
        let mut store = TableStore::new();
        store
            .store(n("token"), n("alice"), n("accounts"), n("alice"), 1, vec![0xde, 0xad])
            .unwrap();
        let account = Account::new(n("token"));
        let rows = account.table_rows(&store, n("accounts"), n("alice"));
        assert_eq!(rows.get(1).unwrap(), Some(Value::String("dead".to_string())));
        assert_eq!(rows.get(2).unwrap(), None);
        assert_eq!(rows.all().unwrap().len(), 1);
    }

    #[test]
    fn test_row_accessor_with_decoder() {
        let mut store = TableStore::new();
        store
            .store(n("token"), n("alice"), n("accounts"), n("alice"), 1, 7u64.to_le_bytes().to_vec())
            .unwrap();
        let decoder: Arc<dyn RowDecoder> = Arc::new(|_table: Name, raw: &[u8]| -> anyhow::Result<Value> {
            let bytes: [u8; 8] = raw.try_into()?;
            Ok(serde_json::json!({ "balance": u64::from_le_bytes(bytes) }))
        });
        let account = Account::new(n("token")).with_row_decoder(decoder);
        let rows = account.table_rows(&store, n("accounts"), n("alice"));
        assert_eq!(rows.get(1).unwrap(), Some(serde_json::json!({"balance": 7})));
    }
}
