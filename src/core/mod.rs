// Core module: the simulated chain and its transaction engine
//
// DETERMINISM:
// =======================
// Applying the same transaction to the same chain state with the same VM
// behaviour always yields the same trace, console and storage:
// 1. Dispatch order is fixed by the two-queue scheduling rule (see `dispatch`)
// 2. Ordinals are kept per chain, never in process-wide state
// 3. Chain time only moves through the clock operations
// 4. Snapshots list rows in table-index and primary-key order
//
// INVARIANTS:
// - Every contract VM is rebuilt before a transaction dispatches its first action
// - Execution traces, console and storage deltas describe the last transaction only
// - A failed transaction keeps the store writes of the contexts that ran before the failure

pub mod account;
pub mod clock;
pub mod context;
pub mod delta;
pub mod diff;
pub mod dispatch;
pub mod host;
pub mod native;
pub mod secondary;
pub mod snapshot;
pub mod store;
pub mod trace;
pub mod transaction;

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};
use serde_json::Value;

use crate::config::BlockchainConfig;
use crate::core::account::{Account, AccountRegistry, VmFactory};
use crate::core::clock::{Clock, TimePoint};
use crate::core::delta::{DiffReconciler, StorageDeltas};
use crate::core::diff::{diff, flatten_changeset, FlatChange};
use crate::core::dispatch::DispatchEngine;
use crate::core::snapshot::{Snapshot, StorageProjector};
use crate::core::store::TableStore;
use crate::core::trace::ExecutionTrace;
use crate::core::transaction::Transaction;
use crate::error::{Result, SimError};
use crate::loader;
use crate::name::Name;

/// The simulated chain: accounts, rows, time, and what the last transaction did.
#[derive(Debug)]
pub struct Blockchain {
    accounts: AccountRegistry,
    clock: Clock,
    store: TableStore,
    console: String,
    execution_traces: Vec<ExecutionTrace>,
    config: BlockchainConfig,

    storage_deltas_enabled: bool,
    pre_storage: Option<Snapshot>,
    post_storage: Option<Snapshot>,
    storage_changes: Vec<FlatChange>,
    storage_deltas: StorageDeltas,
}

impl Blockchain {
    /// Creates an empty chain at time 0, block 0.
    pub fn new() -> Self {
        Self::with_config(BlockchainConfig::default())
    }

    pub fn with_config(config: BlockchainConfig) -> Self {
        Self {
            accounts: AccountRegistry::new(),
            clock: Clock::new(TimePoint::from_millis(config.initial_time_ms), config.initial_block_num),
            store: TableStore::new(),
            console: String::new(),
            execution_traces: Vec::new(),
            storage_deltas_enabled: config.storage_deltas,
            config,
            pre_storage: None,
            post_storage: None,
            storage_changes: Vec::new(),
            storage_deltas: StorageDeltas::new(),
        }
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Runs a transaction from a clean VM state.
    ///
    /// Flow:
    /// 1. Resets VMs, traces, console and storage tracking
    /// 2. Takes the pre-transaction snapshot (delta tracking only)
    /// 3. Dispatches every action, inline action and notification
    /// 4. Takes the post snapshot and rebuilds the storage deltas (delta tracking only)
    ///
    /// Fails with `MissingContract` when a receiver cannot run, or with `Vm` when a
    /// contract raises. Rows written before the failure stay in the store.
    pub fn apply_transaction(&mut self, transaction: Transaction, decoded_data: Option<Value>) -> Result<()> {
        self.reset_transaction()?;

        if self.storage_deltas_enabled {
            self.pre_storage = Some(self.get_storage()?);
        }

        let transaction = Arc::new(transaction);
        let mut engine = DispatchEngine::new(&mut self.accounts, &mut self.store, &self.clock, &mut self.console);
        let outcome = engine.execute(transaction, decoded_data, &mut self.execution_traces);
        let dispatched = engine.cursor().dispatched();
        outcome?;
        info!("transaction applied: {} contexts dispatched", dispatched);

        if self.storage_deltas_enabled {
            self.set_storage_deltas()?;
        }
        Ok(())
    }

    fn set_storage_deltas(&mut self) -> Result<()> {
        let post = self.get_storage()?;
        let pre = self.pre_storage.take().unwrap_or_default();
        self.storage_changes = flatten_changeset(&diff(&pre, &post));
        self.storage_deltas = DiffReconciler::reconcile_changes(&pre, &post, &self.storage_changes);
        self.pre_storage = Some(pre);
        self.post_storage = Some(post);
        Ok(())
    }

    // Accounts

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn get_account(&self, name: Name) -> Option<&Account> {
        self.accounts.resolve(name)
    }

    pub fn get_account_mut(&mut self, name: Name) -> Option<&mut Account> {
        self.accounts.resolve_mut(name)
    }

    /// Creates a plain account, replacing any account of the same name.
    pub fn create_account(&mut self, name: &str) -> Result<&mut Account> {
        let name = Name::parse(name)?;
        Ok(self.accounts.insert(Account::new(name)))
    }

    pub fn create_accounts(&mut self, names: &[&str]) -> Result<Vec<Name>> {
        names
            .iter()
            .map(|name| self.create_account(name).map(|account| account.name))
            .collect()
    }

    /// Creates a contract account from `<folder>.wasm` and `<folder>.abi`.
    pub fn create_contract(&mut self, name: &str, folder: &str, factory: Arc<dyn VmFactory>) -> Result<&mut Account> {
        let code = loader::load(&format!("{folder}.wasm"))?;
        let abi = loader::load_text(&format!("{folder}.abi"))?;
        let account = self.create_account(name)?;
        account.set_contract(factory, Bytes::from(code), Some(abi));
        Ok(account)
    }

    /// Creates a contract account whose behaviour lives entirely in `factory`.
    pub fn deploy_contract(&mut self, name: &str, factory: Arc<dyn VmFactory>) -> Result<&mut Account> {
        let account = self.create_account(name)?;
        account.set_contract(factory, Bytes::new(), None);
        Ok(account)
    }

    // Time

    pub fn timestamp(&self) -> TimePoint {
        self.clock.timestamp()
    }

    pub fn block_num(&self) -> f64 {
        self.clock.block_num()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn set_time(&mut self, time: TimePoint) {
        self.clock.set_time(time);
    }

    pub fn add_time(&mut self, delta: TimePoint) -> Result<()> {
        Ok(self.clock.add_time(delta)?)
    }

    /// Fails with `NegativeTime` and leaves the clock alone if `delta` exceeds the current time.
    pub fn subtract_time(&mut self, delta: TimePoint) -> Result<()> {
        Ok(self.clock.subtract_time(delta)?)
    }

    pub fn add_blocks(&mut self, count: u64) -> Result<()> {
        Ok(self.clock.add_blocks(count)?)
    }

    // Reset

    pub fn reset_transaction(&mut self) -> Result<()> {
        self.reset_vm()?;
        self.clear_console();
        Ok(())
    }

    /// Drops last-transaction state and rebuilds every account's VM.
    pub fn reset_vm(&mut self) -> Result<()> {
        self.pre_storage = None;
        self.post_storage = None;
        self.storage_changes.clear();
        self.storage_deltas = StorageDeltas::new();
        self.execution_traces.clear();
        self.accounts.recreate_vms(self.config.parallel_vm_reset)?;
        debug!("reset {} account VMs", self.accounts.len());
        Ok(())
    }

    pub fn clear_console(&mut self) {
        self.console.clear();
    }

    pub fn console(&self) -> &str {
        &self.console
    }

    /// Replaces the row store, with an empty one when `store` is `None`.
    pub fn reset_tables(&mut self, store: Option<TableStore>) {
        self.store = store.unwrap_or_default();
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TableStore {
        &mut self.store
    }

    pub fn execution_traces(&self) -> &[ExecutionTrace] {
        &self.execution_traces
    }

    // Storage

    pub fn enable_storage_deltas(&mut self) {
        self.storage_deltas_enabled = true;
    }

    pub fn disable_storage_deltas(&mut self) {
        self.storage_deltas_enabled = false;
    }

    pub fn is_storage_deltas_enabled(&self) -> bool {
        self.storage_deltas_enabled
    }

    /// Row deltas of the last transaction. Fails with `DeltasDisabled` while tracking is off.
    pub fn storage_deltas(&self) -> Result<&StorageDeltas> {
        if !self.storage_deltas_enabled {
            return Err(SimError::DeltasDisabled);
        }
        Ok(&self.storage_deltas)
    }

    pub fn storage_deltas_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self.storage_deltas()?)?)
    }

    /// Flattened diff behind the last deltas.
    pub fn storage_changes(&self) -> &[FlatChange] {
        &self.storage_changes
    }

    pub fn pre_storage(&self) -> Option<&Snapshot> {
        self.pre_storage.as_ref()
    }

    pub fn post_storage(&self) -> Option<&Snapshot> {
        self.post_storage.as_ref()
    }

    /// Current rows of every table, decoded.
    pub fn get_storage(&self) -> Result<Snapshot> {
        StorageProjector::snapshot(&self.store, &self.accounts)
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::native::NativeContract;
    use crate::core::transaction::{Action, PermissionLevel};
    use crate::name::n;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_contract() -> NativeContract {
        NativeContract::new().on_action(n("count"), |ctx, host| {
            let next = host
                .store()
                .get(ctx.receiver, ctx.receiver, n("counter"), 0)
                .map(|row| row.value[0] + 1)
                .unwrap_or(1);
            let store = host.store_mut();
            if next == 1 {
                store.store(ctx.receiver, ctx.receiver, n("counter"), ctx.receiver, 0, vec![next])?;
            } else {
                store.update(ctx.receiver, ctx.receiver, n("counter"), ctx.receiver, 0, vec![next])?;
            }
            host.print(&format!("count={next}"));
            Ok(())
        })
    }

    fn count_tx() -> Transaction {
        Transaction::from_action(Action::new(
            n("counter"),
            n("count"),
            vec![PermissionLevel::active(n("alice"))],
            Vec::<u8>::new(),
        ))
    }

    #[test]
    fn test_new_blockchain() {
        let chain = Blockchain::new();
        assert_eq!(chain.timestamp().as_millis(), 0);
        assert_eq!(chain.block_num(), 0.0);
        assert!(chain.accounts().is_empty());
        assert!(!chain.is_storage_deltas_enabled());
    }

    #[test]
    fn test_with_config() {
        let chain = Blockchain::with_config(BlockchainConfig {
            initial_time_ms: 1_000,
            initial_block_num: 2.0,
            storage_deltas: true,
            parallel_vm_reset: false,
        });
        assert_eq!(chain.timestamp().as_millis(), 1_000);
        assert_eq!(chain.block_num(), 2.0);
        assert!(chain.storage_deltas().is_ok());
    }

    #[test]
    fn test_console_and_traces_cleared_per_transaction() {
        let mut chain = Blockchain::new();
        chain.deploy_contract("counter", counter_contract().factory()).unwrap();

        chain.apply_transaction(count_tx(), None).unwrap();
        assert_eq!(chain.console(), "count=1");
        assert_eq!(chain.execution_traces().len(), 1);

        chain.apply_transaction(count_tx(), None).unwrap();
        assert_eq!(chain.console(), "count=2");
        assert_eq!(chain.execution_traces().len(), 1);
    }

    #[test]
    fn test_vm_recreated_every_transaction() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let contract = counter_contract().factory();
        let factory: Arc<dyn VmFactory> = Arc::new(move |init: &account::VmInit| {
            counter.fetch_add(1, Ordering::SeqCst);
            contract.instantiate(init)
        });
        let mut chain = Blockchain::new();
        chain.deploy_contract("counter", factory).unwrap();
        chain.create_accounts(&["alice", "bob"]).unwrap();

        chain.apply_transaction(count_tx(), None).unwrap();
        chain.apply_transaction(count_tx(), None).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_contract_leaves_no_trace() {
        let mut chain = Blockchain::new();
        chain.create_account("counter").unwrap();
        let err = chain.apply_transaction(count_tx(), None).unwrap_err();
        assert!(err.is_missing_contract());
        assert_eq!(err.to_string(), "Contract counter missing for inline action");
        assert!(chain.execution_traces().is_empty());
    }

    #[test]
    fn test_time_operations() {
        let mut chain = Blockchain::new();
        chain.add_time(TimePoint::from_secs(1)).unwrap();
        assert_eq!(chain.block_num(), 2.0);
        chain.add_blocks(3).unwrap();
        assert_eq!(chain.timestamp().as_millis(), 2_500);
        assert_eq!(chain.block_num(), 5.0);

        let err = chain.subtract_time(TimePoint::from_secs(10)).unwrap_err();
        assert!(err.is_negative_time());
        assert_eq!(chain.timestamp().as_millis(), 2_500);

        chain.set_time(TimePoint::from_secs(100));
        assert_eq!(chain.timestamp().as_secs(), 100);
        assert_eq!(chain.block_num(), 5.0);
    }

    #[test]
    fn test_deltas_disabled() {
        let chain = Blockchain::new();
        assert!(chain.storage_deltas().unwrap_err().is_deltas_disabled());
        assert!(chain.storage_deltas_json().is_err());
    }

    #[test]
    fn test_reset_tables() {
        let mut chain = Blockchain::new();
        chain.deploy_contract("counter", counter_contract().factory()).unwrap();
        chain.apply_transaction(count_tx(), None).unwrap();
        assert!(!chain.store().is_empty());

        let saved = chain.store().clone();
        chain.reset_tables(None);
        assert!(chain.store().is_empty());
        chain.reset_tables(Some(saved));
        assert_eq!(chain.store().table_count(), 1);
    }
}
