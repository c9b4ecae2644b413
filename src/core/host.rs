//! The chain as seen by a VM during one `apply` call.

use crate::core::account::AccountRegistry;
use crate::core::clock::{Clock, TimePoint};
use crate::core::store::TableStore;
use crate::name::Name;

pub struct ApplyHost<'a> {
    store: &'a mut TableStore,
    accounts: &'a AccountRegistry,
    clock: &'a Clock,
    console: &'a mut String,
}

impl<'a> ApplyHost<'a> {
    pub fn new(
        store: &'a mut TableStore,
        accounts: &'a AccountRegistry,
        clock: &'a Clock,
        console: &'a mut String,
    ) -> Self {
        Self {
            store,
            accounts,
            clock,
            console,
        }
    }

    pub fn store(&self) -> &TableStore {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut TableStore {
        &mut *self.store
    }

    pub fn current_time(&self) -> TimePoint {
        self.clock.timestamp()
    }

    pub fn block_num(&self) -> f64 {
        self.clock.block_num()
    }

    pub fn is_account(&self, name: Name) -> bool {
        self.accounts.contains(name)
    }

    pub fn is_contract(&self, name: Name) -> bool {
        self.accounts.resolve(name).is_some_and(|a| a.is_contract())
    }

    /// Appends contract output to the transaction console.
    pub fn print(&mut self, text: &str) {
        self.console.push_str(text);
    }

    pub fn console(&self) -> &str {
        self.console.as_str()
    }
}
