//! Transaction dispatch: the order in which actions, inline actions and notifications run.
//!
//! Each top-level action seeds two queues. Every step pops one context, preferring
//! the notification queue, and hands it to the receiver's VM. Afterwards:
//! - notifications it raised go to the back of the notification queue;
//! - actions raised by a notification go to the back of the action queue;
//! - actions raised by a regular or inline action go to the front of the action
//!   queue, keeping their own order (depth-first, like a call stack).
//!
//! # Ordinals
//! - `execution_order` advances for every dispatched context and is unique across the transaction.
//! - `action_ordinal` advances only when a context is taken from the action queue; a
//!   notification reuses the current ordinal.
//! - Both counters start before the first top-level action and are never reset inside a transaction.
//!
//! # Recipients
//! An account receives a given action at most once. A notification whose receiver already
//! ran under the current action ordinal is dropped without a trace.
//!
//! # Failure
//! A missing receiver or a VM error aborts the transaction. Nothing is rolled back:
//! rows written by contexts that already ran stay in the store.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::core::account::AccountRegistry;
use crate::core::clock::Clock;
use crate::core::context::ActionContext;
use crate::core::host::ApplyHost;
use crate::core::store::TableStore;
use crate::core::trace::ExecutionTrace;
use crate::core::transaction::Transaction;
use crate::error::{Result, SimError};
use crate::name::Name;

/// Ordinal and execution-order counters threaded through one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCursor {
    action_ordinal: Option<u32>,
    execution_order: Option<u32>,
}

impl DispatchCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to the next action ordinal and returns it (0 for the first action).
    pub fn advance_action(&mut self) -> u32 {
        let next = self.action_ordinal.map_or(0, |o| o + 1);
        self.action_ordinal = Some(next);
        next
    }

    /// Ordinal of the most recently advanced action.
    pub fn current_action(&self) -> u32 {
        self.action_ordinal.unwrap_or(0)
    }

    pub fn advance_execution(&mut self) -> u32 {
        let next = self.execution_order.map_or(0, |o| o + 1);
        self.execution_order = Some(next);
        next
    }

    /// Number of contexts dispatched so far.
    pub fn dispatched(&self) -> u32 {
        self.execution_order.map_or(0, |o| o + 1)
    }
}

pub struct DispatchEngine<'a> {
    accounts: &'a mut AccountRegistry,
    store: &'a mut TableStore,
    clock: &'a Clock,
    console: &'a mut String,
    cursor: DispatchCursor,
}

impl<'a> DispatchEngine<'a> {
    pub fn new(
        accounts: &'a mut AccountRegistry,
        store: &'a mut TableStore,
        clock: &'a Clock,
        console: &'a mut String,
    ) -> Self {
        Self {
            accounts,
            store,
            clock,
            console,
            cursor: DispatchCursor::new(),
        }
    }

    pub fn cursor(&self) -> DispatchCursor {
        self.cursor
    }

    /// Runs every top-level action of `transaction` in order, appending one trace per
    /// dispatched context to `traces`. Traces recorded before a failure are kept.
    pub fn execute(
        &mut self,
        transaction: Arc<Transaction>,
        decoded_data: Option<Value>,
        traces: &mut Vec<ExecutionTrace>,
    ) -> Result<()> {
        for action in transaction.actions.iter() {
            self.accounts.resolve_contract(action.account)?;
            let context = ActionContext::top_level(action, Arc::clone(&transaction), decoded_data.clone());
            self.run(context, traces)?;
        }
        Ok(())
    }

    fn run(&mut self, root: ActionContext, traces: &mut Vec<ExecutionTrace>) -> Result<()> {
        let mut actions: VecDeque<ActionContext> = VecDeque::from([root]);
        let mut notifications: VecDeque<ActionContext> = VecDeque::new();
        // receivers of the action at the current ordinal
        let mut recipients: HashSet<Name> = HashSet::new();

        loop {
            let mut context = if let Some(mut next) = notifications.pop_front() {
                if !recipients.insert(next.receiver) {
                    debug!("{} already received {}::{}", next.receiver, next.first_receiver, next.action);
                    continue;
                }
                self.check_receiver(&next)?;
                next.action_ordinal = self.cursor.current_action();
                next
            } else if let Some(mut next) = actions.pop_front() {
                self.check_receiver(&next)?;
                next.action_ordinal = self.cursor.advance_action();
                recipients.clear();
                recipients.insert(next.receiver);
                next
            } else {
                break;
            };
            context.execution_order = self.cursor.advance_execution();

            let trace = ExecutionTrace::from(&context);
            trace.log();
            traces.push(trace);

            log_start(&context);
            self.apply(&mut context)?;

            notifications.extend(context.notifications_queue.drain(..));
            let spawned = std::mem::take(&mut context.actions_queue);
            if context.is_notification {
                actions.extend(spawned);
            } else {
                for child in spawned.into_iter().rev() {
                    actions.push_front(child);
                }
            }
        }
        Ok(())
    }

    /// Notifications may reach plain accounts; anything else needs a deployed contract.
    fn check_receiver(&self, context: &ActionContext) -> Result<()> {
        match self.accounts.resolve(context.receiver) {
            Some(account) if account.is_contract() || context.is_notification => Ok(()),
            _ => Err(SimError::MissingContract(context.receiver)),
        }
    }

    fn apply(&mut self, context: &mut ActionContext) -> Result<()> {
        let receiver = context.receiver;
        let account = self
            .accounts
            .resolve_mut(receiver)
            .ok_or(SimError::MissingContract(receiver))?;
        if !account.is_contract() {
            return Ok(());
        }
        let mut vm = match account.take_vm() {
            Some(vm) => vm,
            None => {
                account.recreate_vm()?;
                account.take_vm().ok_or(SimError::MissingContract(receiver))?
            }
        };

        let result = {
            let mut host = ApplyHost::new(&mut *self.store, &*self.accounts, self.clock, &mut *self.console);
            vm.apply(context, &mut host)
        };

        if let Some(account) = self.accounts.resolve_mut(receiver) {
            account.restore_vm(vm);
        }
        result.map_err(|source| SimError::Vm {
            receiver,
            action: context.action,
            source,
        })
    }
}

fn log_start(context: &ActionContext) {
    debug!(
        "START ACTION\n    Inline: {}\n    Notification: {}\n    Contract: {}\n    Action: {}\n    First Receiver: {}\n    Sender: {}\n    Authorization: {}\n    Data: {}",
        context.is_inline,
        context.is_notification,
        context.receiver,
        context.action,
        context.first_receiver,
        context.sender.map(|s| s.to_string()).unwrap_or_default(),
        serde_json::to_string(&context.authorization).unwrap_or_default(),
        context
            .decoded_data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| hex::encode(&context.data)),
    );
}
