//! Contracts written as Rust closures.
//!
//! A [`NativeContract`] maps action names to handlers, plus `on_notify` handlers matched
//! against `code::action` patterns where either side may be `*`. It plugs into the
//! simulator through [`NativeContract::factory`] like any other VM.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use crate::core::account::{Vm, VmFactory, VmInit};
use crate::core::context::ActionContext;
use crate::core::host::ApplyHost;
use crate::error::{Result, SimError};
use crate::name::Name;

pub type Handler = Arc<dyn Fn(&mut ActionContext, &mut ApplyHost<'_>) -> anyhow::Result<()> + Send + Sync>;

/// `code::action` filter for notification handlers; `None` stands for `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyPattern {
    pub code: Option<Name>,
    pub action: Option<Name>,
}

impl NotifyPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let (code, action) = pattern
            .split_once("::")
            .ok_or_else(|| SimError::InvalidName(format!("notify pattern must be code::action, got {pattern}")))?;
        Ok(Self {
            code: parse_part(code)?,
            action: parse_part(action)?,
        })
    }

    pub fn matches(&self, code: Name, action: Name) -> bool {
        self.code.map_or(true, |c| c == code) && self.action.map_or(true, |a| a == action)
    }
}

fn parse_part(part: &str) -> Result<Option<Name>> {
    if part == "*" {
        Ok(None)
    } else {
        Ok(Some(Name::parse(part)?))
    }
}

#[derive(Clone, Default)]
pub struct NativeContract {
    actions: HashMap<Name, Handler>,
    notify: Vec<(NotifyPattern, Handler)>,
}

impl fmt::Debug for NativeContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<String> = self.actions.keys().map(|a| a.to_string()).collect();
        actions.sort();
        f.debug_struct("NativeContract")
            .field("actions", &actions)
            .field("notify", &self.notify.iter().map(|(p, _)| *p).collect::<Vec<_>>())
            .finish()
    }
}

impl NativeContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for `action` sent directly to this contract.
    pub fn on_action<F>(mut self, action: Name, handler: F) -> Self
    where
        F: Fn(&mut ActionContext, &mut ApplyHost<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.actions.insert(action, Arc::new(handler));
        self
    }

    /// Handler for notifications whose original action matches `pattern`. The first
    /// registered match wins.
    pub fn on_notify<F>(mut self, pattern: &str, handler: F) -> Result<Self>
    where
        F: Fn(&mut ActionContext, &mut ApplyHost<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.notify.push((NotifyPattern::parse(pattern)?, Arc::new(handler)));
        Ok(self)
    }

    pub fn handles(&self, action: Name) -> bool {
        self.actions.contains_key(&action)
    }

    /// Factory building a fresh VM over these handlers on every reset.
    pub fn factory(self) -> Arc<dyn VmFactory> {
        let contract = Arc::new(self);
        Arc::new(move |_init: &VmInit| -> anyhow::Result<Box<dyn Vm>> {
            Ok(Box::new(NativeVm {
                contract: Arc::clone(&contract),
            }))
        })
    }
}

struct NativeVm {
    contract: Arc<NativeContract>,
}

impl Vm for NativeVm {
    fn apply(&mut self, ctx: &mut ActionContext, host: &mut ApplyHost<'_>) -> anyhow::Result<()> {
        if ctx.is_notification {
            let handler = self
                .contract
                .notify
                .iter()
                .find(|(pattern, _)| pattern.matches(ctx.first_receiver, ctx.action))
                .map(|(_, handler)| Arc::clone(handler));
            return match handler {
                Some(handler) => handler(ctx, host),
                None => Ok(()),
            };
        }
        let handler = self
            .contract
            .actions
            .get(&ctx.action)
            .cloned()
            .ok_or_else(|| anyhow!("unknown action {} on {}", ctx.action, ctx.receiver))?;
        handler(ctx, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::AccountRegistry;
    use crate::core::clock::Clock;
    use crate::core::store::TableStore;
    use crate::core::transaction::{Action, Transaction};
    use crate::name::n;

    fn run(vm: &mut dyn Vm, ctx: &mut ActionContext) -> (anyhow::Result<()>, String) {
        let mut store = TableStore::new();
        let accounts = AccountRegistry::new();
        let clock = Clock::default();
        let mut console = String::new();
        let result = {
            let mut host = ApplyHost::new(&mut store, &accounts, &clock, &mut console);
            vm.apply(ctx, &mut host)
        };
        (result, console)
    }

    fn context(account: &str, action: &str) -> ActionContext {
        let action = Action::new(n(account), n(action), vec![], Vec::<u8>::new());
        ActionContext::top_level(&action, Arc::new(Transaction::from_action(action.clone())), None)
    }

    fn init(account: &str) -> VmInit {
        VmInit {
            account: n(account),
            code: bytes::Bytes::new(),
            abi: None,
            enable_inline: true,
        }
    }

    #[test]
    fn test_pattern_parse() {
        let any = NotifyPattern::parse("*::transfer").unwrap();
        assert_eq!(any.code, None);
        assert!(any.matches(n("eosio.token"), n("transfer")));
        assert!(!any.matches(n("eosio.token"), n("issue")));

        let exact = NotifyPattern::parse("eosio.token::*").unwrap();
        assert!(exact.matches(n("eosio.token"), n("issue")));
        assert!(!exact.matches(n("other"), n("issue")));

        assert!(NotifyPattern::parse("no-separator").is_err());
    }

    #[test]
    fn test_dispatches_direct_action() {
        let contract = NativeContract::new().on_action(n("hi"), |_, host| {
            host.print("hello");
            Ok(())
        });
        let mut vm = contract.factory().instantiate(&init("greeter")).unwrap();
        let (result, console) = run(vm.as_mut(), &mut context("greeter", "hi"));
        result.unwrap();
        assert_eq!(console, "hello");
    }

    #[test]
    fn test_unknown_action_fails() {
        let mut vm = NativeContract::new().factory().instantiate(&init("greeter")).unwrap();
        let (result, _) = run(vm.as_mut(), &mut context("greeter", "bye"));
        assert!(result.unwrap_err().to_string().contains("unknown action"));
    }

    #[test]
    fn test_unmatched_notification_is_ignored() {
        let contract = NativeContract::new()
            .on_notify("other::*", |_, host| {
                host.print("wrong");
                Ok(())
            })
            .unwrap()
            .on_notify("*::hi", |_, host| {
                host.print("seen");
                Ok(())
            })
            .unwrap();
        let mut vm = contract.factory().instantiate(&init("watcher")).unwrap();

        let mut root = context("greeter", "hi");
        root.require_recipient(n("watcher"));
        let mut note = root.notifications_queue.remove(0);
        let (result, console) = run(vm.as_mut(), &mut note);
        result.unwrap();
        assert_eq!(console, "seen");

        let mut root = context("greeter", "bye");
        root.require_recipient(n("watcher"));
        let mut note = root.notifications_queue.remove(0);
        let (result, console) = run(vm.as_mut(), &mut note);
        result.unwrap();
        assert!(console.is_empty());
    }
}
