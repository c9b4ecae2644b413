//! One dispatch of one action to one receiver.
//!
//! The dispatch engine creates a context, hands it to the receiver's VM exactly once,
//! and records it into the execution trace. The VM fills `actions_queue` and
//! `notifications_queue` (usually through [`ActionContext::send_inline`] and
//! [`ActionContext::require_recipient`]). `action_ordinal` and `execution_order`
//! are assigned by the engine only.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::core::transaction::{Action, PermissionLevel, Transaction};
use crate::name::Name;

#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Account executing this context.
    pub receiver: Name,
    /// Account named in the originating action; kept through notification forwarding.
    pub first_receiver: Name,
    pub action: Name,
    pub data: Bytes,
    pub authorization: Vec<PermissionLevel>,
    pub transaction: Arc<Transaction>,
    /// Decoded payload, for diagnostics only.
    pub decoded_data: Option<Value>,
    /// Account whose execution spawned this inline action.
    pub sender: Option<Name>,

    pub actions_queue: Vec<ActionContext>,
    pub notifications_queue: Vec<ActionContext>,
    pub is_notification: bool,
    pub is_inline: bool,

    pub action_ordinal: u32,
    pub execution_order: u32,
}

impl ActionContext {
    /// Context for a top-level action of `transaction`.
    pub fn top_level(action: &Action, transaction: Arc<Transaction>, decoded_data: Option<Value>) -> Self {
        Self {
            receiver: action.account,
            first_receiver: action.account,
            action: action.name,
            data: action.data.clone(),
            authorization: action.authorization.clone(),
            transaction,
            decoded_data,
            sender: None,
            actions_queue: Vec::new(),
            notifications_queue: Vec::new(),
            is_notification: false,
            is_inline: false,
            action_ordinal: 0,
            execution_order: 0,
        }
    }

    /// Queues an inline action to `account`. It runs after this context returns,
    /// ahead of anything queued before this context ran.
    pub fn send_inline(
        &mut self,
        account: Name,
        action: Name,
        authorization: Vec<PermissionLevel>,
        data: impl Into<Bytes>,
    ) {
        let child = ActionContext {
            receiver: account,
            first_receiver: account,
            action,
            data: data.into(),
            authorization,
            transaction: Arc::clone(&self.transaction),
            decoded_data: None,
            sender: Some(self.receiver),
            actions_queue: Vec::new(),
            notifications_queue: Vec::new(),
            is_notification: false,
            is_inline: true,
            action_ordinal: 0,
            execution_order: 0,
        };
        self.actions_queue.push(child);
    }

    /// Forwards this action to `recipient` as a notification. Notifying the current
    /// receiver or an already-notified account is ignored.
    pub fn require_recipient(&mut self, recipient: Name) {
        if recipient == self.receiver
            || self
                .notifications_queue
                .iter()
                .any(|queued| queued.receiver == recipient)
        {
            return;
        }
        let notification = ActionContext {
            receiver: recipient,
            first_receiver: self.first_receiver,
            action: self.action,
            data: self.data.clone(),
            authorization: self.authorization.clone(),
            transaction: Arc::clone(&self.transaction),
            decoded_data: self.decoded_data.clone(),
            sender: self.sender,
            actions_queue: Vec::new(),
            notifications_queue: Vec::new(),
            is_notification: true,
            is_inline: false,
            action_ordinal: 0,
            execution_order: 0,
        };
        self.notifications_queue.push(notification);
    }

    pub fn has_recipient(&self, account: Name) -> bool {
        self.receiver == account || self.notifications_queue.iter().any(|c| c.receiver == account)
    }
}
