//! Immutable record of one dispatched context.

use log::trace;
use serde::Serialize;
use serde_json::Value;

use crate::core::context::ActionContext;
use crate::core::transaction::PermissionLevel;
use crate::name::Name;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    pub action_ordinal: u32,
    pub execution_order: u32,
    pub receiver: Name,
    pub first_receiver: Name,
    pub action: Name,
    pub sender: Option<Name>,
    pub is_inline: bool,
    pub is_notification: bool,
    pub authorization: Vec<PermissionLevel>,
    /// Hex of the raw payload.
    pub data: String,
    pub decoded_data: Option<Value>,
}

impl From<&ActionContext> for ExecutionTrace {
    fn from(ctx: &ActionContext) -> Self {
        Self {
            action_ordinal: ctx.action_ordinal,
            execution_order: ctx.execution_order,
            receiver: ctx.receiver,
            first_receiver: ctx.first_receiver,
            action: ctx.action,
            sender: ctx.sender,
            is_inline: ctx.is_inline,
            is_notification: ctx.is_notification,
            authorization: ctx.authorization.clone(),
            data: hex::encode(&ctx.data),
            decoded_data: ctx.decoded_data.clone(),
        }
    }
}

impl ExecutionTrace {
    /// `receiver <= first_receiver::action`, the way ledger tools print it.
    pub fn summary(&self) -> String {
        format!(
            "#{} ord={} {} <= {}::{}",
            self.execution_order, self.action_ordinal, self.receiver, self.first_receiver, self.action
        )
    }

    pub fn log(&self) {
        trace!(
            "{} inline={} notification={} auth={:?}",
            self.summary(),
            self.is_inline,
            self.is_notification,
            self.authorization
        );
    }
}
