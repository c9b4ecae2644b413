//! Transaction format handed to the simulator: an ordered list of top-level actions.
//!
//! **Determinism:** The id is the SHA-256 of the canonical JSON of the actions; same actions yield the same id.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::name::Name;
use crate::utils::sha256_hex;

/// An `actor@permission` pair authorizing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

impl PermissionLevel {
    pub fn new(actor: Name, permission: Name) -> Self {
        Self { actor, permission }
    }

    /// `actor@active`.
    pub fn active(actor: Name) -> Self {
        Self {
            actor,
            permission: Name::from_raw(ACTIVE),
        }
    }
}

// "active"
const ACTIVE: u64 = 3617214756542218240;

/// A single instruction targeting one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Contract the action is sent to.
    pub account: Name,
    pub name: Name,
    pub authorization: Vec<PermissionLevel>,
    /// Opaque payload, interpreted by the receiving contract.
    pub data: Bytes,
}

impl Action {
    pub fn new(
        account: Name,
        name: Name,
        authorization: Vec<PermissionLevel>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            account,
            name,
            authorization,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub actions: Vec<Action>,
}

impl Transaction {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// Single-action transaction.
    pub fn from_action(action: Action) -> Self {
        Self {
            actions: vec![action],
        }
    }

    /// Computes the transaction id. Same actions yield the same id.
    pub fn id(&self) -> Result<String> {
        #[derive(Serialize)]
        struct ActionHashData<'a> {
            account: Name,
            name: Name,
            authorization: &'a [PermissionLevel],
            data: String,
        }
        let hash_data: Vec<ActionHashData<'_>> = self
            .actions
            .iter()
            .map(|a| ActionHashData {
                account: a.account,
                name: a.name,
                authorization: &a.authorization,
                data: hex::encode(&a.data),
            })
            .collect();
        let json = serde_json::to_vec(&hash_data)?;
        Ok(sha256_hex(&json))
    }
}
