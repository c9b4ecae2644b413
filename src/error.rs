use thiserror::Error;

use crate::name::Name;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Contract {0} missing for inline action")]
    MissingContract(Name),

    #[error("Blockchain time must not go negative: current {current_ms} ms, subtracting {requested_ms} ms")]
    NegativeTime {
        current_ms: u64,
        requested_ms: u64,
    },

    #[error("Storage deltas are not enabled (use enable_storage_deltas)")]
    DeltasDisabled,

    #[error("VM error in {receiver}::{action}: {source}")]
    Vm {
        receiver: Name,
        action: Name,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to instantiate VM for {account}: {source}")]
    VmInit {
        account: Name,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Clock error: {0}")]
    Clock(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Decode(err.to_string())
    }
}

impl SimError {
    /// True for `MissingContract`, regardless of the account named.
    pub fn is_missing_contract(&self) -> bool {
        matches!(self, SimError::MissingContract(_))
    }

    pub fn is_negative_time(&self) -> bool {
        matches!(self, SimError::NegativeTime { .. })
    }

    pub fn is_deltas_disabled(&self) -> bool {
        matches!(self, SimError::DeltasDisabled)
    }
}
