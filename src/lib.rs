pub mod config;
pub mod core;
pub mod error;
pub mod loader;
pub mod name;
pub mod utils;

pub use config::BlockchainConfig;
pub use error::{Result, SimError};
pub use name::{n, Name, NameError};
pub use utils::{sha256, sha256_hex};

// Core API exports
pub use core::Blockchain;
pub use core::account::{Account, AccountRegistry, CodeHash, RowDecoder, TableRowAccessor, Vm, VmFactory, VmInit};
pub use core::clock::{Clock, ClockError, TimePoint, BLOCK_INTERVAL_MS};
pub use core::context::ActionContext;
pub use core::delta::{DiffReconciler, RowDelta, StorageDeltas};
pub use core::diff::{diff, flatten_changeset, Change, FlatChange, Operation};
pub use core::dispatch::{DispatchCursor, DispatchEngine};
pub use core::host::ApplyHost;
pub use core::native::{NativeContract, NotifyPattern};
pub use core::secondary::{format_double, normalize_double, IndexPlane, SecondaryIndexValue, SecondaryKey};
pub use core::snapshot::{primary_table_name, RowSnapshot, Snapshot, StorageProjector, StorageTree};
pub use core::store::{KeyValue, StoreError, Table, TableId, TableKey, TableStore};
pub use core::trace::ExecutionTrace;
pub use core::transaction::{Action, PermissionLevel, Transaction};
