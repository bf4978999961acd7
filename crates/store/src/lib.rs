//! EquityCraft Store
//!
//! Persistent reward pool configuration, keyed by equity policy id.
//!
//! The on-disk format is a single JSON object:
//!
//! ```json
//! {
//!   "<policy id>": [
//!     {
//!       "index": 0,
//!       "name": "Q1 rewards",
//!       "description": "Revenue share for Q1",
//!       "poolScriptReference": "<txHash>#0",
//!       "totalAmountInPool": 25000,
//!       "status": "active"
//!     }
//!   ]
//! }
//! ```

mod config_store;
mod paths;

pub use config_store::{ConfigStore, JsonConfigStore};
pub use paths::{default_config_dir, default_config_path, default_data_dir, default_state_path, expand_path};

use equitycraft_core::{PolicyId, PoolIndex, PoolStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed pool config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pool {index} already configured for policy {policy}")]
    DuplicateIndex { policy: PolicyId, index: PoolIndex },

    #[error("Pool {index} not configured for policy {policy}")]
    PoolNotFound { policy: PolicyId, index: PoolIndex },

    #[error("Pool {index} cannot move from {from} to {to}")]
    IllegalTransition {
        index: PoolIndex,
        from: PoolStatus,
        to: PoolStatus,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
