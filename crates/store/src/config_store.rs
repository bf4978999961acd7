//! Pool config store
//!
//! [`JsonConfigStore`] keeps the whole registry in one JSON file. Every
//! mutation is a read-modify-write of that file under an in-process lock,
//! written to a sibling temp file and renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use equitycraft_core::{PolicyId, Pool, PoolIndex, PoolRegistry, PoolStatus};

use crate::{Result, StoreError};

/// Persistent pool list keyed by policy id
pub trait ConfigStore: Send + Sync {
    /// Every configured pool, grouped by policy
    fn snapshot(&self) -> Result<PoolRegistry>;

    /// Pools configured for `policy`, ordered by index
    fn load(&self, policy: &PolicyId) -> Result<Vec<Pool>> {
        let mut pools = self.snapshot()?.pools(policy).to_vec();
        pools.sort_by_key(|pool| pool.index);
        Ok(pools)
    }

    /// Add a pool; fails with `DuplicateIndex` if the index is taken
    fn append(&self, policy: &PolicyId, pool: Pool) -> Result<()>;

    /// Move a pool to `status`, returning the previous status.
    ///
    /// Only `pending → active` and `active → completed` are accepted.
    fn set_status(&self, policy: &PolicyId, index: PoolIndex, status: PoolStatus) -> Result<PoolStatus>;
}

pub struct JsonConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PoolRegistry> {
        if !self.path.exists() {
            debug!("No pool config at {}, starting empty", self.path.display());
            return Ok(PoolRegistry::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(PoolRegistry::default());
        }
        let registry: PoolRegistry = serde_json::from_str(&raw)?;
        Ok(registry)
    }

    fn write(&self, registry: &PoolRegistry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(registry)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<T>(
        &self,
        policy: &PolicyId,
        f: impl FnOnce(&mut Vec<Pool>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock();
        let mut policies = self.read()?.into_inner();
        let pools = policies.entry(*policy).or_default();
        let out = f(pools)?;
        pools.sort_by_key(|pool| pool.index);
        self.write(&PoolRegistry::new(policies))?;
        Ok(out)
    }
}

impl ConfigStore for JsonConfigStore {
    fn snapshot(&self) -> Result<PoolRegistry> {
        self.read()
    }

    fn append(&self, policy: &PolicyId, pool: Pool) -> Result<()> {
        self.update(policy, |pools| {
            if pools.iter().any(|p| p.index == pool.index) {
                return Err(StoreError::DuplicateIndex {
                    policy: *policy,
                    index: pool.index,
                });
            }
            info!("Recording pool {} '{}' for {}", pool.index, pool.name, policy);
            pools.push(pool);
            Ok(())
        })
    }

    fn set_status(&self, policy: &PolicyId, index: PoolIndex, status: PoolStatus) -> Result<PoolStatus> {
        self.update(policy, |pools| {
            let pool = pools
                .iter_mut()
                .find(|p| p.index == index)
                .ok_or(StoreError::PoolNotFound {
                    policy: *policy,
                    index,
                })?;
            let previous = pool.status;
            if !previous.can_transition_to(status) {
                return Err(StoreError::IllegalTransition {
                    index,
                    from: previous,
                    to: status,
                });
            }
            pool.status = status;
            info!("Pool {} status {} -> {}", index, previous, status);
            Ok(previous)
        })
    }
}
