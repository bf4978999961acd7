//! File-backed simulated ledger

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use equitycraft_core::{OutRef, PolicyId};
use equitycraft_settlement::{
    HolderKey, LedgerConfig, MemoryLedger, MemoryPoolRegistry, MemorySnapshot,
};

/// Everything the simulated ledger needs between runs
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub ledger: MemorySnapshot,
    /// Equity reference scripts known to the pool registry
    pub equity_scripts: Vec<(OutRef, PolicyId)>,
}

impl SimulationState {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No ledger state at {}, starting fresh", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading ledger state {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing ledger state {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing ledger state {}", path.display()))
    }

    pub fn registry(&self) -> MemoryPoolRegistry {
        let registry = MemoryPoolRegistry::new();
        for (script, policy) in &self.equity_scripts {
            registry.register_equity_script(*script, *policy);
        }
        registry
    }

    pub fn equity_script(&self, policy: &PolicyId) -> Option<OutRef> {
        self.equity_scripts
            .iter()
            .find(|(_, p)| p == policy)
            .map(|(script, _)| *script)
    }

    /// Record the equity reference script for `policy`, deriving it on
    /// first issuance
    pub fn ensure_equity_script(&mut self, policy: &PolicyId) -> OutRef {
        if let Some(script) = self.equity_script(policy) {
            return script;
        }
        let mut hasher = Sha256::new();
        hasher.update(b"equity-script");
        hasher.update(policy.as_bytes());
        let script = OutRef::new(hasher.finalize().into(), 0);
        self.equity_scripts.push((script, *policy));
        script
    }
}

/// Simulated ledger session bound to `holder`, persisted on `commit`
pub struct Simulation {
    pub path: PathBuf,
    pub state: SimulationState,
    pub ledger: MemoryLedger,
}

impl Simulation {
    pub fn open(path: PathBuf, holder: &str) -> Result<Self> {
        let state = SimulationState::load(&path)?;
        let ledger = MemoryLedger::from_snapshot(
            LedgerConfig::instant(),
            holder_key(holder),
            state.ledger.clone(),
        );
        Ok(Self { path, state, ledger })
    }

    pub fn commit(mut self) -> Result<()> {
        self.state.ledger = self.ledger.snapshot();
        self.state.save(&self.path)
    }
}

/// Holder key for a named wallet
pub fn holder_key(name: &str) -> HolderKey {
    let mut hasher = Sha256::new();
    hasher.update(b"holder:");
    hasher.update(name.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use equitycraft_settlement::LedgerService;
    use tempfile::TempDir;

    fn policy() -> PolicyId {
        PolicyId([0x33; 28])
    }

    #[test]
    fn test_holder_keys_differ() {
        assert_eq!(holder_key("alice"), holder_key("alice"));
        assert_ne!(holder_key("alice"), holder_key("bob"));
    }

    #[test]
    fn test_equity_script_is_stable() {
        let mut state = SimulationState::default();
        let first = state.ensure_equity_script(&policy());
        let second = state.ensure_equity_script(&policy());

        assert_eq!(first, second);
        assert_eq!(state.equity_scripts.len(), 1);
        assert_eq!(state.registry().policy_for(&first), Some(policy()));
    }

    #[tokio::test]
    async fn test_commit_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("ledger.json");

        let sim = Simulation::open(path.clone(), "alice").unwrap();
        sim.ledger.credit(policy(), 2, 75).unwrap();
        sim.commit().unwrap();

        let reopened = Simulation::open(path.clone(), "alice").unwrap();
        let holding = reopened.ledger.get_holdings(&policy()).await.unwrap();
        assert_eq!(holding.amount_at(2), 75);

        let other = Simulation::open(path, "bob").unwrap();
        assert!(other.ledger.get_holdings(&policy()).await.unwrap().is_empty());
    }
}
