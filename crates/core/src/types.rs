use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{CoreError, Result};

/// Token period index embedded in every equity asset unit
pub type TokenIndex = u64;

/// Position of a reward pool in its policy's sequence
pub type PoolIndex = u64;

/// Token / lovelace quantity
pub type Amount = u64;

/// 32-byte transaction hash
pub type TxId = [u8; 32];

/// Length of a policy identifier in hex characters
pub const POLICY_HEX_LEN: usize = PolicyId::LEN * 2;

/// Longest index suffix that still fits a `u64`
const MAX_INDEX_HEX_LEN: usize = 16;

/// 28-byte minting policy identifier (56 hex characters on the wire)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PolicyId(pub [u8; 28]);

impl PolicyId {
    pub const LEN: usize = 28;

    pub fn from_bytes(bytes: [u8; 28]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 28] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PolicyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.len() != POLICY_HEX_LEN {
            return Err(CoreError::InvalidPolicyId(format!(
                "expected {} hex characters, got {}",
                POLICY_HEX_LEN,
                trimmed.len()
            )));
        }
        let bytes = hex::decode(trimmed).map_err(|e| CoreError::InvalidPolicyId(e.to_string()))?;
        let mut id = [0u8; 28];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolicyId({})", &self.to_hex()[..16])
    }
}

impl Serialize for PolicyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PolicyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// An equity asset unit: policy identifier plus structured period index.
///
/// Wire form is `<56 hex policy><index hex>`, the index zero-padded to at
/// least two characters (`00`, `01`, ... `ff`, `100`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetUnit {
    pub policy: PolicyId,
    pub index: TokenIndex,
}

impl AssetUnit {
    pub fn new(policy: PolicyId, index: TokenIndex) -> Self {
        Self { policy, index }
    }

    /// Encode to the ledger's asset unit string
    pub fn encode(&self) -> String {
        format!("{}{:02x}", self.policy, self.index)
    }

    /// Parse the index suffix of a unit already known to carry `policy`.
    ///
    /// Returns `None` if the unit belongs to another policy.
    pub fn parse_under(policy: &PolicyId, unit: &str) -> Option<Result<Self>> {
        let prefix = policy.to_hex();
        let unit_lower = unit.to_ascii_lowercase();
        let suffix = unit_lower.strip_prefix(prefix.as_str())?;
        Some(parse_index_suffix(unit, suffix).map(|index| Self::new(*policy, index)))
    }
}

impl FromStr for AssetUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if !s.is_ascii() || s.len() <= POLICY_HEX_LEN {
            return Err(CoreError::MalformedUnit {
                unit: s.to_string(),
                reason: "too short for policy and index".to_string(),
            });
        }
        let policy: PolicyId = s[..POLICY_HEX_LEN].parse()?;
        let index = parse_index_suffix(s, &s[POLICY_HEX_LEN..])?;
        Ok(Self { policy, index })
    }
}

impl fmt::Display for AssetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn parse_index_suffix(unit: &str, suffix: &str) -> Result<TokenIndex> {
    let malformed = |reason: &str| CoreError::MalformedUnit {
        unit: unit.to_string(),
        reason: reason.to_string(),
    };

    if suffix.is_empty() {
        return Err(malformed("missing index suffix"));
    }
    if suffix.len() > MAX_INDEX_HEX_LEN {
        return Err(malformed("index suffix too long"));
    }
    if !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed("index suffix is not hex"));
    }
    u64::from_str_radix(suffix, 16).map_err(|e| malformed(&e.to_string()))
}

/// Reference to a transaction output (`txHash#outputIndex`)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutRef {
    pub tx_hash: TxId,
    pub output_index: u32,
}

impl OutRef {
    pub fn new(tx_hash: TxId, output_index: u32) -> Self {
        Self { tx_hash, output_index }
    }
}

impl FromStr for OutRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (hash, index) = s
            .trim()
            .split_once('#')
            .ok_or_else(|| CoreError::InvalidOutRef(format!("{s}: expected txHash#outputIndex")))?;

        let bytes = hex::decode(hash.trim())
            .map_err(|e| CoreError::InvalidOutRef(format!("{s}: {e}")))?;
        if bytes.len() != 32 {
            return Err(CoreError::InvalidOutRef(format!(
                "{s}: tx hash must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let output_index: u32 = index
            .trim()
            .parse()
            .map_err(|e| CoreError::InvalidOutRef(format!("{s}: {e}")))?;

        let mut tx_hash = [0u8; 32];
        tx_hash.copy_from_slice(&bytes);
        Ok(Self { tx_hash, output_index })
    }
}

impl fmt::Display for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", hex::encode(self.tx_hash), self.output_index)
    }
}

impl fmt::Debug for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutRef({}..#{})", hex::encode(&self.tx_hash[..8]), self.output_index)
    }
}

impl Serialize for OutRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OutRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Lifecycle of a reward pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    /// Funded and accepting settlements
    Active,
    /// Administratively staged, not yet open
    Pending,
    /// Balance exhausted. Terminal.
    Completed,
}

impl PoolStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, PoolStatus::Active)
    }

    /// Whether `self -> next` is a legal status transition
    pub fn can_transition_to(&self, next: PoolStatus) -> bool {
        matches!(
            (self, next),
            (PoolStatus::Pending, PoolStatus::Active) | (PoolStatus::Active, PoolStatus::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Active => "active",
            PoolStatus::Pending => "pending",
            PoolStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reward pool.
///
/// Serialized with the field names of the persisted pool config
/// (`poolScriptReference`, `totalAmountInPool`). When returned by a ledger
/// query, `total_amount` is the live remaining balance rather than the
/// original funding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub index: PoolIndex,
    pub name: String,
    pub description: String,
    /// Reference script anchoring the pool on-ledger
    #[serde(rename = "poolScriptReference")]
    pub anchor: OutRef,
    #[serde(rename = "totalAmountInPool")]
    pub total_amount: Amount,
    pub status: PoolStatus,
}

impl Pool {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
