//! Wire and state data models for the pool daemon.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Settlement split: miners take 75% of epoch volume, hive operations the
/// remaining 25%, expressed in basis points of 10_000, used for
/// integer-microunit settlement math so the split itself never touches
/// floating point.
pub const MINER_POOL_BPS: u128 = 7_500;
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Settlement currency decimals (6) — amounts are accumulated in
/// microunits internally so that summing many small per-miner shares
/// never drifts from the sealed total.
pub const SETTLEMENT_DECIMALS: u32 = 6;

/// Convert a decimal amount to microunits (e.g. $0.10 -> 100_000).
pub fn to_microunits(amount: f64) -> u64 {
    (amount * 10_f64.powi(SETTLEMENT_DECIMALS as i32)).round() as u64
}

/// Convert microunits back to a decimal amount (e.g. 100_000 -> $0.10).
pub fn from_microunits(micro: u64) -> f64 {
    micro as f64 / 10_f64.powi(SETTLEMENT_DECIMALS as i32)
}

/// Execution mode declared by a miner at claim time.
///
/// Advisory metadata only: settlement settles
/// uniformly by proof count regardless of mode until the protocol says
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Solo,
    PoolSmoothed,
}

/// Job announcement blob fetched from the content store by `cid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub job_type: String,
    pub model: String,
    pub input_cid: String,
    pub reward: String,
    pub client: String,
    pub timestamp: i64,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// `{pool}/jobs` inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAnnouncement {
    pub cid: String,
    pub client: String,
    pub timestamp: i64,
}

/// `{pool}/claims` inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMessage {
    pub job_cid: String,
    pub miner: String,
    pub nonce: String,
    pub timestamp: i64,
    pub sig: String,
}

/// `{pool}/proofs` inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofMessage {
    pub job_cid: String,
    pub proof_cid: String,
    pub miner: String,
    pub timestamp: i64,
}

/// Proof blob fetched from the content store by `proof_cid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofSnapshot {
    pub job_cid: String,
    pub status: String,
    pub output_cid: String,
    pub metrics: ProofMetrics,
    pub proof_hash: String,
    pub miner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofMetrics {
    pub inference_seconds: f64,
    pub confidence: f64,
    pub model_version: String,
}

/// `{pool}/miners` registration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerRegistration {
    pub miner: String,
    pub gpus: Vec<String>,
    pub models: Vec<String>,
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// `{pool}/heartbeats` inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub miner: String,
    pub timestamp: i64,
    pub sig: String,
}

/// Miner liveness status, derived from `last_heartbeat`: online iff
/// `now - last_heartbeat <= miner_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerStatus {
    Online,
    Offline,
}

/// In-memory record of a registered miner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Miner {
    pub identity: String,
    pub registered_at: i64,
    pub last_heartbeat: i64,
    pub gpus: Vec<String>,
    pub models: Vec<String>,
    pub mode: ExecutionMode,
    pub jobs_completed: u64,
    pub status: MinerStatus,
}

/// Soft-state claim lease on a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub miner: String,
    pub claimed_at: i64,
    pub timeout_at: i64,
}

/// A single accepted proof entry, appended to the active epoch's proof log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofLogEntry {
    pub job_cid: String,
    pub proof_cid: String,
    pub miner: String,
    pub timestamp: i64,
}

/// Per-miner settlement computed at seal time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlements {
    pub total_volume: String,
    pub miner_pool: String,
    pub hive_ops: String,
    /// miner identity -> payout amount, 4 decimal places.
    pub miners: HashMap<String, String>,
    /// Dust rolled into hive_ops when total_jobs_in_epoch == 0 or from rounding.
    pub dust_to_hive: String,
}

/// Sealed epoch snapshot published to the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSnapshot {
    #[serde(rename = "type")]
    pub snapshot_type: String,
    pub version: String,
    pub epoch_id: String,
    pub status: String,
    pub open_at: i64,
    pub close_at: Option<i64>,
    pub jobs_count: u64,
    pub proofs_count: u64,
    pub total_volume: String,
    pub proofs: Vec<ProofLogEntry>,
    pub settlements: Settlements,
    pub merkle_root: String,
    pub pool_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// The active (unsealed) epoch descriptor held in `PoolState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEpoch {
    pub epoch_id: String,
    pub open_at: i64,
    pub jobs_count: u64,
    pub volume: f64,
    pub proof_log: Vec<ProofLogEntry>,
}

/// Authoritative, signed, published snapshot of pool state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStateSnapshot {
    #[serde(rename = "type")]
    pub snapshot_type: String,
    pub version: String,
    pub pool_id: String,
    pub total_jobs: u64,
    pub total_proofs: u64,
    pub total_volume: String,
    pub current_epoch: Option<String>,
    pub epoch_jobs: u64,
    pub epoch_volume: String,
    pub pending_jobs: Vec<String>,
    pub claimed_jobs: usize,
    pub active_miners: usize,
    pub last_updated: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// Essential job fields re-announced on `/jobs/new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNewAnnouncement {
    pub cid: String,
    pub job_type: String,
    pub model: String,
    pub reward: String,
    pub timestamp: i64,
}
