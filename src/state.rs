//! Authoritative in-memory pool state and the invariants it must
//! hold at every quiescent instant.

use crate::models::{ActiveEpoch, ClaimedJob, Miner, MinerStatus, ProofLogEntry};
use std::collections::{HashMap, VecDeque};

/// Counters, pending/claimed jobs, active miners, and the active epoch.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub pool_id: String,
    pub total_jobs: u64,
    pub total_proofs: u64,
    pub total_volume: f64,
    pub active_epoch: Option<ActiveEpoch>,
    pub pending_jobs: VecDeque<String>,
    pub claimed_jobs: HashMap<String, ClaimedJob>,
    pub active_miners: HashMap<String, Miner>,
    pub last_updated: i64,
}

impl PoolState {
    pub fn new(pool_id: impl Into<String>) -> Self {
        Self {
            pool_id: pool_id.into(),
            total_jobs: 0,
            total_proofs: 0,
            total_volume: 0.0,
            active_epoch: None,
            pending_jobs: VecDeque::new(),
            claimed_jobs: HashMap::new(),
            active_miners: HashMap::new(),
            last_updated: 0,
        }
    }

    /// A job cid must be in exactly one of {pending, claimed, a proof log}.
    /// Used as a duplicate-suppression check by the router: if a cid is
    /// already tracked anywhere, a repeat announcement is a no-op.
    pub fn is_job_tracked(&self, cid: &str) -> bool {
        if self.pending_jobs.iter().any(|c| c == cid) {
            return true;
        }
        if self.claimed_jobs.contains_key(cid) {
            return true;
        }
        if let Some(epoch) = &self.active_epoch {
            if epoch.proof_log.iter().any(|p| p.job_cid == cid) {
                return true;
            }
        }
        false
    }

    /// Every claimed-jobs entry maps to a known miner.
    pub fn claims_reference_known_miners(&self) -> bool {
        self.claimed_jobs
            .values()
            .all(|claim| self.active_miners.contains_key(&claim.miner))
    }

    pub fn miner_status(&self, identity: &str, now: i64, miner_timeout: i64) -> Option<MinerStatus> {
        self.active_miners.get(identity).map(|m| {
            if now - m.last_heartbeat <= miner_timeout {
                MinerStatus::Online
            } else {
                MinerStatus::Offline
            }
        })
    }

    /// Append a job to pending, bump the global and epoch counters, add
    /// volume. Caller has already verified the announcement and checked
    /// `is_job_tracked`.
    pub fn accept_job(&mut self, cid: String, reward: f64) {
        self.pending_jobs.push_back(cid);
        self.total_jobs += 1;
        self.total_volume += reward;
        if let Some(epoch) = &mut self.active_epoch {
            epoch.jobs_count += 1;
            epoch.volume += reward;
        }
    }

    /// Move a job from pending to claimed. Returns `false` if the job was
    /// not pending (caller should treat that as "drop").
    pub fn accept_claim(&mut self, job_cid: &str, miner: String, now: i64, timeout_secs: i64) -> bool {
        let Some(pos) = self.pending_jobs.iter().position(|c| c == job_cid) else {
            return false;
        };
        self.pending_jobs.remove(pos);
        self.claimed_jobs.insert(
            job_cid.to_string(),
            ClaimedJob {
                miner,
                claimed_at: now,
                timeout_at: now + timeout_secs,
            },
        );
        true
    }

    /// Delete the claim, append to the epoch proof log, bump counters.
    pub fn accept_proof(&mut self, entry: ProofLogEntry) {
        self.claimed_jobs.remove(&entry.job_cid);
        self.total_proofs += 1;
        if let Some(miner) = self.active_miners.get_mut(&entry.miner) {
            miner.jobs_completed += 1;
        }
        if let Some(epoch) = &mut self.active_epoch {
            epoch.proof_log.push(entry);
        }
    }

    /// Reclaim every expired claim. Returns the reclaimed job cids, each
    /// paired with the previous claimant (for the `/claims/timeout`
    /// announcement).
    pub fn reclaim_expired_claims(&mut self, now: i64) -> Vec<(String, String)> {
        let expired: Vec<String> = self
            .claimed_jobs
            .iter()
            .filter(|(_, claim)| claim.timeout_at < now)
            .map(|(cid, _)| cid.clone())
            .collect();

        let mut reclaimed = Vec::new();
        for cid in expired {
            if let Some(claim) = self.claimed_jobs.remove(&cid) {
                self.pending_jobs.push_back(cid.clone());
                reclaimed.push((cid, claim.miner));
            }
        }
        reclaimed
    }

    /// Flip stale online miners to offline. Returns the identities that
    /// transitioned.
    pub fn mark_stale_miners_offline(&mut self, now: i64, miner_timeout: i64) -> Vec<String> {
        let mut transitioned = Vec::new();
        for (identity, miner) in self.active_miners.iter_mut() {
            if miner.status == MinerStatus::Online && now - miner.last_heartbeat > miner_timeout {
                miner.status = MinerStatus::Offline;
                transitioned.push(identity.clone());
            }
        }
        transitioned
    }
}
