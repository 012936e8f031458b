//! Epoch Engine: opens/seals epochs, accumulates proofs,
//! computes the Merkle root and per-miner settlements.

use crate::models::{
    from_microunits, to_microunits, ActiveEpoch, EpochSnapshot, ProofLogEntry, Settlements,
    BPS_DENOMINATOR, MINER_POOL_BPS,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Open a new active epoch, named deterministically from the open time.
pub fn open_epoch(now: i64) -> ActiveEpoch {
    ActiveEpoch {
        epoch_id: format!("epoch-{}", now),
        open_at: now,
        jobs_count: 0,
        volume: 0.0,
        proof_log: Vec::new(),
    }
}

/// Seal condition: `now >= last_epoch_seal + epoch_duration`. `open_at` on
/// the active epoch doubles as `last_epoch_seal` since sealing immediately
/// opens a successor.
pub fn should_seal(epoch: &ActiveEpoch, now: i64, epoch_duration_seconds: i64) -> bool {
    now >= epoch.open_at + epoch_duration_seconds
}

/// Sort-and-concatenate-then-SHA-256 hashing scheme. Not a strict Merkle
/// tree, retained for wire compatibility with existing verifiers. Empty
/// proof log yields the all-zero digest.
pub fn merkle_root(proof_log: &[ProofLogEntry]) -> String {
    if proof_log.is_empty() {
        return format!("0x{}", "0".repeat(64));
    }
    let mut cids: Vec<&str> = proof_log.iter().map(|p| p.proof_cid.as_str()).collect();
    cids.sort_unstable();
    let concatenated = cids.concat();

    let mut hasher = Sha256::new();
    hasher.update(concatenated.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// Per-miner payout proportional to proof count, settling uniformly
/// regardless of declared execution mode. Accumulated in integer
/// microunits throughout so that summing every miner's share plus
/// `hive_ops` always reconstitutes `total_volume` exactly — a running
/// `f64` sum would drift by a few microunits across many small payouts.
/// If the epoch produced no proofs, all miner payouts are zero and the
/// whole miner pool rolls forward into `hive_ops` as dust.
pub fn compute_settlements(proof_log: &[ProofLogEntry], total_volume: f64) -> Settlements {
    let total_jobs_in_epoch = proof_log.len() as u64;
    let total_micro = to_microunits(total_volume) as u128;
    let miner_pool_micro = (total_micro * MINER_POOL_BPS + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR;
    let hive_ops_base_micro = total_micro - miner_pool_micro;

    let mut counts: HashMap<String, u64> = HashMap::new();
    for entry in proof_log {
        *counts.entry(entry.miner.clone()).or_insert(0) += 1;
    }

    let mut miners = HashMap::new();
    let mut distributed_micro: u128 = 0;
    if total_jobs_in_epoch > 0 {
        for (miner, count) in &counts {
            let share_micro = miner_pool_micro * (*count as u128) / (total_jobs_in_epoch as u128);
            distributed_micro += share_micro;
            miners.insert(miner.clone(), format!("{:.4}", from_microunits(share_micro as u64)));
        }
    }

    let dust_micro = miner_pool_micro - distributed_micro;
    let hive_ops_micro = hive_ops_base_micro + dust_micro;

    Settlements {
        total_volume: format!("{:.2}", total_volume),
        miner_pool: format!("{:.4}", from_microunits(miner_pool_micro as u64)),
        hive_ops: format!("{:.4}", from_microunits(hive_ops_micro as u64)),
        miners,
        dust_to_hive: format!("{:.4}", from_microunits(dust_micro as u64)),
    }
}

/// Build the unsigned sealed snapshot for `epoch`. The caller signs it
/// (operator key), uploads+pins it, and records it in the sidecar — seal
/// construction itself is a pure function of the proof log and volume
///.
pub fn build_sealed_snapshot(epoch: &ActiveEpoch, pool_id: &str, now: i64) -> EpochSnapshot {
    let settlements = compute_settlements(&epoch.proof_log, epoch.volume);
    let root = merkle_root(&epoch.proof_log);

    EpochSnapshot {
        snapshot_type: "epoch".to_string(),
        version: "1.0.0".to_string(),
        epoch_id: epoch.epoch_id.clone(),
        status: "sealed".to_string(),
        open_at: epoch.open_at,
        close_at: Some(now),
        jobs_count: epoch.jobs_count,
        proofs_count: epoch.proof_log.len() as u64,
        total_volume: format!("{:.2}", epoch.volume),
        proofs: epoch.proof_log.clone(),
        settlements,
        merkle_root: root,
        pool_id: pool_id.to_string(),
        timestamp: now,
        sig: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(job_cid: &str, proof_cid: &str, miner: &str) -> ProofLogEntry {
        ProofLogEntry {
            job_cid: job_cid.to_string(),
            proof_cid: proof_cid.to_string(),
            miner: miner.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn empty_log_yields_zero_merkle_root() {
        assert_eq!(merkle_root(&[]), format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn merkle_root_sorts_lexicographically() {
        let forward = vec![proof("j1", "bafy...A", "alice.eth"), proof("j2", "bafy...B", "bob.eth")];
        let reversed = vec![proof("j2", "bafy...B", "bob.eth"), proof("j1", "bafy...A", "alice.eth")];
        assert_eq!(merkle_root(&forward), merkle_root(&reversed));

        let mut hasher = Sha256::new();
        hasher.update(b"bafy...Abafy...B");
        let expected = format!("0x{}", hex::encode(hasher.finalize()));
        assert_eq!(merkle_root(&forward), expected);
    }

    #[test]
    fn settlement_splits_75_25_for_single_miner() {
        let log = vec![
            proof("j1", "bafy...A", "alice.eth"),
            proof("j2", "bafy...B", "alice.eth"),
        ];
        let settlements = compute_settlements(&log, 2.00);
        assert_eq!(settlements.miner_pool, "1.5000");
        assert_eq!(settlements.hive_ops, "0.5000");
        assert_eq!(settlements.miners["alice.eth"], "1.5000");
    }

    #[test]
    fn settlement_splits_proportionally_across_miners() {
        let log = vec![
            proof("j1", "bafy...A", "alice.eth"),
            proof("j2", "bafy...B", "alice.eth"),
            proof("j3", "bafy...C", "bob.eth"),
        ];
        let settlements = compute_settlements(&log, 3.00);
        // miner_pool = 2.25; alice gets 2/3, bob gets 1/3
        assert_eq!(settlements.miners["alice.eth"], "1.5000");
        assert_eq!(settlements.miners["bob.eth"], "0.7500");
    }

    #[test]
    fn settlement_shares_plus_hive_ops_reconstitute_total_volume() {
        let log = vec![
            proof("j1", "bafy...A", "alice.eth"),
            proof("j2", "bafy...B", "alice.eth"),
            proof("j3", "bafy...C", "alice.eth"),
            proof("j4", "bafy...D", "bob.eth"),
            proof("j5", "bafy...E", "bob.eth"),
            proof("j6", "bafy...F", "carol.eth"),
            proof("j7", "bafy...G", "carol.eth"),
        ];
        let settlements = compute_settlements(&log, 1.00);

        let sum: f64 = settlements.miners.values().map(|s| s.parse::<f64>().unwrap()).sum::<f64>()
            + settlements.hive_ops.parse::<f64>().unwrap();
        assert_eq!(format!("{:.4}", sum), "1.0000");
    }

    #[test]
    fn empty_epoch_rolls_entire_miner_pool_to_dust() {
        let settlements = compute_settlements(&[], 10.00);
        assert!(settlements.miners.is_empty());
        assert_eq!(settlements.dust_to_hive, "7.5000");
        assert_eq!(settlements.hive_ops, "10.0000");
    }

    #[test]
    fn should_seal_respects_epoch_duration() {
        let epoch = open_epoch(1_000);
        assert!(!should_seal(&epoch, 1_000 + 3599, 3600));
        assert!(should_seal(&epoch, 1_000 + 3600, 3600));
    }

    #[test]
    fn sealed_snapshot_is_idempotent_on_identical_input() {
        let mut epoch = open_epoch(0);
        epoch.proof_log.push(proof("j1", "bafy...A", "alice.eth"));
        epoch.volume = 1.0;

        let first = build_sealed_snapshot(&epoch, "pool.eth", 100);
        let second = build_sealed_snapshot(&epoch, "pool.eth", 100);
        assert_eq!(first.merkle_root, second.merkle_root);
        assert_eq!(first.settlements.miners, second.settlements.miners);
    }
}
