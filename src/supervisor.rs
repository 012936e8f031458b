//! Liveness & Timeout Supervisor: four independent periodic
//! tasks — state publisher, epoch manager, claim-timeout checker, and
//! heartbeat monitor — each cooperatively checking `running` at its loop
//! head so shutdown never has to interrupt an in-flight tick.

use crate::adapters::store::upload_typed;
use crate::adapters::{ContentStore, Sidecar, Transport};
use crate::crypto;
use crate::epoch;
use crate::models::PoolStateSnapshot;
use crate::state::PoolState;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct Supervisor {
    pool_ens: String,
    state: Arc<Mutex<PoolState>>,
    store: Arc<dyn ContentStore>,
    transport: Arc<dyn Transport>,
    sidecar: Arc<dyn Sidecar>,
    operator_private_key: String,
    epoch_duration_seconds: i64,
    miner_timeout_seconds: i64,
}

impl Supervisor {
    pub fn new(
        pool_ens: impl Into<String>,
        state: Arc<Mutex<PoolState>>,
        store: Arc<dyn ContentStore>,
        transport: Arc<dyn Transport>,
        sidecar: Arc<dyn Sidecar>,
        operator_private_key: String,
        epoch_duration_seconds: i64,
        miner_timeout_seconds: i64,
    ) -> Self {
        Self {
            pool_ens: pool_ens.into(),
            state,
            store,
            transport,
            sidecar,
            operator_private_key,
            epoch_duration_seconds,
            miner_timeout_seconds,
        }
    }

    fn topic(&self, name: &str) -> String {
        format!("{}/{}", self.pool_ens, name)
    }

    /// Spawn all four periodic tasks. Returns their join handles so the
    /// caller can await graceful shutdown.
    pub fn spawn_all(self: &Arc<Self>, running: Arc<AtomicBool>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().state_publisher_loop(running.clone())),
            tokio::spawn(self.clone().epoch_manager_loop(running.clone())),
            tokio::spawn(self.clone().claim_timeout_loop(running.clone())),
            tokio::spawn(self.clone().heartbeat_monitor_loop(running)),
        ]
    }

    async fn state_publisher_loop(self: Arc<Self>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.publish_state_once().await {
                warn!(error = %e, "state publication failed, retrying next tick");
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    async fn publish_state_once(&self) -> anyhow::Result<()> {
        let now = now_ts();
        let snapshot = {
            let mut state = self.state.lock().await;
            state.last_updated = now;
            PoolStateSnapshot {
                snapshot_type: "state".to_string(),
                version: "1.0.0".to_string(),
                pool_id: state.pool_id.clone(),
                total_jobs: state.total_jobs,
                total_proofs: state.total_proofs,
                total_volume: format!("{:.2}", state.total_volume),
                current_epoch: state.active_epoch.as_ref().map(|e| e.epoch_id.clone()),
                epoch_jobs: state.active_epoch.as_ref().map(|e| e.jobs_count).unwrap_or(0),
                epoch_volume: format!(
                    "{:.2}",
                    state.active_epoch.as_ref().map(|e| e.volume).unwrap_or(0.0)
                ),
                pending_jobs: state.pending_jobs.iter().cloned().collect(),
                claimed_jobs: state.claimed_jobs.len(),
                active_miners: state.active_miners.len(),
                last_updated: now,
                sig: None,
            }
        };

        let sig = crypto::sign_snapshot(&snapshot, &self.operator_private_key).await?;
        let mut signed = snapshot;
        signed.sig = Some(sig);

        let cid = upload_typed(self.store.as_ref(), &signed).await?;
        self.sidecar.set("pool:state:cid", &cid).await?;
        self.transport
            .publish(&self.topic("state"), &json!({ "cid": cid, "timestamp": now }))
            .await?;
        Ok(())
    }

    async fn epoch_manager_loop(self: Arc<Self>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.check_and_seal_epoch().await {
                warn!(error = %e, "epoch seal attempt failed, epoch remains active");
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }

    async fn check_and_seal_epoch(&self) -> anyhow::Result<()> {
        let now = now_ts();

        let active = {
            let mut state = self.state.lock().await;
            if state.active_epoch.is_none() {
                let opened = epoch::open_epoch(now);
                info!(epoch_id = %opened.epoch_id, "opening first epoch");
                self.announce_opened(&opened.epoch_id, now).await.ok();
                state.active_epoch = Some(opened);
            }
            state.active_epoch.clone().expect("just ensured Some")
        };

        if !epoch::should_seal(&active, now, self.epoch_duration_seconds) {
            return Ok(());
        }

        // Idempotent seal: skip if this epoch id was already sealed (e.g. after a
        // restart that raced a prior seal attempt).
        if self.sidecar.get(&format!("pool:epoch:{}", active.epoch_id)).await?.is_some() {
            warn!(epoch_id = %active.epoch_id, "epoch already sealed, skipping re-seal");
            let mut state = self.state.lock().await;
            state.active_epoch = Some(epoch::open_epoch(now));
            return Ok(());
        }

        let snapshot = epoch::build_sealed_snapshot(&active, &self.pool_ens, now);
        let sig = crypto::sign_snapshot(&snapshot, &self.operator_private_key).await?;
        let mut signed = snapshot;
        signed.sig = Some(sig);

        let cid = upload_typed(self.store.as_ref(), &signed).await?;
        self.store.pin(&cid).await?;
        self.sidecar.set(&format!("pool:epoch:{}", signed.epoch_id), &cid).await?;
        self.sidecar.lpush("pool:epochs:history", &signed.epoch_id).await?;

        self.transport
            .publish(
                &self.topic("epochs/sealed"),
                &json!({
                    "epoch_id": signed.epoch_id,
                    "cid": cid,
                    "jobs": signed.jobs_count,
                    "volume": signed.total_volume,
                    "timestamp": now,
                }),
            )
            .await?;

        let successor = epoch::open_epoch(now);
        self.announce_opened(&successor.epoch_id, now).await.ok();
        {
            let mut state = self.state.lock().await;
            state.active_epoch = Some(successor);
        }
        info!(epoch_id = %signed.epoch_id, "epoch sealed");
        Ok(())
    }

    async fn announce_opened(&self, epoch_id: &str, now: i64) -> anyhow::Result<()> {
        self.transport
            .publish(
                &self.topic("epochs/opened"),
                &json!({ "epoch_id": epoch_id, "name": epoch_id, "timestamp": now }),
            )
            .await
    }

    async fn claim_timeout_loop(self: Arc<Self>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            self.reclaim_expired_claims_once().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    async fn reclaim_expired_claims_once(&self) {
        let now = now_ts();
        let reclaimed = {
            let mut state = self.state.lock().await;
            state.reclaim_expired_claims(now)
        };
        for (job_cid, miner) in reclaimed {
            let _ = self
                .transport
                .publish(
                    &self.topic("claims/timeout"),
                    &json!({ "job_cid": job_cid, "miner": miner, "timestamp": now }),
                )
                .await;
            info!(job_cid = %job_cid, prior_miner = %miner, "claim reclaimed on timeout");
        }
    }

    async fn heartbeat_monitor_loop(self: Arc<Self>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            let now = now_ts();
            let transitioned = {
                let mut state = self.state.lock().await;
                state.mark_stale_miners_offline(now, self.miner_timeout_seconds)
            };
            for identity in transitioned {
                info!(miner = %identity, "miner transitioned to offline");
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::{FakeSidecar, FakeStore, FakeTransport};
    use crate::models::{ActiveEpoch, ProofLogEntry};

    fn supervisor(
        state: Arc<Mutex<PoolState>>,
        store: Arc<FakeStore>,
        transport: Arc<FakeTransport>,
        sidecar: Arc<FakeSidecar>,
    ) -> Arc<Supervisor> {
        Arc::new(Supervisor::new(
            "pool.eth",
            state,
            store,
            transport,
            sidecar,
            "0x176ecbc1cece9f830ac4e521efd9ce220c975007a28023e62fb66613c46bdb34".to_string(),
            3600,
            120,
        ))
    }

    #[tokio::test]
    async fn publishes_signed_state_and_caches_cid() {
        let state = Arc::new(Mutex::new(PoolState::new("pool.eth")));
        let store = Arc::new(FakeStore::new());
        let transport = Arc::new(FakeTransport::new());
        let sidecar = Arc::new(FakeSidecar::new());
        let sup = supervisor(state, store, transport.clone(), sidecar.clone());

        sup.publish_state_once().await.unwrap();

        assert!(sidecar.get("pool:state:cid").await.unwrap().is_some());
        let published = transport.published_on("pool.eth/state").await;
        assert_eq!(published.len(), 1);
    }

    #[tokio::test]
    async fn seals_epoch_and_opens_successor() {
        let state = Arc::new(Mutex::new(PoolState::new("pool.eth")));
        {
            let mut locked = state.lock().await;
            locked.active_epoch = Some(ActiveEpoch {
                epoch_id: "epoch-0".to_string(),
                open_at: 0,
                jobs_count: 1,
                volume: 1.0,
                proof_log: vec![ProofLogEntry {
                    job_cid: "bafyJ1".to_string(),
                    proof_cid: "bafyP1".to_string(),
                    miner: "alice.eth".to_string(),
                    timestamp: 0,
                }],
            });
        }
        let store = Arc::new(FakeStore::new());
        let transport = Arc::new(FakeTransport::new());
        let sidecar = Arc::new(FakeSidecar::new());
        let sup = supervisor(state.clone(), store, transport.clone(), sidecar.clone());

        sup.check_and_seal_epoch().await.unwrap();

        let locked = state.lock().await;
        assert_ne!(locked.active_epoch.as_ref().unwrap().epoch_id, "epoch-0");
        drop(locked);

        assert!(sidecar.get("pool:epoch:epoch-0").await.unwrap().is_some());
        let history = sidecar.lrange("pool:epochs:history", 10).await.unwrap();
        assert_eq!(history, vec!["epoch-0".to_string()]);
        assert_eq!(transport.published_on("pool.eth/epochs/sealed").await.len(), 1);
    }

    #[tokio::test]
    async fn reclaims_expired_claims_and_announces_timeout() {
        let state = Arc::new(Mutex::new(PoolState::new("pool.eth")));
        {
            let mut locked = state.lock().await;
            locked.accept_job("bafyJ1".to_string(), 1.0);
            locked.active_miners.insert(
                "alice.eth".to_string(),
                crate::models::Miner {
                    identity: "alice.eth".to_string(),
                    registered_at: 0,
                    last_heartbeat: 0,
                    gpus: vec![],
                    models: vec![],
                    mode: crate::models::ExecutionMode::Solo,
                    jobs_completed: 0,
                    status: crate::models::MinerStatus::Online,
                },
            );
            locked.accept_claim("bafyJ1", "alice.eth".to_string(), -1000, 1);
        }
        let store = Arc::new(FakeStore::new());
        let transport = Arc::new(FakeTransport::new());
        let sidecar = Arc::new(FakeSidecar::new());
        let sup = supervisor(state.clone(), store, transport.clone(), sidecar);

        sup.reclaim_expired_claims_once().await;

        let locked = state.lock().await;
        assert!(locked.pending_jobs.contains(&"bafyJ1".to_string()));
        assert!(locked.claimed_jobs.is_empty());
        drop(locked);
        assert_eq!(transport.published_on("pool.eth/claims/timeout").await.len(), 1);
    }
}
