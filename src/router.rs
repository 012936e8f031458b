//! Message Router: one ingestion loop, five handlers, dispatch
//! by topic substring. Handler errors are logged and swallowed — the loop
//! itself never stops on a bad message.

use crate::adapters::{ContentStore, Sidecar, SignatureVerifier, Transport};
use crate::error::DaemonError;
use crate::models::{
    ClaimMessage, ClaimedJob, HeartbeatMessage, JobAnnouncement, JobNewAnnouncement, JobSnapshot,
    Miner, MinerRegistration, MinerStatus, ProofLogEntry, ProofMessage, ProofSnapshot,
};
use crate::schema::{self, SchemaType};
use crate::state::PoolState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct Router {
    pool_ens: String,
    state: Arc<Mutex<PoolState>>,
    store: Arc<dyn ContentStore>,
    transport: Arc<dyn Transport>,
    verifier: Arc<dyn SignatureVerifier>,
    sidecar: Arc<dyn Sidecar>,
    claim_timeout_seconds: i64,
}

impl Router {
    pub fn new(
        pool_ens: impl Into<String>,
        state: Arc<Mutex<PoolState>>,
        store: Arc<dyn ContentStore>,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn SignatureVerifier>,
        sidecar: Arc<dyn Sidecar>,
        claim_timeout_seconds: i64,
    ) -> Self {
        Self {
            pool_ens: pool_ens.into(),
            state,
            store,
            transport,
            verifier,
            sidecar,
            claim_timeout_seconds,
        }
    }

    fn topic(&self, name: &str) -> String {
        format!("{}/{}", self.pool_ens, name)
    }

    /// Subscribe to the five inbound topics.
    pub async fn subscribe_all(&self) -> anyhow::Result<()> {
        for name in ["jobs", "claims", "proofs", "miners", "heartbeats"] {
            self.transport.subscribe(&self.topic(name)).await?;
        }
        Ok(())
    }

    /// Run the ingestion loop until `running` goes false.
    pub async fn run(&self, running: Arc<std::sync::atomic::AtomicBool>) {
        use std::sync::atomic::Ordering;

        while running.load(Ordering::Relaxed) {
            let message = match self.transport.get_message(Duration::from_secs(1)).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "transport read error, sleeping 1s");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let topic = message.topic.clone();
            let result = if topic.ends_with("/jobs") {
                self.handle_job_announcement(message.payload).await
            } else if topic.ends_with("/claims") {
                self.handle_claim(message.payload).await
            } else if topic.ends_with("/proofs") {
                self.handle_proof(message.payload).await
            } else if topic.ends_with("/miners") {
                self.handle_miner_registration(message.payload).await
            } else if topic.ends_with("/heartbeats") {
                self.handle_heartbeat(message.payload).await
            } else {
                warn!(%topic, "message on unrecognized topic, dropped");
                Ok(())
            };

            if let Err(e) = result {
                warn!(%topic, error = %e, "handler dropped message");
            }
        }
    }

    async fn handle_job_announcement(&self, payload: Value) -> Result<(), DaemonError> {
        let announcement: JobAnnouncement = serde_json::from_value(payload)
            .map_err(|e| DaemonError::Structural(e.to_string()))?;

        {
            let state = self.state.lock().await;
            if state.is_job_tracked(&announcement.cid) {
                return Ok(()); // duplicate announcement: silent no-op
            }
        }

        let blob = self
            .store
            .fetch_json(&announcement.cid)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?
            .ok_or_else(|| DaemonError::FetchMiss(announcement.cid.clone()))?;

        let validation = schema::validate_snapshot(&blob, SchemaType::Job);
        if !validation.valid {
            return Err(DaemonError::Structural(validation.errors.join(", ")));
        }

        let verified = self
            .verifier
            .verify(&blob, &announcement.client)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?;
        if !verified {
            return Err(DaemonError::InvalidSignature(announcement.client.clone()));
        }

        let job: JobSnapshot =
            serde_json::from_value(blob).map_err(|e| DaemonError::Structural(e.to_string()))?;
        if job.job_type.is_empty() || job.model.is_empty() {
            return Err(DaemonError::Structural("empty job_type or model".to_string()));
        }
        let reward: f64 = job
            .reward
            .parse()
            .map_err(|_| DaemonError::Structural("reward is not numeric".to_string()))?;

        {
            let mut state = self.state.lock().await;
            if state.is_job_tracked(&announcement.cid) {
                return Ok(());
            }
            state.accept_job(announcement.cid.clone(), reward);
        }

        let _ = self.store.pin(&announcement.cid).await;

        let outbound = JobNewAnnouncement {
            cid: announcement.cid.clone(),
            job_type: job.job_type,
            model: job.model,
            reward: job.reward,
            timestamp: announcement.timestamp,
        };
        let _ = self
            .transport
            .publish(&self.topic("jobs/new"), &json!(outbound))
            .await;
        info!(cid = %announcement.cid, "job accepted");
        Ok(())
    }

    async fn handle_claim(&self, payload: Value) -> Result<(), DaemonError> {
        let validation = schema::validate_snapshot(&payload, SchemaType::Claim);
        if !validation.valid {
            return Err(DaemonError::Structural(validation.errors.join(", ")));
        }

        let claim: ClaimMessage = serde_json::from_value(payload.clone())
            .map_err(|e| DaemonError::Structural(e.to_string()))?;

        {
            let state = self.state.lock().await;
            if !state.pending_jobs.iter().any(|c| c == &claim.job_cid) {
                return Err(DaemonError::ProtocolViolation(format!(
                    "claim on non-pending job {}",
                    claim.job_cid
                )));
            }
            if !state.active_miners.contains_key(&claim.miner) {
                return Err(DaemonError::ProtocolViolation(format!(
                    "claim from unknown miner {}",
                    claim.miner
                )));
            }
        }

        let verified = self
            .verifier
            .verify(&payload, &claim.miner)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?;
        if !verified {
            return Err(DaemonError::InvalidSignature(claim.miner.clone()));
        }

        let now = now_ts();
        let accepted = {
            let mut state = self.state.lock().await;
            state.accept_claim(&claim.job_cid, claim.miner.clone(), now, self.claim_timeout_seconds)
        };
        if !accepted {
            // Lost the race to another claimant between the check and the mutation.
            return Err(DaemonError::ProtocolViolation(format!(
                "job {} already claimed",
                claim.job_cid
            )));
        }

        let _ = self
            .transport
            .publish(
                &self.topic("claims/accepted"),
                &json!({ "job_cid": claim.job_cid, "miner": claim.miner, "timestamp": claim.timestamp }),
            )
            .await;
        info!(job_cid = %claim.job_cid, miner = %claim.miner, "claim accepted");
        Ok(())
    }

    async fn handle_proof(&self, payload: Value) -> Result<(), DaemonError> {
        let proof_msg: ProofMessage = serde_json::from_value(payload)
            .map_err(|e| DaemonError::Structural(e.to_string()))?;

        {
            let state = self.state.lock().await;
            match state.claimed_jobs.get(&proof_msg.job_cid) {
                Some(ClaimedJob { miner, .. }) if miner == &proof_msg.miner => {}
                _ => {
                    return Err(DaemonError::ProtocolViolation(format!(
                        "proof from non-claimant for job {}",
                        proof_msg.job_cid
                    )))
                }
            }
        }

        let blob = self
            .store
            .fetch_json(&proof_msg.proof_cid)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?
            .ok_or_else(|| DaemonError::FetchMiss(proof_msg.proof_cid.clone()))?;

        let validation = schema::validate_snapshot(&blob, SchemaType::Proof);
        if !validation.valid {
            return Err(DaemonError::Structural(validation.errors.join(", ")));
        }

        let verified = self
            .verifier
            .verify(&blob, &proof_msg.miner)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?;
        if !verified {
            return Err(DaemonError::InvalidSignature(proof_msg.miner.clone()));
        }

        let proof: ProofSnapshot =
            serde_json::from_value(blob).map_err(|e| DaemonError::Structural(e.to_string()))?;
        if proof.job_cid != proof_msg.job_cid {
            return Err(DaemonError::Structural(
                "proof job_cid does not match announcement".to_string(),
            ));
        }

        let entry = ProofLogEntry {
            job_cid: proof_msg.job_cid.clone(),
            proof_cid: proof_msg.proof_cid.clone(),
            miner: proof_msg.miner.clone(),
            timestamp: proof_msg.timestamp,
        };
        let epoch_id = {
            let mut state = self.state.lock().await;
            state.accept_proof(entry.clone());
            state.active_epoch.as_ref().map(|e| e.epoch_id.clone())
        };

        if let Some(epoch_id) = epoch_id {
            let key = format!("pool:epoch:{}:proofs", epoch_id);
            if let Ok(serialized) = serde_json::to_string(&entry) {
                let _ = self.sidecar.lpush(&key, &serialized).await;
            }
        }

        let _ = self.store.pin(&proof_msg.proof_cid).await;
        let _ = self
            .transport
            .publish(&self.topic("proofs/accepted"), &json!(proof_msg))
            .await;
        info!(job_cid = %proof_msg.job_cid, miner = %proof_msg.miner, "proof accepted");
        Ok(())
    }

    async fn handle_miner_registration(&self, payload: Value) -> Result<(), DaemonError> {
        let validation = schema::validate_snapshot(&payload, SchemaType::MinerRegistration);
        if !validation.valid {
            return Err(DaemonError::Structural(validation.errors.join(", ")));
        }

        let registration: MinerRegistration = serde_json::from_value(payload.clone())
            .map_err(|e| DaemonError::Structural(e.to_string()))?;

        let verified = self
            .verifier
            .verify(&payload, &registration.miner)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?;
        if !verified {
            return Err(DaemonError::InvalidSignature(registration.miner.clone()));
        }

        let now = now_ts();
        {
            let mut state = self.state.lock().await;
            let jobs_completed = state
                .active_miners
                .get(&registration.miner)
                .map(|m| m.jobs_completed)
                .unwrap_or(0);
            state.active_miners.insert(
                registration.miner.clone(),
                Miner {
                    identity: registration.miner.clone(),
                    registered_at: now,
                    last_heartbeat: now,
                    gpus: registration.gpus,
                    models: registration.models,
                    mode: registration.mode.unwrap_or(crate::models::ExecutionMode::Solo),
                    jobs_completed,
                    status: MinerStatus::Online,
                },
            );
        }

        let _ = self
            .transport
            .publish(
                &self.topic("miners/joined"),
                &json!({ "miner": registration.miner, "timestamp": now }),
            )
            .await;
        info!(miner = %registration.miner, "miner registered");
        Ok(())
    }

    async fn handle_heartbeat(&self, payload: Value) -> Result<(), DaemonError> {
        let validation = schema::validate_snapshot(&payload, SchemaType::Heartbeat);
        if !validation.valid {
            return Err(DaemonError::Structural(validation.errors.join(", ")));
        }

        let heartbeat: HeartbeatMessage = serde_json::from_value(payload.clone())
            .map_err(|e| DaemonError::Structural(e.to_string()))?;

        let verified = self
            .verifier
            .verify(&payload, &heartbeat.miner)
            .await
            .map_err(|e| DaemonError::TransientIo(e.to_string()))?;
        if !verified {
            return Err(DaemonError::InvalidSignature(heartbeat.miner.clone()));
        }

        let mut state = self.state.lock().await;
        let Some(miner) = state.active_miners.get_mut(&heartbeat.miner) else {
            return Ok(()); // unknown miners are ignored, registration is required first
        };
        miner.last_heartbeat = heartbeat.timestamp;
        miner.status = MinerStatus::Online;
        Ok(())
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
