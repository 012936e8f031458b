//! Daemon wiring: assembles `PoolState`, the production adapters, and
//! spawns the router loop plus the four supervisor tasks.

use crate::adapters::sidecar::HttpSidecar;
use crate::adapters::store::IpfsStore;
use crate::adapters::transport::IpfsPubsub;
use crate::adapters::verifier::RemoteVerifier;
use crate::config::Config;
use crate::epoch;
use crate::error::DaemonError;
use crate::router::Router;
use crate::models::{ActiveEpoch, PoolStateSnapshot, ProofLogEntry};
use crate::state::PoolState;
use crate::supervisor::Supervisor;
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Reconstruct pool state from the last published snapshot and the current
/// epoch's proof log: the ledger is authoritative, so whatever was not
/// successfully published did not happen. `claimed_jobs` is always
/// reconstructed empty — all prior claims expire on restart. `active_miners`
/// is rebuilt as miners re-register and re-heartbeat.
async fn restore_from_ledger(
    pool_ens: &str,
    store: &dyn crate::adapters::ContentStore,
    sidecar: &dyn crate::adapters::Sidecar,
    now: i64,
) -> PoolState {
    let mut state = PoolState::new(pool_ens);

    let Some(cid) = sidecar.get("pool:state:cid").await.ok().flatten() else {
        info!("no cached state identifier, starting from a fresh ledger view");
        return state;
    };
    let Ok(Some(snapshot)) = crate::adapters::store::fetch_typed::<PoolStateSnapshot>(store, &cid).await
    else {
        warn!(cid = %cid, "cached state identifier did not resolve, starting fresh");
        return state;
    };

    state.total_jobs = snapshot.total_jobs;
    state.total_proofs = snapshot.total_proofs;
    state.total_volume = snapshot.total_volume.parse().unwrap_or(0.0);
    state.pending_jobs = snapshot.pending_jobs.into_iter().collect();
    state.last_updated = snapshot.last_updated;

    if let Some(epoch_id) = snapshot.current_epoch {
        let proof_key = format!("pool:epoch:{}:proofs", epoch_id);
        let proof_log: Vec<ProofLogEntry> = sidecar
            .lrange(&proof_key, usize::MAX)
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect();

        state.active_epoch = Some(ActiveEpoch {
            epoch_id,
            open_at: now,
            jobs_count: snapshot.epoch_jobs,
            volume: snapshot.epoch_volume.parse().unwrap_or(0.0),
            proof_log,
        });
    }

    state
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Start the pool daemon and block until `running` is flipped false.
/// Shutdown observes the flag at each loop head; in-flight handlers run to
/// completion.
pub async fn run(config: Config, running: Arc<AtomicBool>) -> Result<()> {
    let operator_private_key = config
        .operator_private_key
        .clone()
        .ok_or(DaemonError::SigningKeyUnavailable)
        .context("refusing to start: no operator signing key configured")?;

    let pb = spinner("Connecting adapters...");
    let store: Arc<dyn crate::adapters::ContentStore> =
        Arc::new(IpfsStore::new(config.content_store_api.clone()));
    let transport: Arc<dyn crate::adapters::Transport> =
        Arc::new(IpfsPubsub::new(config.content_store_api.clone()));
    let verifier: Arc<dyn crate::adapters::SignatureVerifier> =
        Arc::new(RemoteVerifier::new(format!("{}/verify", config.sidecar_url)));
    let sidecar: Arc<dyn crate::adapters::Sidecar> = Arc::new(HttpSidecar::new(config.sidecar_url.clone()));
    pb.finish_with_message(format!("{} Adapters ready", "✓".green()));

    let pb = spinner("Restoring pool state...");
    let now = chrono::Utc::now().timestamp();
    let mut pool_state = restore_from_ledger(&config.pool_ens, store.as_ref(), sidecar.as_ref(), now).await;
    if pool_state.active_epoch.is_none() {
        pool_state.active_epoch = Some(epoch::open_epoch(now));
    }
    pb.finish_with_message(format!(
        "{} Epoch {} ready",
        "✓".green(),
        pool_state.active_epoch.as_ref().unwrap().epoch_id
    ));

    let state = Arc::new(Mutex::new(pool_state));

    let router = Router::new(
        config.pool_ens.clone(),
        state.clone(),
        store.clone(),
        transport.clone(),
        verifier.clone(),
        sidecar.clone(),
        config.claim_timeout_seconds as i64,
    );
    router.subscribe_all().await?;

    let supervisor = Arc::new(Supervisor::new(
        config.pool_ens.clone(),
        state.clone(),
        store,
        transport,
        sidecar,
        operator_private_key,
        config.epoch_duration_seconds as i64,
        config.miner_timeout_seconds as i64,
    ));
    let supervisor_handles = supervisor.spawn_all(running.clone());

    println!(
        "{}",
        format!("Pool daemon running for {}", config.pool_ens.clone()).green().bold()
    );
    println!(
        "  {}",
        format!(
            "epoch_duration={}s claim_timeout={}s miner_timeout={}s",
            config.epoch_duration_seconds, config.claim_timeout_seconds, config.miner_timeout_seconds
        )
        .bright_black()
    );

    router.run(running).await;

    for handle in supervisor_handles {
        let _ = handle.await;
    }

    Ok(())
}
