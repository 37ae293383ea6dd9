/**
 * NETSECTOR KERNEL - Point d'entrée du serveur de surveillance
 *
 * RÔLE : Orchestration des modules : config, store, moteur de statut, poller,
 * bus MQTT et API HTTP.
 *
 * Démarrage :
 * 1. .env + logs (RUST_LOG, défaut `netsector_kernel=info`)
 * 2. Config YAML (+ surcharges d'environnement)
 * 3. Store JSON dans `data_dir` (repli mémoire si le disque est inutilisable)
 * 4. Seed de la topologie au premier lancement
 * 5. Moteur + poller, bus MQTT si configuré, puis HTTP
 */

use netsector_kernel::bus;
use netsector_kernel::config::load_config;
use netsector_kernel::engine::StatusEngine;
use netsector_kernel::history::HistoryLog;
use netsector_kernel::http::{self, AppState};
use netsector_kernel::overrides::OverrideStore;
use netsector_kernel::poller::spawn_status_poller;
use netsector_kernel::probe::build_prober;
use netsector_kernel::state::new_state;
use netsector_kernel::store::{JsonFileStore, MemoryStore, RecordStore};
use netsector_kernel::topology::TopologyStore;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netsector_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    let store: Arc<dyn RecordStore> = match JsonFileStore::open(&cfg.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(dir = %cfg.data_dir, error = %e, "failed to open data dir, falling back to in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let info = store.info();
    info!(backend = %info.backend, location = ?info.location, "record store ready");

    let topology = TopologyStore::new(store.clone());
    match topology.seed_if_empty(&cfg.seed) {
        Ok(true) => {}
        Ok(false) => info!("existing topology kept"),
        Err(e) => warn!(error = %e, "failed to seed topology"),
    }

    let history = new_state(HistoryLog::with_store(cfg.history.capacity, store.clone()));
    let engine = Arc::new(StatusEngine::new(
        topology,
        OverrideStore::new(),
        build_prober(&cfg.probe),
        history,
        cfg.poll.probe_timeout(),
    ));

    if let Some(mqtt) = cfg.mqtt.clone() {
        bus::spawn_status_publisher(&engine, mqtt);
    }

    let (poller, _poll_task) = spawn_status_poller(engine.clone(), cfg.poll.interval());

    let api_key: Option<Arc<str>> = cfg.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()).map(Arc::from);
    if api_key.is_none() {
        warn!("no api_key configured, HTTP API is open to anyone on the network");
    }

    let app = http::build_router(AppState { engine, poller, api_key });

    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("cannot bind {}", cfg.listen))?;
    info!(addr = %cfg.listen, "listening");
    axum::serve(listener, app).await.context("http server stopped")?;
    Ok(())
}
